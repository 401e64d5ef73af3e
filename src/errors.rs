//! Errors returned by the SD card drivers

use embedded_io::{Error, ErrorKind};
use snafu::prelude::*;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Snafu)]
pub enum SdError {
    #[snafu(display("(SD) Sector, offset or length out of range!"))]
    Parameter {},
    #[snafu(display("(SD) Card did not answer!"))]
    NoResponse {},
    #[snafu(display("(SD) Timeout waiting for the card!"))]
    Timeout {},
    #[snafu(display("(SD) Card sent data error token {:#04x}!", token))]
    DataError { token: u8 },
    #[snafu(display("(SD) Card rejected the data block (response {:#04x})!", response))]
    Rejected { response: u8 },
    #[snafu(display("(SD) Card still busy after write!"))]
    Busy {},
    #[snafu(display("(SD) Card is not initialized!"))]
    NotInitialized {},
    #[snafu(display("(SD) CMD{} failed with R1 {:#04x}!", cmd, r1))]
    CommandFailed { cmd: u8, r1: u8 },
    #[snafu(display("(SD) Link transfer failed!"))]
    Transport {},
    #[snafu(display("(SD) Backing file access failed!"))]
    FileAccess {},
}

impl Error for SdError {
    fn kind(&self) -> ErrorKind {
        ErrorKind::Other
    }
}

/// Shorthand used by every driver operation
pub type SdResult<T = ()> = Result<T, SdError>;
