//! Crate used to interface with SD and MMC cards via SPI
//!
//! [`sdspi::SdSpi`] drives a card over any [`link::SdLink`]; with the `std`
//! feature [`file::SdFile`] serves the same [`device::SdDevice`] contract from
//! a card image on the host. [`stream::SdStream`] turns either into a
//! seekable byte stream.
//!
//! *currently in the alpha phase: single block transfers only. future updates
//! guarentee breaking changes.*

#![cfg_attr(not(any(test, feature = "std")), no_std)]

pub mod block;
pub mod command;
pub mod config;
pub mod device;
pub mod errors;
#[cfg(feature = "std")]
pub mod file;
pub mod init;
pub mod link;
#[cfg(feature = "rp2040")]
pub mod pico;
pub mod registers;
pub mod sdspi;
pub mod stream;
#[cfg(test)]
mod testing;
pub mod transport;

pub use config::SdConfig;
pub use device::{Addressing, CardType, SdDevice, SdStats};
pub use errors::{SdError, SdResult};
pub use link::{Deadline, HalLink, LinkSpeed, SdLink};
pub use sdspi::SdSpi;
pub use stream::SdStream;
