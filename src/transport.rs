//! Command transport: framing, the ACMD escape and R1 polling

use crate::command::{R1, SdCmd};
use crate::errors::SdResult;
use crate::link::{Deadline, SD_IDLE_BYTE, SdLink};
use log::trace;

/// Time the card gets to answer a command, in milliseconds
pub const SD_CMD_TIMEOUT_MS: u32 = 5;

/// Send a command and wait for its R1 byte.
///
/// ACMDs are prefixed with CMD55; if that one fails the CMD55 response is
/// returned and the ACMD is never sent. A card that stays silent until the
/// deadline yields [`R1::NO_RESPONSE`] (or whatever busy byte came last),
/// which callers must treat as a failure. Only link faults are errors.
pub fn send_command<L: SdLink + ?Sized>(link: &mut L, command: SdCmd, timeout_ms: u32) -> SdResult<R1> {
    if command.is_acmd() {
        let r1 = send_command(link, SdCmd::AppCmd, timeout_ms)?;
        if !r1.is_ok_or_idle() {
            trace!("CMD55 before ACMD{} failed: {:#04x}", command.index(), r1.0);
            return Ok(r1);
        }
    }

    // Give the card a clean edge on chip select between commands
    link.deselect()?;
    link.receive()?;
    link.select()?;
    link.receive()?;

    for byte in command.format() {
        link.exchange(byte)?;
    }

    let deadline = Deadline::arm(link, timeout_ms);
    let mut r1 = R1(link.receive()?);
    while !r1.is_response() && deadline.is_active(link) {
        r1 = R1(link.receive()?);
    }

    trace!("CMD{}({:#010x}) -> {:#04x}", command.index(), command.argument(), r1.0);
    Ok(r1)
}

/// Read the four bytes following R1 in an R3 or R7 response
pub fn read_trailing<L: SdLink + ?Sized>(link: &mut L) -> SdResult<[u8; 4]> {
    let mut trailing = [SD_IDLE_BYTE; 4];
    for byte in trailing.iter_mut() {
        *byte = link.receive()?;
    }
    Ok(trailing)
}

/// Send a command and, when the card accepted it, collect the trailing bytes
/// its response type carries
pub fn send_command_ext<L: SdLink + ?Sized>(
    link: &mut L,
    command: SdCmd,
    timeout_ms: u32,
) -> SdResult<(R1, Option<[u8; 4]>)> {
    let r1 = send_command(link, command, timeout_ms)?;
    if command.response_type().trailing_len() > 0 && r1.is_ok_or_idle() {
        return Ok((r1, Some(read_trailing(link)?)));
    }
    Ok((r1, None))
}
