//! Data block framing: start tokens, CRC placeholders, data responses and
//! busy polling

use crate::errors::{SdError, SdResult};
use crate::link::{Deadline, SD_IDLE_BYTE, SdLink};
use log::{trace, warn};

/// Block length for SD operations
pub const SD_BLOCK_LEN: usize = 512;

/// Size of the CRC16 trailing every data block
pub const SD_BLOCK_CRC_LEN: usize = 2;

/// Start token of a single block read or write
pub const SD_TOKEN_START_BLOCK: u8 = 0xFE;

/// Stop transmission token of a multiple block write, carries no payload
pub const SD_TOKEN_STOP_TRAN: u8 = 0xFD;

/// Data response mask and the "data accepted" value
pub const SD_DATA_RESPONSE_MASK: u8 = 0x1F;
pub const SD_DATA_ACCEPTED: u8 = 0x05;

/// Time the card gets to start sending a data block, in milliseconds
pub const SD_READ_TOKEN_TIMEOUT_MS: u32 = 100;

/// Time the card gets to finish programming a block, in milliseconds
pub const SD_WRITE_TIMEOUT_MS: u32 = 250;

/// Send a data block after a write command.
///
/// The stop-tran token goes out alone. Any other token is followed by the
/// payload and a dummy CRC, then the data response must read "accepted" or
/// the block is [`SdError::Rejected`] and the card is not polled further.
/// Returns [`SdError::Busy`] if the card still holds the line low when
/// `timeout_ms` elapses.
pub fn write_block<L: SdLink + ?Sized>(
    link: &mut L,
    data: &[u8; SD_BLOCK_LEN],
    token: u8,
    timeout_ms: u32,
) -> SdResult {
    link.exchange(token)?;

    if token != SD_TOKEN_STOP_TRAN {
        for byte in data.iter() {
            link.exchange(*byte)?;
        }
        for _ in 0..SD_BLOCK_CRC_LEN {
            link.receive()?;
        }

        let response = link.receive()?;
        if (response & SD_DATA_RESPONSE_MASK) != SD_DATA_ACCEPTED {
            warn!("data block rejected: {:#04x}", response);
            return Err(SdError::Rejected { response });
        }
    }

    wait_not_busy(link, timeout_ms)
}

/// Poll until the card releases the busy signal (a non-zero byte)
pub fn wait_not_busy<L: SdLink + ?Sized>(link: &mut L, timeout_ms: u32) -> SdResult {
    let deadline = Deadline::arm(link, timeout_ms);
    let mut line = link.receive()?;
    while line == 0 && deadline.is_active(link) {
        line = link.receive()?;
    }

    if line == 0 {
        warn!("card still busy after {}ms", timeout_ms);
        return Err(SdError::Busy {});
    }
    Ok(())
}

/// Receive a data block after a read command.
///
/// Waits for the start token, skips `offset` bytes, copies `buffer.len()`
/// bytes into `buffer` and clocks out the rest of the `block_len` block plus
/// its CRC so the link stays in step for the next command.
/// A card that stays idle past `timeout_ms` yields [`SdError::Timeout`];
/// any other byte in place of the start token is a [`SdError::DataError`].
pub fn read_block<L: SdLink + ?Sized>(
    link: &mut L,
    buffer: &mut [u8],
    offset: usize,
    block_len: usize,
    timeout_ms: u32,
) -> SdResult {
    if offset.saturating_add(buffer.len()) > block_len {
        return Err(SdError::Parameter {});
    }

    let deadline = Deadline::arm(link, timeout_ms);
    let mut token = link.receive()?;
    while token == SD_IDLE_BYTE && deadline.is_active(link) {
        token = link.receive()?;
    }

    if token == SD_IDLE_BYTE {
        warn!("no data token after {}ms", timeout_ms);
        return Err(SdError::Timeout {});
    }
    if token != SD_TOKEN_START_BLOCK {
        warn!("data error token {:#04x}", token);
        return Err(SdError::DataError { token });
    }

    let remaining = block_len + SD_BLOCK_CRC_LEN - offset - buffer.len();
    for _ in 0..offset {
        link.receive()?;
    }
    for byte in buffer.iter_mut() {
        *byte = link.receive()?;
    }
    for _ in 0..remaining {
        link.receive()?;
    }

    trace!("read {} bytes at offset {} of a {} byte block", buffer.len(), offset, block_len);
    Ok(())
}
