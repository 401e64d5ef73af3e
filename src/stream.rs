//! Byte stream over a block device, through one cached working sector

use crate::block::SD_BLOCK_LEN;
use crate::device::SdDevice;
use crate::errors::{SdError, SdResult};
use core::cmp;
use embedded_io::blocking::{Read, Seek, Write};
use embedded_io::{Io, SeekFrom};
use log::trace;

/// Seekable byte stream on top of any [`SdDevice`].
///
/// Reads and writes go through a single working sector. Writes only reach
/// the card when another sector is loaded or on [`Write::flush`], so flush
/// before dropping the stream.
pub struct SdStream<D: SdDevice> {
    device: D,
    /// The current working sector
    working_block: [u8; SD_BLOCK_LEN],
    /// Sector held in `working_block`, if any
    working_block_num: Option<u32>,
    /// The working sector differs from the card
    dirty: bool,
    /// The current read/write position
    position: u64,
}

impl<D: SdDevice> SdStream<D> {
    /// Wrap an initialized device, starting at position 0
    pub fn new(device: D) -> Self {
        Self {
            device,
            working_block: [0; SD_BLOCK_LEN],
            working_block_num: None,
            dirty: false,
            position: 0,
        }
    }

    #[inline]
    pub fn device(&self) -> &D {
        &self.device
    }

    #[inline]
    pub fn device_mut(&mut self) -> &mut D {
        &mut self.device
    }

    #[inline]
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Size of the medium in bytes
    #[inline]
    pub fn len(&self) -> u64 {
        u64::from(self.device.sector_count()) * SD_BLOCK_LEN as u64
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Flush and give the device back
    pub fn free(mut self) -> SdResult<D> {
        self.flush()?;
        Ok(self.device)
    }

    /// Make `sector` the working sector, writing back the previous one
    fn load(&mut self, sector: u32) -> SdResult {
        if self.working_block_num == Some(sector) {
            return Ok(());
        }

        self.flush()?;
        // Forget the old sector first so a failed read never passes stale
        // data off as the new one
        self.working_block_num = None;
        self.device
            .read(&mut self.working_block, sector, 0, SD_BLOCK_LEN)?;
        self.working_block_num = Some(sector);
        trace!("working sector is now {}", sector);
        Ok(())
    }

    /// Sector and offset of the current position, `None` past the end
    fn locate(&self) -> SdResult<Option<(u32, usize)>> {
        if !self.device.is_mounted() {
            return Err(SdError::NotInitialized {});
        }
        if self.position >= self.len() {
            return Ok(None);
        }

        let sector = (self.position / SD_BLOCK_LEN as u64) as u32;
        let offset = (self.position % SD_BLOCK_LEN as u64) as usize;
        Ok(Some((sector, offset)))
    }
}

impl<D: SdDevice> Io for SdStream<D> {
    type Error = SdError;
}

impl<D: SdDevice> Read for SdStream<D> {
    /// Stops at the end of the working sector; returns 0 at the end of the
    /// medium
    fn read(&mut self, buffer: &mut [u8]) -> Result<usize, SdError> {
        let Some((sector, offset)) = self.locate()? else {
            return Ok(0);
        };
        if buffer.is_empty() {
            return Ok(0);
        }

        self.load(sector)?;
        let len = cmp::min(buffer.len(), SD_BLOCK_LEN - offset);
        buffer[..len].copy_from_slice(&self.working_block[offset..offset + len]);
        self.position += len as u64;
        Ok(len)
    }
}

impl<D: SdDevice> Write for SdStream<D> {
    /// Stops at the end of the working sector. Writing past the end of the
    /// medium is a parameter error.
    fn write(&mut self, buffer: &[u8]) -> Result<usize, SdError> {
        if buffer.is_empty() {
            return Ok(0);
        }
        let (sector, offset) = self.locate()?.ok_or(SdError::Parameter {})?;

        // A whole aligned sector needs no read-modify-write
        if offset == 0 && buffer.len() >= SD_BLOCK_LEN && self.working_block_num != Some(sector) {
            self.flush()?;
            self.working_block_num = Some(sector);
        } else {
            self.load(sector)?;
        }

        let len = cmp::min(buffer.len(), SD_BLOCK_LEN - offset);
        self.working_block[offset..offset + len].copy_from_slice(&buffer[..len]);
        self.dirty = true;
        self.position += len as u64;
        Ok(len)
    }

    fn flush(&mut self) -> Result<(), SdError> {
        if !self.dirty {
            return Ok(());
        }

        if let Some(sector) = self.working_block_num {
            self.device.write(&self.working_block, sector)?;
        }
        self.dirty = false;
        Ok(())
    }
}

impl<D: SdDevice> Seek for SdStream<D> {
    fn seek(&mut self, position: SeekFrom) -> Result<u64, SdError> {
        let position = match position {
            SeekFrom::Start(position) => Some(position),
            SeekFrom::End(delta) => self.len().checked_add_signed(delta),
            SeekFrom::Current(delta) => self.position.checked_add_signed(delta),
        };

        self.position = position.ok_or(SdError::Parameter {})?;
        Ok(self.position)
    }
}
