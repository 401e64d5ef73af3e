//! Host backend: a plain file stands in for the card

use crate::block::SD_BLOCK_LEN;
use crate::device::{CardType, DeviceState, SdDevice};
use crate::errors::{SdError, SdResult};
use log::{debug, warn};
use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// Card image backed by a file on the host
pub struct SdFile {
    path: PathBuf,
    file: Option<File>,
    state: DeviceState,
}

fn file_access(err: io::Error) -> SdError {
    warn!("card image access failed: {}", err);
    SdError::FileAccess {}
}

impl SdFile {
    /// The image is opened by [`SdDevice::init`]
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            file: None,
            state: DeviceState::default(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Close the image; the device needs another [`SdDevice::init`]
    pub fn close(&mut self) {
        self.file = None;
        self.state.unmount();
    }

    fn seek_to(&mut self, sector: u32, offset: usize) -> SdResult<&mut File> {
        let file = self.file.as_mut().ok_or(SdError::NotInitialized {})?;
        let position = u64::from(sector) * SD_BLOCK_LEN as u64 + offset as u64;
        file.seek(SeekFrom::Start(position)).map_err(file_access)?;
        Ok(file)
    }
}

impl SdDevice for SdFile {
    fn init(&mut self) -> SdResult {
        self.close();

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(&self.path)
            .map_err(file_access)?;
        let len = file.metadata().map_err(file_access)?.len();
        let sectors = u32::try_from(len / SD_BLOCK_LEN as u64).unwrap_or(u32::MAX);

        self.file = Some(file);
        self.state.mount(CardType::Unknown, sectors);
        debug!("opened {} with {} sectors", self.path.display(), sectors);
        Ok(())
    }

    fn read(&mut self, buffer: &mut [u8], sector: u32, offset: usize, count: usize) -> SdResult {
        self.state.check_read(sector, offset, count, buffer.len())?;

        self.seek_to(sector, offset)?
            .read_exact(&mut buffer[..count])
            .map_err(file_access)?;
        self.state.stats.reads = self.state.stats.reads.wrapping_add(1);
        Ok(())
    }

    fn write(&mut self, buffer: &[u8; SD_BLOCK_LEN], sector: u32) -> SdResult {
        self.state.check_write(sector)?;

        let file = self.seek_to(sector, 0)?;
        file.write_all(buffer).map_err(file_access)?;
        file.flush().map_err(file_access)?;
        self.state.stats.writes = self.state.stats.writes.wrapping_add(1);
        Ok(())
    }

    fn status(&mut self) -> SdResult {
        match self.file {
            Some(_) => Ok(()),
            None => Err(SdError::NoResponse {}),
        }
    }

    #[inline]
    fn state(&self) -> &DeviceState {
        &self.state
    }
}
