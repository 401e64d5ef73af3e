//! The block device contract shared by every backend

use crate::block::SD_BLOCK_LEN;
use crate::errors::{SdError, SdResult};

/// How data addresses are expressed on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Addressing {
    /// Byte offsets (SDSC, MMC)
    Byte,
    /// Sector numbers (SDHC/SDXC)
    Block,
}

/// Card generation, settled once by negotiation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CardType {
    /// Not negotiated, or negotiation failed
    #[default]
    Unknown,
    /// SD version 1.x
    SdV1,
    /// SD version 2.0 or later
    SdV2(Addressing),
    /// MMC version 3
    Mmc,
}

impl CardType {
    pub fn addressing(&self) -> Addressing {
        match self {
            Self::SdV2(addressing) => *addressing,
            _ => Addressing::Byte,
        }
    }

    /// Convert a sector number into the argument of a data command
    pub fn data_address(&self, sector: u32) -> u32 {
        match self.addressing() {
            Addressing::Block => sector,
            Addressing::Byte => sector.wrapping_mul(SD_BLOCK_LEN as u32),
        }
    }
}

/// Operation counters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SdStats {
    pub reads: u32,
    pub writes: u32,
}

/// Per-device bookkeeping common to the backends.
///
/// `card_type` and `sector_count` are only meaningful while `mounted`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DeviceState {
    pub card_type: CardType,
    pub mounted: bool,
    pub sector_count: u32,
    pub stats: SdStats,
}

impl DeviceState {
    /// Forget everything learnt from the last initialization
    pub fn unmount(&mut self) {
        self.card_type = CardType::Unknown;
        self.mounted = false;
        self.sector_count = 0;
    }

    /// Mount with the given card type and capacity, clearing the counters
    pub fn mount(&mut self, card_type: CardType, sector_count: u32) {
        self.card_type = card_type;
        self.sector_count = sector_count;
        self.mounted = true;
        self.stats = SdStats::default();
    }

    /// Highest addressable sector, `None` on an empty or unmounted device
    pub fn last_sector(&self) -> Option<u32> {
        match self.mounted {
            true => self.sector_count.checked_sub(1),
            false => None,
        }
    }

    /// Validate a sector access before anything touches the medium
    pub fn check_read(&self, sector: u32, offset: usize, count: usize, buffer_len: usize) -> SdResult {
        let last_sector = self.check_mounted()?;
        if sector > last_sector
            || count == 0
            || offset.saturating_add(count) > SD_BLOCK_LEN
            || buffer_len < count
        {
            return Err(SdError::Parameter {});
        }
        Ok(())
    }

    pub fn check_write(&self, sector: u32) -> SdResult {
        let last_sector = self.check_mounted()?;
        if sector > last_sector {
            return Err(SdError::Parameter {});
        }
        Ok(())
    }

    fn check_mounted(&self) -> SdResult<u32> {
        if !self.mounted {
            return Err(SdError::NotInitialized {});
        }
        self.last_sector().ok_or(SdError::Parameter {})
    }
}

/// Block access to a card, whatever sits behind it.
///
/// Every operation returns once it completes or its deadline elapses.
pub trait SdDevice {
    /// Bring the card up, learning its type and capacity
    fn init(&mut self) -> SdResult;

    /// Read `count` bytes starting `offset` bytes into `sector`
    fn read(&mut self, buffer: &mut [u8], sector: u32, offset: usize, count: usize) -> SdResult;

    /// Write one full sector
    fn write(&mut self, buffer: &[u8; SD_BLOCK_LEN], sector: u32) -> SdResult;

    /// Check whether the medium still answers. Never alters device state.
    fn status(&mut self) -> SdResult;

    /// Bookkeeping of the device
    fn state(&self) -> &DeviceState;

    fn card_type(&self) -> CardType {
        self.state().card_type
    }

    fn is_mounted(&self) -> bool {
        self.state().mounted
    }

    fn sector_count(&self) -> u32 {
        self.state().sector_count
    }

    fn last_sector(&self) -> Option<u32> {
        self.state().last_sector()
    }

    fn stats(&self) -> SdStats {
        self.state().stats
    }
}
