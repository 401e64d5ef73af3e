//! SD card over an SPI link

use crate::block::{SD_BLOCK_LEN, SD_TOKEN_START_BLOCK, read_block, write_block};
use crate::command::{R1, SdCmd};
use crate::config::SdConfig;
use crate::device::{CardType, DeviceState, SdDevice};
use crate::errors::{SdError, SdResult};
use crate::init::{negotiate, read_csd, sector_count};
use crate::link::{LinkSpeed, SdLink};
use crate::transport::send_command;
use log::{debug, warn};

/// SPI-mode SD card driver
pub struct SdSpi<L: SdLink> {
    /// Link to the card, owned for the lifetime of the driver
    link: L,
    /// Deadlines and retry budget
    config: SdConfig,
    /// What the last initialization learnt about the card
    state: DeviceState,
}

impl<L: SdLink> SdSpi<L> {
    /// Create a new driver with the default timings. The card is not
    /// touched until [`SdDevice::init`].
    pub fn new(link: L) -> Self {
        Self::with_config(link, SdConfig::default())
    }

    pub fn with_config(link: L, config: SdConfig) -> Self {
        Self {
            link,
            config,
            state: DeviceState::default(),
        }
    }

    #[inline]
    pub fn config(&self) -> &SdConfig {
        &self.config
    }

    #[inline]
    pub fn link(&self) -> &L {
        &self.link
    }

    #[inline]
    pub fn link_mut(&mut self) -> &mut L {
        &mut self.link
    }

    /// Give the link back
    pub fn free(self) -> L {
        self.link
    }

    /// Deselect the card and give it its trailing clocks
    fn release(&mut self) -> SdResult {
        self.link.deselect()?;
        self.link.release()
    }

    /// One negotiation attempt followed by the capacity query
    fn try_init(&mut self) -> SdResult<Option<(CardType, u32)>> {
        let card_type = negotiate(&mut self.link, &self.config)?;
        if card_type == CardType::Unknown {
            return Ok(None);
        }

        Ok(read_csd(&mut self.link, &self.config)?.map(|csd| (card_type, sector_count(card_type, &csd))))
    }

    fn read_raw(&mut self, buffer: &mut [u8], address: u32, offset: usize) -> SdResult {
        let command = SdCmd::ReadSingleBlock(address);
        check_r1(command, send_command(&mut self.link, command, self.config.cmd_timeout_ms)?)?;
        read_block(&mut self.link, buffer, offset, SD_BLOCK_LEN, self.config.data_token_timeout_ms)
    }

    fn write_raw(&mut self, buffer: &[u8; SD_BLOCK_LEN], address: u32) -> SdResult {
        let command = SdCmd::WriteBlock(address);
        check_r1(command, send_command(&mut self.link, command, self.config.cmd_timeout_ms)?)?;
        write_block(&mut self.link, buffer, SD_TOKEN_START_BLOCK, self.config.write_timeout_ms)
    }
}

/// Map the R1 of a data command to an error
fn check_r1(command: SdCmd, r1: R1) -> SdResult {
    if r1.is_ready() {
        return Ok(());
    }

    if !r1.is_response() {
        warn!("CMD{} got no response", command.index());
        return Err(SdError::NoResponse {});
    }

    warn!("CMD{} failed: {:#04x}", command.index(), r1.0);
    Err(SdError::CommandFailed {
        cmd: command.index(),
        r1: r1.0,
    })
}

impl<L: SdLink> SdDevice for SdSpi<L> {
    fn init(&mut self) -> SdResult {
        self.state.unmount();

        let attempts = self.config.init_attempts.max(1);
        for attempt in 1..=attempts {
            match self.try_init() {
                Ok(Some((card_type, sectors))) => {
                    self.state.mount(card_type, sectors);
                    self.link.set_speed(LinkSpeed::High)?;
                    self.release()?;
                    debug!("mounted {:?} with {} sectors", card_type, sectors);
                    return Ok(());
                }
                // Link faults are not worth retrying
                Err(err @ SdError::Transport {}) => return Err(err),
                Err(err) => warn!("initialization attempt {}/{} failed: {}", attempt, attempts, err),
                Ok(None) => warn!("initialization attempt {}/{} failed", attempt, attempts),
            }

            self.release()?;
        }

        Err(SdError::NotInitialized {})
    }

    fn read(&mut self, buffer: &mut [u8], sector: u32, offset: usize, count: usize) -> SdResult {
        self.state.check_read(sector, offset, count, buffer.len())?;

        let address = self.state.card_type.data_address(sector);
        let result = self.read_raw(&mut buffer[..count], address, offset);
        self.release()?;
        result?;

        self.state.stats.reads = self.state.stats.reads.wrapping_add(1);
        Ok(())
    }

    fn write(&mut self, buffer: &[u8; SD_BLOCK_LEN], sector: u32) -> SdResult {
        self.state.check_write(sector)?;

        let address = self.state.card_type.data_address(sector);
        let result = self.write_raw(buffer, address);
        self.release()?;
        result?;

        self.state.stats.writes = self.state.stats.writes.wrapping_add(1);
        Ok(())
    }

    fn status(&mut self) -> SdResult {
        let r1 = send_command(&mut self.link, SdCmd::GoIdleState, self.config.cmd_timeout_ms);
        self.release()?;

        match r1?.is_response() {
            true => Ok(()),
            false => Err(SdError::NoResponse {}),
        }
    }

    #[inline]
    fn state(&self) -> &DeviceState {
        &self.state
    }
}
