//! The byte link between the host and the card
//!
//! Everything the protocol engine needs from the hardware goes through
//! [`SdLink`]: a full-duplex byte exchange, chip select, a clock-rate switch
//! and a monotonic clock used to build [`Deadline`]s.

use crate::errors::{SdError, SdResult};
use embedded_hal::blocking::spi::Transfer;
use embedded_hal::digital::v2::OutputPin;
use fugit::{MicrosDurationU64, TimerInstantU64};

/// Monotonic instant with microsecond ticks, same as the rp2040 timer
pub type SdInstant = TimerInstantU64<1_000_000>;

/// Idle byte clocked out whenever the host only wants to listen
pub const SD_IDLE_BYTE: u8 = 0xFF;

/// Bytes clocked out by [`SdLink::release`], 80 clock pulses
pub const SD_RELEASE_BYTES: usize = 10;

/// Clock rate of the link
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkSpeed {
    /// 100-400kHz, required while negotiating
    Low,
    /// Full speed once the card is ready
    High,
}

/// Link layer consumed by the protocol engine
pub trait SdLink {
    /// Full-duplex transfer of a single byte
    fn exchange(&mut self, out: u8) -> SdResult<u8>;
    /// Drive chip select active (low)
    fn select(&mut self) -> SdResult;
    /// Drive chip select inactive (high)
    fn deselect(&mut self) -> SdResult;
    /// Switch the link clock rate
    fn set_speed(&mut self, speed: LinkSpeed) -> SdResult;
    /// Current time of the monotonic clock
    fn now(&mut self) -> SdInstant;

    /// Clock out an idle byte and return what the card sent back
    #[inline]
    fn receive(&mut self) -> SdResult<u8> {
        self.exchange(SD_IDLE_BYTE)
    }

    /// Let the card finish its housekeeping after chip select went high
    fn release(&mut self) -> SdResult {
        for _ in 0..SD_RELEASE_BYTES {
            self.receive()?;
        }
        Ok(())
    }
}

/// One-shot deadline, armed from the link clock.
///
/// Dropping the value disarms it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Deadline {
    expires: SdInstant,
}

impl Deadline {
    /// Arm a deadline `ms` milliseconds from now
    pub fn arm<L: SdLink + ?Sized>(link: &mut L, ms: u32) -> Self {
        Self::from_instant(link.now(), ms)
    }

    /// Arm a deadline `ms` milliseconds after `start`
    pub fn from_instant(start: SdInstant, ms: u32) -> Self {
        Self {
            expires: start + MicrosDurationU64::millis(u64::from(ms)),
        }
    }

    /// True while the deadline has not elapsed
    pub fn is_active<L: SdLink + ?Sized>(&self, link: &mut L) -> bool {
        link.now() < self.expires
    }

    pub fn expires(&self) -> SdInstant {
        self.expires
    }
}

/// Source of monotonic time for [`HalLink`]
pub trait LinkClock {
    fn now(&self) -> SdInstant;
}

/// SPI peripherals able to change their baud rate on the fly
pub trait SpiSpeed {
    fn set_speed(&mut self, speed: LinkSpeed);
}

/// [`SdLink`] over embedded-hal SPI and a chip select pin
pub struct HalLink<SPI, CS, CLK> {
    spi: SPI,
    cs: CS,
    clock: CLK,
}

impl<SPI, CS, CLK> HalLink<SPI, CS, CLK>
where
    SPI: Transfer<u8> + SpiSpeed,
    CS: OutputPin,
    CLK: LinkClock,
{
    pub fn new(spi: SPI, cs: CS, clock: CLK) -> Self {
        Self { spi, cs, clock }
    }

    /// Give back the peripherals
    pub fn free(self) -> (SPI, CS, CLK) {
        (self.spi, self.cs, self.clock)
    }
}

impl<SPI, CS, CLK> SdLink for HalLink<SPI, CS, CLK>
where
    SPI: Transfer<u8> + SpiSpeed,
    CS: OutputPin,
    CLK: LinkClock,
{
    fn exchange(&mut self, out: u8) -> SdResult<u8> {
        let mut word = [out];
        let received = self
            .spi
            .transfer(&mut word)
            .map_err(|_| SdError::Transport {})?;
        Ok(received[0])
    }

    fn select(&mut self) -> SdResult {
        self.cs.set_low().map_err(|_| SdError::Transport {})
    }

    fn deselect(&mut self) -> SdResult {
        self.cs.set_high().map_err(|_| SdError::Transport {})
    }

    fn set_speed(&mut self, speed: LinkSpeed) -> SdResult {
        self.spi.set_speed(speed);
        Ok(())
    }

    fn now(&mut self) -> SdInstant {
        self.clock.now()
    }
}
