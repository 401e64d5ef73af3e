//! Glue for the RP2040: SPI baud switching and the system timer as the link
//! clock

use crate::link::{HalLink, LinkClock, LinkSpeed, SdInstant, SpiSpeed};
use embedded_hal::blocking::spi::Transfer;
use fugit::{HertzU32, RateExtU32};
use log::debug;
use rp2040_hal::Timer;
use rp2040_hal::spi::{Enabled, Spi, SpiDevice, ValidSpiPinout};

/// SPI clock while negotiating, the card accepts 100-400kHz
pub const SD_SPI_INIT_HZ: u32 = 400_000;

/// SPI clock once the card is ready
pub const SD_SPI_FULL_HZ: u32 = 12_000_000;

/// An enabled 8 bit RP2040 SPI bus able to switch between the negotiation
/// and full speed clocks
pub struct PicoSpi<D: SpiDevice, P: ValidSpiPinout<D>> {
    spi: Spi<Enabled, D, P, 8>,
    /// Frequency of the peripheral clock feeding the SPI block
    peri_frequency: HertzU32,
    full_frequency: HertzU32,
}

impl<D: SpiDevice, P: ValidSpiPinout<D>> PicoSpi<D, P> {
    /// Take over an enabled bus and drop it to the negotiation clock
    pub fn new(mut spi: Spi<Enabled, D, P, 8>, peri_frequency: HertzU32) -> Self {
        spi.set_baudrate(peri_frequency, SD_SPI_INIT_HZ.Hz());
        Self {
            spi,
            peri_frequency,
            full_frequency: SD_SPI_FULL_HZ.Hz(),
        }
    }

    /// Use another clock once the card is ready
    pub fn with_full_frequency(mut self, full_frequency: HertzU32) -> Self {
        self.full_frequency = full_frequency;
        self
    }

    pub fn free(self) -> Spi<Enabled, D, P, 8> {
        self.spi
    }
}

impl<D: SpiDevice, P: ValidSpiPinout<D>> Transfer<u8> for PicoSpi<D, P>
where
    Spi<Enabled, D, P, 8>: Transfer<u8>,
{
    type Error = <Spi<Enabled, D, P, 8> as Transfer<u8>>::Error;

    #[inline]
    fn transfer<'w>(&mut self, words: &'w mut [u8]) -> Result<&'w [u8], Self::Error> {
        self.spi.transfer(words)
    }
}

impl<D: SpiDevice, P: ValidSpiPinout<D>> SpiSpeed for PicoSpi<D, P> {
    fn set_speed(&mut self, speed: LinkSpeed) {
        let baudrate = match speed {
            LinkSpeed::Low => SD_SPI_INIT_HZ.Hz(),
            LinkSpeed::High => self.full_frequency,
        };
        let actual = self.spi.set_baudrate(self.peri_frequency, baudrate);
        debug!("SPI clock set to {}Hz", actual.to_Hz());
    }
}

impl LinkClock for Timer {
    #[inline]
    fn now(&self) -> SdInstant {
        self.get_counter()
    }
}

/// Link over an RP2040 SPI bus, a GPIO chip select and the system timer
pub type PicoLink<D, P, CS> = HalLink<PicoSpi<D, P>, CS, Timer>;
