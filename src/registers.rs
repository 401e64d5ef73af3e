//! Card registers read back during negotiation

/// Voltage code the card echoes in R7 when 2.7-3.6V is accepted
pub const SD_CIC_VOLTAGE_OK: u8 = 0x01;

/// Check pattern sent with CMD8 and echoed back in R7
pub const SD_CIC_CHECK_PATTERN: u8 = 0xAA;

/// Operation Conditions Register, as returned by CMD58 (R3)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SdOcr {
    pub ocr: u32,
}

impl SdOcr {
    /// Assemble the OCR from the four trailing R3 bytes
    pub fn from_bytes(bytes: [u8; 4]) -> Self {
        Self {
            ocr: u32::from_be_bytes(bytes),
        }
    }
    /// Returns the voltage window
    pub fn get_voltage_window(&self) -> u32 {
        self.ocr & 0xFF_FFFF
    }
    /// Returns true if the card is still powering up
    pub fn is_busy(&self) -> bool {
        (self.ocr & (1 << 31)) == 0
    }
    /// Returns true if the CCS bit is set, i.e. the card is block addressed
    pub fn ccs(&self) -> bool {
        (self.ocr & (1 << 30)) > 0
    }
}

/// Trailing bytes of the CMD8 response (R7)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SdCic {
    pub voltage: u8,
    pub check_pattern: u8,
}

impl SdCic {
    pub fn from_bytes(bytes: [u8; 4]) -> Self {
        Self {
            voltage: bytes[2] & 0x0F,
            check_pattern: bytes[3],
        }
    }

    /// True when the card accepted the host voltage and echoed the pattern
    pub fn is_valid(&self) -> bool {
        self.voltage == SD_CIC_VOLTAGE_OK && self.check_pattern == SD_CIC_CHECK_PATTERN
    }
}

/// Card-Specific Data register
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SdCsd {
    csd: [u8; 16],
}

impl SdCsd {
    pub fn new(csd: [u8; 16]) -> Self {
        Self { csd }
    }

    /// Extract bits `msb..=lsb`, numbered as in the physical layer
    /// specification (bit 127 is the top bit of the first byte)
    pub fn bits(&self, msb: u8, lsb: u8) -> u32 {
        let mut value = 0u32;
        for bit in (lsb..=msb).rev() {
            let byte = self.csd[usize::from((127 - bit) / 8)];
            value = (value << 1) | u32::from((byte >> (bit % 8)) & 1);
        }
        value
    }

    /// CSD_STRUCTURE [127:126]: 0 for v1.0, 1 for v2.0
    pub fn structure(&self) -> u8 {
        self.bits(127, 126) as u8
    }

    /// READ_BL_LEN [83:80]
    pub fn read_bl_len(&self) -> u8 {
        self.bits(83, 80) as u8
    }

    /// C_SIZE [73:62] in the v1.0 layout
    pub fn c_size_v1(&self) -> u32 {
        self.bits(73, 62)
    }

    /// C_SIZE_MULT [49:47]
    pub fn c_size_mult(&self) -> u8 {
        self.bits(49, 47) as u8
    }

    /// C_SIZE [69:48] in the v2.0 layout
    pub fn c_size_v2(&self) -> u32 {
        self.bits(69, 48)
    }

    /// Number of 512 byte sectors using the v1.0 formula:
    /// `(C_SIZE + 1) * 2^(C_SIZE_MULT + 2) * 2^READ_BL_LEN / 512`
    pub fn sectors_v1(&self) -> u32 {
        let shift = u32::from(self.c_size_mult()) + 2 + u32::from(self.read_bl_len());
        let blocks = u64::from(self.c_size_v1() + 1) << shift;
        (blocks >> 9).min(u64::from(u32::MAX)) as u32
    }

    /// Number of 512 byte sectors using the v2.0 formula:
    /// `(C_SIZE + 1) * 512KiB / 512`
    pub fn sectors_v2(&self) -> u32 {
        (self.c_size_v2() + 1).saturating_mul(1024)
    }
}
