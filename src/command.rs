//! SPI-mode command set and R1 status decoding

/// Escape flag folded into the command code: send CMD55 first
pub const SD_ACMD_FLAG: u8 = 0x80;

/// Start bit (0) and transmission bit (1) heading every command frame
pub const SD_CMD_START: u8 = 0x40;

/// Placeholder CRC and stop bit for commands sent once CRC checking is off
pub const SD_DUMMY_CRC: u8 = 0x01;

/// Host Capacity Support bit of the ACMD41 argument
pub const SD_HCS: u32 = 1 << 30;

/// Argument of CMD8: 2.7-3.6V supply and the 0xAA check pattern
pub const SD_IF_COND_ARG: u32 = 0x1AA;

/// Length of a command frame on the wire
pub const SD_CMD_LEN: usize = 6;

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
/// Commands the SPI driver sends to the card
pub enum SdCmd {
    /// CMD0: GO_IDLE_STATE, software reset. R1.
    GoIdleState,
    /// CMD1: SEND_OP_COND, leave idle on MMC cards. R1.
    SendOpCond,
    /// CMD8: SEND_IF_COND, supply the argument (voltage and check
    /// pattern). R7.
    SendIfCond(u32),
    /// CMD9: SEND_CSD, followed by a 16 byte data block. R1.
    SendCsd,
    /// CMD16: SET_BLOCKLEN. R1.
    SetBlockLen(u32),
    /// CMD17: READ_SINGLE_BLOCK, supply the data address. R1.
    ReadSingleBlock(u32),
    /// CMD24: WRITE_BLOCK, supply the data address. R1.
    WriteBlock(u32),
    /// CMD55: APP_CMD, sent automatically before any ACMD. R1.
    AppCmd,
    /// CMD58: READ_OCR. R3.
    ReadOcr,
    /// CMD59: CRC_ON_OFF. R1.
    CrcOnOff(bool),
    /// ACMD41: SD_SEND_OP_COND, supply HCS. R1.
    SdAppOpCond(bool),
}

/// Response formats used in SPI mode
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum SdCmdResponseType {
    /// Single status byte
    R1,
    /// R1 followed by the OCR
    R3,
    /// R1 followed by the interface condition echo
    R7,
}

impl SdCmdResponseType {
    /// Number of bytes trailing the R1 byte
    pub fn trailing_len(&self) -> usize {
        match self {
            Self::R1 => 0,
            Self::R3 | Self::R7 => 4,
        }
    }
}

impl SdCmd {
    /// Command code: index in the low six bits, [`SD_ACMD_FLAG`] for ACMDs
    pub fn code(&self) -> u8 {
        match self {
            Self::GoIdleState => 0,
            Self::SendOpCond => 1,
            Self::SendIfCond(_) => 8,
            Self::SendCsd => 9,
            Self::SetBlockLen(_) => 16,
            Self::ReadSingleBlock(_) => 17,
            Self::WriteBlock(_) => 24,
            Self::AppCmd => 55,
            Self::ReadOcr => 58,
            Self::CrcOnOff(_) => 59,
            Self::SdAppOpCond(_) => SD_ACMD_FLAG | 41,
        }
    }

    #[inline]
    /// Get the index of a command
    pub fn index(&self) -> u8 {
        self.code() & 0x3F
    }

    #[inline]
    /// Returns true if a command is an app command
    pub fn is_acmd(&self) -> bool {
        (self.code() & SD_ACMD_FLAG) != 0
    }

    /// 32-bit argument of the command
    pub fn argument(&self) -> u32 {
        match self {
            Self::SetBlockLen(unsigned32)
            | Self::ReadSingleBlock(unsigned32)
            | Self::WriteBlock(unsigned32)
            | Self::SendIfCond(unsigned32) => *unsigned32,
            Self::CrcOnOff(enable) => u32::from(*enable),
            Self::SdAppOpCond(hcs) => match hcs {
                true => SD_HCS,
                false => 0,
            },
            Self::GoIdleState | Self::SendOpCond | Self::SendCsd | Self::AppCmd | Self::ReadOcr => 0,
        }
    }

    /// Get the response type of a command
    pub fn response_type(&self) -> SdCmdResponseType {
        match self {
            Self::SendIfCond(_) => SdCmdResponseType::R7,
            Self::ReadOcr => SdCmdResponseType::R3,
            _ => SdCmdResponseType::R1,
        }
    }

    /// Checksum byte. Only the commands sent before CRC checking is turned
    /// off carry a real CRC7, valid for the arguments used while negotiating.
    pub fn crc(&self) -> u8 {
        match self.code() {
            0 => 0x95,
            8 => 0x87,
            55 => 0x65,
            code if code == (SD_ACMD_FLAG | 41) => 0x77,
            _ => SD_DUMMY_CRC,
        }
    }

    /// Format the command as it goes on the wire
    pub fn format(&self) -> [u8; SD_CMD_LEN] {
        let arg = self.argument().to_be_bytes();
        [
            SD_CMD_START | self.index(),
            arg[0],
            arg[1],
            arg[2],
            arg[3],
            self.crc(),
        ]
    }
}

/// R1 status byte
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct R1(pub u8);

impl R1 {
    /// Value the transport reports when the card never answered
    pub const NO_RESPONSE: R1 = R1(0xFF);

    #[inline]
    /// Returns false while the card is still clocking out busy bytes
    pub fn is_response(&self) -> bool {
        (self.0 & 0x80) == 0
    }
    #[inline]
    /// Returns true if the response carries no flag at all
    pub fn is_ready(&self) -> bool {
        self.0 == 0
    }
    #[inline]
    /// Returns true if the card answered and the only flag is IN_IDLE_STATE
    pub fn is_idle(&self) -> bool {
        self.0 == 0x01
    }
    #[inline]
    /// Returns true if the response is ready or idle without errors
    pub fn is_ok_or_idle(&self) -> bool {
        self.0 <= 1
    }
    #[inline]
    /// Returns true if the ERASE_RESET bit is set
    pub fn erase_reset(&self) -> bool {
        self.is_response() && (self.0 & (1 << 1)) > 0
    }
    #[inline]
    /// Returns true if the ILLEGAL_COMMAND bit is set
    pub fn illegal_command(&self) -> bool {
        self.is_response() && (self.0 & (1 << 2)) > 0
    }
    #[inline]
    /// Returns true if the COM_CRC_ERROR bit is set
    pub fn com_crc_error(&self) -> bool {
        self.is_response() && (self.0 & (1 << 3)) > 0
    }
    #[inline]
    /// Returns true if the ERASE_SEQ_ERROR bit is set
    pub fn erase_seq_error(&self) -> bool {
        self.is_response() && (self.0 & (1 << 4)) > 0
    }
    #[inline]
    /// Returns true if the ADDRESS_ERROR bit is set
    pub fn address_error(&self) -> bool {
        self.is_response() && (self.0 & (1 << 5)) > 0
    }
    #[inline]
    /// Returns true if the PARAMETER_ERROR bit is set
    pub fn parameter_error(&self) -> bool {
        self.is_response() && (self.0 & (1 << 6)) > 0
    }
}
