//! Timing and retry knobs of the SPI driver

use crate::block::{SD_READ_TOKEN_TIMEOUT_MS, SD_WRITE_TIMEOUT_MS};
use crate::transport::SD_CMD_TIMEOUT_MS;

/// Negotiation attempts before giving up
pub const SD_INIT_TRIES: u8 = 1;

/// Time the card gets to answer CMD0 with "idle", in milliseconds
pub const SD_RESET_TIMEOUT_MS: u32 = 500;

/// Time an SD v2 card gets to leave idle, per pass, in milliseconds
pub const SD_V2_READY_TIMEOUT_MS: u32 = 1_000;

/// Time an SD v1 or MMC card gets to leave idle, in milliseconds
pub const SD_LEGACY_READY_TIMEOUT_MS: u32 = 250;

/// Deadlines (milliseconds) and retry budget used by [`crate::sdspi::SdSpi`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SdConfig {
    pub init_attempts: u8,
    pub cmd_timeout_ms: u32,
    pub reset_timeout_ms: u32,
    pub v2_ready_timeout_ms: u32,
    pub legacy_ready_timeout_ms: u32,
    pub data_token_timeout_ms: u32,
    pub write_timeout_ms: u32,
}

impl Default for SdConfig {
    fn default() -> Self {
        Self {
            init_attempts: SD_INIT_TRIES,
            cmd_timeout_ms: SD_CMD_TIMEOUT_MS,
            reset_timeout_ms: SD_RESET_TIMEOUT_MS,
            v2_ready_timeout_ms: SD_V2_READY_TIMEOUT_MS,
            legacy_ready_timeout_ms: SD_LEGACY_READY_TIMEOUT_MS,
            data_token_timeout_ms: SD_READ_TOKEN_TIMEOUT_MS,
            write_timeout_ms: SD_WRITE_TIMEOUT_MS,
        }
    }
}

impl SdConfig {
    /// Same defaults with a different negotiation budget (at least one)
    pub fn with_init_attempts(mut self, attempts: u8) -> Self {
        self.init_attempts = attempts.max(1);
        self
    }
}
