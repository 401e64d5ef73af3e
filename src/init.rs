//! Card negotiation: from power-on to a classified, ready card

use crate::block::{SD_BLOCK_LEN, read_block};
use crate::command::{R1, SD_IF_COND_ARG, SdCmd};
use crate::config::SdConfig;
use crate::device::{Addressing, CardType};
use crate::errors::SdResult;
use crate::link::{Deadline, LinkSpeed, SdLink};
use crate::registers::{SdCic, SdCsd, SdOcr};
use crate::transport::{read_trailing, send_command, send_command_ext};
use log::{debug, trace, warn};

/// Idle bytes clocked with chip select high at power on, 80 clock pulses
pub const SD_POWER_ON_BYTES: usize = 10;

/// Size of the CSD register
pub const SD_CSD_LEN: usize = 16;

/// Negotiation states, visited in order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitState {
    PowerOn,
    SoftReset,
    VersionProbe,
    SdV2,
    SdV1OrMmc,
    Ready(CardType),
    Failed,
}

/// Drive one negotiation attempt through the state machine.
///
/// Returns the card type, [`CardType::Unknown`] when the attempt failed.
/// Chip select is left asserted; the caller releases the link.
pub fn negotiate<L: SdLink + ?Sized>(link: &mut L, config: &SdConfig) -> SdResult<CardType> {
    let mut state = InitState::PowerOn;
    loop {
        trace!("negotiation state {:?}", state);
        state = match state {
            InitState::PowerOn => {
                power_on(link)?;
                InitState::SoftReset
            }
            InitState::SoftReset => match soft_reset(link, config)? {
                true => InitState::VersionProbe,
                false => InitState::Failed,
            },
            InitState::VersionProbe => {
                let (r1, trailing) =
                    send_command_ext(link, SdCmd::SendIfCond(SD_IF_COND_ARG), config.cmd_timeout_ms)?;
                match (r1.is_idle(), trailing) {
                    (true, Some(r7)) if SdCic::from_bytes(r7).is_valid() => InitState::SdV2,
                    (true, _) => {
                        warn!("card rejected the host voltage: {:?}", trailing);
                        InitState::Failed
                    }
                    (false, _) => InitState::SdV1OrMmc,
                }
            }
            InitState::SdV2 => match sd_v2(link, config)? {
                CardType::Unknown => InitState::Failed,
                card_type => InitState::Ready(card_type),
            },
            InitState::SdV1OrMmc => match sd_v1_or_mmc(link, config)? {
                CardType::Unknown => InitState::Failed,
                card_type => InitState::Ready(card_type),
            },
            InitState::Ready(card_type) => {
                debug!("card ready: {:?}", card_type);
                return Ok(card_type);
            }
            InitState::Failed => return Ok(CardType::Unknown),
        };
    }
}

/// Slow clock and dummy clocks with chip select high so the card enters
/// native mode
fn power_on<L: SdLink + ?Sized>(link: &mut L) -> SdResult {
    link.deselect()?;
    link.set_speed(LinkSpeed::Low)?;
    for _ in 0..SD_POWER_ON_BYTES {
        link.receive()?;
    }
    // Extra margin before the first command
    link.deselect()?;
    for _ in 0..SD_POWER_ON_BYTES {
        link.receive()?;
    }
    Ok(())
}

/// CMD0 until the card reports idle; false if it never does
fn soft_reset<L: SdLink + ?Sized>(link: &mut L, config: &SdConfig) -> SdResult<bool> {
    let deadline = Deadline::arm(link, config.reset_timeout_ms);
    let mut r1 = R1::NO_RESPONSE;
    while !r1.is_idle() && deadline.is_active(link) {
        r1 = send_command(link, SdCmd::GoIdleState, config.cmd_timeout_ms)?;
    }

    if !r1.is_idle() {
        warn!("card never entered idle state, last R1 {:#04x}", r1.0);
        return Ok(false);
    }
    Ok(true)
}

/// Repeat `command` until the card leaves idle (R1 == 0) or `timeout_ms`
/// elapses. Returns the last R1.
fn leave_idle<L: SdLink + ?Sized>(link: &mut L, command: SdCmd, timeout_ms: u32, cmd_timeout_ms: u32) -> SdResult<R1> {
    let deadline = Deadline::arm(link, timeout_ms);
    let mut r1 = R1::NO_RESPONSE;
    while deadline.is_active(link) {
        r1 = send_command(link, command, cmd_timeout_ms)?;
        if r1.is_ready() {
            break;
        }
    }
    Ok(r1)
}

fn sd_v2<L: SdLink + ?Sized>(link: &mut L, config: &SdConfig) -> SdResult<CardType> {
    // Some cards need a second pass before they settle
    for pass in 0..2 {
        let r1 = leave_idle(link, SdCmd::SdAppOpCond(true), config.v2_ready_timeout_ms, config.cmd_timeout_ms)?;
        trace!("ACMD41 pass {} -> {:#04x}", pass, r1.0);
    }

    let r1 = send_command(link, SdCmd::ReadOcr, config.cmd_timeout_ms)?;
    if !r1.is_ready() {
        warn!("CMD58 failed: {:#04x}", r1.0);
        return Ok(CardType::Unknown);
    }

    let ocr = SdOcr::from_bytes(read_trailing(link)?);
    debug!("OCR {:#010x}", ocr.ocr);
    Ok(match ocr.ccs() {
        true => CardType::SdV2(Addressing::Block),
        false => CardType::SdV2(Addressing::Byte),
    })
}

fn sd_v1_or_mmc<L: SdLink + ?Sized>(link: &mut L, config: &SdConfig) -> SdResult<CardType> {
    let (mut card_type, command) =
        match send_command(link, SdCmd::SdAppOpCond(false), config.cmd_timeout_ms)?.is_ok_or_idle() {
            true => (CardType::SdV1, SdCmd::SdAppOpCond(false)),
            false => (CardType::Mmc, SdCmd::SendOpCond),
        };
    debug!("legacy card, probing as {:?}", card_type);

    let r1 = leave_idle(link, command, config.legacy_ready_timeout_ms, config.cmd_timeout_ms)?;
    if !r1.is_ready() {
        warn!("card never left idle state, last R1 {:#04x}", r1.0);
        card_type = CardType::Unknown;
    }

    let r1 = send_command(link, SdCmd::CrcOnOff(false), config.cmd_timeout_ms)?;
    if !r1.is_ready() {
        warn!("CMD59 failed: {:#04x}", r1.0);
        card_type = CardType::Unknown;
    }

    let r1 = send_command(link, SdCmd::SetBlockLen(SD_BLOCK_LEN as u32), config.cmd_timeout_ms)?;
    if !r1.is_ready() {
        warn!("CMD16 failed: {:#04x}", r1.0);
        card_type = CardType::Unknown;
    }

    Ok(card_type)
}

/// Read the CSD register. `None` if the card refused CMD9.
pub fn read_csd<L: SdLink + ?Sized>(link: &mut L, config: &SdConfig) -> SdResult<Option<SdCsd>> {
    let r1 = send_command(link, SdCmd::SendCsd, config.cmd_timeout_ms)?;
    if !r1.is_ready() {
        warn!("CMD9 failed: {:#04x}", r1.0);
        return Ok(None);
    }

    let mut csd = [0u8; SD_CSD_LEN];
    read_block(link, &mut csd, 0, SD_CSD_LEN, config.data_token_timeout_ms)?;
    Ok(Some(SdCsd::new(csd)))
}

/// Capacity in 512 byte sectors. Block addressed cards carry the size
/// directly in a v2.0 CSD; every other card uses the v1.0 formula.
pub fn sector_count(card_type: CardType, csd: &SdCsd) -> u32 {
    match card_type {
        CardType::SdV2(Addressing::Block) => csd.sectors_v2(),
        CardType::SdV2(Addressing::Byte) | CardType::SdV1 | CardType::Mmc => csd.sectors_v1(),
        CardType::Unknown => 0,
    }
}
