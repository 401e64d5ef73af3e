//! Simulated card sitting at the far end of an [`SdLink`], for unit tests

use crate::errors::SdResult;
use crate::link::{LinkSpeed, SdInstant, SdLink};
use std::collections::{HashMap, HashSet, VecDeque};

/// Simulated time one byte exchange takes
pub const BYTE_TIME_US: u64 = 20;

/// Sectors every simulated card holds
pub const FAKE_SECTORS: u32 = 1024;

const CSD_V1: [u8; 16] = [
    0x00, 0x2D, 0x00, 0x32, 0x13, 0x59, 0x80, 0x3F, 0xC0, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
];
const CSD_V2: [u8; 16] = [
    0x40, 0x0E, 0x00, 0x32, 0x5B, 0x59, 0x00, 0x00, 0x00, 0x00, 0x7F, 0x80, 0x0A, 0x40, 0x00, 0x00,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FakeCardKind {
    SdV2Block,
    SdV2Byte,
    SdV1,
    Mmc,
    /// Nothing on the bus, every byte reads 0xFF
    Absent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataPhase {
    Idle,
    /// Fill bytes left before the start token
    ReadFill(usize),
    ReadData,
    WriteToken,
    WriteData,
    WriteResponse,
    /// Busy bytes left before the card releases the line
    Busy(u32),
}

pub struct FakeCard {
    kind: FakeCardKind,
    clock_us: u64,
    selected: bool,
    speed: LinkSpeed,
    idle: bool,
    app_cmd: bool,
    leave_idle_polls: u32,
    ready_after: u32,
    frame: Vec<u8>,
    tx: VecDeque<u8>,
    phase: DataPhase,
    read_buf: VecDeque<u8>,
    read_fill: usize,
    data_bytes_clocked: usize,
    write_buf: Vec<u8>,
    write_sector: Option<u32>,
    write_busy: u32,
    reject: Option<u8>,
    read_error: Option<u8>,
    refused: HashSet<u8>,
    check_pattern: Option<u8>,
    csd_data: bool,
    last_written: Option<[u8; 512]>,
    busy_polls: u32,
    sectors: HashMap<u32, [u8; 512]>,
    commands: Vec<u8>,
    sent: Vec<u8>,
    exchanges: usize,
    link_calls: usize,
}

impl FakeCard {
    pub fn new(kind: FakeCardKind) -> Self {
        Self {
            kind,
            clock_us: 0,
            selected: false,
            speed: LinkSpeed::High,
            idle: true,
            app_cmd: false,
            leave_idle_polls: 0,
            ready_after: 3,
            frame: Vec::new(),
            tx: VecDeque::new(),
            phase: DataPhase::Idle,
            read_buf: VecDeque::new(),
            read_fill: 3,
            data_bytes_clocked: 0,
            write_buf: Vec::new(),
            write_sector: None,
            write_busy: 2,
            reject: None,
            read_error: None,
            refused: HashSet::new(),
            check_pattern: None,
            csd_data: true,
            last_written: None,
            busy_polls: 0,
            sectors: HashMap::new(),
            commands: Vec::new(),
            sent: Vec::new(),
            exchanges: 0,
            link_calls: 0,
        }
    }

    /// Keep answering "idle" to every leave-idle command
    pub fn never_ready(mut self) -> Self {
        self.ready_after = u32::MAX;
        self
    }

    /// Fill bytes the card sends before each data start token
    pub fn with_read_fill(mut self, fill: usize) -> Self {
        self.read_fill = fill;
        self
    }

    /// Busy bytes the card sends after accepting each write
    pub fn with_write_busy(mut self, busy: u32) -> Self {
        self.write_busy = busy;
        self
    }

    /// Answer `cmd` as an illegal command
    pub fn refuse_cmd(mut self, cmd: u8) -> Self {
        self.refused.insert(cmd);
        self
    }

    /// Echo `pattern` in R7 instead of the check pattern the host sent
    pub fn with_echo_pattern(mut self, pattern: u8) -> Self {
        self.check_pattern = Some(pattern);
        self
    }

    /// Accept CMD9 but never send the CSD data packet
    pub fn without_csd_data(mut self) -> Self {
        self.csd_data = false;
        self
    }

    /// Stage a data packet: `fill` idle bytes, the start token, `data` and
    /// two CRC bytes
    pub fn queue_read(&mut self, data: &[u8], fill: usize) {
        self.read_buf = data.iter().copied().chain([0x12, 0x34]).collect();
        self.data_bytes_clocked = 0;
        self.phase = DataPhase::ReadFill(fill);
    }

    /// Expect a data block, then hold the line busy for `busy` bytes
    pub fn expect_write(&mut self, busy: u32) {
        self.write_busy = busy;
        self.write_buf.clear();
        self.phase = DataPhase::WriteToken;
    }

    /// Send the error `token` in place of every data start token
    pub fn fail_reads(&mut self, token: u8) {
        self.read_error = Some(token);
    }

    /// Answer every data block with `response` instead of "accepted"
    pub fn reject_writes(&mut self, response: u8) {
        self.reject = Some(response);
    }

    pub fn store(&mut self, sector: u32, data: [u8; 512]) {
        self.sectors.insert(sector, data);
    }

    pub fn sector(&self, sector: u32) -> [u8; 512] {
        self.sectors.get(&sector).copied().unwrap_or([0; 512])
    }

    pub fn clock_us(&self) -> u64 {
        self.clock_us
    }

    pub fn speed(&self) -> LinkSpeed {
        self.speed
    }

    pub fn is_selected(&self) -> bool {
        self.selected
    }

    pub fn commands(&self) -> &[u8] {
        &self.commands
    }

    pub fn sent_bytes(&self) -> &[u8] {
        &self.sent
    }

    pub fn exchanges(&self) -> usize {
        self.exchanges
    }

    pub fn link_calls(&self) -> usize {
        self.link_calls
    }

    pub fn data_phase(&self) -> DataPhase {
        self.phase
    }

    pub fn data_bytes_clocked(&self) -> usize {
        self.data_bytes_clocked
    }

    pub fn busy_polls(&self) -> u32 {
        self.busy_polls
    }

    pub fn last_written(&self) -> Option<[u8; 512]> {
        self.last_written
    }

    fn is_sd(&self) -> bool {
        matches!(
            self.kind,
            FakeCardKind::SdV2Block | FakeCardKind::SdV2Byte | FakeCardKind::SdV1
        )
    }

    fn sector_of(&self, arg: u32) -> Option<u32> {
        let sector = match self.kind {
            FakeCardKind::SdV2Block => arg,
            _ if arg % 512 != 0 => return None,
            _ => arg / 512,
        };
        (sector < FAKE_SECTORS).then_some(sector)
    }

    fn respond(&mut self, bytes: &[u8]) {
        self.tx.push_back(0xFF);
        self.tx.extend(bytes.iter().copied());
    }

    fn leave_idle(&mut self) {
        self.leave_idle_polls = self.leave_idle_polls.saturating_add(1);
        if self.leave_idle_polls >= self.ready_after {
            self.idle = false;
        }
    }

    fn handle_command(&mut self) {
        let cmd = self.frame[0] & 0x3F;
        let arg = u32::from_be_bytes([self.frame[1], self.frame[2], self.frame[3], self.frame[4]]);
        self.frame.clear();
        self.commands.push(cmd);

        if self.kind == FakeCardKind::Absent {
            return;
        }

        let app = core::mem::take(&mut self.app_cmd);
        let illegal = 0x04 | u8::from(self.idle);
        if self.refused.contains(&cmd) {
            self.respond(&[illegal]);
            return;
        }

        match cmd {
            0 => {
                self.idle = true;
                self.leave_idle_polls = 0;
                self.respond(&[0x01]);
            }
            1 if self.kind == FakeCardKind::Mmc => {
                self.leave_idle();
                self.respond(&[u8::from(self.idle)]);
            }
            8 if matches!(self.kind, FakeCardKind::SdV2Block | FakeCardKind::SdV2Byte) => {
                let pattern = self.check_pattern.unwrap_or(arg as u8);
                let echo = [0x00, 0x00, ((arg >> 8) & 0x0F) as u8, pattern];
                self.respond(&[u8::from(self.idle), echo[0], echo[1], echo[2], echo[3]]);
            }
            9 => {
                self.respond(&[u8::from(self.idle)]);
                let csd = match self.kind {
                    FakeCardKind::SdV2Block => CSD_V2,
                    _ => CSD_V1,
                };
                if self.csd_data {
                    self.queue_read(&csd, 2);
                }
            }
            16 | 59 => self.respond(&[u8::from(self.idle)]),
            17 if !self.idle => match self.sector_of(arg) {
                Some(sector) => {
                    self.respond(&[0x00]);
                    let data = self.sector(sector);
                    let fill = self.read_fill;
                    self.queue_read(&data, fill);
                }
                None => self.respond(&[0x40]),
            },
            24 if !self.idle => match self.sector_of(arg) {
                Some(sector) => {
                    self.respond(&[0x00]);
                    self.write_sector = Some(sector);
                    let busy = self.write_busy;
                    self.expect_write(busy);
                }
                None => self.respond(&[0x40]),
            },
            41 if app && self.is_sd() => {
                self.leave_idle();
                self.respond(&[u8::from(self.idle)]);
            }
            55 if self.is_sd() => {
                self.app_cmd = true;
                self.respond(&[u8::from(self.idle)]);
            }
            58 => {
                let mut ocr = [0x00, 0xFF, 0x80, 0x00];
                if !self.idle {
                    ocr[0] |= 0x80;
                    if self.kind == FakeCardKind::SdV2Block {
                        ocr[0] |= 0x40;
                    }
                }
                self.respond(&[u8::from(self.idle), ocr[0], ocr[1], ocr[2], ocr[3]]);
            }
            _ => self.respond(&[illegal]),
        }
    }

    fn clock_data(&mut self, out: u8) -> u8 {
        match self.phase {
            DataPhase::Idle => {
                if self.selected && (!self.frame.is_empty() || (out & 0xC0) == 0x40) {
                    self.frame.push(out);
                    if self.frame.len() == 6 {
                        self.handle_command();
                    }
                }
                0xFF
            }
            DataPhase::ReadFill(0) => match self.read_error {
                Some(token) => {
                    self.read_buf.clear();
                    self.phase = DataPhase::Idle;
                    token
                }
                None => {
                    self.phase = DataPhase::ReadData;
                    0xFE
                }
            },
            DataPhase::ReadFill(left) => {
                self.phase = DataPhase::ReadFill(left - 1);
                0xFF
            }
            DataPhase::ReadData => {
                let byte = self.read_buf.pop_front().unwrap_or(0xFF);
                self.data_bytes_clocked += 1;
                if self.read_buf.is_empty() {
                    self.phase = DataPhase::Idle;
                }
                byte
            }
            DataPhase::WriteToken => {
                if out == 0xFE {
                    self.write_buf.clear();
                    self.phase = DataPhase::WriteData;
                }
                0xFF
            }
            DataPhase::WriteData => {
                self.write_buf.push(out);
                if self.write_buf.len() == 512 + 2 {
                    self.phase = DataPhase::WriteResponse;
                }
                0xFF
            }
            DataPhase::WriteResponse => {
                if let Some(response) = self.reject {
                    self.phase = DataPhase::Idle;
                    self.write_sector = None;
                    return response;
                }
                let mut data = [0u8; 512];
                data.copy_from_slice(&self.write_buf[..512]);
                self.last_written = Some(data);
                if let Some(sector) = self.write_sector.take() {
                    self.sectors.insert(sector, data);
                }
                self.phase = DataPhase::Busy(self.write_busy);
                0xE5
            }
            DataPhase::Busy(left) => {
                self.busy_polls += 1;
                if left == 0 {
                    self.phase = DataPhase::Idle;
                    0xFF
                } else {
                    self.phase = DataPhase::Busy(left - 1);
                    0x00
                }
            }
        }
    }
}

impl SdLink for FakeCard {
    fn exchange(&mut self, out: u8) -> SdResult<u8> {
        self.link_calls += 1;
        self.exchanges += 1;
        self.clock_us += BYTE_TIME_US;
        self.sent.push(out);
        if self.selected {
            if let Some(byte) = self.tx.pop_front() {
                return Ok(byte);
            }
        }
        Ok(self.clock_data(out))
    }

    fn select(&mut self) -> SdResult {
        self.link_calls += 1;
        self.selected = true;
        Ok(())
    }

    fn deselect(&mut self) -> SdResult {
        self.link_calls += 1;
        self.selected = false;
        self.frame.clear();
        self.tx.clear();
        Ok(())
    }

    fn set_speed(&mut self, speed: LinkSpeed) -> SdResult {
        self.link_calls += 1;
        self.speed = speed;
        Ok(())
    }

    fn now(&mut self) -> SdInstant {
        SdInstant::from_ticks(self.clock_us)
    }
}
