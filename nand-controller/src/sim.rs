//! Register level model of the controller for host tests.
//!
//! A [Simulator] holds one shared state behind `Rc<RefCell<_>>` and hands out the
//! four capabilities the engine needs: [SimRegisters], [SimDma], [SimCache] and
//! [SimClock]. Commands written to the command register are decoded against a
//! NAND array with per page spare bytes. DMA transfers really copy to and from
//! the staging buffer of the engine, using the addresses the engine gave the
//! channel.
//!
//! Faults can be injected: bad blocks, ECC errors per page, a DMA channel that
//! never finishes and a ready/busy line that never comes up.

use alloc::{collections::BTreeMap, rc::Rc, vec, vec::Vec};
use core::cell::RefCell;

use crate::{
    clock::{ClockControl, ClockDivider},
    dma::{CacheMaintenance, Direction, DmaChannel, DmaConfig, Endpoint},
    regs::{cmd, ctl, ecc_ctl, st, Reg, Registers, NFC_BASE, RAM0_SIZE, USER_DATA_COUNT},
    NandConfig, NandController,
};
use raw_nand::opcode;

/// Source clock reported by [SimClock]
pub const SIM_SOURCE_CLOCK_HZ: u32 = 384_000_000;

/// Status byte of a ready, writable chip that passed its last operation
pub const STATUS_READY: u8 = 0xE0;

/// Shape and identity of the simulated chip
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimChip {
    pub id: [u8; 8],
    pub page_shift: u8,
    pub pages_per_block: u32,
    pub block_count: u32,
    /// Physical spare bytes per page
    pub spare_size: usize,
}

impl SimChip {
    /// Samsung K9K8G08 with 2 KiB pages and 64 pages per block
    pub fn k9k8g08(block_count: u32) -> Self {
        SimChip {
            id: [0xEC, 0xD3, 0x51, 0x95, 0x58, 0x00, 0x00, 0x00],
            page_shift: 11,
            pages_per_block: 64,
            block_count,
            spare_size: 64,
        }
    }

    /// Samsung K9GBG08U0A with 8 KiB pages and BCH32
    pub fn k9gbg08(block_count: u32) -> Self {
        SimChip {
            id: [0xEC, 0xD7, 0x94, 0x7A, 0x54, 0x43, 0x00, 0x00],
            page_shift: 13,
            pages_per_block: 128,
            block_count,
            spare_size: 640,
        }
    }

    pub fn page_size(&self) -> usize {
        1 << self.page_shift
    }

    pub fn block_size(&self) -> usize {
        self.page_size() * self.pages_per_block as usize
    }

    pub fn page_count(&self) -> u32 {
        self.pages_per_block * self.block_count
    }

    /// Board configuration matching this chip
    pub fn config(&self) -> NandConfig {
        NandConfig {
            pages_per_block: self.pages_per_block,
            oob_size: self.spare_size as u16,
            block_count: self.block_count,
            ..NandConfig::DEFAULT
        }
    }
}

/// ECC result reported for every ECC read of a page
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EccFault {
    /// Uncorrectable sectors, one bit per sector
    pub uncorrectable: u16,
    /// Corrected bit count per sector
    pub bitflips: [u8; 16],
}

impl EccFault {
    pub fn uncorrectable(sector: u8) -> Self {
        EccFault {
            uncorrectable: 1 << sector,
            ..Default::default()
        }
    }

    pub fn bitflips(sector: u8, count: u8) -> Self {
        let mut fault = EccFault::default();
        fault.bitflips[sector as usize % 16] = count;
        fault
    }
}

/// Observable side effects, in order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimEvent {
    Clock(ClockDivider),
    Pins,
    ControllerReset,
    CacheFlush {
        addr: usize,
        len: usize,
    },
    DmaSetup(DmaConfig),
    DmaStart {
        source: usize,
        destination: usize,
        len: usize,
    },
    DmaDone,
    /// Value written to the command register
    Command(u32),
}

#[derive(Debug)]
enum PageIo {
    Read {
        page: u32,
        column: usize,
    },
    Program {
        page: u32,
        column: usize,
        ecc: bool,
        user_data: [u32; USER_DATA_COUNT as usize],
        sectors: usize,
    },
}

#[derive(Debug, Clone, Copy)]
struct DmaJob {
    config: Option<DmaConfig>,
    source: usize,
    destination: usize,
    len: usize,
}

#[derive(Debug)]
struct State {
    chip: SimChip,
    regs: [u32; 64],
    ram: [u8; RAM0_SIZE],
    main: Vec<u8>,
    spare: Vec<u8>,
    param_page: Vec<u8>,
    status: u8,
    /// Page held in the chip's data register
    cache_page: Option<u32>,
    erase_row: Option<u32>,
    rb_busy: [u32; 2],
    rb_stuck: bool,
    busy_polls: u32,
    dma_config: Option<DmaConfig>,
    dma_job: Option<DmaJob>,
    dma_stuck: bool,
    page_io: Option<PageIo>,
    ecc_faults: BTreeMap<u32, EccFault>,
    events: Vec<SimEvent>,
}

impl State {
    fn new(chip: SimChip) -> Self {
        let pages = chip.page_count() as usize;
        let mut param_page = vec![0; 1024];
        param_page[..4].copy_from_slice(b"ONFI");
        State {
            main: vec![0xFF; pages * chip.page_size()],
            spare: vec![0xFF; pages * chip.spare_size],
            chip,
            regs: [0; 64],
            ram: [0; RAM0_SIZE],
            param_page,
            status: STATUS_READY,
            cache_page: None,
            erase_row: None,
            rb_busy: [0; 2],
            rb_stuck: false,
            busy_polls: 2,
            dma_config: None,
            dma_job: None,
            dma_stuck: false,
            page_io: None,
            ecc_faults: BTreeMap::new(),
            events: Vec::new(),
        }
    }

    fn reg(&self, reg: Reg) -> u32 {
        self.regs[reg.offset() / 4]
    }

    fn set_reg(&mut self, reg: Reg, value: u32) {
        self.regs[reg.offset() / 4] = value;
    }

    fn read(&mut self, reg: Reg) -> u32 {
        match reg {
            Reg::St => self.read_status(),
            _ => self.reg(reg),
        }
    }

    fn read_status(&mut self) -> u32 {
        let mut value = self.reg(Reg::St) & !(st::RB_STATE0 | st::RB_STATE0 << 1);
        for (channel, busy) in self.rb_busy.iter_mut().enumerate() {
            if *busy > 0 {
                *busy -= 1;
            } else if !self.rb_stuck {
                value |= st::RB_STATE0 << channel;
            }
        }
        value
    }

    fn write(&mut self, reg: Reg, value: u32) {
        match reg {
            Reg::St => {
                let flags = self.reg(Reg::St) & !value;
                self.set_reg(Reg::St, flags);
            }
            Reg::Ctl if value & ctl::RESET != 0 => {
                self.regs = [0; 64];
                self.set_reg(Reg::Ctl, value & !ctl::RESET);
                self.events.push(SimEvent::ControllerReset);
            }
            Reg::Cmd => {
                self.set_reg(Reg::Cmd, value);
                self.events.push(SimEvent::Command(value));
                self.run_command(value);
                let flags = self.reg(Reg::St) | st::CMD_INT_FLAG;
                self.set_reg(Reg::St, flags);
            }
            _ => self.set_reg(reg, value),
        }
    }

    /// Column and row from the address registers for `cycles` address cycles
    fn address(&self, cycles: u32) -> (usize, u32) {
        let low = self.reg(Reg::AddrLow);
        let high = self.reg(Reg::AddrHigh);
        match cycles {
            1 => ((low & 0xFF) as usize, 0),
            2 => ((low & 0xFFFF) as usize, 0),
            3 => (0, low & 0xFF_FFFF),
            4 => ((low & 0xFFFF) as usize, low >> 16),
            5 => ((low & 0xFFFF) as usize, (low >> 16) | ((high & 0xFF) << 16)),
            _ => (0, 0),
        }
    }

    fn run_command(&mut self, word: u32) {
        let cycles = if word & cmd::SEND_ADR != 0 {
            ((word & cmd::ADR_NUM) >> cmd::ADR_NUM_SHIFT) + 1
        } else {
            0
        };
        let (column, row) = self.address(cycles);
        let count = (self.reg(Reg::Cnt) as usize).min(RAM0_SIZE);
        let page_command = word & cmd::TYPE == cmd::TYPE_PAGE;

        match (word & cmd::LOW_BYTE) as u8 {
            opcode::RESET => {
                self.cache_page = None;
                self.erase_row = None;
                self.rb_busy = [self.busy_polls; 2];
            }
            opcode::READ_ID => {
                let id = self.chip.id;
                self.fill_ram(&id, count);
            }
            opcode::READ_PARAM => {
                let page = self.param_page.clone();
                self.fill_ram(&page, count);
            }
            opcode::STATUS => {
                let status = [self.status];
                self.fill_ram(&status, count);
            }
            opcode::RANDOM_DATA_OUT => {
                let data = match self.cache_page {
                    Some(page) => self.page_register(page),
                    None => Vec::new(),
                };
                let data = data.get(column..).unwrap_or(&[]).to_vec();
                self.fill_ram(&data, count);
            }
            opcode::READ0 if page_command => {
                self.cache_page = Some(row);
                self.rb_busy[0] = self.busy_polls;
                let ecc = self.reg(Reg::EccCtl) & ecc_ctl::EN != 0;
                self.load_ecc_status(row, ecc);
                if ecc {
                    let sectors = (self.reg(Reg::SectorNum) as usize).min(USER_DATA_COUNT as usize);
                    for sector in 0..sectors {
                        let word = self.spare_word(row, sector);
                        self.set_reg(Reg::UserData(sector as u8), word);
                    }
                }
                self.page_io = Some(PageIo::Read { page: row, column });
            }
            opcode::SEQIN if page_command => {
                let mut user_data = [0; USER_DATA_COUNT as usize];
                for (i, word) in user_data.iter_mut().enumerate() {
                    *word = self.reg(Reg::UserData(i as u8));
                }
                self.page_io = Some(PageIo::Program {
                    page: row,
                    column,
                    ecc: self.reg(Reg::EccCtl) & ecc_ctl::EN != 0,
                    user_data,
                    sectors: self.reg(Reg::SectorNum) as usize,
                });
            }
            opcode::ERASE1 => self.erase_row = Some(row),
            opcode::ERASE2 => {
                if let Some(row) = self.erase_row.take() {
                    self.erase_block(row / self.chip.pages_per_block);
                    self.rb_busy[0] = self.busy_polls;
                }
            }
            _ => {}
        }
    }

    fn fill_ram(&mut self, data: &[u8], count: usize) {
        for (i, byte) in self.ram.iter_mut().take(count).enumerate() {
            *byte = data.get(i).copied().unwrap_or(0xFF);
        }
    }

    fn load_ecc_status(&mut self, page: u32, ecc: bool) {
        let fault = match self.ecc_faults.get(&page) {
            Some(fault) if ecc => *fault,
            _ => EccFault::default(),
        };
        self.set_reg(Reg::EccSt, fault.uncorrectable as u32);
        for (i, chunk) in fault.bitflips.chunks(4).enumerate() {
            let packed = u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
            self.set_reg(Reg::EccCnt(i as u8), packed);
        }
    }

    fn main_range(&self, page: u32) -> core::ops::Range<usize> {
        let size = self.chip.page_size();
        let start = page as usize * size;
        start..start + size
    }

    fn spare_range(&self, page: u32) -> core::ops::Range<usize> {
        let size = self.chip.spare_size;
        let start = page as usize * size;
        start..start + size
    }

    fn spare_word(&self, page: u32, sector: usize) -> u32 {
        let spare = self.spare.get(self.spare_range(page)).unwrap_or(&[]);
        let mut bytes = [0xFF; 4];
        for (i, byte) in bytes.iter_mut().enumerate() {
            if let Some(value) = spare.get(4 * sector + i) {
                *byte = *value;
            }
        }
        u32::from_le_bytes(bytes)
    }

    /// Main area followed by the spare area of `page`, padded with 0xFF past the spare bytes
    fn page_register(&self, page: u32) -> Vec<u8> {
        let mut data = vec![0xFF; self.chip.page_size() + 1024];
        if page < self.chip.page_count() {
            let size = self.chip.page_size();
            data[..size].copy_from_slice(&self.main[self.main_range(page)]);
            let spare = &self.spare[self.spare_range(page)];
            let len = spare.len().min(1024);
            data[size..size + len].copy_from_slice(&spare[..len]);
        }
        data
    }

    fn erase_block(&mut self, block: u32) {
        if block >= self.chip.block_count {
            return;
        }
        let first = block * self.chip.pages_per_block;
        for page in first..first + self.chip.pages_per_block {
            let main = self.main_range(page);
            self.main[main].fill(0xFF);
            let spare = self.spare_range(page);
            self.spare[spare].fill(0xFF);
        }
    }

    fn program(&mut self, io: &PageIo, data: &[u8]) {
        let PageIo::Program {
            page,
            column,
            ecc,
            user_data,
            sectors,
        } = io
        else {
            return;
        };
        if *page >= self.chip.page_count() {
            return;
        }
        let page_size = self.chip.page_size();
        if *column == 0 {
            let range = self.main_range(*page);
            for (cell, byte) in self.main[range].iter_mut().zip(data) {
                *cell &= *byte;
            }
            if *ecc {
                let range = self.spare_range(*page);
                let spare = &mut self.spare[range];
                for (sector, word) in user_data.iter().take(*sectors).enumerate() {
                    for (i, byte) in word.to_le_bytes().iter().enumerate() {
                        if let Some(cell) = spare.get_mut(4 * sector + i) {
                            *cell &= *byte;
                        }
                    }
                }
            }
        } else if *column >= page_size {
            let range = self.spare_range(*page);
            let offset = *column - page_size;
            let spare = &mut self.spare[range];
            for (cell, byte) in spare.iter_mut().skip(offset).zip(data) {
                *cell &= *byte;
            }
        }
    }

    /// Run the armed DMA job once the controller has a page command for it
    fn poll_dma(&mut self) -> bool {
        if self.dma_stuck {
            return true;
        }
        let Some(job) = self.dma_job else {
            return false;
        };
        let Some(io) = self.page_io.take() else {
            return true;
        };
        let direction = job.config.map(|config| {
            if config.source == Endpoint::NFC {
                Direction::ControllerToMemory
            } else {
                Direction::MemoryToController
            }
        });
        match (&io, direction) {
            (PageIo::Read { page, column }, Some(Direction::ControllerToMemory)) => {
                let register = self.page_register(*page);
                let mut data = vec![0xFF; job.len];
                for (i, byte) in data.iter_mut().enumerate() {
                    if let Some(value) = register.get(column + i) {
                        *byte = *value;
                    }
                }
                // SAFETY: the engine hands the channel its staging buffer, which
                // outlives the transfer and holds at least `len` bytes
                unsafe {
                    core::ptr::copy_nonoverlapping(data.as_ptr(), job.destination as *mut u8, job.len)
                };
            }
            (PageIo::Program { .. }, Some(Direction::MemoryToController)) => {
                // SAFETY: as above, the source is the engine's staging buffer
                let data =
                    unsafe { core::slice::from_raw_parts(job.source as *const u8, job.len) }.to_vec();
                self.program(&io, &data);
            }
            _ => {}
        }
        self.dma_job = None;
        self.events.push(SimEvent::DmaDone);
        false
    }
}

/// Simulated controller, NAND array, DMA channel and cache
#[derive(Debug, Clone)]
pub struct Simulator {
    state: Rc<RefCell<State>>,
}

impl Simulator {
    pub fn new(chip: SimChip) -> Self {
        Simulator {
            state: Rc::new(RefCell::new(State::new(chip))),
        }
    }

    pub fn registers(&self) -> SimRegisters {
        SimRegisters {
            state: self.state.clone(),
        }
    }

    pub fn dma(&self) -> SimDma {
        SimDma {
            state: self.state.clone(),
        }
    }

    pub fn cache(&self) -> SimCache {
        SimCache {
            state: self.state.clone(),
        }
    }

    pub fn clock(&self) -> SimClock {
        SimClock {
            state: self.state.clone(),
        }
    }

    /// Engine wired to this simulator, not yet initialised
    pub fn controller(&self, config: NandConfig) -> NandController<SimRegisters, SimDma, SimCache> {
        NandController::new(self.registers(), self.dma(), self.cache(), config)
    }

    pub fn chip(&self) -> SimChip {
        self.state.borrow().chip.clone()
    }

    /// Write a bad block marker into the first page of `block`
    pub fn mark_bad(&self, block: u32) {
        let mut state = self.state.borrow_mut();
        let page = block * state.chip.pages_per_block;
        if page < state.chip.page_count() {
            let start = state.spare_range(page).start;
            state.spare[start] = 0x00;
        }
    }

    pub fn inject_ecc(&self, page: u32, fault: EccFault) {
        self.state.borrow_mut().ecc_faults.insert(page, fault);
    }

    pub fn set_dma_stuck(&self, stuck: bool) {
        self.state.borrow_mut().dma_stuck = stuck;
    }

    pub fn set_rb_stuck(&self, stuck: bool) {
        self.state.borrow_mut().rb_stuck = stuck;
    }

    pub fn set_status(&self, status: u8) {
        self.state.borrow_mut().status = status;
    }

    /// Store `data` in the main areas starting at byte `offset`, ignoring spare areas
    pub fn fill(&self, offset: usize, data: &[u8]) {
        let mut state = self.state.borrow_mut();
        let end = (offset + data.len()).min(state.main.len());
        if offset < end {
            state.main[offset..end].copy_from_slice(&data[..end - offset]);
        }
    }

    /// Main area of `page`
    pub fn page(&self, page: u32) -> Vec<u8> {
        let state = self.state.borrow();
        state.main.get(state.main_range(page)).unwrap_or(&[]).to_vec()
    }

    /// Spare area of `page`
    pub fn spare(&self, page: u32) -> Vec<u8> {
        let state = self.state.borrow();
        state.spare.get(state.spare_range(page)).unwrap_or(&[]).to_vec()
    }

    pub fn set_spare(&self, page: u32, offset: usize, data: &[u8]) {
        let mut state = self.state.borrow_mut();
        let range = state.spare_range(page);
        if let Some(spare) = state.spare.get_mut(range) {
            for (cell, byte) in spare.iter_mut().skip(offset).zip(data) {
                *cell = *byte;
            }
        }
    }

    /// Current value of a register, without side effects
    pub fn reg(&self, reg: Reg) -> u32 {
        self.state.borrow().reg(reg)
    }

    pub fn events(&self) -> Vec<SimEvent> {
        self.state.borrow().events.clone()
    }

    pub fn clear_events(&self) {
        self.state.borrow_mut().events.clear();
    }

    /// Command register values written so far
    pub fn commands(&self) -> Vec<u32> {
        self.state
            .borrow()
            .events
            .iter()
            .filter_map(|event| match event {
                SimEvent::Command(word) => Some(*word),
                _ => None,
            })
            .collect()
    }
}

/// [Registers] of the simulated controller
#[derive(Debug, Clone)]
pub struct SimRegisters {
    state: Rc<RefCell<State>>,
}

impl Registers for SimRegisters {
    fn read(&mut self, reg: Reg) -> u32 {
        self.state.borrow_mut().read(reg)
    }

    fn write(&mut self, reg: Reg, value: u32) {
        self.state.borrow_mut().write(reg, value)
    }

    fn read_ram(&mut self, offset: usize) -> u8 {
        self.state.borrow().ram[offset % RAM0_SIZE]
    }

    fn data_port(&self) -> usize {
        NFC_BASE + Reg::IoData.offset()
    }
}

/// [DmaChannel] of the simulated system
#[derive(Debug, Clone)]
pub struct SimDma {
    state: Rc<RefCell<State>>,
}

impl DmaChannel for SimDma {
    fn setup(&mut self, config: &DmaConfig) {
        let mut state = self.state.borrow_mut();
        state.dma_config = Some(*config);
        state.events.push(SimEvent::DmaSetup(*config));
    }

    fn start(&mut self, source: usize, destination: usize, len: usize) {
        let mut state = self.state.borrow_mut();
        state.dma_job = Some(DmaJob {
            config: state.dma_config,
            source,
            destination,
            len,
        });
        state.events.push(SimEvent::DmaStart {
            source,
            destination,
            len,
        });
    }

    fn is_busy(&mut self) -> bool {
        self.state.borrow_mut().poll_dma()
    }
}

/// [CacheMaintenance] that records flushes
#[derive(Debug, Clone)]
pub struct SimCache {
    state: Rc<RefCell<State>>,
}

impl CacheMaintenance for SimCache {
    fn flush_range(&mut self, addr: usize, len: usize) {
        self.state
            .borrow_mut()
            .events
            .push(SimEvent::CacheFlush { addr, len });
    }
}

/// [ClockControl] that records divider changes
#[derive(Debug, Clone)]
pub struct SimClock {
    state: Rc<RefCell<State>>,
}

impl ClockControl for SimClock {
    fn source_clock_hz(&self) -> u32 {
        SIM_SOURCE_CLOCK_HZ
    }

    fn set_nand_divider(&mut self, divider: ClockDivider) {
        self.state.borrow_mut().events.push(SimEvent::Clock(divider));
    }

    fn configure_pins(&mut self) {
        self.state.borrow_mut().events.push(SimEvent::Pins);
    }
}
