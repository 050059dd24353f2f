use core::fmt::Debug;

use raw_nand::{
    poll_until, ChipGeometry, ColumnAddress, Command, ErrorType, PageIndex, PollOutcome, RawNand,
    PAGE_SHIFT_RANGE, SECTOR_SIZE,
};

use crate::{
    buffer::{StagingBuffer, CAPACITY},
    catalog::{lookup, ChipId, ChipParams, CHIP_TABLE},
    clock::{set_interface_clock, ClockControl},
    descriptor::{AuxCommand, CommandDescriptor, Operation},
    dma::{CacheMaintenance, Direction, DmaAdapter, DmaChannel},
    ecc::{self, EccReport},
    error::NfcError,
    regs::{
        ctl, ecc_ctl, st, Reg, Registers, TIMING_CFG_DEFAULT, TIMING_CTL_SERIAL_ACCESS,
        USER_DATA_COUNT,
    },
    NandConfig,
};

/// Latched target of a page program.
///
/// [Command::SeqIn] moves to [WriteState::Pending], [Command::PageProgram]
/// consumes it whether the program succeeds or not.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum WriteState {
    #[default]
    Idle,
    Pending {
        column: ColumnAddress,
        page: PageIndex,
    },
}

/// Chip found by [NandController::init]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ProbedChip {
    pub id: ChipId,
    pub params: &'static ChipParams,
    pub geometry: ChipGeometry,
}

/// Command protocol engine for the NAND flash controller.
///
/// Owns the register block, the DMA channel and the staging buffer. Exactly one
/// command is in flight at a time, every call returns after the controller is
/// done or a bounded wait gave up.
///
/// Page commands need a probed chip, call [NandController::init] first.
pub struct NandController<R, D, C> {
    regs: R,
    dma: DmaAdapter<D, C>,
    buffer: StagingBuffer,
    write_state: WriteState,
    config: NandConfig,
    chip: Option<ProbedChip>,
    last_ecc: Option<EccReport>,
}

// Manually implement Debug to skip the staging buffer contents
impl<R, D, C> Debug for NandController<R, D, C> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("NandController")
            .field("buffer", &self.buffer)
            .field("write_state", &self.write_state)
            .field("config", &self.config)
            .field("chip", &self.chip)
            .finish_non_exhaustive()
    }
}

impl<R: Registers, D: DmaChannel, C: CacheMaintenance> NandController<R, D, C> {
    pub fn new(regs: R, channel: D, cache: C, config: NandConfig) -> Self {
        NandController {
            regs,
            dma: DmaAdapter::with_budget(channel, cache, config.poll_budget),
            buffer: StagingBuffer::new(),
            write_state: WriteState::Idle,
            config,
            chip: None,
            last_ecc: None,
        }
    }

    /// Bring up the controller and identify the chip against [CHIP_TABLE]
    pub fn init<K: ClockControl>(&mut self, clock: &mut K) -> Result<ProbedChip, NfcError> {
        self.init_with_catalog(clock, CHIP_TABLE)
    }

    /// Bring up the controller and identify the chip against `table`.
    ///
    /// Probing runs at the configured safe clock. Once the chip is known the
    /// clock is raised to what the catalog allows, capped by the configuration,
    /// and the controller is set up for the chip's page size and ECC mode.
    pub fn init_with_catalog<K: ClockControl>(
        &mut self,
        clock: &mut K,
        table: &'static [ChipParams],
    ) -> Result<ProbedChip, NfcError> {
        self.chip = None;
        self.write_state = WriteState::Idle;
        self.buffer.set_len(CAPACITY)?;

        set_interface_clock(clock, self.config.initial_clock_hz);
        clock.configure_pins();

        self.regs.modify(Reg::Ctl, |v| v | ctl::RESET);
        let regs = &mut self.regs;
        if poll_until(self.config.poll_budget, || regs.read(Reg::Ctl) & ctl::RESET == 0)
            .is_timed_out()
        {
            warn!("Controller reset did not complete");
        }
        self.regs.write(Reg::Ctl, ctl::EN);
        self.regs.write(Reg::TimingCtl, TIMING_CTL_SERIAL_ACCESS);

        self.execute(&CommandDescriptor::reset())?;
        let id = self.read_id()?;
        debug!("NAND ID: {:?}", id.bytes());

        let params = match lookup(table, &id) {
            Some(params) => params,
            None => {
                error!("NAND chip {:?} not in catalog", id.bytes());
                return Err(NfcError::UnknownChip);
            }
        };
        if !PAGE_SHIFT_RANGE.contains(&params.page_shift) {
            error!("Page shift {} of {} out of range", params.page_shift, params.name);
            return Err(NfcError::UnknownChip);
        }
        let ecc_mode = params.ecc_mode().ok_or(NfcError::UnknownChip)?;
        let geometry = ChipGeometry::new(
            params.page_shift,
            self.config.pages_per_block,
            self.config.oob_size,
            self.config.block_count,
            ecc_mode,
            self.config.address_cycles,
        )
        .ok_or(NfcError::InvalidConfig)?;

        set_interface_clock(clock, params.clock_hz(self.config.max_clock_hz));

        // Interrupts off, pending flags cleared
        self.regs.write(Reg::Int, 0);
        let pending = self.regs.read(Reg::St);
        self.regs.write(Reg::St, pending);

        self.regs.modify(Reg::EccCtl, |v| {
            (v & !ecc_ctl::MODE) | ((ecc_mode.ordinal() as u32) << ecc_ctl::MODE_SHIFT)
        });
        self.regs.write(
            Reg::Ctl,
            ctl::EN | (((params.page_shift - 10) as u32 & 0xF) << ctl::PAGE_SIZE_SHIFT),
        );
        self.regs.write(Reg::TimingCfg, TIMING_CFG_DEFAULT);
        self.regs.write(Reg::SpareArea, geometry.page_size());
        self.regs.modify(Reg::EccCtl, |v| v & !ecc_ctl::RANDOM_EN);

        self.buffer
            .set_len(geometry.page_size() as usize + SECTOR_SIZE)?;
        self.last_ecc = None;

        let chip = ProbedChip {
            id,
            params,
            geometry,
        };
        info!(
            "Found {}: {} byte pages, {} pages per block, BCH{}",
            params.name,
            geometry.page_size(),
            geometry.pages_per_block(),
            ecc_mode.max_correctable()
        );
        self.chip = Some(chip);
        Ok(chip)
    }

    /// Issue read ID and collect the 8 ID bytes
    pub fn read_id(&mut self) -> Result<ChipId, NfcError> {
        self.execute(&CommandDescriptor::read_id())?;
        let mut bytes = [0; 8];
        self.buffer.read(&mut bytes)?;
        Ok(ChipId::new(bytes))
    }

    /// Geometry of the probed chip
    pub fn geometry(&self) -> Result<ChipGeometry, NfcError> {
        self.chip
            .map(|chip| chip.geometry)
            .ok_or(NfcError::NotProbed)
    }

    pub fn chip(&self) -> Option<&ProbedChip> {
        self.chip.as_ref()
    }

    pub fn write_state(&self) -> WriteState {
        self.write_state
    }

    /// ECC outcome of the last successful page read
    pub fn last_ecc_report(&self) -> Option<EccReport> {
        self.last_ecc
    }

    pub fn config(&self) -> &NandConfig {
        &self.config
    }

    pub fn buffer(&self) -> &StagingBuffer {
        &self.buffer
    }

    /// Give back the hardware resources
    pub fn release(self) -> (R, D, C) {
        let (channel, cache) = self.dma.release();
        (self.regs, channel, cache)
    }

    fn descriptor(&mut self, command: Command) -> Result<Option<CommandDescriptor>, NfcError> {
        let descriptor = match command {
            Command::Reset => CommandDescriptor::reset(),
            Command::ReadId => CommandDescriptor::read_id(),
            Command::ReadParam => CommandDescriptor::read_param(),
            Command::RandomDataOut { column } => {
                CommandDescriptor::random_data_out(column.into(), self.geometry()?.oob_size())
            }
            Command::ReadPage { column, page } => {
                CommandDescriptor::read_page(column.into(), page.as_u32(), &self.geometry()?)
            }
            Command::ReadOob { column, page } => {
                CommandDescriptor::read_oob(column.into(), page.as_u32(), &self.geometry()?)
            }
            Command::EraseSetup { page } => CommandDescriptor::erase_setup(page.as_u32()),
            Command::EraseConfirm => CommandDescriptor::erase_confirm(),
            Command::SeqIn { column, page } => {
                self.write_state = WriteState::Pending { column, page };
                self.buffer.reset_write();
                return Ok(None);
            }
            Command::PageProgram => {
                let (column, page) = match core::mem::take(&mut self.write_state) {
                    WriteState::Pending { column, page } => (column, page),
                    WriteState::Idle => {
                        error!("Page program without pending write");
                        return Err(NfcError::NoPendingWrite);
                    }
                };
                let geometry = self.geometry()?;
                match CommandDescriptor::program(column.into(), page.as_u32(), &geometry) {
                    Ok(descriptor) => descriptor,
                    Err(e) => {
                        error!("Program at unsupported column {} page {}", column, page);
                        return Err(e);
                    }
                }
            }
            Command::Status => CommandDescriptor::status(),
        };
        Ok(Some(descriptor))
    }

    /// Replay one descriptor onto the controller and wait for it
    fn execute(&mut self, descriptor: &CommandDescriptor) -> Result<(), NfcError> {
        trace!(
            "{:?} column {} row {}",
            descriptor.op,
            descriptor.column,
            descriptor.row
        );
        self.wait_cmd_fifo();
        // Data RAM on AHB unless a DMA transfer takes it over
        self.regs.modify(Reg::Ctl, |v| v & !ctl::RAM_METHOD);

        let page_size = self.chip.map_or(0, |chip| chip.geometry.page_size() as usize);
        let sectors = descriptor.sector_count.min(USER_DATA_COUNT as u32) as u8;
        if descriptor.op == Operation::PageProgram && descriptor.uses_user_data() {
            for sector in 0..sectors {
                let word = self.buffer.spare_word(page_size, sector as usize);
                self.regs.write(Reg::UserData(sector), word);
            }
        }

        if let Some(transfer) = descriptor.dma {
            self.regs.modify(Reg::Ctl, |v| v | ctl::RAM_METHOD);
            let port = self.regs.data_port();
            let memory = self.buffer.as_mut_ptr() as usize;
            match transfer.direction {
                Direction::ControllerToMemory => {
                    self.dma
                        .configure(transfer.direction, port, memory, transfer.len)
                }
                Direction::MemoryToController => {
                    self.dma
                        .configure(transfer.direction, memory, port, transfer.len)
                }
            }
        }

        match descriptor.aux {
            Some(AuxCommand::Read(value)) => self.regs.write(Reg::RcmdSet, value),
            Some(AuxCommand::Write(value)) => self.regs.write(Reg::WcmdSet, value),
            None => {}
        }
        if descriptor.address_cycles > 0 {
            let (low, high) = descriptor.address();
            self.regs.write(Reg::AddrLow, low);
            self.regs.write(Reg::AddrHigh, high);
        }
        if descriptor.byte_count > 0 {
            self.regs.write(Reg::Cnt, descriptor.byte_count);
        }
        if descriptor.sector_count > 0 {
            self.regs.write(Reg::SectorNum, descriptor.sector_count);
        }
        if descriptor.ecc {
            self.enable_ecc();
        }
        self.regs.write(Reg::Cmd, descriptor.command_word());

        let transferred = match descriptor.dma {
            Some(_) => self.dma.wait(),
            None => Ok(()),
        };
        if transferred.is_err() {
            error!("DMA for {:?} did not complete", descriptor.op);
        }
        self.wait_cmd_fifo();
        self.wait_cmd_finish();

        match descriptor.op {
            Operation::Reset => {
                self.wait_rb(0);
                self.wait_rb(1);
                self.select_rb(0);
            }
            Operation::ReadPage => {
                for sector in 0..sectors {
                    let word = self.regs.read(Reg::UserData(sector));
                    self.buffer.set_spare_word(page_size, sector as usize, word);
                }
            }
            _ => {}
        }
        if descriptor.reads_ram() {
            let regs = &mut self.regs;
            self.buffer
                .fill_with(descriptor.byte_count as usize, |offset| regs.read_ram(offset))?;
        }

        let ecc_status = if descriptor.ecc && descriptor.op == Operation::ReadPage {
            Some(self.ecc_status())
        } else {
            None
        };
        if descriptor.ecc {
            self.regs.modify(Reg::EccCtl, |v| v & !ecc_ctl::EN);
        }
        self.buffer.reset_read();
        transferred?;

        if let Some((status, counters)) = ecc_status {
            let mode = self.geometry()?.ecc_mode();
            let report = ecc::check(status, &counters, descriptor.sector_count, mode)?;
            self.last_ecc = Some(report);
        }
        Ok(())
    }

    fn ecc_status(&mut self) -> (u32, [u32; 4]) {
        let status = self.regs.read(Reg::EccSt);
        let mut counters = [0; 4];
        for (i, counter) in counters.iter_mut().enumerate() {
            *counter = self.regs.read(Reg::EccCnt(i as u8));
        }
        (status, counters)
    }

    /// Pipelined ECC, exceptions raised unless the randomizer is on
    fn enable_ecc(&mut self) {
        self.regs.modify(Reg::EccCtl, |v| {
            let v = v | ecc_ctl::PIPELINE | ecc_ctl::EN;
            if v & ecc_ctl::RANDOM_EN != 0 {
                v & !ecc_ctl::EXCEPTION
            } else {
                v | ecc_ctl::EXCEPTION
            }
        });
    }

    fn wait_cmd_fifo(&mut self) {
        let regs = &mut self.regs;
        if poll_until(self.config.poll_budget, || {
            regs.read(Reg::St) & st::CMD_FIFO_STATUS == 0
        })
        .is_timed_out()
        {
            warn!("Command FIFO stayed busy");
        }
    }

    fn wait_cmd_finish(&mut self) {
        let regs = &mut self.regs;
        match poll_until(self.config.poll_budget, || {
            regs.read(Reg::St) & st::CMD_INT_FLAG != 0
        }) {
            PollOutcome::Ready => self.regs.write(Reg::St, st::CMD_INT_FLAG),
            PollOutcome::TimedOut => warn!("Command did not finish"),
        }
    }

    fn select_rb(&mut self, channel: u8) {
        self.regs.modify(Reg::Ctl, |v| {
            (v & !ctl::RB_SEL) | (((channel & 0x1) as u32) << 3)
        });
    }

    fn rb_ready(&mut self, channel: u8) -> bool {
        self.regs.read(Reg::St) & (st::RB_STATE0 << (channel & 0x3)) != 0
    }

    /// Select ready/busy `channel` and wait for it. Running out of retries is only logged.
    fn wait_rb(&mut self, channel: u8) {
        self.select_rb(channel);
        let budget = self.config.poll_budget;
        if poll_until(budget, || self.rb_ready(channel)).is_timed_out() {
            warn!("Ready/busy {} stayed busy", channel);
        }
    }
}

impl<R, D, C> ErrorType for NandController<R, D, C> {
    type Error = NfcError;
}

impl<R: Registers, D: DmaChannel, C: CacheMaintenance> RawNand for NandController<R, D, C> {
    fn select_chip(&mut self, chip: u8) -> Result<(), Self::Error> {
        self.regs.modify(Reg::Ctl, |v| {
            (v & !ctl::CE_SEL) | (((chip & 0x7) as u32) << ctl::CE_SEL_SHIFT)
        });
        Ok(())
    }

    fn is_ready(&mut self) -> bool {
        self.rb_ready(0)
    }

    fn command(&mut self, command: Command) -> Result<(), Self::Error> {
        match self.descriptor(command)? {
            Some(descriptor) => self.execute(&descriptor),
            None => Ok(()),
        }
    }

    fn read_byte(&mut self) -> Result<u8, Self::Error> {
        self.buffer.read_byte()
    }

    fn read_buf(&mut self, buf: &mut [u8]) -> Result<(), Self::Error> {
        self.buffer.read(buf).inspect_err(|_| {
            error!(
                "Read of {} bytes at {} overruns the staging buffer",
                buf.len(),
                self.buffer.read_pos()
            )
        })
    }

    fn write_buf(&mut self, buf: &[u8]) -> Result<(), Self::Error> {
        self.buffer.write(buf).inspect_err(|_| {
            error!(
                "Write of {} bytes at {} overruns the staging buffer",
                buf.len(),
                self.buffer.write_pos()
            )
        })
    }

    fn wait_and_get_status(&mut self) -> Result<u8, Self::Error> {
        let budget = self.config.poll_budget;
        if poll_until(budget, || self.rb_ready(0)).is_timed_out() {
            warn!("Chip stayed busy");
        }
        self.command(Command::Status)?;
        self.read_byte()
    }
}
