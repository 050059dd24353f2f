//! Dedicated DMA channel between the controller data port and memory.

use crate::error::NfcError;
use raw_nand::{poll_until, DEFAULT_POLL_BUDGET};

/// Memory above this mask is DRAM, below it on-chip SRAM
pub const DRAM_ADDRESS_MASK: usize = 0xC000_0000;

/// Block and commit counters used for every transfer
pub const COMMIT_BLOCK_COUNT: u32 = 0x7F07_7F07;

/// Direction of a transfer, seen from the flash
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Direction {
    /// Read: controller data port to memory
    ControllerToMemory,
    /// Program: memory to controller data port
    MemoryToController,
}

/// DRQ source or destination type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum DrqType {
    Nfc,
    Sdram,
    Sram,
}

impl DrqType {
    /// DRQ type for a memory address
    pub const fn for_memory(addr: usize) -> Self {
        if addr & DRAM_ADDRESS_MASK != 0 {
            DrqType::Sdram
        } else {
            DrqType::Sram
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum AddressMode {
    /// Address increments after each beat
    Linear,
    /// Address stays on a device port
    Io,
}

/// Beats per burst. The data port is only ever driven in 4 beat bursts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Burst {
    Four,
}

/// Width of one beat. Both sides move whole words.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum DataWidth {
    Bits32,
}

/// One side of a transfer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Endpoint {
    pub drq: DrqType,
    pub mode: AddressMode,
    pub burst: Burst,
    pub width: DataWidth,
}

impl Endpoint {
    /// The controller data port
    pub const NFC: Endpoint = Endpoint {
        drq: DrqType::Nfc,
        mode: AddressMode::Io,
        burst: Burst::Four,
        width: DataWidth::Bits32,
    };

    /// Memory at `addr`
    pub const fn memory(addr: usize) -> Self {
        Endpoint {
            drq: DrqType::for_memory(addr),
            mode: AddressMode::Linear,
            burst: Burst::Four,
            width: DataWidth::Bits32,
        }
    }
}

/// Channel settings for one transfer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DmaConfig {
    pub source: Endpoint,
    pub destination: Endpoint,
    /// Wait one DMA clock between bursts
    pub wait_state: u8,
    pub continuous: bool,
    pub commit_block_count: u32,
}

impl DmaConfig {
    /// Settings for a transfer in `direction` where `memory` is the memory side address
    pub const fn for_transfer(direction: Direction, memory: usize) -> Self {
        let (source, destination) = match direction {
            Direction::ControllerToMemory => (Endpoint::NFC, Endpoint::memory(memory)),
            Direction::MemoryToController => (Endpoint::memory(memory), Endpoint::NFC),
        };
        DmaConfig {
            source,
            destination,
            wait_state: 1,
            continuous: false,
            commit_block_count: COMMIT_BLOCK_COUNT,
        }
    }
}

/// A dedicated DMA channel owned by the controller
pub trait DmaChannel {
    /// Program the channel configuration
    fn setup(&mut self, config: &DmaConfig);

    /// Start a transfer of `len` bytes
    fn start(&mut self, source: usize, destination: usize, len: usize);

    /// Whether the last started transfer is still running
    fn is_busy(&mut self) -> bool;
}

/// Data cache maintenance for the memory side of a transfer
pub trait CacheMaintenance {
    /// Write back and invalidate the lines covering `addr..addr + len`
    fn flush_range(&mut self, addr: usize, len: usize);
}

/// Memory side of a transfer
const fn memory_side(direction: Direction, source: usize, destination: usize) -> usize {
    match direction {
        Direction::ControllerToMemory => destination,
        Direction::MemoryToController => source,
    }
}

/// Arms transfers on a [DmaChannel], keeping the cache coherent
#[derive(Debug)]
pub struct DmaAdapter<D, C> {
    channel: D,
    cache: C,
    budget: u32,
}

impl<D: DmaChannel, C: CacheMaintenance> DmaAdapter<D, C> {
    pub fn new(channel: D, cache: C) -> Self {
        Self::with_budget(channel, cache, DEFAULT_POLL_BUDGET)
    }

    pub fn with_budget(channel: D, cache: C, budget: u32) -> Self {
        DmaAdapter {
            channel,
            cache,
            budget,
        }
    }

    /// Configure and start a transfer.
    ///
    /// The memory side range is flushed from the cache before the channel is started.
    pub fn configure(&mut self, direction: Direction, source: usize, destination: usize, len: usize) {
        let memory = memory_side(direction, source, destination);
        let config = DmaConfig::for_transfer(direction, memory);
        self.channel.setup(&config);
        self.cache.flush_range(memory, len);
        trace!(
            "DMA {:?}: {:#x} -> {:#x}, {} bytes",
            direction,
            source,
            destination,
            len
        );
        self.channel.start(source, destination, len);
    }

    /// Wait for the running transfer
    pub fn wait(&mut self) -> Result<(), NfcError> {
        let channel = &mut self.channel;
        poll_until(self.budget, || !channel.is_busy()).ready_or(NfcError::DmaFailure)
    }

    pub fn channel(&self) -> &D {
        &self.channel
    }

    pub fn cache(&self) -> &C {
        &self.cache
    }

    pub fn release(self) -> (D, C) {
        (self.channel, self.cache)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{cell::RefCell, rc::Rc, vec::Vec};

    // Adds logging to the test automatically
    // control with RUST_LOG="LEVEL"
    // requires --features log passed to cargo test
    use test_log::test;

    #[derive(Debug, PartialEq)]
    enum Event {
        Setup(DmaConfig),
        Flush(usize, usize),
        Start(usize, usize, usize),
    }

    type Log = Rc<RefCell<Vec<Event>>>;

    struct FakeChannel {
        log: Log,
        busy_polls: u32,
    }

    impl DmaChannel for FakeChannel {
        fn setup(&mut self, config: &DmaConfig) {
            self.log.borrow_mut().push(Event::Setup(*config));
        }

        fn start(&mut self, source: usize, destination: usize, len: usize) {
            self.log.borrow_mut().push(Event::Start(source, destination, len));
        }

        fn is_busy(&mut self) -> bool {
            if self.busy_polls == 0 {
                false
            } else {
                self.busy_polls -= 1;
                true
            }
        }
    }

    struct FakeCache {
        log: Log,
    }

    impl CacheMaintenance for FakeCache {
        fn flush_range(&mut self, addr: usize, len: usize) {
            self.log.borrow_mut().push(Event::Flush(addr, len));
        }
    }

    fn adapter(busy_polls: u32, budget: u32) -> (DmaAdapter<FakeChannel, FakeCache>, Log) {
        let log: Log = Default::default();
        let adapter = DmaAdapter::with_budget(
            FakeChannel {
                log: log.clone(),
                busy_polls,
            },
            FakeCache { log: log.clone() },
            budget,
        );
        (adapter, log)
    }

    #[test]
    fn drq_type_follows_address() {
        assert_eq!(DrqType::for_memory(0x4200_0000), DrqType::Sdram);
        assert_eq!(DrqType::for_memory(0x8000_0000), DrqType::Sdram);
        assert_eq!(DrqType::for_memory(0x0000_4000), DrqType::Sram);
    }

    #[test]
    fn endpoints_per_direction() {
        let read = DmaConfig::for_transfer(Direction::ControllerToMemory, 0x4200_0000);
        let write = DmaConfig::for_transfer(Direction::MemoryToController, 0x0000_8000);
        assert_eq!(read.source, write.destination);
        assert_eq!(read.source.mode, AddressMode::Io);
        assert_eq!(read.destination.mode, AddressMode::Linear);
        assert_eq!(write.source.drq, DrqType::Sram);
        for endpoint in [read.source, read.destination, write.source, write.destination] {
            assert_eq!(endpoint.burst, Burst::Four);
            assert_eq!(endpoint.width, DataWidth::Bits32);
        }
    }

    #[test]
    fn read_flushes_destination_before_start() {
        let (mut dma, log) = adapter(0, 16);
        dma.configure(Direction::ControllerToMemory, 0x01C0_3030, 0x4200_0000, 2048);
        let log = log.borrow();
        assert_eq!(
            log[0],
            Event::Setup(DmaConfig {
                source: Endpoint::NFC,
                destination: Endpoint {
                    drq: DrqType::Sdram,
                    mode: AddressMode::Linear,
                    burst: Burst::Four,
                    width: DataWidth::Bits32,
                },
                wait_state: 1,
                continuous: false,
                commit_block_count: 0x7F07_7F07,
            })
        );
        assert_eq!(log[1], Event::Flush(0x4200_0000, 2048));
        assert_eq!(log[2], Event::Start(0x01C0_3030, 0x4200_0000, 2048));
    }

    #[test]
    fn write_flushes_source() {
        let (mut dma, log) = adapter(0, 16);
        dma.configure(Direction::MemoryToController, 0x0000_8000, 0x01C0_3030, 1024);
        let log = log.borrow();
        match &log[0] {
            Event::Setup(config) => {
                assert_eq!(config.source.drq, DrqType::Sram);
                assert_eq!(config.destination, Endpoint::NFC);
            }
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(log[1], Event::Flush(0x0000_8000, 1024));
    }

    #[test]
    fn wait_completes() {
        let (mut dma, _) = adapter(10, 16);
        assert_eq!(dma.wait(), Ok(()));
    }

    #[test]
    fn stuck_channel_fails() {
        let (mut dma, _) = adapter(u32::MAX, 16);
        assert_eq!(dma.wait(), Err(NfcError::DmaFailure));
    }
}
