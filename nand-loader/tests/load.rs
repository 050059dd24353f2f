use nand_controller::{
    sim::{EccFault, SimCache, SimChip, SimDma, SimRegisters, Simulator},
    NandController, NfcError,
};
use nand_loader::{
    image::{PackImage, PACK_MAGIC},
    ImageLoader, LoadMode, LoaderConfig, LoaderError,
};
use raw_nand::{ByteAddress, NandFlashError, NandFlashErrorKind};

// Adds logging to the test automatically
// control with RUST_LOG="LEVEL"
// requires --features log passed to cargo test
use test_log::test;

const BLOCK: usize = 64 * 2048;

/// Every byte depends on its offset, so shifted reads are caught
fn flash_pattern(len: usize) -> Vec<u8> {
    (0..len)
        .map(|i| ((i / 2048) as u8).wrapping_mul(31) ^ (i as u8))
        .collect()
}

fn flash(blocks: u32) -> (Simulator, Vec<u8>) {
    let sim = Simulator::new(SimChip::k9k8g08(blocks));
    let data = flash_pattern(blocks as usize * BLOCK);
    sim.fill(0, &data);
    (sim, data)
}

fn probe(sim: &Simulator, nand: &mut NandController<SimRegisters, SimDma, SimCache>) {
    nand.init(&mut sim.clock()).unwrap();
}

#[test]
fn bad_block_is_skipped() {
    let (sim, data) = flash(4);
    sim.mark_bad(1);
    let mut nand = sim.controller(sim.chip().config());
    probe(&sim, &mut nand);
    let geometry = nand.geometry().unwrap();

    let mut dst = vec![0; BLOCK * 5 / 2];
    let mut loader = ImageLoader::new(&mut nand, geometry, LoaderConfig::default());
    let report = loader.load(ByteAddress::new(0), &mut dst).unwrap();

    // Block 0, then one and a half blocks starting at block 2
    assert_eq!(&dst[..BLOCK], &data[..BLOCK]);
    assert_eq!(&dst[BLOCK..], &data[2 * BLOCK..2 * BLOCK + BLOCK * 3 / 2]);
    assert_eq!(report.blocks_skipped, 1);
    assert_eq!(report.pages_read, 64 + 96);
    assert_eq!(report.bytes_copied, dst.len());
    assert_eq!(report.end_offset, (BLOCK * 7 / 2) as u64);
    assert!(report.is_clean());
}

#[test]
fn clean_flash_reads_verbatim() {
    let (sim, data) = flash(4);
    let mut nand = sim.controller(sim.chip().config());
    probe(&sim, &mut nand);
    let geometry = nand.geometry().unwrap();

    let start = 5 * 2048;
    let mut dst = vec![0; BLOCK + 3000];
    let mut loader = ImageLoader::new(&mut nand, geometry, LoaderConfig::default());
    let report = loader.load(ByteAddress::new(start as u32), &mut dst).unwrap();

    assert_eq!(dst, &data[start..start + dst.len()]);
    assert_eq!(report.blocks_skipped, 0);
    assert_eq!(report.end_offset, (start + dst.len()) as u64);
}

#[test]
fn shifted_range_past_the_last_block_fails() {
    let (sim, _) = flash(3);
    sim.mark_bad(1);
    let mut nand = sim.controller(sim.chip().config());
    probe(&sim, &mut nand);
    let geometry = nand.geometry().unwrap();

    let mut dst = vec![0; BLOCK * 5 / 2];
    let mut loader = ImageLoader::new(&mut nand, geometry, LoaderConfig::default());
    let err = loader.load(ByteAddress::new(0), &mut dst).unwrap_err();
    assert_eq!(err, LoaderError::OutOfBounds);
    assert_eq!(err.kind(), NandFlashErrorKind::OutOfBounds);
}

#[test]
fn unaligned_offset_is_rejected() {
    let (sim, _) = flash(2);
    let mut nand = sim.controller(sim.chip().config());
    probe(&sim, &mut nand);
    let geometry = nand.geometry().unwrap();
    sim.clear_events();

    let mut dst = [0; 16];
    let mut loader = ImageLoader::new(&mut nand, geometry, LoaderConfig::default());
    assert_eq!(
        loader.load(ByteAddress::new(2048 + 512), &mut dst),
        Err(LoaderError::NotAligned)
    );
    assert!(sim.commands().is_empty());
}

#[test]
fn ecc_failure_depends_on_mode() {
    let (sim, data) = flash(2);
    sim.inject_ecc(3, EccFault::uncorrectable(0));
    let mut nand = sim.controller(sim.chip().config());
    probe(&sim, &mut nand);
    let geometry = nand.geometry().unwrap();
    let mut dst = vec![0; 8 * 2048];

    let strict = LoaderConfig {
        mode: LoadMode::Strict,
        ..Default::default()
    };
    let mut loader = ImageLoader::new(&mut nand, geometry, strict);
    assert_eq!(
        loader.load(ByteAddress::new(0), &mut dst),
        Err(LoaderError::Flash(NfcError::EccUncorrectable { sector: 0 }))
    );

    dst.fill(0);
    let mut loader = ImageLoader::new(&mut nand, geometry, LoaderConfig::default());
    let report = loader.load(ByteAddress::new(0), &mut dst).unwrap();
    assert_eq!(report.read_failures, 1);
    assert_eq!(report.bytes_copied, dst.len());
    // Pages around the failed one still arrive
    assert_eq!(&dst[..3 * 2048], &data[..3 * 2048]);
    assert_eq!(&dst[4 * 2048..], &data[4 * 2048..8 * 2048]);
}

#[test]
fn near_limit_pages_load_in_strict_mode() {
    let (sim, data) = flash(2);
    sim.inject_ecc(1, EccFault::bitflips(0, 15));
    let mut nand = sim.controller(sim.chip().config());
    probe(&sim, &mut nand);
    let geometry = nand.geometry().unwrap();

    let mut dst = vec![0; 4 * 2048];
    let strict = LoaderConfig {
        mode: LoadMode::Strict,
        ..Default::default()
    };
    let mut loader = ImageLoader::new(&mut nand, geometry, strict);
    let report = loader.load(ByteAddress::new(0), &mut dst).unwrap();
    assert!(report.is_clean());
    assert_eq!(dst, &data[..dst.len()]);
}

#[test]
fn stalled_dma_is_a_read_failure() {
    let (sim, _) = flash(2);
    let mut nand = sim.controller(nand_controller::NandConfig {
        poll_budget: 64,
        ..sim.chip().config()
    });
    probe(&sim, &mut nand);
    let geometry = nand.geometry().unwrap();
    sim.set_dma_stuck(true);

    let mut dst = vec![0; 2048];
    let strict = LoaderConfig {
        mode: LoadMode::Strict,
        ..Default::default()
    };
    let mut loader = ImageLoader::new(&mut nand, geometry, strict);
    // The marker read is the first DMA transfer
    assert_eq!(
        loader.load(ByteAddress::new(0), &mut dst),
        Err(LoaderError::Flash(NfcError::DmaFailure))
    );
}

#[test]
fn load_image_from_container() {
    let (sim, _) = flash(4);
    let payload: Vec<u8> = (0..5000u32).map(|i| (i % 251) as u8).collect();

    // Container header in page 0, payload in page 2 onwards
    let mut header = Vec::new();
    header.extend_from_slice(&PACK_MAGIC.to_le_bytes());
    header.extend_from_slice(&1u32.to_le_bytes());
    header.extend_from_slice(&0u32.to_le_bytes());
    for value in [2 * 2048u32, payload.len() as u32, 0x4000_0000, 0] {
        header.extend_from_slice(&value.to_le_bytes());
    }
    let mut name = [0u8; 32];
    name[..4].copy_from_slice(b"boot");
    header.extend_from_slice(&name);
    sim.fill(0, &header);
    sim.fill(2 * 2048, &payload);

    let mut nand = sim.controller(sim.chip().config());
    probe(&sim, &mut nand);
    let geometry = nand.geometry().unwrap();
    let mut loader = ImageLoader::new(&mut nand, geometry, LoaderConfig::default());

    let mut first_page = vec![0; 2048];
    loader.load(ByteAddress::new(0), &mut first_page).unwrap();
    let container = PackImage::parse(&first_page).unwrap();
    let entry = container.find("boot").unwrap();
    assert_eq!(entry.load_address, 0x4000_0000);

    let mut image = vec![0; entry.size as usize];
    loader
        .load(ByteAddress::new(entry.offset), &mut image)
        .unwrap();
    assert_eq!(image, payload);
}
