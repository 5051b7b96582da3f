use anyhow::{bail, Context, Result};
use dotmatrix_core::GameBoy;

const DEFAULT_INSTRUCTION_BUDGET: u64 = 10_000_000;

fn main() -> Result<()> {
    env_logger::init();

    let mut args = std::env::args().skip(1);
    let rom_path = match args.next() {
        Some(path) => path,
        None => {
            eprintln!("Usage: dotmatrix <rom.gb> [instruction-budget]");
            std::process::exit(1);
        }
    };
    let budget = match args.next() {
        Some(raw) => raw
            .parse::<u64>()
            .with_context(|| format!("invalid instruction budget '{}'", raw))?,
        None => DEFAULT_INSTRUCTION_BUDGET,
    };

    let rom = std::fs::read(&rom_path)
        .with_context(|| format!("failed to read ROM file '{}'", rom_path))?;
    if rom.is_empty() {
        bail!("ROM file '{}' is empty", rom_path);
    }

    log::info!("loaded '{}' ({} bytes)", rom_path, rom.len());

    let mut gb = GameBoy::from_image(rom)
        .with_context(|| format!("failed to load cartridge '{}'", rom_path))?;

    let cycles = gb.run(budget);

    println!(
        "executed {} instructions ({} cycles)",
        gb.cpu.instruction_count(),
        cycles
    );
    println!(
        "af={:04X} bc={:04X} de={:04X} hl={:04X} sp={:04X} pc={:04X} halted={} ime={}",
        gb.cpu.regs.af(),
        gb.cpu.regs.bc(),
        gb.cpu.regs.de(),
        gb.cpu.regs.hl(),
        gb.cpu.regs.sp,
        gb.cpu.regs.pc,
        gb.cpu.halted,
        gb.cpu.ime,
    );

    Ok(())
}
