use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use cleo_script::asm::{self, Arity, Instr};
use cleo_script::{opcode, BridgeConfig};

mod demo;
mod operand;

use operand::{parse_hex, parse_operand};

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// TOML file with bridge settings.
    #[clap(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Assemble one instruction and print its bytes.
    Asm {
        /// `0x00bb`, `00bb` or decimal.
        opcode: String,
        /// `i:3000`, `f:1.5`, `s:KEY`, `l:10`, `g:0x10`.
        operands: Vec<String>,
        /// Invert the condition result.
        #[clap(long)]
        not: bool,
    },
    /// Decode instructions from hex.
    Disasm {
        hex: String,
        /// Arguments per instruction. Omit for variadic (0x00-terminated) lists.
        #[clap(short, long)]
        arity: Option<usize>,
    },
    /// Run the sample message script against the in-memory host.
    Demo {
        /// Multiplier for every wait and display time.
        #[clap(long, default_value_t = 1.0)]
        time_scale: f32,
        /// Preload display strings from an FXT file.
        #[clap(long)]
        fxt: Option<PathBuf>,
    },
}

fn assemble(op: &str, operands: &[String], not: bool) -> Result<()> {
    let Some(code) = opcode::parse(op) else {
        bail!("invalid opcode {op:?}");
    };
    let args = operands
        .iter()
        .map(|s| parse_operand(s))
        .collect::<Result<Vec<_>>>()?;

    let mut instr = Instr::new(code, args);
    if not {
        instr = instr.inverted();
    }
    let bytes = instr.to_bytes()?;

    log::debug!("{}", instr);
    println!("{}", asm::hex(&bytes));
    Ok(())
}

fn disassemble(hex: &str, arity: Option<usize>) -> Result<()> {
    let bytes = parse_hex(hex)?;
    let arity = arity.map_or(Arity::Variadic, Arity::Fixed);

    for instr in asm::disassemble(&bytes, |_| Some(arity))? {
        println!("{}", instr);
    }
    Ok(())
}

fn load_config(path: Option<&PathBuf>) -> Result<BridgeConfig> {
    match path {
        Some(path) => BridgeConfig::load(path)
            .with_context(|| format!("failed to load config {}", path.display())),
        None => Ok(BridgeConfig::default()),
    }
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();
    let config = load_config(args.config.as_ref())?;

    match args.command {
        Command::Asm {
            opcode,
            operands,
            not,
        } => assemble(&opcode, &operands, not),
        Command::Disasm { hex, arity } => disassemble(&hex, arity),
        Command::Demo { time_scale, fxt } => demo::run(&config, time_scale, fxt.as_deref()),
    }
}
