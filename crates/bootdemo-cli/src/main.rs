use std::path::PathBuf;

use anyhow::Context;
use bootdemo_bios::{CIALLO, DemoConfig, HELLO_WORLD};
use bootdemo_emu::{EntryConvention, Machine, MachineConfig};
use clap::{ArgGroup, Parser};
use img::Image;

#[derive(Debug, Clone, Parser)]
#[command(version, about = "Build, inspect and run the boot sector demos")]
pub struct Args {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Debug, Clone, clap::Subcommand)]
pub enum Command {
    /// Writes the 512-byte image of a demo
    Build(BuildArgs),
    /// Checks an image and prints its layout
    Inspect(InspectArgs),
    /// Emulates an image and prints what it displayed
    Run(RunArgs),
}

impl Command {
    pub fn verbose(&self) -> bool {
        match self {
            Command::Build(args) => args.verbose,
            Command::Inspect(args) => args.verbose,
            Command::Run(args) => args.verbose,
        }
    }
}

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
pub enum Variant {
    /// Mode 0x13, teletype output, halt loop
    Ciallo,
    /// Write-string output, spin loop
    Hello,
}

impl Variant {
    fn demo(self) -> &'static DemoConfig {
        match self {
            Variant::Ciallo => &CIALLO,
            Variant::Hello => &HELLO_WORLD,
        }
    }
}

#[derive(Debug, Clone, Parser)]
pub struct BuildArgs {
    #[arg(value_enum)]
    variant: Variant,
    #[arg(short, long)]
    output: PathBuf,
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Debug, Clone, Parser)]
pub struct InspectArgs {
    input: PathBuf,
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Debug, Clone, Parser)]
#[command(group(ArgGroup::new("source").required(true).args(["input", "variant"])))]
pub struct RunArgs {
    /// An image file to run
    input: Option<PathBuf>,
    /// Build and run a demo without writing it out
    #[arg(long, value_enum)]
    variant: Option<Variant>,
    /// Number of instructions to run
    #[arg(long, default_value_t = 100_000)]
    steps: u64,
    /// Enter at 07C0:0000 instead of 0000:7C00
    #[arg(long)]
    segmented_entry: bool,
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    tracing_subscriber::fmt()
        .with_max_level(if args.cmd.verbose() {
            tracing::Level::TRACE
        } else {
            tracing::Level::WARN
        })
        .with_writer(std::io::stderr)
        .init();

    match args.cmd {
        Command::Build(args) => build(&args),
        Command::Inspect(args) => inspect(&args),
        Command::Run(args) => run(&args),
    }
}

fn build(args: &BuildArgs) -> anyhow::Result<()> {
    let demo = args.variant.demo();
    let image = Image::build(demo).with_context(|| format!("failed to build {}", demo.name))?;
    image
        .write_to_file(&args.output)
        .with_context(|| format!("failed to write {}", args.output.display()))?;
    println!(
        "{}: {} bytes of code, written to {}",
        demo.name,
        image.sector().code_len(),
        args.output.display()
    );
    Ok(())
}

fn inspect(args: &InspectArgs) -> anyhow::Result<()> {
    let image = Image::open(&args.input)
        .with_context(|| format!("{} is not a bootable sector", args.input.display()))?;
    let sector = image.sector();
    println!("size:      {} bytes", sector.as_bytes().len());
    println!("code:      {} bytes", sector.code_len());
    println!("free:      {} bytes", mbr::CODE_AREA - sector.code_len());
    println!("signature: {:#06x}", sector.signature());
    Ok(())
}

fn run(args: &RunArgs) -> anyhow::Result<()> {
    let image = match (&args.input, args.variant) {
        (Some(path), _) => Image::open(path)
            .with_context(|| format!("failed to load {}", path.display()))?,
        (None, Some(variant)) => Image::build(variant.demo())?,
        (None, None) => anyhow::bail!("either an image or --variant is required"),
    };
    let entry = if args.segmented_entry {
        EntryConvention::Segmented
    } else {
        EntryConvention::Flat
    };
    let mut machine = Machine::boot(image.sector(), MachineConfig::default().with_entry(entry))?;
    let report = machine
        .run(args.steps)
        .context("emulation stopped on an unsupported instruction")?;

    let fw = machine.firmware();
    println!("transcript: {:?}", String::from_utf8_lossy(fw.transcript()));
    println!("video mode: {:#04x}", fw.video_mode().0);
    println!("state:      {:?}", report.state);
    println!(
        "steps:      {} ({} halts, {} wakes)",
        report.steps, report.halts, report.wakes
    );
    println!("screen:\n{}", fw.screen_text());
    Ok(())
}
