//! Register Allocator Driver
//!
//! Loads a function and a target description (JSON), runs one allocator
//! variant over it and prints or writes the result. Also exports
//! interference graphs for external vertex-cover solvers and picks the best
//! variant for a unit from earlier run reports.

use clap::{Parser, Subcommand};
use log::info;
use ra_alloc::coloring::{FileCover, InterferenceGraph};
use ra_alloc::live::LiveIntervals;
use ra_alloc::oracle::FileOracle;
use ra_alloc::select::FileReports;
use ra_alloc::{run, select_variant, AllocConfig, AllocSession, Allocator, AllocatorKind, Function, TargetInfo};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "ra")]
#[command(about = "Register allocator")]
#[command(version = "0.1.0")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Allocate registers for one function
    Allocate {
        /// Function description (JSON)
        input: PathBuf,

        /// Target description (JSON); defaults to a uniform target
        #[arg(short, long)]
        target: Option<PathBuf>,

        /// Number of registers of the uniform target
        #[arg(long, default_value_t = 8)]
        regs: u16,

        /// Allocation config (JSON)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Overrides the variant of the config
        #[arg(long)]
        variant: Option<AllocatorKind>,

        /// Directory of `<unit>.cover.<n>` files for the coloring variant
        #[arg(long)]
        covers: Option<PathBuf>,

        /// Directory of `<unit>.txt` round-limit files
        #[arg(long)]
        oracle: Option<PathBuf>,

        /// Directory to write the `<unit>.<variant>.txt` run report to
        #[arg(long)]
        reports: Option<PathBuf>,

        /// Write the full result as JSON
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Export the interference graph of a function
    Graph {
        input: PathBuf,

        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Pick the variant with the best recorded cost for a unit
    Select {
        unit: String,

        /// Directory holding the run reports
        #[arg(long)]
        reports: PathBuf,
    },
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Allocate {
            input,
            target,
            regs,
            config,
            variant,
            covers,
            oracle,
            reports,
            output,
        } => {
            let paths = AllocatePaths {
                input: &input,
                target: target.as_deref(),
                config: config.as_deref(),
                covers: covers.as_deref(),
                oracle: oracle.as_deref(),
                reports: reports.as_deref(),
                output: output.as_deref(),
            };
            if let Err(e) = allocate_command(&paths, regs, variant) {
                eprintln!("Error allocating {}: {}", input.display(), e);
                std::process::exit(1);
            }
        }
        Commands::Graph { input, output } => {
            if let Err(e) = graph_command(&input, output.as_deref()) {
                eprintln!("Error exporting graph: {}", e);
                std::process::exit(1);
            }
        }
        Commands::Select { unit, reports } => {
            println!("{}", select_variant(&FileReports::new(reports), &unit));
        }
    }
}

struct AllocatePaths<'a> {
    input: &'a Path,
    target: Option<&'a Path>,
    config: Option<&'a Path>,
    covers: Option<&'a Path>,
    oracle: Option<&'a Path>,
    reports: Option<&'a Path>,
    output: Option<&'a Path>,
}

fn load_function(path: &Path) -> Result<Function, Box<dyn std::error::Error>> {
    Ok(Function::from_json(&fs::read_to_string(path)?)?)
}

fn allocate_command(
    paths: &AllocatePaths<'_>,
    regs: u16,
    variant: Option<AllocatorKind>,
) -> Result<(), Box<dyn std::error::Error>> {
    let func = load_function(paths.input)?;
    let target = match paths.target {
        Some(path) => TargetInfo::from_json(&fs::read_to_string(path)?)?,
        None => TargetInfo::uniform(regs),
    };
    let mut config: AllocConfig = match paths.config {
        Some(path) => serde_json::from_str(&fs::read_to_string(path)?)?,
        None => AllocConfig::default(),
    };
    if let Some(variant) = variant {
        config = config.with_variant(variant);
    }

    let mut session = AllocSession::new(&func, &target, &config)?;
    if let Some(dir) = paths.oracle {
        session = session.with_oracle(Box::new(FileOracle::new(dir)));
    }
    let mut allocator = match (config.variant, paths.covers) {
        (AllocatorKind::Mis, Some(dir)) => Allocator::mis_with(Box::new(FileCover::new(dir))),
        _ => Allocator::from_config(&config),
    };
    let result = run(&mut allocator, session)?;

    for diag in &result.diagnostics {
        eprintln!("{}", diag);
    }
    println!("{}: {} allocator, {} rounds", result.unit, result.variant, result.stats.rounds);
    for (vreg, preg) in &result.assignment {
        println!("  {} -> {}", vreg, target.reg_name(*preg));
    }
    for (vreg, preg) in &result.forced {
        println!("  {} -> {} (forced)", vreg, target.reg_name(*preg));
    }
    for (vreg, slot) in &result.spill_slots {
        println!("  {} spilled to {}", vreg, slot);
    }

    if let Some(dir) = paths.reports {
        FileReports::new(dir).write(&result.unit, &result.report())?;
    }
    if let Some(path) = paths.output {
        fs::write(path, serde_json::to_string_pretty(&result)?)?;
        info!("result written to {}", path.display());
    }
    Ok(())
}

fn graph_command(input: &Path, output: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    let func = load_function(input)?;
    let lis = LiveIntervals::new(&func);
    let graph = InterferenceGraph::build(&lis, &lis.vregs());
    match output {
        Some(path) => graph.write_to(path)?,
        None => print!("{}", graph.export()),
    }
    Ok(())
}
