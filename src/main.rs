use std::path::PathBuf;
use std::time::Instant;

use bdd_sharpsat::backend::{Backend, CommandBackend, DynOrder, NativeBackend};
use bdd_sharpsat::config::{Config, Verbosity};
use bdd_sharpsat::force::{ForceConfig, Preorder};
use bdd_sharpsat::pipeline::Runner;
use bdd_sharpsat::sat::CountStrategy;
use clap::{Parser, ValueEnum};
use color_eyre::eyre::bail;
use color_eyre::Result;
use log::{info, warn};

#[derive(Debug, Copy, Clone, Eq, PartialEq, ValueEnum)]
enum BackendKind {
    /// Build diagrams in-process
    Native,
    /// Run an external builder, see --backend-program
    Command,
}

#[derive(Parser)]
#[command(author, version, about = "Exact model counting of DIMACS CNF formulas via BDDs")]
struct Cli {
    /// Input formula in DIMACS CNF format
    #[arg(value_name = "FILE")]
    file: PathBuf,

    /// Only log warnings and errors, do not print results
    #[arg(long)]
    silent: bool,

    /// Log debug information
    #[arg(long)]
    verbose: bool,

    /// Compute a variable order before building the diagram
    #[arg(long, value_enum)]
    preorder: Option<Preorder>,

    /// Do not reuse prior reports and artifacts
    #[arg(long)]
    ignore_cache: bool,

    /// Dynamic reordering requested from the backend
    #[arg(long, value_enum, default_value_t = DynOrder::SiftConv)]
    dynorder: DynOrder,

    #[arg(long, value_enum, default_value_t = BackendKind::Native)]
    backend: BackendKind,

    /// Builder executable for `--backend command`
    #[arg(long, value_name = "PATH")]
    backend_program: Option<PathBuf>,

    /// Directory for diagram artifacts
    #[arg(long, value_name = "DIR", default_value = ".cache")]
    cache_dir: PathBuf,

    /// Directory for run reports
    #[arg(long, value_name = "DIR", default_value = "reports")]
    report_dir: PathBuf,

    /// Seed for the preorder heuristics
    #[arg(long, value_name = "INT")]
    seed: Option<u64>,

    /// Model counting strategy
    #[arg(long, value_enum, default_value_t = CountStrategy::Paths)]
    count: CountStrategy,
}

fn main() -> Result<()> {
    color_eyre::install()?;

    let cli = Cli::parse();
    let verbosity = Verbosity::from_flags(cli.silent, cli.verbose);

    simplelog::TermLogger::init(
        verbosity.level_filter(),
        simplelog::Config::default(),
        simplelog::TerminalMode::Mixed,
        simplelog::ColorChoice::Auto,
    )?;

    if cli.silent && cli.verbose {
        warn!("Both --verbose and --silent are present, ignoring both");
    }

    let mut force = ForceConfig::default();
    if let Some(seed) = cli.seed {
        force = force.with_seed(seed);
    }

    let config = Config::default()
        .with_cache_dir(cli.cache_dir)
        .with_report_dir(cli.report_dir)
        .with_caching(!cli.ignore_cache)
        .with_preorder(cli.preorder)
        .with_dynorder(cli.dynorder)
        .with_force(force)
        .with_count(cli.count)
        .with_verbosity(verbosity);

    let backend: Box<dyn Backend> = match (cli.backend, cli.backend_program) {
        (BackendKind::Native, None) => Box::new(NativeBackend::new()),
        (BackendKind::Native, Some(_)) => {
            warn!("Ignoring --backend-program for the native backend");
            Box::new(NativeBackend::new())
        }
        (BackendKind::Command, Some(program)) => Box::new(CommandBackend::new(program)),
        (BackendKind::Command, None) => bail!("--backend command requires --backend-program"),
    };

    let time_total = Instant::now();
    let mut runner = Runner::new(&config, backend);
    let summary = runner.run(&cli.file)?;
    info!("Done in {:.3} s", time_total.elapsed().as_secs_f64());

    if config.verbosity != Verbosity::Silent {
        println!("--------------------------------");
        println!("Results for {}:", summary.file.display());
        println!("#SAT:\t{}", summary.count);
        println!("Nodes:\t{}", summary.n_nodes);
        println!("--------------------------------");
    }

    Ok(())
}
