mod demo;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tracing::info;

use cadence_bench::{CsvBenchmarker, EmpiricalBenchmarker};
use cadence_comm::local::LocalComm;
use cadence_core::comm::Communicator;
use cadence_core::config::{load_config, SearchConfig, StrategyKind};
use cadence_core::graph::Graph;
use cadence_core::platform::Platform;
use cadence_search::driver::{search, SearchOpts, SearchReport};
use cadence_search::strategy::{MinTime, NormalizedRange, Strategy};

#[derive(Parser)]
#[command(name = "cadence", about = "MCTS search for low-latency execution orderings")]
struct Cli {
    #[arg(long, help = "Iteration budget")]
    iters: Option<usize>,

    #[arg(long, help = "Stream budget for accelerator placement")]
    streams: Option<usize>,

    #[arg(long, help = "RNG seed")]
    seed: Option<u64>,

    #[arg(long, help = "Value strategy: normalized-range or min-time")]
    strategy: Option<StrategyKind>,

    #[arg(long, help = "Replay results from a CSV instead of measuring")]
    replay: Option<PathBuf>,

    #[arg(long, help = "Benchmark repetitions per ordering")]
    samples: Option<usize>,

    #[arg(long, help = "Path to a TOML config file")]
    config: Option<String>,

    #[arg(long, help = "Write logs to this directory instead of stderr")]
    log_dir: Option<PathBuf>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // keep the appender guard alive for the whole run
    let _guard = match &cli.log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)?;
            let appender = tracing_appender::rolling::daily(dir, "cadence.log");
            let (non_blocking, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::fmt()
                .with_env_filter(
                    tracing_subscriber::EnvFilter::try_from_default_env()
                        .unwrap_or_else(|_| "info".into()),
                )
                .with_writer(non_blocking)
                .with_ansi(false)
                .init();
            Some(guard)
        }
        None => {
            tracing_subscriber::fmt()
                .with_env_filter(
                    tracing_subscriber::EnvFilter::try_from_default_env()
                        .unwrap_or_else(|_| "info".into()),
                )
                .with_writer(std::io::stderr)
                .init();
            None
        }
    };

    let mut config = cli.config.as_deref().map(load_config).unwrap_or_default();
    if let Some(iters) = cli.iters {
        config.iters = iters;
    }
    if let Some(streams) = cli.streams {
        config.streams = streams;
    }
    if let Some(seed) = cli.seed {
        config.seed = seed;
    }
    if let Some(strategy) = cli.strategy {
        config.strategy = strategy;
    }
    if let Some(samples) = cli.samples {
        config.samples = samples;
    }
    if cli.replay.is_some() {
        config.replay = cli.replay;
    }

    let comm = Arc::new(LocalComm::solo());
    let rank = comm.rank();
    let device = cadence_core::device::auto_detect();
    let mut plat = Platform::with_streams(config.streams, device, comm)?;

    let g = demo::demo_graph(rank);
    info!("demo pipeline of {} operations, {} streams", g.len(), config.streams);

    let report = match config.strategy {
        StrategyKind::NormalizedRange => run::<NormalizedRange>(&g, &mut plat, &config)?,
        StrategyKind::MinTime => run::<MinTime>(&g, &mut plat, &config)?,
    };

    match report.best() {
        Some(best) => {
            println!("# best of {} measured orderings", report.iterations);
            println!(
                "# pct01={:.3e} pct50={:.3e} pct99={:.3e} stddev={:.3e}",
                best.result.pct01, best.result.pct50, best.result.pct99, best.result.stddev
            );
            let idents: Vec<String> = best.order.iter().map(|op| op.ident()).collect();
            println!("{}", idents.join(","));
        }
        None => println!("# no orderings measured"),
    }
    Ok(())
}

fn run<S: Strategy>(g: &Graph, plat: &mut Platform, config: &SearchConfig) -> Result<SearchReport> {
    let opts = SearchOpts::from(config);
    let report = match &config.replay {
        Some(path) => {
            let mut bench = CsvBenchmarker::new(path, g)?;
            search::<S, _>(g, plat, &mut bench, &opts)?
        }
        None => {
            let mut bench = EmpiricalBenchmarker::new(config.samples);
            search::<S, _>(g, plat, &mut bench, &opts)?
        }
    };
    Ok(report)
}
