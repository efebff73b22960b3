use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use pingpong::config::{
    BenchConfig, Mode, OutputConfig, PassConfig, PassKind, DEFAULT_BANDWIDTH_PAYLOAD,
    DEFAULT_BANDWIDTH_REPETITIONS, DEFAULT_LATENCY_PAYLOAD, DEFAULT_LATENCY_REPETITIONS,
};
use pingpong::transport::local::LocalCluster;
use pingpong::{topology, Benchmark, Error, Messenger, Result};

#[derive(Parser, Debug)]
#[command(name = "pingpong")]
#[command(about = "All-pairs pingpong latency and inverse-bandwidth matrix (Hockney model)")]
struct Cli {
    /// Pairing mode
    #[arg(long, value_enum, default_value = "all-pairs")]
    mode: Mode,

    /// Passes to run, in order
    #[arg(long, value_enum, value_delimiter = ',', default_values = ["latency", "bandwidth"])]
    passes: Vec<PassKind>,

    /// Repetitions per direction in the latency pass
    #[arg(long, default_value_t = DEFAULT_LATENCY_REPETITIONS)]
    latency_reps: u32,

    /// Message size in bytes for the latency pass
    #[arg(long, default_value_t = DEFAULT_LATENCY_PAYLOAD)]
    latency_bytes: usize,

    /// Repetitions per direction in the bandwidth pass
    #[arg(long, default_value_t = DEFAULT_BANDWIDTH_REPETITIONS)]
    bandwidth_reps: u32,

    /// Message size in bytes for the bandwidth pass
    #[arg(long, default_value_t = DEFAULT_BANDWIDTH_PAYLOAD)]
    bandwidth_bytes: usize,

    /// Output prefix; each pass appends its matrix to <prefix>_<pass>.csv
    #[arg(short = 'o', long, default_value = "pingpong")]
    output: PathBuf,

    /// Also export every pass in long form to this parquet file
    #[arg(long)]
    parquet: Option<PathBuf>,

    /// Rank that gathers and writes the results
    #[arg(long, default_value = "0")]
    coordinator: usize,

    /// Run N ranks as threads of this process instead of under MPI
    #[arg(long)]
    local: Option<usize>,
}

impl Cli {
    fn bench_config(&self) -> BenchConfig {
        let passes = self
            .passes
            .iter()
            .map(|&kind| match kind {
                PassKind::Latency => PassConfig {
                    kind,
                    repetitions: self.latency_reps,
                    payload_bytes: self.latency_bytes,
                },
                PassKind::Bandwidth => PassConfig {
                    kind,
                    repetitions: self.bandwidth_reps,
                    payload_bytes: self.bandwidth_bytes,
                },
            })
            .collect();
        BenchConfig {
            mode: self.mode,
            passes,
            coordinator: self.coordinator,
            output: OutputConfig {
                prefix: Some(self.output.clone()),
                parquet: self.parquet.clone(),
            },
        }
    }
}

fn run_local(bench: &Benchmark, ranks: usize) -> Result<()> {
    LocalCluster::new(ranks).run(|world| {
        let identity = topology::probe(world.rank());
        bench.run(world, identity).map(|_| ())
    })?;
    Ok(())
}

#[cfg(feature = "mpi")]
fn run_mpi(bench: &Benchmark) -> Result<()> {
    let universe =
        mpi::initialize().ok_or_else(|| Error::Transport("MPI was already initialized".into()))?;
    let world = pingpong::transport::mpi::MpiWorld::new(universe.world());
    let identity = topology::probe(world.rank());
    bench.run(&world, identity)?;
    Ok(())
}

#[cfg(not(feature = "mpi"))]
fn run_mpi(_bench: &Benchmark) -> Result<()> {
    Err(Error::Config(
        "built without the `mpi` feature; rebuild with --features mpi or use --local N".into(),
    ))
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("warn,pingpong=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let bench = Benchmark::new(cli.bench_config());

    let result = match cli.local {
        Some(ranks) => run_local(&bench, ranks),
        None => run_mpi(&bench),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("pingpong: {}", e);
            ExitCode::from(u8::try_from(e.exit_code()).unwrap_or(1))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_default_passes() {
        let cli = Cli::parse_from(["pingpong", "--local", "4"]);
        let cfg = cli.bench_config();
        assert_eq!(cfg.passes, vec![PassConfig::latency(), PassConfig::bandwidth()]);
        assert_eq!(cfg.mode, Mode::AllPairs);
        assert_eq!(cli.local, Some(4));
    }

    #[cfg(not(feature = "mpi"))]
    #[test]
    fn test_mpi_run_needs_feature() {
        let cli = Cli::parse_from(["pingpong"]);
        let err = run_mpi(&Benchmark::new(cli.bench_config())).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
        assert_eq!(err.exit_code(), 3);
        assert!(err.to_string().contains("--local N"), "{}", err);
    }

    #[test]
    fn test_custom_passes() {
        let cli = Cli::parse_from([
            "pingpong",
            "--mode",
            "neighbor",
            "--passes",
            "bandwidth",
            "--bandwidth-reps",
            "3",
            "--bandwidth-bytes",
            "4096",
            "-o",
            "out/run1",
        ]);
        let cfg = cli.bench_config();
        assert_eq!(cfg.mode, Mode::Neighbor);
        assert_eq!(
            cfg.passes,
            vec![PassConfig {
                kind: PassKind::Bandwidth,
                repetitions: 3,
                payload_bytes: 4096,
            }]
        );
        assert_eq!(
            cfg.output.matrix_path(PassKind::Bandwidth),
            Some(PathBuf::from("out/run1_bandwidth.csv"))
        );
    }
}
