//! Pass runner: the pairwise loop, aggregation and output for each pass.
//!
//! There is no group-wide barrier between pair iterations. A rank moves to
//! its next pair as soon as its current channel is released, so unrelated
//! pairs overlap in wall-clock time.

use tracing::{debug, info};

use crate::aggregate::{aggregate, MeasurementMatrix};
use crate::channel::{ChannelFactory, ChannelStats};
use crate::config::{BenchConfig, Mode, PassConfig, PassKind};
use crate::error::{Error, Result};
use crate::format;
use crate::pairs::{neighbor, Pairs};
use crate::parquet_out;
use crate::timing::{measure, Measurement, Role};
use crate::topology::{self, ProcessIdentity};
use crate::transport::{Messenger, WorldPeer};

/// Result of one pass on one rank.
#[derive(Debug, Clone)]
pub struct PassOutcome {
    pub kind: PassKind,
    /// Channels this rank opened and released during the pass.
    pub channels: ChannelStats,
    /// Full matrix, present on the coordinator only.
    pub matrix: Option<MeasurementMatrix>,
}

/// Reject group sizes the mode cannot run with. Rank 0 reports the problem.
pub fn check_participants(mode: Mode, rank: usize, size: usize) -> Result<()> {
    if mode == Mode::Neighbor && (size % 2 != 0) {
        if rank == 0 {
            eprintln!("Please run with even # of processes");
        }
        return Err(Error::Precondition {
            size,
            reason: "neighbor mode needs an even number of processes",
        });
    }
    Ok(())
}

fn payload_for<'a>(payload: &'a mut [u8], pass: &PassConfig) -> Result<&'a mut [u8]> {
    let len = payload.len();
    payload.get_mut(..pass.payload_bytes).ok_or_else(|| {
        Error::Config(format!(
            "{} pass needs {} payload bytes, buffer holds {}",
            pass.kind.name(),
            pass.payload_bytes,
            len
        ))
    })
}

/// Benchmark every pair this rank belongs to and return its row.
pub fn benchmark_all_pairs<M: Messenger>(
    messenger: &M,
    pass: &PassConfig,
    payload: &mut [u8],
) -> Result<(Vec<Measurement>, ChannelStats)> {
    let size = messenger.size();
    let rank = messenger.rank();
    let payload = payload_for(payload, pass)?;
    let mut row = vec![0.0; size];

    let factory = ChannelFactory::new(messenger);
    for pair in Pairs::new(size) {
        let Some(channel) = factory.open(pair)? else {
            continue;
        };
        let role = if rank == pair.first {
            Role::Source
        } else {
            Role::Dest
        };
        let exchange = measure(&channel, role, pass.repetitions, payload)?;
        row[channel.peer()] = exchange.measurement;
        debug!(
            rank,
            pair = %channel.pair(),
            peer = channel.peer(),
            elapsed = exchange.elapsed,
            seconds_per_byte = exchange.measurement,
            "pair measured"
        );
        channel.close();
    }
    Ok((row, factory.stats()))
}

/// Benchmark the fixed partner `rank ^ 1` on the world context and return
/// this rank's row. Odd ranks send first.
pub fn benchmark_neighbor<M: Messenger>(
    messenger: &M,
    pass: &PassConfig,
    payload: &mut [u8],
) -> Result<Vec<Measurement>> {
    let size = messenger.size();
    let rank = messenger.rank();
    check_participants(Mode::Neighbor, rank, size)?;
    let payload = payload_for(payload, pass)?;

    let peer = neighbor(rank);
    let role = if rank & 1 == 1 {
        Role::Source
    } else {
        Role::Dest
    };
    let exchange = measure(&WorldPeer::new(messenger, peer), role, pass.repetitions, payload)?;

    let (symbol, unit) = pass.kind.symbol();
    println!(
        "({} <-> {}) {} =~ {} {}",
        rank,
        peer,
        symbol,
        format::scientific(exchange.measurement),
        unit
    );

    let mut row = vec![0.0; size];
    row[peer] = exchange.measurement;
    Ok(row)
}

/// A configured benchmark run: identity collection, then every pass.
pub struct Benchmark {
    config: BenchConfig,
}

impl Benchmark {
    pub fn new(config: BenchConfig) -> Self {
        Self { config }
    }

    /// Run every configured pass on this rank.
    ///
    /// Any failure aborts the whole group. Output is written by the
    /// coordinator only after every pass completed, so an aborted run leaves
    /// nothing behind.
    pub fn run<M: Messenger>(
        &self,
        messenger: &M,
        local: ProcessIdentity,
    ) -> Result<Vec<PassOutcome>> {
        self.run_passes(messenger, local).map_err(|e| match e {
            Error::Aborted { .. } => e,
            e => {
                let code = e.exit_code();
                let aborted = messenger.abort(code);
                debug!(rank = messenger.rank(), error = %e, %aborted, "run failed");
                e
            }
        })
    }

    fn run_passes<M: Messenger>(
        &self,
        messenger: &M,
        local: ProcessIdentity,
    ) -> Result<Vec<PassOutcome>> {
        let cfg = &self.config;
        let size = messenger.size();
        let rank = messenger.rank();
        cfg.validate(size)?;
        check_participants(cfg.mode, rank, size)?;

        let identities = topology::collect_all(messenger, local, cfg.coordinator)?;
        if let Some(ids) = &identities {
            for id in ids {
                println!("{}", id.report_line());
            }
        }

        // Allocated and touched once, reused by every pass.
        let mut payload = vec![0u8; cfg.max_payload()];
        let mut outcomes = Vec::with_capacity(cfg.passes.len());
        for pass in &cfg.passes {
            let start = messenger.wtime();
            let (row, channels) = match cfg.mode {
                Mode::AllPairs => benchmark_all_pairs(messenger, pass, &mut payload)?,
                Mode::Neighbor => (
                    benchmark_neighbor(messenger, pass, &mut payload)?,
                    ChannelStats::default(),
                ),
            };
            let matrix = aggregate(messenger, row, cfg.coordinator)?;
            if matrix.is_some() {
                info!(
                    pass = pass.kind.name(),
                    repetitions = pass.repetitions,
                    payload_bytes = pass.payload_bytes,
                    seconds = messenger.wtime() - start,
                    "pass complete"
                );
            }
            outcomes.push(PassOutcome {
                kind: pass.kind,
                channels,
                matrix,
            });
        }

        if let Some(ids) = &identities {
            self.write_outputs(&outcomes, ids)?;
        }
        Ok(outcomes)
    }

    fn write_outputs(&self, outcomes: &[PassOutcome], ids: &[ProcessIdentity]) -> Result<()> {
        let output = &self.config.output;
        let mut cells = Vec::new();
        for outcome in outcomes {
            let Some(matrix) = &outcome.matrix else {
                continue;
            };
            if let Some(path) = output.matrix_path(outcome.kind) {
                format::append_record(&path, matrix, ids)?;
                info!(path = %path.display(), "matrix written");
            }
            if output.parquet.is_some() {
                cells.extend(parquet_out::rows_from_matrix(
                    outcome.kind.name(),
                    matrix,
                    ids,
                ));
            }
        }
        if let Some(path) = &output.parquet {
            parquet_out::write_parquet(path, &cells)?;
            info!(path = %path.display(), rows = cells.len(), "parquet written");
        }
        Ok(())
    }
}
