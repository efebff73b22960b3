//! pingpong - all-pairs latency and inverse-bandwidth matrix.
//!
//! Every unordered rank pair gets its own private two-member channel and a
//! synchronized pingpong, timed under the Hockney model
//! `T(n) = Ts + n * β⁻¹`. Rows are gathered on a coordinator and written as
//! a `;`-separated matrix ordered by node.
//!
//! ```text
//!  identify ──► collect_all ──► for pair in Pairs ──► open ──► measure ──► close
//!                                                                  │
//!                            render ◄── aggregate ◄────────────────┘
//! ```

pub mod aggregate;
pub mod bench;
pub mod channel;
pub mod config;
pub mod error;
pub mod format;
pub mod pairs;
pub mod parquet_out;
pub mod timing;
pub mod topology;
pub mod transport;

pub use aggregate::{aggregate, MeasurementMatrix};
pub use bench::{Benchmark, PassOutcome};
pub use channel::{Channel, ChannelFactory, ChannelStats};
pub use config::{BenchConfig, Mode, OutputConfig, PassConfig, PassKind};
pub use error::{Error, Result};
pub use pairs::{Pair, Pairs, Rank};
pub use timing::{measure, Exchange, Measurement, Role};
pub use topology::{identify, parse_node_id, CoreLocation, ProcessIdentity};
pub use transport::{Messenger, PairLink};
