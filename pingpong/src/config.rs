//! Benchmark configuration.
//!
//! Defaults mirror the classic Hockney measurement: a latency pass of
//! 10000 one-byte pingpongs and a bandwidth pass of 100 pingpongs of 64 MiB.

use std::path::PathBuf;

use clap::ValueEnum;

use crate::error::{Error, Result};
use crate::pairs::Rank;

pub const DEFAULT_LATENCY_REPETITIONS: u32 = 10_000;
pub const DEFAULT_LATENCY_PAYLOAD: usize = 1;
pub const DEFAULT_BANDWIDTH_REPETITIONS: u32 = 100;
pub const DEFAULT_BANDWIDTH_PAYLOAD: usize = 64 * 1024 * 1024;
/// Largest payload a single message can carry.
pub const MAX_PAYLOAD_BYTES: usize = i32::MAX as usize;

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassKind {
    /// Many small messages; estimates the fixed latency Ts
    Latency,
    /// Few large messages; estimates the inverse bandwidth
    Bandwidth,
}

impl PassKind {
    pub fn name(self) -> &'static str {
        match self {
            PassKind::Latency => "latency",
            PassKind::Bandwidth => "bandwidth",
        }
    }

    /// Symbol and unit used in the per-pair console lines.
    pub fn symbol(self) -> (&'static str, &'static str) {
        match self {
            PassKind::Latency => ("Ts", "[s]"),
            PassKind::Bandwidth => ("b^-1", "[s/byte]"),
        }
    }
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Every unordered rank pair, each on its own private channel
    AllPairs,
    /// Fixed partners 0<->1, 2<->3, ... on the world context (even rank count)
    Neighbor,
}

/// One benchmarking pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PassConfig {
    pub kind: PassKind,
    pub repetitions: u32,
    pub payload_bytes: usize,
}

impl PassConfig {
    pub fn latency() -> Self {
        Self {
            kind: PassKind::Latency,
            repetitions: DEFAULT_LATENCY_REPETITIONS,
            payload_bytes: DEFAULT_LATENCY_PAYLOAD,
        }
    }

    pub fn bandwidth() -> Self {
        Self {
            kind: PassKind::Bandwidth,
            repetitions: DEFAULT_BANDWIDTH_REPETITIONS,
            payload_bytes: DEFAULT_BANDWIDTH_PAYLOAD,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.repetitions == 0 {
            return Err(Error::Config(format!(
                "{} pass needs at least one repetition",
                self.kind.name()
            )));
        }
        if self.payload_bytes == 0 {
            return Err(Error::Config(format!(
                "{} pass needs a payload of at least one byte",
                self.kind.name()
            )));
        }
        // Message counts travel as a C int.
        if self.payload_bytes > MAX_PAYLOAD_BYTES {
            return Err(Error::Config(format!(
                "{} pass payload of {} bytes exceeds the {} byte message limit",
                self.kind.name(),
                self.payload_bytes,
                MAX_PAYLOAD_BYTES
            )));
        }
        Ok(())
    }
}

/// Where the coordinator writes results. Nothing is written when both are
/// `None`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OutputConfig {
    /// Matrix records go to `<prefix>_<pass>.csv`.
    pub prefix: Option<PathBuf>,
    /// Long-form parquet export of every pass.
    pub parquet: Option<PathBuf>,
}

impl OutputConfig {
    pub fn matrix_path(&self, kind: PassKind) -> Option<PathBuf> {
        let prefix = self.prefix.as_ref()?;
        let mut name = prefix.file_name()?.to_os_string();
        name.push(format!("_{}.csv", kind.name()));
        Some(prefix.with_file_name(name))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BenchConfig {
    pub mode: Mode,
    pub passes: Vec<PassConfig>,
    pub coordinator: Rank,
    pub output: OutputConfig,
}

impl Default for BenchConfig {
    fn default() -> Self {
        Self {
            mode: Mode::AllPairs,
            passes: vec![PassConfig::latency(), PassConfig::bandwidth()],
            coordinator: 0,
            output: OutputConfig::default(),
        }
    }
}

impl BenchConfig {
    /// Checks that do not depend on the transport. Run before any
    /// communication so every rank fails the same way.
    pub fn validate(&self, size: usize) -> Result<()> {
        if self.passes.is_empty() {
            return Err(Error::Config("no passes selected".into()));
        }
        for pass in &self.passes {
            pass.validate()?;
        }
        if self.coordinator >= size {
            return Err(Error::Config(format!(
                "coordinator rank {} outside a group of {}",
                self.coordinator, size
            )));
        }
        Ok(())
    }

    /// Largest payload any pass needs; one buffer of this size is reused.
    pub fn max_payload(&self) -> usize {
        self.passes.iter().map(|p| p.payload_bytes).max().unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cfg = BenchConfig::default();
        assert_eq!(cfg.passes[0].repetitions, 10_000);
        assert_eq!(cfg.passes[0].payload_bytes, 1);
        assert_eq!(cfg.passes[1].repetitions, 100);
        assert_eq!(cfg.passes[1].payload_bytes, 64 << 20);
        assert_eq!(cfg.max_payload(), 64 << 20);
        assert!(cfg.validate(2).is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_config() {
        let mut cfg = BenchConfig::default();
        assert!(cfg.validate(0).is_err());

        cfg.passes[0].repetitions = 0;
        assert!(matches!(cfg.validate(4), Err(Error::Config(_))));

        cfg.passes = vec![];
        assert!(matches!(cfg.validate(4), Err(Error::Config(_))));

        let mut cfg = BenchConfig::default();
        cfg.passes[1].payload_bytes = 0;
        assert!(matches!(cfg.validate(4), Err(Error::Config(_))));
    }

    #[test]
    fn test_payload_limited_to_int_count() {
        let mut pass = PassConfig::bandwidth();
        pass.payload_bytes = MAX_PAYLOAD_BYTES;
        assert!(pass.validate().is_ok());

        pass.payload_bytes = i32::MAX as usize + 1;
        let err = pass.validate().unwrap_err();
        assert_eq!(err.exit_code(), 3);
        assert!(err.to_string().contains("message limit"), "{}", err);
    }

    #[test]
    fn test_matrix_path_appends_pass_name() {
        let out = OutputConfig {
            prefix: Some(PathBuf::from("/tmp/run/pingpong")),
            parquet: None,
        };
        assert_eq!(
            out.matrix_path(PassKind::Bandwidth),
            Some(PathBuf::from("/tmp/run/pingpong_bandwidth.csv"))
        );
        assert_eq!(OutputConfig::default().matrix_path(PassKind::Latency), None);
    }
}
