//! Topology-ordered text rendering of a measurement matrix.
//!
//! Record layout (`;`-separated, newline-terminated rows):
//!
//! ```text
//! ##;0000;0002;0001;0003
//! 0000;0.000000e+00;...;...;...
//! 0002;...
//! ```
//!
//! Ranks are ordered by `(node_id, rank)` in both directions, so processes
//! on the same node sit next to each other. The `##` marker lets `#`-comment
//! aware loaders skip the header.

use std::fs::OpenOptions;
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::aggregate::MeasurementMatrix;
use crate::error::{Error, Result};
use crate::pairs::Rank;
use crate::topology::ProcessIdentity;

pub const HEADER_MARKER: &str = "##";
pub const DELIMITER: char = ';';

/// Ranks sorted by node id, ties broken by rank.
pub fn topology_order(identities: &[ProcessIdentity]) -> Vec<Rank> {
    let mut order: Vec<&ProcessIdentity> = identities.iter().collect();
    order.sort_by_key(|id| (id.node_id, id.rank));
    order.into_iter().map(|id| id.rank).collect()
}

/// C `%e` style: 7 significant digits, signed two-digit exponent.
pub fn scientific(value: f64) -> String {
    let s = format!("{:.6e}", value);
    let Some((mantissa, exp)) = s.split_once('e') else {
        return s;
    };
    let Ok(exp) = exp.parse::<i32>() else {
        return s;
    };
    let sign = if exp < 0 { '-' } else { '+' };
    format!("{}e{}{:02}", mantissa, sign, exp.unsigned_abs())
}

fn label(rank: Rank) -> String {
    format!("{:04}", rank)
}

/// Write the record for `matrix` to `out`.
pub fn render<W: Write>(
    matrix: &MeasurementMatrix,
    identities: &[ProcessIdentity],
    out: &mut W,
) -> Result<()> {
    let size = matrix.size();
    if identities.len() != size || identities.iter().enumerate().any(|(i, id)| id.rank != i) {
        return Err(Error::Config(format!(
            "identity table must list ranks 0..{} in order",
            size
        )));
    }
    let order = topology_order(identities);

    write!(out, "{}", HEADER_MARKER)?;
    for &col in &order {
        write!(out, "{}{}", DELIMITER, label(col))?;
    }
    writeln!(out)?;

    for &row in &order {
        write!(out, "{}", label(row))?;
        for &col in &order {
            write!(out, "{}{}", DELIMITER, scientific(matrix.get(row, col)))?;
        }
        writeln!(out)?;
    }
    Ok(())
}

/// Append the record to `path`, opening it once for the whole record.
pub fn append_record(
    path: &Path,
    matrix: &MeasurementMatrix,
    identities: &[ProcessIdentity],
) -> Result<()> {
    let file = OpenOptions::new().create(true).append(true).open(path)?;
    let mut out = BufWriter::new(file);
    render(matrix, identities, &mut out)?;
    out.flush()?;
    Ok(())
}
