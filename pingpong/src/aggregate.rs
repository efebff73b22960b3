//! Measurement matrix and its gather onto the coordinator.

use tracing::debug;

use crate::error::{Error, Result};
use crate::pairs::Rank;
use crate::timing::Measurement;
use crate::transport::Messenger;

/// `size x size` table of seconds-per-byte values, indexed by rank.
#[derive(Clone, Debug, PartialEq)]
pub struct MeasurementMatrix {
    size: usize,
    cells: Vec<Measurement>,
}

impl MeasurementMatrix {
    /// Zero-filled matrix.
    pub fn new(size: usize) -> Self {
        Self {
            size,
            cells: vec![0.0; size * size],
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn get(&self, row: Rank, col: Rank) -> Measurement {
        self.cells[row * self.size + col]
    }

    pub fn row(&self, row: Rank) -> &[Measurement] {
        &self.cells[row * self.size..(row + 1) * self.size]
    }

    pub fn row_mut(&mut self, row: Rank) -> &mut [Measurement] {
        &mut self.cells[row * self.size..(row + 1) * self.size]
    }

    pub fn diagonal_is_zero(&self) -> bool {
        (0..self.size).all(|i| self.get(i, i) == 0.0)
    }

    /// True if `[i][j]` and `[j][i]` agree within `tolerance` (relative to
    /// the larger magnitude) everywhere.
    pub fn is_symmetric(&self, tolerance: f64) -> bool {
        for i in 0..self.size {
            for j in (i + 1)..self.size {
                let (a, b) = (self.get(i, j), self.get(j, i));
                let scale = a.abs().max(b.abs());
                if (a - b).abs() > tolerance * scale {
                    return false;
                }
            }
        }
        true
    }
}

/// Gather every rank's row onto `coordinator`.
///
/// Non-coordinators send their whole row in one message and get `None`.
/// The coordinator receives from the other ranks in strictly ascending rank
/// order, one blocking receive per sender, and copies its own row in
/// locally.
pub fn aggregate<M: Messenger>(
    messenger: &M,
    row: Vec<Measurement>,
    coordinator: Rank,
) -> Result<Option<MeasurementMatrix>> {
    let size = messenger.size();
    let rank = messenger.rank();
    if row.len() != size {
        return Err(Error::Config(format!(
            "row has {} cells for a group of {}",
            row.len(),
            size
        )));
    }

    if rank != coordinator {
        messenger.send_reals(coordinator, &row)?;
        return Ok(None);
    }

    let mut matrix = MeasurementMatrix::new(size);
    matrix.row_mut(coordinator).copy_from_slice(&row);
    for src in (0..size).filter(|&r| r != coordinator) {
        messenger.receive_reals(src, matrix.row_mut(src))?;
    }
    debug!(size, "rows gathered on coordinator");
    Ok(Some(matrix))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::local::LocalCluster;

    #[test]
    fn test_new_is_zero() {
        let m = MeasurementMatrix::new(3);
        assert_eq!(m.size(), 3);
        assert!(m.diagonal_is_zero());
        assert!((0..3).all(|i| m.row(i).iter().all(|&v| v == 0.0)));
    }

    #[test]
    fn test_symmetry_check() {
        let mut m = MeasurementMatrix::new(2);
        m.row_mut(0)[1] = 1.0e-6;
        assert!(!m.is_symmetric(1e-9));
        m.row_mut(1)[0] = 1.0e-6;
        assert!(m.is_symmetric(0.0));
        m.row_mut(1)[0] = 1.0e-6 * (1.0 + 1e-12);
        assert!(m.is_symmetric(1e-9));
    }

    #[test]
    fn test_gather_places_rows_by_rank() {
        let matrices = LocalCluster::new(4)
            .run(|w| {
                let rank = w.rank();
                let row: Vec<f64> = (0..4).map(|c| (rank * 10 + c) as f64).collect();
                aggregate(w, row, 0)
            })
            .unwrap();
        let m = matrices[0].as_ref().unwrap();
        for r in 0..4 {
            let expected: Vec<f64> = (0..4).map(|c| (r * 10 + c) as f64).collect();
            assert_eq!(m.row(r), &expected[..]);
        }
        assert!(matrices[1..].iter().all(Option::is_none));
    }

    #[test]
    fn test_gather_to_other_coordinator() {
        let matrices = LocalCluster::new(3)
            .run(|w| aggregate(w, vec![w.rank() as f64; 3], 2))
            .unwrap();
        let m = matrices[2].as_ref().unwrap();
        assert_eq!(m.row(0), &[0.0, 0.0, 0.0]);
        assert_eq!(m.row(1), &[1.0, 1.0, 1.0]);
        assert_eq!(m.row(2), &[2.0, 2.0, 2.0]);
    }

    #[test]
    fn test_row_length_mismatch() {
        let result = LocalCluster::new(1).run(|w| aggregate(w, vec![0.0; 2], 0));
        assert!(matches!(result, Err(Error::Aborted { code: 3 })));
    }
}
