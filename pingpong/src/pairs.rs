//! Pair enumeration.
//!
//! [`Pairs`] walks every unordered rank pair `(first, second)` with
//! `first < second` in lexicographic order. [`neighbor`] gives the fixed
//! partner used by the neighbor mode (0<->1, 2<->3, ...).

/// Process rank within the overall group.
pub type Rank = usize;

/// Unordered pair of distinct ranks, stored with `first < second`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Pair {
    pub first: Rank,
    pub second: Rank,
}

impl Pair {
    /// Builds a pair from two distinct ranks in either order.
    pub fn new(a: Rank, b: Rank) -> Self {
        debug_assert_ne!(a, b, "a pair needs two distinct ranks");
        if a < b {
            Self { first: a, second: b }
        } else {
            Self { first: b, second: a }
        }
    }

    pub fn contains(&self, rank: Rank) -> bool {
        self.first == rank || self.second == rank
    }

    /// The other member of the pair, if `rank` is a member.
    pub fn peer_of(&self, rank: Rank) -> Option<Rank> {
        if rank == self.first {
            Some(self.second)
        } else if rank == self.second {
            Some(self.first)
        } else {
            None
        }
    }
}

impl std::fmt::Display for Pair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {})", self.first, self.second)
    }
}

/// Lazy lexicographic enumeration of all pairs over `[0, size)`.
///
/// Clone before iterating (or call [`Pairs::new`] again) to walk the same
/// sequence a second time.
#[derive(Clone, Debug)]
pub struct Pairs {
    size: usize,
    first: Rank,
    second: Rank,
}

impl Pairs {
    pub fn new(size: usize) -> Self {
        Self {
            size,
            first: 0,
            second: 1,
        }
    }

    /// Number of pairs for `size` participants: N·(N−1)/2.
    pub fn count_for(size: usize) -> usize {
        size * size.saturating_sub(1) / 2
    }
}

impl Iterator for Pairs {
    type Item = Pair;

    fn next(&mut self) -> Option<Pair> {
        if self.second >= self.size {
            self.first += 1;
            self.second = self.first + 1;
            if self.second >= self.size {
                return None;
            }
        }
        let pair = Pair {
            first: self.first,
            second: self.second,
        };
        self.second += 1;
        Some(pair)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let n = self.len();
        (n, Some(n))
    }
}

impl ExactSizeIterator for Pairs {
    fn len(&self) -> usize {
        if self.first + 1 >= self.size {
            return 0;
        }
        // Rest of the current row plus every later row.
        let row_rest = self.size.saturating_sub(self.second);
        let later = self.size - self.first - 1;
        row_rest + later * later.saturating_sub(1) / 2
    }
}

/// Fixed partner for the neighbor mode. Only meaningful for an even group size.
pub fn neighbor(rank: Rank) -> Rank {
    rank ^ 1
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_four_ranks_lexicographic() {
        let pairs: Vec<(Rank, Rank)> = Pairs::new(4).map(|p| (p.first, p.second)).collect();
        assert_eq!(
            pairs,
            vec![(0, 1), (0, 2), (0, 3), (1, 2), (1, 3), (2, 3)]
        );
    }

    #[test]
    fn test_count_matches_formula() {
        for n in 0..12 {
            let pairs: Vec<Pair> = Pairs::new(n).collect();
            assert_eq!(pairs.len(), Pairs::count_for(n), "n={}", n);
            assert!(pairs.iter().all(|p| p.first < p.second && p.second < n));
            let mut dedup = pairs.clone();
            dedup.sort();
            dedup.dedup();
            assert_eq!(dedup.len(), pairs.len());
        }
    }

    #[test]
    fn test_odd_size_has_no_parity_requirement() {
        assert_eq!(Pairs::new(3).count(), 3);
        assert_eq!(Pairs::new(5).count(), 10);
    }

    #[test]
    fn test_degenerate_sizes() {
        assert_eq!(Pairs::new(0).next(), None);
        assert_eq!(Pairs::new(1).next(), None);
        assert_eq!(Pairs::new(2).collect::<Vec<_>>(), vec![Pair::new(0, 1)]);
    }

    #[test]
    fn test_exact_size_tracks_progress() {
        let mut pairs = Pairs::new(5);
        assert_eq!(pairs.len(), 10);
        for remaining in (0..10).rev() {
            pairs.next().unwrap();
            assert_eq!(pairs.len(), remaining);
        }
        assert_eq!(pairs.next(), None);
    }

    #[test]
    fn test_clone_restarts_sequence() {
        let pairs = Pairs::new(4);
        let a: Vec<Pair> = pairs.clone().collect();
        let b: Vec<Pair> = pairs.collect();
        assert_eq!(a, b);
    }

    #[test]
    fn test_pair_normalizes_order() {
        let p = Pair::new(3, 1);
        assert_eq!((p.first, p.second), (1, 3));
        assert!(p.contains(1) && p.contains(3) && !p.contains(2));
        assert_eq!(p.peer_of(1), Some(3));
        assert_eq!(p.peer_of(3), Some(1));
        assert_eq!(p.peer_of(0), None);
    }

    #[test]
    fn test_neighbor_partners() {
        let partners: Vec<Rank> = (0..6).map(neighbor).collect();
        assert_eq!(partners, vec![1, 0, 3, 2, 5, 4]);
    }
}
