//! Synchronized pingpong timing on a two-member link.
//!
//! Both members barrier, take a start timestamp, run `repetitions`
//! rendezvous sends in one direction then `repetitions` in the other, and
//! take an end timestamp. The estimate is the elapsed interval divided by
//! the total bytes moved, `2 * repetitions * payload`.
//!
//! With many 1-byte messages the result approaches the fixed latency Ts;
//! with a few very large messages it approaches β⁻¹ (seconds per byte).

use tracing::trace;

use crate::error::{Error, Result};
use crate::transport::PairLink;

/// Seconds per byte for one pairwise exchange.
pub type Measurement = f64;

/// Which side of the exchange this process plays first.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Role {
    /// Sends first, then receives.
    Source,
    /// Receives first, then sends.
    Dest,
}

/// Outcome of one timed exchange.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Exchange {
    /// Elapsed seconds, agreed on by both members.
    pub elapsed: f64,
    /// Bytes moved in both directions together.
    pub bytes: u64,
    pub measurement: Measurement,
}

/// Run one timed exchange of `repetitions` messages of `payload.len()`
/// bytes in each direction.
///
/// After the timed window both members trade their elapsed intervals and
/// keep the larger, so both compute bit-identical results.
pub fn measure<L: PairLink + ?Sized>(
    link: &L,
    role: Role,
    repetitions: u32,
    payload: &mut [u8],
) -> Result<Exchange> {
    if repetitions == 0 || payload.is_empty() {
        return Err(Error::Config(format!(
            "pingpong needs at least one repetition of at least one byte (got {} x {})",
            repetitions,
            payload.len()
        )));
    }

    link.barrier()?;
    let start = link.wtime();
    match role {
        Role::Source => {
            send_all(link, repetitions, payload)?;
            receive_all(link, repetitions, payload)?;
        }
        Role::Dest => {
            receive_all(link, repetitions, payload)?;
            send_all(link, repetitions, payload)?;
        }
    }
    let end = link.wtime();

    let elapsed = agree_elapsed(link, role, end - start)?;
    let bytes = 2 * u64::from(repetitions) * payload.len() as u64;
    trace!(?role, elapsed, bytes, "exchange finished");
    Ok(Exchange {
        elapsed,
        bytes,
        measurement: elapsed / bytes as f64,
    })
}

fn send_all<L: PairLink + ?Sized>(link: &L, repetitions: u32, payload: &[u8]) -> Result<()> {
    for _ in 0..repetitions {
        link.send_sync(payload)?;
    }
    Ok(())
}

fn receive_all<L: PairLink + ?Sized>(
    link: &L,
    repetitions: u32,
    payload: &mut [u8],
) -> Result<()> {
    for _ in 0..repetitions {
        link.receive_into(payload)?;
    }
    Ok(())
}

/// Exchange both members' elapsed time and return the maximum.
fn agree_elapsed<L: PairLink + ?Sized>(link: &L, role: Role, local: f64) -> Result<f64> {
    let mut remote = [0u8; 8];
    match role {
        Role::Source => {
            link.send_sync(&local.to_le_bytes())?;
            link.receive_into(&mut remote)?;
        }
        Role::Dest => {
            link.receive_into(&mut remote)?;
            link.send_sync(&local.to_le_bytes())?;
        }
    }
    Ok(local.max(f64::from_le_bytes(remote)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pairs::Pair;
    use crate::transport::local::LocalCluster;
    use crate::transport::Messenger;

    fn run_pair(repetitions: u32, payload_bytes: usize) -> Vec<Exchange> {
        let pair = Pair::new(0, 1);
        LocalCluster::new(2)
            .run(|w| {
                let group = w.define_group(pair)?;
                let link = w.create_context(&group)?.expect("valid context");
                let role = if w.rank() == pair.first {
                    Role::Source
                } else {
                    Role::Dest
                };
                let mut payload = vec![0u8; payload_bytes];
                measure(&link, role, repetitions, &mut payload)
            })
            .unwrap()
    }

    #[test]
    fn test_both_members_agree() {
        let ex = run_pair(200, 1);
        assert_eq!(ex[0].measurement.to_bits(), ex[1].measurement.to_bits());
        assert_eq!(ex[0].elapsed.to_bits(), ex[1].elapsed.to_bits());
    }

    #[test]
    fn test_bytes_and_positive_elapsed() {
        let ex = run_pair(16, 1000);
        for e in &ex {
            assert_eq!(e.bytes, 2 * 16 * 1000);
            assert!(e.elapsed > 0.0 && e.elapsed.is_finite());
            assert!(e.measurement > 0.0 && e.measurement.is_finite());
            assert_eq!(e.measurement, e.elapsed / e.bytes as f64);
        }
    }

    struct UnusedLink;

    impl PairLink for UnusedLink {
        fn barrier(&self) -> Result<()> {
            unreachable!("no communication expected")
        }
        fn send_sync(&self, _buf: &[u8]) -> Result<()> {
            unreachable!("no communication expected")
        }
        fn receive_into(&self, _buf: &mut [u8]) -> Result<()> {
            unreachable!("no communication expected")
        }
        fn wtime(&self) -> f64 {
            0.0
        }
    }

    #[test]
    fn test_rejects_empty_exchange() {
        let zero_reps = measure(&UnusedLink, Role::Source, 0, &mut [0u8; 4]);
        assert!(matches!(zero_reps, Err(Error::Config(_))));
        let zero_bytes = measure(&UnusedLink, Role::Dest, 10, &mut []);
        assert!(matches!(zero_bytes, Err(Error::Config(_))));
    }
}
