//! Message-passing seam.
//!
//! The benchmark core never talks to a transport directly. It is written
//! against two traits:
//! - [`Messenger`]: the whole process group (world-level point-to-point,
//!   barrier, pair group definition and context creation, abort)
//! - [`PairLink`]: a private two-member context created for one pair
//!
//! Blocking contracts every implementation must honor:
//! - `send_sync` is a rendezvous send; it returns only once the peer has
//!   posted the matching receive
//! - receives block until a matching message arrives
//! - barriers return only once every member has arrived
//! - messages between the same two endpoints are delivered FIFO
//!
//! Backends: [`local`] (threads in one process) and `mpi` (feature `mpi`).

pub mod local;
#[cfg(feature = "mpi")]
pub mod mpi;

use crate::error::{Error, Result};
use crate::pairs::{Pair, Rank};

/// A private context shared by exactly two ranks.
pub trait PairLink {
    /// Barrier over both members.
    fn barrier(&self) -> Result<()>;

    /// Rendezvous send of `buf` to the other member.
    fn send_sync(&self, buf: &[u8]) -> Result<()>;

    /// Blocking receive of exactly `buf.len()` bytes from the other member.
    fn receive_into(&self, buf: &mut [u8]) -> Result<()>;

    /// Wall-clock time in seconds.
    fn wtime(&self) -> f64;
}

/// The ambient process group.
pub trait Messenger {
    /// Group definition for one pair, produced on every rank.
    type Group;
    /// Context usable only by the pair's two members.
    type Link: PairLink;

    fn rank(&self) -> Rank;

    fn size(&self) -> usize;

    /// Wall-clock time in seconds.
    fn wtime(&self) -> f64;

    /// Barrier over the whole group.
    fn barrier(&self) -> Result<()>;

    /// Rendezvous send over the world context.
    fn send_sync(&self, dest: Rank, buf: &[u8]) -> Result<()>;

    /// Blocking byte receive over the world context.
    fn receive_bytes(&self, src: Rank, buf: &mut [u8]) -> Result<()>;

    /// Bulk transfer of a fixed-size real buffer.
    fn send_reals(&self, dest: Rank, values: &[f64]) -> Result<()>;

    fn receive_reals(&self, src: Rank, values: &mut [f64]) -> Result<()>;

    /// Bulk transfer of a fixed-size integer buffer.
    fn send_ints(&self, dest: Rank, values: &[i64]) -> Result<()>;

    fn receive_ints(&self, src: Rank, values: &mut [i64]) -> Result<()>;

    /// Define the two-member group for `pair`. Called by every rank.
    fn define_group(&self, pair: Pair) -> Result<Self::Group>;

    /// Create the private context for `group`. Must be called only by the
    /// group's two members. `Ok(None)` means the transport handed back an
    /// invalid context.
    fn create_context(&self, group: &Self::Group) -> Result<Option<Self::Link>>;

    /// Abort the whole process group with `code`. Backends that can kill
    /// the group never return; the others return the error to propagate.
    fn abort(&self, code: i32) -> Error;
}

/// World-level context between a rank and a fixed partner, used by the
/// neighbor mode. Its barrier spans the whole group, not just the two ranks.
pub struct WorldPeer<'a, M: Messenger> {
    messenger: &'a M,
    peer: Rank,
}

impl<'a, M: Messenger> WorldPeer<'a, M> {
    pub fn new(messenger: &'a M, peer: Rank) -> Self {
        Self { messenger, peer }
    }
}

impl<M: Messenger> PairLink for WorldPeer<'_, M> {
    fn barrier(&self) -> Result<()> {
        self.messenger.barrier()
    }

    fn send_sync(&self, buf: &[u8]) -> Result<()> {
        self.messenger.send_sync(self.peer, buf)
    }

    fn receive_into(&self, buf: &mut [u8]) -> Result<()> {
        self.messenger.receive_bytes(self.peer, buf)
    }

    fn wtime(&self) -> f64 {
        self.messenger.wtime()
    }
}
