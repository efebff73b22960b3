//! Ephemeral private channels, one per benchmarked pair.
//!
//! Every rank calls [`ChannelFactory::open`] for every pair: the group
//! definition step is collective. Only the pair's two members go on to
//! create the context, everyone else gets `None` back and moves on. A
//! [`Channel`] releases its context and group when dropped.

use std::cell::Cell;

use tracing::{debug, error};

use crate::error::{Error, Result, EXIT_CHANNEL_CREATION};
use crate::pairs::{Pair, Rank};
use crate::transport::{Messenger, PairLink};

/// Channels opened and released by one factory.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ChannelStats {
    pub opened: usize,
    pub released: usize,
}

pub struct ChannelFactory<'m, M: Messenger> {
    messenger: &'m M,
    opened: Cell<usize>,
    released: Cell<usize>,
}

impl<'m, M: Messenger> ChannelFactory<'m, M> {
    pub fn new(messenger: &'m M) -> Self {
        Self {
            messenger,
            opened: Cell::new(0),
            released: Cell::new(0),
        }
    }

    /// Open the private channel for `pair`.
    ///
    /// Returns `None` on ranks outside the pair. An invalid context aborts
    /// the whole group; on backends where abort returns, the error is
    /// handed back for propagation.
    pub fn open(&self, pair: Pair) -> Result<Option<Channel<'_, 'm, M>>> {
        let group = self.messenger.define_group(pair)?;
        let rank = self.messenger.rank();
        if !pair.contains(rank) {
            return Ok(None);
        }

        match self.messenger.create_context(&group)? {
            Some(link) => {
                self.opened.set(self.opened.get() + 1);
                debug!(rank, ?pair, "channel opened");
                Ok(Some(Channel {
                    factory: self,
                    pair,
                    rank,
                    link,
                    _group: group,
                }))
            }
            None => {
                error!(rank, ?pair, "context creation returned an invalid handle");
                let aborted = self.messenger.abort(EXIT_CHANNEL_CREATION);
                debug!(rank, error = %aborted, "group aborted");
                Err(Error::ChannelCreation { pair })
            }
        }
    }

    pub fn stats(&self) -> ChannelStats {
        ChannelStats {
            opened: self.opened.get(),
            released: self.released.get(),
        }
    }
}

/// Private two-member context for one pair. Only valid for the iteration
/// that opened it.
pub struct Channel<'f, 'm, M: Messenger> {
    factory: &'f ChannelFactory<'m, M>,
    pair: Pair,
    rank: Rank,
    link: M::Link,
    // Freed after the link.
    _group: M::Group,
}

impl<M: Messenger> Channel<'_, '_, M> {
    pub fn pair(&self) -> Pair {
        self.pair
    }

    /// The other member.
    pub fn peer(&self) -> Rank {
        if self.rank == self.pair.first {
            self.pair.second
        } else {
            self.pair.first
        }
    }

    /// Release the channel explicitly. Dropping has the same effect.
    pub fn close(self) {}
}

impl<M: Messenger> PairLink for Channel<'_, '_, M> {
    fn barrier(&self) -> Result<()> {
        self.link.barrier()
    }

    fn send_sync(&self, buf: &[u8]) -> Result<()> {
        self.link.send_sync(buf)
    }

    fn receive_into(&self, buf: &mut [u8]) -> Result<()> {
        self.link.receive_into(buf)
    }

    fn wtime(&self) -> f64 {
        self.link.wtime()
    }
}

impl<M: Messenger> Drop for Channel<'_, '_, M> {
    fn drop(&mut self) {
        let released = &self.factory.released;
        released.set(released.get() + 1);
        debug!(rank = self.rank, pair = ?self.pair, "channel released");
    }
}
