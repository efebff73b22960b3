//! MPI transport over rsmpi.
//!
//! Pair contexts are built with `MPI_Group_incl` on every rank followed by
//! `MPI_Comm_create_group`, which only the two members call. Dropping the
//! link frees the communicator and its group.

use mpi::collective::CommunicatorCollectives;
use mpi::point_to_point::{Destination, Source};
use mpi::topology::{Communicator, Group, SimpleCommunicator, UserGroup};
use tracing::debug;

use super::{Messenger, PairLink};
use crate::error::{Error, Result};
use crate::pairs::{Pair, Rank};

pub struct MpiWorld {
    world: SimpleCommunicator,
}

impl MpiWorld {
    pub fn new(world: SimpleCommunicator) -> Self {
        Self { world }
    }
}

/// Group definition for one pair. The group is freed when this is dropped.
pub struct MpiGroup {
    group: UserGroup,
    pair: Pair,
}

pub struct MpiLink {
    comm: SimpleCommunicator,
    peer: mpi::Rank,
}

impl PairLink for MpiLink {
    fn barrier(&self) -> Result<()> {
        self.comm.barrier();
        Ok(())
    }

    fn send_sync(&self, buf: &[u8]) -> Result<()> {
        self.comm.process_at_rank(self.peer).synchronous_send(buf);
        Ok(())
    }

    fn receive_into(&self, buf: &mut [u8]) -> Result<()> {
        self.comm.process_at_rank(self.peer).receive_into(buf);
        Ok(())
    }

    fn wtime(&self) -> f64 {
        mpi::time()
    }
}

impl Messenger for MpiWorld {
    type Group = MpiGroup;
    type Link = MpiLink;

    fn rank(&self) -> Rank {
        self.world.rank() as Rank
    }

    fn size(&self) -> usize {
        self.world.size() as usize
    }

    fn wtime(&self) -> f64 {
        mpi::time()
    }

    fn barrier(&self) -> Result<()> {
        self.world.barrier();
        Ok(())
    }

    fn send_sync(&self, dest: Rank, buf: &[u8]) -> Result<()> {
        self.world.process_at_rank(dest as mpi::Rank).synchronous_send(buf);
        Ok(())
    }

    fn receive_bytes(&self, src: Rank, buf: &mut [u8]) -> Result<()> {
        self.world.process_at_rank(src as mpi::Rank).receive_into(buf);
        Ok(())
    }

    fn send_reals(&self, dest: Rank, values: &[f64]) -> Result<()> {
        self.world.process_at_rank(dest as mpi::Rank).send(values);
        Ok(())
    }

    fn receive_reals(&self, src: Rank, values: &mut [f64]) -> Result<()> {
        self.world.process_at_rank(src as mpi::Rank).receive_into(values);
        Ok(())
    }

    fn send_ints(&self, dest: Rank, values: &[i64]) -> Result<()> {
        self.world.process_at_rank(dest as mpi::Rank).send(values);
        Ok(())
    }

    fn receive_ints(&self, src: Rank, values: &mut [i64]) -> Result<()> {
        self.world.process_at_rank(src as mpi::Rank).receive_into(values);
        Ok(())
    }

    fn define_group(&self, pair: Pair) -> Result<MpiGroup> {
        let members = [pair.first as mpi::Rank, pair.second as mpi::Rank];
        let group = self.world.group().include(&members[..]);
        Ok(MpiGroup { group, pair })
    }

    fn create_context(&self, group: &MpiGroup) -> Result<Option<MpiLink>> {
        if !group.pair.contains(self.rank()) {
            return Err(Error::Transport(format!(
                "rank {} is not a member of ({}, {})",
                self.rank(),
                group.pair.first,
                group.pair.second
            )));
        }
        let Some(comm) = self.world.split_by_subgroup(&group.group) else {
            return Ok(None);
        };
        let peer = 1 - comm.rank();
        debug!(rank = self.rank(), pair = ?group.pair, "MPI pair communicator created");
        Ok(Some(MpiLink { comm, peer }))
    }

    fn abort(&self, code: i32) -> Error {
        self.world.abort(code)
    }
}
