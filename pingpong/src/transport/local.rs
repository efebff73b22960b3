//! In-process transport: every participant is a thread.
//!
//! All lanes live in a shared [`Fabric`]. Point-to-point data lanes are
//! unbounded queues, synchronous lanes are zero-capacity `crossbeam-channel`s
//! so a send completes only when the receiver takes the message. Every
//! blocking operation also selects on the abort signal, so one participant
//! aborting wakes everyone else.

use std::cell::RefCell;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, OnceLock, PoisonError};
use std::thread;

use crossbeam_channel::{bounded, select, unbounded, Receiver, Sender};
use tracing::{debug, warn};

use super::{Messenger, PairLink};
use crate::error::{Error, Result, EXIT_RUNTIME};
use crate::pairs::{Pair, Rank};

enum Message {
    Ints(Vec<i64>),
    Reals(Vec<f64>),
}

struct Lane<T> {
    tx: Sender<T>,
    rx: Receiver<T>,
}

impl<T> Lane<T> {
    fn queued() -> Self {
        let (tx, rx) = unbounded();
        Self { tx, rx }
    }

    fn rendezvous() -> Self {
        let (tx, rx) = bounded(0);
        Self { tx, rx }
    }
}

struct LinkShared {
    /// first -> second
    up: Lane<Vec<u8>>,
    /// second -> first
    down: Lane<Vec<u8>>,
    opened: AtomicUsize,
}

struct Fabric {
    size: usize,
    /// Indexed `src * size + dst`.
    data: Vec<Lane<Message>>,
    sync: Vec<Lane<Vec<u8>>>,
    control: Vec<Lane<()>>,
    /// Contexts created by one member and not yet picked up by the other.
    links: Mutex<HashMap<(Pair, u64), Arc<LinkShared>>>,
    abort_tx: Mutex<Option<Sender<()>>>,
    abort_rx: Receiver<()>,
    abort_code: OnceLock<i32>,
    origin: fastant::Instant,
    failing: Vec<Pair>,
}

impl Fabric {
    fn new(size: usize, failing: Vec<Pair>) -> Self {
        let lanes = size * size;
        let (abort_tx, abort_rx) = bounded(0);
        Self {
            size,
            data: (0..lanes).map(|_| Lane::queued()).collect(),
            sync: (0..lanes).map(|_| Lane::rendezvous()).collect(),
            control: (0..lanes).map(|_| Lane::queued()).collect(),
            links: Mutex::new(HashMap::new()),
            abort_tx: Mutex::new(Some(abort_tx)),
            abort_rx,
            abort_code: OnceLock::new(),
            origin: fastant::Instant::now(),
            failing,
        }
    }

    fn lane(&self, src: Rank, dst: Rank) -> Result<usize> {
        if src >= self.size || dst >= self.size {
            return Err(Error::Transport(format!(
                "rank out of range: {} -> {} in a group of {}",
                src, dst, self.size
            )));
        }
        Ok(src * self.size + dst)
    }

    fn send<T>(&self, tx: &Sender<T>, msg: T) -> Result<()> {
        select! {
            send(tx, msg) -> res => res.map_err(|_| Error::Transport("peer disconnected".into())),
            recv(self.abort_rx) -> _ => Err(self.aborted()),
        }
    }

    fn recv<T>(&self, rx: &Receiver<T>) -> Result<T> {
        select! {
            recv(rx) -> msg => msg.map_err(|_| Error::Transport("peer disconnected".into())),
            recv(self.abort_rx) -> _ => Err(self.aborted()),
        }
    }

    fn abort(&self, code: i32) {
        let _ = self.abort_code.set(code);
        // Dropping the only sender disconnects `abort_rx` for every waiter.
        drop(
            self.abort_tx
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .take(),
        );
    }

    fn aborted(&self) -> Error {
        Error::Aborted {
            code: self.abort_code.get().copied().unwrap_or(EXIT_RUNTIME),
        }
    }

    fn wtime(&self) -> f64 {
        self.origin.elapsed().as_secs_f64()
    }
}

/// Aborts the fabric if the participant thread unwinds, so the others do
/// not block forever on a dead peer.
struct AbortOnPanic<'a>(&'a Fabric);

impl Drop for AbortOnPanic<'_> {
    fn drop(&mut self) {
        if thread::panicking() {
            self.0.abort(EXIT_RUNTIME);
        }
    }
}

/// A group of `size` threads sharing one [`Fabric`].
#[derive(Clone, Debug)]
pub struct LocalCluster {
    size: usize,
    failing: Vec<Pair>,
}

impl LocalCluster {
    pub fn new(size: usize) -> Self {
        Self {
            size,
            failing: Vec::new(),
        }
    }

    /// Make context creation for `pair` return an invalid context.
    pub fn fail_context_for(mut self, pair: Pair) -> Self {
        self.failing.push(pair);
        self
    }

    /// Run `f` once per rank, each on its own thread, and return the
    /// per-rank results in rank order.
    ///
    /// If any participant fails, the group is aborted and the abort status
    /// is returned instead of partial results.
    pub fn run<T, F>(&self, f: F) -> Result<Vec<T>>
    where
        F: Fn(&LocalWorld) -> Result<T> + Sync,
        T: Send,
    {
        if self.size == 0 {
            return Err(Error::Config("local cluster needs at least one rank".into()));
        }
        let fabric = Arc::new(Fabric::new(self.size, self.failing.clone()));

        let outcomes: Vec<Result<T>> = thread::scope(|s| {
            let mut handles = Vec::with_capacity(self.size);
            for rank in 0..self.size {
                let shared = Arc::clone(&fabric);
                let f = &f;
                let spawned = thread::Builder::new()
                    .name(format!("rank-{}", rank))
                    .spawn_scoped(s, move || {
                        let _guard = AbortOnPanic(&shared);
                        let world = LocalWorld::new(rank, Arc::clone(&shared));
                        let result = f(&world);
                        if let Err(e) = &result
                            && !matches!(e, Error::Aborted { .. })
                        {
                            warn!(rank, error = %e, "participant failed, aborting group");
                            shared.abort(e.exit_code());
                        }
                        result
                    });
                match spawned {
                    Ok(h) => handles.push(Some(h)),
                    Err(e) => {
                        warn!(rank, error = %e, "failed to spawn participant");
                        fabric.abort(EXIT_RUNTIME);
                        handles.push(None);
                    }
                }
            }
            handles
                .into_iter()
                .map(|h| match h {
                    Some(h) => h
                        .join()
                        .unwrap_or_else(|_| Err(Error::Transport("participant panicked".into()))),
                    None => Err(fabric.aborted()),
                })
                .collect()
        });

        if fabric.abort_code.get().is_some() {
            return Err(fabric.aborted());
        }
        outcomes.into_iter().collect()
    }
}

/// One participant's view of a [`LocalCluster`].
pub struct LocalWorld {
    rank: Rank,
    fabric: Arc<Fabric>,
    /// Contexts created so far per pair; both members count identically.
    generations: RefCell<HashMap<Pair, u64>>,
}

impl LocalWorld {
    fn new(rank: Rank, fabric: Arc<Fabric>) -> Self {
        Self {
            rank,
            fabric,
            generations: RefCell::new(HashMap::new()),
        }
    }

    fn next_generation(&self, pair: Pair) -> u64 {
        let mut generations = self.generations.borrow_mut();
        let slot = generations.entry(pair).or_insert(0);
        let current = *slot;
        *slot += 1;
        current
    }

    fn receive_message(&self, src: Rank) -> Result<Message> {
        let lane = self.fabric.lane(src, self.rank)?;
        self.fabric.recv(&self.fabric.data[lane].rx)
    }
}

/// Two-member group definition.
#[derive(Clone, Copy, Debug)]
pub struct LocalGroup {
    pair: Pair,
}

/// Private context between the two members of a pair.
pub struct LocalLink {
    fabric: Arc<Fabric>,
    shared: Arc<LinkShared>,
    is_first: bool,
}

impl LocalLink {
    fn outbound(&self) -> &Lane<Vec<u8>> {
        if self.is_first {
            &self.shared.up
        } else {
            &self.shared.down
        }
    }

    fn inbound(&self) -> &Lane<Vec<u8>> {
        if self.is_first {
            &self.shared.down
        } else {
            &self.shared.up
        }
    }
}

fn copy_exact(msg: &[u8], buf: &mut [u8]) -> Result<()> {
    if msg.len() != buf.len() {
        return Err(Error::Transport(format!(
            "received {} bytes, expected {}",
            msg.len(),
            buf.len()
        )));
    }
    buf.copy_from_slice(msg);
    Ok(())
}

impl PairLink for LocalLink {
    fn barrier(&self) -> Result<()> {
        if self.is_first {
            self.fabric.send(&self.outbound().tx, Vec::new())?;
            self.fabric.recv(&self.inbound().rx)?;
        } else {
            self.fabric.recv(&self.inbound().rx)?;
            self.fabric.send(&self.outbound().tx, Vec::new())?;
        }
        Ok(())
    }

    fn send_sync(&self, buf: &[u8]) -> Result<()> {
        self.fabric.send(&self.outbound().tx, buf.to_vec())
    }

    fn receive_into(&self, buf: &mut [u8]) -> Result<()> {
        let msg = self.fabric.recv(&self.inbound().rx)?;
        copy_exact(&msg, buf)
    }

    fn wtime(&self) -> f64 {
        self.fabric.wtime()
    }
}

impl Messenger for LocalWorld {
    type Group = LocalGroup;
    type Link = LocalLink;

    fn rank(&self) -> Rank {
        self.rank
    }

    fn size(&self) -> usize {
        self.fabric.size
    }

    fn wtime(&self) -> f64 {
        self.fabric.wtime()
    }

    fn barrier(&self) -> Result<()> {
        let size = self.fabric.size;
        if self.rank == 0 {
            for src in 1..size {
                let lane = self.fabric.lane(src, 0)?;
                self.fabric.recv(&self.fabric.control[lane].rx)?;
            }
            for dst in 1..size {
                let lane = self.fabric.lane(0, dst)?;
                self.fabric.send(&self.fabric.control[lane].tx, ())?;
            }
        } else {
            let up = self.fabric.lane(self.rank, 0)?;
            self.fabric.send(&self.fabric.control[up].tx, ())?;
            let down = self.fabric.lane(0, self.rank)?;
            self.fabric.recv(&self.fabric.control[down].rx)?;
        }
        Ok(())
    }

    fn send_sync(&self, dest: Rank, buf: &[u8]) -> Result<()> {
        let lane = self.fabric.lane(self.rank, dest)?;
        self.fabric.send(&self.fabric.sync[lane].tx, buf.to_vec())
    }

    fn receive_bytes(&self, src: Rank, buf: &mut [u8]) -> Result<()> {
        let lane = self.fabric.lane(src, self.rank)?;
        let msg = self.fabric.recv(&self.fabric.sync[lane].rx)?;
        copy_exact(&msg, buf)
    }

    fn send_reals(&self, dest: Rank, values: &[f64]) -> Result<()> {
        let lane = self.fabric.lane(self.rank, dest)?;
        self.fabric
            .send(&self.fabric.data[lane].tx, Message::Reals(values.to_vec()))
    }

    fn receive_reals(&self, src: Rank, values: &mut [f64]) -> Result<()> {
        match self.receive_message(src)? {
            Message::Reals(v) if v.len() == values.len() => {
                values.copy_from_slice(&v);
                Ok(())
            }
            _ => Err(Error::Transport(format!(
                "unexpected message from rank {}, expected {} reals",
                src,
                values.len()
            ))),
        }
    }

    fn send_ints(&self, dest: Rank, values: &[i64]) -> Result<()> {
        let lane = self.fabric.lane(self.rank, dest)?;
        self.fabric
            .send(&self.fabric.data[lane].tx, Message::Ints(values.to_vec()))
    }

    fn receive_ints(&self, src: Rank, values: &mut [i64]) -> Result<()> {
        match self.receive_message(src)? {
            Message::Ints(v) if v.len() == values.len() => {
                values.copy_from_slice(&v);
                Ok(())
            }
            _ => Err(Error::Transport(format!(
                "unexpected message from rank {}, expected {} ints",
                src,
                values.len()
            ))),
        }
    }

    fn define_group(&self, pair: Pair) -> Result<LocalGroup> {
        self.fabric.lane(pair.first, pair.second)?;
        Ok(LocalGroup { pair })
    }

    fn create_context(&self, group: &LocalGroup) -> Result<Option<LocalLink>> {
        let pair = group.pair;
        if !pair.contains(self.rank) {
            return Err(Error::Transport(format!(
                "rank {} is not a member of ({}, {})",
                self.rank, pair.first, pair.second
            )));
        }
        let generation = self.next_generation(pair);
        if self.fabric.failing.contains(&pair) {
            return Ok(None);
        }

        let key = (pair, generation);
        let shared = {
            let mut links = self
                .fabric
                .links
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            let shared = Arc::clone(links.entry(key).or_insert_with(|| {
                Arc::new(LinkShared {
                    up: Lane::rendezvous(),
                    down: Lane::rendezvous(),
                    opened: AtomicUsize::new(0),
                })
            }));
            if shared.opened.fetch_add(1, Ordering::AcqRel) == 1 {
                links.remove(&key);
            }
            shared
        };
        debug!(rank = self.rank, ?pair, generation, "local context created");

        Ok(Some(LocalLink {
            fabric: Arc::clone(&self.fabric),
            shared,
            is_first: self.rank == pair.first,
        }))
    }

    fn abort(&self, code: i32) -> Error {
        self.fabric.abort(code);
        self.fabric.aborted()
    }
}
