//! Thin façade over intra-process (threads) or inter-process (MPI) message passing.
//!
//! Messages are *contiguous byte slices* (no zero-copy guarantees).
//! Handles are **waitable**; every blocking point of the pipeline calls
//! `.wait()` before it trusts that the buffer is ready. The collective helpers
//! (`all_gather`, `all_to_all`, `gather_to_root`) are built on point-to-point
//! messages by default; backends with native collectives override them.

use crate::mesh_error::MeshError;
use bytes::Bytes;
use parking_lot::{Condvar, Mutex};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Message tag. Each protocol step uses its own tag so that interleaved
/// exchanges never match each other's messages.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub struct CommTag(u16);

impl CommTag {
    pub const fn new(tag: u16) -> Self {
        Self(tag)
    }

    pub const fn as_u16(self) -> u16 {
        self.0
    }

    /// Tag `k` steps above this one.
    pub const fn offset(self, k: u16) -> Self {
        Self(self.0.wrapping_add(k))
    }
}

/// Tags of the pipeline's blocking exchanges.
pub mod tags {
    use super::CommTag;

    pub const MAX_NODE_ID: CommTag = CommTag::new(0x1000);
    pub const VERTEX_KEYS: CommTag = CommTag::new(0x1001);
    pub const COEFFICIENT_COUNTS: CommTag = CommTag::new(0x1100);
    pub const COEFFICIENT_REQUEST: CommTag = CommTag::new(0x1101);
    pub const COEFFICIENT_RESPONSE: CommTag = CommTag::new(0x1102);
    pub const REDUCE: CommTag = CommTag::new(0x1200);
    pub const DIAGNOSTICS: CommTag = CommTag::new(0x1300);
}

/// Anything that can be waited on.
pub trait Wait {
    /// Wait for completion and return the received data (if any).
    fn wait(self) -> Result<Option<Vec<u8>>, MeshError>;
}

impl Wait for () {
    fn wait(self) -> Result<Option<Vec<u8>>, MeshError> {
        Ok(None)
    }
}

/// Point-to-point communication interface plus the collectives built on it.
pub trait Communicator {
    /// Handle returned by `isend`.
    type SendHandle: Wait;
    /// Handle returned by `irecv`.
    type RecvHandle: Wait;

    fn rank(&self) -> usize;
    fn size(&self) -> usize;

    /// Post a send of `buf` to `peer`. Backends may complete the send before
    /// returning (the MPI backend does), so callers must not rely on `isend`
    /// returning before the peer posts its receive.
    fn isend(&self, peer: usize, tag: CommTag, buf: &[u8]) -> Self::SendHandle;

    /// Post a receive of one whole message from `peer`. `timeout` bounds the
    /// eventual `wait`; `None` waits indefinitely.
    fn irecv(&self, peer: usize, tag: CommTag, timeout: Option<Duration>) -> Self::RecvHandle;

    /// Every rank contributes `buf`; every rank receives all contributions in
    /// rank order.
    fn all_gather(
        &self,
        tag: CommTag,
        buf: &[u8],
        timeout: Option<Duration>,
    ) -> Result<Vec<Vec<u8>>, MeshError> {
        let (me, size) = (self.rank(), self.size());
        for peer in (0..size).filter(|&p| p != me) {
            self.isend(peer, tag, buf).wait()?;
        }
        let mut out = Vec::with_capacity(size);
        for peer in 0..size {
            if peer == me {
                out.push(buf.to_vec());
            } else {
                out.push(recv_message(self, peer, tag, timeout)?);
            }
        }
        Ok(out)
    }

    /// Rank `i` sends `bufs[j]` to rank `j`; returns the messages received,
    /// indexed by source rank.
    fn all_to_all(
        &self,
        tag: CommTag,
        bufs: &[Vec<u8>],
        timeout: Option<Duration>,
    ) -> Result<Vec<Vec<u8>>, MeshError> {
        let (me, size) = (self.rank(), self.size());
        if bufs.len() != size {
            return Err(MeshError::DimensionMismatch {
                expected: size,
                found: bufs.len(),
            });
        }
        for peer in (0..size).filter(|&p| p != me) {
            self.isend(peer, tag, &bufs[peer]).wait()?;
        }
        let mut out = Vec::with_capacity(size);
        for peer in 0..size {
            if peer == me {
                out.push(bufs[me].clone());
            } else {
                out.push(recv_message(self, peer, tag, timeout)?);
            }
        }
        Ok(out)
    }

    /// Collect every rank's `buf` on rank 0. Other ranks get `None`.
    fn gather_to_root(
        &self,
        tag: CommTag,
        buf: &[u8],
        timeout: Option<Duration>,
    ) -> Result<Option<Vec<Vec<u8>>>, MeshError> {
        let me = self.rank();
        if me != 0 {
            self.isend(0, tag, buf).wait()?;
            return Ok(None);
        }
        let mut out = Vec::with_capacity(self.size());
        out.push(buf.to_vec());
        for peer in 1..self.size() {
            out.push(recv_message(self, peer, tag, timeout)?);
        }
        Ok(Some(out))
    }
}

fn recv_message<C: Communicator + ?Sized>(
    comm: &C,
    peer: usize,
    tag: CommTag,
    timeout: Option<Duration>,
) -> Result<Vec<u8>, MeshError> {
    comm.irecv(peer, tag, timeout)
        .wait()?
        .ok_or_else(|| MeshError::CommError {
            neighbor: peer,
            reason: format!("no message for tag {:#06x}", tag.as_u16()),
        })
}

/// Compile-time no-op comm for pure serial runs.
#[derive(Clone, Debug, Default)]
pub struct NoComm;

impl Communicator for NoComm {
    type SendHandle = ();
    type RecvHandle = ();

    fn rank(&self) -> usize {
        0
    }

    fn size(&self) -> usize {
        1
    }

    fn isend(&self, _peer: usize, _tag: CommTag, _buf: &[u8]) {}

    fn irecv(&self, _peer: usize, _tag: CommTag, _timeout: Option<Duration>) {}
}

// --- LocalComm: ranks as threads of one process ---

type Key = (usize, usize, u16); // (src, dst, tag)

#[derive(Default)]
struct Mailbox {
    queues: Mutex<HashMap<Key, VecDeque<Bytes>>>,
    arrived: Condvar,
}

/// In-process communicator; each rank is a thread holding its own handle.
///
/// Messages with equal `(src, dst, tag)` are delivered in send order.
#[derive(Clone)]
pub struct LocalComm {
    rank: usize,
    size: usize,
    mailbox: Arc<Mailbox>,
}

impl std::fmt::Debug for LocalComm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalComm")
            .field("rank", &self.rank)
            .field("size", &self.size)
            .finish()
    }
}

impl LocalComm {
    /// One communicator per rank, all sharing a fresh mailbox.
    pub fn world(size: usize) -> Vec<LocalComm> {
        let mailbox = Arc::new(Mailbox::default());
        (0..size)
            .map(|rank| LocalComm {
                rank,
                size,
                mailbox: mailbox.clone(),
            })
            .collect()
    }
}

pub struct LocalRecv {
    mailbox: Arc<Mailbox>,
    key: Key,
    timeout: Option<Duration>,
}

impl Wait for LocalRecv {
    fn wait(self) -> Result<Option<Vec<u8>>, MeshError> {
        let deadline = self.timeout.map(|t| Instant::now() + t);
        let mut queues = self.mailbox.queues.lock();
        loop {
            if let Some(bytes) = queues.get_mut(&self.key).and_then(VecDeque::pop_front) {
                return Ok(Some(bytes.to_vec()));
            }
            match deadline {
                None => self.mailbox.arrived.wait(&mut queues),
                Some(deadline) => {
                    if self
                        .mailbox
                        .arrived
                        .wait_until(&mut queues, deadline)
                        .timed_out()
                    {
                        // one last look: the message may have raced the deadline
                        if let Some(bytes) =
                            queues.get_mut(&self.key).and_then(VecDeque::pop_front)
                        {
                            return Ok(Some(bytes.to_vec()));
                        }
                        return Err(MeshError::CommTimeout {
                            neighbor: self.key.0,
                            tag: self.key.2,
                        });
                    }
                }
            }
        }
    }
}

impl Communicator for LocalComm {
    type SendHandle = ();
    type RecvHandle = LocalRecv;

    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.size
    }

    fn isend(&self, peer: usize, tag: CommTag, buf: &[u8]) {
        let key = (self.rank, peer, tag.as_u16());
        self.mailbox
            .queues
            .lock()
            .entry(key)
            .or_default()
            .push_back(Bytes::copy_from_slice(buf));
        self.mailbox.arrived.notify_all();
    }

    fn irecv(&self, peer: usize, tag: CommTag, timeout: Option<Duration>) -> LocalRecv {
        LocalRecv {
            mailbox: self.mailbox.clone(),
            key: (peer, self.rank, tag.as_u16()),
            timeout,
        }
    }
}

// --- MPI backend (feature = "mpi-support") ---
#[cfg(feature = "mpi-support")]
mod mpi_backend {
    use super::*;
    use mpi::datatype::{Partition, PartitionMut};
    use mpi::environment::Universe;
    use mpi::topology::SimpleCommunicator;
    use mpi::traits::*;
    use mpi::Count;

    /// Blocking MPI transport. Receive timeouts are not supported by the
    /// underlying calls and are ignored.
    pub struct MpiComm {
        pub world: SimpleCommunicator,
        pub rank: usize,
        _universe: Universe,
    }

    impl MpiComm {
        pub fn new() -> Result<Self, MeshError> {
            let universe = mpi::initialize().ok_or(MeshError::CommError {
                neighbor: 0,
                reason: "MPI was already initialized".into(),
            })?;
            let world = universe.world();
            let rank = world.rank() as usize;
            Ok(Self {
                world,
                rank,
                _universe: universe,
            })
        }
    }

    pub struct MpiRecv(Vec<u8>);

    impl Wait for MpiRecv {
        fn wait(self) -> Result<Option<Vec<u8>>, MeshError> {
            Ok(Some(self.0))
        }
    }

    fn displacements(counts: &[Count]) -> Vec<Count> {
        counts
            .iter()
            .scan(0, |acc, &c| {
                let d = *acc;
                *acc += c;
                Some(d)
            })
            .collect()
    }

    fn split(buf: &[u8], counts: &[Count]) -> Vec<Vec<u8>> {
        let mut out = Vec::with_capacity(counts.len());
        let mut start = 0usize;
        for &c in counts {
            let end = start + c as usize;
            out.push(buf[start..end].to_vec());
            start = end;
        }
        out
    }

    impl Communicator for MpiComm {
        type SendHandle = ();
        type RecvHandle = MpiRecv;

        fn rank(&self) -> usize {
            self.rank
        }

        fn size(&self) -> usize {
            self.world.size() as usize
        }

        /// Standard-mode `MPI_Send`: returns once `buf` may be reused, which
        /// can mean waiting for the matching receive. The collectives below
        /// are native, so the pipeline never relies on this for progress.
        fn isend(&self, peer: usize, tag: CommTag, buf: &[u8]) {
            self.world
                .process_at_rank(peer as i32)
                .send_with_tag(buf, tag.as_u16() as i32);
        }

        fn irecv(&self, peer: usize, tag: CommTag, _timeout: Option<Duration>) -> MpiRecv {
            let (data, _status) = self
                .world
                .process_at_rank(peer as i32)
                .receive_vec_with_tag::<u8>(tag.as_u16() as i32);
            MpiRecv(data)
        }

        fn all_gather(
            &self,
            _tag: CommTag,
            buf: &[u8],
            _timeout: Option<Duration>,
        ) -> Result<Vec<Vec<u8>>, MeshError> {
            let size = self.size();
            let count = buf.len() as Count;
            let mut counts = vec![0 as Count; size];
            self.world.all_gather_into(&count, &mut counts[..]);
            let displs = displacements(&counts);
            let total: usize = counts.iter().map(|&c| c as usize).sum();
            let mut recv = vec![0u8; total];
            {
                let mut part = PartitionMut::new(&mut recv[..], counts.clone(), &displs[..]);
                self.world.all_gather_varcount_into(buf, &mut part);
            }
            Ok(split(&recv, &counts))
        }

        fn gather_to_root(
            &self,
            _tag: CommTag,
            buf: &[u8],
            _timeout: Option<Duration>,
        ) -> Result<Option<Vec<Vec<u8>>>, MeshError> {
            let root = self.world.process_at_rank(0);
            let count = buf.len() as Count;
            if self.rank != 0 {
                root.gather_into(&count);
                root.gather_varcount_into(buf);
                return Ok(None);
            }
            let mut counts = vec![0 as Count; self.size()];
            root.gather_into_root(&count, &mut counts[..]);
            let displs = displacements(&counts);
            let total: usize = counts.iter().map(|&c| c as usize).sum();
            let mut recv = vec![0u8; total];
            {
                let mut part = PartitionMut::new(&mut recv[..], counts.clone(), &displs[..]);
                root.gather_varcount_into_root(buf, &mut part);
            }
            Ok(Some(split(&recv, &counts)))
        }

        fn all_to_all(
            &self,
            _tag: CommTag,
            bufs: &[Vec<u8>],
            _timeout: Option<Duration>,
        ) -> Result<Vec<Vec<u8>>, MeshError> {
            let size = self.size();
            if bufs.len() != size {
                return Err(MeshError::DimensionMismatch {
                    expected: size,
                    found: bufs.len(),
                });
            }
            let send_counts: Vec<Count> = bufs.iter().map(|b| b.len() as Count).collect();
            let mut recv_counts = vec![0 as Count; size];
            self.world.all_to_all_into(&send_counts[..], &mut recv_counts[..]);
            let send: Vec<u8> = bufs.concat();
            let send_displs = displacements(&send_counts);
            let recv_displs = displacements(&recv_counts);
            let total: usize = recv_counts.iter().map(|&c| c as usize).sum();
            let mut recv = vec![0u8; total];
            {
                let part = Partition::new(&send[..], send_counts.clone(), &send_displs[..]);
                let mut part_mut =
                    PartitionMut::new(&mut recv[..], recv_counts.clone(), &recv_displs[..]);
                self.world.all_to_all_varcount_into(&part, &mut part_mut);
            }
            Ok(split(&recv, &recv_counts))
        }
    }
}

#[cfg(feature = "mpi-support")]
pub use mpi_backend::MpiComm;
