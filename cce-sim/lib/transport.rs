//! Typed point-to-point message passing between ranks.
//!
//! Every message travels in an [`Envelope`] declaring its payload kind, order,
//! and length, so that receivers never need to know buffer sizes in advance.
//! Receives are blocking and matched on `(source, kind, order)`; messages that
//! arrive out of sequence are held until asked for.

use std::{ cell::RefCell, fmt };
use crossbeam_channel::{ self as channel, Receiver, Sender };
use ndarray as nd;
use crate::error::{ CceError, CceResult };

/// Index of a cooperating process; rank 0 is the coordinator.
pub type Rank = usize;

/// Rank of the coordinator.
pub const COORDINATOR: Rank = 0;

/// Kind of data carried by an [`Envelope`].
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum PayloadKind {
    /// Per-order cluster counts of a worker's slice, with the bath size.
    SliceCounts,
    /// One order's cluster ids and flattened spin indices.
    SliceData,
    /// One order's evolution results from a single worker.
    ResultData,
    /// A peer has failed and the run must stop.
    Abort,
}

impl fmt::Display for PayloadKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SliceCounts => write!(f, "slice-counts"),
            Self::SliceData => write!(f, "slice-data"),
            Self::ResultData => write!(f, "result-data"),
            Self::Abort => write!(f, "abort"),
        }
    }
}

/// Message contents.
#[derive(Clone, Debug, PartialEq)]
pub enum Payload {
    SliceCounts {
        /// Number of clusters in the slice at each order.
        counts: Vec<usize>,
        /// Number of spins in the bath; every spin index is below this.
        num_spins: usize,
    },
    SliceData {
        /// Global index of each cluster within its order.
        ids: Vec<usize>,
        /// Spin indices, `order + 1` per cluster, cluster-major.
        spins: Vec<usize>,
    },
    ResultData {
        /// Global index of each evolved cluster within its order.
        ids: Vec<usize>,
        /// `n_time × ids.len()` coherence samples.
        data: nd::Array2<f64>,
    },
    Abort(String),
}

impl Payload {
    pub fn kind(&self) -> PayloadKind {
        match self {
            Self::SliceCounts { .. } => PayloadKind::SliceCounts,
            Self::SliceData { .. } => PayloadKind::SliceData,
            Self::ResultData { .. } => PayloadKind::ResultData,
            Self::Abort(_) => PayloadKind::Abort,
        }
    }

    /// Number of scalar elements carried.
    pub fn len(&self) -> usize {
        match self {
            Self::SliceCounts { counts, .. } => counts.len(),
            Self::SliceData { spins, .. } => spins.len(),
            Self::ResultData { data, .. } => data.len(),
            Self::Abort(_) => 0,
        }
    }

    pub fn is_empty(&self) -> bool { self.len() == 0 }
}

/// A tagged message.
#[derive(Clone, Debug, PartialEq)]
pub struct Envelope {
    pub source: Rank,
    pub kind: PayloadKind,
    /// Order index the payload refers to; zero for order-independent payloads.
    pub order: usize,
    /// Declared payload length; see [`Payload::len`].
    pub len: usize,
    pub payload: Payload,
}

impl Envelope {
    /// Wrap a payload, filling in its kind and length.
    pub fn new(source: Rank, order: usize, payload: Payload) -> Self {
        Self {
            source,
            kind: payload.kind(),
            order,
            len: payload.len(),
            payload,
        }
    }

    fn matches(&self, source: Rank, kind: PayloadKind, order: usize) -> bool {
        self.source == source && self.kind == kind && self.order == order
    }
}

/// Blocking point-to-point communication within a fixed group of ranks.
pub trait Communicator {
    /// Rank of the calling process.
    fn rank(&self) -> Rank;

    /// Number of ranks in the group.
    fn size(&self) -> usize;

    /// Send a payload to `dest`.
    fn send(&self, dest: Rank, order: usize, payload: Payload) -> CceResult<()>;

    /// Block until a message of the given kind and order arrives from `source`.
    ///
    /// Fails if the channel closes, if any peer aborts, or if the received
    /// envelope's declared length disagrees with its payload.
    fn recv(&self, source: Rank, kind: PayloadKind, order: usize)
        -> CceResult<Envelope>;

    /// Notify every other rank that this one has failed. Send failures are
    /// ignored.
    fn abort(&self, reason: &str) {
        for dest in (0..self.size()).filter(|r| *r != self.rank()) {
            let _ = self.send(dest, 0, Payload::Abort(reason.to_string()));
        }
    }

    /// Return `true` if this rank is the coordinator.
    fn is_coordinator(&self) -> bool { self.rank() == COORDINATOR }
}

/// In-process [`Communicator`] backed by one unbounded channel per rank.
///
/// Each rank owns its endpoint exclusively; endpoints are meant to be moved
/// into one thread each.
#[derive(Debug)]
pub struct ChannelComm {
    rank: Rank,
    peers: Vec<Sender<Envelope>>,
    inbox: Receiver<Envelope>,
    pending: RefCell<Vec<Envelope>>,
}

impl ChannelComm {
    /// Create connected endpoints for `size` ranks, ordered by rank.
    pub fn world(size: usize) -> Vec<Self> {
        let (senders, receivers): (Vec<_>, Vec<_>)
            = (0..size).map(|_| channel::unbounded()).unzip();
        receivers.into_iter().enumerate()
            .map(|(rank, inbox)| Self {
                rank,
                peers: senders.clone(),
                inbox,
                pending: RefCell::new(Vec::new()),
            })
            .collect()
    }

    fn check(&self, env: Envelope) -> CceResult<Envelope> {
        if let Payload::Abort(reason) = &env.payload {
            return Err(CceError::transport(
                env.source, self.rank, format!("peer aborted: {}", reason)));
        }
        if env.len != env.payload.len() || env.kind != env.payload.kind() {
            return Err(CceError::transport(
                env.source,
                self.rank,
                format!(
                    "envelope declares {} x {} but carries {} x {}",
                    env.len, env.kind, env.payload.len(), env.payload.kind(),
                ),
            ));
        }
        Ok(env)
    }
}

impl Communicator for ChannelComm {
    fn rank(&self) -> Rank { self.rank }

    fn size(&self) -> usize { self.peers.len() }

    fn send(&self, dest: Rank, order: usize, payload: Payload) -> CceResult<()> {
        let tx
            = self.peers.get(dest)
            .ok_or_else(|| CceError::transport(
                self.rank, dest, format!("no such rank in group of {}", self.size())))?;
        tx.send(Envelope::new(self.rank, order, payload))
            .map_err(|_| CceError::transport(self.rank, dest, "channel closed"))
    }

    fn recv(&self, source: Rank, kind: PayloadKind, order: usize)
        -> CceResult<Envelope>
    {
        {
            let mut pending = self.pending.borrow_mut();
            if let Some(k) = pending.iter().position(|e| e.kind == PayloadKind::Abort) {
                let env = pending.remove(k);
                return self.check(env);
            }
            if let Some(k) = pending.iter().position(|e| e.matches(source, kind, order)) {
                let env = pending.remove(k);
                return self.check(env);
            }
        }
        loop {
            let env
                = self.inbox.recv()
                .map_err(|_| CceError::transport(source, self.rank, "channel closed"))?;
            if env.kind == PayloadKind::Abort || env.matches(source, kind, order) {
                return self.check(env);
            }
            tracing::trace!(
                rank = self.rank,
                from = env.source,
                kind = %env.kind,
                order = env.order,
                "holding out-of-sequence message",
            );
            self.pending.borrow_mut().push(env);
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Replies to every `recv` with the next queued payload, whatever kind was
    /// asked for. Sends are dropped.
    pub(crate) struct ScriptedComm {
        pub rank: Rank,
        pub size: usize,
        pub replies: RefCell<Vec<Payload>>,
    }

    impl ScriptedComm {
        pub fn new(rank: Rank, size: usize, replies: Vec<Payload>) -> Self {
            Self { rank, size, replies: RefCell::new(replies) }
        }
    }

    impl Communicator for ScriptedComm {
        fn rank(&self) -> Rank { self.rank }

        fn size(&self) -> usize { self.size }

        fn send(&self, _dest: Rank, _order: usize, _payload: Payload) -> CceResult<()> {
            Ok(())
        }

        fn recv(&self, source: Rank, _kind: PayloadKind, order: usize)
            -> CceResult<Envelope>
        {
            let mut replies = self.replies.borrow_mut();
            if replies.is_empty() {
                return Err(CceError::transport(source, self.rank, "script exhausted"));
            }
            Ok(Envelope::new(source, order, replies.remove(0)))
        }
    }

    #[test]
    fn out_of_sequence_messages_are_held() {
        let mut world = ChannelComm::world(2);
        let b = world.pop().unwrap();
        let a = world.pop().unwrap();
        b.send(0, 1, Payload::SliceCounts { counts: vec![1], num_spins: 1 }).unwrap();
        b.send(0, 0, Payload::SliceCounts { counts: vec![0, 0], num_spins: 1 }).unwrap();
        let env0 = a.recv(1, PayloadKind::SliceCounts, 0).unwrap();
        assert_eq!(env0.payload, Payload::SliceCounts { counts: vec![0, 0], num_spins: 1 });
        assert_eq!(env0.len, 2);
        let env1 = a.recv(1, PayloadKind::SliceCounts, 1).unwrap();
        assert_eq!(env1.order, 1);
    }

    #[test]
    fn abort_fails_pending_receive() {
        let mut world = ChannelComm::world(3);
        let c = world.pop().unwrap();
        let _b = world.pop().unwrap();
        let a = world.pop().unwrap();
        c.abort("boom");
        match a.recv(1, PayloadKind::ResultData, 0) {
            Err(CceError::Transport { from, to, reason }) => {
                assert_eq!((from, to), (2, 0));
                assert!(reason.contains("boom"));
            },
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn send_to_missing_rank_fails() {
        let world = ChannelComm::world(1);
        assert!(world[0].send(3, 0, Payload::SliceCounts { counts: vec![], num_spins: 0 }).is_err());
    }
}
