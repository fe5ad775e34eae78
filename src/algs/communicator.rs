//! Thin façade over intra-process (Rayon) or inter-process (MPI) message passing.
//!
//! Messages are *contiguous byte slices* (no zero-copy guarantees).
//! A receive yields the whole message as sent; the posted buffer only sizes
//! the expectation, so callers compare lengths themselves.
//! All handles are **waitable**; callers post every send and receive of a
//! batch first and then wait on all of them before trusting any buffer.

use std::sync::Arc;
use std::thread::JoinHandle;

use bytes::Bytes;
use dashmap::DashMap;
use once_cell::sync::Lazy;
use parking_lot::Mutex;

/// Message tag. Protocols derive their sub-tags from a base with [`CommTag::offset`].
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct CommTag(pub u16);

impl CommTag {
    pub const fn new(base: u16) -> Self {
        Self(base)
    }

    pub const fn base(self) -> u16 {
        self.0
    }

    pub const fn as_u16(self) -> u16 {
        self.0
    }

    pub const fn offset(self, k: u16) -> Self {
        Self(self.0.wrapping_add(k))
    }
}

/// Tags used by one agglomeration exchange.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct AgglomCommTags {
    /// Patch restriction values across processor interfaces.
    pub interface: CommTag,
    /// Mesh headers during a gather.
    pub mesh_header: CommTag,
    /// Mesh bodies during a gather.
    pub mesh_body: CommTag,
    /// Single values during a gather.
    pub value: CommTag,
    /// Lists during a gather.
    pub list: CommTag,
}

impl AgglomCommTags {
    pub const fn from_base(base: CommTag) -> Self {
        Self {
            interface: base,
            mesh_header: base.offset(1),
            mesh_body: base.offset(2),
            value: base.offset(3),
            list: base.offset(4),
        }
    }
}

/// Non-blocking communication interface.
pub trait Communicator: Send + Sync + 'static {
    /// Handle returned by `isend`.
    type SendHandle: Wait;
    /// Handle returned by `irecv`.
    type RecvHandle: Wait;

    /// Rank of this process.
    fn rank(&self) -> usize;
    /// Number of processes.
    fn size(&self) -> usize;

    fn isend(&self, peer: usize, tag: u16, buf: &[u8]) -> Self::SendHandle;
    fn irecv(&self, peer: usize, tag: u16, buf: &mut [u8]) -> Self::RecvHandle;
}

/// Anything that can be waited on.
pub trait Wait {
    /// Wait for completion and return the received message (if any), untruncated.
    fn wait(self) -> Option<Vec<u8>>;
}

/// Compile-time no-op comm for pure serial runs.
#[derive(Clone, Debug, Default)]
pub struct NoComm;

impl Wait for () {
    fn wait(self) -> Option<Vec<u8>> {
        None
    }
}

impl Communicator for NoComm {
    type SendHandle = ();
    type RecvHandle = ();

    fn rank(&self) -> usize {
        0
    }
    fn size(&self) -> usize {
        1
    }
    fn isend(&self, _peer: usize, _tag: u16, _buf: &[u8]) {}
    fn irecv(&self, _peer: usize, _tag: u16, _buf: &mut [u8]) {}
}

// --- RayonComm: intra-process / multi-thread ---
type Key = (usize, usize, u16); // (src, dst, tag)

// Messages are numbered per key on send; receives take the next number when
// posted, so the n-th receive matches the n-th send whatever the polling order.
static MAILBOX: Lazy<DashMap<(Key, u64), Bytes>> = Lazy::new(DashMap::new);
static SENT: Lazy<DashMap<Key, u64>> = Lazy::new(DashMap::new);
static POSTED: Lazy<DashMap<Key, u64>> = Lazy::new(DashMap::new);

fn next_seq(counters: &DashMap<Key, u64>, key: Key) -> u64 {
    let mut n = counters.entry(key).or_insert(0);
    let seq = *n;
    *n += 1;
    seq
}

fn take_message(key: Key, seq: u64) -> Option<Bytes> {
    MAILBOX.remove(&(key, seq)).map(|(_, bytes)| bytes)
}

pub struct LocalHandle {
    buf: Arc<Mutex<Option<Vec<u8>>>>,
    handle: Option<JoinHandle<()>>,
}

impl Wait for LocalHandle {
    fn wait(mut self) -> Option<Vec<u8>> {
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
        self.buf.lock().take()
    }
}

/// Ranks simulated as threads of one process; messages are FIFO per (src, dst, tag).
#[derive(Clone, Debug)]
pub struct RayonComm {
    rank: usize,
    size: usize,
}

impl RayonComm {
    pub fn new(rank: usize, size: usize) -> Self {
        Self { rank, size }
    }
}

impl Communicator for RayonComm {
    type SendHandle = ();
    type RecvHandle = LocalHandle;

    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.size
    }

    fn isend(&self, peer: usize, tag: u16, buf: &[u8]) -> Self::SendHandle {
        let key = (self.rank, peer, tag);
        let seq = next_seq(&SENT, key);
        MAILBOX.insert((key, seq), Bytes::copy_from_slice(buf));
    }

    fn irecv(&self, peer: usize, tag: u16, _buf: &mut [u8]) -> Self::RecvHandle {
        let key = (peer, self.rank, tag);
        let seq = next_seq(&POSTED, key);
        let buf_arc = Arc::new(Mutex::new(None));
        let buf_arc_clone = buf_arc.clone();
        let handle = std::thread::spawn(move || {
            loop {
                if let Some(bytes) = take_message(key, seq) {
                    *buf_arc_clone.lock() = Some(bytes.to_vec());
                    break;
                }
                std::thread::yield_now();
            }
        });
        LocalHandle {
            buf: buf_arc,
            handle: Some(handle),
        }
    }
}

// --- MPI backend (feature = "mpi-support") ---
#[cfg(feature = "mpi-support")]
mod mpi_backend {
    use super::*;
    use mpi::environment::Universe;
    use mpi::traits::*;

    /// World communicator. Sends are standard-mode and complete in `isend`;
    /// receives complete in `wait`.
    #[derive(Clone)]
    pub struct MpiComm {
        universe: Arc<Universe>,
        rank: usize,
        size: usize,
    }

    impl MpiComm {
        /// Initialise MPI; `None` if it was already initialised.
        pub fn new() -> Option<Self> {
            let universe = mpi::initialize()?;
            let world = universe.world();
            let rank = world.rank() as usize;
            let size = world.size() as usize;
            Some(Self {
                universe: Arc::new(universe),
                rank,
                size,
            })
        }
    }

    pub struct MpiRecv {
        universe: Arc<Universe>,
        peer: usize,
        tag: i32,
    }

    impl Wait for MpiRecv {
        fn wait(self) -> Option<Vec<u8>> {
            let world = self.universe.world();
            let (msg, _status) = world
                .process_at_rank(self.peer as i32)
                .receive_vec_with_tag::<u8>(self.tag);
            Some(msg)
        }
    }

    impl Communicator for MpiComm {
        type SendHandle = ();
        type RecvHandle = MpiRecv;

        fn rank(&self) -> usize {
            self.rank
        }

        fn size(&self) -> usize {
            self.size
        }

        fn isend(&self, peer: usize, tag: u16, buf: &[u8]) {
            let world = self.universe.world();
            world
                .process_at_rank(peer as i32)
                .send_with_tag(buf, i32::from(tag));
        }

        fn irecv(&self, peer: usize, tag: u16, _buf: &mut [u8]) -> MpiRecv {
            MpiRecv {
                universe: self.universe.clone(),
                peer,
                tag: i32::from(tag),
            }
        }
    }
}

#[cfg(feature = "mpi-support")]
pub use mpi_backend::MpiComm;
