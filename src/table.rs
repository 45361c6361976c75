//! Fixed-capacity table of connection slots.
//!
//! The table is sized once at server startup and never grows. A slot is
//! active while it holds a connection; the session owns the socket, so
//! returning it from [`ClientTable::release`] is what makes descriptor
//! release exactly-once: the reactor deregisters and closes the returned
//! session, and a second release of the same slot yields `None`.
//!
//! Input buffers are allocated on a slot's first activation and kept for
//! the life of the process; later occupants of the slot reuse the same
//! allocation with `used` reset to zero.

use std::net::SocketAddr;

use crate::client::ClientId;
use crate::transport::Session;

/// The connection half of an active slot.
pub(crate) struct ActiveConn {
    pub session: Box<dyn Session>,
    pub peer: SocketAddr,
}

pub(crate) struct Slot {
    pub conn: Option<ActiveConn>,
    pub buffer: Option<Box<[u8]>>,
    pub used: usize,
    pub idle_ticks: u32,
    pub overflowed: bool,
    /// Unserviced readiness reported by the poller. Sticky: cleared only
    /// when a read would block, so one poll wakeup can be serviced one
    /// read at a time across iterations.
    pub ready: bool,
}

impl Slot {
    fn empty() -> Self {
        Slot {
            conn: None,
            buffer: None,
            used: 0,
            idle_ticks: 0,
            overflowed: false,
            ready: false,
        }
    }

    pub fn is_active(&self) -> bool {
        self.conn.is_some()
    }
}

pub(crate) struct ClientTable {
    slots: Box<[Slot]>,
    buffer_size: usize,
}

impl ClientTable {
    pub fn new(capacity: usize, buffer_size: usize) -> Self {
        let slots = (0..capacity).map(|_| Slot::empty()).collect::<Vec<_>>();
        ClientTable {
            slots: slots.into_boxed_slice(),
            buffer_size,
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn active_count(&self) -> usize {
        self.slots.iter().filter(|s| s.is_active()).count()
    }

    /// Lowest-indexed free slot, or `None` when every slot is occupied.
    /// Has no side effects; the slot is claimed by [`activate`].
    ///
    /// [`activate`]: ClientTable::activate
    pub fn allocate(&self) -> Option<usize> {
        self.slots.iter().position(|s| !s.is_active())
    }

    /// Claims `index` for a freshly accepted connection. The slot must be
    /// inactive. The client's id is derived from the slot index, so two
    /// connections occupying the same slot over time share an id.
    pub fn activate(&mut self, index: usize, session: Box<dyn Session>, peer: SocketAddr) {
        let slot = &mut self.slots[index];
        debug_assert!(!slot.is_active(), "activating an occupied slot");
        if slot.buffer.is_none() {
            slot.buffer = Some(vec![0u8; self.buffer_size].into_boxed_slice());
        }
        slot.conn = Some(ActiveConn { session, peer });
        slot.used = 0;
        slot.idle_ticks = 0;
        slot.overflowed = false;
        slot.ready = false;
    }

    /// Frees `index` and hands the session back for deregistration and
    /// close. Idempotent: releasing an inactive slot is a no-op returning
    /// `None`. The input buffer is retained for the next occupant.
    pub fn release(&mut self, index: usize) -> Option<Box<dyn Session>> {
        let slot = self.slots.get_mut(index)?;
        let conn = slot.conn.take()?;
        slot.used = 0;
        slot.idle_ticks = 0;
        slot.overflowed = false;
        slot.ready = false;
        Some(conn.session)
    }

    pub fn slot_mut(&mut self, index: usize) -> Option<&mut Slot> {
        self.slots.get_mut(index)
    }

    pub fn mark_ready(&mut self, index: usize) {
        if let Some(slot) = self.slots.get_mut(index) {
            slot.ready = true;
        }
    }

    pub fn is_ready(&self, index: usize) -> bool {
        self.slots
            .get(index)
            .map(|s| s.is_active() && s.ready)
            .unwrap_or(false)
    }

    /// True while any slot has unserviced readiness; the reactor uses a
    /// zero-length wait in that case so buffered input is drained without
    /// waiting out the heartbeat timeout.
    pub fn any_ready(&self) -> bool {
        self.slots.iter().any(|s| s.is_active() && s.ready)
    }

    pub fn id_of(index: usize) -> ClientId {
        ClientId::from_index(index)
    }
}
