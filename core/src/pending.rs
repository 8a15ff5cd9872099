//! The client-side pending-call table (§4.3).

use std::collections::HashMap;

use parking_lot::Mutex;
use tokio::sync::oneshot;

use crate::frame::Id;
use crate::value::Value;

/// How an in-flight call was ultimately settled. Distinct from a plain
/// `Result<Value, Value>` so the session can tell a peer-reported error
/// apart from a locally originated cancellation or shutdown — the three
/// map to different [`crate::error::ErrorCode`] values for the caller.
#[derive(Clone, Debug, PartialEq)]
pub enum Resolution {
    /// A response frame arrived carrying a success or error payload.
    Response(Result<Value, Value>),
    /// [`PendingTable::take`] was used to explicitly cancel this call.
    Cancelled,
    /// The session closed (or its transport died) while this call was
    /// still outstanding.
    Closed,
}

/// Maps in-flight call ids to the completion channel awaiting their
/// response. One table per client session.
///
/// A plain `Mutex<HashMap<_>>` rather than `DashMap` here: entries are
/// inserted and removed one at a time by the session's own call path and
/// its single reader task, so there's no fan-in that would benefit from
/// sharding, and a table-wide `drain` on close needs to see every entry
/// under one lock anyway.
#[derive(Default)]
pub struct PendingTable {
    inner: Mutex<HashMap<Id, oneshot::Sender<Resolution>>>,
}

impl PendingTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a new in-flight call. Panics if `id` is already pending,
    /// which would indicate an id-generation bug upstream.
    pub fn insert(&self, id: Id, tx: oneshot::Sender<Resolution>) {
        let mut guard = self.inner.lock();
        assert!(guard.insert(id, tx).is_none(), "duplicate pending call id");
    }

    /// Removes and returns the sender for `id`, if still pending. Used both
    /// when a response arrives and when a call is explicitly cancelled.
    pub fn take(&self, id: &Id) -> Option<oneshot::Sender<Resolution>> {
        self.inner.lock().remove(id)
    }

    pub fn contains(&self, id: &Id) -> bool {
        self.inner.lock().contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Removes and returns every still-pending sender, in no particular
    /// order. Used when the session closes and every outstanding call must
    /// be failed at once (§4.4, Testable Property: session close cancels
    /// all pending calls).
    pub fn drain(&self) -> Vec<(Id, oneshot::Sender<Resolution>)> {
        self.inner.lock().drain().collect()
    }
}
