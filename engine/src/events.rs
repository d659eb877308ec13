//! Typed publish/subscribe primitives and the event vocabulary.
//!
//! Every [`Record`](crate::Record) and [`Collection`](crate::Collection)
//! owns its own [`Emitter`]. Events are closed enums per entity, so a
//! subscriber matches on event kinds instead of string names.
//!
//! Emission is synchronous and snapshot-based:
//!   - Handlers run in registration order, with the event as sole argument.
//!   - A handler removed *during* emission is still called in that round.
//!   - A handler added *during* emission is NOT called until the next emit.
//!   - Re-entrant emits run depth-first and complete before the outer emit
//!     returns.
//!
//! The lock is never held while a handler runs, so handlers may freely call
//! `on`/`off`/`emit` on the same emitter.

use crate::RecordId;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// A subscriber id returned by [`Emitter::on`] that can be passed to
/// [`Emitter::off`]. Ids are unique per emitter, so registration is a set
/// by construction.
pub type SubscriberId = u64;

/// Closure type for event handlers.
pub type HandlerFn<E> = dyn Fn(&E) + Send + Sync;

/// Typed synchronous event emitter.
pub struct Emitter<E> {
    handlers: Mutex<Vec<(SubscriberId, Arc<HandlerFn<E>>)>>,
    next_id: AtomicU64,
}

impl<E> Emitter<E> {
    /// Create a new, empty emitter.
    pub fn new() -> Self {
        Self {
            handlers: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Register `handler` and return its [`SubscriberId`].
    pub fn on(&self, handler: impl Fn(&E) + Send + Sync + 'static) -> SubscriberId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.handlers.lock().push((id, Arc::new(handler)));
        id
    }

    /// Remove the handler identified by `id`.
    ///
    /// Does nothing if `id` is not present (safe to call multiple times).
    pub fn off(&self, id: SubscriberId) {
        self.handlers.lock().retain(|(hid, _)| *hid != id);
    }

    /// Emit `event` to all currently registered handlers.
    ///
    /// A no-op when no handlers are registered, never an error.
    pub fn emit(&self, event: &E) {
        // Snapshot Arc references under the lock (cheap ref-count bumps),
        // then release before calling out.
        let snapshot: Vec<Arc<HandlerFn<E>>> = {
            let guard = self.handlers.lock();
            guard.iter().map(|(_, h)| Arc::clone(h)).collect()
        };
        for handler in snapshot {
            handler(event);
        }
    }

    /// Number of currently registered handlers.
    pub fn size(&self) -> usize {
        self.handlers.lock().len()
    }
}

impl<E> Default for Emitter<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> fmt::Debug for Emitter<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Emitter")
            .field("handlers", &self.size())
            .finish()
    }
}

/// A record whose attributes changed during reconciliation, with the new
/// values of the attributes that differed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangedRecord {
    /// Key of the changed record, in string form
    pub id: RecordId,
    /// New values of the attributes that actually differed
    pub fields: serde_json::Map<String, Value>,
}

/// The delta produced by one reconciliation pass.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeSet {
    /// Keys of records created by this pass
    pub added: Vec<RecordId>,
    /// Keys of records evicted by this pass
    pub removed: Vec<RecordId>,
    /// Records whose attributes actually differed
    pub changed: Vec<ChangedRecord>,
}

impl ChangeSet {
    /// True when the pass touched nothing.
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.changed.is_empty()
    }
}

/// Events emitted by a single record.
#[derive(Debug, Clone, PartialEq)]
pub enum RecordEvent {
    /// Attributes actually changed; carries the new values.
    Change {
        changed: serde_json::Map<String, Value>,
    },
    /// The record was touched (set), whether or not anything differed.
    Dirty,
    /// Render output was produced (cached or fresh).
    Render,
    /// A runtime anomaly; the operation also returned an error.
    Error { message: String },
}

/// Events emitted by a collection.
#[derive(Debug, Clone, PartialEq)]
pub enum CollectionEvent {
    /// Construction completed.
    Initialized { name: String },
    /// Some mutation occurred since the last clean.
    Dirty,
    /// Reconciliation or membership change; carries the delta.
    Change(ChangeSet),
    /// The item order was re-established.
    Sort,
    /// The collection was emptied; carries a snapshot of the evicted items.
    Clear { items: Vec<Value> },
    /// Render output is about to be produced.
    BeforeRender,
    /// Render output was produced (cached or fresh).
    Render,
    /// A runtime anomaly; the operation also returned an error.
    Error { message: String },
    /// A fetch request settled (emitted by the transport boundary).
    Load {
        result: Option<ChangeSet>,
        error: Option<String>,
        data: Value,
    },
    /// A save request settled (emitted by the transport boundary).
    Save {
        status: String,
        error: Option<String>,
        result: Option<ChangeSet>,
    },
}
