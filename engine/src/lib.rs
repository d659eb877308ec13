//! # Muster Engine
//!
//! An in-memory observable data-container pair: a [`Collection`] of
//! uniquely-keyed [`Record`]s that can diff a full snapshot against its
//! current state, emit granular change notifications, track dirty/clean
//! status, and serialize to plain data.
//!
//! ## Design Principles
//!
//! - **No IO**: the engine has no knowledge of files, network, or platform
//! - **Synchronous**: every operation runs to completion before returning
//! - **Deterministic**: ids and timestamps come from injected capabilities,
//!   so the same inputs always produce the same outputs
//! - **Observable**: each record and collection owns a typed event bus
//!
//! ## Core Concepts
//!
//! ### Records
//!
//! A [`Record`] is a keyed attribute mapping with change tracking. Its
//! identity is the raw value of the key attribute (`"id"` by default),
//! which must be present and non-empty from construction on. Patching a
//! record compares each entry structurally and records only the entries
//! that actually differed.
//!
//! ### Collections
//!
//! A [`Collection`] is an ordered aggregate of records holding at most one
//! record per key. [`Collection::set`] reconciles a full snapshot against
//! the current membership: unmatched records are removed, matched elements
//! are applied as patches, leftovers become new records, and the sequence
//! is re-sorted exactly once. The returned [`ChangeSet`] lists what was
//! added, removed, and actually changed.
//!
//! ### Events
//!
//! Both entities publish closed event enums through a synchronous,
//! reentrancy-safe [`Emitter`]. Handlers run in registration order; a
//! handler may freely subscribe, unsubscribe, or re-emit during delivery.
//!
//! ## Quick Start
//!
//! ```rust
//! use muster_engine::{Collection, CollectionConfig, SetOptions};
//! use serde_json::json;
//!
//! let mut tasks = Collection::new(CollectionConfig::new("tasks"));
//!
//! tasks.set(
//!     vec![json!({"id": 1, "name": "a"}), json!({"id": 2, "name": "b"})],
//!     &SetOptions::default(),
//! ).unwrap();
//!
//! let delta = tasks.set(
//!     vec![json!({"id": 2, "name": "b2"}), json!({"id": 3, "name": "c"})],
//!     &SetOptions::default(),
//! ).unwrap();
//!
//! assert_eq!(delta.removed, vec!["1"]);
//! assert_eq!(delta.added, vec!["3"]);
//! assert_eq!(delta.changed[0].id, "2");
//! ```

pub mod collection;
pub mod equal;
pub mod error;
pub mod events;
pub mod ident;
pub mod record;
pub mod template;

// Re-export main types at crate root
pub use collection::{
    compare_values, AddOptions, ClearOptions, Collection, CollectionConfig, Comparator,
    RemoveOptions, SetOptions, SortOptions,
};
pub use equal::deep_equal;
pub use error::{Error, Result};
pub use events::{
    ChangeSet, ChangedRecord, CollectionEvent, Emitter, RecordEvent, SubscriberId,
};
pub use ident::{fixed_time, system_time, IdSource, TimeSource};
pub use record::{PatchOptions, PatchScope, Record, RecordOptions, DEFAULT_KEY_FIELD};
pub use template::{Attributes, Template};

/// Type aliases for clarity
pub type RecordId = String;
pub type Timestamp = u64;
