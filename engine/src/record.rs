//! Record: a single keyed entity with attributes and change tracking.
//!
//! A record's identity is the raw value of its key attribute
//! (`key_field`, `"id"` by default). The key must be present and non-empty
//! at construction and is expected to stay stable for the record's
//! lifetime; reconciliation correctness depends on it.

use crate::equal::deep_equal;
use crate::events::{Emitter, RecordEvent};
use crate::ident::{system_time, TimeSource};
use crate::template::{Attributes, Template};
use crate::{Error, Result, Timestamp};
use serde_json::Value;
use std::fmt;

/// Default name of the key attribute.
pub const DEFAULT_KEY_FIELD: &str = "id";

/// Which state a patch targets: the public attributes, or the record's
/// internal bookkeeping map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PatchScope {
    #[default]
    Attributes,
    Internal,
}

/// Options for [`Record::set`].
#[derive(Debug, Clone, Copy, Default)]
pub struct PatchOptions {
    pub scope: PatchScope,
    /// Suppress the `Change` event (`Dirty` always fires).
    pub silent: bool,
}

impl PatchOptions {
    /// Attribute-scoped, silent patch.
    pub fn silent() -> Self {
        Self {
            scope: PatchScope::Attributes,
            silent: true,
        }
    }

    /// Internal-scoped patch.
    pub fn internal() -> Self {
        Self {
            scope: PatchScope::Internal,
            silent: false,
        }
    }
}

/// Construction options for [`Record`].
#[derive(Clone)]
pub struct RecordOptions {
    pub key_field: String,
    pub template: Option<Template>,
    pub time: TimeSource,
}

impl Default for RecordOptions {
    fn default() -> Self {
        Self {
            key_field: DEFAULT_KEY_FIELD.to_string(),
            template: None,
            time: system_time(),
        }
    }
}

impl RecordOptions {
    pub fn with_key_field(mut self, key_field: impl Into<String>) -> Self {
        self.key_field = key_field.into();
        self
    }

    pub fn with_template(mut self, template: Template) -> Self {
        self.template = Some(template);
        self
    }

    pub fn with_time(mut self, time: TimeSource) -> Self {
        self.time = time;
        self
    }
}

/// True when a key value counts as absent: missing, null, or "".
pub(crate) fn key_is_empty(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => true,
        Some(Value::String(s)) => s.is_empty(),
        Some(_) => false,
    }
}

/// String form of a raw key value, used for events and error messages.
pub(crate) fn key_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// A keyed entity with attributes, dirty tracking, and change-set
/// computation.
pub struct Record {
    key_field: String,
    attributes: Attributes,
    /// Internal bookkeeping state, written by internal-scoped patches.
    internal: Attributes,
    /// Most recent change-set; replaced on every set, cleared by clean.
    changed: Attributes,
    dirty: bool,
    created_at: Timestamp,
    modified_at: Timestamp,
    template: Option<Template>,
    render_cache: Option<String>,
    time: TimeSource,
    events: Emitter<RecordEvent>,
}

impl Record {
    /// Create a record from its attributes.
    ///
    /// Fails with [`Error::MissingKey`] when `attributes[key_field]` is
    /// missing, null, or empty. On completion the change-set is empty and
    /// the record is not dirty.
    pub fn new(attributes: Attributes, options: RecordOptions) -> Result<Self> {
        if key_is_empty(attributes.get(&options.key_field)) {
            return Err(Error::MissingKey(options.key_field));
        }
        let now = (options.time)();
        Ok(Self {
            key_field: options.key_field,
            attributes,
            internal: Attributes::new(),
            changed: Attributes::new(),
            dirty: false,
            created_at: now,
            modified_at: now,
            template: options.template,
            render_cache: None,
            time: options.time,
            events: Emitter::new(),
        })
    }

    /// Raw key value (`attributes[key_field]`).
    pub fn key(&self) -> &Value {
        // Present by construction invariant.
        self.attributes.get(&self.key_field).unwrap_or(&Value::Null)
    }

    /// Key coerced to its string form.
    pub fn id(&self) -> String {
        key_to_string(self.key())
    }

    /// Name of the key attribute.
    pub fn key_field(&self) -> &str {
        &self.key_field
    }

    /// Full attribute mapping.
    pub fn attributes(&self) -> &Attributes {
        &self.attributes
    }

    /// A single attribute value, if present.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.attributes.get(key)
    }

    /// Deep copies of the requested attributes. Unknown keys are absent
    /// from the result; never fails.
    pub fn pick(&self, keys: &[&str]) -> Attributes {
        let mut out = Attributes::new();
        for key in keys {
            if let Some(value) = self.attributes.get(*key) {
                out.insert((*key).to_string(), value.clone());
            }
        }
        out
    }

    /// The most recent change-set.
    pub fn changed_attributes(&self) -> &Attributes {
        &self.changed
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn created_at(&self) -> Timestamp {
        self.created_at
    }

    pub fn modified_at(&self) -> Timestamp {
        self.modified_at
    }

    /// The record's event bus.
    pub fn events(&self) -> &Emitter<RecordEvent> {
        &self.events
    }

    /// Apply a patch to the scoped state.
    ///
    /// Each entry is compared against the current value with structural
    /// deep equality; only differing entries are applied, and they become
    /// the new change-set. `modified_at` advances only when some entry
    /// actually differed. The record is marked dirty and `Dirty` is
    /// emitted even when nothing differed (a deliberate "touched" signal);
    /// `Change` fires only for a non-empty change-set, unless silent.
    ///
    /// An empty patch emits `Error` and fails with [`Error::EmptyPatch`]
    /// without mutating anything. Returns the change-set.
    pub fn set(&mut self, patch: Attributes, options: &PatchOptions) -> Result<Attributes> {
        if patch.is_empty() {
            let err = Error::EmptyPatch;
            self.events.emit(&RecordEvent::Error {
                message: err.to_string(),
            });
            return Err(err);
        }

        let mut changed = Attributes::new();
        for (key, value) in patch {
            let state = match options.scope {
                PatchScope::Attributes => &self.attributes,
                PatchScope::Internal => &self.internal,
            };
            // An absent entry compares as null: setting null onto a
            // missing key is not a change.
            let current = state.get(&key).unwrap_or(&Value::Null);
            if !deep_equal(current, &value) {
                changed.insert(key.clone(), value.clone());
                let state = match options.scope {
                    PatchScope::Attributes => &mut self.attributes,
                    PatchScope::Internal => &mut self.internal,
                };
                state.insert(key, value);
            }
        }

        let any_changed = !changed.is_empty();
        self.changed = changed.clone();
        if any_changed {
            self.modified_at = (self.time)();
        }
        self.render_cache = None;
        self.dirty = true;

        if any_changed && !options.silent {
            self.events.emit(&RecordEvent::Change {
                changed: changed.clone(),
            });
        }
        self.events.emit(&RecordEvent::Dirty);

        Ok(changed)
    }

    /// Render the record.
    ///
    /// Without a template this is the plain attributes snapshot. With one,
    /// the markup is produced once and cached until the next set. Emits
    /// `Render` after producing output, cached or fresh.
    pub fn render(&mut self) -> Value {
        let output = match &self.template {
            None => Value::Object(self.attributes.clone()),
            Some(template) => {
                let markup = match &self.render_cache {
                    Some(cached) => cached.clone(),
                    None => {
                        let fresh = template.render(&self.attributes);
                        self.render_cache = Some(fresh.clone());
                        fresh
                    }
                };
                Value::String(markup)
            }
        };
        self.events.emit(&RecordEvent::Render);
        output
    }

    /// Clear the change-set and reset the dirty flag. The render cache is
    /// not affected.
    pub fn clean(&mut self) {
        self.changed.clear();
        self.dirty = false;
    }

    /// Deep copy of the attributes.
    pub fn to_json(&self) -> Value {
        Value::Object(self.attributes.clone())
    }

    /// Value of an intrinsic or internal-map property, for internal-scoped
    /// queries. Intrinsics: `id`, `dirty`, `createdAt`, `modifiedAt`.
    pub fn internal_value(&self, key: &str) -> Option<Value> {
        match key {
            "id" => Some(Value::String(self.id())),
            "dirty" => Some(Value::Bool(self.dirty)),
            "createdAt" => Some(Value::from(self.created_at)),
            "modifiedAt" => Some(Value::from(self.modified_at)),
            _ => self.internal.get(key).cloned(),
        }
    }
}

impl fmt::Debug for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Record")
            .field("key", self.key())
            .field("attributes", &self.attributes)
            .field("dirty", &self.dirty)
            .finish()
    }
}
