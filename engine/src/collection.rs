//! Collection: ordered aggregate of records with snapshot reconciliation.
//!
//! This is the core of the engine. Given a full snapshot of plain
//! attribute mappings, [`Collection::set`] produces a consistent merged
//! state and a delta describing what happened.
//!
//! # Algorithm
//!
//! 1. Validate the snapshot shape; nothing mutates on a bad input.
//! 2. Classify every current record by looking up a snapshot element with
//!    an equal raw key (an element with an absent or empty key never
//!    matches). Unmatched records are marked for removal, matched elements
//!    are bound to their record and consumed.
//! 3. Evict marked records silently.
//! 4. Apply each bound element through a silent record patch; records
//!    whose change-set came back non-empty join the changed list.
//! 5. Append leftover elements as new records, in input order.
//! 6. Sort the whole sequence with the active comparator, exactly once
//!    per call, no matter how many phases invalidated the order.
//! 7. Finalize: cache invalidation, dirty flag, events, delta.
//!
//! Matching is O(n·m); the single sort is O(n log n) per call, not per
//! mutation.

use crate::equal::{deep_equal, value_type_name};
use crate::events::{ChangeSet, ChangedRecord, CollectionEvent, Emitter};
use crate::ident::{system_time, IdSource, TimeSource};
use crate::record::{key_is_empty, key_to_string, PatchOptions, Record, RecordOptions};
use crate::template::{Attributes, Template};
use crate::{Error, RecordId, Result, Timestamp, DEFAULT_KEY_FIELD};
use serde_json::Value;
use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// Total-order function over two records.
pub type Comparator = Arc<dyn Fn(&Record, &Record) -> Ordering + Send + Sync>;

/// Total order over JSON values, for comparators.
///
/// Values of different categories order by category
/// (null < bool < number < string < array < object); numbers compare
/// numerically, strings lexicographically, sequences by length then
/// element.
pub fn compare_values(a: &Value, b: &Value) -> Ordering {
    fn rank(value: &Value) -> u8 {
        match value {
            Value::Null => 0,
            Value::Bool(_) => 1,
            Value::Number(_) => 2,
            Value::String(_) => 3,
            Value::Array(_) => 4,
            Value::Object(_) => 5,
        }
    }

    match (a, b) {
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::Number(x), Value::Number(y)) => {
            let x = x.as_f64().unwrap_or(0.0);
            let y = y.as_f64().unwrap_or(0.0);
            x.partial_cmp(&y).unwrap_or(Ordering::Equal)
        }
        (Value::String(x), Value::String(y)) => x.cmp(y),
        (Value::Array(x), Value::Array(y)) => x.len().cmp(&y.len()).then_with(|| {
            x.iter()
                .zip(y.iter())
                .map(|(xv, yv)| compare_values(xv, yv))
                .find(|o| *o != Ordering::Equal)
                .unwrap_or(Ordering::Equal)
        }),
        (Value::Object(x), Value::Object(y)) => x
            .len()
            .cmp(&y.len())
            .then_with(|| Value::Object(x.clone()).to_string().cmp(&Value::Object(y.clone()).to_string())),
        _ => rank(a).cmp(&rank(b)),
    }
}

/// Construction configuration for [`Collection`].
///
/// Extension points are typed capability fields: a comparator, render
/// templates, an id source, and a time source.
#[derive(Clone)]
pub struct CollectionConfig {
    pub name: String,
    /// Emit operational logs through `tracing` at debug level.
    pub debug: bool,
    /// Name of the key attribute on every record.
    pub key_field: String,
    /// Default attributes cloned into every created record.
    pub defaults: Attributes,
    /// Collection-level render template.
    pub template: Option<Template>,
    /// Render template handed to every created record.
    pub item_template: Option<Template>,
    /// Ordering; defaults to raw key value descending.
    pub comparator: Option<Comparator>,
    pub ids: IdSource,
    pub time: TimeSource,
}

impl CollectionConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            debug: false,
            key_field: DEFAULT_KEY_FIELD.to_string(),
            defaults: Attributes::new(),
            template: None,
            item_template: None,
            comparator: None,
            ids: IdSource::default(),
            time: system_time(),
        }
    }

    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    pub fn with_key_field(mut self, key_field: impl Into<String>) -> Self {
        self.key_field = key_field.into();
        self
    }

    pub fn with_defaults(mut self, defaults: Attributes) -> Self {
        self.defaults = defaults;
        self
    }

    pub fn with_template(mut self, template: Template) -> Self {
        self.template = Some(template);
        self
    }

    pub fn with_item_template(mut self, template: Template) -> Self {
        self.item_template = Some(template);
        self
    }

    pub fn with_comparator(
        mut self,
        comparator: impl Fn(&Record, &Record) -> Ordering + Send + Sync + 'static,
    ) -> Self {
        self.comparator = Some(Arc::new(comparator));
        self
    }

    pub fn with_ids(mut self, ids: IdSource) -> Self {
        self.ids = ids;
        self
    }

    pub fn with_time(mut self, time: TimeSource) -> Self {
        self.time = time;
        self
    }
}

/// Options for [`Collection::set`].
#[derive(Debug, Clone, Copy, Default)]
pub struct SetOptions {
    /// Suppress the `Change` event (`Dirty` still fires).
    pub silent: bool,
}

impl SetOptions {
    pub fn silent() -> Self {
        Self { silent: true }
    }
}

/// Options for [`Collection::add`].
#[derive(Debug, Clone, Copy, Default)]
pub struct AddOptions {
    /// Suppress the `Dirty`/`Change` events.
    pub silent: bool,
    /// Append without re-sorting, leaving the order flag invalid.
    pub no_sort: bool,
}

impl AddOptions {
    pub fn silent() -> Self {
        Self {
            silent: true,
            no_sort: false,
        }
    }
}

/// Options for [`Collection::remove`].
#[derive(Debug, Clone, Copy, Default)]
pub struct RemoveOptions {
    pub silent: bool,
}

/// Options for [`Collection::sort`].
#[derive(Debug, Clone, Copy, Default)]
pub struct SortOptions {
    pub silent: bool,
}

/// Options for [`Collection::clear`].
#[derive(Debug, Clone, Copy, Default)]
pub struct ClearOptions {
    pub silent: bool,
}

/// Ordered aggregate of uniquely-keyed records.
///
/// Invariant: at most one record per distinct raw key value.
pub struct Collection {
    name: String,
    id: String,
    created_at: Timestamp,
    items: Vec<Record>,
    key_field: String,
    defaults: Attributes,
    template: Option<Template>,
    item_template: Option<Template>,
    comparator: Comparator,
    sorted: bool,
    dirty: bool,
    /// True until the first successful snapshot merge.
    initial: bool,
    render_cache: Option<Value>,
    ids: IdSource,
    time: TimeSource,
    debug: bool,
    events: Emitter<CollectionEvent>,
}

impl Collection {
    /// Create a collection from its configuration.
    pub fn new(config: CollectionConfig) -> Self {
        let CollectionConfig {
            name,
            debug,
            key_field,
            defaults,
            template,
            item_template,
            comparator,
            mut ids,
            time,
        } = config;

        let id = ids.next_id();
        let created_at = time();
        let comparator =
            comparator.unwrap_or_else(|| Arc::new(|a, b| compare_values(b.key(), a.key())));

        let collection = Self {
            name,
            id,
            created_at,
            items: Vec::new(),
            key_field,
            defaults,
            template,
            item_template,
            comparator,
            sorted: true,
            dirty: false,
            initial: true,
            render_cache: None,
            ids,
            time,
            debug,
            events: Emitter::new(),
        };

        if collection.debug {
            debug!(collection = %collection.name, id = %collection.id, "initialized");
        }
        collection.events.emit(&CollectionEvent::Initialized {
            name: collection.name.clone(),
        });
        collection
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn created_at(&self) -> Timestamp {
        self.created_at
    }

    pub fn key_field(&self) -> &str {
        &self.key_field
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// True when the item order is known to match the active comparator.
    pub fn is_sorted(&self) -> bool {
        self.sorted
    }

    /// True until the first successful snapshot merge.
    pub fn is_initial(&self) -> bool {
        self.initial
    }

    /// The collection's event bus.
    pub fn events(&self) -> &Emitter<CollectionEvent> {
        &self.events
    }

    /// Record with the given raw key, if present.
    pub fn get(&self, key: &Value) -> Option<&Record> {
        self.items.iter().find(|r| deep_equal(r.key(), key))
    }

    /// Mutable access to the record with the given raw key.
    pub fn get_mut(&mut self, key: &Value) -> Option<&mut Record> {
        self.items.iter_mut().find(|r| deep_equal(r.key(), key))
    }

    /// Record at a position in the current order.
    pub fn at(&self, index: usize) -> Option<&Record> {
        self.items.get(index)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Record> {
        self.items.iter()
    }

    /// Emit an `Error` event and hand the error back.
    fn fail(&self, err: Error) -> Error {
        self.events.emit(&CollectionEvent::Error {
            message: err.to_string(),
        });
        err
    }

    /// Build a record from the defaults merged under `attrs`, generating a
    /// key when the element carries none.
    fn build_record(&mut self, attrs: Attributes) -> Result<Record> {
        let mut merged = self.defaults.clone();
        for (key, value) in attrs {
            merged.insert(key, value);
        }
        if key_is_empty(merged.get(&self.key_field)) {
            merged.insert(
                self.key_field.clone(),
                Value::String(self.ids.next_id()),
            );
        }
        Record::new(
            merged,
            RecordOptions {
                key_field: self.key_field.clone(),
                template: self.item_template.clone(),
                time: Arc::clone(&self.time),
            },
        )
    }

    /// Reconcile a full snapshot against the current membership.
    ///
    /// Every element must be a JSON object; otherwise an `Error` event is
    /// emitted and the call fails with no mutation at all. Elements that
    /// share a non-empty key are collapsed, last occurrence winning, so
    /// the snapshot is a keyed set.
    ///
    /// Returns the delta. When the delta is non-empty the render cache is
    /// invalidated, the collection is marked dirty, `Dirty` fires, and a
    /// single `Change` fires unless silent. A no-op merge emits nothing.
    pub fn set(&mut self, new_items: Vec<Value>, options: &SetOptions) -> Result<ChangeSet> {
        // Shape validation before any mutation.
        let mut working: Vec<Attributes> = Vec::with_capacity(new_items.len());
        for (index, item) in new_items.into_iter().enumerate() {
            match item {
                Value::Object(map) => working.push(map),
                other => {
                    return Err(self.fail(Error::InvalidItem {
                        index,
                        got: value_type_name(&other),
                    }))
                }
            }
        }

        dedupe_by_key(&mut working, &self.key_field);

        // Classify: bind each current record to its matching element.
        let mut consumed = vec![false; working.len()];
        let mut bindings: Vec<Option<usize>> = Vec::with_capacity(self.items.len());
        for record in &self.items {
            let key = record.key();
            let slot = working.iter().enumerate().position(|(i, element)| {
                !consumed[i]
                    && element
                        .get(&self.key_field)
                        .map(|candidate| {
                            !key_is_empty(Some(candidate)) && deep_equal(candidate, key)
                        })
                        .unwrap_or(false)
            });
            if let Some(i) = slot {
                consumed[i] = true;
            }
            bindings.push(slot);
        }

        // Remove phase: evict unmatched records silently.
        let mut removed: Vec<RecordId> = Vec::new();
        let mut kept: Vec<Record> = Vec::with_capacity(self.items.len());
        let mut kept_bindings: Vec<usize> = Vec::new();
        let old_items = std::mem::take(&mut self.items);
        for (record, binding) in old_items.into_iter().zip(bindings) {
            match binding {
                None => removed.push(record.id()),
                Some(i) => {
                    kept.push(record);
                    kept_bindings.push(i);
                }
            }
        }
        self.items = kept;

        // Change phase: consume each bound element through a silent patch.
        let mut working: Vec<Option<Attributes>> = working.into_iter().map(Some).collect();
        let mut changed: Vec<ChangedRecord> = Vec::new();
        for (record, i) in self.items.iter_mut().zip(kept_bindings) {
            if let Some(element) = working[i].take() {
                // Bound elements always carry the key, so the patch is
                // never empty.
                let delta = record
                    .set(element, &PatchOptions::silent())
                    .unwrap_or_default();
                if !delta.is_empty() {
                    changed.push(ChangedRecord {
                        id: record.id(),
                        fields: delta,
                    });
                }
            }
        }

        // Add phase: leftovers become new records, in input order.
        let mut added: Vec<RecordId> = Vec::new();
        for element in working.into_iter().flatten() {
            let record = self.build_record(element)?;
            added.push(record.id());
            self.items.push(record);
        }

        // One sort per call, however many phases invalidated the order.
        let comparator = Arc::clone(&self.comparator);
        self.items.sort_by(|a, b| comparator(a, b));
        self.sorted = true;

        let delta = ChangeSet {
            added,
            removed,
            changed,
        };

        if self.debug {
            debug!(
                collection = %self.name,
                added = delta.added.len(),
                removed = delta.removed.len(),
                changed = delta.changed.len(),
                "snapshot reconciled"
            );
        }

        if !delta.is_empty() {
            self.render_cache = None;
            self.dirty = true;
            self.events.emit(&CollectionEvent::Dirty);
            if !options.silent {
                self.events.emit(&CollectionEvent::Change(delta.clone()));
            }
        }
        self.initial = false;

        Ok(delta)
    }

    /// Append new records built from the given attribute mappings.
    ///
    /// The whole batch is validated first (object shape, and no key that
    /// already exists or repeats within the batch), so a failing add
    /// mutates nothing. Elements without a key get a generated one.
    /// Returns the new record ids.
    pub fn add(&mut self, items: Vec<Value>, options: &AddOptions) -> Result<Vec<RecordId>> {
        let mut incoming: Vec<Attributes> = Vec::with_capacity(items.len());
        for (index, item) in items.into_iter().enumerate() {
            match item {
                Value::Object(map) => incoming.push(map),
                other => {
                    return Err(self.fail(Error::InvalidItem {
                        index,
                        got: value_type_name(&other),
                    }))
                }
            }
        }

        if incoming.is_empty() {
            return Ok(Vec::new());
        }

        let mut batch_keys: Vec<Value> = Vec::new();
        for element in &incoming {
            if let Some(key) = element.get(&self.key_field) {
                if key_is_empty(Some(key)) {
                    continue;
                }
                let exists = self.items.iter().any(|r| deep_equal(r.key(), key))
                    || batch_keys.iter().any(|k| deep_equal(k, key));
                if exists {
                    return Err(self.fail(Error::DuplicateKey(key_to_string(key))));
                }
                batch_keys.push(key.clone());
            }
        }

        let mut added: Vec<RecordId> = Vec::new();
        for element in incoming {
            let record = self.build_record(element)?;
            added.push(record.id());
            self.items.push(record);
        }

        self.render_cache = None;
        if options.no_sort {
            self.sorted = false;
        } else {
            let comparator = Arc::clone(&self.comparator);
            self.items.sort_by(|a, b| comparator(a, b));
            self.sorted = true;
        }
        self.dirty = true;

        if self.debug {
            debug!(collection = %self.name, count = added.len(), "records added");
        }

        if !options.silent {
            self.events.emit(&CollectionEvent::Dirty);
            self.events.emit(&CollectionEvent::Change(ChangeSet {
                added: added.clone(),
                ..ChangeSet::default()
            }));
        }

        Ok(added)
    }

    /// Append a single record; returns its id.
    pub fn add_one(&mut self, item: Value, options: &AddOptions) -> Result<RecordId> {
        let mut ids = self.add(vec![item], options)?;
        Ok(ids.remove(0))
    }

    /// Remove the record whose key matches `target`.
    ///
    /// The target may be the raw key value or its string form (a numeric
    /// key matches its decimal string and vice versa). An unmatched target
    /// emits `Error` and fails with [`Error::RecordNotFound`], mutating
    /// nothing. Returns the removed record.
    pub fn remove(&mut self, target: &Value, options: &RemoveOptions) -> Result<Record> {
        let position = self
            .items
            .iter()
            .position(|r| deep_equal(r.key(), target) || r.id() == key_to_string(target));
        let Some(index) = position else {
            return Err(self.fail(Error::RecordNotFound(key_to_string(target))));
        };

        let record = self.items.remove(index);
        self.render_cache = None;
        self.dirty = true;

        if self.debug {
            debug!(collection = %self.name, id = %record.id(), "record removed");
        }

        if !options.silent {
            self.events.emit(&CollectionEvent::Dirty);
            self.events.emit(&CollectionEvent::Change(ChangeSet {
                removed: vec![record.id()],
                ..ChangeSet::default()
            }));
        }

        Ok(record)
    }

    /// Re-establish the item order with the default comparator.
    pub fn sort(&mut self, options: &SortOptions) {
        self.sort_with(options, None);
    }

    /// Re-establish the item order, optionally with a one-off comparator.
    pub fn sort_with(&mut self, options: &SortOptions, comparator: Option<&Comparator>) {
        let comparator = comparator
            .cloned()
            .unwrap_or_else(|| Arc::clone(&self.comparator));
        self.items.sort_by(|a, b| comparator(a, b));
        self.sorted = true;
        if !options.silent {
            self.events.emit(&CollectionEvent::Sort);
        }
    }

    /// Records whose attribute `key` strictly equals `value`.
    pub fn where_by(&self, key: &str, value: &Value) -> Vec<&Record> {
        self.items
            .iter()
            .filter(|r| r.get(key) == Some(value))
            .collect()
    }

    /// Records whose intrinsic or internal property `key` equals `value`.
    pub fn where_internal(&self, key: &str, value: &Value) -> Vec<&Record> {
        self.items
            .iter()
            .filter(|r| r.internal_value(key).as_ref() == Some(value))
            .collect()
    }

    /// Records matching an arbitrary predicate.
    pub fn filter(&self, predicate: impl Fn(&Record) -> bool) -> Vec<&Record> {
        self.items.iter().filter(|r| predicate(r)).collect()
    }

    /// Map every record through `f`, in the current order.
    pub fn map<T>(&self, f: impl Fn(&Record) -> T) -> Vec<T> {
        self.items.iter().map(f).collect()
    }

    /// Empty the collection.
    ///
    /// Emits `Clear` with a snapshot of the evicted items unless silent,
    /// then empties. On return `len() == 0` and the collection is dirty,
    /// whether or not any handler is attached.
    pub fn clear(&mut self, options: &ClearOptions) {
        if !options.silent {
            let snapshot: Vec<Value> = self.items.iter().map(|r| r.to_json()).collect();
            self.events.emit(&CollectionEvent::Clear { items: snapshot });
        }
        self.items.clear();
        self.render_cache = None;
        self.dirty = true;

        if self.debug {
            debug!(collection = %self.name, "cleared");
        }
    }

    /// Reset the dirty flag; `deep` also cleans every record.
    pub fn clean(&mut self, deep: bool) {
        self.dirty = false;
        if deep {
            for record in &mut self.items {
                record.clean();
            }
        }
    }

    /// Render the collection.
    ///
    /// Output is cached until the next membership or attribute change; a
    /// no-op snapshot merge does not invalidate it. Fresh output composes
    /// each item's own render plus the collection metadata, through the
    /// collection template when one is configured. Emits `BeforeRender`
    /// before fresh composition and `Render` after any output, cached or
    /// fresh.
    pub fn render(&mut self) -> Value {
        if let Some(cached) = &self.render_cache {
            let output = cached.clone();
            self.events.emit(&CollectionEvent::Render);
            return output;
        }

        self.events.emit(&CollectionEvent::BeforeRender);

        let rendered_items: Vec<Value> = self.items.iter_mut().map(|r| r.render()).collect();
        let mut data = Attributes::new();
        data.insert("name".to_string(), Value::String(self.name.clone()));
        data.insert("id".to_string(), Value::String(self.id.clone()));
        data.insert("length".to_string(), Value::from(self.items.len()));
        data.insert("items".to_string(), Value::Array(rendered_items));

        let output = match &self.template {
            Some(template) => Value::String(template.render(&data)),
            None => Value::Object(data),
        };

        self.render_cache = Some(output.clone());
        self.events.emit(&CollectionEvent::Render);
        output
    }

    /// Plain-data form: `{ name, id, created, length, items }` with the
    /// creation time as an ISO-8601 string.
    pub fn to_json(&self) -> Value {
        let items: Vec<Value> = self.items.iter().map(|r| r.to_json()).collect();
        let mut out = Attributes::new();
        out.insert("name".to_string(), Value::String(self.name.clone()));
        out.insert("id".to_string(), Value::String(self.id.clone()));
        out.insert(
            "created".to_string(),
            Value::String(iso8601(self.created_at)),
        );
        out.insert("length".to_string(), Value::from(self.items.len()));
        out.insert("items".to_string(), Value::Array(items));
        Value::Object(out)
    }

    /// JSON-text form of [`Collection::to_json`].
    pub fn to_json_string(&self) -> Result<String> {
        serde_json::to_string(&self.to_json()).map_err(|e| Error::Serialize(e.to_string()))
    }
}

impl fmt::Debug for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Collection")
            .field("name", &self.name)
            .field("id", &self.id)
            .field("len", &self.items.len())
            .field("dirty", &self.dirty)
            .field("sorted", &self.sorted)
            .finish()
    }
}

/// Collapse elements sharing a non-empty key; the last occurrence wins.
fn dedupe_by_key(working: &mut Vec<Attributes>, key_field: &str) {
    let mut seen: Vec<Value> = Vec::new();
    let mut keep = vec![true; working.len()];
    for i in (0..working.len()).rev() {
        if let Some(key) = working[i].get(key_field) {
            if key_is_empty(Some(key)) {
                continue;
            }
            if seen.iter().any(|k| deep_equal(k, key)) {
                keep[i] = false;
            } else {
                seen.push(key.clone());
            }
        }
    }
    let mut index = 0;
    working.retain(|_| {
        let kept = keep[index];
        index += 1;
        kept
    });
}

fn iso8601(ms: Timestamp) -> String {
    chrono::DateTime::from_timestamp_millis(ms as i64)
        .map(|dt| dt.to_rfc3339_opts(chrono::SecondsFormat::Millis, true))
        .unwrap_or_default()
}
