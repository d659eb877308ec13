//! # Muster Transport
//!
//! The fetch/save boundary for Muster collections. The adapter does not
//! perform IO itself: the caller supplies a future resolving to a result
//! envelope (an HTTP client, a queue, a fixture in tests), and the adapter
//! translates the outcome into collection calls and `Load`/`Save` events.
//!
//! ## Concurrency
//!
//! Both [`TransportAdapter::fetch`] and [`TransportAdapter::save`] take
//! `&mut self`, so two requests against the same adapter cannot interleave:
//! each call runs its continuation to completion before the next can start.
//! Cancellation is not supported as such: dropping an in-flight future
//! abandons the call before it has mutated anything.

use muster_engine::{ChangeSet, Collection, CollectionEvent, SetOptions};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::future::Future;
use thiserror::Error;
use tracing::{debug, warn};

/// Status string reported by a successful save.
pub const SAVE_STATUS_SUCCESS: &str = "success";

/// Successful fetch result: a snapshot plus opaque side data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FetchEnvelope {
    pub items: Vec<Value>,
    #[serde(default)]
    pub data: Value,
}

/// Failed fetch result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FetchFailure {
    pub error_message: String,
    #[serde(default)]
    pub data: Value,
}

/// Save result. `status` is `"success"` or an implementation-defined
/// failure marker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveEnvelope {
    pub status: String,
    #[serde(default)]
    pub items: Vec<Value>,
    #[serde(default)]
    pub error_message: Option<String>,
}

impl SaveEnvelope {
    /// Successful save, optionally carrying canonical items to merge back.
    pub fn success(items: Vec<Value>) -> Self {
        Self {
            status: SAVE_STATUS_SUCCESS.to_string(),
            items,
            error_message: None,
        }
    }

    /// Failed save with a failure status and message.
    pub fn failure(status: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            status: status.into(),
            items: Vec::new(),
            error_message: Some(message.into()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == SAVE_STATUS_SUCCESS
    }
}

/// All possible errors from the transport boundary.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum TransportError {
    #[error("fetch failed: {0}")]
    Fetch(String),

    #[error("save failed: {0}")]
    Save(String),

    #[error(transparent)]
    Engine(#[from] muster_engine::Error),
}

/// Result type for transport operations.
pub type Result<T> = std::result::Result<T, TransportError>;

/// Translates fetch/save outcomes into collection calls and events.
#[derive(Debug)]
pub struct TransportAdapter {
    collection: Collection,
    last_error: Option<String>,
}

impl TransportAdapter {
    /// Wrap a collection.
    pub fn new(collection: Collection) -> Self {
        Self {
            collection,
            last_error: None,
        }
    }

    pub fn collection(&self) -> &Collection {
        &self.collection
    }

    pub fn collection_mut(&mut self) -> &mut Collection {
        &mut self.collection
    }

    /// Hand the collection back, consuming the adapter.
    pub fn into_collection(self) -> Collection {
        self.collection
    }

    /// Message of the most recent failed request, if any.
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Run a fetch request and reconcile its snapshot into the collection.
    ///
    /// On success the envelope's items go through [`Collection::set`] and
    /// the delta is returned; on failure the message is recorded. A `Load`
    /// event fires on the collection bus either way.
    pub async fn fetch<F>(&mut self, request: F) -> Result<ChangeSet>
    where
        F: Future<Output = std::result::Result<FetchEnvelope, FetchFailure>>,
    {
        match request.await {
            Ok(envelope) => match self.collection.set(envelope.items, &SetOptions::default()) {
                Ok(delta) => {
                    debug!(
                        collection = %self.collection.name(),
                        added = delta.added.len(),
                        removed = delta.removed.len(),
                        changed = delta.changed.len(),
                        "fetch merged"
                    );
                    self.collection.events().emit(&CollectionEvent::Load {
                        result: Some(delta.clone()),
                        error: None,
                        data: envelope.data,
                    });
                    Ok(delta)
                }
                Err(err) => {
                    let message = err.to_string();
                    warn!(collection = %self.collection.name(), %message, "fetch merge rejected");
                    self.last_error = Some(message.clone());
                    self.collection.events().emit(&CollectionEvent::Load {
                        result: None,
                        error: Some(message),
                        data: envelope.data,
                    });
                    Err(TransportError::Engine(err))
                }
            },
            Err(failure) => {
                warn!(
                    collection = %self.collection.name(),
                    message = %failure.error_message,
                    "fetch failed"
                );
                self.last_error = Some(failure.error_message.clone());
                self.collection.events().emit(&CollectionEvent::Load {
                    result: None,
                    error: Some(failure.error_message.clone()),
                    data: failure.data,
                });
                Err(TransportError::Fetch(failure.error_message))
            }
        }
    }

    /// Run a save request and settle the collection accordingly.
    ///
    /// A successful envelope with items merges them back through a silent
    /// [`Collection::set`]; one without items deep-cleans the collection.
    /// A non-success status records the message. A `Save` event fires on
    /// the collection bus either way.
    pub async fn save<F>(&mut self, request: F) -> Result<Option<ChangeSet>>
    where
        F: Future<Output = SaveEnvelope>,
    {
        let envelope = request.await;

        if !envelope.is_success() {
            let message = envelope
                .error_message
                .clone()
                .unwrap_or_else(|| format!("save returned status '{}'", envelope.status));
            warn!(collection = %self.collection.name(), %message, "save failed");
            self.last_error = Some(message.clone());
            self.collection.events().emit(&CollectionEvent::Save {
                status: envelope.status,
                error: Some(message.clone()),
                result: None,
            });
            return Err(TransportError::Save(message));
        }

        let result = if envelope.items.is_empty() {
            // Nothing came back: the local state is now canonical.
            self.collection.clean(true);
            None
        } else {
            match self.collection.set(envelope.items, &SetOptions::silent()) {
                Ok(delta) => Some(delta),
                Err(err) => {
                    let message = err.to_string();
                    warn!(collection = %self.collection.name(), %message, "save merge rejected");
                    self.last_error = Some(message.clone());
                    self.collection.events().emit(&CollectionEvent::Save {
                        status: envelope.status,
                        error: Some(message),
                        result: None,
                    });
                    return Err(TransportError::Engine(err));
                }
            }
        };

        debug!(
            collection = %self.collection.name(),
            merged = result.as_ref().map(|d| !d.is_empty()).unwrap_or(false),
            "save settled"
        );
        self.collection.events().emit(&CollectionEvent::Save {
            status: envelope.status,
            error: None,
            result: result.clone(),
        });
        Ok(result)
    }
}
