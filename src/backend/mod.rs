//! The external managed service: identity provider plus document database.
//!
//! Everything durable lives behind [`Backend`]. The core only ever sees
//! identities, untyped documents and [`Subscription`] handles for the two
//! push channels (auth state and live collection queries).

mod firebase;
mod firestore_value;
mod listeners;
mod memory;

pub use firebase::{FirebaseBackend, FirebaseSettings};
pub use listeners::ListenerSet;
pub use memory::MemoryBackend;

use crate::error::BackendError;
use std::cmp::Ordering;
use std::fmt;
use std::future::Future;
use tokio::sync::mpsc;

/// Untyped document body as the backend stores it.
pub type Fields = serde_json::Map<String, serde_json::Value>;

macro_rules! string_id {
    ($name:ident) => {
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(String);

        impl $name {
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

string_id!(UserId);
string_id!(DocumentId);

/// An authenticated user reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub id: UserId,
    pub email: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub id: DocumentId,
    pub fields: Fields,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Ascending,
    Descending,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderBy {
    pub field: String,
    pub direction: Direction,
}

/// A collection query: one optional equality filter and one optional ordering.
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    pub collection: String,
    pub filter: Option<(String, serde_json::Value)>,
    pub order_by: Option<OrderBy>,
}

impl Query {
    pub fn collection(name: impl Into<String>) -> Self {
        Query {
            collection: name.into(),
            filter: None,
            order_by: None,
        }
    }

    pub fn where_eq(mut self, field: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.filter = Some((field.into(), value.into()));
        self
    }

    pub fn order_by(mut self, field: impl Into<String>, direction: Direction) -> Self {
        self.order_by = Some(OrderBy {
            field: field.into(),
            direction,
        });
        self
    }

    pub fn matches(&self, document: &Document) -> bool {
        match &self.filter {
            Some((field, value)) => document.fields.get(field) == Some(value),
            None => true,
        }
    }

    /// Applies filter and ordering to a document set. Ties fall back to document id.
    pub fn run<'a>(&self, documents: impl IntoIterator<Item = &'a Document>) -> Vec<Document> {
        let mut result: Vec<Document> = documents
            .into_iter()
            .filter(|d| self.matches(d))
            .cloned()
            .collect();

        if let Some(order) = &self.order_by {
            result.sort_by(|a, b| {
                let ord = compare_values(a.fields.get(&order.field), b.fields.get(&order.field))
                    .then_with(|| a.id.cmp(&b.id));
                match order.direction {
                    Direction::Ascending => ord,
                    Direction::Descending => ord.reverse(),
                }
            });
        }
        result
    }
}

fn compare_values(a: Option<&serde_json::Value>, b: Option<&serde_json::Value>) -> Ordering {
    use serde_json::Value;

    match (a, b) {
        (Some(Value::String(a)), Some(Value::String(b))) => a.cmp(b),
        (Some(Value::Number(a)), Some(Value::Number(b))) => {
            let (a, b) = (a.as_f64().unwrap_or(0.0), b.as_f64().unwrap_or(0.0));
            a.partial_cmp(&b).unwrap_or(Ordering::Equal)
        }
        (Some(Value::Bool(a)), Some(Value::Bool(b))) => a.cmp(b),
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        _ => Ordering::Equal,
    }
}

/// A standing request for pushes from the backend.
///
/// The release action runs exactly once: on [`Subscription::unsubscribe`] or
/// when the handle is dropped, whichever comes first.
pub struct Subscription<T> {
    receiver: mpsc::UnboundedReceiver<T>,
    release: Option<Box<dyn FnOnce() + Send>>,
}

impl<T> Subscription<T> {
    pub fn new(
        receiver: mpsc::UnboundedReceiver<T>,
        release: impl FnOnce() + Send + 'static,
    ) -> Self {
        Subscription {
            receiver,
            release: Some(Box::new(release)),
        }
    }

    /// Waits for the next push. `None` once the backend has gone away.
    pub async fn next(&mut self) -> Option<T> {
        self.receiver.recv().await
    }

    /// Returns an already delivered push without waiting.
    pub fn try_next(&mut self) -> Option<T> {
        self.receiver.try_recv().ok()
    }

    pub fn unsubscribe(self) {}
}

impl<T> Drop for Subscription<T> {
    fn drop(&mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
        self.receiver.close();
    }
}

impl<T> fmt::Debug for Subscription<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("released", &self.release.is_none())
            .finish()
    }
}

/// Capability surface of the managed service.
pub trait Backend: Send + Sync {
    fn sign_up(
        &self,
        email: &str,
        password: &str,
    ) -> impl Future<Output = Result<Identity, BackendError>> + Send;

    fn sign_in(
        &self,
        email: &str,
        password: &str,
    ) -> impl Future<Output = Result<Identity, BackendError>> + Send;

    fn sign_out(&self) -> impl Future<Output = Result<(), BackendError>> + Send;

    /// The first push carries the current auth state.
    fn on_auth_state_change(&self) -> Subscription<Option<Identity>>;

    /// Every push carries the full current result set, starting with the
    /// result at subscription time.
    fn subscribe_collection(&self, query: Query) -> Subscription<Vec<Document>>;

    fn create_document(
        &self,
        collection: &str,
        fields: Fields,
    ) -> impl Future<Output = Result<DocumentId, BackendError>> + Send;

    /// Merges `fields` into an existing document. Fails if it does not exist.
    fn update_document(
        &self,
        collection: &str,
        id: &DocumentId,
        fields: Fields,
    ) -> impl Future<Output = Result<(), BackendError>> + Send;

    fn delete_document(
        &self,
        collection: &str,
        id: &DocumentId,
    ) -> impl Future<Output = Result<(), BackendError>> + Send;
}
