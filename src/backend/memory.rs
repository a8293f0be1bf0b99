use super::listeners::{lock, ListenerSet};
use super::{Backend, Document, DocumentId, Fields, Identity, Query, Subscription, UserId};
use crate::diary_entry::OWNER_FIELD;
use crate::error::BackendError;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};

const PERMISSION_DENIED: &str = "Missing or insufficient permissions.";
const MIN_PASSWORD_LEN: usize = 6;

struct Account {
    id: UserId,
    password: String,
}

/// Per-listener query together with the result it last received, so
/// listeners only hear about changes that affect them.
struct LiveQuery {
    query: Query,
    last: Vec<Document>,
}

#[derive(Default)]
struct Store {
    accounts: HashMap<String, Account>,
    current: Option<Identity>,
    collections: HashMap<String, BTreeMap<DocumentId, Fields>>,
    next_user: u64,
    next_document: u64,
}

impl Store {
    fn run(&self, query: &Query) -> Vec<Document> {
        let Some(collection) = self.collections.get(&query.collection) else {
            return Vec::new();
        };
        let documents: Vec<Document> = collection
            .iter()
            .map(|(id, fields)| Document {
                id: id.clone(),
                fields: fields.clone(),
            })
            .collect();
        query.run(&documents)
    }

    fn signed_in(&self) -> Result<&Identity, BackendError> {
        self.current
            .as_ref()
            .ok_or_else(|| BackendError::new(PERMISSION_DENIED))
    }
}

/// In-process identity provider and document store with live queries.
///
/// Behaves like a single client session: one identity is current at a time
/// and writes are checked against it the way hosted security rules would.
#[derive(Clone, Default)]
pub struct MemoryBackend {
    store: Arc<Mutex<Store>>,
    auth_listeners: Arc<Mutex<ListenerSet<(), Option<Identity>>>>,
    query_listeners: Arc<Mutex<ListenerSet<LiveQuery, Vec<Document>>>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a document without any permission checks.
    pub fn seed(&self, collection: &str, fields: Fields) -> DocumentId {
        let id = {
            let mut store = lock(&self.store);
            insert(&mut store, collection, fields)
        };
        self.publish(collection);
        id
    }

    /// Number of live collection subscriptions currently held open.
    pub fn live_queries(&self) -> usize {
        lock(&self.query_listeners).len()
    }

    fn set_current(&self, identity: Option<Identity>) {
        let changed = {
            let mut store = lock(&self.store);
            let changed = store.current.as_ref().map(|i| &i.id) != identity.as_ref().map(|i| &i.id);
            store.current = identity.clone();
            changed
        };
        if changed {
            tracing::info!(user = ?identity.as_ref().map(|i| i.id.as_str()), "auth state changed");
            lock(&self.auth_listeners).notify(|_| Some(identity.clone()));
        }
    }

    fn publish(&self, collection: &str) {
        let store = lock(&self.store);
        lock(&self.query_listeners).notify(|live| {
            if live.query.collection != collection {
                return None;
            }
            let result = store.run(&live.query);
            if result == live.last {
                return None;
            }
            live.last = result.clone();
            Some(result)
        });
    }
}

fn insert(store: &mut Store, collection: &str, fields: Fields) -> DocumentId {
    store.next_document += 1;
    let id = DocumentId::new(format!("doc-{:06}", store.next_document));
    store
        .collections
        .entry(collection.to_string())
        .or_default()
        .insert(id.clone(), fields);
    id
}

fn owner_of(fields: &Fields) -> Option<&str> {
    fields.get(OWNER_FIELD).and_then(|v| v.as_str())
}

impl Backend for MemoryBackend {
    async fn sign_up(&self, email: &str, password: &str) -> Result<Identity, BackendError> {
        let identity = {
            let mut store = lock(&self.store);
            if !email.contains('@') {
                return Err(BackendError::new("INVALID_EMAIL"));
            }
            if password.chars().count() < MIN_PASSWORD_LEN {
                return Err(BackendError::new(
                    "WEAK_PASSWORD : Password should be at least 6 characters",
                ));
            }
            if store.accounts.contains_key(email) {
                return Err(BackendError::new("EMAIL_EXISTS"));
            }
            store.next_user += 1;
            let id = UserId::new(format!("user-{}", store.next_user));
            store.accounts.insert(
                email.to_string(),
                Account {
                    id: id.clone(),
                    password: password.to_string(),
                },
            );
            Identity {
                id,
                email: email.to_string(),
            }
        };
        self.set_current(Some(identity.clone()));
        Ok(identity)
    }

    async fn sign_in(&self, email: &str, password: &str) -> Result<Identity, BackendError> {
        let identity = {
            let store = lock(&self.store);
            match store.accounts.get(email) {
                Some(account) if account.password == password => Identity {
                    id: account.id.clone(),
                    email: email.to_string(),
                },
                _ => return Err(BackendError::new("INVALID_LOGIN_CREDENTIALS")),
            }
        };
        self.set_current(Some(identity.clone()));
        Ok(identity)
    }

    async fn sign_out(&self) -> Result<(), BackendError> {
        self.set_current(None);
        Ok(())
    }

    fn on_auth_state_change(&self) -> Subscription<Option<Identity>> {
        let current = lock(&self.store).current.clone();
        ListenerSet::subscribe(&self.auth_listeners, (), current)
    }

    fn subscribe_collection(&self, query: Query) -> Subscription<Vec<Document>> {
        let initial = lock(&self.store).run(&query);
        let live = LiveQuery {
            query,
            last: initial.clone(),
        };
        ListenerSet::subscribe(&self.query_listeners, live, initial)
    }

    async fn create_document(
        &self,
        collection: &str,
        fields: Fields,
    ) -> Result<DocumentId, BackendError> {
        let id = {
            let mut store = lock(&self.store);
            let uid = store.signed_in()?.id.as_str().to_string();
            if owner_of(&fields).is_some_and(|owner| owner != uid) {
                return Err(BackendError::new(PERMISSION_DENIED));
            }
            insert(&mut store, collection, fields)
        };
        tracing::debug!(%collection, %id, "document created");
        self.publish(collection);
        Ok(id)
    }

    async fn update_document(
        &self,
        collection: &str,
        id: &DocumentId,
        fields: Fields,
    ) -> Result<(), BackendError> {
        {
            let mut store = lock(&self.store);
            let uid = store.signed_in()?.id.as_str().to_string();
            let Some(existing) = store
                .collections
                .get_mut(collection)
                .and_then(|c| c.get_mut(id))
            else {
                return Err(BackendError::new(format!(
                    "No document to update: {collection}/{id}"
                )));
            };
            if owner_of(existing).is_some_and(|owner| owner != uid)
                || owner_of(&fields).is_some_and(|owner| owner != uid)
            {
                return Err(BackendError::new(PERMISSION_DENIED));
            }
            existing.extend(fields);
        }
        tracing::debug!(%collection, %id, "document updated");
        self.publish(collection);
        Ok(())
    }

    async fn delete_document(&self, collection: &str, id: &DocumentId) -> Result<(), BackendError> {
        {
            let mut store = lock(&self.store);
            let uid = store.signed_in()?.id.as_str().to_string();
            if let Some(docs) = store.collections.get_mut(collection) {
                if docs
                    .get(id)
                    .and_then(owner_of)
                    .is_some_and(|owner| owner != uid)
                {
                    return Err(BackendError::new(PERMISSION_DENIED));
                }
                docs.remove(id);
            }
        }
        tracing::debug!(%collection, %id, "document deleted");
        self.publish(collection);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::Direction;
    use serde_json::json;

    fn fields(value: serde_json::Value) -> Fields {
        let serde_json::Value::Object(map) = value else {
            panic!("fields must be an object");
        };
        map
    }

    #[tokio::test]
    async fn test_sign_up_then_sign_in_same_identity() {
        let backend = MemoryBackend::new();
        let created = backend.sign_up("a@example.com", "secret1").await.unwrap();
        backend.sign_out().await.unwrap();
        let signed_in = backend.sign_in("a@example.com", "secret1").await.unwrap();

        assert_eq!(created.id, signed_in.id);
        assert_eq!(signed_in.email, "a@example.com");
    }

    #[tokio::test]
    async fn test_sign_up_rejections() {
        let backend = MemoryBackend::new();
        backend.sign_up("a@example.com", "secret1").await.unwrap();

        let err = backend.sign_up("a@example.com", "secret1").await.unwrap_err();
        assert_eq!(err.message, "EMAIL_EXISTS");
        let err = backend.sign_up("b@example.com", "123").await.unwrap_err();
        assert!(err.message.starts_with("WEAK_PASSWORD"));
        let err = backend.sign_up("not-an-email", "secret1").await.unwrap_err();
        assert_eq!(err.message, "INVALID_EMAIL");
    }

    #[tokio::test]
    async fn test_sign_in_wrong_password() {
        let backend = MemoryBackend::new();
        backend.sign_up("a@example.com", "secret1").await.unwrap();
        backend.sign_out().await.unwrap();

        let err = backend.sign_in("a@example.com", "nope").await.unwrap_err();
        assert_eq!(err.message, "INVALID_LOGIN_CREDENTIALS");
    }

    #[tokio::test]
    async fn test_auth_listener_gets_current_then_changes() {
        let backend = MemoryBackend::new();
        let mut auth = backend.on_auth_state_change();
        assert_eq!(auth.try_next(), Some(None));

        let user = backend.sign_up("a@example.com", "secret1").await.unwrap();
        assert_eq!(auth.try_next(), Some(Some(user)));

        backend.sign_out().await.unwrap();
        assert_eq!(auth.try_next(), Some(None));
        assert_eq!(auth.try_next(), None);
    }

    #[tokio::test]
    async fn test_writes_require_sign_in() {
        let backend = MemoryBackend::new();
        let err = backend
            .create_document("posts", fields(json!({"content": "x"})))
            .await
            .unwrap_err();
        assert_eq!(err.message, PERMISSION_DENIED);
    }

    #[tokio::test]
    async fn test_update_missing_document_fails() {
        let backend = MemoryBackend::new();
        backend.sign_up("a@example.com", "secret1").await.unwrap();

        let err = backend
            .update_document("posts", &DocumentId::new("nope"), Fields::new())
            .await
            .unwrap_err();
        assert_eq!(err.message, "No document to update: posts/nope");
    }

    #[tokio::test]
    async fn test_cannot_touch_other_owners_documents() {
        let backend = MemoryBackend::new();
        let id = backend.seed("posts", fields(json!({"userId": "someone-else"})));
        backend.sign_up("a@example.com", "secret1").await.unwrap();

        let err = backend.delete_document("posts", &id).await.unwrap_err();
        assert_eq!(err.message, PERMISSION_DENIED);
        let err = backend
            .update_document("posts", &id, fields(json!({"content": "mine now"})))
            .await
            .unwrap_err();
        assert_eq!(err.message, PERMISSION_DENIED);
    }

    #[tokio::test]
    async fn test_live_query_pushes_only_on_change() {
        let backend = MemoryBackend::new();
        let user = backend.sign_up("a@example.com", "secret1").await.unwrap();
        let mut live = backend.subscribe_collection(
            Query::collection("posts")
                .where_eq("userId", user.id.as_str())
                .order_by("createdAt", Direction::Descending),
        );
        assert_eq!(live.try_next(), Some(Vec::new()));

        backend.seed("posts", fields(json!({"userId": "other"})));
        assert_eq!(live.try_next(), None);

        let id = backend
            .create_document("posts", fields(json!({"userId": user.id.as_str()})))
            .await
            .unwrap();
        let pushed = live.try_next().unwrap();
        assert_eq!(pushed.len(), 1);
        assert_eq!(pushed[0].id, id);
    }

    #[tokio::test]
    async fn test_dropped_subscription_is_unregistered() {
        let backend = MemoryBackend::new();
        let live = backend.subscribe_collection(Query::collection("posts"));
        assert_eq!(backend.live_queries(), 1);

        drop(live);
        assert_eq!(backend.live_queries(), 0);
    }
}
