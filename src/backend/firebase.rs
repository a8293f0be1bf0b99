use super::firestore_value::{decode_fields, encode, encode_fields};
use super::listeners::{lock, ListenerSet};
use super::{
    Backend, Direction, Document, DocumentId, Fields, Identity, Query, Subscription, UserId,
};
use crate::error::BackendError;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::mpsc;

const IDENTITY_TOOLKIT_URL: &str = "https://identitytoolkit.googleapis.com/v1";
const SECURE_TOKEN_URL: &str = "https://securetoken.googleapis.com/v1";
const FIRESTORE_URL: &str = "https://firestore.googleapis.com/v1";
const REFRESH_MARGIN: Duration = Duration::from_secs(60);

/// Connection parameters for a Firebase project.
#[derive(Debug, Clone)]
pub struct FirebaseSettings {
    pub api_key: String,
    pub project_id: String,
    pub poll_interval: Duration,
    pub identity_url: String,
    pub token_url: String,
    pub firestore_url: String,
}

impl FirebaseSettings {
    pub fn new(api_key: impl Into<String>, project_id: impl Into<String>) -> Self {
        FirebaseSettings {
            api_key: api_key.into(),
            project_id: project_id.into(),
            poll_interval: Duration::from_secs(1),
            identity_url: IDENTITY_TOOLKIT_URL.to_string(),
            token_url: SECURE_TOKEN_URL.to_string(),
            firestore_url: FIRESTORE_URL.to_string(),
        }
    }

    fn documents_url(&self) -> String {
        format!(
            "{}/projects/{}/databases/(default)/documents",
            self.firestore_url, self.project_id
        )
    }
}

struct AuthSession {
    identity: Identity,
    id_token: String,
    refresh_token: String,
    expires_at: Instant,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PasswordAuthResponse {
    local_id: String,
    email: String,
    id_token: String,
    refresh_token: String,
    expires_in: String,
}

#[derive(Deserialize)]
struct RefreshResponse {
    id_token: String,
    refresh_token: String,
    expires_in: String,
}

#[derive(Deserialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Deserialize)]
struct ErrorDetail {
    message: String,
}

#[derive(Deserialize)]
struct RawDocument {
    name: String,
    #[serde(default)]
    fields: Value,
}

#[derive(Deserialize)]
struct QueryResult {
    document: Option<RawDocument>,
}

impl TryFrom<RawDocument> for Document {
    type Error = BackendError;

    fn try_from(raw: RawDocument) -> Result<Self, Self::Error> {
        let id = raw.name.rsplit('/').next().unwrap_or_default();
        Ok(Document {
            id: DocumentId::new(id),
            fields: decode_fields(&raw.fields)?,
        })
    }
}

fn expiry(expires_in: &str) -> Instant {
    let secs = expires_in.parse::<u64>().unwrap_or(0);
    Instant::now() + Duration::from_secs(secs)
}

/// Turns a non-success response into the provider's error message.
async fn check(response: reqwest::Response) -> Result<reqwest::Response, BackendError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ErrorBody>(&body)
        .map(|b| b.error.message)
        .unwrap_or_else(|_| format!("request failed with status {status}"));
    Err(BackendError::new(message))
}

/// Builds a Firestore `structuredQuery` body.
fn structured_query(query: &Query) -> Value {
    let mut structured = json!({ "from": [{ "collectionId": query.collection }] });
    if let Some((field, value)) = &query.filter {
        structured["where"] = json!({
            "fieldFilter": {
                "field": { "fieldPath": field },
                "op": "EQUAL",
                "value": encode(value),
            }
        });
    }
    if let Some(order) = &query.order_by {
        let direction = match order.direction {
            Direction::Ascending => "ASCENDING",
            Direction::Descending => "DESCENDING",
        };
        structured["orderBy"] = json!([{
            "field": { "fieldPath": order.field },
            "direction": direction,
        }]);
    }
    json!({ "structuredQuery": structured })
}

/// Identity Toolkit + Firestore over their REST APIs.
///
/// Live queries are polling tasks on the current runtime; a push is only
/// sent when the result set differs from the previous one.
#[derive(Clone)]
pub struct FirebaseBackend {
    http: reqwest::Client,
    settings: Arc<FirebaseSettings>,
    session: Arc<Mutex<Option<AuthSession>>>,
    auth_listeners: Arc<Mutex<ListenerSet<(), Option<Identity>>>>,
}

impl FirebaseBackend {
    pub fn new(settings: FirebaseSettings) -> Self {
        FirebaseBackend {
            http: reqwest::Client::new(),
            settings: Arc::new(settings),
            session: Arc::new(Mutex::new(None)),
            auth_listeners: Arc::new(Mutex::new(ListenerSet::default())),
        }
    }

    fn current_identity(&self) -> Option<Identity> {
        lock(&self.session).as_ref().map(|s| s.identity.clone())
    }

    fn set_session(&self, session: Option<AuthSession>) {
        let identity = session.as_ref().map(|s| s.identity.clone());
        *lock(&self.session) = session;
        tracing::info!(user = ?identity.as_ref().map(|i| i.id.as_str()), "auth state changed");
        lock(&self.auth_listeners).notify(|_| Some(identity.clone()));
    }

    async fn password_auth(
        &self,
        endpoint: &str,
        email: &str,
        password: &str,
    ) -> Result<Identity, BackendError> {
        let url = format!("{}/accounts:{endpoint}", self.settings.identity_url);
        let response = self
            .http
            .post(url)
            .query(&[("key", self.settings.api_key.as_str())])
            .json(&json!({
                "email": email,
                "password": password,
                "returnSecureToken": true,
            }))
            .send()
            .await?;
        let body: PasswordAuthResponse = check(response).await?.json().await?;

        let identity = Identity {
            id: UserId::new(body.local_id),
            email: body.email,
        };
        self.set_session(Some(AuthSession {
            identity: identity.clone(),
            id_token: body.id_token,
            refresh_token: body.refresh_token,
            expires_at: expiry(&body.expires_in),
        }));
        Ok(identity)
    }

    /// Current ID token, refreshed when it is about to expire.
    async fn bearer(&self) -> Result<Option<String>, BackendError> {
        let refresh_token = {
            let session = lock(&self.session);
            match session.as_ref() {
                None => return Ok(None),
                Some(s) if s.expires_at > Instant::now() + REFRESH_MARGIN => {
                    return Ok(Some(s.id_token.clone()))
                }
                Some(s) => s.refresh_token.clone(),
            }
        };

        tracing::debug!("refreshing id token");
        let response = self
            .http
            .post(format!("{}/token", self.settings.token_url))
            .query(&[("key", self.settings.api_key.as_str())])
            .json(&json!({
                "grant_type": "refresh_token",
                "refresh_token": refresh_token,
            }))
            .send()
            .await?;
        let body: RefreshResponse = check(response).await?.json().await?;

        let mut session = lock(&self.session);
        match session.as_mut() {
            // Signed out while the refresh was in flight.
            None => Ok(None),
            Some(s) => {
                s.id_token = body.id_token.clone();
                s.refresh_token = body.refresh_token;
                s.expires_at = expiry(&body.expires_in);
                Ok(Some(body.id_token))
            }
        }
    }

    async fn authorized(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<reqwest::Response, BackendError> {
        let request = match self.bearer().await? {
            Some(token) => request.bearer_auth(token),
            None => request,
        };
        check(request.send().await?).await
    }

    async fn run_query(&self, query: &Query) -> Result<Vec<Document>, BackendError> {
        let url = format!("{}:runQuery", self.settings.documents_url());
        let response = self
            .authorized(self.http.post(url).json(&structured_query(query)))
            .await?;
        let results: Vec<QueryResult> = response.json().await?;
        let documents = results
            .into_iter()
            .filter_map(|r| r.document)
            .filter_map(|raw| {
                let name = raw.name.clone();
                match Document::try_from(raw) {
                    Ok(document) => Some(document),
                    Err(err) => {
                        tracing::warn!(%name, %err, "skipping undecodable document");
                        None
                    }
                }
            })
            .collect();
        Ok(documents)
    }
}

impl Backend for FirebaseBackend {
    async fn sign_up(&self, email: &str, password: &str) -> Result<Identity, BackendError> {
        self.password_auth("signUp", email, password).await
    }

    async fn sign_in(&self, email: &str, password: &str) -> Result<Identity, BackendError> {
        self.password_auth("signInWithPassword", email, password).await
    }

    async fn sign_out(&self) -> Result<(), BackendError> {
        self.set_session(None);
        Ok(())
    }

    fn on_auth_state_change(&self) -> Subscription<Option<Identity>> {
        ListenerSet::subscribe(&self.auth_listeners, (), self.current_identity())
    }

    fn subscribe_collection(&self, query: Query) -> Subscription<Vec<Document>> {
        let (sender, receiver) = mpsc::unbounded_channel();
        let backend = self.clone();
        let interval = self.settings.poll_interval;

        let task = tokio::spawn(async move {
            let mut last: Option<Vec<Document>> = None;
            loop {
                match backend.run_query(&query).await {
                    Ok(documents) if last.as_ref() != Some(&documents) => {
                        if sender.send(documents.clone()).is_err() {
                            break;
                        }
                        last = Some(documents);
                    }
                    Ok(_) => {}
                    Err(err) => {
                        tracing::warn!(collection = %query.collection, %err, "live query poll failed")
                    }
                }
                tokio::time::sleep(interval).await;
            }
        });

        Subscription::new(receiver, move || task.abort())
    }

    async fn create_document(
        &self,
        collection: &str,
        fields: Fields,
    ) -> Result<DocumentId, BackendError> {
        let url = format!("{}/{collection}", self.settings.documents_url());
        let response = self
            .authorized(
                self.http
                    .post(url)
                    .json(&json!({ "fields": encode_fields(&fields) })),
            )
            .await?;
        let raw: RawDocument = response.json().await?;
        let document = Document::try_from(raw)?;
        tracing::debug!(%collection, id = %document.id, "document created");
        Ok(document.id)
    }

    async fn update_document(
        &self,
        collection: &str,
        id: &DocumentId,
        fields: Fields,
    ) -> Result<(), BackendError> {
        let url = format!("{}/{collection}/{id}", self.settings.documents_url());
        let mut params: Vec<(&str, &str)> = fields
            .keys()
            .map(|k| ("updateMask.fieldPaths", k.as_str()))
            .collect();
        params.push(("currentDocument.exists", "true"));

        self.authorized(
            self.http
                .patch(url)
                .query(&params)
                .json(&json!({ "fields": encode_fields(&fields) })),
        )
        .await?;
        tracing::debug!(%collection, %id, "document updated");
        Ok(())
    }

    async fn delete_document(&self, collection: &str, id: &DocumentId) -> Result<(), BackendError> {
        let url = format!("{}/{collection}/{id}", self.settings.documents_url());
        self.authorized(self.http.delete(url)).await?;
        tracing::debug!(%collection, %id, "document deleted");
        Ok(())
    }
}
