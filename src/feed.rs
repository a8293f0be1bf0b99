use crate::backend::{Backend, Direction, Document, Identity, Query, Subscription, UserId};
use crate::diary_entry::{DiaryEntry, CREATED_AT_FIELD, OWNER_FIELD};

/// One push from the live query, tagged with the owner it was opened for.
#[derive(Debug, Clone, PartialEq)]
pub struct FeedPush {
    pub owner: UserId,
    pub documents: Vec<Document>,
}

struct LiveFeed {
    owner: UserId,
    subscription: Subscription<Vec<Document>>,
}

/// The signed-in identity's entries, newest first, mirrored from one live query.
pub struct EntryFeed {
    collection: String,
    live: Option<LiveFeed>,
    entries: Vec<DiaryEntry>,
}

impl EntryFeed {
    pub fn new(collection: impl Into<String>) -> Self {
        EntryFeed {
            collection: collection.into(),
            live: None,
            entries: Vec::new(),
        }
    }

    pub fn entries(&self) -> &[DiaryEntry] {
        &self.entries
    }

    pub fn owner(&self) -> Option<&UserId> {
        self.live.as_ref().map(|live| &live.owner)
    }

    pub fn query_for(&self, owner: &UserId) -> Query {
        Query::collection(self.collection.clone())
            .where_eq(OWNER_FIELD, owner.as_str())
            .order_by(CREATED_AT_FIELD, Direction::Descending)
    }

    /// Opens the live query for `identity`, releasing the previous one first.
    pub fn follow<B: Backend>(&mut self, backend: &B, identity: &Identity) {
        self.release();
        let subscription = backend.subscribe_collection(self.query_for(&identity.id));
        tracing::debug!(owner = %identity.id, collection = %self.collection, "feed subscribed");
        self.live = Some(LiveFeed {
            owner: identity.id.clone(),
            subscription,
        });
    }

    /// Drops the live query, if any, and forgets the held entries.
    pub fn release(&mut self) {
        if let Some(live) = self.live.take() {
            live.subscription.unsubscribe();
            tracing::debug!(owner = %live.owner, "feed released");
        }
        self.entries.clear();
    }

    /// Waits for the next push. Never resolves while nothing is subscribed.
    pub async fn next_push(&mut self) -> Option<FeedPush> {
        match self.live.as_mut() {
            Some(live) => {
                let documents = live.subscription.next().await?;
                Some(FeedPush {
                    owner: live.owner.clone(),
                    documents,
                })
            }
            None => std::future::pending().await,
        }
    }

    pub fn try_next_push(&mut self) -> Option<FeedPush> {
        let live = self.live.as_mut()?;
        let documents = live.subscription.try_next()?;
        Some(FeedPush {
            owner: live.owner.clone(),
            documents,
        })
    }

    /// Replaces the held list with a push. Pushes for any other owner are
    /// stale and ignored. Returns whether the list was replaced.
    pub fn replace(&mut self, push: FeedPush) -> bool {
        if self.owner() != Some(&push.owner) {
            tracing::debug!(owner = %push.owner, "stale feed push dropped");
            return false;
        }

        let owner = push.owner;
        self.entries = push
            .documents
            .into_iter()
            .filter_map(|document| match DiaryEntry::try_from(document) {
                Ok(entry) if entry.owner_id == owner => Some(entry),
                Ok(entry) => {
                    tracing::warn!(id = %entry.id, "entry with foreign owner left out of feed");
                    None
                }
                Err(err) => {
                    tracing::warn!(%err, "malformed entry left out of feed");
                    None
                }
            })
            .collect();
        tracing::debug!(%owner, count = self.entries.len(), "feed replaced");
        true
    }
}
