use crate::backend::{Backend, DocumentId, Identity};
use crate::diary_entry::{entry_patch_fields, new_entry_fields, DiaryEntry};
use crate::editor::EntryEditor;
use crate::error::{Notice, Operation, ResultExt};
use crate::feed::{EntryFeed, FeedPush};
use crate::session::Session;
use chrono::{DateTime, Utc};

/// Collection entries are stored in.
pub const DEFAULT_COLLECTION: &str = "posts";

pub trait Clock {
    fn now(&self) -> DateTime<Utc>;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

impl<F: Fn() -> DateTime<Utc>> Clock for F {
    fn now(&self) -> DateTime<Utc> {
        self()
    }
}

/// Something the backend pushed.
#[derive(Debug, Clone, PartialEq)]
pub enum Update {
    Auth(Option<Identity>),
    Entries(FeedPush),
}

/// The whole diary: session, feed, editor and the CRUD operations that tie
/// them to the backend.
pub struct DiaryState<B: Backend> {
    backend: B,
    collection: String,
    session: Session,
    feed: EntryFeed,
    editor: EntryEditor,
    clock: Box<dyn Clock>,
}

impl<B: Backend> DiaryState<B> {
    pub fn new(backend: B) -> Self {
        Self::with_collection(backend, DEFAULT_COLLECTION)
    }

    pub fn with_collection(backend: B, collection: impl Into<String>) -> Self {
        let collection = collection.into();
        let session = Session::open(&backend);
        DiaryState {
            feed: EntryFeed::new(collection.clone()),
            backend,
            collection,
            session,
            editor: EntryEditor::default(),
            clock: Box::new(SystemClock),
        }
    }

    pub fn with_clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Box::new(clock);
        self
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn session_mut(&mut self) -> &mut Session {
        &mut self.session
    }

    pub fn identity(&self) -> Option<&Identity> {
        self.session.identity()
    }

    pub fn get_entries(&self) -> &[DiaryEntry] {
        self.feed.entries()
    }

    pub fn editor(&self) -> &EntryEditor {
        &self.editor
    }

    pub fn editor_mut(&mut self) -> &mut EntryEditor {
        &mut self.editor
    }

    /// Waits for the next auth change or feed push.
    /// `None` once the auth channel has closed.
    pub async fn next_update(&mut self) -> Option<Update> {
        tokio::select! {
            change = self.session.next_change() => change.map(Update::Auth),
            Some(push) = self.feed.next_push() => Some(Update::Entries(push)),
        }
    }

    /// Applies every push already delivered, without waiting. Auth changes
    /// go first so a feed is never fed pushes for a departed identity.
    pub fn process_pending(&mut self) -> usize {
        let mut applied = 0;
        loop {
            if let Some(change) = self.session.try_next_change() {
                self.apply(Update::Auth(change));
            } else if let Some(push) = self.feed.try_next_push() {
                self.apply(Update::Entries(push));
            } else {
                return applied;
            }
            applied += 1;
        }
    }

    pub fn apply(&mut self, update: Update) {
        match update {
            Update::Auth(identity) => {
                if !self.session.observe(identity) && self.feed.owner().is_some() {
                    return;
                }
                self.editor.cancel_edit();
                match self.session.identity() {
                    Some(identity) => self.feed.follow(&self.backend, identity),
                    None => self.feed.release(),
                }
            }
            Update::Entries(push) => {
                self.feed.replace(push);
            }
        }
    }

    /// Signs up or in according to the credentials form.
    pub async fn submit_credentials(&mut self) -> Result<(), Notice> {
        self.session.submit(&self.backend).await
    }

    pub async fn sign_up(&mut self) -> Result<(), Notice> {
        self.session.sign_up(&self.backend).await
    }

    pub async fn sign_in(&mut self) -> Result<(), Notice> {
        self.session.sign_in(&self.backend).await
    }

    /// Local state is cleared when the resulting notification arrives.
    pub async fn sign_out(&mut self) -> Result<(), Notice> {
        self.session.sign_out(&self.backend).await
    }

    /// Saves the compose form as a new entry.
    pub async fn add_entry(&mut self) -> Result<(), Notice> {
        let Some(owner) = self.session.identity() else {
            return Ok(());
        };
        let form = self.editor.compose();
        let fields = new_entry_fields(owner, &form.content, &form.tags, self.clock.now());

        self.backend
            .create_document(&self.collection, fields)
            .await
            .during(Operation::SaveEntry)?;
        self.editor.clear_compose();
        Ok(())
    }

    /// Starts editing the entry with `id` from the current feed.
    pub fn begin_edit(&mut self, id: &DocumentId) -> bool {
        match self.feed.entries().iter().find(|e| &e.id == id) {
            Some(entry) => {
                self.editor.begin_edit(entry);
                true
            }
            None => false,
        }
    }

    /// Writes the edit fields back. The timestamp is reset to now, which
    /// moves the entry to the top of the feed.
    pub async fn update_entry(&mut self) -> Result<(), Notice> {
        if self.session.identity().is_none() {
            return Ok(());
        }
        let Some(draft) = self.editor.editing() else {
            return Ok(());
        };
        let fields = entry_patch_fields(&draft.form.content, &draft.form.tags, self.clock.now());

        self.backend
            .update_document(&self.collection, &draft.id, fields)
            .await
            .during(Operation::UpdateEntry)?;
        self.editor.cancel_edit();
        Ok(())
    }

    pub fn cancel_edit(&mut self) {
        self.editor.cancel_edit();
    }

    pub async fn delete_entry(&mut self, id: &DocumentId) -> Result<(), Notice> {
        if self.session.identity().is_none() {
            return Ok(());
        }
        self.backend
            .delete_document(&self.collection, id)
            .await
            .during(Operation::DeleteEntry)
    }
}
