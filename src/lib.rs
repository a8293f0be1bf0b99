//! personal_diary - short dated diary entries kept in a hosted document
//! database, scoped to the signed-in user and mirrored live.

pub mod backend;
pub mod config;
pub mod diary_entry;
pub mod diary_state;
pub mod editor;
pub mod error;
pub mod feed;
pub mod logging;
pub mod session;

pub use backend::{Backend, FirebaseBackend, Identity, MemoryBackend};
pub use diary_entry::DiaryEntry;
pub use diary_state::{Clock, DiaryState, SystemClock, Update};
pub use error::{BackendError, Notice, Operation};
