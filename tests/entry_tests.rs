//! Integration tests for creating, editing and deleting entries

use personal_diary::backend::DocumentId;
use personal_diary::{Backend, MemoryBackend, Operation};
use serde_json::json;

mod common;
use common::{add, contents, diary, sign_out, sign_up};

#[tokio::test]
async fn test_create_then_read_back() {
    let backend = MemoryBackend::new();
    let mut state = diary(&backend);
    sign_up(&mut state, "u@example.com").await;

    add(&mut state, "read a book", "a, b").await;

    let entries = state.get_entries();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].content, "read a book");
    assert_eq!(entries[0].tags, vec!["a", "b"]);
    assert_eq!(Some(&entries[0].owner_id), state.identity().map(|i| &i.id));
}

#[tokio::test]
async fn test_create_clears_compose_form() {
    let backend = MemoryBackend::new();
    let mut state = diary(&backend);
    sign_up(&mut state, "u@example.com").await;

    add(&mut state, "read a book", "fiction").await;

    assert!(state.editor().compose().is_empty());
}

#[tokio::test]
async fn test_blank_tags_give_empty_list() {
    let backend = MemoryBackend::new();
    let mut state = diary(&backend);
    sign_up(&mut state, "u@example.com").await;

    add(&mut state, "no tags here", "").await;

    assert!(state.get_entries()[0].tags.is_empty());
}

#[tokio::test]
async fn test_tags_are_trimmed() {
    let backend = MemoryBackend::new();
    let mut state = diary(&backend);
    sign_up(&mut state, "u@example.com").await;

    add(&mut state, "x", "  work ,life,  play  ").await;

    let tags = &state.get_entries()[0].tags;
    assert_eq!(tags, &vec!["work", "life", "play"]);
    assert!(tags.iter().all(|t| t.trim() == t));
}

#[tokio::test]
async fn test_feed_is_newest_first() {
    let backend = MemoryBackend::new();
    let mut state = diary(&backend);
    sign_up(&mut state, "u@example.com").await;

    add(&mut state, "one", "").await;
    add(&mut state, "two", "").await;
    add(&mut state, "three", "").await;

    assert_eq!(contents(&state), vec!["three", "two", "one"]);
}

#[tokio::test]
async fn test_feed_only_contains_own_entries() {
    let backend = MemoryBackend::new();
    let mut state = diary(&backend);
    sign_up(&mut state, "other@example.com").await;
    add(&mut state, "not yours", "").await;
    add(&mut state, "also not yours", "").await;
    sign_out(&mut state).await;
    backend.seed(
        "posts",
        json!({
            "content": "seeded",
            "tags": [],
            "createdAt": "2030-01-01T00:00:00.000Z",
            "userId": "someone",
        })
        .as_object()
        .cloned()
        .unwrap(),
    );

    sign_up(&mut state, "me@example.com").await;
    add(&mut state, "mine", "").await;

    let me = state.identity().unwrap().id.clone();
    assert_eq!(contents(&state), vec!["mine"]);
    assert!(state.get_entries().iter().all(|e| e.owner_id == me));
}

#[tokio::test]
async fn test_failed_create_keeps_form() {
    let backend = MemoryBackend::new();
    let mut state = diary(&backend);
    sign_up(&mut state, "u@example.com").await;
    // Signed out behind the state's back: the write is denied.
    backend.sign_out().await.unwrap();

    let form = state.editor_mut().compose_mut();
    form.content = "unsaved thought".to_string();
    form.tags = "draft".to_string();
    let notice = state.add_entry().await.unwrap_err();

    assert_eq!(notice.operation, Operation::SaveEntry);
    assert!(notice.to_string().starts_with("Error saving entry: "));
    assert_eq!(state.editor().compose().content, "unsaved thought");
    assert_eq!(state.editor().compose().tags, "draft");
}

#[tokio::test]
async fn test_begin_edit_loads_fields() {
    let backend = MemoryBackend::new();
    let mut state = diary(&backend);
    sign_up(&mut state, "u@example.com").await;
    add(&mut state, "went for a run", "health, outdoors").await;

    let id = state.get_entries()[0].id.clone();
    assert!(state.begin_edit(&id));

    let draft = state.editor().editing().unwrap();
    assert_eq!(draft.id, id);
    assert_eq!(draft.form.content, "went for a run");
    assert_eq!(draft.form.tags, "health, outdoors");
}

#[tokio::test]
async fn test_update_overwrites_and_exits_edit_mode() {
    let backend = MemoryBackend::new();
    let mut state = diary(&backend);
    sign_up(&mut state, "u@example.com").await;
    add(&mut state, "draft", "old").await;
    let id = state.get_entries()[0].id.clone();

    state.begin_edit(&id);
    let draft = state.editor_mut().editing_mut().unwrap();
    draft.form.content = "final".to_string();
    draft.form.tags = "new, tags".to_string();
    state.update_entry().await.unwrap();
    state.process_pending();

    assert!(!state.editor().is_editing());
    let entry = &state.get_entries()[0];
    assert_eq!(entry.id, id);
    assert_eq!(entry.content, "final");
    assert_eq!(entry.tags, vec!["new", "tags"]);
}

#[tokio::test]
async fn test_update_twice_is_idempotent_but_advances_timestamp() {
    let backend = MemoryBackend::new();
    let mut state = diary(&backend);
    sign_up(&mut state, "u@example.com").await;
    add(&mut state, "draft", "").await;
    let id = state.get_entries()[0].id.clone();
    let created = state.get_entries()[0].created_at;

    let mut stamps = Vec::new();
    for _ in 0..2 {
        state.begin_edit(&id);
        let draft = state.editor_mut().editing_mut().unwrap();
        draft.form.content = "same words".to_string();
        draft.form.tags = "x, y".to_string();
        state.update_entry().await.unwrap();
        state.process_pending();
        stamps.push(state.get_entries()[0].created_at);
    }

    let entry = &state.get_entries()[0];
    assert_eq!(entry.content, "same words");
    assert_eq!(entry.tags, vec!["x", "y"]);
    assert!(created < stamps[0]);
    assert!(stamps[0] < stamps[1]);
}

#[tokio::test]
async fn test_failed_update_stays_in_edit_mode() {
    let backend = MemoryBackend::new();
    let mut state = diary(&backend);
    sign_up(&mut state, "u@example.com").await;
    add(&mut state, "doomed", "").await;
    let id = state.get_entries()[0].id.clone();

    state.begin_edit(&id);
    let form = &mut state.editor_mut().editing_mut().unwrap().form;
    form.content = "rewritten".to_string();
    form.tags = "late, draft".to_string();
    // Removed elsewhere before the edit is saved.
    backend.delete_document("posts", &id).await.unwrap();
    let notice = state.update_entry().await.unwrap_err();

    assert_eq!(notice.operation, Operation::UpdateEntry);
    assert_eq!(
        notice.to_string(),
        format!("Error updating entry: No document to update: posts/{id}")
    );
    let draft = state.editor().editing().unwrap();
    assert_eq!(draft.id, id);
    assert_eq!(draft.form.content, "rewritten");
    assert_eq!(draft.form.tags, "late, draft");
}

#[tokio::test]
async fn test_cancel_edit_makes_no_change() {
    let backend = MemoryBackend::new();
    let mut state = diary(&backend);
    sign_up(&mut state, "u@example.com").await;
    add(&mut state, "keep me", "").await;
    let id = state.get_entries()[0].id.clone();

    state.begin_edit(&id);
    state.editor_mut().editing_mut().unwrap().form.content = "changed my mind".to_string();
    state.cancel_edit();
    state.process_pending();

    assert!(!state.editor().is_editing());
    assert_eq!(contents(&state), vec!["keep me"]);
}

#[tokio::test]
async fn test_delete_is_terminal() {
    let backend = MemoryBackend::new();
    let mut state = diary(&backend);
    sign_up(&mut state, "u@example.com").await;
    add(&mut state, "short-lived", "").await;
    let id = state.get_entries()[0].id.clone();

    state.delete_entry(&id).await.unwrap();
    state.process_pending();
    assert!(state.get_entries().is_empty());

    add(&mut state, "later", "").await;
    add(&mut state, "even later", "").await;
    assert!(state.get_entries().iter().all(|e| e.id != id));
}

#[tokio::test]
async fn test_delete_without_sign_in_is_noop() {
    let backend = MemoryBackend::new();
    let mut state = diary(&backend);

    state
        .delete_entry(&DocumentId::new("anything"))
        .await
        .unwrap();
}

#[tokio::test]
async fn test_sign_out_drops_edit_in_progress() {
    let backend = MemoryBackend::new();
    let mut state = diary(&backend);
    sign_up(&mut state, "u@example.com").await;
    add(&mut state, "half edited", "").await;
    let id = state.get_entries()[0].id.clone();
    state.begin_edit(&id);

    sign_out(&mut state).await;

    assert!(!state.editor().is_editing());
}
