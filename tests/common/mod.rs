#![allow(dead_code)]

use chrono::{DateTime, Duration, TimeZone, Utc};
use personal_diary::session::AuthMode;
use personal_diary::{DiaryState, MemoryBackend};
use std::cell::Cell;

pub const PASSWORD: &str = "secret1";

/// A clock that moves one minute forward every time it is read.
pub fn step_clock() -> impl Fn() -> DateTime<Utc> {
    let base = Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap();
    let ticks = Cell::new(0);
    move || {
        let n = ticks.get();
        ticks.set(n + 1);
        base + Duration::minutes(n)
    }
}

pub fn diary(backend: &MemoryBackend) -> DiaryState<MemoryBackend> {
    let mut state = DiaryState::new(backend.clone()).with_clock(step_clock());
    state.process_pending();
    state
}

fn fill_credentials(state: &mut DiaryState<MemoryBackend>, email: &str, mode: AuthMode) {
    let credentials = state.session_mut().credentials_mut();
    credentials.email = email.to_string();
    credentials.password = PASSWORD.to_string();
    credentials.mode = mode;
}

pub async fn sign_up(state: &mut DiaryState<MemoryBackend>, email: &str) {
    fill_credentials(state, email, AuthMode::SignUp);
    state.submit_credentials().await.unwrap();
    state.process_pending();
}

pub async fn sign_in(state: &mut DiaryState<MemoryBackend>, email: &str) {
    fill_credentials(state, email, AuthMode::SignIn);
    state.submit_credentials().await.unwrap();
    state.process_pending();
}

pub async fn sign_out(state: &mut DiaryState<MemoryBackend>) {
    state.sign_out().await.unwrap();
    state.process_pending();
}

pub async fn add(state: &mut DiaryState<MemoryBackend>, content: &str, tags: &str) {
    let form = state.editor_mut().compose_mut();
    form.content = content.to_string();
    form.tags = tags.to_string();
    state.add_entry().await.unwrap();
    state.process_pending();
}

pub fn contents(state: &DiaryState<MemoryBackend>) -> Vec<String> {
    state
        .get_entries()
        .iter()
        .map(|e| e.content.clone())
        .collect()
}
