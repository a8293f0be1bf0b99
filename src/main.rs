mod ui;

use color_eyre::eyre::{Result, WrapErr};
use crossterm::event::{Event, EventStream, KeyEventKind};
use futures::StreamExt;
use personal_diary::backend::{Backend, FirebaseBackend, MemoryBackend};
use personal_diary::config::{BackendKind, DiaryConfig};
use personal_diary::{logging, DiaryState};
use ui::{Action, CURSOR_BLINK, UI};

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let config = DiaryConfig::load().wrap_err("Failed to load configuration")?;
    logging::init(&config.log_file).wrap_err_with(|| {
        format!("Failed to open log file {}", config.log_file.display())
    })?;
    tracing::info!(backend = ?config.backend, collection = %config.collection, "starting diary");

    match config.backend {
        BackendKind::Memory => run(MemoryBackend::new(), &config).await,
        BackendKind::Firebase => {
            let settings = config.firebase_settings()?;
            run(FirebaseBackend::new(settings), &config).await
        }
    }
}

async fn run<B: Backend>(backend: B, config: &DiaryConfig) -> Result<()> {
    let mut state = DiaryState::with_collection(backend, config.collection.clone());
    let mut ui = UI::new()?;
    let mut events = EventStream::new();

    loop {
        ui.display(&state)?;

        tokio::select! {
            update = state.next_update() => match update {
                Some(update) => state.apply(update),
                None => break,
            },
            event = events.next() => match event {
                Some(Ok(Event::Key(key))) if key.kind == KeyEventKind::Press => {
                    if let Some(Action::Quit) = ui.handle_key(&mut state, key).await {
                        break;
                    }
                }
                Some(Ok(_)) => {}
                Some(Err(err)) => return Err(err.into()),
                None => break,
            },
            _ = tokio::time::sleep(CURSOR_BLINK) => {}
        }
    }

    tracing::info!("diary closed");
    Ok(())
}
