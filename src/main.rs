//! Lector — voice-controlled document reader core.
//!
//! Communicates with the host extension page via JSON-line IPC on
//! stdin/stdout. This entry point initializes the subsystems and runs the
//! main event loop.

use tracing::info;
use tracing_subscriber::EnvFilter;

use lector_core::app::App;
use lector_core::config::{get_store_dir, read_config};
use lector_core::ipc::bridge::{emit_event, spawn_stdin_reader, spawn_ui_writer};
use lector_core::ipc::{UiEvent, UiSender};
use lector_core::storage::Storage;

#[tokio::main]
async fn main() {
    // Initialize tracing (respects RUST_LOG env, defaults to info)
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    // Emit starting event immediately so the host knows we're alive.
    emit_event(&UiEvent::Starting {});

    let cfg = read_config();
    info!(
        wake_phrase = %cfg.wake_phrase,
        language = %cfg.language,
        "Configuration loaded"
    );

    let storage = Storage::new(get_store_dir());

    let (ui, ui_rx) = UiSender::channel();
    spawn_ui_writer(ui_rx);
    let host_rx = spawn_stdin_reader();

    let mut app = App::new(&cfg, ui.clone(), storage, host_rx);
    ui.send(UiEvent::Ready {});
    info!("Lector core ready");

    app.run().await;
    info!("Lector core stopped");
}
