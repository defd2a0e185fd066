mod app;
mod capture;
mod config;
mod journal;
mod models;
mod panel;
mod ui;

use std::sync::Arc;

use anyhow::Result;
use tokio::sync::{mpsc, Mutex};
use tracing_subscriber::EnvFilter;

use app::{AppCommand, AppState};
use capture::{ScreenshotStage, SystemClipboard};
use config::Config;
use journal::{JournalStore, SheetLayout};
use ui::tui::Tui;

#[tokio::main]
async fn main() -> Result<()> {
    // Redirigir logs a archivo junto al ejecutable, para no interferir con el TUI
    let log_path = config::exe_dir().join("trading_journal.log");
    let log_file = std::fs::File::create(&log_path)?;
    tracing_subscriber::fmt()
        .with_writer(log_file)
        .with_ansi(false)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    tracing::info!("Starting Trading Journal...");

    // Cargar configuración (opcional: sin archivo se usan los valores por defecto)
    let (config, config_path) = match Config::load() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("\n❌ Configuration error:\n   {}\n", e);
            eprintln!("📝 Fix or remove config.toml to use the defaults");
            std::process::exit(1);
        }
    };

    // El workbook vive en el directorio de trabajo
    let journal_path = config.journal.workbook_path(&std::env::current_dir()?);
    let layout = SheetLayout::from(&config.journal);

    let store = match JournalStore::open_or_create(&journal_path, layout) {
        Ok(store) => store,
        Err(e) => {
            tracing::error!("Could not open journal: {}", e);
            eprintln!("\n❌ {}:\n   {}\n", e.title(), e);
            std::process::exit(1);
        }
    };

    let mut initial = AppState::new(&config.journal, journal_path, config_path);
    panel::refresh_open_trades(&mut initial, &store);
    initial.log(&format!(
        "Journal ready: {} ({} trades logged)",
        store.path().display(),
        store.row_count().saturating_sub(1)
    ));
    let state = Arc::new(Mutex::new(initial));

    // Canal de comandos (UI → motor)
    let (cmd_tx, cmd_rx) = mpsc::channel::<AppCommand>(16);

    // ----------------------------------------------------------------
    // TUI y motor del journal en la misma tarea: el motor termina cuando
    // la TUI sale (Quit o canal cerrado)
    // ----------------------------------------------------------------
    let tui = Tui::new(Arc::clone(&state), cmd_tx)?;
    let engine = run_journal_engine(
        Arc::clone(&state),
        cmd_rx,
        store,
        ScreenshotStage::in_temp_dir(),
    );
    let (ui_result, ()) = tokio::join!(tui.run(), engine);
    ui_result?;

    tracing::info!("Journal closed.");
    Ok(())
}

/// Motor del journal: aplica los comandos del UI uno por vez
async fn run_journal_engine(
    state: Arc<Mutex<AppState>>,
    mut cmd_rx: mpsc::Receiver<AppCommand>,
    mut store: JournalStore,
    mut stage: ScreenshotStage,
) {
    let mut clipboard = SystemClipboard;

    while let Some(cmd) = cmd_rx.recv().await {
        tracing::debug!("Command: {:?}", cmd);
        let mut s = state.lock().await;
        panel::handle_command(cmd, &mut s, &mut store, &mut stage, &mut clipboard);
        if s.should_quit {
            break;
        }
    }

    // Borrar la captura temporal que haya quedado sin usar
    stage.clear();
}
