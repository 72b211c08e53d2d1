mod app;
mod handler;
mod tui;
mod ui;

use anyhow::Result;
use tracing_subscriber::EnvFilter;

use app::App;
use tutora_core::{ApiClient, ArecordCaptureDevice, ChatStore, Config, Recorder};

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();

    let config = Config::load().unwrap_or_else(|_| Config::new());
    let api = ApiClient::new(config.api_url());
    let store = ChatStore::load(ChatStore::default_path()?)?;
    let recorder = Recorder::new(Box::new(ArecordCaptureDevice::new()));

    let mut app = App::new(store, api, recorder);
    if let Some(target) = std::env::args().nth(1) {
        app.route(&target);
    }

    tui::install_panic_hook();
    let mut terminal = tui::init()?;
    let mut events = tui::EventHandler::new();

    while !app.should_quit {
        terminal.draw(|frame| ui::render(&mut app, frame))?;

        if let Some(event) = events.next().await {
            handler::handle_event(&mut app, event)?;
        }

        app.poll_tasks().await;
    }

    tui::restore()?;
    Ok(())
}

/// Logs go to a file; stderr belongs to the terminal UI.
fn init_logging() {
    let Some(dir) = dirs::config_dir().map(|p| p.join("tutora")) else {
        return;
    };
    if std::fs::create_dir_all(&dir).is_err() {
        return;
    }
    let Ok(file) = std::fs::File::create(dir.join("tutora.log")) else {
        return;
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::sync::Mutex::new(file))
        .with_ansi(false)
        .try_init();
}
