use std::io::{self, Write};
use std::sync::Arc;

use anyhow::Context;
use chat_api::ChatApiClient;
use chat_cli::repl::{Flow, Repl};
use mxln_chat::{
    init_logging, ChatConfig, FilePreferenceStore, GenerationController, MemoryPreferenceStore,
    PreferenceStore, SessionManager,
};
use session_api::SessionApiClient;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let config = ChatConfig::from_env().context("loading configuration")?;
    init_logging(config.log_filter.as_deref()).context("installing logger")?;

    let preferences: Arc<dyn PreferenceStore> = match &config.preferences_path {
        Some(path) => Arc::new(FilePreferenceStore::load(path)),
        None => Arc::new(MemoryPreferenceStore::default()),
    };
    let client = ChatApiClient::new(config.chat_api_config()).context("building chat client")?;
    let backend = SessionApiClient::new(&config.base_url, config.timeout)
        .context("building session client")?;
    let sessions = Arc::new(SessionManager::new(
        Arc::new(backend),
        Arc::clone(&preferences),
    ));

    let controller = GenerationController::builder(Arc::new(client))
        .history(sessions.clone())
        .preferences(preferences)
        .max_media_bytes(config.max_media_bytes)
        .build();
    controller.restore_model_preference();
    controller.load_models().await;

    match sessions.initialize(&controller.current_model()).await {
        Ok(Some(detail)) => {
            info!(
                session = %detail.session.id,
                messages = detail.messages.len(),
                "resumed session"
            );
            controller.load_from_session(&detail.messages);
        }
        Ok(None) => {}
        Err(error) => warn!(%error, "session history unavailable; continuing without it"),
    }

    let repl = Repl::new(controller, Some(sessions));
    let mut stdout = io::stdout();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    writeln!(
        stdout,
        "model {}. /help lists commands.",
        repl.controller().current_model()
    )?;

    loop {
        write!(stdout, "> ")?;
        stdout.flush()?;

        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = tokio::signal::ctrl_c() => None,
        };
        let Some(line) = line else {
            break;
        };

        let interrupt = async {
            let _ = tokio::signal::ctrl_c().await;
        };
        if repl.handle_line(&line, interrupt, &mut stdout).await? == Flow::Quit {
            break;
        }
    }

    repl.controller().stop();
    Ok(())
}
