use std::io;

use chat_client::app::run_repl;
use chat_client::config::ChatConfig;
use chat_client::logging::init_logging;
use chat_client::session::ChatSession;
use conversation_store::FileStorage;

#[tokio::main]
async fn main() -> io::Result<()> {
    init_logging();

    let config = ChatConfig::from_env();
    let cwd = std::env::current_dir()?;
    let storage = match &config.storage_dir {
        Some(dir) => FileStorage::new(dir.clone()),
        None => FileStorage::in_cwd(&cwd),
    };

    let mut session = ChatSession::new(&config, storage).map_err(io::Error::other)?;
    run_repl(&mut session, &cwd).await
}
