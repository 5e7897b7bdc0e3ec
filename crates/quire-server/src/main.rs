//! Quire server binary.
//!
//! Reads `quire.toml` (or the path given with `--config`) plus `QUIRE__*`
//! environment overrides, opens the SQLite store and the blob directory,
//! makes sure every configured account has a user, and serves the JSON API.
//!
//! # Password hash generation
//!
//! To generate the argon2 PHC string for an account's `password_hash`:
//!
//! ```text
//! cargo run -p quire-server -- --hash-password
//! ```

mod settings;

use std::{path::PathBuf, sync::Arc};

use anyhow::Context as _;
use argon2::{Argon2, PasswordHasher, password_hash::SaltString};
use clap::Parser;
use quire_api::{AppState, ensure_accounts};
use quire_core::{access::AccessControl, folders::FolderService};
use quire_rag::{
  Ingestor, RagService,
  blob::{BlobStore, FsBlobStore},
  model::{Completer, Embedder},
  openai::OpenAiClient,
};
use quire_store_sqlite::SqliteStore;
use rand_core::OsRng;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

use crate::settings::{ServerConfig, expand_tilde};

#[derive(Parser)]
#[command(author, version, about = "Quire document server")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "quire.toml")]
  config: PathBuf,

  /// Print the argon2 hash for a password entered on stdin and exit.
  #[arg(long)]
  hash_password: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .init();

  let cli = Cli::parse();

  if cli.hash_password {
    let password = read_password()?;
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
      .hash_password(password.as_bytes(), &salt)
      .map_err(|e| anyhow::anyhow!("argon2 error: {e}"))?
      .to_string();
    println!("{hash}");
    return Ok(());
  }

  let cfg = ServerConfig::load(&cli.config)?;
  if cfg.accounts.is_empty() {
    tracing::warn!("no accounts configured; every request will be rejected");
  }

  // Storage.
  let store_path = expand_tilde(&cfg.store_path);
  let store = Arc::new(
    SqliteStore::open(&store_path)
      .await
      .with_context(|| format!("failed to open store at {store_path:?}"))?,
  );
  let blob_dir = expand_tilde(&cfg.blob_dir);
  tokio::fs::create_dir_all(&blob_dir)
    .await
    .with_context(|| format!("failed to create blob directory {blob_dir:?}"))?;
  let blobs: Arc<dyn BlobStore> = Arc::new(FsBlobStore::new(blob_dir));

  ensure_accounts(store.as_ref(), &cfg.accounts)
    .await
    .context("failed to provision configured accounts")?;

  // Model service.
  let client = Arc::new(
    OpenAiClient::new(cfg.models.clone()).context("failed to build model client")?,
  );
  let embedder: Arc<dyn Embedder> = client.clone();
  let completer: Arc<dyn Completer> = client;

  // Services.
  let access = AccessControl::new(Arc::clone(&store));
  let state = AppState {
    folders:  FolderService::new(access.clone(), cfg.rag.scope()),
    ingestor: Ingestor::new(
      access.clone(),
      blobs,
      Arc::clone(&embedder),
      cfg.rag.clone(),
      cfg.models.timeout(),
    ),
    rag:      RagService::new(access, embedder, completer, &cfg.rag, cfg.models.clone()),
    accounts: Arc::new(cfg.accounts.clone()),
  };

  let app = quire_api::router(state).layer(TraceLayer::new_for_http());
  let address = cfg.address();

  tracing::info!(
    embedding_model = %cfg.models.embedding_model,
    chat_model = %cfg.models.chat_model,
    include_descendants = cfg.rag.include_descendants,
    "Listening on http://{address}"
  );
  let listener = TcpListener::bind(&address)
    .await
    .with_context(|| format!("failed to bind {address}"))?;

  axum::serve(listener, app).await.context("server error")?;

  Ok(())
}

/// Read a password from stdin.
fn read_password() -> anyhow::Result<String> {
  use std::io::{self, BufRead, Write};
  print!("Password: ");
  io::stdout().flush().ok();
  let mut line = String::new();
  io::stdin().lock().read_line(&mut line)?;
  Ok(line.trim_end_matches(['\n', '\r']).to_owned())
}
