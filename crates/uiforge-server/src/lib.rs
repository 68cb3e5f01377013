use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::Context;

use uiforge_core::{
    load_generation_prompt, AnonymousWorkRegistry, ConfigStore, LocalAccounts, ProjectNamer,
    ProjectStorage, SessionManager,
};

mod http;

pub use http::serve;

#[derive(Clone)]
pub struct AppState {
    pub config: ConfigStore,
    pub state_dir: PathBuf,
    pub accounts: Arc<LocalAccounts>,
    pub projects: Arc<ProjectStorage>,
    pub anon_work: AnonymousWorkRegistry,
    pub sessions: SessionManager,
    pub namer: ProjectNamer,
    pub generation_prompt: Arc<str>,
}

impl AppState {
    pub async fn new(state_dir: impl AsRef<Path>, config: ConfigStore) -> anyhow::Result<Self> {
        let state_dir = state_dir.as_ref().to_path_buf();
        let app_config = config.get().await;
        let accounts = LocalAccounts::new(&state_dir)
            .await
            .context("failed to open account store")?;
        let projects = ProjectStorage::new(&state_dir)
            .await
            .context("failed to open project store")?;
        let generation_prompt =
            load_generation_prompt(app_config.generation_prompt_path.as_deref()).await?;
        if app_config.jwt_secret.is_none() && app_config.environment.is_production() {
            tracing::warn!("no UIFORGE_JWT_SECRET configured; using the development secret");
        }
        Ok(Self {
            sessions: SessionManager::from_config(&app_config),
            config,
            state_dir,
            accounts: Arc::new(accounts),
            projects: Arc::new(projects),
            anon_work: AnonymousWorkRegistry::new(),
            namer: ProjectNamer::new(),
            generation_prompt: Arc::from(generation_prompt),
        })
    }
}

pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

pub fn build_id() -> String {
    if let Some(explicit) = option_env!("UIFORGE_BUILD_ID") {
        let trimmed = explicit.trim();
        if !trimmed.is_empty() {
            return trimmed.to_string();
        }
    }
    env!("CARGO_PKG_VERSION").to_string()
}
