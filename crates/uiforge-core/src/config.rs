use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tokio::fs;
use tokio::sync::RwLock;

use crate::session::{DEFAULT_SESSION_TTL_DAYS, DEVELOPMENT_JWT_SECRET};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Development,
    Production,
    Test,
}

impl Environment {
    pub fn is_production(self) -> bool {
        matches!(self, Environment::Production)
    }
}

fn default_session_ttl_days() -> i64 {
    DEFAULT_SESSION_TTL_DAYS
}

fn default_log_retention_days() -> u64 {
    14
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub environment: Environment,
    /// Never persisted; comes from the environment or the command line.
    pub jwt_secret: Option<String>,
    #[serde(default = "default_session_ttl_days")]
    pub session_ttl_days: i64,
    #[serde(default = "default_log_retention_days")]
    pub log_retention_days: u64,
    pub generation_prompt_path: Option<PathBuf>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            environment: Environment::default(),
            jwt_secret: None,
            session_ttl_days: default_session_ttl_days(),
            log_retention_days: default_log_retention_days(),
            generation_prompt_path: None,
        }
    }
}

impl AppConfig {
    pub fn jwt_secret(&self) -> &str {
        self.jwt_secret
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .unwrap_or(DEVELOPMENT_JWT_SECRET)
    }
}

#[derive(Debug, Clone, Default)]
struct ConfigLayers {
    file: Value,
    env: Value,
    cli: Value,
}

/// Layered JSON configuration. Later layers win: file < env < cli.
#[derive(Clone)]
pub struct ConfigStore {
    path: PathBuf,
    layers: Arc<RwLock<ConfigLayers>>,
}

impl ConfigStore {
    pub async fn new(path: impl AsRef<Path>, cli_overrides: Option<Value>) -> anyhow::Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        let file = read_json_file(&path).await?;
        let layers = ConfigLayers {
            file,
            env: env_layer(|key| std::env::var(key).ok()),
            cli: cli_overrides.unwrap_or_else(empty_object),
        };
        let store = Self {
            path,
            layers: Arc::new(RwLock::new(layers)),
        };
        store.save_file().await?;
        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn get(&self) -> AppConfig {
        let merged = self.get_effective_value().await;
        serde_json::from_value(merged).unwrap_or_default()
    }

    pub async fn get_effective_value(&self) -> Value {
        let layers = self.layers.read().await.clone();
        let mut merged = empty_object();
        deep_merge(&mut merged, &layers.file);
        deep_merge(&mut merged, &layers.env);
        deep_merge(&mut merged, &layers.cli);
        merged
    }

    pub async fn patch_file(&self, patch: Value) -> anyhow::Result<Value> {
        {
            let mut layers = self.layers.write().await;
            deep_merge(&mut layers.file, &patch);
        }
        self.save_file().await?;
        Ok(self.get_effective_value().await)
    }

    async fn save_file(&self) -> anyhow::Result<()> {
        let snapshot = self.layers.read().await.file.clone();
        write_json_file(&self.path, &snapshot).await
    }
}

pub fn default_state_dir() -> PathBuf {
    if let Some(data_dir) = dirs::data_dir() {
        return data_dir.join("uiforge");
    }
    dirs::home_dir()
        .map(|home| home.join(".uiforge"))
        .unwrap_or_else(|| PathBuf::from(".uiforge"))
}

fn empty_object() -> Value {
    Value::Object(Map::new())
}

async fn read_json_file(path: &Path) -> anyhow::Result<Value> {
    if !path.exists() {
        return Ok(empty_object());
    }
    let raw = fs::read_to_string(path).await?;
    Ok(serde_json::from_str::<Value>(&raw).unwrap_or_else(|_| empty_object()))
}

async fn write_json_file(path: &Path, value: &Value) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).await?;
    }
    let mut to_write = value.clone();
    strip_persisted_secrets(&mut to_write);
    let raw = serde_json::to_string_pretty(&to_write)?;
    fs::write(path, raw).await?;
    Ok(())
}

fn strip_persisted_secrets(value: &mut Value) {
    if let Value::Object(root) = value {
        root.remove("jwt_secret");
        root.remove("jwtSecret");
    }
}

fn env_layer(lookup: impl Fn(&str) -> Option<String>) -> Value {
    let mut root = empty_object();

    if let Some(env) = lookup("UIFORGE_ENV") {
        let normalized = env.trim().to_ascii_lowercase();
        if matches!(normalized.as_str(), "development" | "production" | "test") {
            deep_merge(&mut root, &json!({ "environment": normalized }));
        }
    }
    if let Some(secret) = lookup("UIFORGE_JWT_SECRET") {
        if !secret.trim().is_empty() {
            deep_merge(&mut root, &json!({ "jwt_secret": secret }));
        }
    }
    if let Some(days) = lookup("UIFORGE_SESSION_TTL_DAYS") {
        if let Ok(days) = days.trim().parse::<i64>() {
            if days > 0 {
                deep_merge(&mut root, &json!({ "session_ttl_days": days }));
            }
        }
    }
    if let Some(path) = lookup("UIFORGE_GENERATION_PROMPT") {
        if !path.trim().is_empty() {
            deep_merge(&mut root, &json!({ "generation_prompt_path": path }));
        }
    }

    root
}

pub fn deep_merge(base: &mut Value, overlay: &Value) {
    if overlay.is_null() {
        return;
    }
    match (base, overlay) {
        (Value::Object(base_map), Value::Object(overlay_map)) => {
            for (key, value) in overlay_map {
                if value.is_null() {
                    continue;
                }
                match base_map.get_mut(key) {
                    Some(existing) => deep_merge(existing, value),
                    None => {
                        base_map.insert(key.clone(), value.clone());
                    }
                }
            }
        }
        (base_value, overlay_value) => {
            *base_value = overlay_value.clone();
        }
    }
}
