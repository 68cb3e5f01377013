use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::Context;
use async_trait::async_trait;
use tokio::fs;
use tokio::sync::RwLock;

use uiforge_types::{NewProject, Project};

const PROJECTS_FILE: &str = "projects.json";

#[async_trait]
pub trait ProjectStore: Send + Sync {
    /// Projects owned by `user_id`, most recently updated first. Callers rely
    /// on this ordering and never sort.
    async fn list_recent(&self, user_id: &str) -> anyhow::Result<Vec<Project>>;
    async fn create(&self, user_id: &str, input: NewProject) -> anyhow::Result<Project>;
}

pub struct ProjectStorage {
    base: PathBuf,
    projects: RwLock<HashMap<String, Project>>,
}

impl ProjectStorage {
    pub async fn new(base: impl AsRef<Path>) -> anyhow::Result<Self> {
        let base = base.as_ref().to_path_buf();
        fs::create_dir_all(&base).await?;
        let projects_file = base.join(PROJECTS_FILE);
        let projects = if projects_file.exists() {
            let raw = fs::read_to_string(&projects_file).await?;
            serde_json::from_str::<HashMap<String, Project>>(&raw)
                .with_context(|| format!("failed to parse {}", projects_file.display()))?
        } else {
            HashMap::new()
        };
        Ok(Self {
            base,
            projects: RwLock::new(projects),
        })
    }

    /// Only returns the project when `user_id` owns it.
    pub async fn get_project(&self, user_id: &str, id: &str) -> Option<Project> {
        self.projects
            .read()
            .await
            .get(id)
            .filter(|project| project.user_id == user_id)
            .cloned()
    }

    async fn write_snapshot(&self, snapshot: &HashMap<String, Project>) -> anyhow::Result<()> {
        let payload = serde_json::to_string_pretty(snapshot)?;
        fs::write(self.base.join(PROJECTS_FILE), payload).await?;
        Ok(())
    }
}

#[async_trait]
impl ProjectStore for ProjectStorage {
    async fn list_recent(&self, user_id: &str) -> anyhow::Result<Vec<Project>> {
        let mut owned = self
            .projects
            .read()
            .await
            .values()
            .filter(|project| project.user_id == user_id)
            .cloned()
            .collect::<Vec<_>>();
        owned.sort_by(|a, b| {
            b.updated_at
                .cmp(&a.updated_at)
                .then_with(|| b.created_at.cmp(&a.created_at))
                .then_with(|| a.id.cmp(&b.id))
        });
        Ok(owned)
    }

    async fn create(&self, user_id: &str, input: NewProject) -> anyhow::Result<Project> {
        let project = Project::new(user_id, input);
        // The map only changes once the file holding the new project is written.
        let mut projects = self.projects.write().await;
        let mut next = projects.clone();
        next.insert(project.id.clone(), project.clone());
        self.write_snapshot(&next).await?;
        *projects = next;
        drop(projects);
        tracing::info!(
            "created project {} for user {} ({} messages)",
            project.id,
            user_id,
            project.messages.len()
        );
        Ok(project)
    }
}
