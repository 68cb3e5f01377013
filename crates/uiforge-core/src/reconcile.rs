use std::sync::{Arc, Mutex};

use anyhow::Context;
use serde::Serialize;

use uiforge_types::{AuthenticatedUser, NewProject};

use crate::anon_work::AnonymousWorkStore;
use crate::naming::ProjectNamer;
use crate::projects::ProjectStore;

/// Receives the single forward navigation produced by a reconciliation.
pub trait Navigator: Send + Sync {
    fn navigate(&self, target: &str);
}

/// Captures navigation targets instead of performing them, so HTTP handlers
/// can hand the redirect back to the client.
#[derive(Default)]
pub struct RecordingNavigator {
    targets: Mutex<Vec<String>>,
}

impl RecordingNavigator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn targets(&self) -> Vec<String> {
        self.targets
            .lock()
            .map(|targets| targets.clone())
            .unwrap_or_default()
    }

    pub fn last_target(&self) -> Option<String> {
        self.targets().pop()
    }
}

impl Navigator for RecordingNavigator {
    fn navigate(&self, target: &str) {
        if let Ok(mut targets) = self.targets.lock() {
            targets.push(target.to_string());
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReconciliationOutcome {
    #[serde(rename = "projectId")]
    pub project_id: String,
    pub target: String,
    pub created: bool,
    #[serde(rename = "consumedAnonymousWork")]
    pub consumed_anonymous_work: bool,
}

impl ReconciliationOutcome {
    fn new(project_id: String, created: bool, consumed_anonymous_work: bool) -> Self {
        Self {
            target: format!("/{project_id}"),
            project_id,
            created,
            consumed_anonymous_work,
        }
    }
}

/// Decides which project a freshly authenticated user lands on.
#[derive(Clone)]
pub struct SessionReconciler {
    anon_work: Arc<dyn AnonymousWorkStore>,
    projects: Arc<dyn ProjectStore>,
    navigator: Arc<dyn Navigator>,
    namer: ProjectNamer,
}

impl SessionReconciler {
    pub fn new(
        anon_work: Arc<dyn AnonymousWorkStore>,
        projects: Arc<dyn ProjectStore>,
        navigator: Arc<dyn Navigator>,
        namer: ProjectNamer,
    ) -> Self {
        Self {
            anon_work,
            projects,
            navigator,
            namer,
        }
    }

    /// Only call after a successful sign-in or sign-up.
    pub async fn reconcile(
        &self,
        user: &AuthenticatedUser,
    ) -> anyhow::Result<ReconciliationOutcome> {
        let outcome = self.resolve(user).await?;
        tracing::info!(
            "post-auth navigation for user {} -> {} (created={} consumed_anonymous_work={})",
            user.user_id,
            outcome.target,
            outcome.created,
            outcome.consumed_anonymous_work
        );
        self.navigator.navigate(&outcome.target);
        Ok(outcome)
    }

    async fn resolve(&self, user: &AuthenticatedUser) -> anyhow::Result<ReconciliationOutcome> {
        if let Some(work) = self.anon_work.take_non_empty().await? {
            let input = NewProject {
                name: self.namer.anonymous_import_name(),
                messages: work.messages.clone(),
                data: work.file_system_data.clone(),
            };
            return match self.projects.create(&user.user_id, input).await {
                Ok(project) => Ok(ReconciliationOutcome::new(project.id, true, true)),
                Err(err) => {
                    // Put the work back so a retry can still import it.
                    if let Err(restore_err) = self.anon_work.save(work).await {
                        tracing::error!(
                            "failed to restore anonymous work after project creation error: {}",
                            restore_err
                        );
                    }
                    Err(err).context("failed to save anonymous work as a project")
                }
            };
        }

        let projects = self
            .projects
            .list_recent(&user.user_id)
            .await
            .context("failed to list projects")?;
        if let Some(most_recent) = projects.into_iter().next() {
            return Ok(ReconciliationOutcome::new(most_recent.id, false, false));
        }

        let project = self
            .projects
            .create(
                &user.user_id,
                NewProject {
                    name: self.namer.blank_project_name(),
                    ..NewProject::default()
                },
            )
            .await
            .context("failed to create first project")?;
        Ok(ReconciliationOutcome::new(project.id, true, false))
    }
}
