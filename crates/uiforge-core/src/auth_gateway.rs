use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use uiforge_observability::redact_text;
use uiforge_types::AuthResult;

use crate::accounts::AccountActions;
use crate::reconcile::SessionReconciler;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthAction {
    SignIn,
    SignUp,
}

impl AuthAction {
    pub fn as_str(self) -> &'static str {
        match self {
            AuthAction::SignIn => "sign_in",
            AuthAction::SignUp => "sign_up",
        }
    }
}

/// Sign-in/sign-up entry point: tracks the in-progress flag and hands a
/// successful result to the reconciler.
#[derive(Clone)]
pub struct AuthGateway {
    accounts: Arc<dyn AccountActions>,
    reconciler: SessionReconciler,
    in_progress: Arc<AtomicBool>,
}

struct InProgressGuard<'a>(&'a AtomicBool);

impl<'a> InProgressGuard<'a> {
    fn engage(flag: &'a AtomicBool) -> Self {
        flag.store(true, Ordering::SeqCst);
        Self(flag)
    }
}

impl Drop for InProgressGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl AuthGateway {
    pub fn new(accounts: Arc<dyn AccountActions>, reconciler: SessionReconciler) -> Self {
        Self {
            accounts,
            reconciler,
            in_progress: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn is_loading(&self) -> bool {
        self.in_progress.load(Ordering::SeqCst)
    }

    pub async fn sign_in(&self, email: &str, password: &str) -> anyhow::Result<AuthResult> {
        self.run(AuthAction::SignIn, email, password).await
    }

    pub async fn sign_up(&self, email: &str, password: &str) -> anyhow::Result<AuthResult> {
        self.run(AuthAction::SignUp, email, password).await
    }

    async fn run(
        &self,
        action: AuthAction,
        email: &str,
        password: &str,
    ) -> anyhow::Result<AuthResult> {
        let _loading = InProgressGuard::engage(&self.in_progress);
        let result = match action {
            AuthAction::SignIn => self.accounts.sign_in(email, password).await?,
            AuthAction::SignUp => self.accounts.sign_up(email, password).await?,
        };
        match &result {
            AuthResult::Success(user) => {
                self.reconciler.reconcile(user).await?;
            }
            AuthResult::Failure { error } => {
                tracing::info!(
                    "{} failed for {}: {}",
                    action.as_str(),
                    redact_text(email),
                    error
                );
            }
        }
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use anyhow::anyhow;
    use async_trait::async_trait;
    use serde_json::Map;
    use tokio::sync::Notify;
    use uiforge_types::{AnonymousWork, AuthenticatedUser, ChatMessage};

    use super::*;
    use crate::naming::ProjectNamer;
    use crate::reconcile::testing::{user, FakeAnonWork, FakeProjects};
    use crate::reconcile::RecordingNavigator;

    enum Scripted {
        Result(AuthResult),
        Error(&'static str),
    }

    struct FakeAccounts {
        script: Mutex<Option<Scripted>>,
        calls: Mutex<Vec<(&'static str, String, String)>>,
        gate: Option<Arc<Notify>>,
        entered: Arc<Notify>,
    }

    impl FakeAccounts {
        fn new(script: Scripted) -> Self {
            Self {
                script: Mutex::new(Some(script)),
                calls: Mutex::new(Vec::new()),
                gate: None,
                entered: Arc::new(Notify::new()),
            }
        }

        fn gated(script: Scripted, gate: Arc<Notify>) -> Self {
            Self {
                gate: Some(gate),
                ..Self::new(script)
            }
        }

        async fn respond(
            &self,
            kind: &'static str,
            email: &str,
            password: &str,
        ) -> anyhow::Result<AuthResult> {
            self.calls
                .lock()
                .expect("lock")
                .push((kind, email.to_string(), password.to_string()));
            self.entered.notify_one();
            if let Some(gate) = &self.gate {
                gate.notified().await;
            }
            match self.script.lock().expect("lock").take() {
                Some(Scripted::Result(result)) => Ok(result),
                Some(Scripted::Error(message)) => Err(anyhow!(message)),
                None => Err(anyhow!("unexpected call")),
            }
        }
    }

    #[async_trait]
    impl AccountActions for FakeAccounts {
        async fn sign_in(&self, email: &str, password: &str) -> anyhow::Result<AuthResult> {
            self.respond("sign_in", email, password).await
        }

        async fn sign_up(&self, email: &str, password: &str) -> anyhow::Result<AuthResult> {
            self.respond("sign_up", email, password).await
        }
    }

    struct Harness {
        gateway: AuthGateway,
        accounts: Arc<FakeAccounts>,
        anon: Arc<FakeAnonWork>,
        projects: Arc<FakeProjects>,
        navigator: Arc<RecordingNavigator>,
    }

    fn harness(accounts: FakeAccounts, anon: FakeAnonWork, projects: FakeProjects) -> Harness {
        let accounts = Arc::new(accounts);
        let anon = Arc::new(anon);
        let projects = Arc::new(projects);
        let navigator = Arc::new(RecordingNavigator::new());
        let reconciler = SessionReconciler::new(
            anon.clone(),
            projects.clone(),
            navigator.clone(),
            ProjectNamer::new(),
        );
        Harness {
            gateway: AuthGateway::new(accounts.clone(), reconciler),
            accounts,
            anon,
            projects,
            navigator,
        }
    }

    fn success() -> Scripted {
        Scripted::Result(AuthResult::Success(user()))
    }

    fn anon_work(content: &str) -> AnonymousWork {
        AnonymousWork::new(vec![ChatMessage::new("user", content)], Map::new())
    }

    #[tokio::test]
    async fn starts_idle() {
        let h = harness(
            FakeAccounts::new(success()),
            FakeAnonWork::default(),
            FakeProjects::default(),
        );
        assert!(!h.gateway.is_loading());
    }

    #[tokio::test]
    async fn forwards_credentials_and_returns_result_unchanged() {
        let h = harness(
            FakeAccounts::new(Scripted::Result(AuthResult::failure("Bad creds"))),
            FakeAnonWork::default(),
            FakeProjects::default(),
        );
        let result = h
            .gateway
            .sign_in("user@test.com", "password123")
            .await
            .expect("sign in");
        assert_eq!(result, AuthResult::failure("Bad creds"));
        assert_eq!(
            h.accounts.calls.lock().expect("lock").clone(),
            vec![(
                "sign_in",
                "user@test.com".to_string(),
                "password123".to_string()
            )]
        );
    }

    #[tokio::test]
    async fn failed_authentication_has_no_side_effects() {
        let h = harness(
            FakeAccounts::new(Scripted::Result(AuthResult::failure("Invalid credentials"))),
            FakeAnonWork::holding(Some(anon_work("hello"))),
            FakeProjects::default(),
        );
        h.gateway.sign_up("a@b.com", "pw").await.expect("sign up");
        assert_eq!(h.anon.gets.load(Ordering::SeqCst), 0);
        assert_eq!(h.anon.clears.load(Ordering::SeqCst), 0);
        assert_eq!(h.projects.lists.load(Ordering::SeqCst), 0);
        assert!(h.projects.created().is_empty());
        assert!(h.navigator.targets().is_empty());
        assert!(!h.gateway.is_loading());
    }

    #[tokio::test]
    async fn loading_is_set_while_the_action_is_pending() {
        let gate = Arc::new(Notify::new());
        let h = harness(
            FakeAccounts::gated(Scripted::Result(AuthResult::failure("nope")), gate.clone()),
            FakeAnonWork::default(),
            FakeProjects::default(),
        );
        assert!(!h.gateway.is_loading());

        let gateway = h.gateway.clone();
        let pending = tokio::spawn(async move { gateway.sign_up("a@b.com", "pw").await });
        h.accounts.entered.notified().await;
        assert!(h.gateway.is_loading());

        gate.notify_one();
        pending.await.expect("join").expect("sign up");
        assert!(!h.gateway.is_loading());
    }

    #[tokio::test]
    async fn loading_resets_when_the_action_errors() {
        let h = harness(
            FakeAccounts::new(Scripted::Error("Server error")),
            FakeAnonWork::default(),
            FakeProjects::default(),
        );
        let err = h
            .gateway
            .sign_in("a@b.com", "pw")
            .await
            .expect_err("should propagate");
        assert_eq!(err.to_string(), "Server error");
        assert!(!h.gateway.is_loading());
        assert!(h.navigator.targets().is_empty());
    }

    #[tokio::test]
    async fn loading_resets_when_reconciliation_errors() {
        let projects = FakeProjects::default();
        projects.fail_create.store(true, Ordering::SeqCst);
        let h = harness(FakeAccounts::new(success()), FakeAnonWork::default(), projects);
        assert!(h.gateway.sign_in("a@b.com", "pw").await.is_err());
        assert!(!h.gateway.is_loading());
    }

    #[tokio::test]
    async fn sign_in_imports_anonymous_work_and_navigates_once() {
        let h = harness(
            FakeAccounts::new(success()),
            FakeAnonWork::holding(Some(anon_work("hello"))),
            FakeProjects::with_existing(&["existing"]),
        );
        let result = h.gateway.sign_in("a@b.com", "pw").await.expect("sign in");
        assert!(result.is_success());
        assert_eq!(h.projects.created().len(), 1);
        assert_eq!(h.anon.clears.load(Ordering::SeqCst), 1);
        assert_eq!(h.navigator.targets(), vec!["/created-1".to_string()]);
    }

    #[tokio::test]
    async fn sign_up_follows_the_same_post_auth_flow() {
        let h = harness(
            FakeAccounts::new(success()),
            FakeAnonWork::holding(Some(anon_work("hi"))),
            FakeProjects::default(),
        );
        h.gateway.sign_up("a@b.com", "pw").await.expect("sign up");
        assert_eq!(h.projects.created().len(), 1);
        assert_eq!(h.anon.clears.load(Ordering::SeqCst), 1);
        assert_eq!(h.navigator.targets(), vec!["/created-1".to_string()]);
    }

    #[tokio::test]
    async fn sign_up_without_work_resumes_most_recent_project() {
        let h = harness(
            FakeAccounts::new(Scripted::Result(AuthResult::Success(AuthenticatedUser {
                user_id: "user-1".to_string(),
                email: "a@b.com".to_string(),
            }))),
            FakeAnonWork::holding(None),
            FakeProjects::with_existing(&["recent", "older"]),
        );
        h.gateway.sign_up("a@b.com", "pw").await.expect("sign up");
        assert_eq!(h.navigator.targets(), vec!["/recent".to_string()]);
        assert_eq!(h.anon.clears.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn second_sign_in_does_not_reimport_consumed_work() {
        let anon = FakeAnonWork::holding(Some(anon_work("hello")));
        let accounts = FakeAccounts::new(success());
        let h = harness(accounts, anon, FakeProjects::with_existing(&["existing"]));
        h.gateway.sign_in("a@b.com", "pw").await.expect("first");
        *h.accounts.script.lock().expect("lock") = Some(success());
        h.gateway.sign_in("a@b.com", "pw").await.expect("second");

        assert_eq!(h.projects.created().len(), 1);
        assert_eq!(h.anon.clears.load(Ordering::SeqCst), 1);
        assert_eq!(
            h.navigator.targets(),
            vec!["/created-1".to_string(), "/existing".to_string()]
        );
    }
}
