use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use uiforge_types::AnonymousWork;

pub const ANON_WORK_COOKIE_NAME: &str = "anon-work-id";
pub const DEFAULT_ANON_WORK_TTL_HOURS: i64 = 24;
pub const DEFAULT_MAX_ANON_VISITORS: usize = 10_000;

/// Holds at most one pending piece of pre-authentication work.
#[async_trait]
pub trait AnonymousWorkStore: Send + Sync {
    async fn get(&self) -> anyhow::Result<Option<AnonymousWork>>;
    async fn save(&self, work: AnonymousWork) -> anyhow::Result<()>;
    async fn clear(&self) -> anyhow::Result<()>;

    /// Reads once and clears only when the work has messages. Empty or
    /// missing work is left untouched.
    async fn take_non_empty(&self) -> anyhow::Result<Option<AnonymousWork>> {
        let Some(work) = self.get().await? else {
            return Ok(None);
        };
        if !work.has_messages() {
            return Ok(None);
        }
        self.clear().await?;
        Ok(Some(work))
    }
}

#[derive(Debug, Clone)]
struct StoredWork {
    work: AnonymousWork,
    saved_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy)]
struct Limits {
    ttl: Duration,
    max_visitors: usize,
}

impl Limits {
    fn is_expired(&self, entry: &StoredWork, now: DateTime<Utc>) -> bool {
        entry.saved_at <= now - self.ttl
    }
}

type Entries = Arc<RwLock<HashMap<String, StoredWork>>>;

/// In-memory anonymous work for every visitor, keyed by the visitor id kept
/// in the `anon-work-id` cookie. Entries expire after the TTL and the oldest
/// are evicted once `max_visitors` is reached; both are enforced on save.
#[derive(Clone)]
pub struct AnonymousWorkRegistry {
    entries: Entries,
    limits: Limits,
}

impl Default for AnonymousWorkRegistry {
    fn default() -> Self {
        Self::with_limits(
            Duration::hours(DEFAULT_ANON_WORK_TTL_HOURS),
            DEFAULT_MAX_ANON_VISITORS,
        )
    }
}

impl AnonymousWorkRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_limits(ttl: Duration, max_visitors: usize) -> Self {
        Self {
            entries: Arc::new(RwLock::new(HashMap::new())),
            limits: Limits {
                ttl,
                max_visitors: max_visitors.max(1),
            },
        }
    }

    pub fn new_visitor_id() -> String {
        format!("anon_{}", Uuid::new_v4().simple())
    }

    pub fn scoped(&self, visitor_id: impl Into<String>) -> ScopedAnonymousWork {
        ScopedAnonymousWork {
            entries: self.entries.clone(),
            limits: self.limits,
            visitor_id: visitor_id.into(),
        }
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }
}

#[derive(Clone)]
pub struct ScopedAnonymousWork {
    entries: Entries,
    limits: Limits,
    visitor_id: String,
}

impl ScopedAnonymousWork {
    pub fn visitor_id(&self) -> &str {
        &self.visitor_id
    }
}

/// Drops expired entries, then the oldest ones until there is room for
/// `incoming` (an existing visitor replacing its own work needs no room).
fn prune(
    entries: &mut HashMap<String, StoredWork>,
    limits: Limits,
    incoming: &str,
    now: DateTime<Utc>,
) {
    let before = entries.len();
    entries.retain(|_, entry| !limits.is_expired(entry, now));

    let needs_room = !entries.contains_key(incoming);
    while needs_room && entries.len() >= limits.max_visitors {
        let oldest = entries
            .iter()
            .min_by_key(|(_, entry)| entry.saved_at)
            .map(|(id, _)| id.clone());
        match oldest {
            Some(id) => {
                entries.remove(&id);
            }
            None => break,
        }
    }

    let dropped = before.saturating_sub(entries.len());
    if dropped > 0 {
        tracing::debug!("pruned {} anonymous work entries", dropped);
    }
}

#[async_trait]
impl AnonymousWorkStore for ScopedAnonymousWork {
    async fn get(&self) -> anyhow::Result<Option<AnonymousWork>> {
        let now = Utc::now();
        Ok(self
            .entries
            .read()
            .await
            .get(&self.visitor_id)
            .filter(|entry| !self.limits.is_expired(entry, now))
            .map(|entry| entry.work.clone()))
    }

    async fn save(&self, work: AnonymousWork) -> anyhow::Result<()> {
        let now = Utc::now();
        let mut entries = self.entries.write().await;
        prune(&mut entries, self.limits, &self.visitor_id, now);
        entries.insert(
            self.visitor_id.clone(),
            StoredWork {
                work,
                saved_at: now,
            },
        );
        Ok(())
    }

    async fn clear(&self) -> anyhow::Result<()> {
        self.entries.write().await.remove(&self.visitor_id);
        Ok(())
    }

    async fn take_non_empty(&self) -> anyhow::Result<Option<AnonymousWork>> {
        let now = Utc::now();
        let mut entries = self.entries.write().await;
        let live = entries
            .get(&self.visitor_id)
            .filter(|entry| !self.limits.is_expired(entry, now))
            .map(|entry| entry.work.has_messages());
        match live {
            Some(true) => Ok(entries.remove(&self.visitor_id).map(|entry| entry.work)),
            Some(false) => Ok(None),
            None => {
                entries.remove(&self.visitor_id);
                Ok(None)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Map};
    use uiforge_types::ChatMessage;

    fn work_with_messages() -> AnonymousWork {
        let mut fs = Map::new();
        fs.insert("/App.jsx".to_string(), json!("export default () => <div/>"));
        AnonymousWork::new(vec![ChatMessage::new("user", "hello")], fs)
    }

    #[tokio::test]
    async fn take_non_empty_consumes_work_once() {
        let registry = AnonymousWorkRegistry::new();
        let store = registry.scoped("visitor-1");
        store.save(work_with_messages()).await.expect("save");

        let first = store.take_non_empty().await.expect("take");
        assert_eq!(first, Some(work_with_messages()));
        assert_eq!(store.take_non_empty().await.expect("second take"), None);
        assert_eq!(store.get().await.expect("get"), None);
    }

    #[tokio::test]
    async fn take_non_empty_leaves_empty_work_in_place() {
        let registry = AnonymousWorkRegistry::new();
        let store = registry.scoped("visitor-2");
        store
            .save(AnonymousWork::default())
            .await
            .expect("save empty");

        assert_eq!(store.take_non_empty().await.expect("take"), None);
        assert_eq!(
            store.get().await.expect("get"),
            Some(AnonymousWork::default())
        );
    }

    #[tokio::test]
    async fn visitors_do_not_see_each_other() {
        let registry = AnonymousWorkRegistry::new();
        registry
            .scoped("a")
            .save(work_with_messages())
            .await
            .expect("save");
        assert_eq!(registry.scoped("b").get().await.expect("get"), None);
        registry.scoped("b").clear().await.expect("clear");
        assert_eq!(registry.len().await, 1);
    }

    #[tokio::test]
    async fn registry_is_capped_by_evicting_the_oldest_visitors() {
        let registry = AnonymousWorkRegistry::with_limits(Duration::hours(1), 3);
        let mut ids = Vec::new();
        for _ in 0..10 {
            let id = AnonymousWorkRegistry::new_visitor_id();
            registry
                .scoped(id.clone())
                .save(AnonymousWork::default())
                .await
                .expect("save");
            ids.push(id);
        }
        assert_eq!(registry.len().await, 3);
        let newest = registry.scoped(ids[9].clone());
        assert_eq!(
            newest.get().await.expect("get"),
            Some(AnonymousWork::default())
        );
    }

    #[tokio::test]
    async fn resaving_an_existing_visitor_does_not_evict_others() {
        let registry = AnonymousWorkRegistry::with_limits(Duration::hours(1), 2);
        registry.scoped("a").save(work_with_messages()).await.expect("a");
        registry.scoped("b").save(work_with_messages()).await.expect("b");
        registry
            .scoped("b")
            .save(AnonymousWork::default())
            .await
            .expect("b again");
        assert_eq!(registry.len().await, 2);
        assert_eq!(
            registry.scoped("a").get().await.expect("get"),
            Some(work_with_messages())
        );
    }

    #[tokio::test]
    async fn expired_work_is_invisible_and_pruned_on_save() {
        let registry = AnonymousWorkRegistry::with_limits(Duration::zero(), 100);
        let store = registry.scoped("stale");
        store.save(work_with_messages()).await.expect("save");
        assert_eq!(store.get().await.expect("get"), None);
        assert_eq!(store.take_non_empty().await.expect("take"), None);

        registry
            .scoped("other")
            .save(AnonymousWork::default())
            .await
            .expect("save other");
        assert_eq!(registry.len().await, 1);
    }

    #[test]
    fn visitor_ids_are_prefixed_and_unique() {
        let a = AnonymousWorkRegistry::new_visitor_id();
        let b = AnonymousWorkRegistry::new_visitor_id();
        assert!(a.starts_with("anon_"));
        assert_ne!(a, b);
    }
}
