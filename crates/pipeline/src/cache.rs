use std::sync::Arc;
use std::time::{Duration, Instant};

use centime_core::CategorizationRule;
use centime_storage::{get_rules, DbPool, StorageError};
use tokio::sync::RwLock;

/// TTL cache over the active rule set. Ingesting a folder classifies every
/// row, and re-reading the rules table per row (or even per file) is wasted
/// I/O since rules change rarely. `invalidate` forces a reload after edits.
pub struct RuleCache {
    ttl: Duration,
    state: RwLock<Option<CachedRules>>,
}

struct CachedRules {
    rules: Arc<Vec<CategorizationRule>>,
    fetched_at: Instant,
}

impl RuleCache {
    pub fn new(ttl: Duration) -> Self {
        RuleCache { ttl, state: RwLock::new(None) }
    }

    /// The active rules, from cache when fresh, else reloaded from the store.
    pub async fn get(&self, pool: &DbPool) -> Result<Arc<Vec<CategorizationRule>>, StorageError> {
        {
            let guard = self.state.read().await;
            if let Some(cached) = guard.as_ref() {
                if cached.fetched_at.elapsed() < self.ttl {
                    return Ok(Arc::clone(&cached.rules));
                }
            }
        }

        let mut guard = self.state.write().await;
        // Another task may have refreshed while we waited for the write lock.
        if let Some(cached) = guard.as_ref() {
            if cached.fetched_at.elapsed() < self.ttl {
                return Ok(Arc::clone(&cached.rules));
            }
        }

        let rules = Arc::new(get_rules(pool, true).await?);
        tracing::debug!(count = rules.len(), "refreshed rule cache");
        *guard = Some(CachedRules { rules: Arc::clone(&rules), fetched_at: Instant::now() });
        Ok(rules)
    }

    pub async fn invalidate(&self) {
        *self.state.write().await = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use centime_core::TxnKind;
    use centime_storage::{create_db, save_rule};

    fn rule(pattern: &str, category: &str) -> CategorizationRule {
        CategorizationRule {
            id: None,
            pattern: pattern.to_string(),
            case_sensitive: false,
            amount_op: None,
            amount_value: None,
            kind: TxnKind::Expenses,
            category: category.to_string(),
            priority: 0,
            is_active: true,
            created_at: None,
            updated_at: None,
        }
    }

    async fn pool_with_one_rule() -> (tempfile::TempDir, DbPool) {
        let dir = tempfile::tempdir().unwrap();
        let pool = create_db(&dir.path().join("test.db")).await.unwrap();
        save_rule(&pool, &rule("netflix", "Streaming")).await.unwrap();
        (dir, pool)
    }

    #[tokio::test]
    async fn serves_cached_rules_until_invalidated() {
        let (_dir, pool) = pool_with_one_rule().await;
        let cache = RuleCache::new(Duration::from_secs(60));

        assert_eq!(cache.get(&pool).await.unwrap().len(), 1);
        save_rule(&pool, &rule("spotify", "Streaming")).await.unwrap();

        // Within the TTL the new rule is not visible.
        assert_eq!(cache.get(&pool).await.unwrap().len(), 1);

        cache.invalidate().await;
        assert_eq!(cache.get(&pool).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn zero_ttl_reloads_every_time() {
        let (_dir, pool) = pool_with_one_rule().await;
        let cache = RuleCache::new(Duration::ZERO);

        assert_eq!(cache.get(&pool).await.unwrap().len(), 1);
        save_rule(&pool, &rule("coop", "Groceries")).await.unwrap();
        assert_eq!(cache.get(&pool).await.unwrap().len(), 2);
    }
}
