//! First-name synonym expansion.
//!
//! The reference table belongs to an external collaborator and is only ever read. It is cached
//! here for [`CoreConfig::synonym_cache_ttl`](crate::CoreConfig::synonym_cache_ttl); when a
//! refresh fails the stale table keeps serving, and only a cold cache propagates the error.
//!
//! Expansion widens the name search of the candidate matcher. It has no bearing on the
//! national-ID + date-of-birth rule, which ignores names altogether.

use async_trait::async_trait;
use std::collections::{BTreeSet, HashMap};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

use crate::{RegisterError, RegisterResult};

/// Source of the name → synonyms reference data.
#[async_trait]
pub trait SynonymProvider: Send + Sync {
    /// Returns the raw mapping. Keys and values may be in any case.
    async fn load(&self) -> RegisterResult<HashMap<String, Vec<String>>>;
}

/// Lowercased, symmetric lookup built from the raw mapping.
///
/// Each entry `name: [a, b]` forms the group `{name, a, b}`; every member of a group expands
/// to all members of every group it belongs to (one hop, not a transitive closure).
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SynonymTable {
    index: HashMap<String, BTreeSet<String>>,
}

impl SynonymTable {
    pub fn from_groups(groups: HashMap<String, Vec<String>>) -> Self {
        let mut index: HashMap<String, BTreeSet<String>> = HashMap::new();

        for (name, synonyms) in groups {
            let group: BTreeSet<String> = std::iter::once(name)
                .chain(synonyms)
                .map(|n| n.trim().to_lowercase())
                .filter(|n| !n.is_empty())
                .collect();

            for member in &group {
                index
                    .entry(member.clone())
                    .or_default()
                    .extend(group.iter().cloned());
            }
        }

        Self { index }
    }

    /// Returns the lowercased name plus every known synonym. Blank input yields an empty set.
    pub fn expand(&self, first_name: &str) -> BTreeSet<String> {
        let key = first_name.trim().to_lowercase();
        if key.is_empty() {
            return BTreeSet::new();
        }

        let mut names = self.index.get(&key).cloned().unwrap_or_default();
        names.insert(key);
        names
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }
}

struct CachedTable {
    loaded_at: Instant,
    table: Arc<SynonymTable>,
}

/// Caching front for a [`SynonymProvider`].
pub struct SynonymExpander {
    provider: Arc<dyn SynonymProvider>,
    ttl: Duration,
    cache: RwLock<Option<CachedTable>>,
}

impl SynonymExpander {
    pub fn new(provider: Arc<dyn SynonymProvider>, ttl: Duration) -> Self {
        Self {
            provider,
            ttl,
            cache: RwLock::new(None),
        }
    }

    /// Expands `first_name` into its lowercased synonym set, including itself.
    ///
    /// # Errors
    ///
    /// Propagates the provider error only when no table has ever been loaded.
    pub async fn expand(&self, first_name: &str) -> RegisterResult<BTreeSet<String>> {
        if first_name.trim().is_empty() {
            return Ok(BTreeSet::new());
        }
        let table = self.table().await?;
        Ok(table.expand(first_name))
    }

    async fn table(&self) -> RegisterResult<Arc<SynonymTable>> {
        {
            let cache = self.cache.read().await;
            if let Some(cached) = cache.as_ref() {
                if cached.loaded_at.elapsed() < self.ttl {
                    return Ok(cached.table.clone());
                }
            }
        }

        let mut cache = self.cache.write().await;
        // Another task may have refreshed while we waited for the write lock.
        if let Some(cached) = cache.as_ref() {
            if cached.loaded_at.elapsed() < self.ttl {
                return Ok(cached.table.clone());
            }
        }

        match self.provider.load().await {
            Ok(groups) => {
                let table = Arc::new(SynonymTable::from_groups(groups));
                tracing::debug!(names = table.len(), "synonym table loaded");
                *cache = Some(CachedTable {
                    loaded_at: Instant::now(),
                    table: table.clone(),
                });
                Ok(table)
            }
            Err(e) => match cache.as_ref() {
                Some(stale) => {
                    tracing::warn!(error = %e, "synonym refresh failed; serving stale table");
                    Ok(stale.table.clone())
                }
                None => Err(e),
            },
        }
    }
}

/// Fixed in-memory reference data. An empty provider disables expansion.
#[derive(Clone, Debug, Default)]
pub struct StaticSynonymProvider {
    groups: HashMap<String, Vec<String>>,
}

impl StaticSynonymProvider {
    pub fn new(groups: HashMap<String, Vec<String>>) -> Self {
        Self { groups }
    }
}

#[async_trait]
impl SynonymProvider for StaticSynonymProvider {
    async fn load(&self) -> RegisterResult<HashMap<String, Vec<String>>> {
        Ok(self.groups.clone())
    }
}

/// Reads the reference data from a YAML mapping of `name: [synonym, ...]`.
#[derive(Clone, Debug)]
pub struct YamlSynonymProvider {
    path: PathBuf,
}

impl YamlSynonymProvider {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl SynonymProvider for YamlSynonymProvider {
    async fn load(&self) -> RegisterResult<HashMap<String, Vec<String>>> {
        let raw = tokio::fs::read_to_string(&self.path).await.map_err(|e| {
            RegisterError::UpstreamUnavailable(format!(
                "failed to read synonym file {}: {e}",
                self.path.display()
            ))
        })?;
        serde_yaml::from_str(&raw).map_err(|e| {
            RegisterError::InvalidInput(format!(
                "synonym file {} is not a name -> list mapping: {e}",
                self.path.display()
            ))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn groups(pairs: &[(&str, &[&str])]) -> HashMap<String, Vec<String>> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.iter().map(|s| s.to_string()).collect()))
            .collect()
    }

    struct CountingProvider {
        calls: AtomicUsize,
        fail_after: usize,
    }

    #[async_trait]
    impl SynonymProvider for CountingProvider {
        async fn load(&self) -> RegisterResult<HashMap<String, Vec<String>>> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n >= self.fail_after {
                return Err(RegisterError::UpstreamUnavailable("synonyms offline".into()));
            }
            Ok(groups(&[("Robert", &["Bob", "Rob"])]))
        }
    }

    #[test]
    fn test_expand_includes_name_itself() {
        let table = SynonymTable::default();
        let names = table.expand("Minnie");
        assert_eq!(names.into_iter().collect::<Vec<_>>(), vec!["minnie"]);
    }

    #[test]
    fn test_expand_is_symmetric() {
        let table = SynonymTable::from_groups(groups(&[("Robert", &["Bob", "Rob"])]));
        let from_nickname = table.expand("bob");
        assert!(from_nickname.contains("robert"));
        assert!(from_nickname.contains("rob"));
        assert!(from_nickname.contains("bob"));
    }

    #[test]
    fn test_expand_does_not_chain_groups() {
        let table = SynonymTable::from_groups(groups(&[
            ("Alan", &["Al"]),
            ("Albert", &["Al", "Bert"]),
        ]));
        let alan = table.expand("Alan");
        assert!(alan.contains("al"));
        assert!(!alan.contains("albert"));
        let al = table.expand("Al");
        assert!(al.contains("alan") && al.contains("albert") && al.contains("bert"));
    }

    #[test]
    fn test_blank_name_expands_to_nothing() {
        let table = SynonymTable::from_groups(groups(&[("Robert", &["Bob"])]));
        assert!(table.expand("   ").is_empty());
    }

    #[tokio::test]
    async fn test_expander_caches_within_ttl() {
        let provider = Arc::new(CountingProvider {
            calls: AtomicUsize::new(0),
            fail_after: usize::MAX,
        });
        let expander = SynonymExpander::new(provider.clone(), Duration::from_secs(60));

        expander.expand("Bob").await.unwrap();
        expander.expand("Rob").await.unwrap();

        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_expander_serves_stale_table_when_refresh_fails() {
        let provider = Arc::new(CountingProvider {
            calls: AtomicUsize::new(0),
            fail_after: 1,
        });
        let expander = SynonymExpander::new(provider.clone(), Duration::from_nanos(1));

        let first = expander.expand("Bob").await.unwrap();
        tokio::time::sleep(Duration::from_millis(2)).await;
        let second = expander.expand("Bob").await.unwrap();

        assert_eq!(first, second);
        assert!(provider.calls.load(Ordering::SeqCst) >= 2);
    }

    #[tokio::test]
    async fn test_expander_propagates_error_on_cold_cache() {
        let provider = Arc::new(CountingProvider {
            calls: AtomicUsize::new(0),
            fail_after: 0,
        });
        let expander = SynonymExpander::new(provider, Duration::from_secs(60));

        let err = expander.expand("Bob").await.unwrap_err();
        assert!(matches!(err, RegisterError::UpstreamUnavailable(_)));
    }

    #[tokio::test]
    async fn test_yaml_provider_reads_mapping() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("synonyms.yaml");
        std::fs::write(&path, "Robert:\n  - Bob\n  - Rob\nMargaret: [Peggy]\n").unwrap();

        let loaded = YamlSynonymProvider::new(&path).load().await.unwrap();
        assert_eq!(loaded["Robert"], vec!["Bob".to_string(), "Rob".to_string()]);
        assert_eq!(loaded["Margaret"], vec!["Peggy".to_string()]);
    }

    #[tokio::test]
    async fn test_yaml_provider_reports_missing_file() {
        let err = YamlSynonymProvider::new("/definitely/not/here.yaml")
            .load()
            .await
            .unwrap_err();
        assert!(matches!(err, RegisterError::UpstreamUnavailable(_)));
    }
}
