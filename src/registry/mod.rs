//! Document registry
//!
//! An in-memory, read-optimized projection of documents and their owner
//! display fields. The relational store stays authoritative; the registry
//! is rebuilt wholesale on every refresh and swapped in atomically, so
//! concurrent readers see entirely-old or entirely-new data, never a mix.

use crate::embed::EmbeddingSpace;
use crate::error::Result;
use crate::meta::MetaDb;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// Denormalized per-document entry
#[derive(Debug, Clone, Serialize)]
pub struct RegistryEntry {
    pub document_id: String,
    pub slug: String,
    pub title: String,
    pub owner_id: String,
    pub owner_name: String,
    pub embedding_space: EmbeddingSpace,
    pub public: bool,
    pub active: bool,
}

/// One immutable registry generation
#[derive(Debug, Default)]
pub struct RegistrySnapshot {
    by_id: HashMap<String, Arc<RegistryEntry>>,
    by_slug: HashMap<String, Arc<RegistryEntry>>,
    version: u64,
    refreshed_at: String,
}

impl RegistrySnapshot {
    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn refreshed_at(&self) -> &str {
        &self.refreshed_at
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    /// Resolve a selector: immutable id first, then slug
    pub fn resolve(&self, selector: &str) -> Option<Arc<RegistryEntry>> {
        self.by_id
            .get(selector)
            .or_else(|| self.by_slug.get(selector))
            .cloned()
    }

    pub fn entries(&self) -> Vec<Arc<RegistryEntry>> {
        let mut entries: Vec<_> = self.by_id.values().cloned().collect();
        entries.sort_by(|a, b| a.slug.cmp(&b.slug));
        entries
    }
}

/// The process-wide registry handle
pub struct DocumentRegistry {
    db: MetaDb,
    snapshot: RwLock<Arc<RegistrySnapshot>>,
}

impl DocumentRegistry {
    pub fn new(db: MetaDb) -> Self {
        Self {
            db,
            snapshot: RwLock::new(Arc::new(RegistrySnapshot::default())),
        }
    }

    /// Populate the registry at startup
    pub async fn load(&self) -> Result<u64> {
        self.refresh().await
    }

    /// Rebuild the whole snapshot from the database and swap it in.
    ///
    /// On failure the previous snapshot stays in place: stale but
    /// internally consistent beats partially fresh.
    pub async fn refresh(&self) -> Result<u64> {
        let rows = match self.db.registry_rows().await {
            Ok(rows) => rows,
            Err(e) => {
                warn!("Registry refresh failed, keeping previous snapshot: {}", e);
                return Err(e);
            }
        };

        let mut by_id = HashMap::with_capacity(rows.len());
        let mut by_slug = HashMap::with_capacity(rows.len());
        for row in rows {
            let entry = Arc::new(RegistryEntry {
                document_id: row.id.clone(),
                slug: row.slug.clone(),
                title: row.title,
                owner_id: row.owner_id,
                owner_name: row.owner_name,
                embedding_space: row.embedding_space.parse()?,
                public: row.public,
                active: row.active,
            });
            by_slug.insert(row.slug, Arc::clone(&entry));
            by_id.insert(row.id, entry);
        }

        // Version assignment and swap share one critical section so
        // concurrent refreshes publish distinct generations
        let mut current = self.snapshot.write().await;
        let next_version = current.version + 1;
        let snapshot = Arc::new(RegistrySnapshot {
            by_id,
            by_slug,
            version: next_version,
            refreshed_at: chrono::Utc::now().to_rfc3339(),
        });

        let count = snapshot.len();
        *current = snapshot;
        drop(current);

        info!(version = next_version, documents = count, "Registry refreshed");
        Ok(next_version)
    }

    /// The current snapshot. Holding the `Arc` pins one consistent
    /// generation regardless of concurrent refreshes.
    pub async fn current(&self) -> Arc<RegistrySnapshot> {
        Arc::clone(&*self.snapshot.read().await)
    }

    pub async fn resolve(&self, selector: &str) -> Option<Arc<RegistryEntry>> {
        self.current().await.resolve(selector)
    }

    pub async fn version(&self) -> u64 {
        self.current().await.version
    }

    /// Drop all entries without touching the version counter's history
    pub async fn clear(&self) {
        let mut current = self.snapshot.write().await;
        let version = current.version;
        *current = Arc::new(RegistrySnapshot {
            version,
            refreshed_at: chrono::Utc::now().to_rfc3339(),
            ..RegistrySnapshot::default()
        });
        debug!("Registry cleared");
    }

    /// Spawn the interval auto-refresh task
    pub fn spawn_auto_refresh(
        self: &Arc<Self>,
        interval_secs: u64,
    ) -> tokio::task::JoinHandle<()> {
        let registry = Arc::downgrade(self);
        let interval = std::time::Duration::from_secs(interval_secs.max(1));

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                match registry.upgrade() {
                    Some(registry) => {
                        // failure keeps the previous snapshot; nothing to do
                        let _ = registry.refresh().await;
                    }
                    None => break,
                }
            }
        })
    }
}
