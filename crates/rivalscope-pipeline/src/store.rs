//! Result store: pluggable persistence for aggregate reports, keyed by tenant.
//!
//! Today: in-memory and local filesystem. The executor only ever treats a
//! store failure as a warning.

use crate::report::AggregateReport;
use dashmap::DashMap;
use rivalscope_core::config::{StoreBackend, StoreConfig};
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

#[async_trait::async_trait]
pub trait ResultStore: Send + Sync {
    fn name(&self) -> &str;

    /// Save a finished job's report under its tenant.
    async fn persist(&self, tenant_id: &str, report: &AggregateReport) -> StoreResult<()>;

    /// Every report previously persisted for a tenant, oldest first.
    async fn fetch_existing(&self, tenant_id: &str) -> StoreResult<Vec<AggregateReport>>;
}

/// Build the configured store backend.
pub fn from_config(config: &StoreConfig) -> Arc<dyn ResultStore> {
    match config.backend {
        StoreBackend::Memory => Arc::new(MemoryResultStore::new()),
        StoreBackend::Local => Arc::new(LocalFsResultStore::new(&config.path)),
    }
}

#[derive(Default)]
pub struct MemoryResultStore {
    reports: DashMap<String, Vec<AggregateReport>>,
}

impl MemoryResultStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl ResultStore for MemoryResultStore {
    fn name(&self) -> &str {
        "memory"
    }

    async fn persist(&self, tenant_id: &str, report: &AggregateReport) -> StoreResult<()> {
        self.reports
            .entry(tenant_id.to_string())
            .or_default()
            .push(report.clone());
        Ok(())
    }

    async fn fetch_existing(&self, tenant_id: &str) -> StoreResult<Vec<AggregateReport>> {
        Ok(self
            .reports
            .get(tenant_id)
            .map(|r| r.clone())
            .unwrap_or_default())
    }
}

/// Local filesystem store, one JSON file per job at `<base>/<tenant>/<job_id>.json`.
pub struct LocalFsResultStore {
    base_dir: PathBuf,
}

impl LocalFsResultStore {
    pub fn new(base_dir: impl AsRef<Path>) -> Self {
        Self {
            base_dir: base_dir.as_ref().to_path_buf(),
        }
    }

    /// One directory per tenant. ASCII alphanumerics and `-` pass through, every
    /// other byte becomes `_XX` (uppercase hex), so distinct tenants never share
    /// a directory. The empty tenant maps to `_`.
    fn tenant_dir(&self, tenant_id: &str) -> PathBuf {
        let mut name = String::with_capacity(tenant_id.len());
        for b in tenant_id.bytes() {
            if b.is_ascii_alphanumeric() || b == b'-' {
                name.push(b as char);
            } else {
                name.push_str(&format!("_{:02X}", b));
            }
        }
        if name.is_empty() {
            name.push('_');
        }
        self.base_dir.join(name)
    }
}

#[async_trait::async_trait]
impl ResultStore for LocalFsResultStore {
    fn name(&self) -> &str {
        "local"
    }

    async fn persist(&self, tenant_id: &str, report: &AggregateReport) -> StoreResult<()> {
        let dir = self.tenant_dir(tenant_id);
        tokio::fs::create_dir_all(&dir).await?;
        let path = dir.join(format!("{}.json", report.job_id));
        let body = serde_json::to_vec_pretty(report)?;
        tokio::fs::write(&path, &body).await?;
        tracing::debug!("wrote {} ({} bytes)", path.display(), body.len());
        Ok(())
    }

    async fn fetch_existing(&self, tenant_id: &str) -> StoreResult<Vec<AggregateReport>> {
        let dir = self.tenant_dir(tenant_id);
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut reports = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let bytes = tokio::fs::read(&path).await?;
            match serde_json::from_slice::<AggregateReport>(&bytes) {
                Ok(report) => reports.push(report),
                Err(e) => tracing::warn!("skipping unreadable report {}: {}", path.display(), e),
            }
        }
        reports.sort_by_key(|r| r.generated_at);
        Ok(reports)
    }
}
