//! News-source registry.
//!
//! Layout:
//!
//! - `<base>/sources/<group_guid>/<source_guid>.json` — the source record
//! - `<base>/audit/sources/<source_guid>.jsonl` — one JSON line per
//!   mutation with a field-level diff and the acting groups
//!
//! Soft delete flips `active` and preserves history. When a graph mirror
//! is attached, every mutation is reflected into the graph in the same
//! call.

use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;

use gofriq::models::{Source, SourceType, TrustLevel};
use gofriq::{Error, Result};

/// Projection of source records into an attached graph. Implemented by the
/// graph backends; mutations are mirrored best-effort in the same call.
#[async_trait]
pub trait SourceMirror: Send + Sync {
    /// Upsert the source node (including its `active` flag) and its
    /// IN_GROUP link.
    async fn mirror_source(&self, source: &Source) -> Result<()>;
}

/// One audit line for a source mutation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceAuditEntry {
    pub timestamp: DateTime<Utc>,
    pub action: String,
    /// Field name → { old, new }.
    pub changes: BTreeMap<String, Value>,
    pub actor_groups: Vec<String>,
}

/// Partial update applied by [`SourceRegistry::update`].
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SourceUpdate {
    pub name: Option<String>,
    pub source_type: Option<SourceType>,
    pub region: Option<String>,
    pub languages: Option<Vec<String>>,
    pub trust_level: Option<TrustLevel>,
    pub metadata: Option<BTreeMap<String, Value>>,
}

impl SourceUpdate {
    fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.source_type.is_none()
            && self.region.is_none()
            && self.languages.is_none()
            && self.trust_level.is_none()
            && self.metadata.is_none()
    }
}

/// File-backed source registry with audit trail and graph mirroring.
pub struct SourceRegistry {
    sources_path: PathBuf,
    audit_path: PathBuf,
    mirror: Option<Arc<dyn SourceMirror>>,
}

impl SourceRegistry {
    /// Open (and create if needed) a registry rooted at `base_path`.
    pub fn new(base_path: impl AsRef<Path>) -> Result<Self> {
        let sources_path = base_path.as_ref().join("sources");
        let audit_path = base_path.as_ref().join("audit").join("sources");
        fs::create_dir_all(&sources_path)
            .map_err(|e| Error::store(format!("failed to create source registry: {e}")))?;
        fs::create_dir_all(&audit_path)
            .map_err(|e| Error::store(format!("failed to create source audit dir: {e}")))?;
        Ok(Self { sources_path, audit_path, mirror: None })
    }

    /// Attach a graph mirror. Every subsequent mutation is projected into
    /// the graph in the same call.
    #[must_use]
    pub fn with_mirror(mut self, mirror: Arc<dyn SourceMirror>) -> Self {
        self.mirror = Some(mirror);
        self
    }

    fn source_path(&self, group_guid: Uuid, source_guid: Uuid) -> PathBuf {
        self.sources_path.join(group_guid.to_string()).join(format!("{source_guid}.json"))
    }

    fn write_source(&self, source: &Source) -> Result<()> {
        let path = self.source_path(source.group_guid, source.source_guid);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| Error::store(format!("failed to create {}: {e}", parent.display())))?;
        }
        let data = serde_json::to_string_pretty(source)
            .map_err(|e| Error::store(format!("failed to serialize source: {e}")))?;
        fs::write(&path, data)
            .map_err(|e| Error::store(format!("failed to write {}: {e}", path.display())))
    }

    fn append_audit(
        &self,
        source_guid: Uuid,
        action: &str,
        changes: BTreeMap<String, Value>,
        actor_groups: &[String],
    ) -> Result<()> {
        let entry = SourceAuditEntry {
            timestamp: Utc::now(),
            action: action.to_string(),
            changes,
            actor_groups: actor_groups.to_vec(),
        };
        let line = serde_json::to_string(&entry)
            .map_err(|e| Error::store(format!("failed to serialize audit entry: {e}")))?;

        let path = self.audit_path.join(format!("{source_guid}.jsonl"));
        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| Error::store(format!("failed to open {}: {e}", path.display())))?;
        writeln!(file, "{line}")
            .map_err(|e| Error::store(format!("failed to append {}: {e}", path.display())))
    }

    async fn mirror(&self, source: &Source) {
        if let Some(mirror) = &self.mirror {
            if let Err(e) = mirror.mirror_source(source).await {
                // The registry file is authoritative; a failed mirror only
                // degrades graph-side source metadata.
                tracing::warn!(source = %source.source_guid, error = %e, "source mirror failed");
            }
        }
    }

    /// Register a new source.
    pub async fn create(&self, source: Source, actor_groups: &[String]) -> Result<Source> {
        self.write_source(&source)?;
        let mut changes = BTreeMap::new();
        changes.insert(
            "source".to_string(),
            json!({
                "old": Value::Null,
                "new": serde_json::to_value(&source)
                    .map_err(|e| Error::store(format!("audit serialize: {e}")))?,
            }),
        );
        self.append_audit(source.source_guid, "create", changes, actor_groups)?;
        self.mirror(&source).await;
        tracing::info!(source = %source.source_guid, name = %source.name, "source created");
        Ok(source)
    }

    /// Load a source by guid, searching every group directory. When
    /// `access_groups` is given, a source outside those groups surfaces
    /// `AccessDenied`.
    pub fn get(&self, source_guid: Uuid, access_groups: Option<&[Uuid]>) -> Result<Source> {
        let Ok(groups) = fs::read_dir(&self.sources_path) else {
            return Err(Error::SourceNotFound(source_guid.to_string()));
        };
        for group_entry in groups.flatten() {
            let path = group_entry.path().join(format!("{source_guid}.json"));
            if !path.exists() {
                continue;
            }
            let raw = fs::read_to_string(&path)
                .map_err(|e| Error::store(format!("failed to read {}: {e}", path.display())))?;
            let source: Source = serde_json::from_str(&raw)
                .map_err(|e| Error::store(format!("corrupt source file {}: {e}", path.display())))?;
            if let Some(permitted) = access_groups {
                if !permitted.contains(&source.group_guid) {
                    return Err(Error::AccessDenied(format!(
                        "source {source_guid} belongs to group {}",
                        source.group_guid
                    )));
                }
            }
            return Ok(source);
        }
        Err(Error::SourceNotFound(source_guid.to_string()))
    }

    /// List sources, optionally filtered by group, region and type.
    /// Inactive sources are excluded unless `include_inactive` is set.
    pub fn list_sources(
        &self,
        group: Option<Uuid>,
        region: Option<&str>,
        source_type: Option<SourceType>,
        include_inactive: bool,
    ) -> Result<Vec<Source>> {
        let mut sources = Vec::new();
        let Ok(groups) = fs::read_dir(&self.sources_path) else {
            return Ok(sources);
        };
        for group_entry in groups.flatten() {
            if let Some(wanted) = group {
                if group_entry.file_name().to_string_lossy() != wanted.to_string() {
                    continue;
                }
            }
            let Ok(entries) = fs::read_dir(group_entry.path()) else { continue };
            for entry in entries.flatten() {
                let path = entry.path();
                if !path.extension().is_some_and(|ext| ext == "json") {
                    continue;
                }
                let raw = fs::read_to_string(&path)
                    .map_err(|e| Error::store(format!("failed to read {}: {e}", path.display())))?;
                let source: Source = serde_json::from_str(&raw).map_err(|e| {
                    Error::store(format!("corrupt source file {}: {e}", path.display()))
                })?;

                if !include_inactive && !source.active {
                    continue;
                }
                if let Some(wanted) = region {
                    if source.region.as_deref() != Some(wanted) {
                        continue;
                    }
                }
                if let Some(wanted) = source_type {
                    if source.source_type != wanted {
                        continue;
                    }
                }
                sources.push(source);
            }
        }
        sources.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(sources)
    }

    /// Apply a partial update, auditing the field-level diff.
    pub async fn update(
        &self,
        source_guid: Uuid,
        update: SourceUpdate,
        actor_groups: &[String],
        access_groups: Option<&[Uuid]>,
    ) -> Result<Source> {
        if update.is_empty() {
            return Err(Error::validation("update must change at least one field"));
        }
        let mut source = self.get(source_guid, access_groups)?;
        let mut changes = BTreeMap::new();

        fn diff<T: Serialize + PartialEq + Clone>(
            changes: &mut BTreeMap<String, Value>,
            field: &str,
            current: &mut T,
            new: Option<T>,
        ) {
            if let Some(new_value) = new {
                if *current != new_value {
                    changes.insert(
                        field.to_string(),
                        json!({
                            "old": serde_json::to_value(&*current).unwrap_or(Value::Null),
                            "new": serde_json::to_value(&new_value).unwrap_or(Value::Null),
                        }),
                    );
                    *current = new_value;
                }
            }
        }

        diff(&mut changes, "name", &mut source.name, update.name);
        diff(&mut changes, "type", &mut source.source_type, update.source_type);
        diff(&mut changes, "region", &mut source.region, update.region.map(Some));
        diff(
            &mut changes,
            "languages",
            &mut source.languages,
            update.languages.map(|ls| ls.into_iter().map(|l| l.trim().to_lowercase()).collect()),
        );
        diff(&mut changes, "trust_level", &mut source.trust_level, update.trust_level);
        diff(&mut changes, "metadata", &mut source.metadata, update.metadata);

        if changes.is_empty() {
            return Ok(source);
        }

        source.updated_at = Utc::now();
        self.write_source(&source)?;
        self.append_audit(source_guid, "update", changes, actor_groups)?;
        self.mirror(&source).await;
        Ok(source)
    }

    /// Soft-delete: flip `active` to false, keep the record and history.
    pub async fn soft_delete(
        &self,
        source_guid: Uuid,
        actor_groups: &[String],
        access_groups: Option<&[Uuid]>,
    ) -> Result<Source> {
        let mut source = self.get(source_guid, access_groups)?;
        if !source.active {
            return Ok(source);
        }
        source.deactivate();
        self.write_source(&source)?;

        let mut changes = BTreeMap::new();
        changes.insert("active".to_string(), json!({"old": true, "new": false}));
        self.append_audit(source_guid, "delete", changes, actor_groups)?;
        self.mirror(&source).await;
        tracing::info!(source = %source_guid, "source soft-deleted");
        Ok(source)
    }

    /// Read the source's audit trail, newest first.
    pub fn get_audit_log(&self, source_guid: Uuid) -> Result<Vec<SourceAuditEntry>> {
        let path = self.audit_path.join(format!("{source_guid}.jsonl"));
        if !path.exists() {
            return Ok(Vec::new());
        }
        let raw = fs::read_to_string(&path)
            .map_err(|e| Error::store(format!("failed to read {}: {e}", path.display())))?;
        let mut entries: Vec<SourceAuditEntry> = raw
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(|line| {
                serde_json::from_str(line)
                    .map_err(|e| Error::store(format!("corrupt audit line: {e}")))
            })
            .collect::<Result<_>>()?;
        entries.reverse();
        Ok(entries)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn registry() -> (TempDir, SourceRegistry) {
        let dir = TempDir::new().unwrap();
        let registry = SourceRegistry::new(dir.path()).unwrap();
        (dir, registry)
    }

    fn actor() -> Vec<String> {
        vec!["apac".to_string()]
    }

    fn sample(group: Uuid) -> Source {
        Source::new(group, "Reuters APAC", SourceType::NewsAgency, TrustLevel::High).unwrap()
    }

    #[tokio::test]
    async fn test_create_and_get() {
        let (_dir, registry) = registry();
        let group = Uuid::new_v4();
        let source = registry.create(sample(group), &actor()).await.unwrap();

        let loaded = registry.get(source.source_guid, None).unwrap();
        assert_eq!(loaded, source);
    }

    #[tokio::test]
    async fn test_get_cross_group_denied() {
        let (_dir, registry) = registry();
        let group = Uuid::new_v4();
        let other = Uuid::new_v4();
        let source = registry.create(sample(group), &actor()).await.unwrap();

        let err = registry.get(source.source_guid, Some(&[other])).unwrap_err();
        assert!(matches!(err, Error::AccessDenied(_)));

        let ok = registry.get(source.source_guid, Some(&[group])).unwrap();
        assert_eq!(ok.source_guid, source.source_guid);
    }

    #[tokio::test]
    async fn test_missing_source_not_found() {
        let (_dir, registry) = registry();
        let err = registry.get(Uuid::new_v4(), None).unwrap_err();
        assert!(matches!(err, Error::SourceNotFound(_)));
    }

    #[tokio::test]
    async fn test_update_audits_field_diff() {
        let (_dir, registry) = registry();
        let group = Uuid::new_v4();
        let source = registry.create(sample(group), &actor()).await.unwrap();

        let update = SourceUpdate {
            trust_level: Some(TrustLevel::Medium),
            region: Some("APAC".to_string()),
            ..SourceUpdate::default()
        };
        let updated = registry.update(source.source_guid, update, &actor(), None).await.unwrap();
        assert_eq!(updated.trust_level, TrustLevel::Medium);
        assert_eq!(updated.region.as_deref(), Some("APAC"));

        let log = registry.get_audit_log(source.source_guid).unwrap();
        // Newest first: the update precedes the create.
        assert_eq!(log.len(), 2);
        assert_eq!(log[0].action, "update");
        assert_eq!(log[1].action, "create");
        let trust_change = log[0].changes.get("trust_level").unwrap();
        assert_eq!(trust_change["old"], json!("high"));
        assert_eq!(trust_change["new"], json!("medium"));
        assert_eq!(log[0].actor_groups, vec!["apac".to_string()]);
    }

    #[tokio::test]
    async fn test_empty_update_rejected() {
        let (_dir, registry) = registry();
        let group = Uuid::new_v4();
        let source = registry.create(sample(group), &actor()).await.unwrap();
        let err = registry
            .update(source.source_guid, SourceUpdate::default(), &actor(), None)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[tokio::test]
    async fn test_soft_delete_preserves_record() {
        let (_dir, registry) = registry();
        let group = Uuid::new_v4();
        let source = registry.create(sample(group), &actor()).await.unwrap();

        let deleted = registry.soft_delete(source.source_guid, &actor(), None).await.unwrap();
        assert!(!deleted.active);

        // Record still loads; default listing hides it.
        let loaded = registry.get(source.source_guid, None).unwrap();
        assert!(!loaded.active);
        assert!(registry.list_sources(Some(group), None, None, false).unwrap().is_empty());
        assert_eq!(registry.list_sources(Some(group), None, None, true).unwrap().len(), 1);

        let log = registry.get_audit_log(source.source_guid).unwrap();
        assert_eq!(log[0].action, "delete");
    }

    #[tokio::test]
    async fn test_list_filters() {
        let (_dir, registry) = registry();
        let group = Uuid::new_v4();
        let mut agency = sample(group);
        agency.region = Some("APAC".to_string());
        registry.create(agency, &actor()).await.unwrap();

        let research =
            Source::new(group, "Desk Research", SourceType::Research, TrustLevel::Medium).unwrap();
        registry.create(research, &actor()).await.unwrap();

        let all = registry.list_sources(Some(group), None, None, false).unwrap();
        assert_eq!(all.len(), 2);

        let agencies = registry
            .list_sources(Some(group), None, Some(SourceType::NewsAgency), false)
            .unwrap();
        assert_eq!(agencies.len(), 1);
        assert_eq!(agencies[0].name, "Reuters APAC");

        let apac = registry.list_sources(Some(group), Some("APAC"), None, false).unwrap();
        assert_eq!(apac.len(), 1);
    }

    #[tokio::test]
    async fn test_mirror_invoked_on_mutations() {
        use std::sync::atomic::{AtomicUsize, Ordering};

        struct CountingMirror(AtomicUsize);

        #[async_trait]
        impl SourceMirror for CountingMirror {
            async fn mirror_source(&self, _source: &Source) -> Result<()> {
                self.0.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        }

        let dir = TempDir::new().unwrap();
        let mirror = Arc::new(CountingMirror(AtomicUsize::new(0)));
        let registry =
            SourceRegistry::new(dir.path()).unwrap().with_mirror(mirror.clone());

        let group = Uuid::new_v4();
        let source = registry.create(sample(group), &actor()).await.unwrap();
        registry
            .update(
                source.source_guid,
                SourceUpdate { trust_level: Some(TrustLevel::Low), ..SourceUpdate::default() },
                &actor(),
                None,
            )
            .await
            .unwrap();
        registry.soft_delete(source.source_guid, &actor(), None).await.unwrap();

        assert_eq!(mirror.0.load(Ordering::SeqCst), 3);
    }
}
