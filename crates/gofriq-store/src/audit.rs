//! Append-only audit trail.
//!
//! One JSONL file per event category under `<base>/audit/`. Every record
//! carries a UTC timestamp, the event type, the acting groups, the entity
//! ids involved and a payload summary. Records are never rewritten.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;

use gofriq::{Error, Result};

/// One audit record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub timestamp: DateTime<Utc>,
    pub event_type: String,
    pub actor_groups: Vec<String>,
    #[serde(default)]
    pub entity_guid: Option<Uuid>,
    #[serde(default)]
    pub payload: Value,
}

/// Append-only JSONL audit log.
#[derive(Debug, Clone)]
pub struct AuditLog {
    audit_path: PathBuf,
}

impl AuditLog {
    /// Open (and create if needed) the audit directory under `base_path`.
    pub fn new(base_path: impl AsRef<Path>) -> Result<Self> {
        let audit_path = base_path.as_ref().join("audit");
        fs::create_dir_all(&audit_path)
            .map_err(|e| Error::store(format!("failed to create audit dir: {e}")))?;
        Ok(Self { audit_path })
    }

    fn append(&self, category: &str, record: &AuditRecord) -> Result<()> {
        let line = serde_json::to_string(record)
            .map_err(|e| Error::store(format!("failed to serialize audit record: {e}")))?;
        let path = self.audit_path.join(format!("{category}.jsonl"));
        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| Error::store(format!("failed to open {}: {e}", path.display())))?;
        writeln!(file, "{line}")
            .map_err(|e| Error::store(format!("failed to append {}: {e}", path.display())))
    }

    fn record(
        &self,
        category: &str,
        event_type: &str,
        actor_groups: &[String],
        entity_guid: Option<Uuid>,
        payload: Value,
    ) -> Result<()> {
        self.append(
            category,
            &AuditRecord {
                timestamp: Utc::now(),
                event_type: event_type.to_string(),
                actor_groups: actor_groups.to_vec(),
                entity_guid,
                payload,
            },
        )
    }

    /// Record a completed (or duplicate/failed) ingest.
    pub fn log_document_ingest(
        &self,
        actor_groups: &[String],
        doc_guid: Uuid,
        source_guid: Uuid,
        status: &str,
    ) -> Result<()> {
        self.record(
            "ingest",
            "document_ingest",
            actor_groups,
            Some(doc_guid),
            json!({"source_guid": source_guid, "status": status}),
        )
    }

    /// Record a query with its result count.
    pub fn log_document_query(
        &self,
        actor_groups: &[String],
        query: &str,
        result_count: usize,
    ) -> Result<()> {
        // Truncated: queries can be long and the log is a summary.
        let summary: String = query.chars().take(200).collect();
        self.record(
            "query",
            "document_query",
            actor_groups,
            None,
            json!({"query": summary, "result_count": result_count}),
        )
    }

    /// Record a single-document retrieval.
    pub fn log_document_retrieve(&self, actor_groups: &[String], doc_guid: Uuid) -> Result<()> {
        self.record("query", "document_retrieve", actor_groups, Some(doc_guid), Value::Null)
    }

    /// Record an admin hard-delete.
    pub fn log_document_delete(&self, actor_groups: &[String], doc_guid: Uuid) -> Result<()> {
        self.record("delete", "document_delete", actor_groups, Some(doc_guid), Value::Null)
    }

    /// Record a source creation.
    pub fn log_source_create(&self, actor_groups: &[String], source_guid: Uuid) -> Result<()> {
        self.record("source", "source_create", actor_groups, Some(source_guid), Value::Null)
    }

    /// Record a source update with the changed field names.
    pub fn log_source_update(
        &self,
        actor_groups: &[String],
        source_guid: Uuid,
        changed_fields: &[String],
    ) -> Result<()> {
        self.record(
            "source",
            "source_update",
            actor_groups,
            Some(source_guid),
            json!({"changed_fields": changed_fields}),
        )
    }

    /// Record a source soft delete.
    pub fn log_source_delete(&self, actor_groups: &[String], source_guid: Uuid) -> Result<()> {
        self.record("source", "source_delete", actor_groups, Some(source_guid), Value::Null)
    }

    /// Read every record of a category, oldest first. Used by tests and
    /// operational tooling.
    pub fn read_all(&self, category: &str) -> Result<Vec<AuditRecord>> {
        let path = self.audit_path.join(format!("{category}.jsonl"));
        if !path.exists() {
            return Ok(Vec::new());
        }
        let raw = fs::read_to_string(&path)
            .map_err(|e| Error::store(format!("failed to read {}: {e}", path.display())))?;
        raw.lines()
            .filter(|line| !line.trim().is_empty())
            .map(|line| {
                serde_json::from_str(line)
                    .map_err(|e| Error::store(format!("corrupt audit line: {e}")))
            })
            .collect()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn log() -> (TempDir, AuditLog) {
        let dir = TempDir::new().unwrap();
        let log = AuditLog::new(dir.path()).unwrap();
        (dir, log)
    }

    fn groups() -> Vec<String> {
        vec!["apac".to_string()]
    }

    #[test]
    fn test_ingest_record_roundtrip() {
        let (_dir, log) = log();
        let doc = Uuid::new_v4();
        let source = Uuid::new_v4();
        log.log_document_ingest(&groups(), doc, source, "success").unwrap();

        let records = log.read_all("ingest").unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].event_type, "document_ingest");
        assert_eq!(records[0].entity_guid, Some(doc));
        assert_eq!(records[0].payload["status"], "success");
    }

    #[test]
    fn test_records_append_in_order() {
        let (_dir, log) = log();
        for i in 0..3 {
            log.log_document_query(&groups(), &format!("query {i}"), i).unwrap();
        }
        let records = log.read_all("query").unwrap();
        assert_eq!(records.len(), 3);
        assert_eq!(records[0].payload["query"], "query 0");
        assert_eq!(records[2].payload["query"], "query 2");
    }

    #[test]
    fn test_long_query_truncated() {
        let (_dir, log) = log();
        let long = "q".repeat(500);
        log.log_document_query(&groups(), &long, 0).unwrap();
        let records = log.read_all("query").unwrap();
        assert_eq!(records[0].payload["query"].as_str().unwrap().len(), 200);
    }

    #[test]
    fn test_missing_category_is_empty() {
        let (_dir, log) = log();
        assert!(log.read_all("nope").unwrap().is_empty());
    }

    #[test]
    fn test_source_lifecycle_records() {
        let (_dir, log) = log();
        let source = Uuid::new_v4();
        log.log_source_create(&groups(), source).unwrap();
        log.log_source_update(&groups(), source, &["trust_level".to_string()]).unwrap();
        log.log_source_delete(&groups(), source).unwrap();

        let records = log.read_all("source").unwrap();
        assert_eq!(records.len(), 3);
        assert_eq!(records[1].payload["changed_fields"][0], "trust_level");
    }
}
