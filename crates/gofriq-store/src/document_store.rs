//! Canonical document file store.
//!
//! Layout: `<base>/documents/<group_guid>/<YYYY-MM-DD>/<doc_guid>.json`.
//!
//! Documents are written once and never mutated; the only destructive
//! operation is the admin hard-delete. A load with a date hint goes
//! straight to the dated directory; without one, the group's dated
//! subdirectories are scanned newest-first.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, NaiveDate, Utc};
use uuid::Uuid;

use gofriq::models::Document;
use gofriq::{Error, Result};

/// File-based document storage with group partitioning.
#[derive(Debug, Clone)]
pub struct DocumentStore {
    documents_path: PathBuf,
}

impl DocumentStore {
    /// Open (and create if needed) a store rooted at `base_path`.
    pub fn new(base_path: impl AsRef<Path>) -> Result<Self> {
        let documents_path = base_path.as_ref().join("documents");
        fs::create_dir_all(&documents_path)
            .map_err(|e| Error::store(format!("failed to create document store: {e}")))?;
        Ok(Self { documents_path })
    }

    fn group_path(&self, group_guid: Uuid) -> PathBuf {
        self.documents_path.join(group_guid.to_string())
    }

    fn document_path(&self, guid: Uuid, group_guid: Uuid, created_at: DateTime<Utc>) -> PathBuf {
        self.group_path(group_guid)
            .join(created_at.format("%Y-%m-%d").to_string())
            .join(format!("{guid}.json"))
    }

    fn load_from_path(path: &Path) -> Result<Document> {
        let raw = fs::read_to_string(path)
            .map_err(|e| Error::store(format!("failed to read {}: {e}", path.display())))?;
        serde_json::from_str(&raw)
            .map_err(|e| Error::store(format!("corrupt document file {}: {e}", path.display())))
    }

    /// Date directories of a group, newest first. Non-date entries are
    /// skipped.
    fn date_dirs_newest_first(&self, group_guid: Uuid) -> Vec<(NaiveDate, PathBuf)> {
        let group_path = self.group_path(group_guid);
        let Ok(entries) = fs::read_dir(&group_path) else {
            return Vec::new();
        };
        let mut dirs: Vec<(NaiveDate, PathBuf)> = entries
            .flatten()
            .filter(|e| e.path().is_dir())
            .filter_map(|e| {
                let name = e.file_name().to_string_lossy().to_string();
                NaiveDate::parse_from_str(&name, "%Y-%m-%d").ok().map(|d| (d, e.path()))
            })
            .collect();
        dirs.sort_by(|a, b| b.0.cmp(&a.0));
        dirs
    }

    /// Persist a document. The write is atomic per file (temp + rename).
    pub fn save(&self, document: &Document) -> Result<PathBuf> {
        let path = self.document_path(document.guid, document.group_guid, document.created_at);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| Error::store(format!("failed to create {}: {e}", parent.display())))?;
        }

        let data = serde_json::to_string_pretty(document)
            .map_err(|e| Error::store(format!("failed to serialize document: {e}")))?;

        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, data)
            .map_err(|e| Error::store(format!("failed to write {}: {e}", tmp.display())))?;
        fs::rename(&tmp, &path)
            .map_err(|e| Error::store(format!("failed to commit {}: {e}", path.display())))?;

        tracing::debug!(guid = %document.guid, group = %document.group_guid, "document saved");
        Ok(path)
    }

    /// Load a document from a specific group, optionally narrowed by a
    /// `YYYY-MM-DD` date hint.
    pub fn load(&self, guid: Uuid, group_guid: Uuid, date_hint: Option<&str>) -> Result<Document> {
        if let Some(date) = date_hint {
            let path = self.group_path(group_guid).join(date).join(format!("{guid}.json"));
            if path.exists() {
                return Self::load_from_path(&path);
            }
        }

        for (_, dir) in self.date_dirs_newest_first(group_guid) {
            let path = dir.join(format!("{guid}.json"));
            if path.exists() {
                return Self::load_from_path(&path);
            }
        }

        Err(Error::DocumentNotFound(format!("{guid} in group {group_guid}")))
    }

    /// Load a document the caller is entitled to see.
    ///
    /// Searches every permitted group first; if the document then turns out
    /// to exist in some other group, the caller gets `AccessDenied` rather
    /// than a misleading `DocumentNotFound`.
    pub fn load_with_access_check(
        &self,
        guid: Uuid,
        permitted_groups: &[Uuid],
        date_hint: Option<&str>,
    ) -> Result<Document> {
        for group in permitted_groups {
            match self.load(guid, *group, date_hint) {
                Ok(doc) => return Ok(doc),
                Err(Error::DocumentNotFound(_)) => continue,
                Err(e) => return Err(e),
            }
        }

        let permitted: HashSet<Uuid> = permitted_groups.iter().copied().collect();
        if let Some(owner) = self.find_owning_group(guid, &permitted)? {
            return Err(Error::AccessDenied(format!(
                "document {guid} belongs to group {owner}, not in permitted groups"
            )));
        }

        Err(Error::DocumentNotFound(guid.to_string()))
    }

    /// Scan non-permitted groups for the document, returning its owning
    /// group when found.
    fn find_owning_group(&self, guid: Uuid, permitted: &HashSet<Uuid>) -> Result<Option<Uuid>> {
        let Ok(groups) = fs::read_dir(&self.documents_path) else {
            return Ok(None);
        };
        for group_entry in groups.flatten() {
            let Ok(group_guid) =
                group_entry.file_name().to_string_lossy().parse::<Uuid>()
            else {
                continue;
            };
            if permitted.contains(&group_guid) {
                continue;
            }
            for (_, dir) in self.date_dirs_newest_first(group_guid) {
                if dir.join(format!("{guid}.json")).exists() {
                    return Ok(Some(group_guid));
                }
            }
        }
        Ok(None)
    }

    /// Whether the document exists in the given group.
    #[must_use]
    pub fn exists(&self, guid: Uuid, group_guid: Uuid) -> bool {
        self.load(guid, group_guid, None).is_ok()
    }

    /// List a group's documents, newest first, optionally narrowed to one
    /// date and capped at `limit`.
    pub fn list_by_group(
        &self,
        group_guid: Uuid,
        date: Option<&str>,
        limit: Option<usize>,
    ) -> Result<Vec<Document>> {
        let mut documents = Vec::new();

        for (dir_date, dir) in self.date_dirs_newest_first(group_guid) {
            if let Some(wanted) = date {
                if dir_date.format("%Y-%m-%d").to_string() != wanted {
                    continue;
                }
            }
            let Ok(entries) = fs::read_dir(&dir) else { continue };
            for entry in entries.flatten() {
                let path = entry.path();
                if path.extension().is_some_and(|ext| ext == "json") {
                    documents.push(Self::load_from_path(&path)?);
                }
            }
        }

        documents.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        if let Some(limit) = limit {
            documents.truncate(limit);
        }
        Ok(documents)
    }

    /// List a group's documents within an inclusive date range.
    pub fn list_by_date_range(
        &self,
        group_guid: Uuid,
        from: NaiveDate,
        to: NaiveDate,
        limit: Option<usize>,
    ) -> Result<Vec<Document>> {
        if from > to {
            return Err(Error::validation("from must be before to"));
        }
        let mut documents = Vec::new();
        for (dir_date, dir) in self.date_dirs_newest_first(group_guid) {
            if dir_date < from || dir_date > to {
                continue;
            }
            let Ok(entries) = fs::read_dir(&dir) else { continue };
            for entry in entries.flatten() {
                let path = entry.path();
                if path.extension().is_some_and(|ext| ext == "json") {
                    documents.push(Self::load_from_path(&path)?);
                }
            }
        }
        documents.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        if let Some(limit) = limit {
            documents.truncate(limit);
        }
        Ok(documents)
    }

    /// Merge listings across every permitted group, newest first.
    pub fn list_by_permitted_groups(
        &self,
        permitted_groups: &[Uuid],
        date: Option<&str>,
        limit: Option<usize>,
    ) -> Result<Vec<Document>> {
        let mut documents = Vec::new();
        for group in permitted_groups {
            documents.extend(self.list_by_group(*group, date, None)?);
        }
        documents.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        if let Some(limit) = limit {
            documents.truncate(limit);
        }
        Ok(documents)
    }

    /// Walk `previous_version_guid` links backward and return the chain
    /// oldest-first, ending with the requested document.
    pub fn get_version_chain(&self, guid: Uuid, group_guid: Uuid) -> Result<Vec<Document>> {
        let mut chain = Vec::new();
        let mut seen: HashSet<Uuid> = HashSet::new();
        let mut current = Some(guid);

        while let Some(current_guid) = current {
            if !seen.insert(current_guid) {
                return Err(Error::store(format!(
                    "version chain of {guid} contains a cycle at {current_guid}"
                )));
            }
            let doc = self.load(current_guid, group_guid, None)?;
            current = doc.previous_version_guid;
            chain.push(doc);
        }

        chain.reverse();
        Ok(chain)
    }

    /// Resolve the latest version visible from `guid`.
    ///
    /// Version links only point backward, so without a forward index the
    /// requested record IS the newest version reachable from it; callers
    /// holding a stale guid get that record back unchanged.
    pub fn get_latest_version(&self, guid: Uuid, group_guid: Uuid) -> Result<Document> {
        self.load(guid, group_guid, None)
    }

    /// Hard-delete a document file. Admin-only at the tool surface.
    pub fn delete(&self, guid: Uuid, group_guid: Uuid) -> Result<()> {
        for (_, dir) in self.date_dirs_newest_first(group_guid) {
            let path = dir.join(format!("{guid}.json"));
            if path.exists() {
                fs::remove_file(&path)
                    .map_err(|e| Error::store(format!("failed to delete {}: {e}", path.display())))?;
                tracing::info!(%guid, group = %group_guid, "document deleted");
                return Ok(());
            }
        }
        Err(Error::DocumentNotFound(format!("{guid} in group {group_guid}")))
    }

    /// Count a group's documents.
    pub fn count(&self, group_guid: Uuid) -> Result<usize> {
        Ok(self.list_by_group(group_guid, None, None)?.len())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::TempDir;

    fn store() -> (TempDir, DocumentStore) {
        let dir = TempDir::new().unwrap();
        let store = DocumentStore::new(dir.path()).unwrap();
        (dir, store)
    }

    fn doc(group: Uuid, title: &str) -> Document {
        Document::builder(title, "Body of the story.", Uuid::new_v4(), group)
            .build()
            .unwrap()
    }

    #[test]
    fn test_save_load_roundtrip() {
        let (_dir, store) = store();
        let group = Uuid::new_v4();
        let original = doc(group, "Fed Raises Rates");
        store.save(&original).unwrap();

        let loaded = store.load(original.guid, group, None).unwrap();
        assert_eq!(loaded, original);
    }

    #[test]
    fn test_load_with_date_hint() {
        let (_dir, store) = store();
        let group = Uuid::new_v4();
        let original = doc(group, "Hinted");
        store.save(&original).unwrap();

        let hint = original.created_at.format("%Y-%m-%d").to_string();
        let loaded = store.load(original.guid, group, Some(&hint)).unwrap();
        assert_eq!(loaded.guid, original.guid);

        // A wrong hint still finds the document via the scan.
        let loaded = store.load(original.guid, group, Some("1999-01-01")).unwrap();
        assert_eq!(loaded.guid, original.guid);
    }

    #[test]
    fn test_load_missing_is_not_found() {
        let (_dir, store) = store();
        let err = store.load(Uuid::new_v4(), Uuid::new_v4(), None).unwrap_err();
        assert!(matches!(err, Error::DocumentNotFound(_)));
    }

    #[test]
    fn test_access_check_denies_cross_group() {
        let (_dir, store) = store();
        let alpha = Uuid::new_v4();
        let beta = Uuid::new_v4();
        let document = doc(alpha, "Alpha Only");
        store.save(&document).unwrap();

        // Permitted for beta only: the document exists in alpha, so the
        // caller learns it is entitled-denied rather than missing.
        let err = store.load_with_access_check(document.guid, &[beta], None).unwrap_err();
        assert!(matches!(err, Error::AccessDenied(_)));

        let ok = store.load_with_access_check(document.guid, &[beta, alpha], None).unwrap();
        assert_eq!(ok.guid, document.guid);
    }

    #[test]
    fn test_access_check_missing_is_not_found() {
        let (_dir, store) = store();
        let err = store
            .load_with_access_check(Uuid::new_v4(), &[Uuid::new_v4()], None)
            .unwrap_err();
        assert!(matches!(err, Error::DocumentNotFound(_)));
    }

    #[test]
    fn test_list_by_group_newest_first() {
        let (_dir, store) = store();
        let group = Uuid::new_v4();
        let t0 = Utc.with_ymd_and_hms(2026, 7, 1, 9, 0, 0).unwrap();

        for (i, title) in ["oldest", "middle", "newest"].iter().enumerate() {
            let d = Document::builder(*title, "body", Uuid::new_v4(), group)
                .with_created_at(t0 + chrono::Duration::days(i as i64))
                .build()
                .unwrap();
            store.save(&d).unwrap();
        }

        let listed = store.list_by_group(group, None, None).unwrap();
        assert_eq!(listed.len(), 3);
        assert_eq!(listed[0].title, "newest");
        assert_eq!(listed[2].title, "oldest");

        let limited = store.list_by_group(group, None, Some(2)).unwrap();
        assert_eq!(limited.len(), 2);
    }

    #[test]
    fn test_list_by_date_range() {
        let (_dir, store) = store();
        let group = Uuid::new_v4();
        let t0 = Utc.with_ymd_and_hms(2026, 7, 1, 9, 0, 0).unwrap();

        for i in 0..5 {
            let d = Document::builder(format!("doc {i}"), "body", Uuid::new_v4(), group)
                .with_created_at(t0 + chrono::Duration::days(i))
                .build()
                .unwrap();
            store.save(&d).unwrap();
        }

        let from = NaiveDate::from_ymd_opt(2026, 7, 2).unwrap();
        let to = NaiveDate::from_ymd_opt(2026, 7, 4).unwrap();
        let ranged = store.list_by_date_range(group, from, to, None).unwrap();
        assert_eq!(ranged.len(), 3);

        assert!(store.list_by_date_range(group, to, from, None).is_err());
    }

    #[test]
    fn test_list_by_permitted_groups_merges() {
        let (_dir, store) = store();
        let alpha = Uuid::new_v4();
        let beta = Uuid::new_v4();
        store.save(&doc(alpha, "A")).unwrap();
        store.save(&doc(beta, "B")).unwrap();

        let merged = store.list_by_permitted_groups(&[alpha, beta], None, None).unwrap();
        assert_eq!(merged.len(), 2);
    }

    #[test]
    fn test_version_chain_oldest_first() {
        let (_dir, store) = store();
        let group = Uuid::new_v4();
        let v1 = doc(group, "v1");
        let v2 = v1.create_new_version(None, Some("updated".into()), None).unwrap();
        let v3 = v2.create_new_version(None, Some("updated again".into()), None).unwrap();
        store.save(&v1).unwrap();
        store.save(&v2).unwrap();
        store.save(&v3).unwrap();

        let chain = store.get_version_chain(v3.guid, group).unwrap();
        assert_eq!(chain.len(), 3);
        assert_eq!(chain[0].guid, v1.guid);
        assert_eq!(chain[1].guid, v2.guid);
        assert_eq!(chain[2].guid, v3.guid);
        assert_eq!(chain[0].version, 1);
    }

    #[test]
    fn test_delete_removes_file() {
        let (_dir, store) = store();
        let group = Uuid::new_v4();
        let document = doc(group, "Doomed");
        store.save(&document).unwrap();
        assert!(store.exists(document.guid, group));

        store.delete(document.guid, group).unwrap();
        assert!(!store.exists(document.guid, group));

        let err = store.delete(document.guid, group).unwrap_err();
        assert!(matches!(err, Error::DocumentNotFound(_)));
    }

    #[test]
    fn test_count() {
        let (_dir, store) = store();
        let group = Uuid::new_v4();
        assert_eq!(store.count(group).unwrap(), 0);
        store.save(&doc(group, "one")).unwrap();
        store.save(&doc(group, "two")).unwrap();
        assert_eq!(store.count(group).unwrap(), 2);
    }
}
