// Payload Store - Named payloads in the kv_store table
// One namespace per kind (projects, loop drafts); every read and write copies the data

use rusqlite::{params, OptionalExtension};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::marker::PhantomData;

use crate::project::Project;

use super::db::{DbConnection, DbResult};
use super::payload::{create_stored_payload, parse_stored_payload, LoopDraft, StoredPayload};

pub const PROJECTS_NAMESPACE: &str = "projects";
pub const LOOP_DRAFTS_NAMESPACE: &str = "loop_drafts";

/// Listing entry for a stored payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredEntry {
    pub name: String,
    pub updated_at: String,
}

/// Typed view over one namespace of the key-value table
pub struct PayloadStore<T> {
    db: DbConnection,
    namespace: &'static str,
    _data: PhantomData<fn() -> T>,
}

pub type ProjectStore = PayloadStore<Project>;
pub type LoopDraftStore = PayloadStore<LoopDraft>;

impl PayloadStore<Project> {
    pub fn projects(db: DbConnection) -> Self {
        PayloadStore::new(db, PROJECTS_NAMESPACE)
    }
}

impl PayloadStore<LoopDraft> {
    pub fn loop_drafts(db: DbConnection) -> Self {
        PayloadStore::new(db, LOOP_DRAFTS_NAMESPACE)
    }
}

impl<T: Serialize + DeserializeOwned + Clone> PayloadStore<T> {
    pub fn new(db: DbConnection, namespace: &'static str) -> Self {
        PayloadStore {
            db,
            namespace,
            _data: PhantomData,
        }
    }

    pub fn namespace(&self) -> &str {
        self.namespace
    }

    /// Save a copy of `data` under `name`, replacing any previous payload
    pub fn save(&self, name: &str, data: &T) -> DbResult<StoredPayload<T>> {
        let payload = create_stored_payload(data);
        let json = serde_json::to_string(&payload)?;

        let conn = self.db.lock();
        conn.execute(
            "INSERT INTO kv_store (namespace, key, value, updated_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(namespace, key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
            params![self.namespace, name, json, payload.updated_at.to_rfc3339()],
        )?;

        log::debug!("Saved {}/{}", self.namespace, name);
        Ok(payload)
    }

    /// Load the payload stored under `name`
    ///
    /// Missing and malformed entries both come back as `None`.
    pub fn load_payload(&self, name: &str) -> DbResult<Option<StoredPayload<T>>> {
        let conn = self.db.lock();
        let json: Option<String> = conn
            .query_row(
                "SELECT value FROM kv_store WHERE namespace = ?1 AND key = ?2",
                params![self.namespace, name],
                |row| row.get(0),
            )
            .optional()?;

        Ok(json.and_then(|json| parse_stored_payload(&json)))
    }

    pub fn load(&self, name: &str) -> DbResult<Option<T>> {
        Ok(self.load_payload(name)?.map(|payload| payload.data))
    }

    /// Delete `name`; returns whether anything was removed
    pub fn delete(&self, name: &str) -> DbResult<bool> {
        let conn = self.db.lock();
        let removed = conn.execute(
            "DELETE FROM kv_store WHERE namespace = ?1 AND key = ?2",
            params![self.namespace, name],
        )?;
        Ok(removed > 0)
    }

    /// Every stored name, most recently updated first
    pub fn list(&self) -> DbResult<Vec<StoredEntry>> {
        let conn = self.db.lock();
        let mut stmt = conn.prepare(
            "SELECT key, updated_at FROM kv_store WHERE namespace = ?1 ORDER BY updated_at DESC, key",
        )?;

        let entries = stmt
            .query_map([self.namespace], |row| {
                Ok(StoredEntry {
                    name: row.get(0)?,
                    updated_at: row.get(1)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(entries)
    }
}

// ==================== PROJECT SHORTCUTS ====================

pub fn save_project(db: &DbConnection, name: &str, project: &Project) -> DbResult<StoredPayload<Project>> {
    ProjectStore::projects(db.clone()).save(name, project)
}

pub fn load_project(db: &DbConnection, name: &str) -> DbResult<Option<Project>> {
    ProjectStore::projects(db.clone()).load(name)
}

pub fn delete_project(db: &DbConnection, name: &str) -> DbResult<bool> {
    ProjectStore::projects(db.clone()).delete(name)
}

pub fn list_projects(db: &DbConnection) -> DbResult<Vec<StoredEntry>> {
    ProjectStore::projects(db.clone()).list()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::project::{Chunk, SoundSource, Track};
    use crate::state::db::open_in_memory;

    fn project(name: &str) -> Project {
        let mut project = Project::new(name, 100.0);
        project.tracks.push(Track::new(
            "Kick",
            SoundSource::new("core", "kick"),
            Chunk::with_steps("kick", vec![true, false]),
        ));
        project
    }

    #[test]
    fn test_save_load_delete() {
        let db = open_in_memory().unwrap();
        let original = project("Song");
        save_project(&db, "song", &original).unwrap();

        assert_eq!(load_project(&db, "song").unwrap(), Some(original));
        assert_eq!(load_project(&db, "other").unwrap(), None);

        assert!(delete_project(&db, "song").unwrap());
        assert!(!delete_project(&db, "song").unwrap());
        assert_eq!(load_project(&db, "song").unwrap(), None);
    }

    #[test]
    fn test_load_keeps_step_arrays_as_saved() {
        let db = open_in_memory().unwrap();
        let mut original = project("Ragged");
        original.tracks[0].chunk.velocities = Some(vec![0.25, 0.5, 0.75]);
        save_project(&db, "ragged", &original).unwrap();

        let loaded = load_project(&db, "ragged").unwrap().unwrap();
        assert_eq!(loaded.tracks[0].chunk.velocities, Some(vec![0.25, 0.5, 0.75]));
        assert_eq!(loaded, original);
    }

    #[test]
    fn test_save_overwrites() {
        let db = open_in_memory().unwrap();
        save_project(&db, "song", &project("First")).unwrap();
        save_project(&db, "song", &project("Second")).unwrap();

        assert_eq!(list_projects(&db).unwrap().len(), 1);
        assert_eq!(load_project(&db, "song").unwrap().unwrap().name, "Second");
    }

    #[test]
    fn test_namespaces_are_separate() {
        let db = open_in_memory().unwrap();
        let drafts = LoopDraftStore::loop_drafts(db.clone());
        let draft = LoopDraft {
            name: "idea".to_string(),
            bpm: Some(140.0),
            tracks: project("x").tracks,
        };
        drafts.save("idea", &draft).unwrap();

        assert_eq!(drafts.load("idea").unwrap(), Some(draft));
        assert!(list_projects(&db).unwrap().is_empty());
        assert_eq!(drafts.list().unwrap()[0].name, "idea");
    }

    #[test]
    fn test_malformed_row_is_absent() {
        let db = open_in_memory().unwrap();
        db.lock()
            .execute(
                "INSERT INTO kv_store (namespace, key, value, updated_at) VALUES ('projects', 'bad', '{oops', '')",
                [],
            )
            .unwrap();
        assert_eq!(load_project(&db, "bad").unwrap(), None);
    }
}
