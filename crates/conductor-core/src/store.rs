//! Session store (C8): sled-backed, crash-safe per-session records with CAS revisions.
//!
//! sled's single-key compare-and-swap gives the "fully visible or not at
//! all" durability contract (§4.2) without a temp-file-rename dance.

use crate::error::StoreError;
use crate::session::{is_valid_session_id, ArchivedSession, Session};
use dashmap::DashMap;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, warn};

const SESSIONS_TREE: &str = "sessions";
const ARCHIVE_TREE: &str = "sessions_archive";

/// Per-`session_id` mutual exclusion during `Update` (§4.2 "Isolation").
/// Distinct sessions serialize independently; this map only ever grows a
/// lock entry, never removes one.
type LockTable = DashMap<String, Arc<Mutex<()>>>;

pub struct SessionStore {
    db: sled::Db,
    locks: LockTable,
}

impl SessionStore {
    pub fn open_path(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let db = sled::open(path).map_err(|e| StoreError::Backend(format!("open: {e}")))?;
        Ok(Self { db, locks: DashMap::new() })
    }

    fn sessions_tree(&self) -> Result<sled::Tree, StoreError> {
        self.db.open_tree(SESSIONS_TREE).map_err(|e| StoreError::Backend(format!("tree: {e}")))
    }

    fn archive_tree(&self) -> Result<sled::Tree, StoreError> {
        self.db.open_tree(ARCHIVE_TREE).map_err(|e| StoreError::Backend(format!("tree: {e}")))
    }

    fn lock_for(&self, session_id: &str) -> Arc<Mutex<()>> {
        Arc::clone(self.locks.entry(session_id.to_string()).or_insert_with(|| Arc::new(Mutex::new(()))))
    }

    /// Reads the current record without creating one. `None` means the session does not exist (yet).
    pub fn get(&self, session_id: &str) -> Result<Option<Session>, StoreError> {
        if !is_valid_session_id(session_id) {
            return Err(StoreError::InvalidSessionId(session_id.to_string()));
        }
        let tree = self.sessions_tree()?;
        match tree.get(session_id.as_bytes()).map_err(|e| StoreError::Backend(format!("get: {e}")))? {
            Some(bytes) => {
                let session: Session = serde_json::from_slice(&bytes)
                    .map_err(|e| StoreError::Backend(format!("deserialize: {e}")))?;
                Ok(Some(session))
            }
            None => Ok(None),
        }
    }

    /// Runs `mutator` under the per-session lock and persists the result via
    /// sled CAS, retrying the read-modify-write once on a concurrent writer
    /// (a true ABA race is impossible since the lock already serializes same-session
    /// calls; CAS only guards against an external writer touching sled directly).
    pub async fn update<F>(&self, session_id: &str, mutator: F) -> Result<Session, StoreError>
    where
        F: FnOnce(Option<Session>) -> Result<Session, StoreError>,
    {
        if !is_valid_session_id(session_id) {
            return Err(StoreError::InvalidSessionId(session_id.to_string()));
        }
        let lock = self.lock_for(session_id);
        let _guard = lock.lock().await;

        let tree = self.sessions_tree()?;
        let key = session_id.as_bytes();
        let old_bytes = tree.get(key).map_err(|e| StoreError::Backend(format!("get: {e}")))?;
        let old_session = match &old_bytes {
            Some(b) => Some(
                serde_json::from_slice::<Session>(b)
                    .map_err(|e| StoreError::Backend(format!("deserialize: {e}")))?,
            ),
            None => None,
        };

        let mut new_session = mutator(old_session)?;
        new_session.revision += 1;
        let new_bytes = serde_json::to_vec(&new_session)
            .map_err(|e| StoreError::Backend(format!("serialize: {e}")))?;

        let cas = tree
            .compare_and_swap(key, old_bytes, Some(new_bytes))
            .map_err(|e| StoreError::Backend(format!("cas: {e}")))?;
        if cas.is_err() {
            return Err(StoreError::StaleRevision {
                expected: new_session.revision.saturating_sub(1),
                found: new_session.revision,
                session_id: session_id.to_string(),
            });
        }
        tree.flush_async().await.map_err(|e| StoreError::Backend(format!("flush: {e}")))?;
        Ok(new_session)
    }

    /// Moves every session with `last_activity_ms < cutoff_ms` to the archive
    /// tree and removes it from the live set (§4.2).
    pub async fn archive(&self, cutoff_ms: i64, archived_at_ms: i64) -> Result<usize, StoreError> {
        let tree = self.sessions_tree()?;
        let archive = self.archive_tree()?;
        let mut moved = 0usize;

        let mut stale_ids = Vec::new();
        for item in tree.iter() {
            let (key, value) = item.map_err(|e| StoreError::Backend(format!("iter: {e}")))?;
            let session: Session = match serde_json::from_slice(&value) {
                Ok(s) => s,
                Err(e) => {
                    warn!(target: "conductor::store", "skipping corrupt session record: {e}");
                    continue;
                }
            };
            if session.last_activity_ms < cutoff_ms {
                stale_ids.push((key.to_vec(), session));
            }
        }

        for (key, session) in stale_ids {
            let archived = ArchivedSession { session, archived_at_ms };
            let bytes = serde_json::to_vec(&archived)
                .map_err(|e| StoreError::Backend(format!("serialize archive: {e}")))?;
            let lock = self.lock_for(&archived.session_id_string());
            let _guard = lock.lock().await;
            archive.insert(&key, bytes).map_err(|e| StoreError::Backend(format!("archive insert: {e}")))?;
            tree.remove(&key).map_err(|e| StoreError::Backend(format!("remove: {e}")))?;
            moved += 1;
        }
        if moved > 0 {
            info!(target: "conductor::store", archived = moved, "session archival sweep complete");
        }
        Ok(moved)
    }
}

impl ArchivedSession {
    fn session_id_string(&self) -> String {
        self.session.session_id.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::role::Role;

    fn temp_store() -> (SessionStore, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::open_path(dir.path()).unwrap();
        (store, dir)
    }

    #[tokio::test]
    async fn get_on_absent_session_is_none() {
        let (store, _dir) = temp_store();
        assert!(store.get("nope").unwrap().is_none());
    }

    #[tokio::test]
    async fn invalid_session_id_is_rejected() {
        let (store, _dir) = temp_store();
        assert!(matches!(store.get("bad id!"), Err(StoreError::InvalidSessionId(_))));
    }

    #[tokio::test]
    async fn update_creates_and_increments_revision() {
        let (store, _dir) = temp_store();
        let s1 = store
            .update("s1", |existing| {
                assert!(existing.is_none());
                Ok(Session::new("s1".into(), "build a thing".into(), Role::Coder, 0.8, 100))
            })
            .await
            .unwrap();
        assert_eq!(s1.revision, 1);

        let s2 = store
            .update("s1", |existing| {
                let mut s = existing.unwrap();
                s.last_activity_ms = 200;
                Ok(s)
            })
            .await
            .unwrap();
        assert_eq!(s2.revision, 2);
        assert!(s2.last_activity_ms >= s1.last_activity_ms);
    }

    #[tokio::test]
    async fn archive_moves_stale_sessions() {
        let (store, _dir) = temp_store();
        store
            .update("old", |_| Ok(Session::new("old".into(), "x".into(), Role::Planner, 0.8, 0)))
            .await
            .unwrap();
        store
            .update("fresh", |_| Ok(Session::new("fresh".into(), "y".into(), Role::Planner, 0.8, 1_000_000)))
            .await
            .unwrap();

        let moved = store.archive(500_000, 2_000_000).await.unwrap();
        assert_eq!(moved, 1);
        assert!(store.get("old").unwrap().is_none());
        assert!(store.get("fresh").unwrap().is_some());
    }
}
