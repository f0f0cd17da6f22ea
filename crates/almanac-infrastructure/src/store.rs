//! Process-local session cache over a [`RecordRepository`].
//!
//! Reads are served from an in-memory map; every mutation reloads from
//! disk under an advisory lock, applies the change, then writes through.
//! Reloading under the lock is what keeps two processes sharing one
//! directory from clobbering each other's updates.

use crate::token;
use almanac_core::record::{Project, SessionRecord};
use almanac_core::repository::RecordRepository;
use almanac_core::{AlmanacError, Result};
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

pub struct SessionStore {
    repo: Arc<dyn RecordRepository>,
    cache: RwLock<HashMap<String, SessionRecord>>,
}

impl SessionStore {
    pub fn new(repo: Arc<dyn RecordRepository>) -> Self {
        Self {
            repo,
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// Warms the cache with every record on disk. Called once at startup;
    /// corrupt or unreadable files are skipped, not fatal.
    pub fn preload(&self) -> Result<usize> {
        let keys = self.repo.list_keys()?;
        let mut loaded = 0;
        for key in keys {
            if let Some(found) = self.repo.load(&key)? {
                if found.migrated {
                    self.persist(&key, &found.record);
                }
                self.write_cache().insert(key, found.record);
                loaded += 1;
            }
        }
        tracing::info!(sessions = loaded, "session store preloaded");
        Ok(loaded)
    }

    fn read_cache(&self) -> std::sync::RwLockReadGuard<'_, HashMap<String, SessionRecord>> {
        self.cache.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_cache(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<String, SessionRecord>> {
        self.cache.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Write-through that never fails the request: a session living only
    /// in cache is better than a lost mutation, so persistence errors are
    /// logged and swallowed.
    fn persist(&self, session_key: &str, record: &SessionRecord) {
        if let Err(e) = self.repo.save(session_key, record) {
            tracing::error!(%session_key, error = %e, "failed to persist session record");
        }
    }

    /// Returns the cached record for `session_key`, materializing a fresh
    /// one (with an empty starter project) on first sight.
    fn ensure_cached(&self, session_key: &str) -> Result<()> {
        if self.read_cache().contains_key(session_key) {
            return Ok(());
        }
        let record = match self.repo.load(session_key)? {
            Some(found) => {
                if found.migrated {
                    // Persist the upgraded shape so migration runs once
                    self.persist(session_key, &found.record);
                }
                found.record
            }
            None => {
                // A failing disk must not turn away a new visitor; the
                // record is served from cache and persistence is retried
                // on the next mutation
                let record = SessionRecord::new(token::mint_entity_id());
                self.persist(session_key, &record);
                record
            }
        };
        self.write_cache().insert(session_key.to_string(), record);
        Ok(())
    }

    /// Reads through the cache without taking the cross-process lock.
    pub fn with_record<T>(
        &self,
        session_key: &str,
        f: impl FnOnce(&SessionRecord) -> T,
    ) -> Result<T> {
        self.ensure_cached(session_key)?;
        let cache = self.read_cache();
        let record = cache
            .get(session_key)
            .ok_or_else(|| AlmanacError::not_found("session", session_key))?;
        Ok(f(record))
    }

    /// Read-modify-write under the advisory lock.
    ///
    /// The record is reloaded from disk once the lock is held so changes
    /// made by another process since our last read are not overwritten.
    /// If the closure fails, nothing is cached or written.
    pub fn update<T>(
        &self,
        session_key: &str,
        f: impl FnOnce(&mut SessionRecord) -> Result<T>,
    ) -> Result<T> {
        self.ensure_cached(session_key)?;
        let _guard = match self.repo.lock(session_key) {
            Ok(guard) => guard,
            Err(e) => {
                tracing::warn!(%session_key, error = %e, "proceeding without session lock");
                almanac_core::repository::RecordLock::noop()
            }
        };

        let mut record = match self.repo.load(session_key)? {
            Some(found) => found.record,
            None => self
                .read_cache()
                .get(session_key)
                .cloned()
                .ok_or_else(|| AlmanacError::not_found("session", session_key))?,
        };

        let result = f(&mut record)?;
        self.write_cache()
            .insert(session_key.to_string(), record.clone());
        self.persist(session_key, &record);
        Ok(result)
    }

    /// Like [`update`](Self::update) but refuses to materialize a session
    /// that does not already exist. Fulfillment callers (webhooks) use
    /// this: an unknown key there is a bug, not a new visitor.
    pub fn update_existing<T>(
        &self,
        session_key: &str,
        f: impl FnOnce(&mut SessionRecord) -> Result<T>,
    ) -> Result<T> {
        if self.repo.load(session_key)?.is_none()
            && !self.read_cache().contains_key(session_key)
        {
            return Err(AlmanacError::not_found("session", session_key));
        }
        self.update(session_key, f)
    }

    /// Drops the cached copy and rereads from disk. Returns whether the
    /// session still exists anywhere.
    pub fn force_reload(&self, session_key: &str) -> Result<bool> {
        match self.repo.load(session_key)? {
            Some(found) => {
                if found.migrated {
                    self.persist(session_key, &found.record);
                }
                self.write_cache()
                    .insert(session_key.to_string(), found.record);
                Ok(true)
            }
            None => {
                let was_cached = self.write_cache().remove(session_key).is_some();
                Ok(was_cached)
            }
        }
    }

    /// Removes the session from cache and disk.
    pub fn clear(&self, session_key: &str) -> Result<()> {
        self.write_cache().remove(session_key);
        self.repo.delete(session_key)
    }

    /// Reads through to the active project, healing a dangling
    /// `active_project_id` first if the record carries one.
    pub fn with_active_project<T>(
        &self,
        session_key: &str,
        f: impl FnOnce(&Project) -> T,
    ) -> Result<T> {
        let healthy = self.with_record(session_key, |r| r.active_project().is_some())?;
        if !healthy {
            self.update(session_key, |r| {
                r.ensure_active_project(token::mint_entity_id);
                Ok(())
            })?;
        }
        self.with_record(session_key, move |r| {
            // ensure_active_project above guarantees a resolvable id
            r.active_project().map(f)
        })?
        .ok_or_else(|| AlmanacError::not_found("project", "active"))
    }

    /// Read-modify-write scoped to the active project.
    pub fn update_active_project<T>(
        &self,
        session_key: &str,
        f: impl FnOnce(&mut Project) -> Result<T>,
    ) -> Result<T> {
        self.update(session_key, |record| {
            let project = record.ensure_active_project(token::mint_entity_id);
            f(project)
        })
    }
}
