// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! In-memory session store with on-disk transcripts.
//!
//! The store owns eviction: idle sessions past the retention window
//! are swept on every create and acquire, then the oldest not-in-use
//! sessions are dropped down to the configured count. Eviction removes
//! the transcript and any scratch files along with the record.
//!
//! Exclusive use is enforced through [`SessionLease`], an RAII guard.
//! Dropping a lease releases the session; a lease marked poisoned
//! removes the session entirely, used when a worker is terminated
//! mid-invocation and the transcript can no longer be trusted.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, warn};

use crate::config::SessionSettings;
use crate::error::SessionError;

use super::types::{Session, SessionInfo};

type Shared = Arc<Mutex<HashMap<String, Session>>>;

fn lock(inner: &Shared) -> std::sync::MutexGuard<'_, HashMap<String, Session>> {
    inner.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Store of resumable sessions for one orchestrator.
#[derive(Clone)]
pub struct SessionStore {
    inner: Shared,
    dir: PathBuf,
    max_idle: Duration,
    max_count: usize,
}

impl SessionStore {
    /// Open a store rooted at the directory named in `settings`, or the
    /// platform data directory when unset.
    pub fn open(settings: &SessionSettings) -> Result<Self, SessionError> {
        let dir = match &settings.dir {
            Some(dir) => dir.clone(),
            None => dirs::data_dir()
                .unwrap_or_else(std::env::temp_dir)
                .join("foreman")
                .join("sessions"),
        };
        Self::open_at(dir, settings.max_idle_secs, settings.max_count)
    }

    /// Open a store at an explicit directory.
    pub fn open_at(
        dir: PathBuf,
        max_idle_secs: u64,
        max_count: usize,
    ) -> Result<Self, SessionError> {
        std::fs::create_dir_all(&dir)?;
        Ok(Self {
            inner: Arc::new(Mutex::new(HashMap::new())),
            dir,
            max_idle: Duration::from_secs(max_idle_secs),
            max_count,
        })
    }

    /// Directory holding transcripts.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Create a fresh session for `agent` and acquire it immediately.
    pub fn create(&self, agent: &str) -> Result<SessionLease, SessionError> {
        self.sweep();
        let transcript = loop {
            let candidate = self.dir.join(format!("{}.jsonl", super::generate_id()));
            if !candidate.exists() {
                break candidate;
            }
        };
        std::fs::write(&transcript, b"")?;

        let mut session = Session::new(agent, transcript.clone());
        // The path embeds the id it was named for.
        session.id = transcript
            .file_stem()
            .and_then(|s| s.to_str())
            .map(str::to_string)
            .unwrap_or_else(super::generate_id);
        session.in_use = true;
        let id = session.id.clone();

        debug!(session_id = %id, agent, "created session");
        lock(&self.inner).insert(id.clone(), session);
        Ok(SessionLease {
            inner: Arc::clone(&self.inner),
            id,
            transcript,
            poisoned: false,
        })
    }

    /// Acquire an existing session for exclusive use.
    ///
    /// Fails when the session is unknown, owned by a different agent,
    /// already in use, or its transcript file has gone missing. A
    /// missing transcript also purges the stale record.
    pub fn acquire(&self, id: &str, agent: &str) -> Result<SessionLease, SessionError> {
        self.sweep();
        let mut map = lock(&self.inner);
        let session = map
            .get_mut(id)
            .ok_or_else(|| SessionError::NotFound(id.to_string()))?;

        if session.agent != agent {
            return Err(SessionError::OwnerMismatch {
                id: id.to_string(),
                owner: session.agent.clone(),
                requested: agent.to_string(),
            });
        }
        if session.in_use {
            return Err(SessionError::InUse(id.to_string()));
        }
        if !session.transcript.is_file() {
            let stale = map.remove(id);
            if let Some(stale) = stale {
                remove_files(&stale);
            }
            return Err(SessionError::MissingTranscript(id.to_string()));
        }

        session.in_use = true;
        session.touch();
        let transcript = session.transcript.clone();
        drop(map);

        debug!(session_id = %id, agent, "acquired session");
        Ok(SessionLease {
            inner: Arc::clone(&self.inner),
            id: id.to_string(),
            transcript,
            poisoned: false,
        })
    }

    /// List sessions sorted by last use, most recent first.
    pub fn list(&self) -> Vec<SessionInfo> {
        let map = lock(&self.inner);
        let mut infos: Vec<SessionInfo> = map.values().map(SessionInfo::from).collect();
        infos.sort_by(|a, b| b.last_used.cmp(&a.last_used));
        infos
    }

    /// Remove a session and its files. In-use sessions are left alone.
    pub fn evict(&self, id: &str) -> bool {
        let mut map = lock(&self.inner);
        let removable = matches!(map.get(id), Some(session) if !session.in_use);
        if removable {
            if let Some(session) = map.remove(id) {
                remove_files(&session);
            }
        }
        removable
    }

    /// Remove every not-in-use session.
    pub fn clear(&self) -> usize {
        let mut map = lock(&self.inner);
        let ids: Vec<String> = map
            .values()
            .filter(|s| !s.in_use)
            .map(|s| s.id.clone())
            .collect();
        for id in &ids {
            if let Some(session) = map.remove(id) {
                remove_files(&session);
            }
        }
        ids.len()
    }

    /// Number of live session records.
    pub fn len(&self) -> usize {
        lock(&self.inner).len()
    }

    /// Whether the store holds no sessions.
    pub fn is_empty(&self) -> bool {
        lock(&self.inner).is_empty()
    }

    /// Evict idle sessions, then trim the oldest not-in-use sessions
    /// down to the retention count.
    fn sweep(&self) {
        let mut map = lock(&self.inner);
        let now = Utc::now();
        let idle_cutoff = chrono::Duration::from_std(self.max_idle)
            .unwrap_or_else(|_| chrono::Duration::hours(2));

        let expired: Vec<String> = map
            .values()
            .filter(|s| !s.in_use && now - s.last_used > idle_cutoff)
            .map(|s| s.id.clone())
            .collect();
        for id in expired {
            if let Some(session) = map.remove(&id) {
                debug!(session_id = %id, "evicting idle session");
                remove_files(&session);
            }
        }

        if map.len() > self.max_count {
            let mut idle: Vec<(String, chrono::DateTime<Utc>)> = map
                .values()
                .filter(|s| !s.in_use)
                .map(|s| (s.id.clone(), s.last_used))
                .collect();
            idle.sort_by_key(|(_, last_used)| *last_used);
            let excess = map.len().saturating_sub(self.max_count);
            for (id, _) in idle.into_iter().take(excess) {
                if let Some(session) = map.remove(&id) {
                    debug!(session_id = %id, "evicting session over retention count");
                    remove_files(&session);
                }
            }
        }
    }
}

fn remove_files(session: &Session) {
    if let Err(err) = std::fs::remove_file(&session.transcript) {
        if err.kind() != std::io::ErrorKind::NotFound {
            warn!(session_id = %session.id, %err, "failed to remove transcript");
        }
    }
    for path in &session.scratch {
        if let Err(err) = std::fs::remove_file(path) {
            if err.kind() != std::io::ErrorKind::NotFound {
                warn!(session_id = %session.id, %err, "failed to remove scratch file");
            }
        }
    }
}

/// Exclusive hold on a session for the duration of one invocation.
pub struct SessionLease {
    inner: Shared,
    id: String,
    transcript: PathBuf,
    poisoned: bool,
}

impl SessionLease {
    /// Session identifier.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Transcript path handed to the worker process.
    pub fn transcript(&self) -> &Path {
        &self.transcript
    }

    /// Register a scratch file owned by this session. It is removed
    /// along with the transcript when the session is evicted.
    pub fn add_scratch(&self, path: PathBuf) {
        if let Some(session) = lock(&self.inner).get_mut(&self.id) {
            session.scratch.push(path);
        }
    }

    /// Mark the session unusable. When the lease drops, the session
    /// and its files are removed instead of released.
    pub fn poison(&mut self) {
        self.poisoned = true;
    }
}

impl Drop for SessionLease {
    fn drop(&mut self) {
        let mut map = lock(&self.inner);
        if self.poisoned {
            if let Some(session) = map.remove(&self.id) {
                debug!(session_id = %self.id, "removing poisoned session");
                remove_files(&session);
            }
        } else if let Some(session) = map.get_mut(&self.id) {
            session.in_use = false;
            session.touch();
        }
    }
}
