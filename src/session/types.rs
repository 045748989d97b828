// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Session record types.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A resumable worker session.
///
/// The transcript file is the worker's durable state; resuming a
/// session hands the same transcript path back to a new process.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    /// Unique session identifier.
    pub id: String,
    /// Name of the profile that owns this session.
    pub agent: String,
    /// Path to the transcript file.
    pub transcript: PathBuf,
    /// Scratch files created alongside the transcript, removed on
    /// eviction.
    #[serde(default)]
    pub scratch: Vec<PathBuf>,
    /// When the session was created.
    pub created_at: DateTime<Utc>,
    /// Last time the session was acquired or released.
    pub last_used: DateTime<Utc>,
    /// Whether an invocation currently holds the session.
    #[serde(skip)]
    pub in_use: bool,
}

impl Session {
    /// Create a fresh session record.
    pub fn new(agent: impl Into<String>, transcript: PathBuf) -> Self {
        let now = Utc::now();
        Self {
            id: generate_id(),
            agent: agent.into(),
            transcript,
            scratch: Vec::new(),
            created_at: now,
            last_used: now,
            in_use: false,
        }
    }

    /// Refresh the last-used timestamp.
    pub fn touch(&mut self) {
        self.last_used = Utc::now();
    }
}

/// Generate a new session identifier.
pub fn generate_id() -> String {
    Uuid::new_v4().to_string()
}

/// Read-only view of a session for listing.
#[derive(Debug, Clone, Serialize)]
pub struct SessionInfo {
    pub id: String,
    pub agent: String,
    pub transcript: PathBuf,
    pub created_at: DateTime<Utc>,
    pub last_used: DateTime<Utc>,
    pub in_use: bool,
}

impl From<&Session> for SessionInfo {
    fn from(session: &Session) -> Self {
        Self {
            id: session.id.clone(),
            agent: session.agent.clone(),
            transcript: session.transcript.clone(),
            created_at: session.created_at,
            last_used: session.last_used,
            in_use: session.in_use,
        }
    }
}
