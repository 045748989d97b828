// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Resumable worker sessions.
//!
//! A session pairs an owning profile name with a transcript file on
//! disk. Sessions are acquired exclusively through RAII leases and
//! evicted by idle time and count.

mod store;
mod types;

pub use store::{SessionLease, SessionStore};
pub use types::{generate_id, Session, SessionInfo};
