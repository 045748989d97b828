// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Worker profiles and the resolver seam.
//!
//! A [`WorkerProfile`] is the named configuration a unit of work runs
//! under: allowed tools, model hint, reasoning effort, and instructions.
//! Profiles are immutable once resolved; the orchestrator holds an
//! `Arc<WorkerProfile>` per invocation.
//!
//! Discovery and loading of profiles from a filesystem location is an
//! external concern. The orchestrator only consumes the
//! [`ProfileResolver`] trait; [`StaticResolver`] is the in-memory
//! implementation used for embedding, configuration-defined profiles,
//! and tests.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::types::ReasoningEffort;

/// Origin scope of a resolved profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProfileScope {
    User,
    Project,
}

impl ProfileScope {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Project => "project",
        }
    }
}

/// Which scopes a resolution should consult.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScopeQuery {
    UserOnly,
    ProjectOnly,
    /// Consult both; a project profile shadows a user profile of the
    /// same name.
    #[default]
    ProjectOverridesUser,
}

/// Named configuration for a worker agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerProfile {
    /// Unique name, the request-side key.
    pub name: String,
    /// Allowed tool names, forwarded to the worker process.
    #[serde(default)]
    pub tools: Vec<String>,
    /// Optional model override.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    /// Optional reasoning-effort hint.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub effort: Option<ReasoningEffort>,
    /// Instructions text injected into the worker's system prompt.
    #[serde(default)]
    pub instructions: String,
    /// Origin scope this profile was resolved from.
    pub scope: ProfileScope,
}

impl WorkerProfile {
    /// Create a profile with minimal required fields.
    pub fn new(name: impl Into<String>, scope: ProfileScope) -> Self {
        Self {
            name: name.into(),
            tools: Vec::new(),
            model: None,
            effort: None,
            instructions: String::new(),
            scope,
        }
    }

    /// Set the allowed tools.
    pub fn with_tools(mut self, tools: Vec<String>) -> Self {
        self.tools = tools;
        self
    }

    /// Set the model override.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Set the reasoning-effort hint.
    pub fn with_effort(mut self, effort: ReasoningEffort) -> Self {
        self.effort = Some(effort);
        self
    }

    /// Set the instructions text.
    pub fn with_instructions(mut self, instructions: impl Into<String>) -> Self {
        self.instructions = instructions.into();
        self
    }
}

/// Resolves a worker profile by name within a scope.
#[async_trait]
pub trait ProfileResolver: Send + Sync {
    /// Resolve `name` within `scope`, or `None` if no such profile.
    async fn resolve(&self, name: &str, scope: ScopeQuery) -> Option<Arc<WorkerProfile>>;
}

/// In-memory resolver over a fixed set of profiles.
#[derive(Default)]
pub struct StaticResolver {
    user: HashMap<String, Arc<WorkerProfile>>,
    project: HashMap<String, Arc<WorkerProfile>>,
}

impl StaticResolver {
    /// Create an empty resolver.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a profile under the scope it declares.
    pub fn insert(&mut self, profile: WorkerProfile) {
        let map = match profile.scope {
            ProfileScope::User => &mut self.user,
            ProfileScope::Project => &mut self.project,
        };
        map.insert(profile.name.clone(), Arc::new(profile));
    }

    /// Build a resolver from an iterator of profiles.
    pub fn from_profiles(profiles: impl IntoIterator<Item = WorkerProfile>) -> Self {
        let mut resolver = Self::new();
        for profile in profiles {
            resolver.insert(profile);
        }
        resolver
    }
}

#[async_trait]
impl ProfileResolver for StaticResolver {
    async fn resolve(&self, name: &str, scope: ScopeQuery) -> Option<Arc<WorkerProfile>> {
        match scope {
            ScopeQuery::UserOnly => self.user.get(name).cloned(),
            ScopeQuery::ProjectOnly => self.project.get(name).cloned(),
            ScopeQuery::ProjectOverridesUser => self
                .project
                .get(name)
                .or_else(|| self.user.get(name))
                .cloned(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolver() -> StaticResolver {
        StaticResolver::from_profiles(vec![
            WorkerProfile::new("builder", ProfileScope::User)
                .with_model("sonnet-4")
                .with_instructions("You build things."),
            WorkerProfile::new("builder", ProfileScope::Project)
                .with_model("opus-4")
                .with_instructions("Project build rules."),
            WorkerProfile::new("reviewer", ProfileScope::User)
                .with_tools(vec!["read_file".to_string(), "grep".to_string()]),
        ])
    }

    #[test]
    fn test_profile_builder() {
        let p = WorkerProfile::new("scout", ProfileScope::User)
            .with_tools(vec!["grep".to_string()])
            .with_effort(ReasoningEffort::Low)
            .with_instructions("Search only.");
        assert_eq!(p.name, "scout");
        assert_eq!(p.tools, vec!["grep"]);
        assert_eq!(p.effort, Some(ReasoningEffort::Low));
        assert_eq!(p.scope, ProfileScope::User);
    }

    #[tokio::test]
    async fn test_project_overrides_user() {
        let r = resolver();
        let p = r
            .resolve("builder", ScopeQuery::ProjectOverridesUser)
            .await
            .unwrap();
        assert_eq!(p.scope, ProfileScope::Project);
        assert_eq!(p.model.as_deref(), Some("opus-4"));
    }

    #[tokio::test]
    async fn test_scope_restriction() {
        let r = resolver();
        let p = r.resolve("builder", ScopeQuery::UserOnly).await.unwrap();
        assert_eq!(p.scope, ProfileScope::User);

        assert!(r.resolve("reviewer", ScopeQuery::ProjectOnly).await.is_none());
    }

    #[tokio::test]
    async fn test_unknown_profile() {
        let r = resolver();
        assert!(r
            .resolve("nonexistent", ScopeQuery::ProjectOverridesUser)
            .await
            .is_none());
    }

    #[test]
    fn test_profile_serialization_round_trip() {
        let p = WorkerProfile::new("builder", ProfileScope::Project).with_model("opus-4");
        let yaml = serde_yaml::to_string(&p).unwrap();
        let parsed: WorkerProfile = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(parsed.name, "builder");
        assert_eq!(parsed.scope, ProfileScope::Project);
    }
}
