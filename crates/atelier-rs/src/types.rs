//! Domain and wire types for the Atelier API.
//!
//! Everything here mirrors the remote service's JSON shapes. Entities are
//! read-only from the client's perspective except [`User`], which only the
//! [`SessionManager`](crate::session::SessionManager) mutates, and the two
//! counters on [`Creation`], which only the server authoritatively changes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

// ── Users and credentials ──────────────────────────────────────────

/// Subscription plan for a user account.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Plan {
    Free,
    Pro,
    Studio,
}

/// An authenticated user account.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct User {
    pub id: String,
    pub name: String,
    pub email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
    pub plan: Plan,
}

/// Opaque bearer credential issued at login. Owned by the session manager
/// and persisted alongside the [`User`]; never inspected client-side.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(transparent)]
pub struct AuthToken(pub String);

impl AuthToken {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Partial profile mutation sent to the profile-update endpoint.
/// `None` fields are omitted and left unchanged server-side.
#[derive(Serialize, Debug, Clone, Default)]
pub struct ProfileUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
}

/// Wire response from the login and signup endpoints.
#[derive(Deserialize, Debug, Clone)]
pub struct AuthResponse {
    pub token: AuthToken,
    pub user: User,
}

// ── Agents ─────────────────────────────────────────────────────────

/// What an agent is currently doing.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    Creating,
    Evolving,
    Analyzing,
    Idle,
}

/// Aggregate counters reported with an agent.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AgentCounts {
    pub creations: u64,
    pub likes: u64,
}

/// An AI agent entity. Read-only: the client never mutates agents.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct AiAgent {
    pub id: String,
    pub name: String,
    pub specialty: String,
    pub status: AgentStatus,
    /// Opaque style descriptor assigned by the service.
    pub creative_dna: String,
    #[serde(default)]
    pub counts: AgentCounts,
}

// ── Creations and lineage ──────────────────────────────────────────

/// A single media creation. Immutable once fetched, except `likes` and
/// `evolutions`, which only the server changes (local like/save toggles are
/// approximations; see [`ToggleStore`](crate::sync::toggles::ToggleStore)).
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Creation {
    pub id: String,
    /// Parent in the evolution lineage; `None` marks a lineage root.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    pub agent_id: String,
    /// Depth in the lineage; roots are generation 0 by convention.
    pub generation: u32,
    pub likes: u64,
    pub evolutions: u64,
    #[serde(default)]
    pub tags: Vec<String>,
    pub timestamp: DateTime<Utc>,
}

impl Creation {
    /// Whether this creation is a lineage root (no parent).
    pub fn is_root(&self) -> bool {
        self.parent_id.is_none()
    }
}

/// Check the lineage invariant over a set of creations: every `parent_id`
/// must reference a member of the set whose generation is strictly less.
pub fn lineage_consistent(creations: &[Creation]) -> bool {
    let generations: HashMap<&str, u32> = creations
        .iter()
        .map(|c| (c.id.as_str(), c.generation))
        .collect();

    creations.iter().all(|c| match &c.parent_id {
        None => true,
        Some(parent) => generations
            .get(parent.as_str())
            .is_some_and(|parent_gen| *parent_gen < c.generation),
    })
}

/// Direct descendants of `parent_id` within a set of creations.
pub fn children_of<'a>(
    creations: &'a [Creation],
    parent_id: &'a str,
) -> impl Iterator<Item = &'a Creation> {
    creations
        .iter()
        .filter(move |c| c.parent_id.as_deref() == Some(parent_id))
}

/// Request body for creating a brand-new (root) creation.
#[derive(Serialize, Debug, Clone)]
pub struct NewCreation {
    pub agent_id: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
}

// ── Feed ───────────────────────────────────────────────────────────

/// What happened in a feed entry.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FeedAction {
    Created,
    Evolved,
    Liked,
}

/// One entry in the social feed.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct FeedItem {
    pub id: String,
    pub agent_id: String,
    pub agent_name: String,
    pub action: FeedAction,
    pub creation_id: String,
    pub timestamp: DateTime<Utc>,
}

// ── Pagination ─────────────────────────────────────────────────────

/// One server-returned window over a resource collection.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub offset: u64,
    pub limit: u64,
    pub total: u64,
}

/// Cursor describing the most recently fetched window. Recomputed on every
/// page fetch; `has_more = offset + limit < total`.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageCursor {
    pub offset: u64,
    pub limit: u64,
    pub total: u64,
    pub has_more: bool,
}

impl PageCursor {
    /// An empty cursor for a collection that has not been fetched yet.
    pub fn empty(limit: u64) -> Self {
        Self {
            offset: 0,
            limit,
            total: 0,
            has_more: false,
        }
    }

    /// Cursor for a returned page window.
    pub fn from_page<T>(page: &Page<T>) -> Self {
        Self {
            offset: page.offset,
            limit: page.limit,
            total: page.total,
            has_more: page.offset + page.limit < page.total,
        }
    }
}

/// Filter parameters for the creation listing endpoint. Any change to a
/// filter resets pagination and replaces the loaded dataset.
#[derive(Serialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct CreationFilter {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub search: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub style: Option<String>,
}

impl CreationFilter {
    pub fn for_agent(agent_id: impl Into<String>) -> Self {
        Self {
            agent_id: Some(agent_id.into()),
            ..Default::default()
        }
    }

    pub fn for_search(search: impl Into<String>) -> Self {
        Self {
            search: Some(search.into()),
            ..Default::default()
        }
    }
}

// ── Tests ──────────────────────────────────────────────────────────
