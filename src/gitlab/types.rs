//! Domain types for the remote hierarchy, and their wire representations.

use serde::Deserialize;

use crate::config::PullMethod;

/// Remote id of a group.
pub type GroupId = u64;
/// Remote id of a project.
pub type ProjectId = u64;
/// Remote id of a user.
pub type UserId = u64;

/// Default branch presented when the remote does not name one.
pub const DEFAULT_BRANCH_FALLBACK: &str = "master";

// =============================================================================
// Domain Types
// =============================================================================

/// A group or subgroup in the remote hierarchy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Group {
    pub id: GroupId,
    /// Path component used as the directory name.
    pub name: String,
    /// None for a root group.
    pub parent_id: Option<GroupId>,
}

/// A single remote repository.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Project {
    pub id: ProjectId,
    /// Path component used as the filesystem entry name.
    pub name: String,
    /// Never empty; falls back to [`DEFAULT_BRANCH_FALLBACK`].
    pub default_branch: String,
    /// Already selected for the configured pull method.
    pub clone_url: String,
}

/// A user whose personal projects appear in the tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub id: UserId,
    /// Username used as the directory name.
    pub name: String,
}

/// The immediate children of a group.
#[derive(Debug, Clone, Default)]
pub struct GroupContent {
    pub subgroups: Vec<Group>,
    pub projects: Vec<Project>,
}

/// The personal projects of a user.
#[derive(Debug, Clone, Default)]
pub struct UserContent {
    pub projects: Vec<Project>,
}

// =============================================================================
// Wire Types
// =============================================================================

/// Group as returned by the REST API.
#[derive(Debug, Deserialize)]
pub(crate) struct GroupDto {
    pub id: u64,
    pub path: String,
    pub parent_id: Option<u64>,
}

impl GroupDto {
    pub(crate) fn into_group(self) -> Group {
        Group {
            id: self.id,
            name: self.path,
            parent_id: self.parent_id,
        }
    }
}

/// Project as returned by the REST API.
#[derive(Debug, Deserialize)]
pub(crate) struct ProjectDto {
    pub id: u64,
    pub path: String,
    pub default_branch: Option<String>,
    pub ssh_url_to_repo: String,
    pub http_url_to_repo: String,
}

impl ProjectDto {
    /// Convert to the domain type, applying the default-branch fallback and
    /// selecting the clone URL form for the configured pull method.
    pub(crate) fn into_project(self, pull_method: PullMethod) -> Project {
        let default_branch = match self.default_branch {
            Some(branch) if !branch.is_empty() => branch,
            _ => DEFAULT_BRANCH_FALLBACK.to_string(),
        };
        let clone_url = match pull_method {
            PullMethod::Ssh => self.ssh_url_to_repo,
            PullMethod::Http => self.http_url_to_repo,
        };
        Project {
            id: self.id,
            name: self.path,
            default_branch,
            clone_url,
        }
    }
}

/// User as returned by the REST API.
#[derive(Debug, Deserialize)]
pub(crate) struct UserDto {
    pub id: u64,
    pub username: String,
}

impl UserDto {
    pub(crate) fn into_user(self) -> User {
        User {
            id: self.id,
            name: self.username,
        }
    }
}
