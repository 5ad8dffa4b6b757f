//! Typed caches for default and per-project role actors.
//!
//! Both caches store `Option<_>`: `None` is the absent sentinel, a cached
//! statement that the backing store has no set for the key. Whether misses
//! are retained is fixed at construction.

use std::collections::{BTreeSet, HashMap};
use std::future::Future;

use roster_core::{DefaultActors, ProjectActors, ProjectId, RoleId, RosterResult};

use super::keyed::{KeyIndex, KeyedCache};
use super::project_key::ProjectRoleKey;
use super::stats::CacheStats;

// ============================================================================
// DEFAULT ACTORS
// ============================================================================

/// Cache of [`DefaultActors`] keyed by role.
pub struct DefaultRoleActorsCache {
    entries: KeyedCache<RoleId, Option<DefaultActors>>,
    cache_missing: bool,
}

impl DefaultRoleActorsCache {
    pub fn new(cache_missing: bool) -> Self {
        Self {
            entries: KeyedCache::new("default_role_actors"),
            cache_missing,
        }
    }

    /// Default actors of `role_id`, loading them with `loader` on a miss.
    pub async fn get<F, Fut>(&self, role_id: RoleId, loader: F) -> RosterResult<Option<DefaultActors>>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = RosterResult<Option<DefaultActors>>>,
    {
        self.entries
            .get_or_load_retaining(&role_id, loader, |found| {
                self.cache_missing || found.is_some()
            })
            .await
    }

    /// Install a set the backing store already accepted. Evicts an absent
    /// sentinel for the same role.
    pub fn put(&self, actors: DefaultActors) -> RosterResult<()> {
        self.entries.put(actors.role_id(), Some(actors))
    }

    pub fn remove(&self, role_id: RoleId) -> RosterResult<bool> {
        self.entries.invalidate(&role_id)
    }

    pub fn clear(&self) -> RosterResult<usize> {
        self.entries.clear()
    }

    /// Roles that currently have an entry, sentinel included.
    pub fn keys(&self) -> RosterResult<Vec<RoleId>> {
        self.entries.keys()
    }

    pub fn stats(&self) -> RosterResult<CacheStats> {
        self.entries.stats()
    }
}

// ============================================================================
// PROJECT ACTORS
// ============================================================================

/// Secondary index from role to projects and project to roles.
///
/// Lets the project cache drop one role's or one project's entries without
/// scanning unrelated keys.
#[derive(Debug, Default)]
pub struct RoleProjectIndex {
    by_role: HashMap<RoleId, BTreeSet<ProjectId>>,
    by_project: HashMap<ProjectId, BTreeSet<RoleId>>,
}

impl RoleProjectIndex {
    /// Keys indexed under `role_id`.
    pub fn keys_for_role(&self, role_id: RoleId) -> Vec<ProjectRoleKey> {
        self.by_role
            .get(&role_id)
            .map(|projects| {
                projects
                    .iter()
                    .map(|project_id| ProjectRoleKey::new(role_id, *project_id))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Keys indexed under `project_id`.
    pub fn keys_for_project(&self, project_id: ProjectId) -> Vec<ProjectRoleKey> {
        self.by_project
            .get(&project_id)
            .map(|roles| {
                roles
                    .iter()
                    .map(|role_id| ProjectRoleKey::new(*role_id, project_id))
                    .collect()
            })
            .unwrap_or_default()
    }
}

impl KeyIndex<ProjectRoleKey> for RoleProjectIndex {
    fn insert(&mut self, key: &ProjectRoleKey) {
        self.by_role
            .entry(key.role_id())
            .or_default()
            .insert(key.project_id());
        self.by_project
            .entry(key.project_id())
            .or_default()
            .insert(key.role_id());
    }

    fn remove(&mut self, key: &ProjectRoleKey) {
        if let Some(projects) = self.by_role.get_mut(&key.role_id()) {
            projects.remove(&key.project_id());
            if projects.is_empty() {
                self.by_role.remove(&key.role_id());
            }
        }
        if let Some(roles) = self.by_project.get_mut(&key.project_id()) {
            roles.remove(&key.role_id());
            if roles.is_empty() {
                self.by_project.remove(&key.project_id());
            }
        }
    }

    fn clear(&mut self) {
        self.by_role.clear();
        self.by_project.clear();
    }
}

/// Cache of [`ProjectActors`] keyed by `(role, project)`.
pub struct ProjectRoleActorsCache {
    entries: KeyedCache<ProjectRoleKey, Option<ProjectActors>, RoleProjectIndex>,
    cache_missing: bool,
}

impl ProjectRoleActorsCache {
    pub fn new(cache_missing: bool) -> Self {
        Self {
            entries: KeyedCache::new("project_role_actors"),
            cache_missing,
        }
    }

    /// Actors of `role_id` in `project_id`, loading them with `loader` on a miss.
    pub async fn get<F, Fut>(
        &self,
        role_id: RoleId,
        project_id: ProjectId,
        loader: F,
    ) -> RosterResult<Option<ProjectActors>>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = RosterResult<Option<ProjectActors>>>,
    {
        let key = ProjectRoleKey::new(role_id, project_id);
        self.entries
            .get_or_load_retaining(&key, loader, |found| {
                self.cache_missing || found.is_some()
            })
            .await
    }

    /// Install a set the backing store already accepted.
    pub fn put(&self, actors: ProjectActors) -> RosterResult<()> {
        let key = ProjectRoleKey::new(actors.role_id(), actors.project_id());
        self.entries.put(key, Some(actors))
    }

    pub fn remove(&self, role_id: RoleId, project_id: ProjectId) -> RosterResult<bool> {
        self.entries
            .invalidate(&ProjectRoleKey::new(role_id, project_id))
    }

    /// Drop every entry of `role_id`, across all projects.
    pub fn remove_role(&self, role_id: RoleId) -> RosterResult<usize> {
        self.entries
            .invalidate_indexed(|index| index.keys_for_role(role_id))
    }

    /// Drop every entry of `project_id`, across all roles.
    pub fn remove_project(&self, project_id: ProjectId) -> RosterResult<usize> {
        self.entries
            .invalidate_indexed(|index| index.keys_for_project(project_id))
    }

    pub fn clear(&self) -> RosterResult<usize> {
        self.entries.clear()
    }

    pub fn keys(&self) -> RosterResult<Vec<ProjectRoleKey>> {
        self.entries.keys()
    }

    pub fn stats(&self) -> RosterResult<CacheStats> {
        self.entries.stats()
    }
}
