//! Caching facade over a [`RoleActorStore`].
//!
//! Reads go through the caches in [`crate::cache`]. Writes go to the backing
//! store first and only touch the caches once the store accepted them:
//!
//! | Operation                         | Cache effect after the backing write          |
//! |-----------------------------------|-----------------------------------------------|
//! | `add_role`, `update_role`         | role list cleared                             |
//! | `delete_role`                     | role list, role's default and project entries |
//! | `update_default_actors`           | provided set installed                        |
//! | `update_project_actors`           | provided set installed                        |
//! | `remove_actors_by_key_and_type`   | both actor caches cleared                     |
//! | `remove_actors_by_project`        | default cache cleared, project's entries      |
//! | `apply_default_roles_to_project`  | project's entries                             |
//!
//! A failed backing write leaves every cache untouched.

use std::future::Future;
use std::sync::Arc;

use ::async_trait::async_trait;
use roster_core::{
    ActorType, CacheConfig, DefaultActors, NewRole, ProjectActors, ProjectId, Role, RoleId,
    RosterResult, StorageError,
};

use crate::cache::{
    AllRolesCache, CacheStats, DefaultRoleActorsCache, ProjectRoleActorsCache, ProjectRoleKey,
};
use crate::store::RoleActorStore;

/// Statistics for every cache behind a [`CachingRoleActorStore`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RosterCacheStats {
    pub roles: CacheStats,
    pub default_actors: CacheStats,
    pub project_actors: CacheStats,
}

impl RosterCacheStats {
    /// Backing-store loads across all caches.
    pub fn total_misses(&self) -> u64 {
        self.roles.misses + self.default_actors.misses + self.project_actors.misses
    }
}

/// Read-through caching [`RoleActorStore`].
///
/// The backing store is injected; the facade is itself a `RoleActorStore`,
/// so it can stand in wherever a store is expected.
pub struct CachingRoleActorStore<S> {
    store: Arc<S>,
    config: CacheConfig,
    roles: AllRolesCache,
    default_actors: DefaultRoleActorsCache,
    project_actors: ProjectRoleActorsCache,
}

impl<S: RoleActorStore> CachingRoleActorStore<S> {
    /// Create a facade over `store`. Fails if `config` does not validate.
    pub fn new(store: Arc<S>, config: CacheConfig) -> RosterResult<Self> {
        config.validate()?;
        Ok(Self {
            store,
            roles: AllRolesCache::new(),
            default_actors: DefaultRoleActorsCache::new(config.cache_missing),
            project_actors: ProjectRoleActorsCache::new(config.cache_missing),
            config,
        })
    }

    /// Create a facade with the default configuration.
    pub fn with_defaults(store: Arc<S>) -> Self {
        Self {
            store,
            config: CacheConfig::default(),
            roles: AllRolesCache::new(),
            default_actors: DefaultRoleActorsCache::new(true),
            project_actors: ProjectRoleActorsCache::new(true),
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// The backing store this facade fronts.
    pub fn backing_store(&self) -> &S {
        &self.store
    }

    /// True if no other role uses `name`, ignoring case. Served from the
    /// role list cache.
    pub async fn is_role_name_unique(&self, name: &str) -> RosterResult<bool> {
        let roles = self.get_all_roles().await?;
        Ok(!roles.iter().any(|role| role.name.eq_ignore_ascii_case(name)))
    }

    /// Drop every cached entry. Loads in flight are discarded when they
    /// finish; results already handed out are unaffected.
    pub fn clear_caches(&self) -> RosterResult<()> {
        self.roles.clear()?;
        let defaults = self.default_actors.clear()?;
        let projects = self.project_actors.clear()?;
        tracing::info!(
            default_actor_entries = defaults,
            project_actor_entries = projects,
            "role and actor caches cleared"
        );
        Ok(())
    }

    pub fn stats(&self) -> RosterResult<RosterCacheStats> {
        Ok(RosterCacheStats {
            roles: self.roles.stats()?,
            default_actors: self.default_actors.stats()?,
            project_actors: self.project_actors.stats()?,
        })
    }

    /// Roles with a cached default-actor entry (absent sentinels included), sorted.
    pub fn default_actor_keys(&self) -> RosterResult<Vec<RoleId>> {
        let mut keys = self.default_actors.keys()?;
        keys.sort();
        Ok(keys)
    }

    /// Cached project-actor keys, sorted by role then project.
    pub fn project_actor_keys(&self) -> RosterResult<Vec<ProjectRoleKey>> {
        let mut keys = self.project_actors.keys()?;
        keys.sort();
        Ok(keys)
    }

    /// Whether the role list is currently cached.
    pub fn roles_cached(&self) -> RosterResult<bool> {
        self.roles.is_cached()
    }

    /// Run a backing-store load under the configured timeout.
    async fn bounded<T, F>(&self, operation: &'static str, load: F) -> RosterResult<T>
    where
        F: Future<Output = RosterResult<T>>,
    {
        let Some(limit) = self.config.load_timeout else {
            return load.await;
        };
        match tokio::time::timeout(limit, load).await {
            Ok(result) => result,
            Err(_) => {
                let timeout_ms = u64::try_from(limit.as_millis()).unwrap_or(u64::MAX);
                tracing::warn!(operation, timeout_ms, "backing store load timed out");
                Err(StorageError::Timeout {
                    operation,
                    timeout_ms,
                }
                .into())
            }
        }
    }
}

#[async_trait]
impl<S: RoleActorStore> RoleActorStore for CachingRoleActorStore<S> {
    // === Role Operations ===

    async fn get_all_roles(&self) -> RosterResult<Vec<Role>> {
        self.roles
            .get(|| self.bounded("get_all_roles", self.store.get_all_roles()))
            .await
    }

    async fn get_role(&self, id: RoleId) -> RosterResult<Option<Role>> {
        let roles = self.get_all_roles().await?;
        Ok(roles.into_iter().find(|role| role.id == id))
    }

    async fn get_role_by_name(&self, name: &str) -> RosterResult<Option<Role>> {
        let roles = self.get_all_roles().await?;
        Ok(roles.into_iter().find(|role| role.name == name))
    }

    async fn add_role(&self, role: NewRole) -> RosterResult<Role> {
        let added = self.store.add_role(role).await?;
        self.roles.clear()?;
        tracing::debug!(role_id = %added.id, name = %added.name, "role added");
        Ok(added)
    }

    async fn update_role(&self, role: &Role) -> RosterResult<Role> {
        let updated = self.store.update_role(role).await?;
        self.roles.clear()?;
        tracing::debug!(role_id = %updated.id, name = %updated.name, "role updated");
        Ok(updated)
    }

    async fn delete_role(&self, role: &Role) -> RosterResult<()> {
        self.store.delete_role(role).await?;
        self.roles.clear()?;
        self.default_actors.remove(role.id)?;
        let projects = self.project_actors.remove_role(role.id)?;
        tracing::debug!(
            role_id = %role.id,
            project_entries = projects,
            "role deleted, actor entries evicted"
        );
        Ok(())
    }

    // === Actor Operations ===

    async fn get_default_actors(&self, role_id: RoleId) -> RosterResult<Option<DefaultActors>> {
        self.default_actors
            .get(role_id, || {
                self.bounded("get_default_actors", self.store.get_default_actors(role_id))
            })
            .await
    }

    async fn get_project_actors(
        &self,
        role_id: RoleId,
        project_id: ProjectId,
    ) -> RosterResult<Option<ProjectActors>> {
        self.project_actors
            .get(role_id, project_id, || {
                self.bounded(
                    "get_project_actors",
                    self.store.get_project_actors(role_id, project_id),
                )
            })
            .await
    }

    async fn update_default_actors(&self, actors: &DefaultActors) -> RosterResult<()> {
        self.store.update_default_actors(actors).await?;
        self.default_actors.put(actors.clone())
    }

    async fn update_project_actors(&self, actors: &ProjectActors) -> RosterResult<()> {
        self.store.update_project_actors(actors).await?;
        self.project_actors.put(actors.clone())
    }

    async fn remove_actors_by_key_and_type(
        &self,
        key: &str,
        actor_type: &ActorType,
    ) -> RosterResult<()> {
        self.store
            .remove_actors_by_key_and_type(key, actor_type)
            .await?;
        self.default_actors.clear()?;
        self.project_actors.clear()?;
        tracing::debug!(key, actor_type = %actor_type, "actor removed, actor caches cleared");
        Ok(())
    }

    async fn remove_actors_by_project(&self, project_id: ProjectId) -> RosterResult<()> {
        self.store.remove_actors_by_project(project_id).await?;
        self.default_actors.clear()?;
        let projects = self.project_actors.remove_project(project_id)?;
        tracing::debug!(
            project_id = %project_id,
            project_entries = projects,
            "project actors removed"
        );
        Ok(())
    }

    async fn apply_default_roles_to_project(&self, project_id: ProjectId) -> RosterResult<()> {
        self.store.apply_default_roles_to_project(project_id).await?;
        self.project_actors.remove_project(project_id)?;
        Ok(())
    }

    async fn get_project_ids_containing_actor(
        &self,
        key: &str,
        actor_type: &ActorType,
    ) -> RosterResult<Vec<ProjectId>> {
        self.store
            .get_project_ids_containing_actor(key, actor_type)
            .await
    }
}
