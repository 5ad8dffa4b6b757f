//! Backing store trait for project roles and role actors.
//!
//! The backing store is authoritative and assumed slow. Nothing in this
//! trait caches; see [`CachingRoleActorStore`](crate::CachingRoleActorStore)
//! for the read-through layer that fronts it.

use ::async_trait::async_trait;
use roster_core::{
    ActorType, DefaultActors, NewRole, ProjectActors, ProjectId, Role, RoleId, RosterResult,
};

/// Async store for roles and their default and per-project actors.
#[async_trait]
pub trait RoleActorStore: Send + Sync {
    // ========================================================================
    // ROLE OPERATIONS
    // ========================================================================

    /// List every role, ordered by id.
    async fn get_all_roles(&self) -> RosterResult<Vec<Role>>;

    /// Get a role by ID.
    async fn get_role(&self, id: RoleId) -> RosterResult<Option<Role>>;

    /// Get a role by its exact name.
    async fn get_role_by_name(&self, name: &str) -> RosterResult<Option<Role>>;

    /// Create a role. The store assigns the id and returns the stored role.
    async fn add_role(&self, role: NewRole) -> RosterResult<Role>;

    /// Replace a role's name and description. Returns the stored role.
    async fn update_role(&self, role: &Role) -> RosterResult<Role>;

    /// Delete a role together with all of its actor sets.
    async fn delete_role(&self, role: &Role) -> RosterResult<()>;

    // ========================================================================
    // ACTOR OPERATIONS
    // ========================================================================

    /// Default actors of a role, `None` if the role has no default set.
    async fn get_default_actors(&self, role_id: RoleId) -> RosterResult<Option<DefaultActors>>;

    /// Actors of a role within a project, `None` if there is no set.
    async fn get_project_actors(
        &self,
        role_id: RoleId,
        project_id: ProjectId,
    ) -> RosterResult<Option<ProjectActors>>;

    /// Replace a role's default actor set.
    async fn update_default_actors(&self, actors: &DefaultActors) -> RosterResult<()>;

    /// Replace a role's actor set within one project.
    async fn update_project_actors(&self, actors: &ProjectActors) -> RosterResult<()>;

    /// Remove the actor identified by `key` and `actor_type` from every set.
    async fn remove_actors_by_key_and_type(
        &self,
        key: &str,
        actor_type: &ActorType,
    ) -> RosterResult<()>;

    /// Remove every actor set of a project.
    async fn remove_actors_by_project(&self, project_id: ProjectId) -> RosterResult<()>;

    /// Copy each role's default actors into the project's actor sets.
    async fn apply_default_roles_to_project(&self, project_id: ProjectId) -> RosterResult<()>;

    /// Projects having the actor in at least one role, sorted and de-duplicated.
    async fn get_project_ids_containing_actor(
        &self,
        key: &str,
        actor_type: &ActorType,
    ) -> RosterResult<Vec<ProjectId>>;
}
