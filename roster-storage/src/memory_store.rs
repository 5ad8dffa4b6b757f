//! In-memory authoritative store.
//!
//! Backs the cache in tests and small deployments. All tables live behind a
//! single lock so cascading deletes are atomic.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use ::async_trait::async_trait;
use roster_core::{
    ActorType, DefaultActors, NewRole, ProjectActors, ProjectId, Role, RoleId, RosterResult,
    StorageError,
};

use crate::store::RoleActorStore;

#[derive(Debug)]
struct Tables {
    next_role_id: i64,
    roles: BTreeMap<RoleId, Role>,
    default_actors: BTreeMap<RoleId, DefaultActors>,
    project_actors: BTreeMap<(RoleId, ProjectId), ProjectActors>,
}

impl Default for Tables {
    fn default() -> Self {
        Self {
            next_role_id: 1,
            roles: BTreeMap::new(),
            default_actors: BTreeMap::new(),
            project_actors: BTreeMap::new(),
        }
    }
}

impl Tables {
    /// Fails if another role already uses `name`, ignoring case.
    fn ensure_name_free(&self, name: &str, except: Option<RoleId>) -> RosterResult<()> {
        let taken = self
            .roles
            .values()
            .any(|role| Some(role.id) != except && role.name.eq_ignore_ascii_case(name));
        if taken {
            return Err(StorageError::DuplicateRoleName {
                name: name.to_string(),
            }
            .into());
        }
        Ok(())
    }

    fn ensure_role_exists(&self, id: RoleId) -> RosterResult<()> {
        if !self.roles.contains_key(&id) {
            return Err(StorageError::NotFound {
                entity: "role",
                id: id.get(),
            }
            .into());
        }
        Ok(())
    }
}

/// In-memory [`RoleActorStore`]. Clones share the same tables.
#[derive(Debug, Clone, Default)]
pub struct InMemoryRoleActorStore {
    tables: Arc<RwLock<Tables>>,
}

impl InMemoryRoleActorStore {
    /// Create an empty store. Role ids start at 1.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored roles.
    pub fn role_count(&self) -> RosterResult<usize> {
        Ok(self.read()?.roles.len())
    }

    /// Number of stored project actor sets.
    pub fn project_actor_set_count(&self) -> RosterResult<usize> {
        Ok(self.read()?.project_actors.len())
    }

    fn read(&self) -> RosterResult<RwLockReadGuard<'_, Tables>> {
        self.tables
            .read()
            .map_err(|_| StorageError::LockPoisoned.into())
    }

    fn write(&self) -> RosterResult<RwLockWriteGuard<'_, Tables>> {
        self.tables
            .write()
            .map_err(|_| StorageError::LockPoisoned.into())
    }
}

#[async_trait]
impl RoleActorStore for InMemoryRoleActorStore {
    // === Role Operations ===

    async fn get_all_roles(&self) -> RosterResult<Vec<Role>> {
        Ok(self.read()?.roles.values().cloned().collect())
    }

    async fn get_role(&self, id: RoleId) -> RosterResult<Option<Role>> {
        Ok(self.read()?.roles.get(&id).cloned())
    }

    async fn get_role_by_name(&self, name: &str) -> RosterResult<Option<Role>> {
        Ok(self
            .read()?
            .roles
            .values()
            .find(|role| role.name == name)
            .cloned())
    }

    async fn add_role(&self, role: NewRole) -> RosterResult<Role> {
        let mut tables = self.write()?;
        tables.ensure_name_free(&role.name, None)?;

        let id = RoleId::new(tables.next_role_id);
        tables.next_role_id += 1;

        let stored = role.with_id(id);
        tables.roles.insert(id, stored.clone());
        Ok(stored)
    }

    async fn update_role(&self, role: &Role) -> RosterResult<Role> {
        let mut tables = self.write()?;
        tables.ensure_role_exists(role.id)?;
        tables.ensure_name_free(&role.name, Some(role.id))?;

        tables.roles.insert(role.id, role.clone());
        Ok(role.clone())
    }

    async fn delete_role(&self, role: &Role) -> RosterResult<()> {
        let mut tables = self.write()?;
        tables.ensure_role_exists(role.id)?;

        tables.roles.remove(&role.id);
        tables.default_actors.remove(&role.id);
        tables
            .project_actors
            .retain(|(role_id, _), _| *role_id != role.id);
        Ok(())
    }

    // === Actor Operations ===

    async fn get_default_actors(&self, role_id: RoleId) -> RosterResult<Option<DefaultActors>> {
        Ok(self.read()?.default_actors.get(&role_id).cloned())
    }

    async fn get_project_actors(
        &self,
        role_id: RoleId,
        project_id: ProjectId,
    ) -> RosterResult<Option<ProjectActors>> {
        Ok(self
            .read()?
            .project_actors
            .get(&(role_id, project_id))
            .cloned())
    }

    async fn update_default_actors(&self, actors: &DefaultActors) -> RosterResult<()> {
        self.write()?
            .default_actors
            .insert(actors.role_id(), actors.clone());
        Ok(())
    }

    async fn update_project_actors(&self, actors: &ProjectActors) -> RosterResult<()> {
        self.write()?
            .project_actors
            .insert((actors.role_id(), actors.project_id()), actors.clone());
        Ok(())
    }

    async fn remove_actors_by_key_and_type(
        &self,
        key: &str,
        actor_type: &ActorType,
    ) -> RosterResult<()> {
        let mut tables = self.write()?;
        for actors in tables.default_actors.values_mut() {
            *actors = actors.without_matching(key, actor_type);
        }
        for actors in tables.project_actors.values_mut() {
            *actors = actors.without_matching(key, actor_type);
        }
        Ok(())
    }

    async fn remove_actors_by_project(&self, project_id: ProjectId) -> RosterResult<()> {
        self.write()?
            .project_actors
            .retain(|(_, project), _| *project != project_id);
        Ok(())
    }

    async fn apply_default_roles_to_project(&self, project_id: ProjectId) -> RosterResult<()> {
        let mut tables = self.write()?;
        let copies: Vec<ProjectActors> = tables
            .default_actors
            .values()
            .map(|defaults| ProjectActors::from_defaults(defaults, project_id))
            .collect();
        for actors in copies {
            tables
                .project_actors
                .insert((actors.role_id(), project_id), actors);
        }
        Ok(())
    }

    async fn get_project_ids_containing_actor(
        &self,
        key: &str,
        actor_type: &ActorType,
    ) -> RosterResult<Vec<ProjectId>> {
        let tables = self.read()?;
        let projects: BTreeSet<ProjectId> = tables
            .project_actors
            .values()
            .filter(|set| set.actors().iter().any(|a| a.matches(key, actor_type)))
            .map(|set| set.project_id())
            .collect();
        Ok(projects.into_iter().collect())
    }
}
