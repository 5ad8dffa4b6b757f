//! ROSTER Test Utilities
//!
//! Centralized test infrastructure for the ROSTER workspace:
//! - Instrumented backing store (call counting, latency, gates, failures)
//! - Proptest generators for roles, actors and keys
//! - Test fixtures for the default role set
//! - Custom assertions for ROSTER errors

// Re-export storage types from their source crate
pub use roster_storage::{
    CachingRoleActorStore, InMemoryRoleActorStore, ProjectRoleKey, RoleActorStore,
    RosterCacheStats,
};

// Re-export core types for convenience
pub use roster_core::{
    ActorError, ActorType, CacheConfig, DefaultActors, NewRole, ProjectActors, ProjectId, Role,
    RoleActor, RoleId, RosterError, RosterResult, StorageError,
};

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;

// ============================================================================
// TRACING
// ============================================================================

/// Install a test subscriber honouring `RUST_LOG`. Safe to call from every
/// test; only the first call installs anything.
pub fn init_test_tracing() {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("roster_storage=debug,warn"));

    let _ = tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_test_writer())
        .try_init();
}

// ============================================================================
// GATE
// ============================================================================

/// One-shot rendezvous between a backing-store call and a test.
///
/// The store calls [`pass`](Gate::pass), which announces arrival and parks
/// until the test calls [`open`](Gate::open). Once open, later passes go
/// straight through.
#[derive(Debug, Default)]
pub struct Gate {
    arrived: Notify,
    proceed: Notify,
    opened: AtomicBool,
}

impl Gate {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub async fn pass(&self) {
        self.arrived.notify_one();
        if !self.opened.load(Ordering::SeqCst) {
            self.proceed.notified().await;
        }
    }

    /// Wait until a call has reached the gate.
    pub async fn wait_arrival(&self) {
        self.arrived.notified().await;
    }

    pub fn open(&self) {
        self.opened.store(true, Ordering::SeqCst);
        self.proceed.notify_one();
    }
}

// ============================================================================
// INSTRUMENTED STORE
// ============================================================================

/// Wraps a backing store and records what the cache asks of it.
///
/// Reads can be slowed down, project reads can be held at a [`Gate`] after
/// fetching their value, and any operation can be made to fail.
#[derive(Debug)]
pub struct InstrumentedStore<S = InMemoryRoleActorStore> {
    inner: S,
    calls: Mutex<HashMap<&'static str, usize>>,
    failures: Mutex<HashMap<&'static str, usize>>,
    read_latency: Option<Duration>,
    project_read_gate: Option<Arc<Gate>>,
}

impl<S: RoleActorStore> InstrumentedStore<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            calls: Mutex::new(HashMap::new()),
            failures: Mutex::new(HashMap::new()),
            read_latency: None,
            project_read_gate: None,
        }
    }

    /// Delay every read by `latency`.
    pub fn with_read_latency(mut self, latency: Duration) -> Self {
        self.read_latency = Some(latency);
        self
    }

    /// Hold `get_project_actors` at `gate` after it has read its value, so
    /// the value it returns is whatever the store held before the gate.
    pub fn with_project_read_gate(mut self, gate: Arc<Gate>) -> Self {
        self.project_read_gate = Some(gate);
        self
    }

    /// Make the next `count` calls of `operation` fail with a backend error.
    pub fn fail_next(&self, operation: &'static str, count: usize) {
        if let Ok(mut failures) = self.failures.lock() {
            *failures.entry(operation).or_insert(0) += count;
        }
    }

    /// Number of calls of `operation` so far.
    pub fn calls(&self, operation: &str) -> usize {
        self.calls
            .lock()
            .map(|calls| calls.get(operation).copied().unwrap_or(0))
            .unwrap_or(0)
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    fn record(&self, operation: &'static str) -> RosterResult<()> {
        *self
            .calls
            .lock()
            .map_err(|_| StorageError::LockPoisoned)?
            .entry(operation)
            .or_insert(0) += 1;

        let mut failures = self
            .failures
            .lock()
            .map_err(|_| StorageError::LockPoisoned)?;
        if let Some(remaining) = failures.get_mut(operation).filter(|n| **n > 0) {
            *remaining -= 1;
            tracing::debug!(operation, "injected backing store failure");
            return Err(RosterError::backend(format!("injected failure in {operation}")));
        }
        Ok(())
    }

    /// Latency first, so an injected read failure also takes the full latency.
    async fn before_read(&self, operation: &'static str) -> RosterResult<()> {
        if let Some(latency) = self.read_latency {
            tokio::time::sleep(latency).await;
        }
        self.record(operation)
    }
}

#[async_trait]
impl<S: RoleActorStore> RoleActorStore for InstrumentedStore<S> {
    async fn get_all_roles(&self) -> RosterResult<Vec<Role>> {
        self.before_read("get_all_roles").await?;
        self.inner.get_all_roles().await
    }

    async fn get_role(&self, id: RoleId) -> RosterResult<Option<Role>> {
        self.before_read("get_role").await?;
        self.inner.get_role(id).await
    }

    async fn get_role_by_name(&self, name: &str) -> RosterResult<Option<Role>> {
        self.before_read("get_role_by_name").await?;
        self.inner.get_role_by_name(name).await
    }

    async fn add_role(&self, role: NewRole) -> RosterResult<Role> {
        self.record("add_role")?;
        self.inner.add_role(role).await
    }

    async fn update_role(&self, role: &Role) -> RosterResult<Role> {
        self.record("update_role")?;
        self.inner.update_role(role).await
    }

    async fn delete_role(&self, role: &Role) -> RosterResult<()> {
        self.record("delete_role")?;
        self.inner.delete_role(role).await
    }

    async fn get_default_actors(&self, role_id: RoleId) -> RosterResult<Option<DefaultActors>> {
        self.before_read("get_default_actors").await?;
        self.inner.get_default_actors(role_id).await
    }

    async fn get_project_actors(
        &self,
        role_id: RoleId,
        project_id: ProjectId,
    ) -> RosterResult<Option<ProjectActors>> {
        self.before_read("get_project_actors").await?;
        let found = self.inner.get_project_actors(role_id, project_id).await?;
        if let Some(gate) = &self.project_read_gate {
            gate.pass().await;
        }
        Ok(found)
    }

    async fn update_default_actors(&self, actors: &DefaultActors) -> RosterResult<()> {
        self.record("update_default_actors")?;
        self.inner.update_default_actors(actors).await
    }

    async fn update_project_actors(&self, actors: &ProjectActors) -> RosterResult<()> {
        self.record("update_project_actors")?;
        self.inner.update_project_actors(actors).await
    }

    async fn remove_actors_by_key_and_type(
        &self,
        key: &str,
        actor_type: &ActorType,
    ) -> RosterResult<()> {
        self.record("remove_actors_by_key_and_type")?;
        self.inner.remove_actors_by_key_and_type(key, actor_type).await
    }

    async fn remove_actors_by_project(&self, project_id: ProjectId) -> RosterResult<()> {
        self.record("remove_actors_by_project")?;
        self.inner.remove_actors_by_project(project_id).await
    }

    async fn apply_default_roles_to_project(&self, project_id: ProjectId) -> RosterResult<()> {
        self.record("apply_default_roles_to_project")?;
        self.inner.apply_default_roles_to_project(project_id).await
    }

    async fn get_project_ids_containing_actor(
        &self,
        key: &str,
        actor_type: &ActorType,
    ) -> RosterResult<Vec<ProjectId>> {
        self.before_read("get_project_ids_containing_actor").await?;
        self.inner
            .get_project_ids_containing_actor(key, actor_type)
            .await
    }
}

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    //! Proptest strategies for generating ROSTER types.

    use super::*;
    use proptest::prelude::*;

    // === Identity Type Generators ===

    pub fn arb_role_id() -> impl Strategy<Value = RoleId> {
        (1i64..10_000).prop_map(RoleId::new)
    }

    pub fn arb_project_id() -> impl Strategy<Value = ProjectId> {
        (10_000i64..20_000).prop_map(ProjectId::new)
    }

    pub fn arb_project_role_key() -> impl Strategy<Value = ProjectRoleKey> {
        (arb_role_id(), arb_project_id()).prop_map(|(r, p)| ProjectRoleKey::new(r, p))
    }

    // === Actor Generators ===

    pub fn arb_actor_type() -> impl Strategy<Value = ActorType> {
        prop_oneof![
            3 => Just(ActorType::User),
            3 => Just(ActorType::Group),
            1 => "[a-z]{3,10}-role-actor".prop_map(ActorType::Other),
        ]
    }

    pub fn arb_role_actor() -> impl Strategy<Value = RoleActor> {
        (arb_actor_type(), "[a-z][a-z0-9._-]{0,15}")
            .prop_map(|(actor_type, parameter)| RoleActor::new(actor_type, parameter))
    }

    pub fn arb_actors() -> impl Strategy<Value = Vec<RoleActor>> {
        prop::collection::vec(arb_role_actor(), 0..8)
    }

    pub fn arb_default_actors() -> impl Strategy<Value = DefaultActors> {
        (arb_role_id(), arb_actors()).prop_map(|(role_id, actors)| DefaultActors::new(role_id, actors))
    }

    pub fn arb_project_actors() -> impl Strategy<Value = ProjectActors> {
        (arb_role_id(), arb_project_id(), arb_actors()).prop_map(|(role_id, project_id, actors)| {
            ProjectActors::new(role_id, project_id, actors)
        })
    }

    // === Role Generators ===

    pub fn arb_new_role() -> impl Strategy<Value = NewRole> {
        ("[A-Z][a-z]{2,12}( [A-Z][a-z]{2,12})?", "[a-z ]{0,40}")
            .prop_map(|(name, description)| NewRole::new(name, description))
    }
}

// ============================================================================
// TEST FIXTURES
// ============================================================================

pub mod fixtures {
    //! Pre-built test fixtures for common testing scenarios.

    use super::*;

    pub const PROJECT_HOMOSAPIEN: ProjectId = ProjectId::new(10_000);
    pub const PROJECT_MONKEY: ProjectId = ProjectId::new(10_001);

    fn default_new_roles() -> [NewRole; 3] {
        [
            NewRole::new(
                "Developers",
                "A project role that represents developers in a project",
            ),
            NewRole::new("QA", "A project role that represents QA in a project"),
            NewRole::new(
                "Project Managers",
                "A project role that represents project managers in a project",
            ),
        ]
    }

    /// The Developers role as stored by [`seeded_store`] (id 1).
    pub fn developers() -> Role {
        default_roles().remove(0)
    }

    /// The QA role as stored by [`seeded_store`] (id 2).
    pub fn qa() -> Role {
        default_roles().remove(1)
    }

    /// The Project Managers role as stored by [`seeded_store`] (id 3).
    pub fn project_managers() -> Role {
        default_roles().remove(2)
    }

    /// The three default roles with the ids a fresh store assigns them.
    pub fn default_roles() -> Vec<Role> {
        default_new_roles()
            .into_iter()
            .zip(1i64..)
            .map(|(new_role, id)| new_role.with_id(RoleId::new(id)))
            .collect()
    }

    /// A role not in the default set.
    pub fn security() -> NewRole {
        NewRole::new(
            "Security",
            "A project role that represents security reviewers in a project",
        )
    }

    pub fn fred() -> RoleActor {
        RoleActor::user("fred")
    }

    pub fn barney() -> RoleActor {
        RoleActor::user("barney")
    }

    pub fn developers_group() -> RoleActor {
        RoleActor::group("jira-developers")
    }

    /// In-memory store holding the three default roles.
    pub async fn seeded_store() -> RosterResult<InMemoryRoleActorStore> {
        let store = InMemoryRoleActorStore::new();
        for new_role in default_new_roles() {
            store.add_role(new_role).await?;
        }
        Ok(store)
    }

    /// Instrumented store holding the three default roles.
    pub async fn seeded_instrumented() -> RosterResult<InstrumentedStore> {
        Ok(InstrumentedStore::new(seeded_store().await?))
    }
}

// ============================================================================
// CUSTOM ASSERTIONS
// ============================================================================

pub mod assertions {
    //! Custom assertion functions for ROSTER-specific validation.

    use super::*;

    /// Assert that a RosterResult is a Storage error.
    #[track_caller]
    pub fn assert_storage_error<T: std::fmt::Debug>(result: &RosterResult<T>) {
        match result {
            Err(RosterError::Storage(_)) => {}
            other => panic!("Expected Storage error, got: {:?}", other),
        }
    }

    /// Assert that a RosterResult is a load timeout.
    #[track_caller]
    pub fn assert_timeout<T: std::fmt::Debug>(result: &RosterResult<T>, operation: &str) {
        match result {
            Err(RosterError::Storage(StorageError::Timeout { operation: op, .. })) => {
                assert_eq!(*op, operation, "Wrong operation in Timeout error");
            }
            other => panic!("Expected Timeout for {}, got: {:?}", operation, other),
        }
    }

    /// Assert that a RosterResult is a RoleActorDoesNotExist error.
    #[track_caller]
    pub fn assert_actor_missing<T: std::fmt::Debug>(result: &RosterResult<T>) {
        match result {
            Err(RosterError::Actor(ActorError::RoleActorDoesNotExist { .. })) => {}
            other => panic!("Expected RoleActorDoesNotExist, got: {:?}", other),
        }
    }
}
