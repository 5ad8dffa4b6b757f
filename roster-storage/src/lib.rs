//! ROSTER Storage - Backing Store Trait and Read-Through Caches
//!
//! Defines the [`RoleActorStore`] abstraction, an in-memory authoritative
//! implementation, and [`CachingRoleActorStore`], the read-through facade
//! that keeps role and role-actor lookups off the backing store.

pub mod cache;
pub mod caching_store;
pub mod memory_store;
pub mod store;

pub use cache::{
    AllRolesCache, CacheStats, DefaultRoleActorsCache, KeyIndex, KeyedCache, NoIndex,
    ProjectRoleActorsCache, ProjectRoleKey, RoleProjectIndex, VersionedEntry,
};
pub use caching_store::{CachingRoleActorStore, RosterCacheStats};
pub use memory_store::InMemoryRoleActorStore;
pub use store::RoleActorStore;
