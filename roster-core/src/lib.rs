//! ROSTER Core - Role and Actor Types
//!
//! Pure data structures shared by the storage and cache layers. Every type
//! here is an immutable value: "mutating" operations return a new value and
//! never touch the receiver, so nothing handed out by a cache can alias its
//! internals.

pub mod actor;
pub mod config;
pub mod error;
pub mod identity;
pub mod role;

pub use actor::{ActorType, DefaultActors, ProjectActors, RoleActor};
pub use config::CacheConfig;
pub use error::{ActorError, ConfigError, RosterError, RosterResult, StorageError};
pub use identity::{ProjectId, RoleId};
pub use role::{NewRole, Role};
