//! Read-through caches for roles and role actors.
//!
//! The caches sit in front of a slow, authoritative [`RoleActorStore`] and
//! guarantee three things under concurrency:
//!
//! - **No stampedes.** Concurrent readers of the same missing key share one
//!   backing fetch ([`KeyedCache::get_or_load`]).
//! - **Snapshot safety.** Every value handed out is an owned copy; clearing
//!   or repopulating a cache never disturbs a caller's earlier result.
//! - **Writes beat stale reads.** A fetch that started before a write and
//!   finishes after it loses a generation check ([`VersionedEntry`]) and is
//!   discarded.
//!
//! # Layout
//!
//! ```text
//! AllRolesCache           KeyedCache<(), Vec<Role>>
//! DefaultRoleActorsCache  KeyedCache<RoleId, Option<DefaultActors>>
//! ProjectRoleActorsCache  KeyedCache<ProjectRoleKey, Option<ProjectActors>, RoleProjectIndex>
//! ```
//!
//! [`RoleActorStore`]: crate::RoleActorStore

pub mod actors;
pub mod keyed;
pub mod project_key;
pub mod roles;
pub mod stats;
pub mod versioned;

pub use actors::{DefaultRoleActorsCache, ProjectRoleActorsCache, RoleProjectIndex};
pub use keyed::{KeyIndex, KeyedCache, NoIndex};
pub use project_key::ProjectRoleKey;
pub use roles::AllRolesCache;
pub use stats::CacheStats;
pub use versioned::VersionedEntry;
