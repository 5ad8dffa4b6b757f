//! Role actors and the actor sets attached to roles.
//!
//! An actor is a principal-resolving capability (a user or a group reference).
//! Nothing in this crate resolves principals: actors are opaque values that
//! are compared, stored and copied.
//!
//! [`DefaultActors`] and [`ProjectActors`] are immutable. Adding or removing
//! an actor produces a new set:
//!
//! ```text
//! DefaultActors{Devs: [fred]} ── with_actor(barney) ──→ DefaultActors{Devs: [barney, fred]}
//!                             ── without_actor(wilma) ──→ Err(RoleActorDoesNotExist)
//! ```

use crate::{ActorError, ProjectId, RoleId, RosterResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

// ============================================================================
// ACTOR TYPE
// ============================================================================

/// Kind of principal an actor refers to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ActorType {
    User,
    Group,
    /// Pluggable actor kinds contributed outside the core set.
    Other(String),
}

impl ActorType {
    pub fn as_str(&self) -> &str {
        match self {
            ActorType::User => "user",
            ActorType::Group => "group",
            ActorType::Other(name) => name,
        }
    }
}

impl fmt::Display for ActorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error when parsing an empty actor type string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActorTypeParseError;

impl fmt::Display for ActorTypeParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Actor type must not be empty")
    }
}

impl std::error::Error for ActorTypeParseError {}

impl FromStr for ActorType {
    type Err = ActorTypeParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        match trimmed.to_lowercase().as_str() {
            "" => Err(ActorTypeParseError),
            "user" => Ok(ActorType::User),
            "group" => Ok(ActorType::Group),
            _ => Ok(ActorType::Other(trimmed.to_string())),
        }
    }
}

// ============================================================================
// ROLE ACTOR
// ============================================================================

/// A single actor: its kind plus the key identifying the principal
/// (user name, group name, ...).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RoleActor {
    pub actor_type: ActorType,
    pub parameter: String,
}

impl RoleActor {
    pub fn new(actor_type: ActorType, parameter: impl Into<String>) -> Self {
        Self {
            actor_type,
            parameter: parameter.into(),
        }
    }

    pub fn user(name: impl Into<String>) -> Self {
        Self::new(ActorType::User, name)
    }

    pub fn group(name: impl Into<String>) -> Self {
        Self::new(ActorType::Group, name)
    }

    /// True if this actor has the given key and type.
    pub fn matches(&self, parameter: &str, actor_type: &ActorType) -> bool {
        self.parameter == parameter && &self.actor_type == actor_type
    }

    fn missing(&self) -> ActorError {
        ActorError::RoleActorDoesNotExist {
            actor_type: self.actor_type.to_string(),
            parameter: self.parameter.clone(),
        }
    }
}

impl fmt::Display for RoleActor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.actor_type, self.parameter)
    }
}

// ============================================================================
// ACTOR SETS
// ============================================================================

/// Actors applied to a role when a project has no explicit override.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DefaultActors {
    role_id: RoleId,
    actors: BTreeSet<RoleActor>,
}

impl DefaultActors {
    pub fn new(role_id: RoleId, actors: impl IntoIterator<Item = RoleActor>) -> Self {
        Self {
            role_id,
            actors: actors.into_iter().collect(),
        }
    }

    pub fn empty(role_id: RoleId) -> Self {
        Self::new(role_id, [])
    }

    pub fn role_id(&self) -> RoleId {
        self.role_id
    }

    pub fn actors(&self) -> &BTreeSet<RoleActor> {
        &self.actors
    }

    pub fn contains(&self, actor: &RoleActor) -> bool {
        self.actors.contains(actor)
    }

    pub fn len(&self) -> usize {
        self.actors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actors.is_empty()
    }

    /// New set with `actor` added. Adding an actor already present is a no-op.
    pub fn with_actor(&self, actor: RoleActor) -> Self {
        let mut actors = self.actors.clone();
        actors.insert(actor);
        Self {
            role_id: self.role_id,
            actors,
        }
    }

    /// New set with all of `actors` added.
    pub fn with_actors(&self, actors: impl IntoIterator<Item = RoleActor>) -> Self {
        let mut merged = self.actors.clone();
        merged.extend(actors);
        Self {
            role_id: self.role_id,
            actors: merged,
        }
    }

    /// New set without `actor`.
    ///
    /// Fails with [`ActorError::RoleActorDoesNotExist`] if the actor is not
    /// in this set.
    pub fn without_actor(&self, actor: &RoleActor) -> RosterResult<Self> {
        if !self.actors.contains(actor) {
            return Err(actor.missing().into());
        }
        let mut actors = self.actors.clone();
        actors.remove(actor);
        Ok(Self {
            role_id: self.role_id,
            actors,
        })
    }

    /// New set without any actor matching the key and type.
    pub fn without_matching(&self, parameter: &str, actor_type: &ActorType) -> Self {
        Self {
            role_id: self.role_id,
            actors: self
                .actors
                .iter()
                .filter(|a| !a.matches(parameter, actor_type))
                .cloned()
                .collect(),
        }
    }
}

/// Actors applied to a role within one specific project.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProjectActors {
    role_id: RoleId,
    project_id: ProjectId,
    actors: BTreeSet<RoleActor>,
}

impl ProjectActors {
    pub fn new(
        role_id: RoleId,
        project_id: ProjectId,
        actors: impl IntoIterator<Item = RoleActor>,
    ) -> Self {
        Self {
            role_id,
            project_id,
            actors: actors.into_iter().collect(),
        }
    }

    pub fn empty(role_id: RoleId, project_id: ProjectId) -> Self {
        Self::new(role_id, project_id, [])
    }

    /// Copy a role's default actors into a project.
    pub fn from_defaults(defaults: &DefaultActors, project_id: ProjectId) -> Self {
        Self {
            role_id: defaults.role_id,
            project_id,
            actors: defaults.actors.clone(),
        }
    }

    pub fn role_id(&self) -> RoleId {
        self.role_id
    }

    pub fn project_id(&self) -> ProjectId {
        self.project_id
    }

    pub fn actors(&self) -> &BTreeSet<RoleActor> {
        &self.actors
    }

    pub fn contains(&self, actor: &RoleActor) -> bool {
        self.actors.contains(actor)
    }

    pub fn len(&self) -> usize {
        self.actors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actors.is_empty()
    }

    pub fn with_actor(&self, actor: RoleActor) -> Self {
        let mut actors = self.actors.clone();
        actors.insert(actor);
        Self {
            role_id: self.role_id,
            project_id: self.project_id,
            actors,
        }
    }

    pub fn with_actors(&self, actors: impl IntoIterator<Item = RoleActor>) -> Self {
        let mut merged = self.actors.clone();
        merged.extend(actors);
        Self {
            role_id: self.role_id,
            project_id: self.project_id,
            actors: merged,
        }
    }

    /// New set without `actor`; fails if the actor is not a member.
    pub fn without_actor(&self, actor: &RoleActor) -> RosterResult<Self> {
        if !self.actors.contains(actor) {
            return Err(actor.missing().into());
        }
        let mut actors = self.actors.clone();
        actors.remove(actor);
        Ok(Self {
            role_id: self.role_id,
            project_id: self.project_id,
            actors,
        })
    }

    pub fn without_matching(&self, parameter: &str, actor_type: &ActorType) -> Self {
        Self {
            role_id: self.role_id,
            project_id: self.project_id,
            actors: self
                .actors
                .iter()
                .filter(|a| !a.matches(parameter, actor_type))
                .cloned()
                .collect(),
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::RosterError;

    fn devs() -> RoleId {
        RoleId::new(1)
    }

    #[test]
    fn test_actor_type_parse() {
        assert_eq!("user".parse::<ActorType>().unwrap(), ActorType::User);
        assert_eq!("GROUP".parse::<ActorType>().unwrap(), ActorType::Group);
        assert_eq!(
            "test-type".parse::<ActorType>().unwrap(),
            ActorType::Other("test-type".to_string())
        );
        assert!("  ".parse::<ActorType>().is_err());
    }

    #[test]
    fn test_actor_type_display_roundtrip() {
        for ty in [ActorType::User, ActorType::Group, ActorType::Other("robot".into())] {
            assert_eq!(ty.to_string().parse::<ActorType>().unwrap(), ty);
        }
    }

    #[test]
    fn test_with_actor_leaves_original_untouched() {
        let original = DefaultActors::new(devs(), [RoleActor::user("fred")]);
        let grown = original.with_actor(RoleActor::user("barney"));

        assert_eq!(original.len(), 1);
        assert_eq!(grown.len(), 2);
        assert!(grown.contains(&RoleActor::user("fred")));
        assert!(grown.contains(&RoleActor::user("barney")));
    }

    #[test]
    fn test_without_missing_actor_fails() {
        let actors = ProjectActors::new(devs(), ProjectId::new(1), [RoleActor::user("fred")]);
        let err = actors.without_actor(&RoleActor::user("wilma")).unwrap_err();

        assert_eq!(
            err,
            RosterError::Actor(ActorError::RoleActorDoesNotExist {
                actor_type: "user".to_string(),
                parameter: "wilma".to_string(),
            })
        );
    }

    #[test]
    fn test_without_actor_shifts_set() {
        let actors = ProjectActors::new(
            devs(),
            ProjectId::new(1),
            [RoleActor::user("test 1"), RoleActor::user("test 2")],
        );
        let shifted = actors
            .without_actor(&RoleActor::user("test 2"))
            .unwrap()
            .with_actor(RoleActor::user("test 3"));

        let names: Vec<_> = shifted.actors().iter().map(|a| a.parameter.as_str()).collect();
        assert_eq!(names, vec!["test 1", "test 3"]);
    }

    #[test]
    fn test_without_matching_ignores_other_types() {
        let actors = DefaultActors::new(
            devs(),
            [RoleActor::user("admins"), RoleActor::group("admins")],
        );
        let pruned = actors.without_matching("admins", &ActorType::Group);
        assert_eq!(pruned.len(), 1);
        assert!(pruned.contains(&RoleActor::user("admins")));
    }

    #[test]
    fn test_from_defaults_copies_actors() {
        let defaults = DefaultActors::new(devs(), [RoleActor::group("jira-developers")]);
        let project = ProjectActors::from_defaults(&defaults, ProjectId::new(10));

        assert_eq!(project.role_id(), devs());
        assert_eq!(project.project_id(), ProjectId::new(10));
        assert_eq!(project.actors(), defaults.actors());
    }
}
