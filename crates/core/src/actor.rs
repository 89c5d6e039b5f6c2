//! Actor identity and laboratory roles.
//!
//! Authentication and account management live outside this crate; the
//! workflow engine only needs to know who is acting and what role they hold.

use pcw_types::NonEmptyText;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// The role an actor holds in the laboratory.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Admin,
    Professor,
    SeniorStudent,
    Student,
    LabStaff,
}

impl Role {
    pub const fn as_str(self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Professor => "professor",
            Role::SeniorStudent => "senior_student",
            Role::Student => "student",
            Role::LabStaff => "lab_staff",
        }
    }

    /// Parses a role from its wire spelling.
    pub fn parse(value: &str) -> Option<Role> {
        match value {
            "admin" => Some(Role::Admin),
            "professor" => Some(Role::Professor),
            "senior_student" => Some(Role::SeniorStudent),
            "student" => Some(Role::Student),
            "lab_staff" => Some(Role::LabStaff),
            _ => None,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An actor performing a workflow operation.
///
/// The email address is used for the commit signature of the versioned case
/// repository; it is not interpreted by the engine.
#[derive(Clone, Debug)]
pub struct Actor {
    pub id: Uuid,
    pub name: NonEmptyText,
    pub email: NonEmptyText,
    pub role: Role,
}

impl Actor {
    /// Returns the stored reference form of this actor.
    pub fn to_ref(&self) -> ActorRef {
        ActorRef {
            id: self.id,
            name: self.name.as_str().to_owned(),
        }
    }
}

/// A stored reference to an actor, embedded in case and audit records.
///
/// The display name is denormalised so records stay legible after the
/// originating account is deleted.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ActorRef {
    pub id: Uuid,
    pub name: String,
}

impl From<&Actor> for ActorRef {
    fn from(actor: &Actor) -> Self {
        actor.to_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_wire_spellings_round_trip() {
        for role in [
            Role::Admin,
            Role::Professor,
            Role::SeniorStudent,
            Role::Student,
            Role::LabStaff,
        ] {
            assert_eq!(Role::parse(role.as_str()), Some(role));
        }
    }

    #[test]
    fn role_parse_rejects_unknown() {
        assert_eq!(Role::parse("PROFESSOR"), None);
        assert_eq!(Role::parse("intern"), None);
    }

    #[test]
    fn actor_ref_captures_identity_and_name() {
        let actor = Actor {
            id: Uuid::new_v4(),
            name: NonEmptyText::new("Ana Lima").expect("valid name"),
            email: NonEmptyText::new("ana@lab.example").expect("valid email"),
            role: Role::Student,
        };

        let reference = actor.to_ref();
        assert_eq!(reference.id, actor.id);
        assert_eq!(reference.name, "Ana Lima");
    }
}
