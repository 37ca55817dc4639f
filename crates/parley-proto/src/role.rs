//! Participant roles within a room.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

/// Permission tier of a participant.
///
/// Ordered by privilege: `Member < CoLeader < Leader`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Role {
    /// Regular participant.
    #[default]
    Member,
    /// Moderator appointed by the leader.
    #[serde(alias = "coLeader", alias = "coleader")]
    CoLeader,
    /// Room owner.
    Leader,
}

impl Role {
    /// Stable lowercase name, as used on the wire.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Member => "member",
            Self::CoLeader => "co-leader",
            Self::Leader => "leader",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Member => "Member",
            Self::CoLeader => "Co-Leader",
            Self::Leader => "Leader",
        };
        f.write_str(label)
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "member" => Ok(Self::Member),
            "co-leader" | "coleader" | "co_leader" => Ok(Self::CoLeader),
            "leader" => Ok(Self::Leader),
            other => Err(format!("unknown role: {other}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roles_are_ordered_by_privilege() {
        assert!(Role::Member < Role::CoLeader);
        assert!(Role::CoLeader < Role::Leader);
    }

    #[test]
    fn parse_accepts_common_spellings() {
        assert_eq!("Leader".parse::<Role>(), Ok(Role::Leader));
        assert_eq!("co-leader".parse::<Role>(), Ok(Role::CoLeader));
        assert_eq!("coleader".parse::<Role>(), Ok(Role::CoLeader));
        assert!("admin".parse::<Role>().is_err());
    }

    #[test]
    fn wire_name_round_trips() {
        for role in [Role::Member, Role::CoLeader, Role::Leader] {
            let json = serde_json::to_string(&role).unwrap();
            assert_eq!(json, format!("\"{}\"", role.as_str()));
            assert_eq!(serde_json::from_str::<Role>(&json).unwrap(), role);
        }
    }
}
