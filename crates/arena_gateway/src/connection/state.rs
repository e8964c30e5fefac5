//! Connection lifecycle states.

use std::fmt;
use std::str::FromStr;

/// Where a connection is in its lifecycle.
///
/// States only move forward: `Unregistered -> Registered -> Joined`, and
/// every state may end in `Closed`, which is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    Unregistered,
    Registered,
    Joined,
    Closed,
}

impl ConnectionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionState::Unregistered => "unregistered",
            ConnectionState::Registered => "registered",
            ConnectionState::Joined => "joined",
            ConnectionState::Closed => "closed",
        }
    }

    /// Whether moving from `self` to `next` is a legal transition.
    pub fn can_transition_to(&self, next: ConnectionState) -> bool {
        use ConnectionState::*;
        matches!(
            (self, next),
            (Unregistered, Registered) | (Registered, Joined) | (_, Closed)
        )
    }

    pub fn is_terminal(&self) -> bool {
        *self == ConnectionState::Closed
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown connection state '{0}'")]
pub struct UnknownState(pub String);

impl FromStr for ConnectionState {
    type Err = UnknownState;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "unregistered" => Ok(ConnectionState::Unregistered),
            "registered" => Ok(ConnectionState::Registered),
            "joined" => Ok(ConnectionState::Joined),
            "closed" => Ok(ConnectionState::Closed),
            _ => Err(UnknownState(s.to_string())),
        }
    }
}

/// A state together with the identifiers it owns.
///
/// A bot id exists exactly while registered or joined, and a game id exactly
/// while joined.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Phase {
    Unregistered,
    Registered { bot_id: String },
    Joined { bot_id: String, game_id: String },
    Closed,
}

impl Phase {
    pub fn state(&self) -> ConnectionState {
        match self {
            Phase::Unregistered => ConnectionState::Unregistered,
            Phase::Registered { .. } => ConnectionState::Registered,
            Phase::Joined { .. } => ConnectionState::Joined,
            Phase::Closed => ConnectionState::Closed,
        }
    }

    pub fn bot_id(&self) -> Option<&str> {
        match self {
            Phase::Registered { bot_id } | Phase::Joined { bot_id, .. } => Some(bot_id),
            _ => None,
        }
    }

    pub fn game_id(&self) -> Option<&str> {
        match self {
            Phase::Joined { game_id, .. } => Some(game_id),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::ConnectionState::*;
    use super::*;

    #[test]
    fn test_forward_transitions_only() {
        assert!(Unregistered.can_transition_to(Registered));
        assert!(Registered.can_transition_to(Joined));
        assert!(!Unregistered.can_transition_to(Joined));
        assert!(!Joined.can_transition_to(Registered));
        assert!(!Registered.can_transition_to(Unregistered));
        assert!(!Closed.can_transition_to(Unregistered));
        assert!(!Joined.can_transition_to(Joined));
    }

    #[test]
    fn test_closed_is_reachable_and_terminal() {
        for state in [Unregistered, Registered, Joined, Closed] {
            assert!(state.can_transition_to(Closed));
        }
        assert!(Closed.is_terminal());
        assert!(!Joined.is_terminal());
    }

    #[test]
    fn test_parse_state_names() {
        assert_eq!("joined".parse::<ConnectionState>(), Ok(Joined));
        assert_eq!("Registered".parse::<ConnectionState>(), Ok(Registered));
        assert_eq!(
            "lobby".parse::<ConnectionState>(),
            Err(UnknownState("lobby".to_string()))
        );
        assert_eq!(Closed.to_string(), "closed");
    }

    #[test]
    fn test_phase_identifiers() {
        let joined = Phase::Joined {
            bot_id: "bot-1".into(),
            game_id: "G1".into(),
        };
        assert_eq!(joined.state(), Joined);
        assert_eq!(joined.bot_id(), Some("bot-1"));
        assert_eq!(joined.game_id(), Some("G1"));

        let registered = Phase::Registered {
            bot_id: "bot-1".into(),
        };
        assert_eq!(registered.game_id(), None);
        assert_eq!(Phase::Unregistered.bot_id(), None);
        assert_eq!(Phase::Closed.state(), Closed);
    }
}
