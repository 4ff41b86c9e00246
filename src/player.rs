use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A participant in the game. `name` is the routing key used throughout the protocol; it is
/// assumed unique across the group, an invariant established by the lobby before the game
/// starts. `id` is generated locally on construction and is never consulted for equality.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Player {
    name: String,
    id: Uuid,
}

impl Player {
    /// Creates a new player with a freshly generated id.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            id: Uuid::new_v4(),
        }
    }

    /// The player's stable routing key.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The player's locally generated id. Carried for wire-format parity; never used for
    /// equality or routing.
    pub fn id(&self) -> Uuid {
        self.id
    }
}

impl PartialEq for Player {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl Eq for Player {}

impl std::hash::Hash for Player {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.name.hash(state);
    }
}

impl std::fmt::Display for Player {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name)
    }
}

#[cfg(test)]
mod player_tests {
    use super::*;

    #[test]
    fn test_equality_ignores_id() {
        let a = Player::new("alice");
        let b = Player::new("alice");
        assert_eq!(a, b);
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn test_inequality_by_name() {
        let a = Player::new("alice");
        let b = Player::new("bob");
        assert_ne!(a, b);
    }
}
