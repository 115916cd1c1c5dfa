//! Actor - identity of whoever triggered an operation
//!
//! Authentication happens outside the core. The core only records the user id
//! it was handed.

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Actor(String);

impl Actor {
    /// Identity used for entries produced by the engine itself.
    pub const SYSTEM: &'static str = "SYSTEM";

    pub fn new(id: impl Into<String>) -> Self {
        let id = id.into();
        let trimmed = id.trim();
        if trimmed.is_empty() {
            Self(Self::SYSTEM.to_string())
        } else {
            Self(trimmed.to_string())
        }
    }

    pub fn system() -> Self {
        Self(Self::SYSTEM.to_string())
    }

    pub fn id(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Actor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Actor {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blank_actor_is_system() {
        assert_eq!(Actor::new("  ").id(), Actor::SYSTEM);
        assert_eq!(Actor::new(" teller-07 ").id(), "teller-07");
    }
}
