//! Connection identifiers.

use std::fmt;

use uuid::Uuid;

/// Unique identity of a live connection.
///
/// Time-ordered (UUID v7), so ids sort by creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    /// Generate a fresh id.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn_{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_unique() {
        let a = ConnectionId::new();
        let b = ConnectionId::new();
        assert_ne!(a, b);
    }

    #[test]
    fn display_has_prefix() {
        let id = ConnectionId::new();
        let shown = id.to_string();
        assert!(shown.starts_with("conn_"));
        let uuid = Uuid::parse_str(&shown["conn_".len()..]).unwrap();
        assert_eq!(uuid.get_version_num(), 7);
    }
}
