//! The authenticated user behind a connection.

use serde::{Deserialize, Serialize};

/// Authenticated identity established before the socket upgrade.
///
/// Parley never authenticates anyone itself; an upstream layer inserts this
/// into the request extensions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    /// Account email.
    pub email: String,
    /// Name shown to other users.
    pub display_name: String,
}

impl Identity {
    /// Create an identity.
    pub fn new(email: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            display_name: display_name.into(),
        }
    }

    /// Identity whose display name is derived from the email's local part.
    pub fn from_email(email: impl Into<String>) -> Self {
        let email = email.into();
        let display_name = email
            .split_once('@')
            .map_or(email.as_str(), |(local, _)| local)
            .to_owned();
        Self {
            email,
            display_name,
        }
    }
}
