//! Authenticated user identity as seen by the channel subscribers.
//!
//! An absent or malformed identity is not an error for the subscribers:
//! they stay inactive with empty state.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::errors::EduError;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IdentityError {
    #[error("User id must not be empty")]
    Empty,

    #[error("User id '{id}' contains whitespace or control characters")]
    InvalidCharacters { id: String },
}

impl EduError for IdentityError {
    fn error_code(&self) -> &'static str {
        match self {
            IdentityError::Empty => "IDENTITY_EMPTY",
            IdentityError::InvalidCharacters { .. } => "IDENTITY_INVALID_CHARACTERS",
        }
    }

    fn is_user_error(&self) -> bool {
        true
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Identity {
    user_id: String,
}

impl Identity {
    pub fn new(user_id: impl Into<String>) -> Result<Self, IdentityError> {
        let user_id = user_id.into();
        if user_id.is_empty() {
            return Err(IdentityError::Empty);
        }
        if user_id
            .chars()
            .any(|c| c.is_whitespace() || c.is_control())
        {
            return Err(IdentityError::InvalidCharacters { id: user_id });
        }
        Ok(Self { user_id })
    }

    /// Parse an optional raw id; absent or malformed ids yield `None`.
    pub fn parse_optional(raw: Option<&str>) -> Option<Self> {
        raw.and_then(|id| Self::new(id).ok())
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.user_id)
    }
}
