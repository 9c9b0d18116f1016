use serde::{Deserialize, Serialize};

use crate::{CoreError, CoreResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    Traveler,
    Driver,
    Admin,
}

impl Role {
    /// Lenient parse of the role claim; unknown values fall back to traveler.
    pub fn from_claim(value: &str) -> Self {
        match value.to_ascii_lowercase().as_str() {
            "admin" => Role::Admin,
            "driver" | "both" => Role::Driver,
            _ => Role::Traveler,
        }
    }

    pub fn can_publish(&self) -> bool {
        matches!(self, Role::Driver | Role::Admin)
    }

    pub fn is_admin(&self) -> bool {
        matches!(self, Role::Admin)
    }
}

/// The authenticated identity behind a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caller {
    pub uid: String,
    pub display_name: Option<String>,
    pub role: Role,
}

impl Caller {
    pub fn new(uid: impl Into<String>, role: Role) -> Self {
        Self {
            uid: uid.into(),
            display_name: None,
            role,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = Some(name.into());
        self
    }

    pub fn require(caller: Option<Caller>) -> CoreResult<Caller> {
        match caller {
            Some(c) if !c.uid.trim().is_empty() => Ok(c),
            _ => Err(CoreError::Unauthenticated("You must sign in".to_string())),
        }
    }

    pub fn name_or<'a>(&'a self, fallback: &'a str) -> &'a str {
        self.display_name
            .as_deref()
            .filter(|n| !n.trim().is_empty())
            .unwrap_or(fallback)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_require_caller() {
        assert_eq!(
            Caller::require(None).unwrap_err().code(),
            "unauthenticated"
        );
        assert!(Caller::require(Some(Caller::new("  ", Role::Traveler))).is_err());
        assert!(Caller::require(Some(Caller::new("u1", Role::Traveler))).is_ok());
    }

    #[test]
    fn test_role_claims() {
        assert_eq!(Role::from_claim("ADMIN"), Role::Admin);
        assert_eq!(Role::from_claim("both"), Role::Driver);
        assert_eq!(Role::from_claim("whatever"), Role::Traveler);
        assert!(!Role::Traveler.can_publish());
    }
}
