use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

#[derive(Debug, Serialize, Deserialize)]
pub struct JwtClaims {
    pub sub: String,
    pub exp: Option<u64>,
    pub email: Option<String>,
    pub role: Option<String>,
    pub user_metadata: Option<serde_json::Value>,
    pub aud: Option<String>,
    pub iat: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub email: Option<String>,
    pub role: Option<String>,
    pub metadata: Option<serde_json::Value>,
    pub created_at: Option<DateTime<Utc>>,
}

impl User {
    /// Parse the raw token identity into a typed caller. Fails when the
    /// subject is not a UUID or the role claim is missing/unknown.
    pub fn to_caller(&self) -> Result<Caller, String> {
        let id = Uuid::parse_str(&self.id)
            .map_err(|_| format!("Invalid user id in token: {}", self.id))?;
        let role = self
            .role
            .as_deref()
            .ok_or_else(|| "Missing role claim in token".to_string())?
            .parse::<Role>()?;

        Ok(Caller { id, role })
    }
}

/// Verified caller identity handed to the domain services. Authentication
/// happens upstream in the middleware; services only enforce role/ownership.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Caller {
    pub id: Uuid,
    pub role: Role,
}

impl Caller {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    /// Staff means anyone who manages the calendar: admins and professionals.
    pub fn is_staff(&self) -> bool {
        matches!(self.role, Role::Admin | Role::Professional)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Admin,
    Professional,
    Client,
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "admin" => Ok(Role::Admin),
            "professional" => Ok(Role::Professional),
            "client" => Ok(Role::Client),
            other => Err(format!("Unknown role: {}", other)),
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Admin => write!(f, "admin"),
            Role::Professional => write!(f, "professional"),
            Role::Client => write!(f, "client"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn caller_from_valid_user() {
        let id = Uuid::new_v4();
        let user = User {
            id: id.to_string(),
            email: Some("pro@studio.example".to_string()),
            role: Some("professional".to_string()),
            metadata: None,
            created_at: None,
        };

        let caller = user.to_caller().unwrap();
        assert_eq!(caller.id, id);
        assert_eq!(caller.role, Role::Professional);
        assert!(caller.is_staff());
        assert!(!caller.is_admin());
    }

    #[test]
    fn caller_rejects_unknown_role() {
        let user = User {
            id: Uuid::new_v4().to_string(),
            email: None,
            role: Some("superuser".to_string()),
            metadata: None,
            created_at: None,
        };

        assert!(user.to_caller().is_err());
    }
}
