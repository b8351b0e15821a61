//! Authentication data models.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// User ID type
pub type UserId = i64;

/// Closed set of account roles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Student,
    Faculty,
    Recruiter,
    #[serde(rename = "pro partner")]
    ProPartner,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Student => "student",
            Role::Faculty => "faculty",
            Role::Recruiter => "recruiter",
            Role::ProPartner => "pro partner",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "student" => Some(Role::Student),
            "faculty" => Some(Role::Faculty),
            "recruiter" => Some(Role::Recruiter),
            "pro partner" => Some(Role::ProPartner),
            _ => None,
        }
    }
}

/// User model as stored in the account directory.
///
/// Secret-bearing fields (`password`, `otp`) hold one-way hashes only and
/// must never leave the crate; handlers expose [`Profile`] instead.
#[derive(Debug, Clone)]
pub struct User {
    pub id: UserId,
    pub email: String,
    pub name: String,
    pub role: Role,
    pub password: Option<String>,
    pub has_password: bool,
    pub is_verified: bool,
    pub otp: Option<String>,
    pub otp_expires_at: Option<DateTime<Utc>>,
    pub last_otp_requested_at: Option<DateTime<Utc>>,
    pub gender: Option<String>,
    pub university: Option<String>,
    pub date_of_birth: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,
}

/// Fields required to create a new, unverified account.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub email: String,
    pub name: String,
    pub role: Role,
    pub otp_hash: String,
    pub otp_expires_at: DateTime<Utc>,
    pub last_otp_requested_at: DateTime<Utc>,
}

/// Sanitized account view safe to return to clients.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Profile {
    pub id: UserId,
    pub email: String,
    pub name: String,
    pub role: Role,
    pub is_verified: bool,
    pub gender: Option<String>,
    pub university: Option<String>,
    pub date_of_birth: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,
}

impl From<User> for Profile {
    fn from(user: User) -> Self {
        Profile {
            id: user.id,
            email: user.email,
            name: user.name,
            role: user.role,
            is_verified: user.is_verified,
            gender: user.gender,
            university: user.university,
            date_of_birth: user.date_of_birth,
            created_at: user.created_at,
        }
    }
}

/// Session model: binds one account to one live signed credential.
#[derive(Debug, Clone)]
pub struct Session {
    pub id: i64,
    pub user_id: UserId,
    pub jwt: String,
    pub user_agent: String,
    pub ip: Option<String>,
    pub otp: Option<String>,
    pub otp_expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// Minimal session identity, used both to block concurrent logins and to
/// surface device hints when a second login is rejected.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionInfo {
    pub id: i64,
    pub user_id: UserId,
    pub user_agent: String,
    pub ip: Option<String>,
}

impl From<&Session> for SessionInfo {
    fn from(session: &Session) -> Self {
        SessionInfo {
            id: session.id,
            user_id: session.user_id,
            user_agent: session.user_agent.clone(),
            ip: session.ip.clone(),
        }
    }
}

/// JWT claims for the signed credential issued at login.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: UserId,
    pub email: String,
    pub iat: i64,
    pub exp: i64,
}

/// User login request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// User registration request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub name: String,
    pub role: Role,
}

/// Profile enrichment request, only meaningful once a password is set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateProfileRequest {
    pub gender: Option<String>,
    pub university: Option<String>,
    pub date_of_birth: Option<NaiveDate>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_round_trips_through_strings() {
        for role in [Role::Student, Role::Faculty, Role::Recruiter, Role::ProPartner] {
            assert_eq!(Role::parse(role.as_str()), Some(role));
        }
        assert_eq!(Role::parse("admin"), None);
    }

    #[test]
    fn role_serde_uses_original_wire_names() {
        assert_eq!(serde_json::to_string(&Role::ProPartner).unwrap(), "\"pro partner\"");
        let role: Role = serde_json::from_str("\"student\"").unwrap();
        assert_eq!(role, Role::Student);
    }

    #[test]
    fn profile_drops_secret_fields() {
        let json = serde_json::to_value(Profile {
            id: 1,
            email: "a@x.com".into(),
            name: "Ann".into(),
            role: Role::Student,
            is_verified: true,
            gender: None,
            university: None,
            date_of_birth: None,
            created_at: Utc::now(),
        })
        .unwrap();
        assert!(json.get("password").is_none());
        assert!(json.get("otp").is_none());
    }
}
