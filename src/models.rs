use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use ts_rs::TS;
use zeroize::Zeroizing;

use crate::error::{AuthError, RoleLookupError};

// --- Identity & Authorization Schemas ---

/// Identity
///
/// The authenticated principal as reported by the identity provider.
/// A new value replaces the previous one wholesale on every provider event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS, Default)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct Identity {
    // Provider-assigned unique id (opaque string, not necessarily a UUID).
    pub id: String,
    pub email: String,
    pub display_name: Option<String>,
    pub avatar_url: Option<String>,
}

/// Role
///
/// Authorization classification resolved server-side from the user record.
/// Any role string the server sends that is not `admin` or `student` maps to `Unresolved`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, TS)]
#[serde(rename_all = "lowercase")]
#[ts(export)]
pub enum Role {
    Admin,
    Student,
    Unresolved,
}

impl From<String> for Role {
    fn from(value: String) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "admin" => Role::Admin,
            "student" => Role::Student,
            _ => Role::Unresolved,
        }
    }
}

impl<'de> Deserialize<'de> for Role {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        String::deserialize(deserializer).map(Role::from)
    }
}

impl Role {
    /// Lower-case path segment used by the dashboard trees (`/dashboard/{role}/...`).
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Student => "student",
            Role::Unresolved => "unresolved",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// RoleRecord
///
/// Server-sourced user record returned by `GET /users/role?email=`.
/// Re-fetched whenever the identity's email changes; never carried over to another identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct RoleRecord {
    pub role: Role,
    #[serde(default)]
    pub name: String,
    pub email: String,
    #[serde(default)]
    #[ts(type = "string | null")]
    pub created_at: Option<DateTime<Utc>>,
}

// --- Session Aggregate ---

/// Loading
///
/// Tri-state progress marker of the session. `Ready` is reached exactly once per
/// identity-change cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS, Default)]
#[serde(rename_all = "kebab-case")]
#[ts(export)]
pub enum Loading {
    #[default]
    Booting,
    ResolvingRole,
    Ready,
}

/// SessionPhase
///
/// The state-machine position derived from a `Session`. Only `Unauthenticated` and
/// `Ready` are settled; consumers must not act on the other two.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Booting,
    Unauthenticated,
    ResolvingRole,
    Ready,
}

impl SessionPhase {
    pub fn is_settled(&self) -> bool {
        matches!(self, SessionPhase::Unauthenticated | SessionPhase::Ready)
    }
}

/// Session
///
/// The current authentication + authorization state. Owned exclusively by the
/// `SessionController`; everyone else sees immutable snapshots.
///
/// `role` and `user_data` are only ever `Some` while `identity` is `Some`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, TS, Default)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct Session {
    pub identity: Option<Identity>,
    pub role: Option<Role>,
    pub loading: Loading,
    #[serde(serialize_with = "serialize_lookup_error")]
    #[ts(type = "string | null")]
    pub last_error: Option<RoleLookupError>,
    /// The committed role record of the current identity (`userData` in the UI layer).
    pub user_data: Option<RoleRecord>,
}

impl Session {
    pub fn phase(&self) -> SessionPhase {
        match (self.loading, self.identity.is_some()) {
            (Loading::Booting, _) => SessionPhase::Booting,
            (_, false) => SessionPhase::Unauthenticated,
            (Loading::ResolvingRole, true) => SessionPhase::ResolvingRole,
            (Loading::Ready, true) => SessionPhase::Ready,
        }
    }

    pub fn is_settled(&self) -> bool {
        self.phase().is_settled()
    }

    pub fn is_authenticated(&self) -> bool {
        self.identity.is_some()
    }

    /// Email of the current identity, the key role resolution is tied to.
    pub fn email(&self) -> Option<&str> {
        self.identity.as_ref().map(|identity| identity.email.as_str())
    }
}

fn serialize_lookup_error<S>(error: &Option<RoleLookupError>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    match error {
        Some(e) => serializer.serialize_some(&e.to_string()),
        None => serializer.serialize_none(),
    }
}

// --- Request Payloads (Input Schemas) ---

/// ProfilePatch
///
/// Partial profile update. Only the provided fields are sent to the identity provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ProfilePatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,

    #[serde(rename = "photoURL", skip_serializing_if = "Option::is_none")]
    pub photo_url: Option<String>,
}

impl ProfilePatch {
    pub fn is_empty(&self) -> bool {
        self.display_name.is_none() && self.photo_url.is_none()
    }

    /// Applies the patch to an identity, leaving absent fields untouched.
    pub fn apply_to(&self, identity: &Identity) -> Identity {
        Identity {
            display_name: self.display_name.clone().or_else(|| identity.display_name.clone()),
            avatar_url: self.photo_url.clone().or_else(|| identity.avatar_url.clone()),
            ..identity.clone()
        }
    }
}

/// Credentials
///
/// Validated email/password pair passed to the identity provider.
///
/// The email is trimmed and must not be empty; the password must not be empty and is
/// kept verbatim. The password buffer is wiped on drop and redacted from `Debug`.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    email: String,
    password: Zeroizing<String>,
}

impl Credentials {
    /// Credentials for password sign-in.
    pub fn try_new(email: &str, password: &str) -> Result<Self, AuthError> {
        let email = email.trim();
        if email.is_empty() {
            return Err(AuthError::InvalidInput("email must not be empty".to_string()));
        }
        if password.is_empty() {
            return Err(AuthError::InvalidInput("password must not be empty".to_string()));
        }
        Ok(Self {
            email: email.to_string(),
            password: Zeroizing::new(password.to_string()),
        })
    }

    /// Credentials for registration: same checks as `try_new` plus the password policy
    /// (one uppercase letter, one lowercase letter, at least 6 characters).
    pub fn for_sign_up(email: &str, password: &str) -> Result<Self, AuthError> {
        let credentials = Self::try_new(email, password)?;
        credentials.check_password_policy()?;
        Ok(credentials)
    }

    pub fn check_password_policy(&self) -> Result<(), AuthError> {
        let password = self.password.as_str();
        let has_upper = password.chars().any(char::is_uppercase);
        let has_lower = password.chars().any(char::is_lowercase);
        if !has_upper || !has_lower || password.chars().count() < 6 {
            return Err(AuthError::WeakPassword(
                "password needs one uppercase letter, one lowercase letter and at least 6 characters"
                    .to_string(),
            ));
        }
        Ok(())
    }

    pub fn email(&self) -> &str {
        &self.email
    }

    pub fn password(&self) -> &str {
        self.password.as_str()
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_role_strings_are_unresolved() {
        let record: RoleRecord = serde_json::from_str(
            r#"{"role":"instructor","name":"T","email":"t@x.io","createdAt":"2024-05-01T10:00:00Z"}"#,
        )
        .unwrap();
        assert_eq!(record.role, Role::Unresolved);

        let admin: Role = serde_json::from_str(r#""Admin""#).unwrap();
        assert_eq!(admin, Role::Admin);
    }

    #[test]
    fn session_phase_follows_loading_and_identity() {
        let mut session = Session::default();
        assert_eq!(session.phase(), SessionPhase::Booting);
        assert!(!session.is_settled());

        session.loading = Loading::Ready;
        assert_eq!(session.phase(), SessionPhase::Unauthenticated);
        assert!(session.is_settled());

        session.identity = Some(Identity {
            email: "a@b.com".to_string(),
            ..Identity::default()
        });
        session.loading = Loading::ResolvingRole;
        assert_eq!(session.phase(), SessionPhase::ResolvingRole);
        assert!(!session.is_settled());
    }

    #[test]
    fn credentials_debug_hides_password() {
        let creds = Credentials::try_new("  a@b.com ", "Secret1").unwrap();
        assert_eq!(creds.email(), "a@b.com");
        assert!(!format!("{:?}", creds).contains("Secret1"));
    }

    #[test]
    fn sign_up_policy_matches_registration_rules() {
        assert!(Credentials::for_sign_up("a@b.com", "Abcdef").is_ok());
        assert!(matches!(
            Credentials::for_sign_up("a@b.com", "abcdef"),
            Err(AuthError::WeakPassword(_))
        ));
        assert!(matches!(
            Credentials::for_sign_up("a@b.com", "Ab1"),
            Err(AuthError::WeakPassword(_))
        ));
        assert!(matches!(
            Credentials::for_sign_up(" ", "Abcdef"),
            Err(AuthError::InvalidInput(_))
        ));
    }

    #[test]
    fn profile_patch_skips_absent_fields() {
        let patch = ProfilePatch {
            display_name: Some("Ada".to_string()),
            photo_url: None,
        };
        let json = serde_json::to_value(&patch).unwrap();
        assert_eq!(json, serde_json::json!({ "displayName": "Ada" }));
    }
}
