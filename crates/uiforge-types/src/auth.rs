use chrono::{DateTime, Duration, Utc};
use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthenticatedUser {
    #[serde(rename = "userId")]
    pub user_id: String,
    pub email: String,
}

/// Outcome of a sign-in or sign-up attempt. Transport failures are not part
/// of this type; they surface as errors from the account action itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthResult {
    Success(AuthenticatedUser),
    Failure { error: String },
}

impl AuthResult {
    pub fn failure(error: impl Into<String>) -> Self {
        Self::Failure {
            error: error.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    pub fn user(&self) -> Option<&AuthenticatedUser> {
        match self {
            Self::Success(user) => Some(user),
            Self::Failure { .. } => None,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            Self::Success(_) => None,
            Self::Failure { error } => Some(error),
        }
    }
}

// Wire form is `{"success":true}` or `{"success":false,"error":"..."}`.
impl Serialize for AuthResult {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            Self::Success(_) => {
                let mut map = serializer.serialize_map(Some(1))?;
                map.serialize_entry("success", &true)?;
                map.end()
            }
            Self::Failure { error } => {
                let mut map = serializer.serialize_map(Some(2))?;
                map.serialize_entry("success", &false)?;
                map.serialize_entry("error", error)?;
                map.end()
            }
        }
    }
}

/// Claims embedded in the signed `auth-token` cookie.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionClaims {
    #[serde(rename = "userId")]
    pub user_id: String,
    pub email: String,
    #[serde(rename = "expiresAt")]
    pub expires_at: DateTime<Utc>,
    pub iat: i64,
    pub exp: i64,
}

impl SessionClaims {
    pub fn issue(user: &AuthenticatedUser, issued_at: DateTime<Utc>, ttl: Duration) -> Self {
        let expires_at = issued_at + ttl;
        Self {
            user_id: user.user_id.clone(),
            email: user.email.clone(),
            expires_at,
            iat: issued_at.timestamp(),
            exp: expires_at.timestamp(),
        }
    }

    pub fn user(&self) -> AuthenticatedUser {
        AuthenticatedUser {
            user_id: self.user_id.clone(),
            email: self.email.clone(),
        }
    }
}
