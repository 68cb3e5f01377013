use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use thiserror::Error;
use uiforge_types::{AuthenticatedUser, SessionClaims};

use crate::config::AppConfig;

pub const SESSION_COOKIE_NAME: &str = "auth-token";
pub const DEFAULT_SESSION_TTL_DAYS: i64 = 7;
pub const DEVELOPMENT_JWT_SECRET: &str = "development-secret-key";

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("session token expired")]
    Expired,
    #[error("invalid session token: {0}")]
    Invalid(String),
    #[error("failed to sign session token: {0}")]
    Signing(String),
}

/// Signs and verifies the credential carried by the session cookie.
pub trait SessionTokenService: Send + Sync {
    fn sign(&self, claims: &SessionClaims) -> Result<String, TokenError>;
    fn verify(&self, token: &str) -> Result<SessionClaims, TokenError>;
}

/// HS256 JSON Web Tokens keyed by a shared secret.
pub struct JwtSessionTokens {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
}

impl JwtSessionTokens {
    pub fn new(secret: &[u8]) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp"]);
        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            validation,
        }
    }
}

impl SessionTokenService for JwtSessionTokens {
    fn sign(&self, claims: &SessionClaims) -> Result<String, TokenError> {
        jsonwebtoken::encode(&Header::new(Algorithm::HS256), claims, &self.encoding)
            .map_err(|error| TokenError::Signing(error.to_string()))
    }

    fn verify(&self, token: &str) -> Result<SessionClaims, TokenError> {
        jsonwebtoken::decode::<SessionClaims>(token, &self.decoding, &self.validation)
            .map(|data| data.claims)
            .map_err(|error| match error.kind() {
                ErrorKind::ExpiredSignature => TokenError::Expired,
                _ => TokenError::Invalid(error.to_string()),
            })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SameSite {
    Lax,
    Strict,
}

impl SameSite {
    pub fn as_str(self) -> &'static str {
        match self {
            SameSite::Lax => "Lax",
            SameSite::Strict => "Strict",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetCookie {
    pub name: String,
    pub value: String,
    pub http_only: bool,
    pub secure: bool,
    pub same_site: SameSite,
    pub path: String,
    /// `None` makes it a browser-session cookie.
    pub expires: Option<DateTime<Utc>>,
}

impl SetCookie {
    pub fn to_header_value(&self) -> String {
        let mut out = format!("{}={}; Path={}", self.name, self.value, self.path);
        if let Some(expires) = self.expires {
            out.push_str("; Expires=");
            out.push_str(&expires.format("%a, %d %b %Y %H:%M:%S GMT").to_string());
        }
        if self.http_only {
            out.push_str("; HttpOnly");
        }
        if self.secure {
            out.push_str("; Secure");
        }
        out.push_str("; SameSite=");
        out.push_str(self.same_site.as_str());
        out
    }
}

/// Finds `name` in a `Cookie:` request header.
pub fn cookie_value<'a>(cookie_header: &'a str, name: &str) -> Option<&'a str> {
    cookie_header
        .split(';')
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| key.trim() == name)
        .map(|(_, value)| value.trim())
        .filter(|value| !value.is_empty())
}

#[derive(Debug, Clone)]
pub struct IssuedSession {
    pub token: String,
    pub claims: SessionClaims,
    pub cookie: SetCookie,
}

#[derive(Clone)]
pub struct SessionManager {
    tokens: Arc<dyn SessionTokenService>,
    ttl: Duration,
    secure_cookies: bool,
}

impl SessionManager {
    pub fn new(tokens: Arc<dyn SessionTokenService>, ttl: Duration, secure_cookies: bool) -> Self {
        Self {
            tokens,
            ttl,
            secure_cookies,
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        let days = if config.session_ttl_days > 0 {
            config.session_ttl_days
        } else {
            DEFAULT_SESSION_TTL_DAYS
        };
        Self::new(
            Arc::new(JwtSessionTokens::new(config.jwt_secret().as_bytes())),
            Duration::days(days),
            config.environment.is_production(),
        )
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn secure_cookies(&self) -> bool {
        self.secure_cookies
    }

    pub fn create_session(&self, user: &AuthenticatedUser) -> Result<IssuedSession, TokenError> {
        self.create_session_at(user, Utc::now())
    }

    /// Token expiry and cookie expiry are the same instant.
    pub fn create_session_at(
        &self,
        user: &AuthenticatedUser,
        now: DateTime<Utc>,
    ) -> Result<IssuedSession, TokenError> {
        let claims = SessionClaims::issue(user, now, self.ttl);
        let token = self.tokens.sign(&claims)?;
        let cookie = SetCookie {
            name: SESSION_COOKIE_NAME.to_string(),
            value: token.clone(),
            http_only: true,
            secure: self.secure_cookies,
            same_site: SameSite::Lax,
            path: "/".to_string(),
            expires: Some(claims.expires_at),
        };
        Ok(IssuedSession {
            token,
            claims,
            cookie,
        })
    }

    pub fn verify_token(&self, token: &str) -> Result<SessionClaims, TokenError> {
        self.tokens.verify(token)
    }

    pub fn get_session(&self, cookie_header: Option<&str>) -> Option<SessionClaims> {
        let token = cookie_value(cookie_header?, SESSION_COOKIE_NAME)?;
        match self.verify_token(token) {
            Ok(claims) => Some(claims),
            Err(err) => {
                tracing::debug!("rejecting session cookie: {}", err);
                None
            }
        }
    }

    pub fn delete_session(&self) -> SetCookie {
        SetCookie {
            name: SESSION_COOKIE_NAME.to_string(),
            value: String::new(),
            http_only: true,
            secure: self.secure_cookies,
            same_site: SameSite::Lax,
            path: "/".to_string(),
            expires: Utc.timestamp_opt(0, 0).single(),
        }
    }
}
