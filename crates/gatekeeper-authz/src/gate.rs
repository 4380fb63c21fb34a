//! Session token verification for privileged callers.
//!
//! Tokens are compact HS256 JWTs issued by the session service. The claims
//! are `svr` (`"yes"` for service accounts), `usr`, `roles` and `exp`.

use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, Utc};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::debug;

use crate::error::{AuthzError, AuthzResult};

/// Header carrying session tokens, on both inbound and outbound requests.
pub const SESSION_TOKEN_HEADER: &str = "x-tidepool-session-token";

/// Header carrying the service name on server login.
pub const SERVER_NAME_HEADER: &str = "x-tidepool-server-name";

/// Header carrying the service secret on server login.
pub const SERVER_SECRET_HEADER: &str = "x-tidepool-server-secret";

/// Value of the `svr` claim.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServerFlag {
    /// Token belongs to a service account.
    Yes,
    /// Token belongs to a person.
    No,
}

/// Raw claims as they appear in the token payload.
///
/// Unknown claims issued by the session service are ignored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenClaims {
    /// Server flag.
    pub svr: ServerFlag,
    /// Subject user id.
    pub usr: String,
    /// Platform roles.
    #[serde(default)]
    pub roles: Vec<String>,
    /// Expiry, seconds since the epoch.
    pub exp: i64,
}

/// Verified identity of a caller, scoped to one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionClaims {
    /// Subject user id.
    pub subject_id: String,
    /// Whether the token belongs to a service account.
    pub is_server_caller: bool,
    /// Platform roles.
    pub roles: BTreeSet<String>,
    /// Token expiry.
    pub expires_at: DateTime<Utc>,
}

impl SessionClaims {
    /// Check whether the caller holds a role.
    pub fn has_role(&self, role: &str) -> bool {
        self.roles.contains(role)
    }

    /// Claims in the shape rule modules read from `input.claims`.
    pub fn to_policy_input(&self) -> Value {
        json!({
            "svr": if self.is_server_caller { "yes" } else { "no" },
            "usr": self.subject_id,
            "roles": self.roles,
            "exp": self.expires_at.timestamp(),
        })
    }
}

impl TryFrom<TokenClaims> for SessionClaims {
    type Error = AuthzError;

    fn try_from(raw: TokenClaims) -> AuthzResult<Self> {
        let expires_at = DateTime::from_timestamp(raw.exp, 0).ok_or(AuthzError::Forbidden)?;
        Ok(Self {
            subject_id: raw.usr,
            is_server_caller: raw.svr == ServerFlag::Yes,
            roles: raw.roles.into_iter().collect(),
            expires_at,
        })
    }
}

/// Verifies session tokens with the shared HS256 secret.
#[derive(Clone)]
pub struct CallerGate {
    key: DecodingKey,
    validation: Validation,
}

impl CallerGate {
    /// Create a gate for the given shared secret.
    pub fn new(secret: &str) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.validate_exp = true;
        validation.validate_aud = false;
        validation.set_required_spec_claims(&["exp"]);

        Self {
            key: DecodingKey::from_secret(secret.as_bytes()),
            validation,
        }
    }

    /// Verify a token and decode its claims.
    ///
    /// Every failure is reported as [`AuthzError::Forbidden`].
    pub fn authorize(&self, raw_token: &str) -> AuthzResult<SessionClaims> {
        if raw_token.is_empty() {
            debug!("rejecting caller: empty session token");
            return Err(AuthzError::Forbidden);
        }

        let data = decode::<TokenClaims>(raw_token, &self.key, &self.validation).map_err(|e| {
            debug!(reason = %e, "rejecting caller: token verification failed");
            AuthzError::Forbidden
        })?;

        SessionClaims::try_from(data.claims).inspect_err(|_| {
            debug!("rejecting caller: expiry out of range");
        })
    }

    /// Verify a token and require a service account.
    pub fn authorize_server(&self, raw_token: &str) -> AuthzResult<SessionClaims> {
        let claims = self.authorize(raw_token)?;
        if !claims.is_server_caller {
            debug!(subject = %claims.subject_id, "rejecting caller: not a server token");
            return Err(AuthzError::Forbidden);
        }
        Ok(claims)
    }
}

impl fmt::Debug for CallerGate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallerGate")
            .field("algorithm", &Algorithm::HS256)
            .finish_non_exhaustive()
    }
}
