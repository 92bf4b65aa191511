//! Built-in [`AuthValidator`] strategies.
//!
//! | Validator | Header | Checks against |
//! |---|---|---|
//! | [`SharedTokenValidator`] | `Authorization` | `config.auth_token` |
//! | [`JwtValidator`] | `Authorization` (`Token ` prefix optional) | `config.jwt_validation_url` |
//! | [`ProfileValidator`] | `Token` | `config.profile_url` |
//! | [`StaticValidator`] | - | a fixed outcome |

use async_trait::async_trait;
use http::header::AUTHORIZATION;
use jsonwebtoken::{DecodingKey, Validation};
use serde::Deserialize;
use tracing::{info, warn};

use crate::auth::{AuthOutcome, AuthValidator};
use crate::context::HostContext;
use crate::request::Request;

/// Principal id bound by [`SharedTokenValidator`].
pub const SERVICE_PRINCIPAL: &str = "service";

/// Service-to-service auth: the `Authorization` header must equal the
/// configured shared token.
#[derive(Clone, Copy, Debug, Default)]
pub struct SharedTokenValidator;

#[async_trait]
impl AuthValidator for SharedTokenValidator {
    async fn validate(&self, ctx: &HostContext, req: &Request) -> AuthOutcome {
        let expected = ctx.config().auth_token.as_str();
        match req.header(AUTHORIZATION.as_str()) {
            Some(token) if !expected.is_empty() && token == expected => {
                AuthOutcome::authenticated(SERVICE_PRINCIPAL)
            }
            Some(_) => AuthOutcome::denied(),
            None => {
                info!(request_id = %req.id(), "authorization header missing");
                AuthOutcome::denied()
            }
        }
    }
}

#[derive(Deserialize)]
struct UidClaims {
    uid: String,
}

/// Reads the `uid` claim without verifying the signature. Only call this on a
/// token the validation endpoint has already accepted.
fn uid_from_jwt(token: &str) -> Result<String, jsonwebtoken::errors::Error> {
    let mut validation = Validation::default();
    validation.insecure_disable_signature_validation();
    validation.validate_exp = false;
    validation.validate_aud = false;
    validation.required_spec_claims.clear();
    let data = jsonwebtoken::decode::<UidClaims>(token, &DecodingKey::from_secret(&[]), &validation)?;
    Ok(data.claims.uid)
}

/// User auth: the validation endpoint decides, the token's `uid` claim names
/// the principal.
#[derive(Clone, Debug, Default)]
pub struct JwtValidator {
    client: reqwest::Client,
}

impl JwtValidator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl AuthValidator for JwtValidator {
    async fn validate(&self, ctx: &HostContext, req: &Request) -> AuthOutcome {
        let Some(auth) = req.header(AUTHORIZATION.as_str()) else {
            info!(request_id = %req.id(), "authorization header missing");
            return AuthOutcome::denied();
        };
        let token = auth.replace("Token ", "");

        let Some(url) = ctx.config().jwt_validation_url.as_deref() else {
            warn!(request_id = %req.id(), "jwt_validation_url is not configured");
            return AuthOutcome::denied();
        };

        let response = match self.client.get(url).header(AUTHORIZATION, &token).send().await {
            Ok(r) => r,
            Err(e) => {
                warn!(request_id = %req.id(), error = %e, "jwt validation request failed");
                return AuthOutcome::denied();
            }
        };

        if response.status() == reqwest::StatusCode::OK {
            return match uid_from_jwt(&token) {
                Ok(uid) => AuthOutcome::authenticated(uid),
                Err(e) => {
                    warn!(request_id = %req.id(), error = %e, "failed to read uid from token");
                    AuthOutcome::denied()
                }
            };
        }

        if let Some(outcome) = stress_test_bypass(ctx, req, &token) {
            return outcome;
        }
        info!(request_id = %req.id(), status = %response.status(), "jwt validation rejected token");
        AuthOutcome::denied()
    }
}

/// Longest raw token the stress-test bypass will accept as a principal id.
#[cfg(feature = "stress-test")]
pub const STRESS_TEST_MAX_TOKEN_LEN: usize = 70;

/// Load-test shortcut: a short raw token *is* the principal id.
///
/// Compiled only with the `stress-test` feature, and even then only active
/// when `config.allow_stress_test` is set.
#[cfg(feature = "stress-test")]
fn stress_test_bypass(ctx: &HostContext, req: &Request, token: &str) -> Option<AuthOutcome> {
    if ctx.config().allow_stress_test && token.len() <= STRESS_TEST_MAX_TOKEN_LEN {
        warn!(request_id = %req.id(), "stress-test bypass accepted raw token as principal");
        Some(AuthOutcome::authenticated(token))
    } else {
        None
    }
}

#[cfg(not(feature = "stress-test"))]
fn stress_test_bypass(_ctx: &HostContext, _req: &Request, _token: &str) -> Option<AuthOutcome> {
    None
}

/// Profile returned by the profile endpoint.
#[derive(Clone, Debug, Deserialize)]
pub struct Profile {
    pub id: i64,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub email: String,
}

/// Session auth for browser clients: the `Token` header is exchanged for the
/// caller's profile, whose id becomes the principal.
#[derive(Clone, Debug, Default)]
pub struct ProfileValidator {
    client: reqwest::Client,
}

impl ProfileValidator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }

    async fn fetch(&self, url: &str, token: &str) -> Result<Profile, reqwest::Error> {
        self.client
            .get(url)
            .header(AUTHORIZATION, token)
            .send()
            .await?
            .error_for_status()?
            .json::<Profile>()
            .await
    }
}

#[async_trait]
impl AuthValidator for ProfileValidator {
    async fn validate(&self, ctx: &HostContext, req: &Request) -> AuthOutcome {
        let Some(token) = req.header("token") else {
            return AuthOutcome::denied();
        };
        let Some(url) = ctx.config().profile_url.as_deref() else {
            warn!(request_id = %req.id(), "profile_url is not configured");
            return AuthOutcome::denied();
        };
        match self.fetch(url, token).await {
            Ok(profile) => AuthOutcome::authenticated(profile.id.to_string()),
            Err(e) => {
                warn!(request_id = %req.id(), error = %e, "profile lookup failed");
                AuthOutcome::denied()
            }
        }
    }
}

/// Always returns the same outcome. Useful for internal routes and tests.
#[derive(Clone, Debug)]
pub struct StaticValidator(AuthOutcome);

impl StaticValidator {
    pub fn new(authenticated: bool, principal_id: Option<&str>) -> Self {
        Self(AuthOutcome { authenticated, principal_id: principal_id.map(str::to_owned) })
    }

    pub fn allow(principal_id: &str) -> Self {
        Self(AuthOutcome::authenticated(principal_id))
    }

    pub fn deny() -> Self {
        Self(AuthOutcome::denied())
    }
}

#[async_trait]
impl AuthValidator for StaticValidator {
    async fn validate(&self, _ctx: &HostContext, _req: &Request) -> AuthOutcome {
        self.0.clone()
    }
}
