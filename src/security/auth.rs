//! Bearer credential verification.
//!
//! # Responsibilities
//! - Verify HMAC-signed JWTs against the shared secret
//! - Produce a typed `VerifiedIdentity` for the request context
//! - Enforce role requirements on admin-only routes
//!
//! # Design Decisions
//! - Only the HMAC family is accepted; any other declared algorithm is rejected
//!   before the signature is looked at
//! - Every verification failure collapses into one opaque error; the cause is
//!   logged at debug level and never returned to the caller
//! - `exp` is mandatory and checked without leeway

use std::collections::BTreeSet;

use axum::{
    body::Body,
    http::{header, Request},
    response::{IntoResponse, Response},
};
use chrono::{DateTime, Utc};
use futures_util::{future::BoxFuture, FutureExt};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::http::request::RequestContext;
use crate::http::response::GatewayError;
use crate::observability::metrics;
use crate::pipeline::{Next, Stage};

/// Message for every credential rejection after the header was found.
const INVALID_TOKEN: &str = "invalid or expired token";

/// Token payload, in the layout the user service issues.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    #[serde(rename = "userId")]
    pub user_id: Uuid,
    pub email: String,
    /// Issuers that serialize an empty list as `null` are accepted.
    #[serde(default, deserialize_with = "null_as_empty")]
    pub roles: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iat: Option<i64>,
    pub exp: i64,
}

impl Claims {
    /// Claims issued now and valid for `ttl_secs`.
    pub fn new(user_id: Uuid, email: impl Into<String>, roles: Vec<String>, ttl_secs: i64) -> Self {
        let now = Utc::now().timestamp();
        Self {
            user_id,
            email: email.into(),
            roles,
            iat: Some(now),
            exp: now + ttl_secs,
        }
    }
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Vec<String>>::deserialize(deserializer)?.unwrap_or_default())
}

/// Sign `claims` with HS256, the way the user service issues tokens.
pub fn mint_token(secret: &str, claims: &Claims) -> jsonwebtoken::errors::Result<String> {
    encode(
        &Header::new(Algorithm::HS256),
        claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
}

/// Identity proven by a valid credential.
///
/// Only [`ClaimsVerifier::verify`] constructs this type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedIdentity {
    subject_id: Uuid,
    email: String,
    roles: BTreeSet<String>,
    issued_at: Option<DateTime<Utc>>,
    expires_at: DateTime<Utc>,
}

impl VerifiedIdentity {
    fn from_claims(claims: Claims) -> Option<Self> {
        Some(Self {
            subject_id: claims.user_id,
            email: claims.email,
            roles: claims.roles.into_iter().collect(),
            issued_at: claims.iat.and_then(|t| DateTime::from_timestamp(t, 0)),
            expires_at: DateTime::from_timestamp(claims.exp, 0)?,
        })
    }

    pub fn subject_id(&self) -> Uuid {
        self.subject_id
    }

    pub fn email(&self) -> &str {
        &self.email
    }

    pub fn roles(&self) -> &BTreeSet<String> {
        &self.roles
    }

    pub fn has_role(&self, role: &str) -> bool {
        self.roles.contains(role)
    }

    pub fn issued_at(&self) -> Option<DateTime<Utc>> {
        self.issued_at
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }
}

/// The single, cause-free verification failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("invalid or expired token")]
pub struct AuthError;

/// Verifies bearer tokens against a shared HMAC secret.
#[derive(Clone)]
pub struct ClaimsVerifier {
    key: DecodingKey,
    validation: Validation,
}

impl ClaimsVerifier {
    pub fn new(secret: &str) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.algorithms = vec![Algorithm::HS256, Algorithm::HS384, Algorithm::HS512];
        validation.leeway = 0;
        validation.validate_exp = true;
        validation.validate_aud = false;
        validation.set_required_spec_claims(&["exp"]);

        Self {
            key: DecodingKey::from_secret(secret.as_bytes()),
            validation,
        }
    }

    /// Verify a raw token (without the `Bearer ` prefix).
    pub fn verify(&self, token: &str) -> Result<VerifiedIdentity, AuthError> {
        let data = decode::<Claims>(token, &self.key, &self.validation).map_err(|e| {
            tracing::debug!(reason = ?e.kind(), "Token verification failed");
            AuthError
        })?;

        VerifiedIdentity::from_claims(data.claims).ok_or_else(|| {
            tracing::debug!("Token expiry out of range");
            AuthError
        })
    }
}

/// Pull the token out of `Authorization: Bearer <token>`.
fn bearer_token(request: &Request<Body>) -> Result<&str, GatewayError> {
    let value = request
        .headers()
        .get(header::AUTHORIZATION)
        .ok_or(GatewayError::Unauthorized("authorization header required"))?;

    let value = value
        .to_str()
        .map_err(|_| GatewayError::Unauthorized(INVALID_TOKEN))?;

    let parts: Vec<&str> = value.split(' ').collect();
    match parts.as_slice() {
        ["Bearer", token] if !token.is_empty() => Ok(*token),
        _ => Err(GatewayError::Unauthorized(INVALID_TOKEN)),
    }
}

/// Requires a valid bearer token and attaches the identity to the context.
pub struct AuthStage {
    verifier: ClaimsVerifier,
}

impl AuthStage {
    pub fn new(verifier: ClaimsVerifier) -> Self {
        Self { verifier }
    }
}

impl Stage for AuthStage {
    fn name(&self) -> &'static str {
        "auth"
    }

    fn process<'a>(
        &'a self,
        mut ctx: RequestContext,
        request: Request<Body>,
        next: Next<'a>,
    ) -> BoxFuture<'a, Response> {
        let verified = match bearer_token(&request) {
            Ok(token) => self.verifier.verify(token).map_err(|_| {
                (GatewayError::Unauthorized(INVALID_TOKEN), "invalid_token")
            }),
            Err(err) if request.headers().contains_key(header::AUTHORIZATION) => {
                Err((err, "malformed_header"))
            }
            Err(err) => Err((err, "missing_header")),
        };

        match verified {
            Ok(identity) => {
                tracing::debug!(user_id = %identity.subject_id(), "Authenticated");
                ctx.attach_identity(identity);
                next.run(ctx, request)
            }
            Err((err, reason)) => {
                tracing::warn!(path = %request.uri().path(), reason, "Rejected unauthenticated request");
                metrics::record_auth_failure(reason);
                async move { err.into_response() }.boxed()
            }
        }
    }
}

/// Requires the authenticated identity to hold a role.
pub struct RequireRoleStage {
    role: &'static str,
}

impl RequireRoleStage {
    pub fn new(role: &'static str) -> Self {
        Self { role }
    }
}

impl Stage for RequireRoleStage {
    fn name(&self) -> &'static str {
        "require_role"
    }

    fn process<'a>(
        &'a self,
        ctx: RequestContext,
        request: Request<Body>,
        next: Next<'a>,
    ) -> BoxFuture<'a, Response> {
        let rejection = match ctx.identity() {
            None => Some(GatewayError::Unauthorized("user not authenticated")),
            Some(identity) if !identity.has_role(self.role) => {
                tracing::warn!(user_id = %identity.subject_id(), role = self.role, "Missing required role");
                Some(GatewayError::Forbidden(format!("{} access required", self.role)))
            }
            Some(_) => None,
        };

        match rejection {
            None => next.run(ctx, request),
            Some(err) => async move { err.into_response() }.boxed(),
        }
    }
}
