//! # Identity Resolver
//!
//! Turns a bearer credential into a [`User`], and provisions the users and
//! tokens that make that possible.
//!
//! Every identity failure (unknown, mismatched, revoked or expired token, or
//! a token whose user row is gone) collapses into the same
//! [`PottyError::Unauthorized`]. The specific reason is only logged.
//! Storage failures are not identity failures and keep their own kind.

use crate::context::OpContext;
use crate::primitives::TOKEN_BYTES;
use crate::repository::Repository;
use crate::types::records::{index, scoped};
use crate::types::{
    ApiToken, ExternalIdentity, ExternalIdentityId, PottyError, TokenId, User, UserId,
};
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{Duration, Utc};
use std::sync::Arc;
use subtle::ConstantTimeEq;
use uuid::Uuid;

// =============================================================================
// EXTERNAL VERIFICATION
// =============================================================================

/// A subject id vouched for by an external sign-in provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalSubject {
    /// Stable per-user identifier assigned by the provider.
    pub subject: String,
}

/// The single capability consumed from a third-party sign-in provider.
///
/// Implementations verify an assertion (for example a signed identity token)
/// and yield the provider's stable subject id. How client credentials for
/// the provider are obtained is the implementation's concern.
pub trait IdentityVerifier: Send + Sync {
    /// Short provider name, used to namespace subjects (e.g. `"apple"`).
    fn provider(&self) -> &str;

    /// Verify `assertion` and return the subject it proves.
    fn verify(&self, assertion: &str) -> Result<ExternalSubject, PottyError>;
}

/// Result of a successful external sign-in.
#[derive(Debug, Clone)]
pub struct SignIn {
    pub user: User,
    pub token: ApiToken,
    /// Whether the local user was provisioned by this sign-in.
    pub new_user: bool,
}

// =============================================================================
// RESOLVER
// =============================================================================

/// Why a credential did not resolve.
enum Rejection {
    /// An identity failure. The reason is for logs only.
    Denied(&'static str),
    /// The store failed; this is not an identity decision.
    Failed(PottyError),
}

impl Rejection {
    fn missing(err: PottyError, reason: &'static str) -> Self {
        if err.is_not_found() {
            Self::Denied(reason)
        } else {
            Self::Failed(err)
        }
    }
}

/// Maps bearer credentials to users.
#[derive(Debug, Clone)]
pub struct IdentityResolver {
    repo: Arc<Repository>,
}

impl IdentityResolver {
    /// Create a resolver over a shared repository.
    #[must_use]
    pub fn new(repo: Arc<Repository>) -> Self {
        Self { repo }
    }

    /// Resolve `credential` to its owning user.
    pub fn resolve(&self, ctx: &OpContext, credential: &str) -> Result<User, PottyError> {
        match self.lookup(ctx, credential) {
            Ok(user) => Ok(user),
            Err(Rejection::Denied(reason)) => {
                tracing::warn!(reason, "rejected credential");
                Err(PottyError::Unauthorized)
            }
            Err(Rejection::Failed(err)) => Err(err),
        }
    }

    fn lookup(&self, ctx: &OpContext, credential: &str) -> Result<User, Rejection> {
        if credential.is_empty() {
            return Err(Rejection::Denied("empty credential"));
        }

        let token: ApiToken = self
            .repo
            .get_by_index(ctx, index::TOKEN, credential)
            .map_err(|e| Rejection::missing(e, "unknown token"))?;

        if !bool::from(token.token.as_bytes().ct_eq(credential.as_bytes())) {
            return Err(Rejection::Denied("token mismatch"));
        }
        if token.revoked_at.is_some() {
            return Err(Rejection::Denied("revoked token"));
        }
        if !token.is_usable_at(Utc::now()) {
            return Err(Rejection::Denied("expired token"));
        }

        self.repo
            .get::<User>(ctx, token.user_id.as_str())
            .map_err(|e| Rejection::missing(e, "orphaned token"))
    }

    // =========================================================================
    // PROVISIONING
    // =========================================================================

    /// Create a new user with no tokens.
    pub fn create_user(&self, ctx: &OpContext) -> Result<User, PottyError> {
        let user = self.repo.put(ctx, &User::new())?;
        tracing::info!(user_id = %user.id, "created user");
        Ok(user)
    }

    /// Issue a fresh token for an existing user.
    ///
    /// `ttl` of `None` issues a token that never expires.
    pub fn issue_token(
        &self,
        ctx: &OpContext,
        user_id: &UserId,
        ttl: Option<Duration>,
    ) -> Result<ApiToken, PottyError> {
        let user = self.repo.get::<User>(ctx, user_id.as_str())?;

        let now = Utc::now();
        let expires_at = match ttl {
            Some(ttl) => Some(now.checked_add_signed(ttl).ok_or_else(|| {
                PottyError::BadInput(format!("token lifetime out of range: {ttl}"))
            })?),
            None => None,
        };

        let token = self.repo.put(
            ctx,
            &ApiToken {
                id: TokenId::generate(),
                user_id: user.id,
                token: generate_token(),
                expires_at,
                revoked_at: None,
                created_at: now,
                updated_at: now,
            },
        )?;
        tracing::info!(user_id = %token.user_id, token_id = %token.id, "issued token");
        Ok(token)
    }

    /// Revoke a token. The row is kept; revoking twice is a no-op.
    pub fn revoke_token(&self, ctx: &OpContext, id: &TokenId) -> Result<ApiToken, PottyError> {
        let mut token = self.repo.get::<ApiToken>(ctx, id.as_str())?;
        if token.revoked_at.is_some() {
            return Ok(token);
        }
        token.revoked_at = Some(Utc::now());
        let token = self.repo.put(ctx, &token)?;
        tracing::info!(token_id = %token.id, "revoked token");
        Ok(token)
    }

    /// Every token ever issued to `user_id`, revoked ones included.
    pub fn tokens_for_user(
        &self,
        ctx: &OpContext,
        user_id: &UserId,
    ) -> Result<Vec<ApiToken>, PottyError> {
        self.repo
            .query_by_index(ctx, index::USER_ID, user_id.as_str())
    }

    /// Sign in with an external assertion.
    ///
    /// The provider's subject maps to at most one local user. The first
    /// sign-in provisions that user; every sign-in issues a fresh token.
    pub fn sign_in_external(
        &self,
        ctx: &OpContext,
        verifier: &dyn IdentityVerifier,
        assertion: &str,
        ttl: Option<Duration>,
    ) -> Result<SignIn, PottyError> {
        let provider = verifier.provider();
        let external = verifier.verify(assertion).map_err(|err| {
            tracing::warn!(provider, error = %err, "external assertion rejected");
            PottyError::Unauthorized
        })?;
        if external.subject.is_empty() {
            tracing::warn!(provider, "external assertion yielded an empty subject");
            return Err(PottyError::Unauthorized);
        }

        let subject_key = scoped(provider, &external.subject);
        let (user, new_user) = self.repo.write(ctx, |scope| {
            if let Some(link) =
                scope.get_by_index::<ExternalIdentity>(index::SUBJECT, &subject_key)?
            {
                let user = scope.get::<User>(link.user_id.as_str())?.ok_or_else(|| {
                    tracing::warn!(provider, "external identity points at missing user");
                    PottyError::Unauthorized
                })?;
                return Ok((user, false));
            }

            let user = scope.put(&User::new())?;
            let now = Utc::now();
            scope.put(&ExternalIdentity {
                id: ExternalIdentityId::generate(),
                user_id: user.id.clone(),
                provider: provider.to_string(),
                subject: external.subject,
                created_at: now,
                updated_at: now,
            })?;
            Ok((user, true))
        })?;
        if new_user {
            tracing::info!(user_id = %user.id, provider, "provisioned user from external sign-in");
        }

        let token = self.issue_token(ctx, &user.id, ttl)?;
        Ok(SignIn {
            user,
            token,
            new_user,
        })
    }
}

/// A fresh credential: two v4 UUIDs, URL-safe base64 without padding.
fn generate_token() -> String {
    let mut bytes = Vec::with_capacity(TOKEN_BYTES);
    bytes.extend_from_slice(Uuid::new_v4().as_bytes());
    bytes.extend_from_slice(Uuid::new_v4().as_bytes());
    URL_SAFE_NO_PAD.encode(bytes)
}
