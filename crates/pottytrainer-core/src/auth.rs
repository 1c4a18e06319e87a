//! # Authenticated Request Context
//!
//! The gate every data-mutating operation passes through.
//!
//! ```text
//! Unauthenticated --(credential presented)--> Authenticating
//! Authenticating  --(resolved)--------------> Authenticated(user)
//! Authenticating  --(identity failure)------> Rejected
//! ```
//!
//! [`Authenticated`] can only be produced by [`AuthGate`]. Journal and
//! cupboard mutations take it as a parameter, so an operation that compiles
//! is an operation that was authenticated. It is never persisted.

use crate::context::OpContext;
use crate::identity::IdentityResolver;
use crate::types::{PottyError, User, UserId};

/// A resolved identity attached to one in-flight operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Authenticated {
    user: User,
}

impl Authenticated {
    /// The authenticated user.
    #[must_use]
    pub fn user(&self) -> &User {
        &self.user
    }

    /// Shorthand for `self.user().id`.
    #[must_use]
    pub fn user_id(&self) -> &UserId {
        &self.user.id
    }
}

/// Where a request is in the authentication state machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthState {
    /// No credential has been presented.
    Unauthenticated,
    /// A credential was presented and is being resolved.
    Authenticating,
    /// The credential resolved to a user.
    Authenticated(Authenticated),
    /// The credential did not resolve. Terminal.
    Rejected,
}

impl AuthState {
    /// Apply the resolver's outcome. Only `Authenticating` moves.
    fn complete(self, outcome: Result<User, PottyError>) -> Result<Self, PottyError> {
        match (self, outcome) {
            (Self::Authenticating, Ok(user)) => Ok(Self::Authenticated(Authenticated { user })),
            (Self::Authenticating, Err(PottyError::Unauthorized)) => Ok(Self::Rejected),
            (Self::Authenticating, Err(err)) => Err(err),
            (state, _) => Ok(state),
        }
    }

    /// The identity, or `Unauthorized` for any other state.
    pub fn into_authenticated(self) -> Result<Authenticated, PottyError> {
        match self {
            Self::Authenticated(auth) => Ok(auth),
            Self::Unauthenticated | Self::Authenticating | Self::Rejected => {
                Err(PottyError::Unauthorized)
            }
        }
    }
}

/// Runs a credential through the state machine.
#[derive(Debug, Clone)]
pub struct AuthGate {
    resolver: IdentityResolver,
}

impl AuthGate {
    /// Create a gate over an identity resolver.
    #[must_use]
    pub fn new(resolver: IdentityResolver) -> Self {
        Self { resolver }
    }

    /// Authenticate an optional credential.
    ///
    /// A missing or blank credential leaves the request `Unauthenticated`.
    /// A store failure while resolving is returned as an error rather than
    /// a rejection, so callers can tell "who are you?" from "try again".
    pub fn authenticate(
        &self,
        ctx: &OpContext,
        credential: Option<&str>,
    ) -> Result<AuthState, PottyError> {
        let Some(credential) = credential.map(str::trim).filter(|c| !c.is_empty()) else {
            return Ok(AuthState::Unauthenticated);
        };
        AuthState::Authenticating.complete(self.resolver.resolve(ctx, credential))
    }

    /// Authenticate and require success.
    pub fn require(
        &self,
        ctx: &OpContext,
        credential: Option<&str>,
    ) -> Result<Authenticated, PottyError> {
        self.authenticate(ctx, credential)?.into_authenticated()
    }
}
