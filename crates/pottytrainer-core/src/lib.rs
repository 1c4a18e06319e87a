//! # pottytrainer-core
//!
//! The persistence and identity core of Potty Trainer - THE JOURNAL.
//!
//! Potty Trainer records two event streams, what a user ate and how their
//! bowel movements went, and relates foods to one another so that an
//! outcome can later be attributed to root-cause ingredients instead of only
//! to the literal text that was logged.
//!
//! ## Layers
//!
//! - `schema`: table lifecycle and namespacing (the only place tables are created)
//! - `repository`: typed records with secondary indexes
//! - `identity` / `auth`: bearer tokens, external sign-in, and the request gate
//! - `graph` / `cupboard`: food aliases, ingredient edges, closure resolution
//! - `journal`: eat and poop events
//!
//! ## Architectural Constraints
//!
//! - Has NO async, NO network dependencies (pure Rust)
//! - The database handle is injected, never global
//! - Every store call takes an [`OpContext`] deadline/cancellation boundary
//! - Identity is passed as a typed [`Authenticated`] parameter

// =============================================================================
// MODULES
// =============================================================================

pub mod auth;
pub mod backend;
pub mod context;
pub mod cupboard;
pub mod graph;
pub mod identity;
pub mod journal;
pub mod primitives;
pub mod repository;
pub mod schema;
pub mod types;

// =============================================================================
// RE-EXPORTS: Core Types (from types module)
// =============================================================================

pub use types::{
    ApiToken, Eat, EatId, ErrorKind, ExternalIdentity, ExternalIdentityId, Food, FoodId, FoodName,
    FoodNameId, Ingredient, IngredientId, Poop, PoopId, PottyError, Quality, Record, TokenId, User,
    UserId,
};

// =============================================================================
// RE-EXPORTS: Storage
// =============================================================================

pub use backend::Backend;
pub use context::{CancelGuard, OpContext};
pub use repository::{Repository, WriteScope};
pub use schema::{Namespace, SchemaStore, TableHandle, TableSchema};

// =============================================================================
// RE-EXPORTS: Identity
// =============================================================================

pub use auth::{AuthGate, AuthState, Authenticated};
pub use identity::{ExternalSubject, IdentityResolver, IdentityVerifier, SignIn};

// =============================================================================
// RE-EXPORTS: Foods and Events
// =============================================================================

pub use cupboard::{Cupboard, normalize_name};
pub use graph::FoodGraph;
pub use journal::{EatEntry, Journal, PoopEntry};

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
pub(crate) mod test_support {
    use super::*;
    use std::path::Path;

    /// A tempdir-backed backend with a background context.
    pub(crate) struct Harness {
        pub(crate) backend: Backend,
        pub(crate) ctx: OpContext,
    }

    impl Harness {
        pub(crate) fn open(dir: &Path) -> Self {
            let ctx = OpContext::background();
            let backend = Backend::open(dir.join("harness.redb"), &Namespace::default(), &ctx)
                .expect("open backend");
            Self { backend, ctx }
        }

        /// Create a user with a token and authenticate as them.
        pub(crate) fn sign_up(&self) -> Authenticated {
            let identity = self.backend.identity();
            let user = identity.create_user(&self.ctx).unwrap();
            let token = identity.issue_token(&self.ctx, &user.id, None).unwrap();
            self.backend
                .gate()
                .require(&self.ctx, Some(&token.token))
                .unwrap()
        }
    }
}
