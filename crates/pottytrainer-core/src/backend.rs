//! # Backend
//!
//! Wires the core together around one injected database handle.
//!
//! Opening a backend is the startup path: the database file is created or
//! opened, every table is provisioned, and each component receives the same
//! `Arc<Repository>`. After that the backend is only read, so it can be
//! shared across request workers behind an `Arc`.

use crate::auth::AuthGate;
use crate::context::OpContext;
use crate::cupboard::Cupboard;
use crate::graph::FoodGraph;
use crate::identity::IdentityResolver;
use crate::journal::Journal;
use crate::repository::Repository;
use crate::schema::{Namespace, SchemaStore};
use crate::types::{PottyError, unavailable};
use redb::Database;
use std::path::Path;
use std::sync::Arc;

/// Every core component, sharing one repository.
#[derive(Debug, Clone)]
pub struct Backend {
    repository: Arc<Repository>,
    identity: IdentityResolver,
    gate: AuthGate,
    cupboard: Cupboard,
    graph: FoodGraph,
    journal: Journal,
}

impl Backend {
    /// Open (or create) the database at `path` and provision all tables
    /// under `namespace`.
    pub fn open(
        path: impl AsRef<Path>,
        namespace: &Namespace,
        ctx: &OpContext,
    ) -> Result<Self, PottyError> {
        let path = path.as_ref();
        let db = Arc::new(Database::create(path).map_err(unavailable)?);
        let schema = SchemaStore::new(Arc::clone(&db), namespace.clone());
        let repository = Repository::open(db, &schema, ctx)?;
        tracing::info!(
            path = %path.display(),
            namespace = namespace.as_str(),
            "opened backend"
        );
        Ok(Self::from_repository(Arc::new(repository)))
    }

    /// Build the components over an already-open repository.
    #[must_use]
    pub fn from_repository(repository: Arc<Repository>) -> Self {
        let identity = IdentityResolver::new(Arc::clone(&repository));
        let gate = AuthGate::new(identity.clone());
        let cupboard = Cupboard::new(Arc::clone(&repository));
        let graph = FoodGraph::new(Arc::clone(&repository));
        let journal = Journal::new(Arc::clone(&repository), cupboard.clone(), graph.clone());
        Self {
            repository,
            identity,
            gate,
            cupboard,
            graph,
            journal,
        }
    }

    #[must_use]
    pub fn repository(&self) -> &Arc<Repository> {
        &self.repository
    }

    #[must_use]
    pub fn identity(&self) -> &IdentityResolver {
        &self.identity
    }

    #[must_use]
    pub fn gate(&self) -> &AuthGate {
        &self.gate
    }

    #[must_use]
    pub fn cupboard(&self) -> &Cupboard {
        &self.cupboard
    }

    #[must_use]
    pub fn graph(&self) -> &FoodGraph {
        &self.graph
    }

    #[must_use]
    pub fn journal(&self) -> &Journal {
        &self.journal
    }
}
