//! # Schema Store
//!
//! Owns the lifecycle of the logical tables backing the journal.
//!
//! A logical table is one redb table holding postcard-encoded records keyed
//! by their hash key, plus one multimap table per secondary index
//! (`index value -> record ids`). Physical names are derived
//! deterministically from the configured [`Namespace`]:
//!
//! ```text
//! pottytrainer-tokens            id    -> ApiToken bytes
//! pottytrainer-tokens.by_token   token -> {id}
//! pottytrainer-tokens.by_user_id user  -> {id, id, ...}
//! ```
//!
//! This is the only module that creates schema objects. Creation happens at
//! startup (see [`crate::Repository::open`]); afterwards the handles are
//! shared read-only.

use crate::context::OpContext;
use crate::primitives::{
    DEFAULT_NAMESPACE, DEFAULT_SEPARATOR, INDEX_TABLE_INFIX, NAMESPACE_SEPARATORS,
};
use crate::types::{PottyError, unavailable};
use redb::{Database, MultimapTableDefinition, ReadableDatabase, TableDefinition, TableError};
use std::sync::Arc;

/// Primary table layout: hash key -> encoded record.
pub(crate) type RecordTable<'a> = TableDefinition<'a, &'static str, &'static [u8]>;

/// Index table layout: index value -> record hash keys.
pub(crate) type IndexTable<'a> = MultimapTableDefinition<'a, &'static str, &'static str>;

// =============================================================================
// NAMESPACE
// =============================================================================

/// Table-name prefix, normalized to end in a separator.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Namespace(String);

impl Namespace {
    /// Validate and normalize a namespace.
    ///
    /// The prefix is trimmed and must be non-empty. If it does not already
    /// end in `-` or `_`, a `-` is appended.
    pub fn new(prefix: &str) -> Result<Self, PottyError> {
        let trimmed = prefix.trim();
        if trimmed.is_empty() {
            return Err(PottyError::Config(
                "table namespace must not be empty".to_string(),
            ));
        }

        let mut normalized = trimmed.to_string();
        if !normalized.ends_with(NAMESPACE_SEPARATORS) {
            normalized.push(DEFAULT_SEPARATOR);
        }
        Ok(Self(normalized))
    }

    /// The normalized prefix, separator included.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Physical table name for `base_name`.
    #[must_use]
    pub fn table_name(&self, base_name: &str) -> String {
        format!("{}{}", self.0, base_name)
    }
}

impl Default for Namespace {
    fn default() -> Self {
        Self(format!("{DEFAULT_NAMESPACE}{DEFAULT_SEPARATOR}"))
    }
}

// =============================================================================
// TABLE SCHEMA
// =============================================================================

/// Key/attribute template for a logical table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableSchema {
    /// Name before namespacing (e.g. `"tokens"`).
    pub base_name: &'static str,
    /// Attribute used as the hash key.
    pub hash_key: &'static str,
    /// Secondary indexes, each backed by its own multimap table.
    pub indexes: &'static [&'static str],
}

impl TableSchema {
    /// Create a schema template.
    #[must_use]
    pub const fn new(
        base_name: &'static str,
        hash_key: &'static str,
        indexes: &'static [&'static str],
    ) -> Self {
        Self {
            base_name,
            hash_key,
            indexes,
        }
    }

    /// Whether `index` is declared by this schema.
    #[must_use]
    pub fn has_index(&self, index: &str) -> bool {
        self.indexes.contains(&index)
    }
}

// =============================================================================
// TABLE HANDLE
// =============================================================================

/// A resolved logical table.
///
/// Handles are plain names; they hold no transaction and are safe to share
/// across threads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableHandle {
    physical_name: String,
    schema: TableSchema,
    index_tables: Vec<(&'static str, String)>,
    created: bool,
}

impl TableHandle {
    fn resolve(namespace: &Namespace, schema: &TableSchema) -> Self {
        let physical_name = namespace.table_name(schema.base_name);
        let index_tables = schema
            .indexes
            .iter()
            .map(|index| (*index, format!("{physical_name}{INDEX_TABLE_INFIX}{index}")))
            .collect();
        Self {
            physical_name,
            schema: *schema,
            index_tables,
            created: false,
        }
    }

    /// Physical name of the primary table.
    #[must_use]
    pub fn physical_name(&self) -> &str {
        &self.physical_name
    }

    /// The template this table was provisioned from.
    #[must_use]
    pub fn schema(&self) -> &TableSchema {
        &self.schema
    }

    /// Whether the call that produced this handle issued the creation.
    #[must_use]
    pub fn created(&self) -> bool {
        self.created
    }

    /// Physical name of the multimap table backing `index`.
    #[must_use]
    pub fn index_table_name(&self, index: &str) -> Option<&str> {
        self.index_tables
            .iter()
            .find(|(name, _)| *name == index)
            .map(|(_, physical)| physical.as_str())
    }

    pub(crate) fn record_table(&self) -> RecordTable<'_> {
        TableDefinition::new(&self.physical_name)
    }

    pub(crate) fn index_table(&self, index: &str) -> Option<IndexTable<'_>> {
        self.index_table_name(index).map(MultimapTableDefinition::new)
    }
}

// =============================================================================
// SCHEMA STORE
// =============================================================================

/// Guarantees logical tables exist before use.
#[derive(Clone)]
pub struct SchemaStore {
    db: Arc<Database>,
    namespace: Namespace,
}

impl std::fmt::Debug for SchemaStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SchemaStore")
            .field("namespace", &self.namespace)
            .finish_non_exhaustive()
    }
}

impl SchemaStore {
    /// Create a schema store over an injected database handle.
    #[must_use]
    pub fn new(db: Arc<Database>, namespace: Namespace) -> Self {
        Self { db, namespace }
    }

    /// The namespace every table name is prefixed with.
    #[must_use]
    pub fn namespace(&self) -> &Namespace {
        &self.namespace
    }

    /// Physical name for a base table name.
    #[must_use]
    pub fn physical_name(&self, base_name: &str) -> String {
        self.namespace.table_name(base_name)
    }

    /// Ensure the logical table described by `schema` exists.
    ///
    /// 1. Probe for the primary table in a read transaction. If present,
    ///    return its handle; nothing is altered.
    /// 2. If the probe reports the table missing, create the primary table
    ///    and every index table in one write transaction, then probe again.
    /// 3. Any other failure is returned as `Unavailable`. Nothing is retried.
    ///
    /// redb serializes writers, so two concurrent creators both succeed: the
    /// second one simply opens what the first committed.
    pub fn ensure_table(
        &self,
        ctx: &OpContext,
        schema: &TableSchema,
    ) -> Result<TableHandle, PottyError> {
        ctx.check()?;
        let mut handle = TableHandle::resolve(&self.namespace, schema);

        if self.probe(&handle)? {
            tracing::debug!(table = %handle.physical_name, "table exists");
            return Ok(handle);
        }

        self.create(ctx, &handle)?;

        if !self.probe(&handle)? {
            return Err(PottyError::Unavailable(format!(
                "table {} not visible after creation",
                handle.physical_name
            )));
        }

        tracing::info!(
            table = %handle.physical_name,
            hash_key = schema.hash_key,
            indexes = schema.indexes.len(),
            "created table"
        );
        handle.created = true;
        Ok(handle)
    }

    /// Does the primary table exist?
    fn probe(&self, handle: &TableHandle) -> Result<bool, PottyError> {
        let read_txn = self.db.begin_read().map_err(unavailable)?;
        match read_txn.open_table(handle.record_table()) {
            Ok(_) => Ok(true),
            Err(TableError::TableDoesNotExist(_)) => Ok(false),
            Err(e) => Err(unavailable(e)),
        }
    }

    fn create(&self, ctx: &OpContext, handle: &TableHandle) -> Result<(), PottyError> {
        let write_txn = self.db.begin_write().map_err(unavailable)?;

        let _ = write_txn
            .open_table(handle.record_table())
            .map_err(unavailable)?;
        for index in handle.schema.indexes {
            if let Some(definition) = handle.index_table(index) {
                let _ = write_txn
                    .open_multimap_table(definition)
                    .map_err(unavailable)?;
            }
        }

        if let Err(e) = ctx.check() {
            write_txn.abort().map_err(unavailable)?;
            return Err(e);
        }
        write_txn.commit().map_err(unavailable)
    }
}
