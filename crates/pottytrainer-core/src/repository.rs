//! # Record Repository
//!
//! Typed get/put access over the logical tables provisioned by the
//! [`SchemaStore`].
//!
//! Each record kind lives in its own table; its secondary indexes are kept in
//! step with the primary row inside the same write transaction, so a reader
//! never sees an index entry for a row that does not exist yet.
//!
//! `put` is an unconditional upsert. Two concurrent writers to the same id
//! both succeed and the last commit wins; there is no optimistic concurrency.
//! Get-or-create logic goes through [`Repository::write`], which holds
//! redb's single writer across the lookup and the insert.

use crate::context::OpContext;
use crate::schema::{IndexTable, SchemaStore, TableHandle};
use crate::types::{
    ApiToken, Eat, ExternalIdentity, Food, FoodName, Ingredient, Poop, PottyError, Record, User,
    UserId, unavailable,
};
use chrono::Utc;
use redb::{
    Database, ReadTransaction, ReadableDatabase, ReadableMultimapTable, ReadableTable,
    ReadableTableMetadata, WriteTransaction,
};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Typed access to every record kind.
pub struct Repository {
    db: Arc<Database>,
    tables: BTreeMap<&'static str, TableHandle>,
}

impl std::fmt::Debug for Repository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Repository")
            .field("tables", &self.tables.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

impl Repository {
    /// Provision every table and hold the handles for the repository's
    /// lifetime.
    ///
    /// This is the startup path: it is the only place the repository asks
    /// the schema store to create anything.
    pub fn open(
        db: Arc<Database>,
        schema: &SchemaStore,
        ctx: &OpContext,
    ) -> Result<Self, PottyError> {
        let mut tables = BTreeMap::new();
        for table_schema in [
            User::SCHEMA,
            ApiToken::SCHEMA,
            Eat::SCHEMA,
            Poop::SCHEMA,
            Food::SCHEMA,
            FoodName::SCHEMA,
            Ingredient::SCHEMA,
            ExternalIdentity::SCHEMA,
        ] {
            let handle = schema.ensure_table(ctx, &table_schema)?;
            tables.insert(table_schema.base_name, handle);
        }
        Ok(Self { db, tables })
    }

    /// Handles of every provisioned table, ordered by base name.
    pub fn tables(&self) -> impl Iterator<Item = &TableHandle> {
        self.tables.values()
    }

    fn handle<R: Record>(&self) -> Result<&TableHandle, PottyError> {
        self.tables.get(R::SCHEMA.base_name).ok_or_else(|| {
            PottyError::Unavailable(format!("table {} not provisioned", R::SCHEMA.base_name))
        })
    }

    // =========================================================================
    // READS
    // =========================================================================

    /// Fetch a record by its hash key.
    pub fn get<R: Record>(&self, ctx: &OpContext, key: &str) -> Result<R, PottyError> {
        ctx.check()?;
        let handle = self.handle::<R>()?;
        let read_txn = self.db.begin_read().map_err(unavailable)?;
        read_record(&read_txn, handle, key)?.ok_or_else(|| PottyError::not_found(R::KIND, key))
    }

    /// Fetch a record by key, failing `NotFound` unless it belongs to `owner`.
    ///
    /// A row owned by someone else is indistinguishable from a missing one.
    pub fn get_owned<R: Record>(
        &self,
        ctx: &OpContext,
        owner: &UserId,
        key: &str,
    ) -> Result<R, PottyError> {
        let record = self.get::<R>(ctx, key)?;
        if record.owner() != owner {
            return Err(PottyError::not_found(R::KIND, key));
        }
        Ok(record)
    }

    /// Fetch the first record (in id order) whose `index` equals `value`.
    pub fn get_by_index<R: Record>(
        &self,
        ctx: &OpContext,
        index: &str,
        value: &str,
    ) -> Result<R, PottyError> {
        ctx.check()?;
        let handle = self.handle::<R>()?;
        let read_txn = self.db.begin_read().map_err(unavailable)?;

        for id in index_ids::<R>(&read_txn, handle, index, value)? {
            if let Some(record) = read_record(&read_txn, handle, &id)? {
                return Ok(record);
            }
        }
        Err(PottyError::not_found(R::KIND, format!("{index}={value}")))
    }

    /// Fetch every record whose `index` equals `value`, in id order.
    pub fn query_by_index<R: Record>(
        &self,
        ctx: &OpContext,
        index: &str,
        value: &str,
    ) -> Result<Vec<R>, PottyError> {
        ctx.check()?;
        let handle = self.handle::<R>()?;
        let read_txn = self.db.begin_read().map_err(unavailable)?;

        let mut records = Vec::new();
        for id in index_ids::<R>(&read_txn, handle, index, value)? {
            match read_record(&read_txn, handle, &id)? {
                Some(record) => records.push(record),
                None => tracing::warn!(
                    table = handle.physical_name(),
                    index,
                    id = %id,
                    "index entry points at missing row"
                ),
            }
        }
        Ok(records)
    }

    /// Number of rows of kind `R`.
    pub fn count<R: Record>(&self, ctx: &OpContext) -> Result<u64, PottyError> {
        ctx.check()?;
        let handle = self.handle::<R>()?;
        let read_txn = self.db.begin_read().map_err(unavailable)?;
        let table = read_txn
            .open_table(handle.record_table())
            .map_err(unavailable)?;
        table.len().map_err(unavailable)
    }

    // =========================================================================
    // WRITES
    // =========================================================================

    /// Insert or replace `record`, returning the row as stored.
    ///
    /// An existing row keeps its `created_at`; `updated_at` is always the
    /// write time. Index entries that changed are moved in the same
    /// transaction.
    pub fn put<R: Record>(&self, ctx: &OpContext, record: &R) -> Result<R, PottyError> {
        self.write(ctx, |scope| scope.put(record))
    }

    /// Run `work` inside one write transaction.
    ///
    /// redb admits a single writer at a time, so a lookup made through the
    /// [`WriteScope`] cannot be invalidated by another writer before this
    /// transaction commits. Any error from `work`, or a context that expires
    /// while it runs, aborts the transaction and nothing is written.
    pub fn write<T>(
        &self,
        ctx: &OpContext,
        work: impl FnOnce(&WriteScope<'_>) -> Result<T, PottyError>,
    ) -> Result<T, PottyError> {
        ctx.check()?;
        let write_txn = self.db.begin_write().map_err(unavailable)?;
        let outcome = work(&WriteScope {
            repo: self,
            txn: &write_txn,
        })
        .and_then(|value| ctx.check().map(|()| value));

        match outcome {
            Ok(value) => {
                write_txn.commit().map_err(unavailable)?;
                Ok(value)
            }
            Err(e) => {
                write_txn.abort().map_err(unavailable)?;
                Err(e)
            }
        }
    }
}

// =============================================================================
// WRITE SCOPE
// =============================================================================

/// Reads and writes inside an open write transaction.
///
/// Reads see the transaction's own uncommitted rows.
pub struct WriteScope<'a> {
    repo: &'a Repository,
    txn: &'a WriteTransaction,
}

impl WriteScope<'_> {
    /// Fetch a record by its hash key.
    pub fn get<R: Record>(&self, key: &str) -> Result<Option<R>, PottyError> {
        let handle = self.repo.handle::<R>()?;
        let table = self
            .txn
            .open_table(handle.record_table())
            .map_err(unavailable)?;
        lookup(&table, key)
    }

    /// The first record (in id order) whose `index` equals `value`.
    pub fn get_by_index<R: Record>(
        &self,
        index: &str,
        value: &str,
    ) -> Result<Option<R>, PottyError> {
        Ok(self.query_by_index(index, value)?.into_iter().next())
    }

    /// Every record whose `index` equals `value`, in id order.
    pub fn query_by_index<R: Record>(
        &self,
        index: &str,
        value: &str,
    ) -> Result<Vec<R>, PottyError> {
        let handle = self.repo.handle::<R>()?;
        let ids = {
            let table = self
                .txn
                .open_multimap_table(index_definition::<R>(handle, index)?)
                .map_err(unavailable)?;
            collect_ids(&table, value)?
        };

        let table = self
            .txn
            .open_table(handle.record_table())
            .map_err(unavailable)?;
        let mut records = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(record) = lookup(&table, &id)? {
                records.push(record);
            }
        }
        Ok(records)
    }

    /// Insert or replace `record` within this transaction.
    pub fn put<R: Record>(&self, record: &R) -> Result<R, PottyError> {
        let handle = self.repo.handle::<R>()?;
        let key = record.key();
        if key.is_empty() {
            return Err(PottyError::BadInput(format!("{} id must not be empty", R::KIND)));
        }

        let mut stored = record.clone();
        let now = Utc::now();
        let mut table = self
            .txn
            .open_table(handle.record_table())
            .map_err(unavailable)?;

        let previous: Option<R> = lookup(&table, key)?;
        let created_at = previous.as_ref().map_or(now, R::created_at);
        stored.set_timestamps(created_at, now);
        let bytes = encode(&stored)?;
        table.insert(key, bytes.as_slice()).map_err(unavailable)?;

        let old_values = previous.map(|p| p.index_values()).unwrap_or_default();
        for (index, new_value) in stored.index_values() {
            let old_value = old_values
                .iter()
                .find(|(name, _)| *name == index)
                .map(|(_, value)| value);
            if old_value == Some(&new_value) {
                continue;
            }

            let definition = handle.index_table(index).ok_or_else(|| {
                PottyError::Unavailable(format!(
                    "{} has no index table for {index}",
                    handle.physical_name()
                ))
            })?;
            let mut index_table = self
                .txn
                .open_multimap_table(definition)
                .map_err(unavailable)?;
            if let Some(old_value) = old_value {
                index_table
                    .remove(old_value.as_str(), key)
                    .map_err(unavailable)?;
            }
            index_table
                .insert(new_value.as_str(), key)
                .map_err(unavailable)?;
        }
        Ok(stored)
    }
}

// =============================================================================
// HELPERS
// =============================================================================

fn read_record<R: Record>(
    read_txn: &ReadTransaction,
    handle: &TableHandle,
    key: &str,
) -> Result<Option<R>, PottyError> {
    let table = read_txn
        .open_table(handle.record_table())
        .map_err(unavailable)?;
    lookup(&table, key)
}

fn index_ids<R: Record>(
    read_txn: &ReadTransaction,
    handle: &TableHandle,
    index: &str,
    value: &str,
) -> Result<Vec<String>, PottyError> {
    let table = read_txn
        .open_multimap_table(index_definition::<R>(handle, index)?)
        .map_err(unavailable)?;
    collect_ids(&table, value)
}

fn index_definition<'h, R: Record>(
    handle: &'h TableHandle,
    index: &str,
) -> Result<IndexTable<'h>, PottyError> {
    handle
        .index_table(index)
        .ok_or_else(|| PottyError::BadInput(format!("{} has no index {index}", R::KIND)))
}

fn lookup<R: Record>(
    table: &impl ReadableTable<&'static str, &'static [u8]>,
    key: &str,
) -> Result<Option<R>, PottyError> {
    match table.get(key).map_err(unavailable)? {
        Some(bytes) => decode(bytes.value()).map(Some),
        None => Ok(None),
    }
}

fn collect_ids(
    table: &impl ReadableMultimapTable<&'static str, &'static str>,
    value: &str,
) -> Result<Vec<String>, PottyError> {
    let mut ids = Vec::new();
    for entry in table.get(value).map_err(unavailable)? {
        let entry = entry.map_err(unavailable)?;
        ids.push(entry.value().to_string());
    }
    Ok(ids)
}

fn encode<R: Record>(record: &R) -> Result<Vec<u8>, PottyError> {
    postcard::to_allocvec(record).map_err(|e| PottyError::SerializationError(e.to_string()))
}

fn decode<R: Record>(bytes: &[u8]) -> Result<R, PottyError> {
    postcard::from_bytes(bytes).map_err(|e| PottyError::SerializationError(e.to_string()))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;
    use crate::schema::Namespace;
    use crate::types::records::{index, scoped};
    use crate::types::{FoodId, FoodNameId, PoopId, Quality};
    use chrono::DateTime;
    use std::time::Duration;
    use tempfile::tempdir;

    fn open_repo(dir: &std::path::Path) -> Repository {
        let db = Arc::new(Database::create(dir.join("repo.redb")).expect("create db"));
        let schema = SchemaStore::new(Arc::clone(&db), Namespace::new("test").unwrap());
        Repository::open(db, &schema, &OpContext::background()).expect("open repository")
    }

    fn food_name(user: &UserId, food: &FoodId, name: &str) -> FoodName {
        let epoch = DateTime::<Utc>::UNIX_EPOCH;
        FoodName {
            id: FoodNameId::generate(),
            user_id: user.clone(),
            food_id: food.clone(),
            name: name.to_string(),
            created_at: epoch,
            updated_at: epoch,
        }
    }

    #[test]
    fn open_provisions_every_table() {
        let temp = tempdir().expect("temp dir");
        let repo = open_repo(temp.path());
        let names: Vec<&str> = repo.tables().map(TableHandle::physical_name).collect();
        assert_eq!(names.len(), 8);
        assert!(names.contains(&"test-users"));
        assert!(names.contains(&"test-external_identities"));
    }

    #[test]
    fn get_missing_is_not_found() {
        let temp = tempdir().expect("temp dir");
        let repo = open_repo(temp.path());
        let err = repo
            .get::<User>(&OpContext::background(), "nobody")
            .expect_err("must miss");
        assert!(err.is_not_found());
    }

    #[test]
    fn put_then_get() {
        let temp = tempdir().expect("temp dir");
        let repo = open_repo(temp.path());
        let ctx = OpContext::background();

        let user = repo.put(&ctx, &User::new()).expect("put user");
        let fetched: User = repo.get(&ctx, user.id.as_str()).expect("get user");
        assert_eq!(fetched, user);
    }

    #[test]
    fn put_stamps_and_preserves_created_at() {
        let temp = tempdir().expect("temp dir");
        let repo = open_repo(temp.path());
        let ctx = OpContext::background();
        let user = UserId::generate();
        let food = FoodId::generate();

        let first = repo
            .put(&ctx, &food_name(&user, &food, "yogurt"))
            .expect("first put");
        assert!(first.created_at > DateTime::<Utc>::UNIX_EPOCH);
        assert_eq!(first.created_at, first.updated_at);

        let mut resubmitted = first.clone();
        resubmitted.created_at = DateTime::<Utc>::UNIX_EPOCH;
        let second = repo.put(&ctx, &resubmitted).expect("second put");
        assert_eq!(second.created_at, first.created_at);
        assert!(second.updated_at >= first.updated_at);
    }

    #[test]
    fn query_by_index_is_user_scoped() {
        let temp = tempdir().expect("temp dir");
        let repo = open_repo(temp.path());
        let ctx = OpContext::background();
        let alice = UserId::generate();
        let bob = UserId::generate();
        let food = FoodId::generate();

        repo.put(&ctx, &food_name(&alice, &food, "yogurt")).unwrap();
        repo.put(&ctx, &food_name(&alice, &food, "yoghurt")).unwrap();
        repo.put(&ctx, &food_name(&bob, &food, "yogurt")).unwrap();

        let alice_names: Vec<FoodName> = repo
            .query_by_index(&ctx, index::USER_ID, alice.as_str())
            .unwrap();
        assert_eq!(alice_names.len(), 2);
        assert!(alice_names.iter().all(|n| n.user_id == alice));

        let bob_yogurt: FoodName = repo
            .get_by_index(&ctx, index::USER_NAME, &scoped(bob.as_str(), "yogurt"))
            .unwrap();
        assert_eq!(bob_yogurt.user_id, bob);
    }

    #[test]
    fn query_by_index_empty_when_nothing_matches() {
        let temp = tempdir().expect("temp dir");
        let repo = open_repo(temp.path());
        let rows: Vec<Poop> = repo
            .query_by_index(&OpContext::background(), index::USER_ID, "nobody")
            .unwrap();
        assert!(rows.is_empty());
    }

    #[test]
    fn put_moves_changed_index_entries() {
        let temp = tempdir().expect("temp dir");
        let repo = open_repo(temp.path());
        let ctx = OpContext::background();
        let user = UserId::generate();
        let food = FoodId::generate();

        let mut name = repo.put(&ctx, &food_name(&user, &food, "yogurt")).unwrap();
        name.name = "yoghurt".to_string();
        repo.put(&ctx, &name).unwrap();

        let old = repo.get_by_index::<FoodName>(
            &ctx,
            index::USER_NAME,
            &scoped(user.as_str(), "yogurt"),
        );
        assert!(old.expect_err("old entry removed").is_not_found());

        let new: FoodName = repo
            .get_by_index(&ctx, index::USER_NAME, &scoped(user.as_str(), "yoghurt"))
            .unwrap();
        assert_eq!(new.id, name.id);
    }

    #[test]
    fn unknown_index_is_bad_input() {
        let temp = tempdir().expect("temp dir");
        let repo = open_repo(temp.path());
        let err = repo
            .query_by_index::<Eat>(&OpContext::background(), "colour", "red")
            .expect_err("no such index");
        assert!(matches!(err, PottyError::BadInput(_)));
    }

    #[test]
    fn get_owned_hides_foreign_rows() {
        let temp = tempdir().expect("temp dir");
        let repo = open_repo(temp.path());
        let ctx = OpContext::background();
        let owner = UserId::generate();
        let now = Utc::now();

        let poop = repo
            .put(
                &ctx,
                &Poop {
                    id: PoopId::generate(),
                    user_id: owner.clone(),
                    pooped_at: now,
                    quality: Quality::Good,
                    created_at: now,
                    updated_at: now,
                },
            )
            .unwrap();

        assert!(repo.get_owned::<Poop>(&ctx, &owner, poop.id.as_str()).is_ok());
        let err = repo
            .get_owned::<Poop>(&ctx, &UserId::generate(), poop.id.as_str())
            .expect_err("foreign row");
        assert!(err.is_not_found());
    }

    #[test]
    fn count_rows() {
        let temp = tempdir().expect("temp dir");
        let repo = open_repo(temp.path());
        let ctx = OpContext::background();
        assert_eq!(repo.count::<User>(&ctx).unwrap(), 0);
        repo.put(&ctx, &User::new()).unwrap();
        repo.put(&ctx, &User::new()).unwrap();
        assert_eq!(repo.count::<User>(&ctx).unwrap(), 2);
    }

    #[test]
    fn expired_context_writes_nothing() {
        let temp = tempdir().expect("temp dir");
        let repo = open_repo(temp.path());
        let expired = OpContext::with_timeout(Duration::ZERO);

        let err = repo.put(&expired, &User::new()).expect_err("expired");
        assert!(matches!(err, PottyError::Timeout));
        assert_eq!(repo.count::<User>(&OpContext::background()).unwrap(), 0);
    }

    #[test]
    fn cancelled_context_fails_reads() {
        let temp = tempdir().expect("temp dir");
        let repo = open_repo(temp.path());
        let ctx = OpContext::background();
        ctx.cancel();
        let err = repo.get::<User>(&ctx, "anyone").expect_err("cancelled");
        assert!(matches!(err, PottyError::Cancelled));
    }

    #[test]
    fn write_scope_sees_its_own_rows() {
        let temp = tempdir().expect("temp dir");
        let repo = open_repo(temp.path());
        let ctx = OpContext::background();
        let user = UserId::generate();
        let food = FoodId::generate();
        let key = scoped(user.as_str(), "kefir");

        let found = repo
            .write(&ctx, |scope| {
                scope.put(&food_name(&user, &food, "kefir"))?;
                scope.get_by_index::<FoodName>(index::USER_NAME, &key)
            })
            .unwrap();
        assert_eq!(found.map(|row| row.food_id), Some(food));
    }

    #[test]
    fn failed_write_scope_commits_nothing() {
        let temp = tempdir().expect("temp dir");
        let repo = open_repo(temp.path());
        let ctx = OpContext::background();

        let err = repo
            .write(&ctx, |scope| {
                scope.put(&User::new())?;
                scope.put(&User::new())?;
                Err::<(), _>(PottyError::BadInput("second thoughts".to_string()))
            })
            .expect_err("work failed");
        assert!(matches!(err, PottyError::BadInput(_)));
        assert_eq!(repo.count::<User>(&ctx).unwrap(), 0);
    }

    #[test]
    fn empty_key_is_rejected() {
        let temp = tempdir().expect("temp dir");
        let repo = open_repo(temp.path());
        let mut user = User::new();
        user.id = UserId::new("");
        let err = repo
            .put(&OpContext::background(), &user)
            .expect_err("empty id");
        assert!(matches!(err, PottyError::BadInput(_)));
    }
}
