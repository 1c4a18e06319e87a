//! # Stored Records
//!
//! The seven journal record kinds plus the external sign-in link.
//!
//! Every record is owned by exactly one user (except `User` itself and the
//! token/identity rows that point at one). All user-scoped secondary index
//! values are prefixed with the owner's id, so a scoped query can never
//! return another user's rows.

use super::{
    EatId, ExternalIdentityId, FoodId, FoodNameId, IngredientId, PoopId, Quality, TokenId, UserId,
};
use crate::primitives::{
    EATS_TABLE, EXTERNAL_IDENTITIES_TABLE, FOOD_NAMES_TABLE, FOODS_TABLE, INDEX_SCOPE_SEPARATOR,
    INGREDIENTS_TABLE, POOPS_TABLE, TOKENS_TABLE, USERS_TABLE,
};
use crate::schema::TableSchema;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, de::DeserializeOwned};

// =============================================================================
// INDEX NAMES
// =============================================================================

/// Secondary index names used across record kinds.
pub mod index {
    /// Owner of the row.
    pub const USER_ID: &str = "user_id";
    /// The bearer credential of an API token.
    pub const TOKEN: &str = "token";
    /// `user#normalized name` of a food name.
    pub const USER_NAME: &str = "user_name";
    /// `user#food_id` of a food name.
    pub const USER_FOOD: &str = "user_food";
    /// `user#resulting_food_id` of an ingredient edge.
    pub const USER_RESULTING: &str = "user_resulting";
    /// `user#component_food_id` of an ingredient edge.
    pub const USER_COMPONENT: &str = "user_component";
    /// `provider#subject` of an external identity.
    pub const SUBJECT: &str = "subject";
}

/// Build a composite index value scoped to `scope` (a user id or provider).
#[must_use]
pub fn scoped(scope: &str, value: &str) -> String {
    format!("{scope}{INDEX_SCOPE_SEPARATOR}{value}")
}

// =============================================================================
// RECORD TRAIT
// =============================================================================

/// A record kind stored in its own logical table.
///
/// `SCHEMA` is the key/attribute template handed to the schema store when
/// the table is provisioned. `index_values` must return one entry per index
/// declared in `SCHEMA.indexes`.
pub trait Record: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    /// Table template for this kind.
    const SCHEMA: TableSchema;

    /// Human-readable kind name used in errors.
    const KIND: &'static str;

    /// The hash key value of this row.
    fn key(&self) -> &str;

    /// The user this row belongs to. A `User` owns itself.
    fn owner(&self) -> &UserId;

    /// `(index name, index value)` pairs for this row.
    fn index_values(&self) -> Vec<(&'static str, String)>;

    /// When the row was first written.
    fn created_at(&self) -> DateTime<Utc>;

    /// Overwrite both timestamps. Called by the repository on every put.
    fn set_timestamps(&mut self, created_at: DateTime<Utc>, updated_at: DateTime<Utc>);
}

macro_rules! impl_timestamps {
    () => {
        fn created_at(&self) -> DateTime<Utc> {
            self.created_at
        }

        fn set_timestamps(&mut self, created_at: DateTime<Utc>, updated_at: DateTime<Utc>) {
            self.created_at = created_at;
            self.updated_at = updated_at;
        }
    };
}

// =============================================================================
// USER
// =============================================================================

/// A user of Potty Trainer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    /// A new user with a fresh id.
    #[must_use]
    pub fn new() -> Self {
        let now = Utc::now();
        Self {
            id: UserId::generate(),
            created_at: now,
            updated_at: now,
        }
    }
}

impl Default for User {
    fn default() -> Self {
        Self::new()
    }
}

impl Record for User {
    const SCHEMA: TableSchema = TableSchema::new(USERS_TABLE, "id", &[]);
    const KIND: &'static str = "User";

    fn key(&self) -> &str {
        self.id.as_str()
    }

    fn owner(&self) -> &UserId {
        &self.id
    }

    fn index_values(&self) -> Vec<(&'static str, String)> {
        Vec::new()
    }

    impl_timestamps!();
}

// =============================================================================
// API TOKEN
// =============================================================================

/// A bearer credential belonging to a user.
///
/// `id` identifies the row; `token` is the secret the client presents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiToken {
    pub id: TokenId,
    pub user_id: UserId,
    pub token: String,
    /// `None` means the token never expires.
    pub expires_at: Option<DateTime<Utc>>,
    /// Set when the token is revoked. Revoked rows are kept.
    pub revoked_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ApiToken {
    /// Whether the token may be used at `now`.
    #[must_use]
    pub fn is_usable_at(&self, now: DateTime<Utc>) -> bool {
        self.revoked_at.is_none() && self.expires_at.is_none_or(|expires| now < expires)
    }
}

impl Record for ApiToken {
    const SCHEMA: TableSchema =
        TableSchema::new(TOKENS_TABLE, "id", &[index::TOKEN, index::USER_ID]);
    const KIND: &'static str = "APIToken";

    fn key(&self) -> &str {
        self.id.as_str()
    }

    fn owner(&self) -> &UserId {
        &self.user_id
    }

    fn index_values(&self) -> Vec<(&'static str, String)> {
        vec![
            (index::TOKEN, self.token.clone()),
            (index::USER_ID, self.user_id.to_string()),
        ]
    }

    impl_timestamps!();
}

// =============================================================================
// EAT
// =============================================================================

/// A single occurrence of eating exactly one food.
///
/// `food_text` is frozen at log time and does not follow later renames,
/// aliases, or ingredient changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Eat {
    pub id: EatId,
    pub user_id: UserId,
    pub food_id: FoodId,
    pub food_text: String,
    pub ate_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Record for Eat {
    const SCHEMA: TableSchema = TableSchema::new(EATS_TABLE, "id", &[index::USER_ID]);
    const KIND: &'static str = "Eat";

    fn key(&self) -> &str {
        self.id.as_str()
    }

    fn owner(&self) -> &UserId {
        &self.user_id
    }

    fn index_values(&self) -> Vec<(&'static str, String)> {
        vec![(index::USER_ID, self.user_id.to_string())]
    }

    impl_timestamps!();
}

// =============================================================================
// POOP
// =============================================================================

/// A single bowel movement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Poop {
    pub id: PoopId,
    pub user_id: UserId,
    pub pooped_at: DateTime<Utc>,
    pub quality: Quality,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Record for Poop {
    const SCHEMA: TableSchema = TableSchema::new(POOPS_TABLE, "id", &[index::USER_ID]);
    const KIND: &'static str = "Poop";

    fn key(&self) -> &str {
        self.id.as_str()
    }

    fn owner(&self) -> &UserId {
        &self.user_id
    }

    fn index_values(&self) -> Vec<(&'static str, String)> {
        vec![(index::USER_ID, self.user_id.to_string())]
    }

    impl_timestamps!();
}

// =============================================================================
// FOOD
// =============================================================================

/// A food. Foods have no intrinsic name; see [`FoodName`].
///
/// Foods are never shared: two users who both eat "yogurt" each get their
/// own `Food`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Food {
    pub id: FoodId,
    pub user_id: UserId,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Record for Food {
    const SCHEMA: TableSchema = TableSchema::new(FOODS_TABLE, "id", &[index::USER_ID]);
    const KIND: &'static str = "Food";

    fn key(&self) -> &str {
        self.id.as_str()
    }

    fn owner(&self) -> &UserId {
        &self.user_id
    }

    fn index_values(&self) -> Vec<(&'static str, String)> {
        vec![(index::USER_ID, self.user_id.to_string())]
    }

    impl_timestamps!();
}

// =============================================================================
// FOOD NAME
// =============================================================================

/// One name of a food. Several names pointing at one food are aliases:
/// eating "yogurt" or "yoghurt" counts as eating the same single food.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FoodName {
    pub id: FoodNameId,
    pub user_id: UserId,
    pub food_id: FoodId,
    /// Normalized (trimmed, lower-cased) name.
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Record for FoodName {
    const SCHEMA: TableSchema = TableSchema::new(
        FOOD_NAMES_TABLE,
        "id",
        &[index::USER_ID, index::USER_NAME, index::USER_FOOD],
    );
    const KIND: &'static str = "FoodName";

    fn key(&self) -> &str {
        self.id.as_str()
    }

    fn owner(&self) -> &UserId {
        &self.user_id
    }

    fn index_values(&self) -> Vec<(&'static str, String)> {
        vec![
            (index::USER_ID, self.user_id.to_string()),
            (index::USER_NAME, scoped(self.user_id.as_str(), &self.name)),
            (
                index::USER_FOOD,
                scoped(self.user_id.as_str(), self.food_id.as_str()),
            ),
        ]
    }

    impl_timestamps!();
}

// =============================================================================
// INGREDIENT
// =============================================================================

/// An "x contains y" edge: eating `resulting_food_id` also means eating
/// `component_food_id`.
///
/// Edges may be purely semantic ("fruit" is an ingredient of "apple") and
/// may form cycles.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ingredient {
    pub id: IngredientId,
    pub user_id: UserId,
    pub resulting_food_id: FoodId,
    pub component_food_id: FoodId,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Record for Ingredient {
    const SCHEMA: TableSchema = TableSchema::new(
        INGREDIENTS_TABLE,
        "id",
        &[
            index::USER_ID,
            index::USER_RESULTING,
            index::USER_COMPONENT,
        ],
    );
    const KIND: &'static str = "Ingredient";

    fn key(&self) -> &str {
        self.id.as_str()
    }

    fn owner(&self) -> &UserId {
        &self.user_id
    }

    fn index_values(&self) -> Vec<(&'static str, String)> {
        vec![
            (index::USER_ID, self.user_id.to_string()),
            (
                index::USER_RESULTING,
                scoped(self.user_id.as_str(), self.resulting_food_id.as_str()),
            ),
            (
                index::USER_COMPONENT,
                scoped(self.user_id.as_str(), self.component_food_id.as_str()),
            ),
        ]
    }

    impl_timestamps!();
}

// =============================================================================
// EXTERNAL IDENTITY
// =============================================================================

/// Links a subject verified by an external sign-in provider to a local user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalIdentity {
    pub id: ExternalIdentityId,
    pub user_id: UserId,
    pub provider: String,
    pub subject: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Record for ExternalIdentity {
    const SCHEMA: TableSchema = TableSchema::new(
        EXTERNAL_IDENTITIES_TABLE,
        "id",
        &[index::SUBJECT, index::USER_ID],
    );
    const KIND: &'static str = "ExternalIdentity";

    fn key(&self) -> &str {
        self.id.as_str()
    }

    fn owner(&self) -> &UserId {
        &self.user_id
    }

    fn index_values(&self) -> Vec<(&'static str, String)> {
        vec![
            (index::SUBJECT, scoped(&self.provider, &self.subject)),
            (index::USER_ID, self.user_id.to_string()),
        ]
    }

    impl_timestamps!();
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_indexes_match_schema<R: Record>(record: &R) {
        let declared: Vec<&str> = R::SCHEMA.indexes.to_vec();
        let produced: Vec<&str> = record.index_values().iter().map(|(n, _)| *n).collect();
        assert_eq!(declared, produced, "{} index mismatch", R::KIND);
    }

    #[test]
    fn every_kind_produces_its_declared_indexes() {
        let now = Utc::now();
        let user = User::new();
        let food = Food {
            id: FoodId::generate(),
            user_id: user.id.clone(),
            created_at: now,
            updated_at: now,
        };

        assert_indexes_match_schema(&user);
        assert_indexes_match_schema(&food);
        assert_indexes_match_schema(&ApiToken {
            id: TokenId::generate(),
            user_id: user.id.clone(),
            token: "secret".into(),
            expires_at: None,
            revoked_at: None,
            created_at: now,
            updated_at: now,
        });
        assert_indexes_match_schema(&Eat {
            id: EatId::generate(),
            user_id: user.id.clone(),
            food_id: food.id.clone(),
            food_text: "yogurt".into(),
            ate_at: now,
            created_at: now,
            updated_at: now,
        });
        assert_indexes_match_schema(&Poop {
            id: PoopId::generate(),
            user_id: user.id.clone(),
            pooped_at: now,
            quality: Quality::Good,
            created_at: now,
            updated_at: now,
        });
        assert_indexes_match_schema(&FoodName {
            id: FoodNameId::generate(),
            user_id: user.id.clone(),
            food_id: food.id.clone(),
            name: "yogurt".into(),
            created_at: now,
            updated_at: now,
        });
        assert_indexes_match_schema(&Ingredient {
            id: IngredientId::generate(),
            user_id: user.id.clone(),
            resulting_food_id: food.id.clone(),
            component_food_id: food.id.clone(),
            created_at: now,
            updated_at: now,
        });
        assert_indexes_match_schema(&ExternalIdentity {
            id: ExternalIdentityId::generate(),
            user_id: user.id.clone(),
            provider: "apple".into(),
            subject: "000123.abc".into(),
            created_at: now,
            updated_at: now,
        });
    }

    #[test]
    fn scoped_values_are_prefixed_by_owner() {
        assert_eq!(scoped("u1", "coffee"), "u1#coffee");
    }

    #[test]
    fn token_usability() {
        let now = Utc::now();
        let mut token = ApiToken {
            id: TokenId::generate(),
            user_id: UserId::generate(),
            token: "t".into(),
            expires_at: None,
            revoked_at: None,
            created_at: now,
            updated_at: now,
        };
        assert!(token.is_usable_at(now));

        token.expires_at = Some(now);
        assert!(!token.is_usable_at(now), "expiry instant is exclusive");

        token.expires_at = Some(now + chrono::Duration::days(1));
        assert!(token.is_usable_at(now));

        token.revoked_at = Some(now);
        assert!(!token.is_usable_at(now));
    }
}
