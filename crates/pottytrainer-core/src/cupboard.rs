//! # Cupboard
//!
//! Turns free text into foods and manages a user's food vocabulary:
//! names (aliases) and ingredient edges.
//!
//! Names are normalized by trimming and lower-casing before they are stored
//! or looked up, so "Yogurt " and "yogurt" are the same name. Distinct
//! spellings ("yogurt", "yoghurt") become aliases only when explicitly bound
//! to the same food with [`Cupboard::add_name`].

use crate::auth::Authenticated;
use crate::context::OpContext;
use crate::primitives::MAX_NAME_LENGTH;
use crate::repository::{Repository, WriteScope};
use crate::types::records::{index, scoped};
use crate::types::{Food, FoodId, FoodName, FoodNameId, Ingredient, IngredientId, PottyError, UserId};
use chrono::Utc;
use std::sync::Arc;

/// Normalize a food name: trim, lower-case, and bound its length.
pub fn normalize_name(text: &str) -> Result<String, PottyError> {
    let name = text.trim().to_lowercase();
    if name.is_empty() {
        return Err(PottyError::BadInput("food name must not be empty".to_string()));
    }
    if name.len() > MAX_NAME_LENGTH {
        return Err(PottyError::BadInput(format!(
            "food name longer than {MAX_NAME_LENGTH} bytes"
        )));
    }
    Ok(name)
}

/// A user's foods, their names, and their ingredients.
#[derive(Debug, Clone)]
pub struct Cupboard {
    repo: Arc<Repository>,
}

impl Cupboard {
    /// Create a cupboard over a shared repository.
    #[must_use]
    pub fn new(repo: Arc<Repository>) -> Self {
        Self { repo }
    }

    /// The food `text` names for `user`, if any.
    pub fn find(
        &self,
        ctx: &OpContext,
        user: &UserId,
        text: &str,
    ) -> Result<Option<FoodId>, PottyError> {
        let name = normalize_name(text)?;
        self.lookup(ctx, user, &name)
            .map(|found| found.map(|row| row.food_id))
    }

    /// The food `text` names, creating a new food with that name if needed.
    ///
    /// Concurrent callers with the same text all receive the same food.
    pub fn food_for_name(
        &self,
        ctx: &OpContext,
        auth: &Authenticated,
        text: &str,
    ) -> Result<FoodId, PottyError> {
        let name = normalize_name(text)?;
        if let Some(existing) = self.lookup(ctx, auth.user_id(), &name)? {
            return Ok(existing.food_id);
        }
        self.repo
            .write(ctx, |scope| food_in(scope, auth.user_id(), name))
    }

    /// Find or create the food `text` names and bind every alias to it.
    ///
    /// All or nothing: an alias that already names a different food fails
    /// the call and no food, name or alias is written.
    pub fn create_food(
        &self,
        ctx: &OpContext,
        auth: &Authenticated,
        text: &str,
        aliases: &[String],
    ) -> Result<FoodId, PottyError> {
        let user = auth.user_id();
        let name = normalize_name(text)?;
        let aliases = aliases
            .iter()
            .map(|alias| normalize_name(alias))
            .collect::<Result<Vec<_>, _>>()?;

        self.repo.write(ctx, |scope| {
            let food = food_in(scope, user, name)?;
            for alias in aliases {
                name_in(scope, user, &food, alias)?;
            }
            Ok(food)
        })
    }

    /// Bind another name to an existing food.
    ///
    /// Re-binding a name to the food it already names returns the existing
    /// row. A name already bound to a different food is rejected.
    pub fn add_name(
        &self,
        ctx: &OpContext,
        auth: &Authenticated,
        food: &FoodId,
        text: &str,
    ) -> Result<FoodName, PottyError> {
        let user = auth.user_id();
        let name = normalize_name(text)?;
        self.repo.get_owned::<Food>(ctx, user, food.as_str())?;
        self.repo
            .write(ctx, |scope| name_in(scope, user, food, name))
    }

    /// Record that `resulting` contains `component`.
    ///
    /// Both foods must belong to the caller. An identical edge is returned
    /// rather than duplicated.
    pub fn add_ingredient(
        &self,
        ctx: &OpContext,
        auth: &Authenticated,
        resulting: &FoodId,
        component: &FoodId,
    ) -> Result<Ingredient, PottyError> {
        let user = auth.user_id();
        self.repo.get_owned::<Food>(ctx, user, resulting.as_str())?;
        self.repo.get_owned::<Food>(ctx, user, component.as_str())?;

        self.repo.write(ctx, |scope| {
            let existing: Vec<Ingredient> = scope.query_by_index(
                index::USER_RESULTING,
                &scoped(user.as_str(), resulting.as_str()),
            )?;
            if let Some(edge) = existing
                .into_iter()
                .find(|edge| edge.component_food_id == *component)
            {
                return Ok(edge);
            }

            let now = Utc::now();
            scope.put(&Ingredient {
                id: IngredientId::generate(),
                user_id: user.clone(),
                resulting_food_id: resulting.clone(),
                component_food_id: component.clone(),
                created_at: now,
                updated_at: now,
            })
        })
    }

    /// Every name of `food`, oldest first.
    pub fn names(
        &self,
        ctx: &OpContext,
        user: &UserId,
        food: &FoodId,
    ) -> Result<Vec<FoodName>, PottyError> {
        let mut names: Vec<FoodName> = self.repo.query_by_index(
            ctx,
            index::USER_FOOD,
            &scoped(user.as_str(), food.as_str()),
        )?;
        names.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.name.cmp(&b.name)));
        Ok(names)
    }

    fn lookup(
        &self,
        ctx: &OpContext,
        user: &UserId,
        name: &str,
    ) -> Result<Option<FoodName>, PottyError> {
        match self
            .repo
            .get_by_index::<FoodName>(ctx, index::USER_NAME, &scoped(user.as_str(), name))
        {
            Ok(row) => Ok(Some(row)),
            Err(err) if err.is_not_found() => Ok(None),
            Err(err) => Err(err),
        }
    }
}

/// The food `name` (already normalized) names, created inside `scope` if
/// the name is free.
fn food_in(scope: &WriteScope<'_>, user: &UserId, name: String) -> Result<FoodId, PottyError> {
    if let Some(existing) =
        scope.get_by_index::<FoodName>(index::USER_NAME, &scoped(user.as_str(), &name))?
    {
        return Ok(existing.food_id);
    }

    let now = Utc::now();
    let food = scope.put(&Food {
        id: FoodId::generate(),
        user_id: user.clone(),
        created_at: now,
        updated_at: now,
    })?;
    scope.put(&name_row(user, &food.id, name))?;
    tracing::debug!(food_id = %food.id, "created food");
    Ok(food.id)
}

/// Bind `name` (already normalized) to `food` inside `scope`.
fn name_in(
    scope: &WriteScope<'_>,
    user: &UserId,
    food: &FoodId,
    name: String,
) -> Result<FoodName, PottyError> {
    match scope.get_by_index::<FoodName>(index::USER_NAME, &scoped(user.as_str(), &name))? {
        Some(existing) if existing.food_id == *food => Ok(existing),
        Some(existing) => Err(PottyError::BadInput(format!(
            "name {:?} already belongs to food {}",
            existing.name, existing.food_id
        ))),
        None => scope.put(&name_row(user, food, name)),
    }
}

fn name_row(user: &UserId, food: &FoodId, name: String) -> FoodName {
    let now = Utc::now();
    FoodName {
        id: FoodNameId::generate(),
        user_id: user.clone(),
        food_id: food.clone(),
        name,
        created_at: now,
        updated_at: now,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;
    use crate::test_support::Harness;
    use tempfile::tempdir;

    #[test]
    fn normalization() {
        assert_eq!(normalize_name("  Coffee Cake ").unwrap(), "coffee cake");
        assert!(matches!(normalize_name(" \t"), Err(PottyError::BadInput(_))));
        let long = "a".repeat(MAX_NAME_LENGTH + 1);
        assert!(matches!(normalize_name(&long), Err(PottyError::BadInput(_))));
        assert!(normalize_name(&"a".repeat(MAX_NAME_LENGTH)).is_ok());
    }

    #[test]
    fn food_for_name_is_get_or_create() {
        let temp = tempdir().expect("temp dir");
        let h = Harness::open(temp.path());
        let auth = h.sign_up();
        let cupboard = h.backend.cupboard();

        let first = cupboard.food_for_name(&h.ctx, &auth, "Yogurt").unwrap();
        let second = cupboard.food_for_name(&h.ctx, &auth, " yogurt ").unwrap();
        assert_eq!(first, second);
        assert_eq!(
            cupboard.find(&h.ctx, auth.user_id(), "YOGURT").unwrap(),
            Some(first)
        );
    }

    #[test]
    fn aliases_share_one_food() {
        let temp = tempdir().expect("temp dir");
        let h = Harness::open(temp.path());
        let auth = h.sign_up();
        let cupboard = h.backend.cupboard();

        let food = cupboard.food_for_name(&h.ctx, &auth, "yogurt").unwrap();
        cupboard.add_name(&h.ctx, &auth, &food, "yoghurt").unwrap();

        assert_eq!(
            cupboard.food_for_name(&h.ctx, &auth, "yoghurt").unwrap(),
            food
        );
        let mut names: Vec<String> = cupboard
            .names(&h.ctx, auth.user_id(), &food)
            .unwrap()
            .into_iter()
            .map(|n| n.name)
            .collect();
        names.sort();
        assert_eq!(names, vec!["yoghurt", "yogurt"]);
    }

    #[test]
    fn add_name_is_idempotent_and_exclusive() {
        let temp = tempdir().expect("temp dir");
        let h = Harness::open(temp.path());
        let auth = h.sign_up();
        let cupboard = h.backend.cupboard();

        let yogurt = cupboard.food_for_name(&h.ctx, &auth, "yogurt").unwrap();
        let milk = cupboard.food_for_name(&h.ctx, &auth, "milk").unwrap();

        let alias = cupboard.add_name(&h.ctx, &auth, &yogurt, "yoghurt").unwrap();
        let again = cupboard.add_name(&h.ctx, &auth, &yogurt, "Yoghurt").unwrap();
        assert_eq!(alias.id, again.id);

        let err = cupboard
            .add_name(&h.ctx, &auth, &milk, "yogurt")
            .expect_err("bound elsewhere");
        assert!(matches!(err, PottyError::BadInput(_)));
    }

    #[test]
    fn names_are_per_user() {
        let temp = tempdir().expect("temp dir");
        let h = Harness::open(temp.path());
        let alice = h.sign_up();
        let bob = h.sign_up();
        let cupboard = h.backend.cupboard();

        let alice_food = cupboard.food_for_name(&h.ctx, &alice, "coffee").unwrap();
        let bob_food = cupboard.food_for_name(&h.ctx, &bob, "coffee").unwrap();
        assert_ne!(alice_food, bob_food);

        let err = cupboard
            .add_name(&h.ctx, &bob, &alice_food, "java")
            .expect_err("not bob's food");
        assert!(err.is_not_found());
    }

    #[test]
    fn add_ingredient_dedupes_edges() {
        let temp = tempdir().expect("temp dir");
        let h = Harness::open(temp.path());
        let auth = h.sign_up();
        let cupboard = h.backend.cupboard();

        let cake = cupboard.food_for_name(&h.ctx, &auth, "coffee cake").unwrap();
        let eggs = cupboard.food_for_name(&h.ctx, &auth, "eggs").unwrap();

        let first = cupboard.add_ingredient(&h.ctx, &auth, &cake, &eggs).unwrap();
        let second = cupboard.add_ingredient(&h.ctx, &auth, &cake, &eggs).unwrap();
        assert_eq!(first.id, second.id);
    }

    #[test]
    fn add_ingredient_requires_owned_foods() {
        let temp = tempdir().expect("temp dir");
        let h = Harness::open(temp.path());
        let alice = h.sign_up();
        let bob = h.sign_up();
        let cupboard = h.backend.cupboard();

        let cake = cupboard.food_for_name(&h.ctx, &alice, "cake").unwrap();
        let eggs = cupboard.food_for_name(&h.ctx, &bob, "eggs").unwrap();

        let err = cupboard
            .add_ingredient(&h.ctx, &alice, &cake, &eggs)
            .expect_err("eggs belong to bob");
        assert!(err.is_not_found());
    }

    #[test]
    fn concurrent_callers_share_one_food() {
        let temp = tempdir().expect("temp dir");
        let h = Harness::open(temp.path());
        let auth = &h.sign_up();
        let ctx = &h.ctx;
        let cupboard = h.backend.cupboard();

        for round in 0..10 {
            let text = format!("yogurt{round}");
            let text = text.as_str();
            let foods: Vec<FoodId> = std::thread::scope(|s| {
                let workers: Vec<_> = (0..8)
                    .map(|_| s.spawn(move || cupboard.food_for_name(ctx, auth, text).unwrap()))
                    .collect();
                workers.into_iter().map(|w| w.join().unwrap()).collect()
            });
            assert!(foods.iter().all(|food| *food == foods[0]), "round {round}");
        }

        let stored = h.backend.repository().count::<Food>(&h.ctx).unwrap();
        assert_eq!(stored, 10);
    }

    #[test]
    fn create_food_binds_aliases() {
        let temp = tempdir().expect("temp dir");
        let h = Harness::open(temp.path());
        let auth = h.sign_up();
        let cupboard = h.backend.cupboard();

        let aliases = vec!["Yoghurt".to_string(), "yogurt".to_string()];
        let food = cupboard
            .create_food(&h.ctx, &auth, "yogurt", &aliases)
            .unwrap();
        assert_eq!(cupboard.names(&h.ctx, auth.user_id(), &food).unwrap().len(), 2);
    }

    #[test]
    fn create_food_with_taken_alias_writes_nothing() {
        let temp = tempdir().expect("temp dir");
        let h = Harness::open(temp.path());
        let auth = h.sign_up();
        let cupboard = h.backend.cupboard();
        cupboard.food_for_name(&h.ctx, &auth, "milk").unwrap();
        let repo = h.backend.repository();
        let foods_before = repo.count::<Food>(&h.ctx).unwrap();

        let aliases = vec!["dairy".to_string(), "milk".to_string()];
        let err = cupboard
            .create_food(&h.ctx, &auth, "cream", &aliases)
            .expect_err("milk is taken");
        assert!(matches!(err, PottyError::BadInput(_)));

        assert_eq!(repo.count::<Food>(&h.ctx).unwrap(), foods_before);
        assert_eq!(cupboard.find(&h.ctx, auth.user_id(), "cream").unwrap(), None);
        assert_eq!(cupboard.find(&h.ctx, auth.user_id(), "dairy").unwrap(), None);
    }
}
