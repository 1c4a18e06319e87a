//! # Journal
//!
//! Logs eat and poop events for an authenticated user.
//!
//! Every write is owned by the [`Authenticated`] identity passed in; the
//! payload never chooses its owner. Submitting an entry with an `id` that
//! already exists re-submits that event: the row is replaced and keeps its
//! original `created_at`.

use crate::auth::Authenticated;
use crate::context::OpContext;
use crate::cupboard::Cupboard;
use crate::graph::FoodGraph;
use crate::primitives::MAX_NAME_LENGTH;
use crate::repository::Repository;
use crate::types::records::index;
use crate::types::{Eat, EatId, Food, FoodId, Poop, PoopId, PottyError, Quality, Record};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;

/// An eat event as submitted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EatEntry {
    /// Set to re-submit an existing event.
    #[serde(default)]
    pub id: Option<EatId>,
    /// The food eaten. Takes precedence over `food_text` for identity.
    #[serde(default)]
    pub food_id: Option<FoodId>,
    /// Free text as the user typed it.
    #[serde(default)]
    pub food_text: Option<String>,
    pub ate_at: DateTime<Utc>,
}

/// A poop event as submitted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoopEntry {
    /// Set to re-submit an existing event.
    #[serde(default)]
    pub id: Option<PoopId>,
    pub pooped_at: DateTime<Utc>,
    /// Raw quality; only `-1` and `1` are accepted.
    pub quality: i64,
}

/// Event logging for one store.
#[derive(Debug, Clone)]
pub struct Journal {
    repo: Arc<Repository>,
    cupboard: Cupboard,
    graph: FoodGraph,
}

impl Journal {
    #[must_use]
    pub fn new(repo: Arc<Repository>, cupboard: Cupboard, graph: FoodGraph) -> Self {
        Self {
            repo,
            cupboard,
            graph,
        }
    }

    /// Log that the caller ate one food.
    ///
    /// With `food_id`, that food must be the caller's. With only
    /// `food_text`, the text is looked up (or created) in the cupboard.
    /// `food_text` is frozen on the event as submitted; without it, the
    /// food's oldest name is frozen instead.
    pub fn log_eat(
        &self,
        ctx: &OpContext,
        auth: &Authenticated,
        entry: EatEntry,
    ) -> Result<Eat, PottyError> {
        let user = auth.user_id();
        let text = entry
            .food_text
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty());
        if text.is_some_and(|t| t.len() > MAX_NAME_LENGTH) {
            return Err(PottyError::BadInput(format!(
                "food_text longer than {MAX_NAME_LENGTH} bytes"
            )));
        }

        let food_id = match (entry.food_id, text) {
            (Some(food_id), _) => {
                self.repo
                    .get_owned::<Food>(ctx, user, food_id.as_str())?
                    .id
            }
            (None, Some(text)) => self.cupboard.food_for_name(ctx, auth, text)?,
            (None, None) => {
                return Err(PottyError::BadInput(
                    "an eat needs a food_id or food_text".to_string(),
                ));
            }
        };

        let food_text = match text {
            Some(text) => text.to_string(),
            None => self
                .cupboard
                .names(ctx, user, &food_id)?
                .into_iter()
                .next()
                .map(|name| name.name)
                .unwrap_or_default(),
        };

        let id = event_id::<Eat>(entry.id.map(|id| id.to_string()))?;
        let now = Utc::now();
        let eat = self.store_event(
            ctx,
            auth,
            Eat {
                id: EatId::new(id),
                user_id: user.clone(),
                food_id,
                food_text,
                ate_at: entry.ate_at,
                created_at: now,
                updated_at: now,
            },
        )?;
        tracing::debug!(eat_id = %eat.id, food_id = %eat.food_id, "logged eat");
        Ok(eat)
    }

    /// Log a bowel movement.
    pub fn log_poop(
        &self,
        ctx: &OpContext,
        auth: &Authenticated,
        entry: PoopEntry,
    ) -> Result<Poop, PottyError> {
        let quality = Quality::try_from(entry.quality)?;
        let id = event_id::<Poop>(entry.id.map(|id| id.to_string()))?;

        let now = Utc::now();
        let poop = self.store_event(
            ctx,
            auth,
            Poop {
                id: PoopId::new(id),
                user_id: auth.user_id().clone(),
                pooped_at: entry.pooped_at,
                quality,
                created_at: now,
                updated_at: now,
            },
        )?;
        tracing::debug!(poop_id = %poop.id, quality = quality.value(), "logged poop");
        Ok(poop)
    }

    /// The caller's eats, oldest first.
    pub fn eats(&self, ctx: &OpContext, auth: &Authenticated) -> Result<Vec<Eat>, PottyError> {
        let mut eats: Vec<Eat> =
            self.repo
                .query_by_index(ctx, index::USER_ID, auth.user_id().as_str())?;
        eats.sort_by(|a, b| a.ate_at.cmp(&b.ate_at).then_with(|| a.id.cmp(&b.id)));
        Ok(eats)
    }

    /// The caller's poops, oldest first.
    pub fn poops(&self, ctx: &OpContext, auth: &Authenticated) -> Result<Vec<Poop>, PottyError> {
        let mut poops: Vec<Poop> =
            self.repo
                .query_by_index(ctx, index::USER_ID, auth.user_id().as_str())?;
        poops.sort_by(|a, b| a.pooped_at.cmp(&b.pooped_at).then_with(|| a.id.cmp(&b.id)));
        Ok(poops)
    }

    /// Everything effectively eaten by one of the caller's eat events.
    pub fn effective_foods(
        &self,
        ctx: &OpContext,
        auth: &Authenticated,
        eat: &EatId,
    ) -> Result<BTreeSet<FoodId>, PottyError> {
        let eat = self
            .repo
            .get_owned::<Eat>(ctx, auth.user_id(), eat.as_str())?;
        self.graph.resolve(ctx, auth.user_id(), &eat.food_id)
    }

    /// Write a new or re-submitted event.
    ///
    /// An existing row with the same id must belong to the caller; the
    /// ownership check and the write share one transaction.
    fn store_event<R: Record>(
        &self,
        ctx: &OpContext,
        auth: &Authenticated,
        event: R,
    ) -> Result<R, PottyError> {
        self.repo.write(ctx, |scope| {
            if let Some(existing) = scope.get::<R>(event.key())?
                && existing.owner() != auth.user_id()
            {
                return Err(PottyError::BadInput(format!(
                    "{} {} belongs to another user",
                    R::KIND,
                    event.key()
                )));
            }
            scope.put(&event)
        })
    }
}

/// The id for a new event, or the validated id of a re-submitted one.
fn event_id<R: Record>(submitted: Option<String>) -> Result<String, PottyError> {
    match submitted {
        None => Ok(uuid::Uuid::new_v4().to_string()),
        Some(id) if id.trim().is_empty() => Err(PottyError::BadInput(format!(
            "{} id must not be empty",
            R::KIND
        ))),
        Some(id) => Ok(id),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;
    use crate::test_support::Harness;
    use chrono::Duration;
    use tempfile::tempdir;

    fn eat_text(text: &str) -> EatEntry {
        EatEntry {
            id: None,
            food_id: None,
            food_text: Some(text.to_string()),
            ate_at: Utc::now(),
        }
    }

    fn poop(quality: i64) -> PoopEntry {
        PoopEntry {
            id: None,
            pooped_at: Utc::now(),
            quality,
        }
    }

    #[test]
    fn eat_by_text_uses_cupboard() {
        let temp = tempdir().expect("temp dir");
        let h = Harness::open(temp.path());
        let auth = h.sign_up();
        let journal = h.backend.journal();

        let first = journal.log_eat(&h.ctx, &auth, eat_text("Yogurt")).unwrap();
        let second = journal.log_eat(&h.ctx, &auth, eat_text("yogurt")).unwrap();
        assert_eq!(first.food_id, second.food_id);
        assert_eq!(first.food_text, "Yogurt", "text is frozen as submitted");
        assert_eq!(first.user_id, *auth.user_id());
    }

    #[test]
    fn eat_by_id_honours_submitted_food() {
        let temp = tempdir().expect("temp dir");
        let h = Harness::open(temp.path());
        let auth = h.sign_up();
        let cake = h
            .backend
            .cupboard()
            .food_for_name(&h.ctx, &auth, "coffee cake")
            .unwrap();

        let eat = h
            .backend
            .journal()
            .log_eat(
                &h.ctx,
                &auth,
                EatEntry {
                    id: None,
                    food_id: Some(cake.clone()),
                    food_text: None,
                    ate_at: Utc::now(),
                },
            )
            .unwrap();
        assert_eq!(eat.food_id, cake);
        assert_eq!(eat.food_text, "coffee cake");
    }

    #[test]
    fn eat_needs_a_food() {
        let temp = tempdir().expect("temp dir");
        let h = Harness::open(temp.path());
        let auth = h.sign_up();
        let entry = EatEntry {
            id: None,
            food_id: None,
            food_text: Some("   ".into()),
            ate_at: Utc::now(),
        };
        assert!(matches!(
            h.backend.journal().log_eat(&h.ctx, &auth, entry),
            Err(PottyError::BadInput(_))
        ));
    }

    #[test]
    fn eat_of_foreign_food_is_not_found() {
        let temp = tempdir().expect("temp dir");
        let h = Harness::open(temp.path());
        let alice = h.sign_up();
        let bob = h.sign_up();
        let alice_food = h
            .backend
            .cupboard()
            .food_for_name(&h.ctx, &alice, "toast")
            .unwrap();

        let entry = EatEntry {
            id: None,
            food_id: Some(alice_food),
            food_text: None,
            ate_at: Utc::now(),
        };
        let err = h
            .backend
            .journal()
            .log_eat(&h.ctx, &bob, entry)
            .expect_err("not bob's");
        assert!(err.is_not_found());
    }

    #[test]
    fn poop_quality_is_validated() {
        let temp = tempdir().expect("temp dir");
        let h = Harness::open(temp.path());
        let auth = h.sign_up();
        let journal = h.backend.journal();

        assert!(matches!(
            journal.log_poop(&h.ctx, &auth, poop(0)),
            Err(PottyError::BadInput(_))
        ));
        let good = journal.log_poop(&h.ctx, &auth, poop(1)).unwrap();
        assert_eq!(good.quality.value(), 1);
        assert_eq!(journal.poops(&h.ctx, &auth).unwrap(), vec![good]);
    }

    #[test]
    fn resubmission_updates_in_place() {
        let temp = tempdir().expect("temp dir");
        let h = Harness::open(temp.path());
        let auth = h.sign_up();
        let journal = h.backend.journal();

        let original = journal.log_poop(&h.ctx, &auth, poop(-1)).unwrap();
        let mut entry = poop(1);
        entry.id = Some(original.id.clone());
        let updated = journal.log_poop(&h.ctx, &auth, entry).unwrap();

        assert_eq!(updated.id, original.id);
        assert_eq!(updated.created_at, original.created_at);
        assert_eq!(updated.quality, Quality::Good);
        assert_eq!(journal.poops(&h.ctx, &auth).unwrap().len(), 1);
    }

    #[test]
    fn resubmission_cannot_take_over_foreign_event() {
        let temp = tempdir().expect("temp dir");
        let h = Harness::open(temp.path());
        let alice = h.sign_up();
        let bob = h.sign_up();
        let journal = h.backend.journal();

        let alices = journal.log_poop(&h.ctx, &alice, poop(1)).unwrap();
        let mut entry = poop(-1);
        entry.id = Some(alices.id.clone());
        assert!(matches!(
            journal.log_poop(&h.ctx, &bob, entry),
            Err(PottyError::BadInput(_))
        ));
        assert_eq!(journal.poops(&h.ctx, &alice).unwrap(), vec![alices]);
    }

    #[test]
    fn events_are_listed_by_time_and_user() {
        let temp = tempdir().expect("temp dir");
        let h = Harness::open(temp.path());
        let alice = h.sign_up();
        let bob = h.sign_up();
        let journal = h.backend.journal();
        let now = Utc::now();

        let mut later = eat_text("lunch");
        later.ate_at = now;
        let mut earlier = eat_text("breakfast");
        earlier.ate_at = now - Duration::hours(4);

        journal.log_eat(&h.ctx, &alice, later).unwrap();
        journal.log_eat(&h.ctx, &alice, earlier).unwrap();
        journal.log_eat(&h.ctx, &bob, eat_text("dinner")).unwrap();

        let texts: Vec<String> = journal
            .eats(&h.ctx, &alice)
            .unwrap()
            .into_iter()
            .map(|e| e.food_text)
            .collect();
        assert_eq!(texts, vec!["breakfast", "lunch"]);
    }

    #[test]
    fn effective_foods_follow_ingredients() {
        let temp = tempdir().expect("temp dir");
        let h = Harness::open(temp.path());
        let auth = h.sign_up();
        let cupboard = h.backend.cupboard();

        let latte = cupboard.food_for_name(&h.ctx, &auth, "latte").unwrap();
        let milk = cupboard.food_for_name(&h.ctx, &auth, "milk").unwrap();
        cupboard.add_ingredient(&h.ctx, &auth, &latte, &milk).unwrap();

        let eat = h
            .backend
            .journal()
            .log_eat(&h.ctx, &auth, eat_text("latte"))
            .unwrap();
        let foods = h
            .backend
            .journal()
            .effective_foods(&h.ctx, &auth, &eat.id)
            .unwrap();
        assert_eq!(foods, BTreeSet::from([latte, milk]));
    }
}
