//! # Food Graph Resolver
//!
//! Foods are nodes; `Ingredient` rows are directed edges from a resulting
//! food to one of its components. Names are not nodes: every alias of a
//! food points at the same `FoodId`, so alias collapsing is structural.
//!
//! The resolver answers "what was effectively eaten" for a food: the food
//! itself plus everything reachable through ingredient edges.
//!
//! All traversals are breadth-first over user-scoped index lookups
//! (`user#food`), never table scans. Membership is checked before a node is
//! enqueued, so cycles terminate and no node is visited twice. A failure at
//! any step aborts the whole traversal; partial sets are never returned.

use crate::context::OpContext;
use crate::repository::Repository;
use crate::types::records::{index, scoped};
use crate::types::{Food, FoodId, Ingredient, PottyError, UserId};
use std::collections::{BTreeSet, VecDeque};
use std::sync::Arc;

/// Which way to follow ingredient edges.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    /// resulting -> component ("what is in this?")
    Components,
    /// component -> resulting ("what has this in it?")
    Containing,
}

/// Read-only traversals over a user's ingredient graph.
#[derive(Debug, Clone)]
pub struct FoodGraph {
    repo: Arc<Repository>,
}

impl FoodGraph {
    /// Create a resolver over a shared repository.
    #[must_use]
    pub fn new(repo: Arc<Repository>) -> Self {
        Self { repo }
    }

    /// The set of foods effectively eaten when `start` is eaten.
    ///
    /// Always contains `start`. Fails `NotFound` if `start` is not one of
    /// `user`'s foods.
    pub fn resolve(
        &self,
        ctx: &OpContext,
        user: &UserId,
        start: &FoodId,
    ) -> Result<BTreeSet<FoodId>, PottyError> {
        self.repo.get_owned::<Food>(ctx, user, start.as_str())?;
        let visited = self.closure(ctx, user, start, Direction::Components)?;
        tracing::debug!(food_id = %start, size = visited.len(), "resolved effective foods");
        Ok(visited)
    }

    /// Direct components of `food` (one edge deep).
    pub fn components(
        &self,
        ctx: &OpContext,
        user: &UserId,
        food: &FoodId,
    ) -> Result<BTreeSet<FoodId>, PottyError> {
        self.repo.get_owned::<Food>(ctx, user, food.as_str())?;
        self.neighbours(ctx, user, food, Direction::Components)
    }

    /// Every food that has `food` somewhere in its ingredient tree.
    ///
    /// `food` itself is excluded, even when it sits on a cycle.
    pub fn containing(
        &self,
        ctx: &OpContext,
        user: &UserId,
        food: &FoodId,
    ) -> Result<BTreeSet<FoodId>, PottyError> {
        self.repo.get_owned::<Food>(ctx, user, food.as_str())?;
        let mut visited = self.closure(ctx, user, food, Direction::Containing)?;
        visited.remove(food);
        Ok(visited)
    }

    fn closure(
        &self,
        ctx: &OpContext,
        user: &UserId,
        start: &FoodId,
        direction: Direction,
    ) -> Result<BTreeSet<FoodId>, PottyError> {
        let mut visited = BTreeSet::from([start.clone()]);
        let mut frontier = VecDeque::from([start.clone()]);

        while let Some(current) = frontier.pop_front() {
            ctx.check()?;
            for next in self.neighbours(ctx, user, &current, direction)? {
                if visited.insert(next.clone()) {
                    frontier.push_back(next);
                }
            }
        }

        Ok(visited)
    }

    fn neighbours(
        &self,
        ctx: &OpContext,
        user: &UserId,
        food: &FoodId,
        direction: Direction,
    ) -> Result<BTreeSet<FoodId>, PottyError> {
        let index = match direction {
            Direction::Components => index::USER_RESULTING,
            Direction::Containing => index::USER_COMPONENT,
        };
        let edges: Vec<Ingredient> =
            self.repo
                .query_by_index(ctx, index, &scoped(user.as_str(), food.as_str()))?;

        Ok(edges
            .into_iter()
            .map(|edge| match direction {
                Direction::Components => edge.component_food_id,
                Direction::Containing => edge.resulting_food_id,
            })
            .collect())
    }
}
