use std::path::Path;

use anyhow::{Result, bail};
use chrono::{NaiveDate, NaiveDateTime};
use thiserror::Error;
use tracing::debug;

use crate::aggregate::{DailyBurn, estimated_steps, weekly_burn};
use crate::cache::LocalCache;
use crate::calendar::day_of;
use crate::db::Database;
use crate::models::{
    Goals, GoalsPatch, MealEvent, NewMeal, NewWorkout, ScalarAck, ScalarKind, Snapshot, User,
    UserPatch, WorkoutEvent, validate_goals_patch, validate_new_meal, validate_new_workout,
    validate_user_patch,
};

/// A write refused because of what is already stored.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum Refusal {
    #[error("A name is required to create the profile")]
    NameRequired,
    #[error("No user profile yet. Set one up before editing goals")]
    NoUser,
}

/// Store-side semantics for every endpoint, on top of SQLite.
///
/// Both the HTTP server and the in-process store call into this, so the two
/// transports can't disagree about what a write means.
pub struct FitnessService {
    db: Database,
}

impl FitnessService {
    pub fn new(db_path: &Path) -> Result<Self> {
        let db = Database::open(db_path)?;
        Ok(Self { db })
    }

    pub fn new_in_memory() -> Result<Self> {
        let db = Database::open_in_memory()?;
        Ok(Self { db })
    }

    // --- Bulk load ---

    pub fn snapshot(&self, today: NaiveDate) -> Result<Snapshot> {
        let user = self.db.get_user()?;
        let goals = self.db.get_goals()?.unwrap_or_default();
        let today_stat = self.db.get_daily_stat(today)?;
        Ok(Snapshot {
            user,
            goals,
            workouts: self.db.list_workouts()?,
            meals: self.db.list_meals()?,
            water_ml: today_stat.map_or(0, |s| s.water_ml),
            steps: today_stat.map_or(0, |s| s.steps),
            daily_stats: self.db.list_daily_stats()?,
        })
    }

    // --- Profile ---

    pub fn save_user(&self, patch: &UserPatch) -> Result<User> {
        validate_user_patch(patch)?;
        if self.db.get_user()?.is_none() && patch.name.is_none() {
            bail!(Refusal::NameRequired);
        }
        self.db.upsert_user(patch)
    }

    pub fn save_goals(&self, patch: &GoalsPatch) -> Result<Goals> {
        validate_goals_patch(patch)?;
        match self.db.merge_goals(patch)? {
            Some(goals) => Ok(goals),
            None => bail!(Refusal::NoUser),
        }
    }

    // --- Events ---

    /// Insert the workout, then credit its day with the step estimate.
    pub fn log_workout(&self, workout: &NewWorkout, now: NaiveDateTime) -> Result<WorkoutEvent> {
        validate_new_workout(workout)?;
        let timestamp = workout.timestamp.unwrap_or(now);
        let event = self.db.insert_workout(workout, timestamp)?;
        self.after_workout_logged(&event)?;
        Ok(event)
    }

    fn after_workout_logged(&self, event: &WorkoutEvent) -> Result<()> {
        let date = day_of(&event.timestamp);
        let credit = estimated_steps(event.duration_minutes);
        let stat = self.db.add_daily_steps(date, credit)?;
        debug!(%date, credit, steps = stat.steps, "credited workout steps");
        Ok(())
    }

    pub fn delete_workout(&self, id: &str) -> Result<bool> {
        self.db.delete_workout(id)
    }

    pub fn log_meal(&self, meal: &NewMeal, now: NaiveDateTime) -> Result<MealEvent> {
        validate_new_meal(meal)?;
        let timestamp = meal.timestamp.unwrap_or(now);
        self.db.insert_meal(meal, timestamp)
    }

    pub fn delete_meal(&self, id: &str) -> Result<bool> {
        self.db.delete_meal(id)
    }

    // --- Daily scalars ---

    /// Upsert-by-date; `date` defaults to `today`.
    pub fn set_scalar(
        &self,
        kind: ScalarKind,
        date: Option<NaiveDate>,
        value: u32,
        today: NaiveDate,
    ) -> Result<ScalarAck> {
        let date = date.unwrap_or(today);
        let stat = self.db.set_daily_scalar(kind, date, value)?;
        Ok(ScalarAck {
            date,
            value: stat.get(kind),
        })
    }

    // --- Trends ---

    pub fn calories_burned_trend(&self, today: NaiveDate) -> Result<Vec<DailyBurn>> {
        let cache = LocalCache::from_snapshot(self.snapshot(today)?, today);
        Ok(weekly_burn(&cache, today))
    }
}
