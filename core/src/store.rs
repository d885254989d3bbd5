//! The contract the sync engine persists through.

use std::future::Future;
use std::sync::{Arc, Mutex};

use anyhow::{Result, bail};
use chrono::NaiveDate;

use crate::calendar::Clock;
use crate::models::{
    Goals, GoalsPatch, MealEvent, NewMeal, NewWorkout, ScalarAck, ScalarKind, Snapshot, User,
    UserPatch, WorkoutEvent,
};
use crate::service::FitnessService;

/// Durable store for one user's log.
///
/// Every write returns the store's canonical view of what it wrote. Deletes
/// take canonical ids only; a temp id never leaves the client.
pub trait RemoteStore: Send + Sync {
    fn load_all(&self) -> impl Future<Output = Result<Snapshot>> + Send;

    fn save_user(&self, patch: &UserPatch) -> impl Future<Output = Result<User>> + Send;

    fn save_goals(&self, patch: &GoalsPatch) -> impl Future<Output = Result<Goals>> + Send;

    /// The store also credits the workout's day with its step estimate.
    fn create_workout(
        &self,
        workout: &NewWorkout,
    ) -> impl Future<Output = Result<WorkoutEvent>> + Send;

    fn delete_workout(&self, id: &str) -> impl Future<Output = Result<()>> + Send;

    fn create_meal(&self, meal: &NewMeal) -> impl Future<Output = Result<MealEvent>> + Send;

    fn delete_meal(&self, id: &str) -> impl Future<Output = Result<()>> + Send;

    /// Absolute upsert of one field of the record for `date`.
    fn put_scalar(
        &self,
        kind: ScalarKind,
        date: NaiveDate,
        value: u32,
    ) -> impl Future<Output = Result<ScalarAck>> + Send;
}

/// A [`FitnessService`] in the same process, for offline use and tests.
#[derive(Clone)]
pub struct InProcessStore {
    service: Arc<Mutex<FitnessService>>,
    clock: Arc<dyn Clock>,
}

impl InProcessStore {
    pub fn new(service: FitnessService, clock: Arc<dyn Clock>) -> Self {
        Self::shared(Arc::new(Mutex::new(service)), clock)
    }

    pub fn shared(service: Arc<Mutex<FitnessService>>, clock: Arc<dyn Clock>) -> Self {
        Self { service, clock }
    }

    fn with<T>(&self, f: impl FnOnce(&FitnessService) -> Result<T>) -> Result<T> {
        let service = self
            .service
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        f(&service)
    }
}

impl RemoteStore for InProcessStore {
    async fn load_all(&self) -> Result<Snapshot> {
        let today = self.clock.today();
        self.with(|s| s.snapshot(today))
    }

    async fn save_user(&self, patch: &UserPatch) -> Result<User> {
        self.with(|s| s.save_user(patch))
    }

    async fn save_goals(&self, patch: &GoalsPatch) -> Result<Goals> {
        self.with(|s| s.save_goals(patch))
    }

    async fn create_workout(&self, workout: &NewWorkout) -> Result<WorkoutEvent> {
        let now = self.clock.now();
        self.with(|s| s.log_workout(workout, now))
    }

    async fn delete_workout(&self, id: &str) -> Result<()> {
        if !self.with(|s| s.delete_workout(id))? {
            bail!("Workout {id} not found");
        }
        Ok(())
    }

    async fn create_meal(&self, meal: &NewMeal) -> Result<MealEvent> {
        let now = self.clock.now();
        self.with(|s| s.log_meal(meal, now))
    }

    async fn delete_meal(&self, id: &str) -> Result<()> {
        if !self.with(|s| s.delete_meal(id))? {
            bail!("Meal {id} not found");
        }
        Ok(())
    }

    async fn put_scalar(&self, kind: ScalarKind, date: NaiveDate, value: u32) -> Result<ScalarAck> {
        let today = self.clock.today();
        self.with(|s| s.set_scalar(kind, Some(date), value, today))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calendar::{FixedClock, parse_day};

    fn store() -> InProcessStore {
        InProcessStore::new(
            FitnessService::new_in_memory().unwrap(),
            Arc::new(FixedClock::at_noon(parse_day("2024-03-01").unwrap())),
        )
    }

    #[tokio::test]
    async fn test_create_workout_uses_clock_and_credits_steps() {
        let store = store();
        let event = store
            .create_workout(&NewWorkout {
                kind: "Run".to_string(),
                duration_minutes: 30,
                calories_burned: None,
                timestamp: None,
            })
            .await
            .unwrap();
        assert_eq!(event.timestamp.to_string(), "2024-03-01 12:00:00");

        let snapshot = store.load_all().await.unwrap();
        assert_eq!(snapshot.workouts, vec![event]);
        assert_eq!(snapshot.steps, 3000);
    }

    #[tokio::test]
    async fn test_delete_unknown_id_fails() {
        let store = store();
        assert!(store.delete_workout("missing").await.is_err());
        assert!(store.delete_meal("missing").await.is_err());
    }

    #[tokio::test]
    async fn test_put_scalar_echoes_value() {
        let store = store();
        let date = parse_day("2024-02-29").unwrap();
        let ack = store.put_scalar(ScalarKind::Water, date, 750).await.unwrap();
        assert_eq!(ack, ScalarAck { date, value: 750 });
    }
}
