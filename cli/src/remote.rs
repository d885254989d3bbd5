//! Remote store transports the CLI can drive the sync engine through.

use std::time::Duration;

use anyhow::{Context, Result, bail};
use chrono::NaiveDate;
use serde::Deserialize;
use serde::de::DeserializeOwned;

use stride_core::calendar::{format_day, parse_day};
use stride_core::models::{
    Goals, GoalsPatch, MealEvent, NewMeal, NewWorkout, ScalarAck, ScalarKind, Snapshot, User,
    UserPatch, WorkoutEvent,
};
use stride_core::store::{InProcessStore, RemoteStore};

#[derive(Deserialize)]
struct ErrorBody {
    error: String,
}

#[derive(Deserialize)]
struct DeleteBody {
    success: bool,
}

/// Talks to a `stride serve` instance (or anything speaking its routes).
pub struct HttpStore {
    client: reqwest::Client,
    base_url: String,
}

impl HttpStore {
    pub fn new(base_url: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(format!("stride-cli/{}", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(10))
            .connect_timeout(Duration::from_secs(5))
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/api/{path}", self.base_url)
    }

    async fn read<T: DeserializeOwned>(response: reqwest::Response, what: &str) -> Result<T> {
        let status = response.status();
        if !status.is_success() {
            let message = response
                .json::<ErrorBody>()
                .await
                .map_or_else(|_| status.to_string(), |body| body.error);
            bail!("{what} failed ({status}): {message}");
        }
        response
            .json()
            .await
            .with_context(|| format!("Failed to parse {what} response"))
    }

    async fn get<T: DeserializeOwned>(&self, path: &str, what: &str) -> Result<T> {
        let response = self
            .client
            .get(self.url(path))
            .send()
            .await
            .with_context(|| format!("Failed to reach {}", self.base_url))?;
        Self::read(response, what).await
    }

    async fn post<B, T>(&self, path: &str, body: &B, what: &str) -> Result<T>
    where
        B: serde::Serialize + Sync + ?Sized,
        T: DeserializeOwned,
    {
        let response = self
            .client
            .post(self.url(path))
            .json(body)
            .send()
            .await
            .with_context(|| format!("Failed to reach {}", self.base_url))?;
        Self::read(response, what).await
    }

    async fn delete(&self, path: &str, what: &str) -> Result<()> {
        let response = self
            .client
            .delete(self.url(path))
            .send()
            .await
            .with_context(|| format!("Failed to reach {}", self.base_url))?;
        let body: DeleteBody = Self::read(response, what).await?;
        if !body.success {
            bail!("{what} was not acknowledged");
        }
        Ok(())
    }
}

impl RemoteStore for HttpStore {
    async fn load_all(&self) -> Result<Snapshot> {
        self.get("data", "Load").await
    }

    async fn save_user(&self, patch: &UserPatch) -> Result<User> {
        self.post("user", patch, "Saving user").await
    }

    async fn save_goals(&self, patch: &GoalsPatch) -> Result<Goals> {
        self.post("goals", patch, "Saving goals").await
    }

    async fn create_workout(&self, workout: &NewWorkout) -> Result<WorkoutEvent> {
        self.post("workouts", workout, "Creating workout").await
    }

    async fn delete_workout(&self, id: &str) -> Result<()> {
        self.delete(&format!("workouts/{id}"), "Deleting workout")
            .await
    }

    async fn create_meal(&self, meal: &NewMeal) -> Result<MealEvent> {
        self.post("meals", meal, "Creating meal").await
    }

    async fn delete_meal(&self, id: &str) -> Result<()> {
        self.delete(&format!("meals/{id}"), "Deleting meal").await
    }

    async fn put_scalar(&self, kind: ScalarKind, date: NaiveDate, value: u32) -> Result<ScalarAck> {
        let mut body = serde_json::Map::new();
        body.insert(kind.request_field().to_string(), value.into());
        body.insert("date".to_string(), format_day(date).into());

        let echo: serde_json::Value = self
            .post(kind.as_str(), &body, &format!("Saving {kind}"))
            .await?;
        let value = echo[kind.response_field()]
            .as_u64()
            .and_then(|v| u32::try_from(v).ok())
            .with_context(|| format!("Missing {} in {kind} response", kind.response_field()))?;
        let date = echo["date"]
            .as_str()
            .context("Missing date in response")
            .and_then(parse_day)?;
        Ok(ScalarAck { date, value })
    }
}

/// The store selected at startup: the local database, or a server.
pub enum Backend {
    Local(InProcessStore),
    Http(HttpStore),
}

impl RemoteStore for Backend {
    async fn load_all(&self) -> Result<Snapshot> {
        match self {
            Self::Local(store) => store.load_all().await,
            Self::Http(store) => store.load_all().await,
        }
    }

    async fn save_user(&self, patch: &UserPatch) -> Result<User> {
        match self {
            Self::Local(store) => store.save_user(patch).await,
            Self::Http(store) => store.save_user(patch).await,
        }
    }

    async fn save_goals(&self, patch: &GoalsPatch) -> Result<Goals> {
        match self {
            Self::Local(store) => store.save_goals(patch).await,
            Self::Http(store) => store.save_goals(patch).await,
        }
    }

    async fn create_workout(&self, workout: &NewWorkout) -> Result<WorkoutEvent> {
        match self {
            Self::Local(store) => store.create_workout(workout).await,
            Self::Http(store) => store.create_workout(workout).await,
        }
    }

    async fn delete_workout(&self, id: &str) -> Result<()> {
        match self {
            Self::Local(store) => store.delete_workout(id).await,
            Self::Http(store) => store.delete_workout(id).await,
        }
    }

    async fn create_meal(&self, meal: &NewMeal) -> Result<MealEvent> {
        match self {
            Self::Local(store) => store.create_meal(meal).await,
            Self::Http(store) => store.create_meal(meal).await,
        }
    }

    async fn delete_meal(&self, id: &str) -> Result<()> {
        match self {
            Self::Local(store) => store.delete_meal(id).await,
            Self::Http(store) => store.delete_meal(id).await,
        }
    }

    async fn put_scalar(&self, kind: ScalarKind, date: NaiveDate, value: u32) -> Result<ScalarAck> {
        match self {
            Self::Local(store) => store.put_scalar(kind, date, value).await,
            Self::Http(store) => store.put_scalar(kind, date, value).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;
    use crate::server::{AppState, build_router};
    use stride_core::calendar::{Clock, FixedClock};
    use stride_core::service::FitnessService;
    use stride_core::sync::{SyncEngine, SyncError};

    fn clock() -> Arc<dyn Clock> {
        Arc::new(FixedClock::at_noon(parse_day("2024-03-01").unwrap()))
    }

    /// Serve an in-memory store on an ephemeral port.
    async fn spawn_server() -> (String, Arc<Mutex<FitnessService>>) {
        let service = Arc::new(Mutex::new(FitnessService::new_in_memory().unwrap()));
        let app = build_router(AppState::new(Arc::clone(&service), clock()));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, app).await });
        (format!("http://{addr}/"), service)
    }

    #[tokio::test]
    async fn http_store_speaks_server_routes() {
        let (url, _) = spawn_server().await;
        let store = HttpStore::new(&url).unwrap();

        let user = store
            .save_user(&UserPatch {
                name: Some("Ada".to_string()),
                ..UserPatch::default()
            })
            .await
            .unwrap();
        assert_eq!(user.name, "Ada");

        let workout = store
            .create_workout(&NewWorkout {
                kind: "Run".to_string(),
                duration_minutes: 30,
                calories_burned: None,
                timestamp: None,
            })
            .await
            .unwrap();
        assert!(!workout.id.is_temp());

        let ack = store
            .put_scalar(ScalarKind::Water, parse_day("2024-03-01").unwrap(), 750)
            .await
            .unwrap();
        assert_eq!(ack.value, 750);

        let snapshot = store.load_all().await.unwrap();
        assert_eq!(snapshot.workouts, vec![workout.clone()]);
        assert_eq!(snapshot.water_ml, 750);
        assert_eq!(snapshot.steps, 3000);

        let id = workout.id.canonical().unwrap();
        store.delete_workout(id).await.unwrap();
        let err = store.delete_workout(id).await.unwrap_err();
        assert!(format!("{err:#}").contains("not found"));
    }

    #[tokio::test]
    async fn http_store_surfaces_server_errors() {
        let (url, _) = spawn_server().await;
        let store = HttpStore::new(&url).unwrap();

        let err = store
            .save_goals(&GoalsPatch {
                steps: Some(12_000),
                ..GoalsPatch::default()
            })
            .await
            .unwrap_err();
        assert!(err.to_string().contains("User not found"));
    }

    #[tokio::test]
    async fn unreachable_server_is_an_error() {
        let store = HttpStore::new("http://127.0.0.1:9").unwrap();
        assert!(store.load_all().await.is_err());
    }

    #[tokio::test]
    async fn sync_engine_over_http() {
        let (url, service) = spawn_server().await;
        let engine = SyncEngine::new(Backend::Http(HttpStore::new(&url).unwrap()), clock());

        engine.load_all().await.unwrap();
        engine
            .set_user(UserPatch {
                name: Some("Ada".to_string()),
                ..UserPatch::default()
            })
            .await
            .unwrap();
        let meal = engine
            .add_meal(NewMeal {
                name: "Banana".to_string(),
                calories: 105.0,
                protein_grams: 1.3,
                timestamp: None,
            })
            .await
            .unwrap();
        engine
            .adjust_scalar(ScalarKind::Steps, 1200)
            .await
            .unwrap();

        let totals = engine.live_today_totals();
        assert_eq!(totals.day.meals, vec![meal.clone()]);
        assert_eq!(totals.day.steps, 1200);
        assert_eq!(engine.pending_mutations(), 0);

        let today = parse_day("2024-03-01").unwrap();
        let stored = service.lock().unwrap().snapshot(today).unwrap();
        assert_eq!(stored.meals, vec![meal]);
        assert_eq!(stored.steps, 1200);

        let err = engine
            .remove_meal(&stride_core::models::EntityId::from("missing"))
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::UnknownId(_)));
    }

    #[tokio::test]
    async fn backend_delegates_to_local_store() {
        let backend = Backend::Local(InProcessStore::new(
            FitnessService::new_in_memory().unwrap(),
            clock(),
        ));
        let ack = backend
            .put_scalar(ScalarKind::Steps, parse_day("2024-02-29").unwrap(), 4000)
            .await
            .unwrap();
        assert_eq!(ack.value, 4000);
        let snapshot = backend.load_all().await.unwrap();
        assert_eq!(snapshot.daily_stats.len(), 1);
    }

    #[tokio::test]
    async fn local_backend_persists_between_runs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stride.db");

        let engine = SyncEngine::new(
            Backend::Local(InProcessStore::new(FitnessService::new(&path).unwrap(), clock())),
            clock(),
        );
        engine.load_all().await.unwrap();
        engine
            .set_scalar_for_date(ScalarKind::Water, 1500, parse_day("2024-03-01").unwrap())
            .await
            .unwrap();
        drop(engine);

        let engine = SyncEngine::new(
            Backend::Local(InProcessStore::new(FitnessService::new(&path).unwrap(), clock())),
            clock(),
        );
        engine.load_all().await.unwrap();
        assert_eq!(engine.live_today_totals().day.water_ml, 1500);
    }
}
