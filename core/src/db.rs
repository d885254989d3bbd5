use std::path::Path;

use anyhow::{Context, Result};
use chrono::{Local, NaiveDate, NaiveDateTime};
use rusqlite::{Connection, OptionalExtension, params};
use uuid::Uuid;

use crate::calendar::{format_day, parse_day, parse_timestamp};
use crate::models::{
    DailyStat, EntityId, Goals, GoalsPatch, MealEvent, NewMeal, NewWorkout, ScalarKind, User,
    UserPatch, WorkoutEvent,
};

const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.f";

pub struct Database {
    conn: Connection,
}

impl Database {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open database: {}", path.display()))?;
        let db = Database { conn };
        db.migrate()?;
        Ok(db)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Database { conn };
        db.migrate()?;
        Ok(db)
    }

    fn migrate(&self) -> Result<()> {
        let version: i64 = self
            .conn
            .pragma_query_value(None, "user_version", |row| row.get(0))?;

        if version < 1 {
            self.conn.execute_batch(
                "CREATE TABLE IF NOT EXISTS user_profile (
                    id INTEGER PRIMARY KEY CHECK (id = 1),
                    name TEXT NOT NULL DEFAULT '',
                    email TEXT,
                    goal TEXT,
                    weight REAL,
                    height REAL,
                    age INTEGER,
                    gender TEXT,
                    goal_calories INTEGER NOT NULL DEFAULT 2500,
                    goal_steps INTEGER NOT NULL DEFAULT 10000,
                    goal_active_minutes INTEGER NOT NULL DEFAULT 60,
                    goal_water INTEGER NOT NULL DEFAULT 2500,
                    updated_at TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS workouts (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    uuid TEXT NOT NULL UNIQUE,
                    type TEXT NOT NULL,
                    duration INTEGER NOT NULL,
                    calories REAL,
                    logged_at TEXT NOT NULL,
                    created_at TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS meals (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    uuid TEXT NOT NULL UNIQUE,
                    name TEXT NOT NULL,
                    calories REAL NOT NULL,
                    protein REAL NOT NULL DEFAULT 0,
                    logged_at TEXT NOT NULL,
                    created_at TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS daily_stats (
                    date TEXT PRIMARY KEY NOT NULL,
                    water_ml INTEGER NOT NULL DEFAULT 0,
                    steps INTEGER NOT NULL DEFAULT 0,
                    updated_at TEXT NOT NULL
                );

                CREATE INDEX IF NOT EXISTS idx_workouts_logged_at ON workouts(logged_at);
                CREATE INDEX IF NOT EXISTS idx_meals_logged_at ON meals(logged_at);

                PRAGMA user_version = 1;",
            )?;
        }

        Ok(())
    }

    // --- Row mapping helpers ---

    fn timestamp_column(row: &rusqlite::Row, idx: usize) -> rusqlite::Result<NaiveDateTime> {
        let raw: String = row.get(idx)?;
        parse_timestamp(&raw).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, e.into())
        })
    }

    fn date_column(row: &rusqlite::Row, idx: usize) -> rusqlite::Result<NaiveDate> {
        let raw: String = row.get(idx)?;
        parse_day(&raw).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, e.into())
        })
    }

    // Expects columns: 0: name, 1: email, 2: goal, 3: weight, 4: height, 5: age, 6: gender
    fn user_from_row(row: &rusqlite::Row) -> rusqlite::Result<User> {
        Ok(User {
            name: row.get(0)?,
            email: row.get(1)?,
            goal: row.get(2)?,
            weight: row.get(3)?,
            height: row.get(4)?,
            age: row.get(5)?,
            gender: row.get(6)?,
        })
    }

    // Expects columns: 0: uuid, 1: type, 2: duration, 3: calories, 4: logged_at
    fn workout_from_row(row: &rusqlite::Row) -> rusqlite::Result<WorkoutEvent> {
        Ok(WorkoutEvent {
            id: EntityId::Canonical(row.get(0)?),
            kind: row.get(1)?,
            duration_minutes: row.get(2)?,
            calories_burned: row.get(3)?,
            timestamp: Self::timestamp_column(row, 4)?,
        })
    }

    // Expects columns: 0: uuid, 1: name, 2: calories, 3: protein, 4: logged_at
    fn meal_from_row(row: &rusqlite::Row) -> rusqlite::Result<MealEvent> {
        Ok(MealEvent {
            id: EntityId::Canonical(row.get(0)?),
            name: row.get(1)?,
            calories: row.get(2)?,
            protein_grams: row.get(3)?,
            timestamp: Self::timestamp_column(row, 4)?,
        })
    }

    fn daily_stat_from_row(row: &rusqlite::Row) -> rusqlite::Result<DailyStat> {
        Ok(DailyStat {
            date: Self::date_column(row, 0)?,
            water_ml: row.get(1)?,
            steps: row.get(2)?,
        })
    }

    // --- User profile (singleton) ---

    pub fn get_user(&self) -> Result<Option<User>> {
        let user = self
            .conn
            .query_row(
                "SELECT name, email, goal, weight, height, age, gender FROM user_profile WHERE id = 1",
                [],
                Self::user_from_row,
            )
            .optional()?;
        Ok(user)
    }

    /// Create the one user on first call, merge fields into it afterwards.
    pub fn upsert_user(&self, patch: &UserPatch) -> Result<User> {
        let mut user = self
            .get_user()?
            .unwrap_or_else(|| User::from_patch(&UserPatch::default()));
        user.apply(patch);

        let now = Local::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO user_profile (id, name, email, goal, weight, height, age, gender, updated_at)
             VALUES (1, ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
             ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                email = excluded.email,
                goal = excluded.goal,
                weight = excluded.weight,
                height = excluded.height,
                age = excluded.age,
                gender = excluded.gender,
                updated_at = excluded.updated_at",
            params![
                user.name,
                user.email,
                user.goal,
                user.weight,
                user.height,
                user.age,
                user.gender,
                now,
            ],
        )?;
        self.get_user()?.context("User not found after upsert")
    }

    /// Goals live on the user row, so there are none before onboarding.
    pub fn get_goals(&self) -> Result<Option<Goals>> {
        let goals = self
            .conn
            .query_row(
                "SELECT goal_calories, goal_steps, goal_active_minutes, goal_water
                 FROM user_profile WHERE id = 1",
                [],
                |row| {
                    Ok(Goals {
                        calories: row.get(0)?,
                        steps: row.get(1)?,
                        active_minutes: row.get(2)?,
                        water: row.get(3)?,
                    })
                },
            )
            .optional()?;
        Ok(goals)
    }

    pub fn merge_goals(&self, patch: &GoalsPatch) -> Result<Option<Goals>> {
        let Some(current) = self.get_goals()? else {
            return Ok(None);
        };
        let merged = current.merged(patch);
        let now = Local::now().to_rfc3339();
        self.conn.execute(
            "UPDATE user_profile SET goal_calories = ?1, goal_steps = ?2,
                goal_active_minutes = ?3, goal_water = ?4, updated_at = ?5
             WHERE id = 1",
            params![
                merged.calories,
                merged.steps,
                merged.active_minutes,
                merged.water,
                now,
            ],
        )?;
        Ok(Some(merged))
    }

    // --- Workouts ---

    pub fn insert_workout(
        &self,
        workout: &NewWorkout,
        timestamp: NaiveDateTime,
    ) -> Result<WorkoutEvent> {
        let now = Local::now().to_rfc3339();
        let uuid = Uuid::new_v4().to_string();
        self.conn.execute(
            "INSERT INTO workouts (uuid, type, duration, calories, logged_at, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                uuid,
                workout.kind,
                workout.duration_minutes,
                workout.calories_burned,
                timestamp.format(TIMESTAMP_FORMAT).to_string(),
                now,
            ],
        )?;
        self.get_workout(&uuid)
    }

    pub fn get_workout(&self, uuid: &str) -> Result<WorkoutEvent> {
        self.conn
            .query_row(
                "SELECT uuid, type, duration, calories, logged_at FROM workouts WHERE uuid = ?1",
                params![uuid],
                Self::workout_from_row,
            )
            .context("Workout not found")
    }

    pub fn list_workouts(&self) -> Result<Vec<WorkoutEvent>> {
        let mut stmt = self.conn.prepare(
            "SELECT uuid, type, duration, calories, logged_at FROM workouts ORDER BY logged_at, id",
        )?;
        let workouts = stmt
            .query_map([], Self::workout_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(workouts)
    }

    pub fn delete_workout(&self, uuid: &str) -> Result<bool> {
        let rows = self
            .conn
            .execute("DELETE FROM workouts WHERE uuid = ?1", params![uuid])?;
        Ok(rows > 0)
    }

    // --- Meals ---

    pub fn insert_meal(&self, meal: &NewMeal, timestamp: NaiveDateTime) -> Result<MealEvent> {
        let now = Local::now().to_rfc3339();
        let uuid = Uuid::new_v4().to_string();
        self.conn.execute(
            "INSERT INTO meals (uuid, name, calories, protein, logged_at, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                uuid,
                meal.name,
                meal.calories,
                meal.protein_grams,
                timestamp.format(TIMESTAMP_FORMAT).to_string(),
                now,
            ],
        )?;
        self.get_meal(&uuid)
    }

    pub fn get_meal(&self, uuid: &str) -> Result<MealEvent> {
        self.conn
            .query_row(
                "SELECT uuid, name, calories, protein, logged_at FROM meals WHERE uuid = ?1",
                params![uuid],
                Self::meal_from_row,
            )
            .context("Meal not found")
    }

    pub fn list_meals(&self) -> Result<Vec<MealEvent>> {
        let mut stmt = self.conn.prepare(
            "SELECT uuid, name, calories, protein, logged_at FROM meals ORDER BY logged_at, id",
        )?;
        let meals = stmt
            .query_map([], Self::meal_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(meals)
    }

    pub fn delete_meal(&self, uuid: &str) -> Result<bool> {
        let rows = self
            .conn
            .execute("DELETE FROM meals WHERE uuid = ?1", params![uuid])?;
        Ok(rows > 0)
    }

    // --- Daily stats ---

    pub fn get_daily_stat(&self, date: NaiveDate) -> Result<Option<DailyStat>> {
        let stat = self
            .conn
            .query_row(
                "SELECT date, water_ml, steps FROM daily_stats WHERE date = ?1",
                params![format_day(date)],
                Self::daily_stat_from_row,
            )
            .optional()?;
        Ok(stat)
    }

    pub fn list_daily_stats(&self) -> Result<Vec<DailyStat>> {
        let mut stmt = self
            .conn
            .prepare("SELECT date, water_ml, steps FROM daily_stats ORDER BY date")?;
        let stats = stmt
            .query_map([], Self::daily_stat_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(stats)
    }

    /// Upsert-by-date. The value replaces whatever was stored.
    pub fn set_daily_scalar(
        &self,
        kind: ScalarKind,
        date: NaiveDate,
        value: u32,
    ) -> Result<DailyStat> {
        let column = Self::scalar_column(kind);
        let now = Local::now().to_rfc3339();
        self.conn.execute(
            &format!(
                "INSERT INTO daily_stats (date, {column}, updated_at) VALUES (?1, ?2, ?3)
                 ON CONFLICT(date) DO UPDATE SET
                    {column} = excluded.{column},
                    updated_at = excluded.updated_at"
            ),
            params![format_day(date), value, now],
        )?;
        self.get_daily_stat(date)?
            .context("Daily stat not found after upsert")
    }

    /// Additive steps upsert, for derived estimates only.
    pub fn add_daily_steps(&self, date: NaiveDate, delta: u32) -> Result<DailyStat> {
        let now = Local::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO daily_stats (date, steps, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(date) DO UPDATE SET
                steps = steps + excluded.steps,
                updated_at = excluded.updated_at",
            params![format_day(date), delta, now],
        )?;
        self.get_daily_stat(date)?
            .context("Daily stat not found after upsert")
    }

    fn scalar_column(kind: ScalarKind) -> &'static str {
        match kind {
            ScalarKind::Water => "water_ml",
            ScalarKind::Steps => "steps",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(s: &str) -> NaiveDate {
        parse_day(s).unwrap()
    }

    fn ts(s: &str) -> NaiveDateTime {
        parse_timestamp(s).unwrap()
    }

    fn run() -> NewWorkout {
        NewWorkout {
            kind: "Run".to_string(),
            duration_minutes: 30,
            calories_burned: None,
            timestamp: None,
        }
    }

    fn banana() -> NewMeal {
        NewMeal {
            name: "Banana".to_string(),
            calories: 105.0,
            protein_grams: 1.0,
            timestamp: None,
        }
    }

    #[test]
    fn test_no_user_before_onboarding() {
        let db = Database::open_in_memory().unwrap();
        assert!(db.get_user().unwrap().is_none());
        assert!(db.get_goals().unwrap().is_none());
    }

    #[test]
    fn test_upsert_user_creates_then_merges() {
        let db = Database::open_in_memory().unwrap();
        let user = db
            .upsert_user(&UserPatch {
                name: Some("Ada".to_string()),
                email: Some("ada@example.com".to_string()),
                ..UserPatch::default()
            })
            .unwrap();
        assert_eq!(user.name, "Ada");

        let user = db
            .upsert_user(&UserPatch {
                weight: Some(60.0),
                ..UserPatch::default()
            })
            .unwrap();
        assert_eq!(user.name, "Ada");
        assert_eq!(user.email.as_deref(), Some("ada@example.com"));
        assert_eq!(user.weight, Some(60.0));

        let count: i64 = db
            .conn
            .query_row("SELECT COUNT(*) FROM user_profile", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn test_goals_default_after_onboarding() {
        let db = Database::open_in_memory().unwrap();
        db.upsert_user(&UserPatch {
            name: Some("Ada".to_string()),
            ..UserPatch::default()
        })
        .unwrap();
        assert_eq!(db.get_goals().unwrap(), Some(Goals::default()));
    }

    #[test]
    fn test_merge_goals_requires_user() {
        let db = Database::open_in_memory().unwrap();
        let patch = GoalsPatch {
            steps: Some(12_000),
            ..GoalsPatch::default()
        };
        assert!(db.merge_goals(&patch).unwrap().is_none());

        db.upsert_user(&UserPatch {
            name: Some("Ada".to_string()),
            ..UserPatch::default()
        })
        .unwrap();
        let goals = db.merge_goals(&patch).unwrap().unwrap();
        assert_eq!(goals.steps, 12_000);
        assert_eq!(goals.calories, 2500);
        assert_eq!(db.get_goals().unwrap(), Some(goals));
    }

    #[test]
    fn test_insert_list_delete_workout() {
        let db = Database::open_in_memory().unwrap();
        let first = db
            .insert_workout(&run(), ts("2024-03-01T18:00:00"))
            .unwrap();
        let second = db
            .insert_workout(&run(), ts("2024-03-01T07:00:00"))
            .unwrap();
        assert!(!first.id.is_temp());
        assert_ne!(first.id, second.id);

        let all = db.list_workouts().unwrap();
        assert_eq!(all.len(), 2);
        // Chronological
        assert_eq!(all[0].id, second.id);
        assert_eq!(all[0].timestamp, ts("2024-03-01T07:00:00"));

        let uuid = first.id.canonical().unwrap();
        assert!(db.delete_workout(uuid).unwrap());
        assert!(!db.delete_workout(uuid).unwrap());
        assert_eq!(db.list_workouts().unwrap().len(), 1);
    }

    #[test]
    fn test_insert_and_get_meal() {
        let db = Database::open_in_memory().unwrap();
        let meal = db.insert_meal(&banana(), ts("2024-03-01T09:00:00")).unwrap();
        assert_eq!(meal.name, "Banana");
        assert!((meal.calories - 105.0).abs() < f64::EPSILON);

        let fetched = db.get_meal(meal.id.canonical().unwrap()).unwrap();
        assert_eq!(fetched, meal);
        assert!(db.delete_meal(meal.id.canonical().unwrap()).unwrap());
        assert!(db.list_meals().unwrap().is_empty());
    }

    #[test]
    fn test_set_daily_scalar_is_absolute() {
        let db = Database::open_in_memory().unwrap();
        let date = day("2024-03-01");
        db.set_daily_scalar(ScalarKind::Steps, date, 8000).unwrap();
        let stat = db.set_daily_scalar(ScalarKind::Steps, date, 8000).unwrap();
        assert_eq!(stat.steps, 8000);
        assert_eq!(stat.water_ml, 0);

        let stat = db.set_daily_scalar(ScalarKind::Water, date, 750).unwrap();
        assert_eq!(stat.steps, 8000);
        assert_eq!(stat.water_ml, 750);
        assert_eq!(db.list_daily_stats().unwrap().len(), 1);
    }

    #[test]
    fn test_add_daily_steps_accumulates() {
        let db = Database::open_in_memory().unwrap();
        let date = day("2024-03-01");
        assert_eq!(db.add_daily_steps(date, 3000).unwrap().steps, 3000);
        assert_eq!(db.add_daily_steps(date, 1500).unwrap().steps, 4500);
        assert!(db.get_daily_stat(day("2024-03-02")).unwrap().is_none());
    }

    #[test]
    fn test_reopen_keeps_data() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stride.db");
        {
            let db = Database::open(&path).unwrap();
            db.set_daily_scalar(ScalarKind::Water, day("2024-03-01"), 500)
                .unwrap();
        }
        let db = Database::open(&path).unwrap();
        let stat = db.get_daily_stat(day("2024-03-01")).unwrap().unwrap();
        assert_eq!(stat.water_ml, 500);
    }
}
