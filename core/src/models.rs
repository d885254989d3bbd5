use std::fmt;

use anyhow::{Result, bail};
use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

// --- Identity ---

const TEMP_PREFIX: &str = "tmp-";

/// Identity of a logged event.
///
/// Events created locally carry a `Temp` id until the store confirms them and
/// hands back a `Canonical` one. On the wire both are plain strings; temp ids
/// render as `tmp-N`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "String", from = "String")]
pub enum EntityId {
    Temp(u64),
    Canonical(String),
}

impl EntityId {
    #[must_use]
    pub fn is_temp(&self) -> bool {
        matches!(self, Self::Temp(_))
    }

    #[must_use]
    pub fn canonical(&self) -> Option<&str> {
        match self {
            Self::Canonical(id) => Some(id),
            Self::Temp(_) => None,
        }
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Temp(n) => write!(f, "{TEMP_PREFIX}{n}"),
            Self::Canonical(id) => f.write_str(id),
        }
    }
}

impl From<String> for EntityId {
    fn from(s: String) -> Self {
        match s.strip_prefix(TEMP_PREFIX).and_then(|n| n.parse().ok()) {
            Some(n) => Self::Temp(n),
            None => Self::Canonical(s),
        }
    }
}

impl From<&str> for EntityId {
    fn from(s: &str) -> Self {
        Self::from(s.to_string())
    }
}

impl From<EntityId> for String {
    fn from(id: EntityId) -> Self {
        id.to_string()
    }
}

// --- User & goals ---

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    /// Free-form goal label ("lose weight", "build muscle", ...).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub goal: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub age: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gender: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub goal: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub age: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gender: Option<String>,
}

impl UserPatch {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

impl User {
    /// First write of the singleton: unspecified fields start empty.
    #[must_use]
    pub fn from_patch(patch: &UserPatch) -> Self {
        let mut user = Self {
            name: String::new(),
            email: None,
            goal: None,
            weight: None,
            height: None,
            age: None,
            gender: None,
        };
        user.apply(patch);
        user
    }

    /// Merge the fields present in `patch`; everything else is kept.
    pub fn apply(&mut self, patch: &UserPatch) {
        if let Some(name) = &patch.name {
            self.name.clone_from(name);
        }
        if patch.email.is_some() {
            self.email.clone_from(&patch.email);
        }
        if patch.goal.is_some() {
            self.goal.clone_from(&patch.goal);
        }
        if patch.weight.is_some() {
            self.weight = patch.weight;
        }
        if patch.height.is_some() {
            self.height = patch.height;
        }
        if patch.age.is_some() {
            self.age = patch.age;
        }
        if patch.gender.is_some() {
            self.gender.clone_from(&patch.gender);
        }
    }
}

pub const DEFAULT_CALORIE_GOAL: u32 = 2500;
pub const DEFAULT_STEP_GOAL: u32 = 10_000;
pub const DEFAULT_ACTIVE_MINUTES_GOAL: u32 = 60;
pub const DEFAULT_WATER_GOAL_ML: u32 = 2500;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Goals {
    pub calories: u32,
    pub steps: u32,
    pub active_minutes: u32,
    pub water: u32,
}

impl Default for Goals {
    fn default() -> Self {
        Self {
            calories: DEFAULT_CALORIE_GOAL,
            steps: DEFAULT_STEP_GOAL,
            active_minutes: DEFAULT_ACTIVE_MINUTES_GOAL,
            water: DEFAULT_WATER_GOAL_ML,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GoalsPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub calories: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub steps: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active_minutes: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub water: Option<u32>,
}

impl Goals {
    /// Field-by-field merge; unspecified targets keep their prior values.
    #[must_use]
    pub fn merged(self, patch: &GoalsPatch) -> Self {
        Self {
            calories: patch.calories.unwrap_or(self.calories),
            steps: patch.steps.unwrap_or(self.steps),
            active_minutes: patch.active_minutes.unwrap_or(self.active_minutes),
            water: patch.water.unwrap_or(self.water),
        }
    }
}

// --- Events ---

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkoutEvent {
    pub id: EntityId,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(rename = "duration")]
    pub duration_minutes: u32,
    /// Absent when the user didn't say; aggregation derives it from duration.
    #[serde(rename = "calories", default, skip_serializing_if = "Option::is_none")]
    pub calories_burned: Option<f64>,
    #[serde(rename = "date")]
    pub timestamp: NaiveDateTime,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewWorkout {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(rename = "duration")]
    pub duration_minutes: u32,
    #[serde(rename = "calories", default, skip_serializing_if = "Option::is_none")]
    pub calories_burned: Option<f64>,
    #[serde(rename = "date", default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<NaiveDateTime>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MealEvent {
    pub id: EntityId,
    pub name: String,
    pub calories: f64,
    #[serde(rename = "protein", default)]
    pub protein_grams: f64,
    #[serde(rename = "date")]
    pub timestamp: NaiveDateTime,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewMeal {
    pub name: String,
    pub calories: f64,
    #[serde(rename = "protein", default)]
    pub protein_grams: f64,
    #[serde(rename = "date", default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<NaiveDateTime>,
}

impl NewWorkout {
    #[must_use]
    pub fn into_event(self, id: EntityId, timestamp: NaiveDateTime) -> WorkoutEvent {
        WorkoutEvent {
            id,
            kind: self.kind,
            duration_minutes: self.duration_minutes,
            calories_burned: self.calories_burned,
            timestamp,
        }
    }
}

impl NewMeal {
    #[must_use]
    pub fn into_event(self, id: EntityId, timestamp: NaiveDateTime) -> MealEvent {
        MealEvent {
            id,
            name: self.name,
            calories: self.calories,
            protein_grams: self.protein_grams,
            timestamp,
        }
    }
}

// --- Daily scalar records ---

/// Water and steps for one calendar day. A missing record means both are 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyStat {
    pub date: NaiveDate,
    #[serde(default)]
    pub water_ml: u32,
    #[serde(default)]
    pub steps: u32,
}

impl DailyStat {
    #[must_use]
    pub fn empty(date: NaiveDate) -> Self {
        Self {
            date,
            water_ml: 0,
            steps: 0,
        }
    }

    #[must_use]
    pub fn get(&self, kind: ScalarKind) -> u32 {
        match kind {
            ScalarKind::Water => self.water_ml,
            ScalarKind::Steps => self.steps,
        }
    }

    pub fn set(&mut self, kind: ScalarKind, value: u32) {
        match kind {
            ScalarKind::Water => self.water_ml = value,
            ScalarKind::Steps => self.steps = value,
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.water_ml == 0 && self.steps == 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScalarKind {
    Water,
    Steps,
}

impl ScalarKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Water => "water",
            Self::Steps => "steps",
        }
    }

    /// Body field carrying the value in `POST /water` and `POST /steps`.
    #[must_use]
    pub fn request_field(self) -> &'static str {
        match self {
            Self::Water => "amount",
            Self::Steps => "steps",
        }
    }

    /// Field echoing the stored value in the response, matching [`Snapshot`].
    #[must_use]
    pub fn response_field(self) -> &'static str {
        match self {
            Self::Water => "water_ml",
            Self::Steps => "steps",
        }
    }
}

impl fmt::Display for ScalarKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the store echoes back after an upsert-by-date.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScalarAck {
    pub date: NaiveDate,
    pub value: u32,
}

// --- Bulk load ---

/// Everything the client needs, in one round trip.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub user: Option<User>,
    #[serde(default)]
    pub goals: Goals,
    #[serde(default)]
    pub workouts: Vec<WorkoutEvent>,
    #[serde(default)]
    pub meals: Vec<MealEvent>,
    /// Today's water, as seen by the store.
    #[serde(default)]
    pub water_ml: u32,
    /// Today's steps, as seen by the store.
    #[serde(default)]
    pub steps: u32,
    #[serde(default)]
    pub daily_stats: Vec<DailyStat>,
}

// --- Validation ---

pub fn validate_new_workout(workout: &NewWorkout) -> Result<()> {
    if workout.kind.trim().is_empty() {
        bail!("Workout type must not be empty");
    }
    if workout.duration_minutes == 0 {
        bail!("Workout duration must be greater than 0");
    }
    if let Some(cal) = workout.calories_burned {
        if !cal.is_finite() || cal < 0.0 {
            bail!("Calories burned must be a non-negative number");
        }
    }
    Ok(())
}

pub fn validate_new_meal(meal: &NewMeal) -> Result<()> {
    if meal.name.trim().is_empty() {
        bail!("Meal name must not be empty");
    }
    if !meal.calories.is_finite() || meal.calories < 0.0 {
        bail!("Calories must be a non-negative number");
    }
    if !meal.protein_grams.is_finite() || meal.protein_grams < 0.0 {
        bail!("Protein must be a non-negative number");
    }
    Ok(())
}

pub fn validate_user_patch(patch: &UserPatch) -> Result<()> {
    if patch.is_empty() {
        bail!("At least one field must be provided");
    }
    if patch.name.as_deref().is_some_and(|n| n.trim().is_empty()) {
        bail!("Name must not be empty");
    }
    if patch.weight.is_some_and(|w| !w.is_finite() || w <= 0.0) {
        bail!("Weight must be greater than 0");
    }
    if patch.height.is_some_and(|h| !h.is_finite() || h <= 0.0) {
        bail!("Height must be greater than 0");
    }
    if patch.age == Some(0) {
        bail!("Age must be greater than 0");
    }
    Ok(())
}

pub fn validate_goals_patch(patch: &GoalsPatch) -> Result<()> {
    if *patch == GoalsPatch::default() {
        bail!("At least one goal must be provided");
    }
    for (label, value) in [
        ("calories", patch.calories),
        ("steps", patch.steps),
        ("active_minutes", patch.active_minutes),
        ("water", patch.water),
    ] {
        if value == Some(0) {
            bail!("Goal '{label}' must be greater than 0");
        }
    }
    Ok(())
}
