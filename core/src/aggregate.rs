//! Per-day rollups over a [`LocalCache`].
//!
//! Nothing here touches the network or mutates anything. The named business
//! rules for derived values (burned calories, step estimate) live here too so
//! the store's post-commit hook and the sync engine's optimistic update apply
//! the same numbers.

use chrono::NaiveDate;
use serde::Serialize;

use crate::cache::LocalCache;
use crate::calendar::trailing_days;
use crate::models::{Goals, MealEvent, WorkoutEvent};

/// Burn estimate used when a workout has no explicit calories.
pub const CALORIES_PER_WORKOUT_MINUTE: f64 = 5.0;

/// Steps credited to the workout's day for every minute of exercise.
pub const STEPS_PER_WORKOUT_MINUTE: u32 = 100;

/// Length of the burn trend window.
pub const TREND_DAYS: usize = 7;

#[must_use]
pub fn calories_burned(workout: &WorkoutEvent) -> f64 {
    workout
        .calories_burned
        .unwrap_or_else(|| f64::from(workout.duration_minutes) * CALORIES_PER_WORKOUT_MINUTE)
}

#[must_use]
pub fn estimated_steps(duration_minutes: u32) -> u32 {
    duration_minutes.saturating_mul(STEPS_PER_WORKOUT_MINUTE)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DayStats {
    pub date: NaiveDate,
    pub water_ml: u32,
    pub steps: u32,
    pub workouts: Vec<WorkoutEvent>,
    pub meals: Vec<MealEvent>,
    pub calories_consumed: f64,
    pub protein_consumed: f64,
    pub calories_burned: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TodayTotals {
    #[serde(flatten)]
    pub day: DayStats,
    pub active_minutes: u32,
}

/// Fraction of each goal reached, capped at 1.0.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct GoalProgress {
    pub calories: f64,
    pub steps: f64,
    pub active_minutes: f64,
    pub water: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DailyBurn {
    pub date: NaiveDate,
    pub calories_burned: f64,
}

pub fn stats_for_date(cache: &LocalCache, date: NaiveDate) -> DayStats {
    let stat = cache.daily_stat(date);
    let workouts: Vec<WorkoutEvent> = cache.workouts().on_day(date).cloned().collect();
    let meals: Vec<MealEvent> = cache.meals().on_day(date).cloned().collect();

    let calories_consumed = meals.iter().map(|m| m.calories).sum();
    let protein_consumed = meals.iter().map(|m| m.protein_grams).sum();
    let calories_burned = workouts.iter().map(calories_burned).sum();

    DayStats {
        date,
        water_ml: stat.water_ml,
        steps: stat.steps,
        workouts,
        meals,
        calories_consumed,
        protein_consumed,
        calories_burned,
    }
}

/// Today's rollup plus active minutes. Always recomputed from the events, so
/// it can't drift from [`stats_for_date`].
pub fn live_today_totals(cache: &LocalCache, today: NaiveDate) -> TodayTotals {
    let day = stats_for_date(cache, today);
    let active_minutes = day
        .workouts
        .iter()
        .map(|w| w.duration_minutes)
        .fold(0u32, u32::saturating_add);
    TodayTotals {
        day,
        active_minutes,
    }
}

pub fn trailing_burn(cache: &LocalCache, end: NaiveDate, days: usize) -> Vec<DailyBurn> {
    trailing_days(end, days)
        .into_iter()
        .map(|date| DailyBurn {
            date,
            calories_burned: stats_for_date(cache, date).calories_burned,
        })
        .collect()
}

/// Calories burned for each of the last seven days, oldest first.
pub fn weekly_burn(cache: &LocalCache, today: NaiveDate) -> Vec<DailyBurn> {
    trailing_burn(cache, today, TREND_DAYS)
}

#[must_use]
pub fn goal_progress(totals: &TodayTotals, goals: &Goals) -> GoalProgress {
    fn ratio(value: f64, target: u32) -> f64 {
        if target == 0 {
            return 0.0;
        }
        (value / f64::from(target)).clamp(0.0, 1.0)
    }

    GoalProgress {
        calories: ratio(totals.day.calories_consumed, goals.calories),
        steps: ratio(f64::from(totals.day.steps), goals.steps),
        active_minutes: ratio(f64::from(totals.active_minutes), goals.active_minutes),
        water: ratio(f64::from(totals.day.water_ml), goals.water),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calendar::{parse_day, parse_timestamp};
    use crate::models::{DailyStat, EntityId, Snapshot};

    fn day(s: &str) -> NaiveDate {
        parse_day(s).unwrap()
    }

    fn workout(id: &str, at: &str, minutes: u32, calories: Option<f64>) -> WorkoutEvent {
        WorkoutEvent {
            id: EntityId::from(id),
            kind: "Run".to_string(),
            duration_minutes: minutes,
            calories_burned: calories,
            timestamp: parse_timestamp(at).unwrap(),
        }
    }

    fn meal(id: &str, at: &str, calories: f64, protein: f64) -> MealEvent {
        MealEvent {
            id: EntityId::from(id),
            name: "Meal".to_string(),
            calories,
            protein_grams: protein,
            timestamp: parse_timestamp(at).unwrap(),
        }
    }

    fn cache_with(snapshot: Snapshot, today: &str) -> LocalCache {
        LocalCache::from_snapshot(snapshot, day(today))
    }

    #[test]
    fn test_burn_falls_back_to_duration() {
        let w = workout("w", "2024-03-01T07:00:00", 30, None);
        assert!((calories_burned(&w) - 150.0).abs() < f64::EPSILON);
        let w = workout("w", "2024-03-01T07:00:00", 30, Some(320.0));
        assert!((calories_burned(&w) - 320.0).abs() < f64::EPSILON);
        assert_eq!(estimated_steps(30), 3000);
    }

    #[test]
    fn test_stats_for_date_respects_day_boundaries() {
        let cache = cache_with(
            Snapshot {
                meals: vec![
                    meal("a", "2024-03-01T23:59:59", 200.0, 5.0),
                    meal("b", "2024-03-02T00:00:00", 300.0, 20.0),
                    meal("c", "2024-03-02T23:59:59", 100.0, 1.0),
                    meal("d", "2024-03-03T00:00:00", 999.0, 99.0),
                ],
                ..Snapshot::default()
            },
            "2024-03-02",
        );

        let stats = stats_for_date(&cache, day("2024-03-02"));
        assert_eq!(stats.meals.len(), 2);
        assert!((stats.calories_consumed - 400.0).abs() < f64::EPSILON);
        assert!((stats.protein_consumed - 21.0).abs() < f64::EPSILON);

        // Every meal lands on exactly one day
        let total: usize = ["2024-03-01", "2024-03-02", "2024-03-03"]
            .iter()
            .map(|d| stats_for_date(&cache, day(d)).meals.len())
            .sum();
        assert_eq!(total, 4);
    }

    #[test]
    fn test_stats_for_date_merges_scalars_and_events() {
        let cache = cache_with(
            Snapshot {
                workouts: vec![
                    workout("w1", "2024-03-01T07:00:00", 30, None),
                    workout("w2", "2024-03-01T18:00:00", 45, Some(400.0)),
                    workout("w3", "2024-02-29T18:00:00", 60, None),
                ],
                daily_stats: vec![DailyStat {
                    date: day("2024-03-01"),
                    water_ml: 1250,
                    steps: 9000,
                }],
                ..Snapshot::default()
            },
            "2024-03-01",
        );
        let stats = stats_for_date(&cache, day("2024-03-01"));
        assert_eq!(stats.workouts.len(), 2);
        assert!((stats.calories_burned - 550.0).abs() < f64::EPSILON);
        assert_eq!(stats.water_ml, 1250);
        assert_eq!(stats.steps, 9000);
    }

    #[test]
    fn test_missing_daily_stat_reads_as_zero() {
        let cache = cache_with(Snapshot::default(), "2024-03-01");
        let stats = stats_for_date(&cache, day("2024-01-01"));
        assert_eq!(stats.water_ml, 0);
        assert_eq!(stats.steps, 0);
        assert!(stats.workouts.is_empty());
        assert!(stats.calories_consumed.abs() < f64::EPSILON);
    }

    #[test]
    fn test_live_today_matches_stats_for_today() {
        let cache = cache_with(
            Snapshot {
                workouts: vec![
                    workout("w1", "2024-03-01T07:00:00", 30, None),
                    workout("w2", "2024-03-01T18:00:00", 15, None),
                ],
                meals: vec![meal("m1", "2024-03-01T09:00:00", 105.0, 1.0)],
                daily_stats: vec![DailyStat {
                    date: day("2024-03-01"),
                    water_ml: 500,
                    steps: 4000,
                }],
                ..Snapshot::default()
            },
            "2024-03-01",
        );
        let today = day("2024-03-01");
        let totals = live_today_totals(&cache, today);
        assert_eq!(totals.day, stats_for_date(&cache, today));
        assert_eq!(totals.active_minutes, 45);
        assert_eq!(cache.live(today).water_ml, totals.day.water_ml);
        assert_eq!(cache.live(today).steps, totals.day.steps);
    }

    #[test]
    fn test_weekly_burn_covers_seven_days() {
        let cache = cache_with(
            Snapshot {
                workouts: vec![
                    workout("w1", "2024-03-07T07:00:00", 30, None),
                    workout("w2", "2024-03-01T07:00:00", 10, None),
                    // Outside the window
                    workout("w3", "2024-02-29T07:00:00", 60, None),
                ],
                ..Snapshot::default()
            },
            "2024-03-07",
        );
        let trend = weekly_burn(&cache, day("2024-03-07"));
        assert_eq!(trend.len(), TREND_DAYS);
        assert_eq!(trend[0].date, day("2024-03-01"));
        assert!((trend[0].calories_burned - 50.0).abs() < f64::EPSILON);
        assert_eq!(trend[6].date, day("2024-03-07"));
        assert!((trend[6].calories_burned - 150.0).abs() < f64::EPSILON);
        let total: f64 = trend.iter().map(|d| d.calories_burned).sum();
        assert!((total - 200.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_goal_progress_caps_at_one() {
        let cache = cache_with(
            Snapshot {
                workouts: vec![workout("w1", "2024-03-01T07:00:00", 90, None)],
                daily_stats: vec![DailyStat {
                    date: day("2024-03-01"),
                    water_ml: 1250,
                    steps: 5000,
                }],
                ..Snapshot::default()
            },
            "2024-03-01",
        );
        let totals = live_today_totals(&cache, day("2024-03-01"));
        let progress = goal_progress(&totals, &Goals::default());
        assert!((progress.active_minutes - 1.0).abs() < f64::EPSILON);
        assert!((progress.water - 0.5).abs() < f64::EPSILON);
        assert!((progress.steps - 0.5).abs() < f64::EPSILON);
        assert!(progress.calories.abs() < f64::EPSILON);
    }
}
