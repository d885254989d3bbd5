use anyhow::Result;

use stride_core::aggregate::calories_burned;
use stride_core::calendar::day_of;
use stride_core::models::{EntityId, NewMeal, NewWorkout};
use stride_core::sync::SyncError;

use super::Engine;
use super::helpers::{exit_not_found, parse_when};

pub(crate) async fn cmd_workout_add(
    engine: &Engine,
    kind: &str,
    minutes: u32,
    calories: Option<f64>,
    when: Option<String>,
    json: bool,
) -> Result<()> {
    let workout = engine
        .add_workout(NewWorkout {
            kind: kind.to_string(),
            duration_minutes: minutes,
            calories_burned: calories,
            timestamp: parse_when(when)?,
        })
        .await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&workout)?);
        return Ok(());
    }

    let id = &workout.id;
    let name = &workout.kind;
    let burned = calories_burned(&workout);
    let day = day_of(&workout.timestamp);
    println!("Logged [{id}] {name}: {minutes} min, {burned:.0} kcal on {day}");
    Ok(())
}

pub(crate) async fn cmd_workout_remove(engine: &Engine, id: &str, json: bool) -> Result<()> {
    let id = EntityId::from(id);
    match engine.remove_workout(&id).await {
        Ok(()) => {}
        Err(SyncError::UnknownId(_)) => exit_not_found(&format!("Workout {id} not found"), json),
        Err(e) => return Err(e.into()),
    }

    if json {
        println!("{}", serde_json::json!({ "deleted": id }));
    } else {
        println!("Deleted workout {id}");
    }
    Ok(())
}

pub(crate) async fn cmd_meal_add(
    engine: &Engine,
    name: &str,
    calories: f64,
    protein: f64,
    when: Option<String>,
    json: bool,
) -> Result<()> {
    let meal = engine
        .add_meal(NewMeal {
            name: name.to_string(),
            calories,
            protein_grams: protein,
            timestamp: parse_when(when)?,
        })
        .await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&meal)?);
        return Ok(());
    }

    let id = &meal.id;
    let day = day_of(&meal.timestamp);
    println!(
        "Logged [{id}] {name}: {calories:.0} kcal, P:{protein:.0}g on {day}",
        name = meal.name
    );
    Ok(())
}

pub(crate) async fn cmd_meal_remove(engine: &Engine, id: &str, json: bool) -> Result<()> {
    let id = EntityId::from(id);
    match engine.remove_meal(&id).await {
        Ok(()) => {}
        Err(SyncError::UnknownId(_)) => exit_not_found(&format!("Meal {id} not found"), json),
        Err(e) => return Err(e.into()),
    }

    if json {
        println!("{}", serde_json::json!({ "deleted": id }));
    } else {
        println!("Deleted meal {id}");
    }
    Ok(())
}
