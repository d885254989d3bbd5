use anyhow::Result;

use stride_core::models::{Goals, GoalsPatch, User, UserPatch};

use super::Engine;
use super::helpers::exit_not_found;

fn print_user(user: &User) {
    println!("Name:   {}", user.name);
    let optional = [
        ("Email", user.email.clone()),
        ("Goal", user.goal.clone()),
        ("Weight", user.weight.map(|w| format!("{w} kg"))),
        ("Height", user.height.map(|h| format!("{h} cm"))),
        ("Age", user.age.map(|a| a.to_string())),
        ("Gender", user.gender.clone()),
    ];
    for (label, value) in optional {
        if let Some(value) = value {
            println!("{:<8}{value}", format!("{label}:"));
        }
    }
}

fn print_goals(goals: &Goals) {
    println!("Calories:       {} kcal", goals.calories);
    println!("Steps:          {}", goals.steps);
    println!("Active minutes: {} min", goals.active_minutes);
    println!("Water:          {} ml", goals.water);
}

pub(crate) async fn cmd_user_set(engine: &Engine, patch: UserPatch, json: bool) -> Result<()> {
    let user = engine.set_user(patch).await?;
    if json {
        println!("{}", serde_json::to_string_pretty(&user)?);
        return Ok(());
    }
    print_user(&user);
    Ok(())
}

pub(crate) fn cmd_user_show(engine: &Engine, json: bool) -> Result<()> {
    let Some(user) = engine.user() else {
        exit_not_found("No profile yet. Create one with `stride user set --name <NAME>`", json);
    };
    if json {
        println!("{}", serde_json::to_string_pretty(&user)?);
        return Ok(());
    }
    print_user(&user);
    Ok(())
}

pub(crate) async fn cmd_goals_set(engine: &Engine, patch: GoalsPatch, json: bool) -> Result<()> {
    let goals = engine.set_goals(patch).await?;
    if json {
        println!("{}", serde_json::to_string_pretty(&goals)?);
        return Ok(());
    }
    print_goals(&goals);
    Ok(())
}

pub(crate) fn cmd_goals_show(engine: &Engine, json: bool) -> Result<()> {
    let goals = engine.goals();
    if json {
        println!("{}", serde_json::to_string_pretty(&goals)?);
        return Ok(());
    }
    print_goals(&goals);
    Ok(())
}
