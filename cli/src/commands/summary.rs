use anyhow::Result;
use chrono::Local;
use serde::Serialize;
use tabled::{
    Table, Tabled,
    settings::{Alignment, Modify, Style, object::Columns},
};

use stride_core::aggregate::{DayStats, calories_burned, stats_for_date, trailing_burn};

use super::Engine;
use super::helpers::{exit_not_found, no_neg_zero, parse_date, percent, truncate};

fn print_day(stats: &DayStats) {
    let date = stats.date;
    println!("=== {date} ===\n");

    if !stats.workouts.is_empty() {
        let burned = no_neg_zero(stats.calories_burned);
        println!("  WORKOUTS ({burned:.0} kcal burned)");
        for w in &stats.workouts {
            let id = &w.id;
            let name = truncate(&w.kind, 30);
            let minutes = w.duration_minutes;
            let kcal = calories_burned(w);
            println!("    [{id}] {name}: {minutes} min, {kcal:.0} kcal");
        }
        println!();
    }

    if !stats.meals.is_empty() {
        let eaten = no_neg_zero(stats.calories_consumed);
        println!("  MEALS ({eaten:.0} kcal)");
        for m in &stats.meals {
            let id = &m.id;
            let name = truncate(&m.name, 30);
            let kcal = m.calories;
            let protein = m.protein_grams;
            println!("    [{id}] {name}: {kcal:.0} kcal, P:{protein:.0}g");
        }
        println!();
    }

    let eaten = no_neg_zero(stats.calories_consumed);
    let protein = no_neg_zero(stats.protein_consumed);
    let burned = no_neg_zero(stats.calories_burned);
    let water = stats.water_ml;
    let steps = stats.steps;
    println!("  TOTAL: {eaten:.0} kcal in | {burned:.0} kcal out | P:{protein:.0}g");
    println!("  WATER: {water} ml | STEPS: {steps}");
}

fn is_blank(stats: &DayStats) -> bool {
    stats.workouts.is_empty() && stats.meals.is_empty() && stats.water_ml == 0 && stats.steps == 0
}

pub(crate) fn cmd_today(engine: &Engine, json: bool) -> Result<()> {
    let totals = engine.live_today_totals();
    let goals = engine.goals();
    let progress = engine.goal_progress();

    if json {
        let value = serde_json::json!({
            "totals": totals,
            "goals": goals,
            "progress": progress,
        });
        println!("{}", serde_json::to_string_pretty(&value)?);
        return Ok(());
    }

    if let Some(user) = engine.user() {
        println!("Hi {}!\n", user.name);
    }
    print_day(&totals.day);
    println!();

    let lines = [
        (
            "Calories",
            format!("{:.0} / {} kcal", no_neg_zero(totals.day.calories_consumed), goals.calories),
            progress.calories,
        ),
        (
            "Steps",
            format!("{} / {}", totals.day.steps, goals.steps),
            progress.steps,
        ),
        (
            "Active",
            format!("{} / {} min", totals.active_minutes, goals.active_minutes),
            progress.active_minutes,
        ),
        (
            "Water",
            format!("{} / {} ml", totals.day.water_ml, goals.water),
            progress.water,
        ),
    ];
    for (label, amount, ratio) in lines {
        let pct = percent(ratio);
        println!("  {label:<9}{amount:<22}{pct:>5}");
    }
    Ok(())
}

pub(crate) fn cmd_day(engine: &Engine, date: Option<String>, json: bool) -> Result<()> {
    let date = parse_date(date)?;
    let stats = engine.stats_for_date(date);

    if json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
        return Ok(());
    }

    if is_blank(&stats) {
        exit_not_found(&format!("No entries for {date}"), false);
    }
    print_day(&stats);
    Ok(())
}

pub(crate) fn cmd_history(engine: &Engine, days: usize, json: bool) -> Result<()> {
    #[derive(Serialize)]
    struct HistoryDay {
        date: chrono::NaiveDate,
        workouts: usize,
        calories_burned: f64,
        calories_consumed: f64,
        water_ml: u32,
        steps: u32,
    }

    #[derive(Tabled)]
    struct HistoryRow {
        #[tabled(rename = "Date")]
        date: String,
        #[tabled(rename = "Workouts")]
        workouts: usize,
        #[tabled(rename = "Burned")]
        burned: String,
        #[tabled(rename = "Eaten")]
        eaten: String,
        #[tabled(rename = "Water (ml)")]
        water: u32,
        #[tabled(rename = "Steps")]
        steps: u32,
    }

    let today = Local::now().date_naive();
    let history: Vec<HistoryDay> = engine.with_cache(|cache| {
        trailing_burn(cache, today, days)
            .into_iter()
            .map(|burn| {
                let stats = stats_for_date(cache, burn.date);
                HistoryDay {
                    date: burn.date,
                    workouts: stats.workouts.len(),
                    calories_burned: burn.calories_burned,
                    calories_consumed: stats.calories_consumed,
                    water_ml: stats.water_ml,
                    steps: stats.steps,
                }
            })
            .collect()
    });

    if json {
        println!("{}", serde_json::to_string_pretty(&history)?);
        return Ok(());
    }

    let rows: Vec<HistoryRow> = history
        .iter()
        .map(|d| HistoryRow {
            date: d.date.to_string(),
            workouts: d.workouts,
            burned: format!("{:.0}", no_neg_zero(d.calories_burned)),
            eaten: format!("{:.0}", no_neg_zero(d.calories_consumed)),
            water: d.water_ml,
            steps: d.steps,
        })
        .collect();

    let table = Table::new(&rows)
        .with(Style::rounded())
        .with(Modify::new(Columns::new(1..)).with(Alignment::right()))
        .to_string();
    println!("{table}");

    let total: f64 = history.iter().map(|d| d.calories_burned).sum();
    println!("\n  {days}-day burn: {:.0} kcal", no_neg_zero(total));
    Ok(())
}
