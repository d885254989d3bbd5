use anyhow::Result;

use stride_core::models::{ScalarAck, ScalarKind};

use super::Engine;
use super::helpers::parse_date;

fn unit(kind: ScalarKind) -> &'static str {
    match kind {
        ScalarKind::Water => " ml",
        ScalarKind::Steps => " steps",
    }
}

fn print_ack(kind: ScalarKind, ack: ScalarAck, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(&ack)?);
        return Ok(());
    }
    let date = ack.date;
    let value = ack.value;
    let unit = unit(kind);
    println!("{kind} for {date}: {value}{unit}");
    Ok(())
}

/// Overwrite `kind` for a day (default today).
pub(crate) async fn cmd_scalar_set(
    engine: &Engine,
    kind: ScalarKind,
    value: u32,
    date: Option<String>,
    json: bool,
) -> Result<()> {
    let date = parse_date(date)?;
    let ack = engine.set_scalar_for_date(kind, value, date).await?;
    print_ack(kind, ack, json)
}

pub(crate) async fn cmd_scalar_add(
    engine: &Engine,
    kind: ScalarKind,
    delta: i64,
    json: bool,
) -> Result<()> {
    let ack = engine.adjust_scalar(kind, delta).await?;
    print_ack(kind, ack, json)
}
