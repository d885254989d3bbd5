mod commands;
mod config;
mod remote;
mod server;

use std::process;
use std::sync::Arc;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use tracing::info;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use crate::commands::{
    Engine, cmd_day, cmd_goals_set, cmd_goals_show, cmd_history, cmd_meal_add, cmd_meal_remove,
    cmd_scalar_add, cmd_scalar_set, cmd_today, cmd_user_set, cmd_user_show, cmd_workout_add,
    cmd_workout_remove,
};
use crate::config::Config;
use crate::remote::{Backend, HttpStore};
use stride_core::calendar::{Clock, SystemClock};
use stride_core::models::{GoalsPatch, ScalarKind, UserPatch};
use stride_core::service::FitnessService;
use stride_core::store::InProcessStore;

#[derive(Parser)]
#[command(
    name = "stride",
    version,
    about = "A small fitness log: workouts, meals, water and steps"
)]
struct Cli {
    /// Sync against a `stride serve` instance instead of the local database
    /// (default: $STRIDE_REMOTE)
    #[arg(long, global = true, value_name = "URL")]
    remote: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the REST API server
    Serve {
        /// Port to listen on
        #[arg(short, long, default_value = "3001")]
        port: u16,
        /// Address to bind to (default: 127.0.0.1, use 0.0.0.0 to expose to network)
        #[arg(short, long, default_value = "127.0.0.1")]
        bind: String,
    },
    #[command(flatten)]
    Client(ClientCommands),
}

/// Commands that run against the sync engine.
#[derive(Subcommand)]
enum ClientCommands {
    /// Show today's totals and goal progress
    Today {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show everything logged on one day (defaults to today)
    Day {
        /// Date to show (YYYY-MM-DD or today/yesterday/tomorrow, default: today)
        date: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show calories burned and daily totals for the last N days
    History {
        /// Number of days to show
        #[arg(short, long, default_value = "7")]
        days: usize,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Log or remove workouts
    Workout {
        #[command(subcommand)]
        command: WorkoutCommands,
    },
    /// Log or remove meals
    Meal {
        #[command(subcommand)]
        command: MealCommands,
    },
    /// Track water intake (ml)
    Water {
        #[command(subcommand)]
        command: ScalarCommands,
    },
    /// Track steps
    Steps {
        #[command(subcommand)]
        command: ScalarCommands,
    },
    /// Manage the user profile
    User {
        #[command(subcommand)]
        command: UserCommands,
    },
    /// Manage daily goals
    Goals {
        #[command(subcommand)]
        command: GoalsCommands,
    },
}

#[derive(Subcommand)]
enum WorkoutCommands {
    /// Log a workout
    Add {
        /// Workout type (e.g. "Run", "Cycling")
        kind: String,
        /// Duration in minutes
        minutes: u32,
        /// Calories burned (default: 5 per minute)
        #[arg(long)]
        calories: Option<f64>,
        /// When it happened (YYYY-MM-DD[THH:MM:SS] or today/yesterday, default: now)
        #[arg(long)]
        at: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Remove a workout by ID
    Rm {
        /// Workout ID
        id: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum MealCommands {
    /// Log a meal
    Add {
        /// Meal name
        name: String,
        /// Calories
        calories: f64,
        /// Protein in grams
        #[arg(long, default_value = "0")]
        protein: f64,
        /// When it happened (YYYY-MM-DD[THH:MM:SS] or today/yesterday, default: now)
        #[arg(long)]
        at: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Remove a meal by ID
    Rm {
        /// Meal ID
        id: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum ScalarCommands {
    /// Set the day's total
    Set {
        /// New total
        value: u32,
        /// Date (YYYY-MM-DD or today/yesterday/tomorrow, default: today)
        #[arg(long)]
        date: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Add to today's total (negative to subtract)
    Add {
        /// Amount to add
        #[arg(allow_hyphen_values = true)]
        delta: i64,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Args)]
struct UserFields {
    /// Display name (required the first time)
    #[arg(long)]
    name: Option<String>,
    #[arg(long)]
    email: Option<String>,
    /// Free-form goal, e.g. "build muscle"
    #[arg(long)]
    goal: Option<String>,
    /// Weight in kg
    #[arg(long)]
    weight: Option<f64>,
    /// Height in cm
    #[arg(long)]
    height: Option<f64>,
    #[arg(long)]
    age: Option<u32>,
    #[arg(long)]
    gender: Option<String>,
}

impl From<UserFields> for UserPatch {
    fn from(f: UserFields) -> Self {
        Self {
            name: f.name,
            email: f.email,
            goal: f.goal,
            weight: f.weight,
            height: f.height,
            age: f.age,
            gender: f.gender,
        }
    }
}

#[derive(Subcommand)]
enum UserCommands {
    /// Create the profile or update some of its fields
    Set {
        #[command(flatten)]
        fields: UserFields,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show the profile
    Show {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum GoalsCommands {
    /// Change one or more daily goals
    Set {
        /// Calories per day
        #[arg(long)]
        calories: Option<u32>,
        /// Steps per day
        #[arg(long)]
        steps: Option<u32>,
        /// Active minutes per day
        #[arg(long)]
        active_minutes: Option<u32>,
        /// Water per day (ml)
        #[arg(long)]
        water: Option<u32>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show daily goals
    Show {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("stride=info,stride_core=warn")),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

#[tokio::main]
async fn main() {
    init_tracing();
    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = Config::load()?;

    match cli.command {
        Commands::Serve { port, bind } => {
            info!(data_dir = %config.data_dir.display(), "Opening database");
            let service = FitnessService::new(&config.db_path)?;
            server::start_server(service, port, &bind).await
        }
        Commands::Client(command) => {
            let engine = connect(cli.remote.or(config.remote.clone()), &config)?;
            engine.load_all().await?;
            run_client(&engine, command).await
        }
    }
}

fn connect(remote: Option<String>, config: &Config) -> Result<Engine> {
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let backend = match remote {
        Some(url) => {
            info!(%url, "Syncing against remote store");
            Backend::Http(HttpStore::new(&url)?)
        }
        None => Backend::Local(InProcessStore::new(
            FitnessService::new(&config.db_path)?,
            Arc::clone(&clock),
        )),
    };
    Ok(Engine::new(backend, clock))
}

async fn run_client(engine: &Engine, command: ClientCommands) -> Result<()> {
    match command {
        ClientCommands::Today { json } => cmd_today(engine, json),
        ClientCommands::Day { date, json } => cmd_day(engine, date, json),
        ClientCommands::History { days, json } => cmd_history(engine, days, json),
        ClientCommands::Workout { command } => match command {
            WorkoutCommands::Add {
                kind,
                minutes,
                calories,
                at,
                json,
            } => cmd_workout_add(engine, &kind, minutes, calories, at, json).await,
            WorkoutCommands::Rm { id, json } => cmd_workout_remove(engine, &id, json).await,
        },
        ClientCommands::Meal { command } => match command {
            MealCommands::Add {
                name,
                calories,
                protein,
                at,
                json,
            } => cmd_meal_add(engine, &name, calories, protein, at, json).await,
            MealCommands::Rm { id, json } => cmd_meal_remove(engine, &id, json).await,
        },
        ClientCommands::Water { command } => run_scalar(engine, ScalarKind::Water, command).await,
        ClientCommands::Steps { command } => run_scalar(engine, ScalarKind::Steps, command).await,
        ClientCommands::User { command } => match command {
            UserCommands::Set { fields, json } => cmd_user_set(engine, fields.into(), json).await,
            UserCommands::Show { json } => cmd_user_show(engine, json),
        },
        ClientCommands::Goals { command } => match command {
            GoalsCommands::Set {
                calories,
                steps,
                active_minutes,
                water,
                json,
            } => {
                let patch = GoalsPatch {
                    calories,
                    steps,
                    active_minutes,
                    water,
                };
                cmd_goals_set(engine, patch, json).await
            }
            GoalsCommands::Show { json } => cmd_goals_show(engine, json),
        },
    }
}

async fn run_scalar(engine: &Engine, kind: ScalarKind, command: ScalarCommands) -> Result<()> {
    match command {
        ScalarCommands::Set { value, date, json } => {
            cmd_scalar_set(engine, kind, value, date, json).await
        }
        ScalarCommands::Add { delta, json } => cmd_scalar_add(engine, kind, delta, json).await,
    }
}
