mod daily;
mod helpers;
mod log;
mod profile;
mod summary;

use stride_core::sync::SyncEngine;

use crate::remote::Backend;

/// The engine every client command runs against.
pub(crate) type Engine = SyncEngine<Backend>;

pub(crate) use daily::{cmd_scalar_add, cmd_scalar_set};
pub(crate) use log::{cmd_meal_add, cmd_meal_remove, cmd_workout_add, cmd_workout_remove};
pub(crate) use profile::{cmd_goals_set, cmd_goals_show, cmd_user_set, cmd_user_show};
pub(crate) use summary::{cmd_day, cmd_history, cmd_today};
