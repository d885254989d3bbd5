//! Optimistic writes against a [`RemoteStore`].
//!
//! Every mutation is applied to the [`LocalCache`] first, then sent to the
//! store. A success swaps in the store's canonical record; a failure puts the
//! cache back the way it was. Each in-flight write is a [`Mutation`] in the
//! engine's journal, so rollback is a transition on that entry rather than
//! ad hoc cleanup at the call site.
//!
//! The cache lock is never held across an await. Overwrite-style writes
//! (daily scalars, the user, goals) are sequenced per key: a response for a
//! write that has since been superseded is discarded.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::NaiveDate;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::aggregate::{self, DailyBurn, DayStats, GoalProgress, TodayTotals};
use crate::cache::{EventLog, LoadState, LocalCache, LoggedEvent};
use crate::calendar::{Clock, day_of};
use crate::models::{
    EntityId, Goals, GoalsPatch, MealEvent, NewMeal, NewWorkout, ScalarAck, ScalarKind, User,
    UserPatch, WorkoutEvent, validate_goals_patch, validate_new_meal, validate_new_workout,
    validate_user_patch,
};
use crate::store::RemoteStore;

/// Settled journal entries kept around for inspection.
const KEEP_SETTLED: usize = 32;

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("Nothing loaded yet. Load from the store first")]
    NotReady,
    #[error("No user profile yet. Set one up first")]
    NotOnboarded,
    #[error("No entry with id {0}")]
    UnknownId(EntityId),
    #[error("{0}")]
    Invalid(String),
    #[error("Store rejected the change: {0:#}")]
    Remote(anyhow::Error),
    #[error("Failed to load from the store: {0:#}")]
    Load(anyhow::Error),
}

impl SyncError {
    fn invalid(err: anyhow::Error) -> Self {
        Self::Invalid(format!("{err:#}"))
    }
}

/// Steps credited to a day when a workout was added optimistically.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepCredit {
    pub date: NaiveDate,
    pub steps: u32,
    /// The credit created the day's record.
    pub created: bool,
}

impl StepCredit {
    /// `total` without this credit. A record the credit created goes away
    /// once nothing is left on it.
    fn deduct_from(&self, total: Option<u32>) -> Option<u32> {
        let left = total?.saturating_sub(self.steps);
        (left > 0 || !self.created).then_some(left)
    }
}

/// How to undo one optimistic write.
#[derive(Debug, Clone, PartialEq)]
pub enum Rollback {
    AddWorkout { credit: StepCredit },
    AddMeal,
    RemoveWorkout { index: usize, event: WorkoutEvent },
    RemoveMeal { index: usize, event: MealEvent },
    Scalar { kind: ScalarKind, date: NaiveDate, seq: u64 },
    User { seq: u64 },
    Goals { seq: u64 },
}

impl Rollback {
    fn removed_index(&self) -> Option<usize> {
        match self {
            Self::RemoveWorkout { index, .. } | Self::RemoveMeal { index, .. } => Some(*index),
            _ => None,
        }
    }
}

/// One write's journal entry.
#[derive(Debug, Clone, PartialEq)]
pub enum Mutation {
    Pending {
        temp: Option<EntityId>,
        rollback: Rollback,
    },
    /// Carries the canonical id when the write created an event.
    Confirmed(Option<EntityId>),
    Failed,
}

impl Mutation {
    #[must_use]
    pub fn is_pending(&self) -> bool {
        matches!(self, Self::Pending { .. })
    }
}

#[derive(Debug, Default)]
struct Journal {
    next_ticket: u64,
    entries: BTreeMap<u64, Mutation>,
}

impl Journal {
    fn open(&mut self, temp: Option<EntityId>, rollback: Rollback) -> u64 {
        self.next_ticket += 1;
        self.entries
            .insert(self.next_ticket, Mutation::Pending { temp, rollback });
        self.next_ticket
    }

    fn confirm(
        &mut self,
        ticket: u64,
        canonical: Option<EntityId>,
    ) -> Option<(Option<EntityId>, Rollback)> {
        self.settle(ticket, Mutation::Confirmed(canonical))
    }

    fn fail(&mut self, ticket: u64) -> Option<(Option<EntityId>, Rollback)> {
        self.settle(ticket, Mutation::Failed)
    }

    /// Pending -> settled. Returns what was pending; a settled entry is left alone.
    fn settle(&mut self, ticket: u64, outcome: Mutation) -> Option<(Option<EntityId>, Rollback)> {
        let entry = self.entries.get_mut(&ticket)?;
        if !entry.is_pending() {
            return None;
        }
        let Mutation::Pending { temp, rollback } = std::mem::replace(entry, outcome) else {
            return None;
        };
        self.prune();
        Some((temp, rollback))
    }

    fn prune(&mut self) {
        let settled: Vec<u64> = self
            .entries
            .iter()
            .filter(|(_, m)| !m.is_pending())
            .map(|(ticket, _)| *ticket)
            .collect();
        let excess = settled.len().saturating_sub(KEEP_SETTLED);
        for ticket in &settled[..excess] {
            self.entries.remove(ticket);
        }
    }

    fn pending(&self) -> usize {
        self.entries.values().filter(|m| m.is_pending()).count()
    }
}

/// Ordering for one overwrite-style key.
///
/// Writes are numbered as they're issued. The cache shows the newest write
/// that hasn't failed; `confirmed` is what the store last agreed to (or the
/// value from before the first write).
#[derive(Debug)]
struct Slot<T> {
    next_seq: u64,
    in_flight: BTreeMap<u64, T>,
    confirmed_seq: u64,
    confirmed: T,
}

impl<T: Clone> Slot<T> {
    fn new(current: T) -> Self {
        Self {
            next_seq: 0,
            in_flight: BTreeMap::new(),
            confirmed_seq: 0,
            confirmed: current,
        }
    }

    fn issue(&mut self, optimistic: T) -> u64 {
        self.next_seq += 1;
        self.in_flight.insert(self.next_seq, optimistic);
        self.next_seq
    }

    /// What the cache should show once `seq` succeeds, if anything changes.
    fn succeed(&mut self, seq: u64, canonical: T) -> Option<T> {
        self.in_flight.remove(&seq);
        if seq < self.confirmed_seq {
            return None;
        }
        self.confirmed_seq = seq;
        self.confirmed = canonical.clone();
        if self.newer_in_flight(seq) {
            None
        } else {
            Some(canonical)
        }
    }

    /// What the cache should show once `seq` fails, if anything changes.
    fn fail(&mut self, seq: u64) -> Option<T> {
        self.in_flight.remove(&seq);
        if seq < self.confirmed_seq || self.newer_in_flight(seq) {
            return None;
        }
        match self.in_flight.last_key_value() {
            Some((&older, value)) if older > self.confirmed_seq => Some(value.clone()),
            _ => Some(self.confirmed.clone()),
        }
    }

    fn newer_in_flight(&self, seq: u64) -> bool {
        self.in_flight.range(seq + 1..).next().is_some()
    }

    fn is_idle(&self) -> bool {
        self.in_flight.is_empty()
    }

    /// No surviving write is newer than the confirmed value.
    fn shows_confirmed(&self) -> bool {
        self.in_flight.range(self.confirmed_seq + 1..).next().is_none()
    }
}

/// Unconfirmed workout step credits, by journal ticket, per day.
///
/// `shown` are counted in the cache's steps. `fallback` are counted in the
/// confirmed value of the day's steps slot. An absolute steps write replaces
/// whatever was shown, so a credit it replaced is only undone where it is
/// still counted.
#[derive(Debug, Default)]
struct StepCredits {
    shown: HashMap<NaiveDate, BTreeSet<u64>>,
    fallback: HashMap<NaiveDate, BTreeSet<u64>>,
}

impl StepCredits {
    fn add(&mut self, date: NaiveDate, ticket: u64) {
        self.shown.entry(date).or_default().insert(ticket);
    }

    /// An absolute write replaced the day's steps. When the write opened the
    /// slot, the replaced value is the slot's fallback.
    fn overwritten(&mut self, date: NaiveDate, opened_slot: bool) {
        let replaced = self.shown.remove(&date);
        if let Some(credits) = replaced.filter(|_| opened_slot) {
            self.fallback.insert(date, credits);
        }
    }

    /// The cache went back to an older value of the slot.
    fn restored(&mut self, date: NaiveDate, to_confirmed: bool) {
        match self.fallback.get(&date).filter(|_| to_confirmed) {
            Some(credits) => {
                self.shown.insert(date, credits.clone());
            }
            None => {
                self.shown.remove(&date);
            }
        }
    }

    fn forget_fallback(&mut self, date: NaiveDate) {
        self.fallback.remove(&date);
    }

    /// Drops `ticket`. Returns whether the cache and the slot fallback
    /// counted it.
    fn take(&mut self, date: NaiveDate, ticket: u64) -> (bool, bool) {
        (
            take_ticket(&mut self.shown, date, ticket),
            take_ticket(&mut self.fallback, date, ticket),
        )
    }
}

fn take_ticket(map: &mut HashMap<NaiveDate, BTreeSet<u64>>, date: NaiveDate, ticket: u64) -> bool {
    let Some(tickets) = map.get_mut(&date) else {
        return false;
    };
    let found = tickets.remove(&ticket);
    if tickets.is_empty() {
        map.remove(&date);
    }
    found
}

/// An event kind the engine can add and remove.
pub(crate) trait Tracked: LoggedEvent + Send {
    const NOUN: &'static str;

    fn log_mut(cache: &mut LocalCache) -> &mut EventLog<Self>;

    fn removal(index: usize, event: Self) -> Rollback;

    fn delete_remote<R: RemoteStore>(
        remote: &R,
        id: &str,
    ) -> impl Future<Output = anyhow::Result<()>> + Send;
}

impl Tracked for WorkoutEvent {
    const NOUN: &'static str = "workout";

    fn log_mut(cache: &mut LocalCache) -> &mut EventLog<Self> {
        cache.workouts_mut()
    }

    fn removal(index: usize, event: Self) -> Rollback {
        Rollback::RemoveWorkout { index, event }
    }

    fn delete_remote<R: RemoteStore>(
        remote: &R,
        id: &str,
    ) -> impl Future<Output = anyhow::Result<()>> + Send {
        remote.delete_workout(id)
    }
}

impl Tracked for MealEvent {
    const NOUN: &'static str = "meal";

    fn log_mut(cache: &mut LocalCache) -> &mut EventLog<Self> {
        cache.meals_mut()
    }

    fn removal(index: usize, event: Self) -> Rollback {
        Rollback::RemoveMeal { index, event }
    }

    fn delete_remote<R: RemoteStore>(
        remote: &R,
        id: &str,
    ) -> impl Future<Output = anyhow::Result<()>> + Send {
        remote.delete_meal(id)
    }
}

#[derive(Debug, Default)]
struct State {
    cache: LocalCache,
    journal: Journal,
    scalars: HashMap<(ScalarKind, NaiveDate), Slot<Option<u32>>>,
    credits: StepCredits,
    user: Option<Slot<Option<User>>>,
    goals: Option<Slot<Goals>>,
    /// Temp ids removed locally while their create was in flight, with the
    /// ticket of the removal.
    orphans: HashMap<EntityId, u64>,
}

impl State {
    fn fail(&mut self, ticket: u64, today: NaiveDate) {
        if let Some((temp, rollback)) = self.journal.fail(ticket) {
            self.roll_back(ticket, temp.as_ref(), rollback, today);
        }
    }

    fn roll_back(
        &mut self,
        ticket: u64,
        temp: Option<&EntityId>,
        rollback: Rollback,
        today: NaiveDate,
    ) {
        match rollback {
            Rollback::AddWorkout { credit } => {
                if let Some(temp) = temp {
                    self.cache.workouts_mut().remove(temp);
                }
                let (shown, fallback) = self.credits.take(credit.date, ticket);
                if shown {
                    self.cache
                        .subtract_steps(credit.date, credit.steps, credit.created, today);
                }
                if let Some(slot) = self
                    .scalars
                    .get_mut(&(ScalarKind::Steps, credit.date))
                    .filter(|_| fallback)
                {
                    slot.confirmed = credit.deduct_from(slot.confirmed);
                }
            }
            Rollback::AddMeal => {
                if let Some(temp) = temp {
                    self.cache.meals_mut().remove(temp);
                }
            }
            Rollback::RemoveWorkout { index, event } => {
                self.cache.workouts_mut().restore(index, event);
            }
            Rollback::RemoveMeal { index, event } => self.cache.meals_mut().restore(index, event),
            Rollback::Scalar { kind, date, seq } => {
                let shown = self.scalars.get_mut(&(kind, date)).and_then(|slot| {
                    let value = slot.fail(seq)?;
                    Some((value, slot.shows_confirmed()))
                });
                if let Some((value, to_confirmed)) = shown {
                    self.cache.restore_scalar(kind, date, value, today);
                    if kind == ScalarKind::Steps {
                        self.credits.restored(date, to_confirmed);
                    }
                }
                self.release_scalar(kind, date);
            }
            Rollback::User { seq } => {
                if let Some(user) = self.user.as_mut().and_then(|slot| slot.fail(seq)) {
                    self.cache.set_user(user);
                }
                self.release_user();
            }
            Rollback::Goals { seq } => {
                if let Some(goals) = self.goals.as_mut().and_then(|slot| slot.fail(seq)) {
                    self.cache.set_goals(goals);
                }
                self.release_goals();
            }
        }
    }

    fn release_scalar(&mut self, kind: ScalarKind, date: NaiveDate) {
        if self.scalars.get(&(kind, date)).is_some_and(Slot::is_idle) {
            self.scalars.remove(&(kind, date));
            if kind == ScalarKind::Steps {
                self.credits.forget_fallback(date);
            }
        }
    }

    fn release_user(&mut self) {
        if self.user.as_ref().is_some_and(Slot::is_idle) {
            self.user = None;
        }
    }

    fn release_goals(&mut self) {
        if self.goals.as_ref().is_some_and(Slot::is_idle) {
            self.goals = None;
        }
    }
}

pub struct SyncEngine<R> {
    remote: R,
    clock: Arc<dyn Clock>,
    state: Mutex<State>,
    next_temp: AtomicU64,
}

impl<R: RemoteStore> SyncEngine<R> {
    pub fn new(remote: R, clock: Arc<dyn Clock>) -> Self {
        Self {
            remote,
            clock,
            state: Mutex::new(State::default()),
            next_temp: AtomicU64::new(1),
        }
    }

    pub fn remote(&self) -> &R {
        &self.remote
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn ready(&self) -> Result<MutexGuard<'_, State>, SyncError> {
        let state = self.state();
        if state.cache.is_ready() {
            Ok(state)
        } else {
            Err(SyncError::NotReady)
        }
    }

    fn next_temp_id(&self) -> EntityId {
        EntityId::Temp(self.next_temp.fetch_add(1, Ordering::Relaxed))
    }

    // --- Reads ---

    /// A copy of the cache as it is right now.
    pub fn cache(&self) -> LocalCache {
        self.state().cache.clone()
    }

    pub fn with_cache<T>(&self, f: impl FnOnce(&LocalCache) -> T) -> T {
        f(&self.state().cache)
    }

    pub fn is_ready(&self) -> bool {
        self.state().cache.is_ready()
    }

    pub fn load_state(&self) -> LoadState {
        self.state().cache.load_state().clone()
    }

    pub fn user(&self) -> Option<User> {
        self.state().cache.user().cloned()
    }

    pub fn goals(&self) -> Goals {
        self.state().cache.goals()
    }

    pub fn stats_for_date(&self, date: NaiveDate) -> DayStats {
        self.with_cache(|cache| aggregate::stats_for_date(cache, date))
    }

    pub fn live_today_totals(&self) -> TodayTotals {
        let today = self.clock.today();
        self.with_cache(|cache| aggregate::live_today_totals(cache, today))
    }

    pub fn weekly_burn(&self) -> Vec<DailyBurn> {
        let today = self.clock.today();
        self.with_cache(|cache| aggregate::weekly_burn(cache, today))
    }

    pub fn goal_progress(&self) -> GoalProgress {
        let today = self.clock.today();
        self.with_cache(|cache| {
            aggregate::goal_progress(&aggregate::live_today_totals(cache, today), &cache.goals())
        })
    }

    /// Writes sent to the store that haven't resolved yet.
    pub fn pending_mutations(&self) -> usize {
        self.state().journal.pending()
    }

    /// In-flight and recently settled writes, oldest first.
    pub fn journal(&self) -> Vec<Mutation> {
        self.state().journal.entries.values().cloned().collect()
    }

    // --- Load ---

    /// Replace the cache wholesale with the store's snapshot.
    pub async fn load_all(&self) -> Result<(), SyncError> {
        match self.remote.load_all().await {
            Ok(snapshot) => {
                let today = self.clock.today();
                let mut state = self.state();
                state.cache.replace(snapshot, today);
                state.credits.shown.clear();
                info!(
                    workouts = state.cache.workouts().len(),
                    meals = state.cache.meals().len(),
                    onboarded = state.cache.user().is_some(),
                    "Loaded snapshot"
                );
                Ok(())
            }
            Err(e) => {
                error!("Load failed: {e:#}");
                self.state().cache.fail_load(format!("{e:#}"));
                Err(SyncError::Load(e))
            }
        }
    }

    // --- Events ---

    pub async fn add_workout(&self, data: NewWorkout) -> Result<WorkoutEvent, SyncError> {
        validate_new_workout(&data).map_err(SyncError::invalid)?;
        let now = self.clock.now();
        let timestamp = data.timestamp.unwrap_or(now);
        let request = NewWorkout {
            timestamp: Some(timestamp),
            ..data
        };
        let temp = self.next_temp_id();

        let ticket = {
            let mut state = self.ready()?;
            let date = day_of(&timestamp);
            let steps = aggregate::estimated_steps(request.duration_minutes);
            state
                .cache
                .workouts_mut()
                .push(request.clone().into_event(temp.clone(), timestamp));
            let created = state.cache.add_steps(date, steps, day_of(&now));
            let ticket = state.journal.open(
                Some(temp.clone()),
                Rollback::AddWorkout {
                    credit: StepCredit {
                        date,
                        steps,
                        created,
                    },
                },
            );
            state.credits.add(date, ticket);
            ticket
        };

        let result = self.remote.create_workout(&request).await;
        self.finish_create(ticket, temp, result).await
    }

    pub async fn add_meal(&self, data: NewMeal) -> Result<MealEvent, SyncError> {
        validate_new_meal(&data).map_err(SyncError::invalid)?;
        let timestamp = data.timestamp.unwrap_or_else(|| self.clock.now());
        let request = NewMeal {
            timestamp: Some(timestamp),
            ..data
        };
        let temp = self.next_temp_id();

        let ticket = {
            let mut state = self.ready()?;
            state
                .cache
                .meals_mut()
                .push(request.clone().into_event(temp.clone(), timestamp));
            state.journal.open(Some(temp.clone()), Rollback::AddMeal)
        };

        let result = self.remote.create_meal(&request).await;
        self.finish_create(ticket, temp, result).await
    }

    async fn finish_create<E: Tracked>(
        &self,
        ticket: u64,
        temp: EntityId,
        result: anyhow::Result<E>,
    ) -> Result<E, SyncError> {
        let (removal, event) = {
            let today = self.clock.today();
            let mut state = self.state();
            let removal = state.orphans.remove(&temp);
            let event = match result {
                Ok(event) => event,
                Err(e) => {
                    state.fail(ticket, today);
                    if let Some(removal) = removal {
                        // Never reached the store, so there is nothing to delete
                        state.journal.confirm(removal, None);
                    }
                    warn!(%temp, "Rolled back {}: {e:#}", E::NOUN);
                    return Err(SyncError::Remote(e));
                }
            };
            if let Some((_, Rollback::AddWorkout { credit })) =
                state.journal.confirm(ticket, Some(event.id().clone()))
            {
                state.credits.take(credit.date, ticket);
            }

            let Some(removal) = removal else {
                if E::log_mut(&mut state.cache).replace(&temp, event.clone()) {
                    debug!(%temp, id = %event.id(), "Confirmed {}", E::NOUN);
                } else {
                    debug!(%temp, id = %event.id(), "Confirmed {} after a reload", E::NOUN);
                }
                return Ok(event);
            };
            (removal, event)
        };

        // Removed locally before the store assigned an id
        let id = event.id().to_string();
        let outcome = E::delete_remote(&self.remote, &id).await;
        let mut state = self.state();
        match outcome {
            Ok(()) => {
                state.journal.confirm(removal, None);
                debug!(%temp, %id, "Deleted {} removed while in flight", E::NOUN);
            }
            Err(e) => {
                if let Some((_, rollback)) = state.journal.fail(removal) {
                    let index = rollback.removed_index().unwrap_or(usize::MAX);
                    E::log_mut(&mut state.cache).restore(index, event.clone());
                }
                warn!(%id, "Restored {} after failed delete: {e:#}", E::NOUN);
            }
        }
        Ok(event)
    }

    /// Remove a workout by temp or canonical id. Steps already credited for
    /// it stay.
    pub async fn remove_workout(&self, id: &EntityId) -> Result<(), SyncError> {
        self.remove_event::<WorkoutEvent>(id).await
    }

    pub async fn remove_meal(&self, id: &EntityId) -> Result<(), SyncError> {
        self.remove_event::<MealEvent>(id).await
    }

    async fn remove_event<E: Tracked>(&self, id: &EntityId) -> Result<(), SyncError> {
        let ticket = {
            let mut state = self.ready()?;
            let Some((index, event)) = E::log_mut(&mut state.cache).remove(id) else {
                return Err(SyncError::UnknownId(id.clone()));
            };
            let ticket = state
                .journal
                .open(id.is_temp().then(|| id.clone()), E::removal(index, event));
            if id.is_temp() {
                // The create's reconciliation issues the delete
                state.orphans.insert(id.clone(), ticket);
                debug!(%id, "Removed unconfirmed {}", E::NOUN);
                return Ok(());
            }
            ticket
        };

        let result = E::delete_remote(&self.remote, &id.to_string()).await;
        let today = self.clock.today();
        let mut state = self.state();
        match result {
            Ok(()) => {
                state.journal.confirm(ticket, None);
                Ok(())
            }
            Err(e) => {
                state.fail(ticket, today);
                warn!(%id, "Restored {} after failed delete: {e:#}", E::NOUN);
                Err(SyncError::Remote(e))
            }
        }
    }

    // --- Daily scalars ---

    /// Absolute upsert of one field of `date`'s record.
    pub async fn set_scalar_for_date(
        &self,
        kind: ScalarKind,
        value: u32,
        date: NaiveDate,
    ) -> Result<ScalarAck, SyncError> {
        let (ticket, seq) = {
            let today = self.clock.today();
            let mut guard = self.ready()?;
            let state = &mut *guard;
            let current = state
                .cache
                .has_daily_stat(date)
                .then(|| state.cache.daily_stat(date).get(kind));
            let opened_slot = !state.scalars.contains_key(&(kind, date));
            let seq = state
                .scalars
                .entry((kind, date))
                .or_insert_with(|| Slot::new(current))
                .issue(Some(value));
            state.cache.set_scalar(kind, date, value, today);
            if kind == ScalarKind::Steps {
                state.credits.overwritten(date, opened_slot);
            }
            let ticket = state
                .journal
                .open(None, Rollback::Scalar { kind, date, seq });
            (ticket, seq)
        };

        let result = self.remote.put_scalar(kind, date, value).await;
        let today = self.clock.today();
        let mut state = self.state();
        match result {
            Ok(ack) => {
                state.journal.confirm(ticket, None);
                let (shown, took_over) = match state.scalars.get_mut(&(kind, date)) {
                    Some(slot) => {
                        let shown = slot.succeed(seq, Some(ack.value));
                        (shown, slot.confirmed_seq == seq)
                    }
                    None => (None, false),
                };
                if kind == ScalarKind::Steps && took_over {
                    state.credits.forget_fallback(date);
                }
                match shown {
                    Some(value) => {
                        state.cache.restore_scalar(kind, date, value, today);
                        if kind == ScalarKind::Steps {
                            state.credits.overwritten(date, false);
                        }
                    }
                    None => debug!(%kind, %date, seq, "Discarded superseded response"),
                }
                state.release_scalar(kind, date);
                Ok(ack)
            }
            Err(e) => {
                state.fail(ticket, today);
                warn!(%kind, %date, seq, "{kind} write failed: {e:#}");
                Err(SyncError::Remote(e))
            }
        }
    }

    /// Add `delta` to today's value (clamped at 0) and write the result.
    pub async fn adjust_scalar(&self, kind: ScalarKind, delta: i64) -> Result<ScalarAck, SyncError> {
        let today = self.clock.today();
        let current = self.ready()?.cache.daily_stat(today).get(kind);
        let target = (i64::from(current) + delta).max(0);
        let value = u32::try_from(target).unwrap_or(u32::MAX);
        self.set_scalar_for_date(kind, value, today).await
    }

    // --- Profile ---

    /// First call creates the user; later calls merge into it.
    pub async fn set_user(&self, patch: UserPatch) -> Result<User, SyncError> {
        validate_user_patch(&patch).map_err(SyncError::invalid)?;
        let (ticket, seq) = {
            let mut state = self.ready()?;
            let current = state.cache.user().cloned();
            let optimistic = match &current {
                Some(user) => {
                    let mut user = user.clone();
                    user.apply(&patch);
                    user
                }
                None if patch.name.is_none() => {
                    return Err(SyncError::Invalid(
                        "A name is required to create the profile".to_string(),
                    ));
                }
                None => User::from_patch(&patch),
            };
            let seq = state
                .user
                .get_or_insert_with(|| Slot::new(current))
                .issue(Some(optimistic.clone()));
            state.cache.set_user(Some(optimistic));
            (state.journal.open(None, Rollback::User { seq }), seq)
        };

        let result = self.remote.save_user(&patch).await;
        let today = self.clock.today();
        let mut state = self.state();
        match result {
            Ok(user) => {
                state.journal.confirm(ticket, None);
                if let Some(shown) = state
                    .user
                    .as_mut()
                    .and_then(|slot| slot.succeed(seq, Some(user.clone())))
                {
                    state.cache.set_user(shown);
                }
                state.release_user();
                Ok(user)
            }
            Err(e) => {
                state.fail(ticket, today);
                warn!("Profile update rolled back: {e:#}");
                Err(SyncError::Remote(e))
            }
        }
    }

    /// Field-by-field merge into the current goals.
    pub async fn set_goals(&self, patch: GoalsPatch) -> Result<Goals, SyncError> {
        validate_goals_patch(&patch).map_err(SyncError::invalid)?;
        let (ticket, seq) = {
            let mut state = self.ready()?;
            if state.cache.user().is_none() {
                return Err(SyncError::NotOnboarded);
            }
            let current = state.cache.goals();
            let optimistic = current.merged(&patch);
            let seq = state
                .goals
                .get_or_insert_with(|| Slot::new(current))
                .issue(optimistic);
            state.cache.set_goals(optimistic);
            (state.journal.open(None, Rollback::Goals { seq }), seq)
        };

        let result = self.remote.save_goals(&patch).await;
        let today = self.clock.today();
        let mut state = self.state();
        match result {
            Ok(goals) => {
                state.journal.confirm(ticket, None);
                if let Some(shown) = state
                    .goals
                    .as_mut()
                    .and_then(|slot| slot.succeed(seq, goals))
                {
                    state.cache.set_goals(shown);
                }
                state.release_goals();
                Ok(goals)
            }
            Err(e) => {
                state.fail(ticket, today);
                warn!("Goal update rolled back: {e:#}");
                Err(SyncError::Remote(e))
            }
        }
    }

    /// Forget the local user. Nothing is sent to the store.
    pub fn logout(&self) {
        let mut state = self.state();
        state.cache.set_user(None);
        state.cache.set_goals(Goals::default());
        info!("Logged out");
    }
}
