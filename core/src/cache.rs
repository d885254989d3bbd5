//! In-memory state the client reads from.
//!
//! Reads are public. Writes are crate-private: only the sync engine mutates a
//! cache, so every change goes through the optimistic protocol there.

use std::collections::BTreeMap;

use chrono::{NaiveDate, NaiveDateTime};

use crate::models::{
    DailyStat, EntityId, Goals, MealEvent, ScalarKind, Snapshot, User, WorkoutEvent,
};

/// Something that lives in an ordered, id-addressed event sequence.
pub trait LoggedEvent: Clone {
    fn id(&self) -> &EntityId;
    fn timestamp(&self) -> NaiveDateTime;
}

impl LoggedEvent for WorkoutEvent {
    fn id(&self) -> &EntityId {
        &self.id
    }

    fn timestamp(&self) -> NaiveDateTime {
        self.timestamp
    }
}

impl LoggedEvent for MealEvent {
    fn id(&self) -> &EntityId {
        &self.id
    }

    fn timestamp(&self) -> NaiveDateTime {
        self.timestamp
    }
}

/// Events with unique ids, in timestamp order.
#[derive(Debug, Clone, PartialEq)]
pub struct EventLog<E> {
    events: Vec<E>,
}

impl<E> Default for EventLog<E> {
    fn default() -> Self {
        Self { events: Vec::new() }
    }
}

impl<E: LoggedEvent> EventLog<E> {
    fn from_events(events: Vec<E>) -> Self {
        let mut log = Self::default();
        for event in events {
            // Keep the first occurrence if the store ever sends a duplicate id
            if log.position(event.id()).is_none() {
                log.push(event);
            }
        }
        log
    }

    #[must_use]
    pub fn as_slice(&self) -> &[E] {
        &self.events
    }

    pub fn iter(&self) -> std::slice::Iter<'_, E> {
        self.events.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.events.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    #[must_use]
    pub fn get(&self, id: &EntityId) -> Option<&E> {
        self.events.iter().find(|e| e.id() == id)
    }

    fn position(&self, id: &EntityId) -> Option<usize> {
        self.events.iter().position(|e| e.id() == id)
    }

    /// Insert after every event logged at or before `event`.
    pub(crate) fn push(&mut self, event: E) {
        let at = self
            .events
            .partition_point(|e| e.timestamp() <= event.timestamp());
        self.events.insert(at, event);
    }

    /// Swap the entry holding `id` for `event`, in the same slot.
    pub(crate) fn replace(&mut self, id: &EntityId, event: E) -> bool {
        match self.position(id) {
            Some(idx) => {
                self.events[idx] = event;
                true
            }
            None => false,
        }
    }

    pub(crate) fn remove(&mut self, id: &EntityId) -> Option<(usize, E)> {
        let idx = self.position(id)?;
        Some((idx, self.events.remove(idx)))
    }

    /// Put a removed event back where it was (or at the end if the log shrank).
    pub(crate) fn restore(&mut self, index: usize, event: E) {
        if self.position(event.id()).is_some() {
            return;
        }
        let index = index.min(self.events.len());
        self.events.insert(index, event);
    }

    pub(crate) fn on_day(&self, date: NaiveDate) -> impl Iterator<Item = &E> {
        self.events
            .iter()
            .filter(move |e| crate::calendar::day_of(&e.timestamp()) == date)
    }
}

impl<'a, E> IntoIterator for &'a EventLog<E> {
    type Item = &'a E;
    type IntoIter = std::slice::Iter<'a, E>;

    fn into_iter(self) -> Self::IntoIter {
        self.events.iter()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum LoadState {
    #[default]
    Empty,
    Ready,
    Failed(String),
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct LocalCache {
    user: Option<User>,
    goals: Goals,
    workouts: EventLog<WorkoutEvent>,
    meals: EventLog<MealEvent>,
    daily_stats: BTreeMap<NaiveDate, DailyStat>,
    /// Mirror of today's record, kept in step with `daily_stats`.
    live: Option<DailyStat>,
    state: LoadState,
}

impl LocalCache {
    /// Build a ready cache from a store snapshot.
    #[must_use]
    pub fn from_snapshot(snapshot: Snapshot, today: NaiveDate) -> Self {
        let mut cache = Self::default();
        cache.replace(snapshot, today);
        cache
    }

    // --- Reads ---

    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.state == LoadState::Ready
    }

    #[must_use]
    pub fn load_state(&self) -> &LoadState {
        &self.state
    }

    #[must_use]
    pub fn user(&self) -> Option<&User> {
        self.user.as_ref()
    }

    #[must_use]
    pub fn goals(&self) -> Goals {
        self.goals
    }

    #[must_use]
    pub fn workouts(&self) -> &EventLog<WorkoutEvent> {
        &self.workouts
    }

    #[must_use]
    pub fn meals(&self) -> &EventLog<MealEvent> {
        &self.meals
    }

    /// The record for `date`, or an all-zero one if nothing was written.
    #[must_use]
    pub fn daily_stat(&self, date: NaiveDate) -> DailyStat {
        self.daily_stats
            .get(&date)
            .copied()
            .unwrap_or_else(|| DailyStat::empty(date))
    }

    #[must_use]
    pub fn has_daily_stat(&self, date: NaiveDate) -> bool {
        self.daily_stats.contains_key(&date)
    }

    pub fn daily_stats(&self) -> impl Iterator<Item = &DailyStat> {
        self.daily_stats.values()
    }

    /// Today's water and steps without a map lookup.
    #[must_use]
    pub fn live(&self, today: NaiveDate) -> DailyStat {
        match self.live {
            Some(stat) if stat.date == today => stat,
            _ => self.daily_stat(today),
        }
    }

    // --- Writes (sync engine only) ---

    pub(crate) fn replace(&mut self, snapshot: Snapshot, today: NaiveDate) {
        self.goals = if snapshot.user.is_some() {
            snapshot.goals
        } else {
            Goals::default()
        };
        self.user = snapshot.user;
        self.workouts = EventLog::from_events(snapshot.workouts);
        self.meals = EventLog::from_events(snapshot.meals);
        self.daily_stats = snapshot
            .daily_stats
            .into_iter()
            .map(|stat| (stat.date, stat))
            .collect();
        // Stores that only report today's totals still count as a record
        if !self.daily_stats.contains_key(&today) && (snapshot.water_ml > 0 || snapshot.steps > 0)
        {
            self.daily_stats.insert(
                today,
                DailyStat {
                    date: today,
                    water_ml: snapshot.water_ml,
                    steps: snapshot.steps,
                },
            );
        }
        self.live = Some(self.daily_stat(today));
        self.state = LoadState::Ready;
    }

    pub(crate) fn fail_load(&mut self, reason: String) {
        *self = Self {
            state: LoadState::Failed(reason),
            ..Self::default()
        };
    }

    pub(crate) fn set_user(&mut self, user: Option<User>) {
        self.user = user;
    }

    pub(crate) fn set_goals(&mut self, goals: Goals) {
        self.goals = goals;
    }

    pub(crate) fn workouts_mut(&mut self) -> &mut EventLog<WorkoutEvent> {
        &mut self.workouts
    }

    pub(crate) fn meals_mut(&mut self) -> &mut EventLog<MealEvent> {
        &mut self.meals
    }

    /// Overwrite one field of the record for `date`, creating it if needed.
    pub(crate) fn set_scalar(
        &mut self,
        kind: ScalarKind,
        date: NaiveDate,
        value: u32,
        today: NaiveDate,
    ) {
        let mut stat = self.daily_stat(date);
        stat.set(kind, value);
        self.put_daily(stat, today);
    }

    /// Put one field back to `previous`.
    ///
    /// `None` means there was no record for `date`; the record is dropped
    /// again once nothing else has been written to it.
    pub(crate) fn restore_scalar(
        &mut self,
        kind: ScalarKind,
        date: NaiveDate,
        previous: Option<u32>,
        today: NaiveDate,
    ) {
        let mut stat = self.daily_stat(date);
        stat.set(kind, previous.unwrap_or(0));
        self.put_or_drop(stat, previous.is_none(), today);
    }

    /// Returns true if this created the record for `date`.
    pub(crate) fn add_steps(&mut self, date: NaiveDate, delta: u32, today: NaiveDate) -> bool {
        let created = !self.daily_stats.contains_key(&date);
        let mut stat = self.daily_stat(date);
        stat.steps = stat.steps.saturating_add(delta);
        self.put_daily(stat, today);
        created
    }

    /// Undo an [`add_steps`](Self::add_steps).
    pub(crate) fn subtract_steps(
        &mut self,
        date: NaiveDate,
        delta: u32,
        created: bool,
        today: NaiveDate,
    ) {
        if !self.daily_stats.contains_key(&date) {
            return;
        }
        let mut stat = self.daily_stat(date);
        stat.steps = stat.steps.saturating_sub(delta);
        self.put_or_drop(stat, created, today);
    }

    fn put_or_drop(&mut self, stat: DailyStat, drop_if_empty: bool, today: NaiveDate) {
        if drop_if_empty && stat.is_empty() {
            self.daily_stats.remove(&stat.date);
            if stat.date == today {
                self.live = Some(DailyStat::empty(today));
            }
        } else {
            self.put_daily(stat, today);
        }
    }

    fn put_daily(&mut self, stat: DailyStat, today: NaiveDate) {
        if stat.date == today {
            self.live = Some(stat);
        }
        self.daily_stats.insert(stat.date, stat);
    }
}
