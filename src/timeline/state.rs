// StateTimeline - Playback state changes over time
// A Timeline of stopped/started/paused transitions with last/next occurrence queries

use super::{SearchResult, Timeline, TimelineEvent};
use std::fmt;

/// Playback state of a tick source, clock or transport
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize,
)]
pub enum PlaybackState {
    #[default]
    Stopped,
    Started,
    Paused,
}

impl PlaybackState {
    pub fn is_started(&self) -> bool {
        matches!(self, PlaybackState::Started)
    }
}

impl fmt::Display for PlaybackState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PlaybackState::Stopped => "stopped",
            PlaybackState::Started => "started",
            PlaybackState::Paused => "paused",
        };
        f.write_str(name)
    }
}

/// A state transition recorded at `time`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StateEvent {
    pub time: f64,
    pub state: PlaybackState,
}

impl StateEvent {
    pub fn new(state: PlaybackState, time: f64) -> Self {
        Self { time, state }
    }
}

impl TimelineEvent for StateEvent {
    fn time(&self) -> f64 {
        self.time
    }
}

/// Timeline of playback states
///
/// Transitions are recorded, never validated here: the owner decides which
/// transitions make sense.
#[derive(Debug, Clone)]
pub struct StateTimeline {
    timeline: Timeline<StateEvent>,
    initial: PlaybackState,
}

impl StateTimeline {
    pub fn new(initial: PlaybackState) -> Self {
        Self {
            timeline: Timeline::new(),
            initial,
        }
    }

    pub fn initial(&self) -> PlaybackState {
        self.initial
    }

    pub fn timeline(&self) -> &Timeline<StateEvent> {
        &self.timeline
    }

    pub fn len(&self) -> usize {
        self.timeline.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timeline.is_empty()
    }

    /// Record a transition. Always appends; an event at the same time as an
    /// existing one takes precedence over it.
    pub fn set_state_at_time(&mut self, state: PlaybackState, time: f64) {
        self.timeline.add(StateEvent::new(state, time));
    }

    /// State in effect at `time`, or the initial state if nothing precedes it
    pub fn get_value_at_time(&self, time: f64) -> PlaybackState {
        self.timeline.get(time).map_or(self.initial, |e| e.state)
    }

    /// Last event at or before `time`
    pub fn get(&self, time: f64) -> Option<&StateEvent> {
        self.timeline.get(time)
    }

    /// Most recent occurrence of `state` strictly before `time`
    pub fn get_last_state(&self, state: PlaybackState, time: f64) -> Option<&StateEvent> {
        let start = match self.timeline.search(time) {
            SearchResult::Before => return None,
            SearchResult::After => self.timeline.len().checked_sub(1),
            SearchResult::Hit { first, .. } => first.checked_sub(1),
            SearchResult::Between { lower, .. } => Some(lower),
        }?;
        self.scan_backward(state, start)
    }

    /// Most recent occurrence of `state` at or before `time`
    pub fn get_last_state_at_or_before(
        &self,
        state: PlaybackState,
        time: f64,
    ) -> Option<&StateEvent> {
        let start = self.timeline.get_index(time)?;
        self.scan_backward(state, start)
    }

    /// Next occurrence of `state` strictly after `time`
    pub fn get_next_state(&self, state: PlaybackState, time: f64) -> Option<&StateEvent> {
        let start = match self.timeline.search(time) {
            SearchResult::Before => 0,
            SearchResult::After => return None,
            SearchResult::Hit { last, .. } => last + 1,
            SearchResult::Between { upper, .. } => upper,
        };
        self.timeline.events()[start.min(self.timeline.len())..]
            .iter()
            .find(|e| e.state == state)
    }

    fn scan_backward(&self, state: PlaybackState, start: usize) -> Option<&StateEvent> {
        self.timeline.events()[..=start]
            .iter()
            .rev()
            .find(|e| e.state == state)
    }

    /// Events with `start <= time < end`
    pub fn between(&self, start: f64, end: f64) -> &[StateEvent] {
        self.timeline.between(start, end)
    }

    /// Events with `start <= time <= end`
    pub fn between_inclusive(&self, start: f64, end: f64) -> &[StateEvent] {
        self.timeline.between_inclusive(start, end)
    }

    pub fn for_each_between<F>(&self, start: f64, end: f64, f: F)
    where
        F: FnMut(&StateEvent),
    {
        self.timeline.for_each_between(start, end, f);
    }

    /// Remove every transition at or after `time`
    pub fn cancel(&mut self, time: f64) {
        self.timeline.cancel(time);
    }

    /// Forget transitions strictly before `time`
    pub fn cancel_before(&mut self, time: f64) {
        self.timeline.cancel_before(time);
    }

    pub fn clear(&mut self) {
        self.timeline.clear();
    }
}

impl Default for StateTimeline {
    fn default() -> Self {
        Self::new(PlaybackState::Stopped)
    }
}
