// TickSource - Elapsed ticks across start/stop/pause and seeks
// Integrates a TickSignal only over the started intervals of a state timeline

use crate::context::{Context, Seconds, Ticks};
use crate::param::TickSignal;
use crate::timeline::{
    approx_eq, PlaybackState, StateEvent, StateTimeline, Timeline, TimelineEvent, EPSILON,
};

/// Explicit seek: at `time` the source reads `ticks` (and `seconds`)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TickOffsetEvent {
    pub time: Seconds,
    pub ticks: Ticks,
    pub seconds: Seconds,
}

impl TimelineEvent for TickOffsetEvent {
    fn time(&self) -> f64 {
        self.time
    }
}

/// Counts ticks of a frequency curve while started
///
/// Starts stopped, with zero ticks anchored at time 0.
#[derive(Debug, Clone)]
pub struct TickSource {
    frequency: TickSignal,
    state: StateTimeline,
    offsets: Timeline<TickOffsetEvent>,
}

impl TickSource {
    pub fn new(context: Context, frequency: f64) -> Self {
        Self::with_frequency(TickSignal::new(context, frequency))
    }

    pub fn with_frequency(frequency: TickSignal) -> Self {
        let mut state = StateTimeline::new(PlaybackState::Stopped);
        state.set_state_at_time(PlaybackState::Stopped, 0.0);

        let mut offsets = Timeline::new();
        offsets.add(TickOffsetEvent {
            time: 0.0,
            ticks: 0.0,
            seconds: 0.0,
        });

        Self {
            frequency,
            state,
            offsets,
        }
    }

    pub fn context(&self) -> &Context {
        self.frequency.context()
    }

    pub fn frequency(&self) -> &TickSignal {
        &self.frequency
    }

    /// Tempo edits take effect on the next query
    pub fn frequency_mut(&mut self) -> &mut TickSignal {
        &mut self.frequency
    }

    pub fn state(&self) -> &StateTimeline {
        &self.state
    }

    pub fn get_state_at_time(&self, time: Seconds) -> PlaybackState {
        self.state.get_value_at_time(time)
    }

    /// Start counting at `time`, optionally seeking to `offset` ticks.
    /// Ignored if already started at `time`.
    pub fn start(&mut self, time: Seconds, offset: Option<Ticks>) -> &mut Self {
        if self.state.get_value_at_time(time) != PlaybackState::Started {
            self.state.set_state_at_time(PlaybackState::Started, time);
            if let Some(ticks) = offset {
                self.set_ticks_at_time(ticks, time);
            }
            tracing::trace!(time, ?offset, "tick source started");
        }
        self
    }

    /// Stop at `time`, resetting the tick count to zero
    pub fn stop(&mut self, time: Seconds) -> &mut Self {
        // Re-entrant stop at the same instant: drop what the earlier stop anchored
        if let Some(event) = self.state.get(time).copied() {
            if event.state == PlaybackState::Stopped
                && approx_eq(event.time, time)
                && event.time > 0.0
            {
                self.offsets.cancel(event.time);
                self.state.cancel(event.time);
            }
        }
        self.state.cancel(time);
        self.state.set_state_at_time(PlaybackState::Stopped, time);
        self.set_ticks_at_time(0.0, time);
        tracing::trace!(time, "tick source stopped");
        self
    }

    /// Freeze the tick count at `time`. Ignored unless started.
    pub fn pause(&mut self, time: Seconds) -> &mut Self {
        if self.state.get_value_at_time(time) == PlaybackState::Started {
            self.state.set_state_at_time(PlaybackState::Paused, time);
            tracing::trace!(time, "tick source paused");
        }
        self
    }

    /// Discard every state change and seek at or after `time`
    pub fn cancel(&mut self, time: Seconds) -> &mut Self {
        self.state.cancel(time);
        self.offsets.cancel(time);
        self
    }

    /// Elapsed ticks at `time`
    pub fn get_ticks_at_time(&self, time: Seconds) -> Ticks {
        self.accumulate(time, |offset| offset.ticks, |from, to| {
            self.frequency.get_ticks_at_time(to) - self.frequency.get_ticks_at_time(from)
        })
    }

    /// Elapsed started seconds at `time`
    pub fn get_seconds_at_time(&self, time: Seconds) -> Seconds {
        self.accumulate(time, |offset| offset.seconds, |from, to| to - from)
    }

    /// Walk the state events from the last stop up to `time`, summing `span` over
    /// every started interval and restarting from any seek found along the way
    fn accumulate<O, S>(&self, time: Seconds, offset_value: O, span: S) -> f64
    where
        O: Fn(&TickOffsetEvent) -> f64,
        S: Fn(Seconds, Seconds) -> f64,
    {
        let (mut last, events) = match self
            .state
            .get_last_state_at_or_before(PlaybackState::Stopped, time)
        {
            Some(stop) => (*stop, self.state.between_inclusive(stop.time, time)),
            None => (
                StateEvent::new(PlaybackState::Stopped, f64::NEG_INFINITY),
                self.state.between_inclusive(f64::NEG_INFINITY, time),
            ),
        };
        // Closes the interval that is still open at `time`
        let marker = StateEvent::new(PlaybackState::Paused, time);

        let mut elapsed = 0.0;
        for event in events.iter().chain(std::iter::once(&marker)) {
            let mut period_start = last.time;
            if let Some(offset) = self.offsets.get(event.time) {
                if offset.time >= last.time {
                    elapsed = offset_value(offset);
                    period_start = offset.time;
                }
            }
            if last.state.is_started() && !event.state.is_started() {
                elapsed += span(period_start, event.time);
            }
            last = *event;
        }
        elapsed
    }

    /// Seek: the source reads `ticks` at `time`. Replaces any later seek.
    pub fn set_ticks_at_time(&mut self, ticks: Ticks, time: Seconds) {
        self.offsets.cancel(time);
        self.offsets.add(TickOffsetEvent {
            time,
            ticks,
            seconds: self.frequency.get_duration_of_ticks(ticks, time),
        });
    }

    /// Time at which `tick` is reached, measured in the started interval in
    /// effect at `before`
    pub fn get_time_of_tick(&self, tick: Ticks, before: Seconds) -> Seconds {
        let (offset_time, offset_ticks) = self
            .offsets
            .get(before)
            .map_or((0.0, 0.0), |o| (o.time, o.ticks));
        let state_time = self.state.get(before).map_or(0.0, |e| e.time);
        let start_time = offset_time.max(state_time);
        let absolute = self.frequency.get_ticks_at_time(start_time) + tick - offset_ticks;
        self.frequency.get_time_of_tick(absolute)
    }

    /// Invoke `callback(time, ticks)` for every integer tick in `[start, end)`
    /// while started. Stops at and returns the first callback error.
    pub fn for_each_tick_between<F, E>(
        &self,
        start: Seconds,
        end: Seconds,
        callback: &mut F,
    ) -> Result<(), E>
    where
        F: FnMut(Seconds, Ticks) -> Result<(), E>,
    {
        let mut last = self.state.get(start).copied();
        for event in self.state.between(start, end) {
            if let Some(previous) = last {
                if previous.state.is_started() && !event.state.is_started() {
                    let interval_start = previous.time.max(start);
                    self.for_each_tick_between(interval_start, event.time, callback)?;
                }
            }
            last = Some(*event);
        }

        let Some(last) = last.filter(|e| e.state.is_started()) else {
            return Ok(());
        };

        // Ticks are counted from the start of the started interval. Window ownership is
        // decided in the tick domain so consecutive windows never share a tick.
        let base = self.frequency.get_ticks_at_time(last.time);
        let interval_start = last.time.max(start);
        let start_elapsed = self.frequency.get_ticks_at_time(interval_start) - base;
        let end_elapsed = self.frequency.get_ticks_at_time(end) - base;
        let mut tick = first_tick_at_or_after(start_elapsed);
        let end_tick = first_tick_at_or_after(end_elapsed);

        while tick < end_tick {
            let time = self.frequency.get_time_of_tick(base + tick);
            callback(time, self.get_ticks_at_time(time).round())?;
            tick += 1.0;
        }
        Ok(())
    }
}

/// Smallest whole tick not before `elapsed`, snapping values a hair past an integer
fn first_tick_at_or_after(elapsed: Ticks) -> Ticks {
    (elapsed - EPSILON).ceil().max(0.0)
}
