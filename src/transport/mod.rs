// Transport - Musical clock that callers schedule against
// Owns a BPM-driven Clock and dispatches scheduled, repeating, embedded and synced work per tick

pub mod position;

pub use position::{MusicalTime, TimeSignature};

use crate::clock::{Clock, ClockEvent, ListenerId, Listeners};
use crate::config::EngineConfig;
use crate::context::{Context, Seconds, Ticks};
use crate::error::EngineResult;
use crate::param::{Automatable, Param, SyncedParam, TickSignal};
use crate::timeline::{approx_eq, PlaybackState, SearchResult, Timeline, TimelineEvent};
use std::fmt;

/// Handle for anything registered on a transport
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EventId(u64);

/// Callback receiving the time of the tick it fires on
pub type TransportCallback = Box<dyn FnMut(Seconds) -> EngineResult<()>>;

/// Emitted when playback wraps from the loop end back to the loop start
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LoopEvent {
    pub time: Seconds,
    /// Position after the wrap
    pub ticks: Ticks,
}

struct ScheduledEvent {
    id: EventId,
    ticks: Ticks,
    once: bool,
    callback: TransportCallback,
}

impl TimelineEvent for ScheduledEvent {
    fn time(&self) -> f64 {
        self.ticks
    }
}

struct RepeatEvent {
    id: EventId,
    start: Ticks,
    interval: Ticks,
    duration: Option<Ticks>,
    callback: TransportCallback,
}

impl RepeatEvent {
    fn fires_at(&self, ticks: Ticks) -> bool {
        if ticks < self.start || self.duration.is_some_and(|d| ticks >= self.start + d) {
            return false;
        }
        let phase = (ticks - self.start) % self.interval;
        approx_eq(phase, 0.0) || approx_eq(phase, self.interval)
    }
}

struct Embed {
    id: EventId,
    transport: Transport,
    start: Ticks,
    duration: Option<Ticks>,
}

impl Embed {
    /// Child position for parent position `ticks`, if inside the embed window
    fn relative_ticks(&self, ticks: Ticks) -> Option<Ticks> {
        if ticks < self.start || self.duration.is_some_and(|d| ticks >= self.start + d) {
            return None;
        }
        Some(self.transport.wrap_into_loop(ticks - self.start))
    }
}

/// Top-level musical clock
///
/// Positions are in ticks at the context's PPQ. All scheduled work runs from
/// [`Transport::process`], in tick order, after any start/stop/pause requested
/// since the previous call has been committed.
pub struct Transport {
    context: Context,
    clock: Clock,
    time_signature: TimeSignature,
    loop_enabled: bool,
    loop_start: Ticks,
    loop_end: Ticks,
    events: Timeline<ScheduledEvent>,
    repeats: Vec<RepeatEvent>,
    embeds: Vec<Embed>,
    synced: Vec<(EventId, SyncedParam)>,
    next_id: u64,
    loop_listeners: Listeners<LoopEvent>,
}

impl Transport {
    pub const DEFAULT_BPM: f64 = 120.0;

    pub fn new(context: Context) -> Self {
        Self::with_bpm(context, Self::DEFAULT_BPM)
    }

    pub fn with_bpm(context: Context, bpm: f64) -> Self {
        assert!(bpm > 0.0, "BPM must be > 0");
        let time_signature = TimeSignature::default();
        Self {
            context,
            clock: Clock::with_frequency(TickSignal::bpm(context, bpm)),
            time_signature,
            loop_enabled: false,
            loop_start: 0.0,
            loop_end: time_signature.ticks_per_bar(context.ppq()) as Ticks,
            events: Timeline::new(),
            repeats: Vec::new(),
            embeds: Vec::new(),
            synced: Vec::new(),
            next_id: 0,
            loop_listeners: Listeners::new(),
        }
    }

    /// Build a transport (and its context) from a validated configuration
    pub fn from_config(config: &EngineConfig) -> EngineResult<Self> {
        config.validate()?;
        let mut transport = Self::with_bpm(Context::from_config(config), config.bpm);
        transport.set_time_signature(config.time_signature);
        Ok(transport)
    }

    pub fn context(&self) -> &Context {
        &self.context
    }

    pub fn clock(&self) -> &Clock {
        &self.clock
    }

    fn next_event_id(&mut self) -> EventId {
        let id = EventId(self.next_id);
        self.next_id += 1;
        id
    }

    // Playback

    /// Request playback from the current position, or from `offset` ticks
    pub fn start(&mut self, offset: Option<Ticks>) {
        self.clock.start(offset);
    }

    /// Request a stop. The position returns to zero.
    pub fn stop(&mut self) {
        self.clock.stop();
    }

    /// Request a pause. The position is kept.
    pub fn pause(&mut self) {
        self.clock.pause();
    }

    /// Pending state if a transition is queued, otherwise the committed one
    pub fn state(&self) -> PlaybackState {
        self.clock.get_state()
    }

    pub fn ticks(&self) -> Ticks {
        self.clock.get_ticks()
    }

    /// Seconds of playback at the last processed time
    pub fn seconds(&self) -> Seconds {
        self.clock.get_seconds()
    }

    /// Seek to `ticks`
    pub fn set_ticks(&mut self, ticks: Ticks) {
        self.clock.set_ticks(ticks);
    }

    pub fn get_ticks_at_time(&self, time: Seconds) -> Ticks {
        self.clock.get_ticks_at_time(time)
    }

    pub fn position(&self) -> MusicalTime {
        MusicalTime::from_ticks(self.ticks(), &self.time_signature, self.context.ppq())
    }

    pub fn set_position(&mut self, position: MusicalTime) {
        let ticks = position.to_total_ticks(&self.time_signature, self.context.ppq());
        self.set_ticks(ticks as Ticks);
    }

    /// Convert a position to ticks in this transport's signature
    pub fn ticks_of(&self, position: MusicalTime) -> Ticks {
        position.to_total_ticks(&self.time_signature, self.context.ppq()) as Ticks
    }

    // Tempo

    /// Tempo at the last processed time
    pub fn bpm(&self) -> f64 {
        self.clock.frequency().get_value_at_time(self.clock.last_update())
    }

    /// Change tempo from the last processed time on
    pub fn set_bpm(&mut self, bpm: f64) {
        assert!(bpm > 0.0, "BPM must be > 0");
        let now = self.clock.last_update();
        self.clock
            .frequency_mut()
            .cancel_scheduled_values(now)
            .set_value_at_time(bpm, now);
    }

    /// Tempo curve in BPM, for ramps and other automation
    pub fn bpm_mut(&mut self) -> &mut TickSignal {
        self.clock.frequency_mut()
    }

    pub fn time_signature(&self) -> TimeSignature {
        self.time_signature
    }

    pub fn set_time_signature(&mut self, time_signature: TimeSignature) {
        self.time_signature = time_signature;
    }

    /// Seconds spanned by `ticks` from the last processed time
    pub fn ticks_to_seconds(&self, ticks: Ticks) -> Seconds {
        self.clock
            .frequency()
            .get_duration_of_ticks(ticks, self.clock.last_update())
    }

    // Looping

    pub fn set_loop(&mut self, enabled: bool) {
        self.loop_enabled = enabled;
    }

    pub fn is_looping(&self) -> bool {
        self.loop_enabled
    }

    pub fn set_loop_points(&mut self, start: Ticks, end: Ticks) {
        assert!(end > start, "Loop end must be after start");
        self.loop_start = start;
        self.loop_end = end;
    }

    pub fn loop_points(&self) -> (Ticks, Ticks) {
        (self.loop_start, self.loop_end)
    }

    fn wrap_into_loop(&self, ticks: Ticks) -> Ticks {
        if self.loop_enabled && ticks >= self.loop_end {
            let length = self.loop_end - self.loop_start;
            self.loop_start + (ticks - self.loop_start) % length
        } else {
            ticks
        }
    }

    // Scheduling

    /// Call `callback` every time the position reaches `ticks`
    pub fn schedule<F>(&mut self, callback: F, ticks: Ticks) -> EventId
    where
        F: FnMut(Seconds) -> EngineResult<()> + 'static,
    {
        self.add_event(Box::new(callback), ticks, false)
    }

    /// Call `callback` the first time the position reaches `ticks`
    pub fn schedule_once<F>(&mut self, callback: F, ticks: Ticks) -> EventId
    where
        F: FnMut(Seconds) -> EngineResult<()> + 'static,
    {
        self.add_event(Box::new(callback), ticks, true)
    }

    fn add_event(&mut self, callback: TransportCallback, ticks: Ticks, once: bool) -> EventId {
        let id = self.next_event_id();
        self.events.add(ScheduledEvent {
            id,
            ticks: ticks.floor(),
            once,
            callback,
        });
        id
    }

    /// Call `callback` every `interval` ticks from `start`, for `duration` ticks
    /// or forever
    pub fn schedule_repeat<F>(
        &mut self,
        callback: F,
        interval: Ticks,
        start: Ticks,
        duration: Option<Ticks>,
    ) -> EventId
    where
        F: FnMut(Seconds) -> EngineResult<()> + 'static,
    {
        assert!(interval > 0.0, "Repeat interval must be > 0");
        let id = self.next_event_id();
        self.repeats.push(RepeatEvent {
            id,
            start,
            interval,
            duration,
            callback: Box::new(callback),
        });
        id
    }

    /// Play `child`'s scheduled work from position `start`, for `duration` ticks or
    /// forever. The child follows this transport's tempo and its own loop points.
    pub fn embed(&mut self, child: Transport, start: Ticks, duration: Option<Ticks>) -> EventId {
        let id = self.next_event_id();
        self.embeds.push(Embed {
            id,
            transport: child,
            start,
            duration,
        });
        id
    }

    /// Drive `param` from tick `start` for `duration` ticks or forever.
    /// See also [`Param::sync`].
    pub fn sync_param(&mut self, param: Param, start: Ticks, duration: Option<Ticks>) -> EventId {
        let id = self.next_event_id();
        self.synced.push((id, SyncedParam::new(param, start, duration)));
        id
    }

    pub fn synced_param(&self, id: EventId) -> Option<&SyncedParam> {
        self.synced.iter().find(|(i, _)| *i == id).map(|(_, p)| p)
    }

    pub fn synced_param_mut(&mut self, id: EventId) -> Option<&mut SyncedParam> {
        self.synced
            .iter_mut()
            .find(|(i, _)| *i == id)
            .map(|(_, p)| p)
    }

    /// Stop driving a synced parameter and give its curve back
    pub fn unsync_param(&mut self, id: EventId) -> Option<Param> {
        let index = self.synced.iter().position(|(i, _)| *i == id)?;
        Some(self.synced.remove(index).1.into_curve())
    }

    /// Remove an embedded transport
    pub fn unembed(&mut self, id: EventId) -> Option<Transport> {
        let index = self.embeds.iter().position(|e| e.id == id)?;
        Some(self.embeds.remove(index).transport)
    }

    /// Remove anything registered under `id`. Returns false if nothing was.
    pub fn clear(&mut self, id: EventId) -> bool {
        let before = self.events.len();
        self.events.retain(|e| e.id != id);
        if self.events.len() != before {
            return true;
        }
        if let Some(index) = self.repeats.iter().position(|r| r.id == id) {
            self.repeats.remove(index);
            return true;
        }
        self.unembed(id).is_some() || self.unsync_param(id).is_some()
    }

    /// Number of scheduled one-shot and repeating events
    pub fn scheduled_count(&self) -> usize {
        self.events.len() + self.repeats.len()
    }

    // Listeners

    pub fn on_did_start<F>(&mut self, listener: F) -> ListenerId
    where
        F: FnMut(&ClockEvent) + 'static,
    {
        self.clock.on_did_start(listener)
    }

    pub fn on_did_stop<F>(&mut self, listener: F) -> ListenerId
    where
        F: FnMut(&ClockEvent) + 'static,
    {
        self.clock.on_did_stop(listener)
    }

    pub fn on_did_pause<F>(&mut self, listener: F) -> ListenerId
    where
        F: FnMut(&ClockEvent) + 'static,
    {
        self.clock.on_did_pause(listener)
    }

    pub fn on_loop<F>(&mut self, listener: F) -> ListenerId
    where
        F: FnMut(&LoopEvent) + 'static,
    {
        self.loop_listeners.add(listener)
    }

    pub fn remove_listener(&mut self, id: ListenerId) -> bool {
        self.clock.remove_listener(id) || self.loop_listeners.remove(id)
    }

    // Processing

    /// Driver entry point: run everything due in `[last processed time, now)`
    pub fn process(&mut self, now: Seconds) -> EngineResult<()> {
        let mut tick_times = Vec::new();
        let committed = self.clock.process_with(now, &mut |time, _| {
            tick_times.push(time);
            Ok(())
        })?;

        if let Some(event) = committed {
            self.on_transition(&event);
        }
        for time in tick_times {
            self.process_tick(time)?;
        }
        Ok(())
    }

    fn on_transition(&mut self, event: &ClockEvent) {
        for (_, param) in self.synced.iter_mut() {
            match event.state {
                PlaybackState::Started => param.on_start(event.time, event.ticks),
                PlaybackState::Stopped | PlaybackState::Paused => param.on_stop(event.time),
            }
        }
    }

    fn process_tick(&mut self, time: Seconds) -> EngineResult<()> {
        let mut ticks = self.clock.get_ticks_at_time(time).round();
        if self.loop_enabled && ticks >= self.loop_end {
            self.clock.set_ticks_at_time(self.loop_start, time);
            ticks = self.loop_start;
            tracing::debug!(time, loop_start = self.loop_start, "transport looped");
            self.loop_listeners.emit(&LoopEvent { time, ticks });
        }
        let tick_duration = self.clock.frequency().get_duration_of_ticks(1.0, time);
        self.dispatch(time, ticks, tick_duration)
    }

    /// Run everything registered at position `ticks`
    fn dispatch(&mut self, time: Seconds, ticks: Ticks, tick_duration: Seconds) -> EngineResult<()> {
        self.fire_events(time, ticks)?;

        for repeat in self.repeats.iter_mut() {
            if repeat.fires_at(ticks) {
                (repeat.callback)(time)?;
            }
        }

        for embed in self.embeds.iter_mut() {
            if let Some(relative) = embed.relative_ticks(ticks) {
                embed.transport.dispatch(time, relative, tick_duration)?;
            }
        }

        for (_, param) in self.synced.iter_mut() {
            param.on_tick(time, ticks, tick_duration);
        }
        Ok(())
    }

    /// Fire the events scheduled at `ticks`, dropping one-shots that ran
    fn fire_events(&mut self, time: Seconds, ticks: Ticks) -> EngineResult<()> {
        let SearchResult::Hit { first, last } = self.events.search(ticks) else {
            return Ok(());
        };

        let mut result = Ok(());
        let mut fired_once = Vec::new();
        for index in first..=last {
            if let Some(event) = self.events.event_mut(index) {
                result = (event.callback)(time);
                if event.once {
                    fired_once.push(event.id);
                }
                if result.is_err() {
                    break;
                }
            }
        }

        if !fired_once.is_empty() {
            self.events.retain(|e| !fired_once.contains(&e.id));
        }
        result
    }
}

impl fmt::Debug for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transport")
            .field("clock", &self.clock)
            .field("time_signature", &self.time_signature)
            .field("loop_enabled", &self.loop_enabled)
            .field("loop_start", &self.loop_start)
            .field("loop_end", &self.loop_end)
            .field("events", &self.events.len())
            .field("repeats", &self.repeats.len())
            .field("embeds", &self.embeds.len())
            .field("synced", &self.synced.len())
            .finish()
    }
}
