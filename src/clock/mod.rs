// Clock - Driver-pumped tick callback
// Two-phase start/stop/pause: requests are committed at the start of the next processed window

pub mod listeners;
pub mod tick_source;

pub use listeners::{ListenerId, Listeners};
pub use tick_source::{TickOffsetEvent, TickSource};

use crate::context::{Context, Seconds, Ticks};
use crate::error::EngineResult;
use crate::param::TickSignal;
use crate::timeline::PlaybackState;
use std::fmt;

/// Callback receiving `(time, ticks)` for every tick
pub type TickCallback = Box<dyn FnMut(Seconds, Ticks) -> EngineResult<()>>;

/// Emitted when a requested transition is committed
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClockEvent {
    pub state: PlaybackState,
    /// Commit time
    pub time: Seconds,
    pub seconds: Seconds,
    pub ticks: Ticks,
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct PendingTransition {
    state: PlaybackState,
    offset: Option<Ticks>,
}

/// Calls a callback for every tick of its [`TickSource`] while started
pub struct Clock {
    tick_source: TickSource,
    callback: Option<TickCallback>,
    state: PlaybackState,
    next_state: Option<PendingTransition>,
    last_update: Seconds,
    start_listeners: Listeners<ClockEvent>,
    stop_listeners: Listeners<ClockEvent>,
    pause_listeners: Listeners<ClockEvent>,
}

impl Clock {
    /// Clock without a callback, ticking at `frequency` ticks per second
    pub fn new(context: Context, frequency: f64) -> Self {
        Self::with_frequency(TickSignal::new(context, frequency))
    }

    pub fn with_callback<F>(context: Context, frequency: f64, callback: F) -> Self
    where
        F: FnMut(Seconds, Ticks) -> EngineResult<()> + 'static,
    {
        let mut clock = Self::new(context, frequency);
        clock.set_callback(callback);
        clock
    }

    pub fn with_frequency(frequency: TickSignal) -> Self {
        Self {
            tick_source: TickSource::with_frequency(frequency),
            callback: None,
            state: PlaybackState::Stopped,
            next_state: None,
            last_update: 0.0,
            start_listeners: Listeners::new(),
            stop_listeners: Listeners::new(),
            pause_listeners: Listeners::new(),
        }
    }

    pub fn set_callback<F>(&mut self, callback: F)
    where
        F: FnMut(Seconds, Ticks) -> EngineResult<()> + 'static,
    {
        self.callback = Some(Box::new(callback));
    }

    pub fn context(&self) -> &Context {
        self.tick_source.context()
    }

    pub fn tick_source(&self) -> &TickSource {
        &self.tick_source
    }

    pub fn frequency(&self) -> &TickSignal {
        self.tick_source.frequency()
    }

    pub fn frequency_mut(&mut self) -> &mut TickSignal {
        self.tick_source.frequency_mut()
    }

    /// End of the last processed window
    pub fn last_update(&self) -> Seconds {
        self.last_update
    }

    /// Request a start, optionally seeking to `offset` ticks
    pub fn start(&mut self, offset: Option<Ticks>) {
        self.request(PlaybackState::Started, offset);
    }

    pub fn stop(&mut self) {
        self.request(PlaybackState::Stopped, None);
    }

    pub fn pause(&mut self) {
        self.request(PlaybackState::Paused, None);
    }

    fn request(&mut self, state: PlaybackState, offset: Option<Ticks>) {
        tracing::trace!(%state, "clock transition requested");
        self.next_state = Some(PendingTransition { state, offset });
    }

    /// The pending state if a transition is queued, otherwise the committed one
    pub fn get_state(&self) -> PlaybackState {
        self.next_state.map_or(self.state, |pending| pending.state)
    }

    /// State in effect at `time` according to the tick source
    pub fn get_state_at_time(&self, time: Seconds) -> PlaybackState {
        self.tick_source.get_state_at_time(time)
    }

    pub fn get_seconds(&self) -> Seconds {
        self.tick_source.get_seconds_at_time(self.last_update)
    }

    pub fn get_ticks(&self) -> Ticks {
        self.tick_source.get_ticks_at_time(self.last_update)
    }

    /// Seek to `ticks` at the last update time
    pub fn set_ticks(&mut self, ticks: Ticks) {
        self.tick_source.set_ticks_at_time(ticks, self.last_update);
    }

    pub fn get_ticks_at_time(&self, time: Seconds) -> Ticks {
        self.tick_source.get_ticks_at_time(time)
    }

    pub fn get_seconds_at_time(&self, time: Seconds) -> Seconds {
        self.tick_source.get_seconds_at_time(time)
    }

    pub fn set_ticks_at_time(&mut self, ticks: Ticks, time: Seconds) {
        self.tick_source.set_ticks_at_time(ticks, time);
    }

    pub fn get_time_of_tick(&self, tick: Ticks, before: Seconds) -> Seconds {
        self.tick_source.get_time_of_tick(tick, before)
    }

    pub fn on_did_start<F>(&mut self, listener: F) -> ListenerId
    where
        F: FnMut(&ClockEvent) + 'static,
    {
        self.start_listeners.add(listener)
    }

    pub fn on_did_stop<F>(&mut self, listener: F) -> ListenerId
    where
        F: FnMut(&ClockEvent) + 'static,
    {
        self.stop_listeners.add(listener)
    }

    pub fn on_did_pause<F>(&mut self, listener: F) -> ListenerId
    where
        F: FnMut(&ClockEvent) + 'static,
    {
        self.pause_listeners.add(listener)
    }

    /// Remove a lifecycle listener registered with any of the `on_did_*` methods
    pub fn remove_listener(&mut self, id: ListenerId) -> bool {
        self.start_listeners.remove(id)
            || self.stop_listeners.remove(id)
            || self.pause_listeners.remove(id)
    }

    /// Driver entry point: process `[last_update, now)` with the stored callback
    pub fn process(&mut self, now: Seconds) -> EngineResult<Option<ClockEvent>> {
        let mut callback = self.callback.take();
        let result = match callback.as_mut() {
            Some(callback) => self.process_with(now, &mut |time, ticks| callback(time, ticks)),
            None => self.process_with(now, &mut |_, _| Ok(())),
        };
        self.callback = callback;
        result
    }

    /// Process `[last_update, now)`, delivering ticks to `callback` instead of the
    /// stored one. Returns the transition committed at the start of the window.
    pub fn process_with<F>(
        &mut self,
        now: Seconds,
        callback: &mut F,
    ) -> EngineResult<Option<ClockEvent>>
    where
        F: FnMut(Seconds, Ticks) -> EngineResult<()>,
    {
        let start = self.last_update;
        self.last_update = now;

        let committed = self.commit_pending(start);
        if self.state == PlaybackState::Stopped {
            return Ok(committed);
        }

        self.tick_source.for_each_tick_between(start, now, callback)?;
        Ok(committed)
    }

    fn commit_pending(&mut self, time: Seconds) -> Option<ClockEvent> {
        let pending = self.next_state.take()?;
        match pending.state {
            PlaybackState::Started => self.tick_source.start(time, pending.offset),
            PlaybackState::Stopped => self.tick_source.stop(time),
            PlaybackState::Paused => self.tick_source.pause(time),
        };

        let state = self.tick_source.get_state_at_time(time);
        if state == self.state {
            return None;
        }
        self.state = state;

        let event = ClockEvent {
            state,
            time,
            seconds: self.tick_source.get_seconds_at_time(time),
            ticks: self.tick_source.get_ticks_at_time(time),
        };
        tracing::debug!(%state, time, ticks = event.ticks, "clock transition committed");

        match state {
            PlaybackState::Started => self.start_listeners.emit(&event),
            PlaybackState::Stopped => self.stop_listeners.emit(&event),
            PlaybackState::Paused => self.pause_listeners.emit(&event),
        }
        Some(event)
    }
}

impl fmt::Debug for Clock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Clock")
            .field("tick_source", &self.tick_source)
            .field("state", &self.state)
            .field("next_state", &self.next_state)
            .field("last_update", &self.last_update)
            .field("has_callback", &self.callback.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EngineError;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn recording_clock(frequency: f64) -> (Clock, Rc<RefCell<Vec<(Seconds, Ticks)>>>) {
        let log = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&log);
        let clock = Clock::with_callback(Context::default(), frequency, move |time, ticks| {
            sink.borrow_mut().push((time, ticks));
            Ok(())
        });
        (clock, log)
    }

    #[test]
    fn test_stopped_clock_does_not_tick() {
        let (mut clock, log) = recording_clock(10.0);
        clock.process(1.0).unwrap();
        assert!(log.borrow().is_empty());
        assert_eq!(clock.get_ticks(), 0.0);
    }

    #[test]
    fn test_start_is_committed_on_next_process() {
        let (mut clock, log) = recording_clock(4.0);
        clock.start(None);
        assert_eq!(clock.get_state(), PlaybackState::Started);
        assert_eq!(clock.get_state_at_time(0.0), PlaybackState::Stopped);

        let event = clock.process(1.0).unwrap().expect("start committed");
        assert_eq!(event.state, PlaybackState::Started);
        assert_eq!(event.time, 0.0);
        assert_eq!(event.ticks, 0.0);

        let ticks: Vec<Ticks> = log.borrow().iter().map(|(_, t)| *t).collect();
        assert_eq!(ticks, vec![0.0, 1.0, 2.0, 3.0]);
        assert_eq!(clock.get_ticks(), 4.0);
        assert_eq!(clock.get_seconds(), 1.0);
    }

    #[test]
    fn test_consecutive_windows_do_not_repeat_ticks() {
        let (mut clock, log) = recording_clock(10.0);
        clock.start(None);
        for i in 1..=10 {
            clock.process(i as f64 * 0.1).unwrap();
        }

        let ticks: Vec<Ticks> = log.borrow().iter().map(|(_, t)| *t).collect();
        assert_eq!(ticks, (0..10).map(|t| t as f64).collect::<Vec<_>>());
    }

    #[test]
    fn test_stop_resets_and_notifies() {
        let (mut clock, _log) = recording_clock(2.0);
        let stops = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&stops);
        clock.on_did_stop(move |event| sink.borrow_mut().push(*event));

        clock.start(None);
        clock.process(1.0).unwrap();
        clock.stop();
        clock.process(2.0).unwrap();

        assert_eq!(stops.borrow().len(), 1);
        assert_eq!(stops.borrow()[0].time, 1.0);
        assert_eq!(clock.get_ticks(), 0.0);
        assert_eq!(clock.get_state(), PlaybackState::Stopped);
    }

    #[test]
    fn test_stop_while_stopped_keeps_history() {
        let (mut clock, log) = recording_clock(1.0);
        clock.start(None);
        clock.process(1.0).unwrap();
        clock.stop();
        clock.process(2.0).unwrap();

        clock.stop();
        assert_eq!(clock.process(3.0).unwrap(), None);

        assert_eq!(clock.get_ticks_at_time(1.5), 0.0);
        assert_eq!(clock.get_state_at_time(1.5), PlaybackState::Stopped);
        assert_eq!(clock.get_ticks_at_time(0.5), 0.5);
        assert_eq!(log.borrow().len(), 1);
    }

    #[test]
    fn test_pause_keeps_ticks() {
        let (mut clock, log) = recording_clock(2.0);
        clock.start(None);
        clock.process(1.0).unwrap();
        clock.pause();
        clock.process(2.0).unwrap();

        assert_eq!(log.borrow().len(), 2);
        assert_eq!(clock.get_ticks(), 2.0);
        assert_eq!(clock.get_state(), PlaybackState::Paused);
    }

    #[test]
    fn test_pause_while_stopped_is_ignored() {
        let (mut clock, _log) = recording_clock(2.0);
        let pauses = Rc::new(RefCell::new(0));
        let sink = Rc::clone(&pauses);
        clock.on_did_pause(move |_| *sink.borrow_mut() += 1);

        clock.pause();
        assert_eq!(clock.process(1.0).unwrap(), None);
        assert_eq!(*pauses.borrow(), 0);
        assert_eq!(clock.get_state(), PlaybackState::Stopped);
    }

    #[test]
    fn test_set_ticks_seeks() {
        let (mut clock, _log) = recording_clock(1.0);
        clock.start(None);
        clock.process(1.0).unwrap();
        clock.set_ticks(10.0);
        clock.process(2.0).unwrap();

        assert_eq!(clock.get_ticks(), 11.0);
    }

    #[test]
    fn test_start_with_offset() {
        let (mut clock, log) = recording_clock(1.0);
        clock.start(Some(5.0));
        clock.process(2.0).unwrap();

        let ticks: Vec<Ticks> = log.borrow().iter().map(|(_, t)| *t).collect();
        assert_eq!(ticks, vec![5.0, 6.0]);
    }

    #[test]
    fn test_callback_error_propagates() {
        let mut clock = Clock::with_callback(Context::default(), 1.0, |_, ticks| {
            if ticks >= 1.0 {
                Err(EngineError::callback("tick rejected"))
            } else {
                Ok(())
            }
        });
        clock.start(None);

        let result = clock.process(3.0);
        assert!(matches!(result, Err(EngineError::Callback(_))));
        // The callback survives the error
        clock.stop();
        assert!(clock.process(4.0).is_ok());
    }

    #[test]
    fn test_remove_listener() {
        let (mut clock, _log) = recording_clock(1.0);
        let id = clock.on_did_start(|_| {});
        assert!(clock.remove_listener(id));
        assert!(!clock.remove_listener(id));
    }
}
