// Synced parameters - Automation scheduled in musical time
// A tick-domain curve re-sampled into a seconds-domain output on every transport tick

use super::{Automatable, Param};
use crate::context::{Seconds, Ticks};
use crate::transport::{EventId, Transport};

/// A parameter whose curve is expressed in ticks relative to the sync start
///
/// The transport drives it: on every tick inside the active window the output
/// curve is re-anchored at the current value and ramped towards the value one
/// tick later, so tempo changes, seeks and loops are absorbed as they happen.
#[derive(Debug, Clone)]
pub struct SyncedParam {
    curve: Param,
    output: Param,
    start: Ticks,
    duration: Option<Ticks>,
}

impl SyncedParam {
    pub fn new(mut curve: Param, start: Ticks, duration: Option<Ticks>) -> Self {
        if !curve.has_events() {
            let value = curve.get_value_at_time(0.0);
            curve.set_value_at_time(value, 0.0);
        }
        let output = Param::with_units(
            *curve.context(),
            curve.get_value_at_time(0.0),
            curve.units(),
        );
        Self {
            curve,
            output,
            start,
            duration,
        }
    }

    /// Curve in relative ticks
    pub fn curve(&self) -> &Param {
        &self.curve
    }

    /// Edits apply from the next transport tick
    pub fn curve_mut(&mut self) -> &mut Param {
        &mut self.curve
    }

    /// Seconds-domain curve produced by the transport
    pub fn output(&self) -> &Param {
        &self.output
    }

    pub fn start(&self) -> Ticks {
        self.start
    }

    pub fn duration(&self) -> Option<Ticks> {
        self.duration
    }

    pub fn into_curve(self) -> Param {
        self.curve
    }

    /// Whether transport position `ticks` lies in `[start, start + duration)`
    pub fn is_active(&self, ticks: Ticks) -> bool {
        ticks >= self.start && self.duration.is_none_or(|d| ticks < self.start + d)
    }

    fn curve_value(&self, ticks: Ticks) -> f64 {
        self.curve.get_value_at_time(ticks - self.start)
    }

    pub(crate) fn on_tick(&mut self, time: Seconds, ticks: Ticks, tick_duration: Seconds) {
        if !self.is_active(ticks) {
            return;
        }
        let now = self.curve_value(ticks);
        let next = self.curve_value(ticks + 1.0);
        self.output
            .cancel_scheduled_values(time)
            .set_value_at_time(now, time)
            .linear_ramp_to_value_at_time(next, time + tick_duration);
        self.output.prune_before(time);
    }

    pub(crate) fn on_start(&mut self, time: Seconds, ticks: Ticks) {
        let value = self.curve_value(ticks.clamp(self.start, self.window_end()));
        self.output
            .cancel_scheduled_values(time)
            .set_value_at_time(value, time);
        self.output.prune_before(time);
    }

    pub(crate) fn on_stop(&mut self, time: Seconds) {
        self.output.cancel_and_hold_at_time(time);
        self.output.prune_before(time);
    }

    fn window_end(&self) -> Ticks {
        self.duration.map_or(f64::INFINITY, |d| self.start + d)
    }
}

impl Param {
    /// Hand this parameter to `transport`, which will drive it from tick `start`
    /// for `duration` ticks (forever if `None`). Returns the id to unsync it with.
    pub fn sync(self, transport: &mut Transport, start: Ticks, duration: Option<Ticks>) -> EventId {
        transport.sync_param(self, start, duration)
    }
}
