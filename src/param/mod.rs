// Parameter automation - Value curves scheduled over time
// Set/ramp/target/cancel primitives on a numeric parameter, plus the tick-domain TickSignal

pub mod sync;
pub mod tick_signal;

pub use sync::SyncedParam;
pub use tick_signal::TickSignal;

use crate::context::{Context, Seconds, Ticks};
use crate::timeline::{approx_eq, Timeline, TimelineEvent};

/// Exponential curves cannot cross zero; values are clamped to this floor.
pub const MIN_EXPONENTIAL_VALUE: f64 = 1e-7;

/// Conversion between the caller-facing unit and the internal value
#[derive(Debug, Clone, Copy, Default)]
pub enum Units {
    /// Values are stored as given
    #[default]
    Number,
    /// Caller speaks BPM, the curve stores ticks per second
    Bpm { ppq: u32 },
    Custom {
        to_unit: fn(f64) -> f64,
        from_unit: fn(f64) -> f64,
    },
}

impl Units {
    /// Internal value -> caller unit
    pub fn to_unit(&self, value: f64) -> f64 {
        match self {
            Units::Number => value,
            Units::Bpm { ppq } => value * 60.0 / *ppq as f64,
            Units::Custom { to_unit, .. } => to_unit(value),
        }
    }

    /// Caller unit -> internal value
    pub fn from_unit(&self, value: f64) -> f64 {
        match self {
            Units::Number => value,
            Units::Bpm { ppq } => value * *ppq as f64 / 60.0,
            Units::Custom { from_unit, .. } => from_unit(value),
        }
    }
}

/// Shape of the curve leading into (ramps) or out of (set/target) an event
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AutomationKind {
    SetValue,
    LinearRamp,
    ExponentialRamp,
    /// Exponential approach towards `value`, starting at the event time
    Target { time_constant: Seconds },
}

/// A scheduled point on a value curve
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AutomationEvent {
    pub time: Seconds,
    /// Internal (converted) value
    pub value: f64,
    pub kind: AutomationKind,
    /// Integral of the curve up to `time`, maintained by [`TickSignal`]
    pub ticks: Option<Ticks>,
}

impl AutomationEvent {
    pub fn new(kind: AutomationKind, value: f64, time: Seconds) -> Self {
        Self {
            time,
            value,
            kind,
            ticks: None,
        }
    }
}

impl TimelineEvent for AutomationEvent {
    fn time(&self) -> f64 {
        self.time
    }
}

pub(crate) fn linear_interpolate(t0: f64, v0: f64, t1: f64, v1: f64, t: f64) -> f64 {
    if approx_eq(t0, t1) {
        return v1;
    }
    v0 + (v1 - v0) * ((t - t0) / (t1 - t0))
}

pub(crate) fn exponential_interpolate(t0: f64, v0: f64, t1: f64, v1: f64, t: f64) -> f64 {
    if approx_eq(t0, t1) {
        return v1;
    }
    let v0 = v0.max(MIN_EXPONENTIAL_VALUE);
    let v1 = v1.max(MIN_EXPONENTIAL_VALUE);
    v0 * (v1 / v0).powf((t - t0) / (t1 - t0))
}

pub(crate) fn exponential_approach(
    t0: f64,
    v0: f64,
    target: f64,
    time_constant: f64,
    t: f64,
) -> f64 {
    target + (v0 - target) * (-(t - t0) / time_constant).exp()
}

/// Curve scheduling primitives shared by [`Param`] and [`TickSignal`]
///
/// Values are in the parameter's [`Units`]; times are in seconds.
pub trait Automatable {
    /// Value of the curve at `time`
    fn get_value_at_time(&self, time: Seconds) -> f64;

    /// Jump to `value` at `time`
    fn set_value_at_time(&mut self, value: f64, time: Seconds) -> &mut Self;

    /// Ramp linearly from the previous event to `value`, arriving at `end_time`
    fn linear_ramp_to_value_at_time(&mut self, value: f64, end_time: Seconds) -> &mut Self;

    /// Ramp exponentially from the previous event to `value`, arriving at `end_time`
    fn exponential_ramp_to_value_at_time(&mut self, value: f64, end_time: Seconds) -> &mut Self;

    /// Approach `value` exponentially from `start_time` with the given time constant
    fn set_target_at_time(
        &mut self,
        value: f64,
        start_time: Seconds,
        time_constant: Seconds,
    ) -> &mut Self;

    /// Drop every event at or after `time`
    fn cancel_scheduled_values(&mut self, time: Seconds) -> &mut Self;

    /// Drop every event after `time` and freeze the curve at its value there
    fn cancel_and_hold_at_time(&mut self, time: Seconds) -> &mut Self;

    /// Anchor the curve at its current value so a ramp can start from `time`
    fn set_ramp_point(&mut self, time: Seconds) -> &mut Self {
        self.cancel_and_hold_at_time(time)
    }

    /// Linear ramp lasting `ramp_time`, starting at `start_time`
    fn linear_ramp_to(&mut self, value: f64, ramp_time: Seconds, start_time: Seconds) -> &mut Self {
        self.set_ramp_point(start_time);
        self.linear_ramp_to_value_at_time(value, start_time + ramp_time)
    }

    /// Exponential ramp lasting `ramp_time`, starting at `start_time`
    fn exponential_ramp_to(
        &mut self,
        value: f64,
        ramp_time: Seconds,
        start_time: Seconds,
    ) -> &mut Self {
        self.set_ramp_point(start_time);
        self.exponential_ramp_to_value_at_time(value, start_time + ramp_time)
    }

    /// Exponential approach that lands on `value` after `ramp_time`
    fn target_ramp_to(&mut self, value: f64, ramp_time: Seconds, start_time: Seconds) -> &mut Self {
        self.set_ramp_point(start_time);
        self.exponential_approach_value_at_time(value, start_time, ramp_time)
    }

    /// Target curve whose time constant is derived from the ramp duration.
    /// The last 10% is finished with a linear ramp so the value is reached exactly.
    fn exponential_approach_value_at_time(
        &mut self,
        value: f64,
        time: Seconds,
        ramp_time: Seconds,
    ) -> &mut Self {
        let time_constant = (ramp_time + 1.0).ln() / 200f64.ln();
        self.set_target_at_time(value, time, time_constant);
        self.cancel_and_hold_at_time(time + ramp_time * 0.9);
        self.linear_ramp_to_value_at_time(value, time + ramp_time)
    }
}

/// A numeric parameter with an automation curve
#[derive(Debug, Clone)]
pub struct Param {
    context: Context,
    events: Timeline<AutomationEvent>,
    /// Internal value used before the first event
    initial_value: f64,
    units: Units,
}

impl Param {
    pub fn new(context: Context, value: f64) -> Self {
        Self::with_units(context, value, Units::Number)
    }

    pub fn with_units(context: Context, value: f64, units: Units) -> Self {
        Self {
            context,
            events: Timeline::new(),
            initial_value: units.from_unit(value),
            units,
        }
    }

    pub fn context(&self) -> &Context {
        &self.context
    }

    pub fn units(&self) -> Units {
        self.units
    }

    /// Value before any event, in caller units
    pub fn initial_value(&self) -> f64 {
        self.units.to_unit(self.initial_value)
    }

    pub fn events(&self) -> &Timeline<AutomationEvent> {
        &self.events
    }

    pub fn has_events(&self) -> bool {
        !self.events.is_empty()
    }

    /// Forget events strictly before `time`, keeping the curve from `time` on intact
    pub fn prune_before(&mut self, time: Seconds) {
        // Keep the event in effect at `time` so interpolation still has its anchor
        if let Some(index) = self.events.get_index(time) {
            let anchor_time = self.events.events()[index].time;
            self.events.cancel_before(anchor_time);
        }
    }

    /// Drop all events
    pub fn dispose(&mut self) {
        self.events.clear();
    }

    pub(crate) fn add_event(
        &mut self,
        kind: AutomationKind,
        value: f64,
        time: Seconds,
    ) -> Option<usize> {
        self.events.add(AutomationEvent::new(kind, value, time))
    }

    /// Curve value at the time of the event at `index`, from the events before it
    fn start_value(&self, index: usize) -> f64 {
        let events = self.events.events();
        let Some(previous_index) = index.checked_sub(1) else {
            return self.initial_value;
        };
        let previous = &events[previous_index];
        match previous.kind {
            AutomationKind::Target { time_constant } => exponential_approach(
                previous.time,
                self.start_value(previous_index),
                previous.value,
                time_constant,
                events[index].time,
            ),
            _ => previous.value,
        }
    }

    /// Curve value at `time` in internal units
    pub(crate) fn internal_value_at(&self, time: Seconds) -> f64 {
        let Some(index) = self.events.get_index(time) else {
            return self.initial_value;
        };
        let events = self.events.events();
        let before = &events[index];

        let segment_start = || match before.kind {
            AutomationKind::Target { .. } => self.start_value(index),
            _ => before.value,
        };

        match events.get(index + 1) {
            Some(after) if after.kind == AutomationKind::LinearRamp => {
                linear_interpolate(before.time, segment_start(), after.time, after.value, time)
            }
            Some(after) if after.kind == AutomationKind::ExponentialRamp => {
                exponential_interpolate(before.time, segment_start(), after.time, after.value, time)
            }
            _ => match before.kind {
                AutomationKind::Target { time_constant } => exponential_approach(
                    before.time,
                    self.start_value(index),
                    before.value,
                    time_constant,
                    time,
                ),
                _ => before.value,
            },
        }
    }
}

impl Automatable for Param {
    fn get_value_at_time(&self, time: Seconds) -> f64 {
        self.units.to_unit(self.internal_value_at(time))
    }

    fn set_value_at_time(&mut self, value: f64, time: Seconds) -> &mut Self {
        let value = self.units.from_unit(value);
        self.add_event(AutomationKind::SetValue, value, time);
        self
    }

    fn linear_ramp_to_value_at_time(&mut self, value: f64, end_time: Seconds) -> &mut Self {
        let value = self.units.from_unit(value);
        self.add_event(AutomationKind::LinearRamp, value, end_time);
        self
    }

    fn exponential_ramp_to_value_at_time(&mut self, value: f64, end_time: Seconds) -> &mut Self {
        let value = self.units.from_unit(value).max(MIN_EXPONENTIAL_VALUE);
        self.add_event(AutomationKind::ExponentialRamp, value, end_time);
        self
    }

    fn set_target_at_time(
        &mut self,
        value: f64,
        start_time: Seconds,
        time_constant: Seconds,
    ) -> &mut Self {
        assert!(time_constant > 0.0, "Time constant must be > 0");
        let value = self.units.from_unit(value);
        self.add_event(AutomationKind::Target { time_constant }, value, start_time);
        self
    }

    fn cancel_scheduled_values(&mut self, time: Seconds) -> &mut Self {
        self.events.cancel(time);
        self
    }

    fn cancel_and_hold_at_time(&mut self, time: Seconds) -> &mut Self {
        let value = self.internal_value_at(time);
        let before = self.events.get_index(time).map(|i| self.events.events()[i]);
        let after = self
            .events
            .get_after_index(time)
            .map(|i| self.events.events()[i]);

        match (before, after) {
            (Some(before), Some(after)) if approx_eq(before.time, time) => {
                self.events.cancel(after.time);
            }
            (_, Some(after)) => {
                self.events.cancel(after.time);
                // Keep the part of the interrupted ramp that already happened
                match after.kind {
                    AutomationKind::LinearRamp => {
                        self.add_event(AutomationKind::LinearRamp, value, time);
                    }
                    AutomationKind::ExponentialRamp => {
                        self.add_event(AutomationKind::ExponentialRamp, value, time);
                    }
                    _ => {}
                }
            }
            _ => {}
        }

        self.add_event(AutomationKind::SetValue, value, time);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_close(actual: f64, expected: f64, tolerance: f64) {
        assert!(
            (actual - expected).abs() <= tolerance,
            "expected {} ± {}, got {}",
            expected,
            tolerance,
            actual
        );
    }

    fn param(value: f64) -> Param {
        Param::new(Context::default(), value)
    }

    #[test]
    fn test_default_units_pass_values_through() {
        let units = Units::default();
        assert!(matches!(units, Units::Number));
        assert_eq!(units.from_unit(3.5), 3.5);
        assert_eq!(units.to_unit(3.5), 3.5);
    }

    #[test]
    fn test_initial_value_before_events() {
        let mut p = param(0.5);
        assert_eq!(p.get_value_at_time(0.0), 0.5);
        p.set_value_at_time(1.0, 2.0);
        assert_eq!(p.get_value_at_time(1.0), 0.5);
        assert_eq!(p.get_value_at_time(2.0), 1.0);
        assert_eq!(p.get_value_at_time(10.0), 1.0);
    }

    #[test]
    fn test_linear_ramp() {
        let mut p = param(0.0);
        p.set_value_at_time(0.0, 0.0)
            .linear_ramp_to_value_at_time(1.0, 1.0);

        assert_close(p.get_value_at_time(0.25), 0.25, 1e-9);
        assert_close(p.get_value_at_time(0.5), 0.5, 1e-9);
        assert_eq!(p.get_value_at_time(1.0), 1.0);
        assert_eq!(p.get_value_at_time(3.0), 1.0);
    }

    #[test]
    fn test_exponential_ramp() {
        let mut p = param(1.0);
        p.set_value_at_time(1.0, 0.0)
            .exponential_ramp_to_value_at_time(4.0, 2.0);

        // Geometric midpoint
        assert_close(p.get_value_at_time(1.0), 2.0, 1e-9);
        assert_close(p.get_value_at_time(2.0), 4.0, 1e-9);
    }

    #[test]
    fn test_exponential_ramp_clamps_to_positive() {
        let mut p = param(1.0);
        p.set_value_at_time(1.0, 0.0)
            .exponential_ramp_to_value_at_time(0.0, 1.0);
        let end = p.get_value_at_time(1.0);
        assert!(end > 0.0 && end < 1e-6);
    }

    #[test]
    fn test_set_target() {
        let mut p = param(0.0);
        p.set_value_at_time(0.0, 0.0).set_target_at_time(1.0, 1.0, 0.5);

        assert_eq!(p.get_value_at_time(1.0), 0.0);
        // One time constant in: 1 - e^-1
        assert_close(p.get_value_at_time(1.5), 1.0 - (-1.0f64).exp(), 1e-9);
        assert!(p.get_value_at_time(10.0) > 0.9999);
    }

    #[test]
    fn test_cancel_scheduled_values() {
        let mut p = param(0.0);
        p.set_value_at_time(1.0, 1.0).set_value_at_time(2.0, 2.0);
        p.cancel_scheduled_values(2.0);
        assert_eq!(p.get_value_at_time(3.0), 1.0);
        assert_eq!(p.events().len(), 1);
    }

    #[test]
    fn test_cancel_and_hold_mid_ramp() {
        let mut p = param(0.0);
        p.set_value_at_time(0.0, 0.0)
            .linear_ramp_to_value_at_time(1.0, 1.0);
        p.cancel_and_hold_at_time(0.5);

        assert_close(p.get_value_at_time(0.25), 0.25, 1e-9);
        assert_close(p.get_value_at_time(0.5), 0.5, 1e-9);
        assert_close(p.get_value_at_time(0.9), 0.5, 1e-9);
        assert_close(p.get_value_at_time(5.0), 0.5, 1e-9);
    }

    #[test]
    fn test_cancel_and_hold_during_target() {
        let mut p = param(0.0);
        p.set_value_at_time(0.0, 0.0).set_target_at_time(1.0, 0.0, 1.0);
        let held = p.get_value_at_time(1.0);
        p.cancel_and_hold_at_time(1.0);

        assert_close(p.get_value_at_time(1.0), held, 1e-9);
        assert_close(p.get_value_at_time(4.0), held, 1e-9);
    }

    #[test]
    fn test_linear_ramp_to_uses_duration() {
        let mut p = param(2.0);
        p.linear_ramp_to(4.0, 2.0, 1.0);

        assert_close(p.get_value_at_time(1.0), 2.0, 1e-9);
        assert_close(p.get_value_at_time(2.0), 3.0, 1e-9);
        assert_close(p.get_value_at_time(3.0), 4.0, 1e-9);
    }

    #[test]
    fn test_exponential_ramp_to_uses_duration() {
        let mut p = param(1.0);
        p.exponential_ramp_to(100.0, 2.0, 0.0);
        assert_close(p.get_value_at_time(1.0), 10.0, 1e-6);
        assert_close(p.get_value_at_time(2.0), 100.0, 1e-6);
    }

    #[test]
    fn test_target_ramp_to_reaches_value() {
        let mut p = param(0.0);
        p.target_ramp_to(1.0, 1.0, 0.0);

        let mid = p.get_value_at_time(0.5);
        assert!(mid > 0.0 && mid < 1.0);
        assert_close(p.get_value_at_time(1.0), 1.0, 1e-9);
        assert_close(p.get_value_at_time(2.0), 1.0, 1e-9);
    }

    #[test]
    fn test_bpm_units() {
        let ctx = Context::default();
        let mut p = Param::with_units(ctx, 120.0, Units::Bpm { ppq: ctx.ppq() });
        // Internal storage is ticks per second
        assert_eq!(p.internal_value_at(0.0), 384.0);
        assert_eq!(p.get_value_at_time(0.0), 120.0);

        p.set_value_at_time(60.0, 1.0);
        assert_eq!(p.internal_value_at(1.0), 192.0);
    }

    #[test]
    fn test_custom_units() {
        let units = Units::Custom {
            to_unit: |v| v / 100.0,
            from_unit: |v| v * 100.0,
        };
        let p = Param::with_units(Context::default(), 0.5, units);
        assert_eq!(p.internal_value_at(0.0), 50.0);
        assert_eq!(p.get_value_at_time(0.0), 0.5);
    }

    #[test]
    fn test_prune_before_keeps_anchor() {
        let mut p = param(0.0);
        p.set_value_at_time(1.0, 0.0)
            .set_value_at_time(2.0, 1.0)
            .linear_ramp_to_value_at_time(4.0, 3.0);
        p.prune_before(2.0);

        assert_eq!(p.events().len(), 2);
        assert_close(p.get_value_at_time(2.0), 3.0, 1e-9);
    }

    #[test]
    #[should_panic]
    fn test_zero_time_constant_rejected() {
        param(0.0).set_target_at_time(1.0, 0.0, 0.0);
    }
}
