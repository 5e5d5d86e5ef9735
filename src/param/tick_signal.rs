// TickSignal - Tick frequency curve with closed-form tick integration
// Every event carries the integral of the curve up to its time, so tick/time
// conversions stay O(log n) for any tempo automation

use super::{
    exponential_approach, exponential_interpolate, Automatable, AutomationEvent, AutomationKind,
    Param, Units, MIN_EXPONENTIAL_VALUE,
};
use crate::context::{Context, Seconds, Ticks};
use crate::timeline::approx_eq;

/// Exponential curves are approximated with linear segments of about this length
const SEGMENT_DURATION: Seconds = 0.1;

/// Target curves are approximated up to this many time constants, after which the
/// curve sits on the target value
const TARGET_HORIZON: f64 = 6.0;

/// A frequency (ticks per second) automation curve that can be integrated into ticks
///
/// Only set and linear ramp events are stored. Exponential ramps and target curves
/// are converted to chains of linear ramps on insertion, so the integral between any
/// two adjacent events is a trapezoid and its inverse is a quadratic.
#[derive(Debug, Clone)]
pub struct TickSignal {
    param: Param,
}

impl TickSignal {
    pub fn new(context: Context, value: f64) -> Self {
        Self::with_units(context, value, Units::Number)
    }

    pub fn with_units(context: Context, value: f64, units: Units) -> Self {
        let mut param = Param::with_units(context, value, units);
        let initial = param.initial_value;
        let index = param.add_event(AutomationKind::SetValue, initial, 0.0);
        if let Some(event) = index.and_then(|i| param.events.event_mut(i)) {
            event.ticks = Some(0.0);
        }
        Self { param }
    }

    /// Tempo curve in BPM, stored as ticks per second at the context's resolution
    pub fn bpm(context: Context, bpm: f64) -> Self {
        let ppq = context.ppq();
        Self::with_units(context, bpm, Units::Bpm { ppq })
    }

    pub fn param(&self) -> &Param {
        &self.param
    }

    pub fn context(&self) -> &Context {
        self.param.context()
    }

    pub fn units(&self) -> Units {
        self.param.units()
    }

    pub fn events(&self) -> &[AutomationEvent] {
        self.param.events.events()
    }

    /// Frequency in ticks per second at `time`, regardless of units
    pub fn frequency_at(&self, time: Seconds) -> f64 {
        self.param.internal_value_at(time)
    }

    /// Ticks elapsed from time 0 to `time`
    pub fn get_ticks_at_time(&self, time: Seconds) -> Ticks {
        let ticks = match self.param.events.get(time) {
            Some(event) => self.ticks_until(event.time, event.ticks.unwrap_or(0.0), time),
            None => self.ticks_until(0.0, 0.0, time),
        };
        ticks.max(0.0)
    }

    /// Time at which the integral first reaches `tick`
    pub fn get_time_of_tick(&self, tick: Ticks) -> Seconds {
        let events = self.param.events.events();
        let by_ticks = |e: &AutomationEvent| e.ticks.unwrap_or(0.0);

        let Some(before_index) = self.param.events.get_index_by(tick, by_ticks) else {
            return per_value(tick, self.param.initial_value);
        };
        let before = &events[before_index];
        let before_ticks = by_ticks(before);
        if approx_eq(before_ticks, tick) {
            return before.time;
        }

        let after = self
            .param
            .events
            .get_after_index_by(tick, by_ticks)
            .map(|i| &events[i]);

        if let Some(after) = after {
            if after.kind == AutomationKind::LinearRamp && before.value != after.value {
                let start_value = self.frequency_at(before.time);
                let end_value = self.frequency_at(after.time);
                let slope = (end_value - start_value) / (after.time - before.time);
                if slope != 0.0 {
                    let delta = tick - before_ticks;
                    let root = (start_value * start_value + 2.0 * slope * delta)
                        .max(0.0)
                        .sqrt();
                    let first = (-start_value + root) / slope;
                    let second = (-start_value - root) / slope;
                    return before.time + if first > 0.0 { first } else { second };
                }
            }
        }

        before.time + per_value(tick - before_ticks, before.value)
    }

    /// Seconds spanned by `ticks` starting at `time`
    pub fn get_duration_of_ticks(&self, ticks: Ticks, time: Seconds) -> Seconds {
        let start = self.get_ticks_at_time(time);
        self.get_time_of_tick(start + ticks) - time
    }

    /// Alias of [`TickSignal::get_duration_of_ticks`]
    pub fn ticks_to_time(&self, ticks: Ticks, when: Seconds) -> Seconds {
        self.get_duration_of_ticks(ticks, when)
    }

    /// Ticks spanned by `duration` starting at `when`
    pub fn time_to_ticks(&self, duration: Seconds, when: Seconds) -> Ticks {
        self.get_ticks_at_time(when + duration) - self.get_ticks_at_time(when)
    }

    /// Trapezoid integral from an anchor (time, ticks) up to `time`
    fn ticks_until(&self, anchor_time: Seconds, anchor_ticks: Ticks, time: Seconds) -> Ticks {
        let start_value = self.frequency_at(anchor_time);
        // A set event landing exactly on `time` only applies after it
        let lands_on_set = self
            .param
            .events
            .get(time)
            .is_some_and(|e| e.kind == AutomationKind::SetValue && approx_eq(e.time, time));
        let end_value = if lands_on_set {
            self.frequency_at(time - self.context().sample_time())
        } else {
            self.frequency_at(time)
        };
        0.5 * (time - anchor_time) * (start_value + end_value) + anchor_ticks
    }

    /// Recompute the tick integral stored on every event
    fn refresh_ticks(&mut self) {
        let mut previous: Option<(Seconds, Ticks)> = None;
        for index in 0..self.param.events.len() {
            let time = self.param.events.events()[index].time;
            let (anchor_time, anchor_ticks) = previous.unwrap_or((0.0, 0.0));
            let ticks = self.ticks_until(anchor_time, anchor_ticks, time).max(0.0);
            if let Some(event) = self.param.events.event_mut(index) {
                event.ticks = Some(ticks);
            }
            previous = Some((time, ticks));
        }
    }

    fn add_linear_segment(&mut self, value: f64, time: Seconds) {
        self.param.add_event(AutomationKind::LinearRamp, value, time);
    }
}

fn per_value(ticks: Ticks, value: f64) -> Seconds {
    if value == 0.0 {
        f64::INFINITY
    } else {
        ticks / value
    }
}

fn segment_count(duration: Seconds) -> usize {
    ((duration / SEGMENT_DURATION).round() as usize).max(1)
}

impl Automatable for TickSignal {
    fn get_value_at_time(&self, time: Seconds) -> f64 {
        self.param.get_value_at_time(time)
    }

    fn set_value_at_time(&mut self, value: f64, time: Seconds) -> &mut Self {
        self.param.set_value_at_time(value, time);
        self.refresh_ticks();
        self
    }

    fn linear_ramp_to_value_at_time(&mut self, value: f64, end_time: Seconds) -> &mut Self {
        self.param.linear_ramp_to_value_at_time(value, end_time);
        self.refresh_ticks();
        self
    }

    fn exponential_ramp_to_value_at_time(&mut self, value: f64, end_time: Seconds) -> &mut Self {
        let end_value = self.param.units.from_unit(value).max(MIN_EXPONENTIAL_VALUE);
        let (start_time, start_value) = match self.param.events.get(end_time) {
            Some(event) => (event.time, self.frequency_at(event.time)),
            None => (0.0, self.param.initial_value),
        };

        let duration = end_time - start_time;
        let segments = segment_count(duration);
        for i in 1..=segments {
            let time = start_time + duration * i as f64 / segments as f64;
            let value = if i == segments {
                end_value
            } else {
                exponential_interpolate(start_time, start_value, end_time, end_value, time)
            };
            self.add_linear_segment(value, time);
        }
        self.refresh_ticks();
        self
    }

    fn set_target_at_time(
        &mut self,
        value: f64,
        start_time: Seconds,
        time_constant: Seconds,
    ) -> &mut Self {
        assert!(time_constant > 0.0, "Time constant must be > 0");
        let target = self.param.units.from_unit(value);
        self.param.cancel_and_hold_at_time(start_time);
        let start_value = self.frequency_at(start_time);

        let horizon = time_constant * TARGET_HORIZON;
        let segments = segment_count(horizon);
        for i in 1..=segments {
            let time = start_time + horizon * i as f64 / segments as f64;
            let value = if i == segments {
                target
            } else {
                exponential_approach(start_time, start_value, target, time_constant, time)
            };
            self.add_linear_segment(value, time);
        }
        self.refresh_ticks();
        self
    }

    fn cancel_scheduled_values(&mut self, time: Seconds) -> &mut Self {
        self.param.cancel_scheduled_values(time);
        self.refresh_ticks();
        self
    }

    fn cancel_and_hold_at_time(&mut self, time: Seconds) -> &mut Self {
        self.param.cancel_and_hold_at_time(time);
        self.refresh_ticks();
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

    fn signal(value: f64) -> TickSignal {
        TickSignal::new(Context::default(), value)
    }

    #[test]
    fn test_constant_frequency_ticks() {
        let s = signal(2.0);
        assert_eq!(s.get_ticks_at_time(0.0), 0.0);
        assert_close(s.get_ticks_at_time(1.0), 2.0, 1e-9);
        assert_close(s.get_ticks_at_time(2.5), 5.0, 1e-9);
        assert_close(s.get_time_of_tick(5.0), 2.5, 1e-9);
    }

    #[test]
    fn test_ticks_never_negative() {
        let s = signal(3.0);
        assert_eq!(s.get_ticks_at_time(-1.0), 0.0);
    }

    #[test]
    fn test_set_value_changes_rate() {
        let mut s = signal(1.0);
        s.set_value_at_time(2.0, 1.0);

        assert_close(s.get_ticks_at_time(1.0), 1.0, 1e-3);
        assert_close(s.get_ticks_at_time(2.0), 3.0, 1e-3);
        assert_close(s.get_time_of_tick(3.0), 2.0, 1e-3);
    }

    #[test]
    fn test_linear_ramp_integral() {
        let mut s = signal(1.0);
        s.linear_ramp_to_value_at_time(3.0, 2.0);

        // Area under 1 -> 3 over two seconds
        assert_close(s.get_ticks_at_time(2.0), 4.0, 1e-9);
        // Value at t=1 is 2, trapezoid of 1 and 2
        assert_close(s.get_ticks_at_time(1.0), 1.5, 1e-9);
        assert_close(s.get_time_of_tick(1.5), 1.0, 1e-9);
        assert_close(s.get_time_of_tick(4.0), 2.0, 1e-9);
        // Past the ramp at constant 3
        assert_close(s.get_ticks_at_time(3.0), 7.0, 1e-9);
        assert_close(s.get_time_of_tick(7.0), 3.0, 1e-9);
    }

    #[test]
    fn test_decreasing_ramp_inverse() {
        let mut s = signal(4.0);
        s.linear_ramp_to_value_at_time(2.0, 2.0);

        let ticks = s.get_ticks_at_time(1.3);
        assert_close(s.get_time_of_tick(ticks), 1.3, 1e-9);
    }

    #[test]
    fn test_exponential_ramp_is_segmented() {
        let mut s = signal(1.0);
        s.exponential_ramp_to_value_at_time(4.0, 1.0);

        // Ten linear segments of 0.1s
        assert_eq!(s.events().len(), 11);
        assert!(s
            .events()
            .iter()
            .skip(1)
            .all(|e| e.kind == AutomationKind::LinearRamp));
        assert_close(s.get_value_at_time(0.5), 2.0, 1e-9);
        assert_close(s.get_value_at_time(1.0), 4.0, 1e-9);

        let ticks = s.get_ticks_at_time(0.77);
        assert_close(s.get_time_of_tick(ticks), 0.77, 1e-9);
    }

    #[test]
    fn test_target_reaches_value() {
        let mut s = signal(1.0);
        s.set_target_at_time(2.0, 1.0, 0.1);

        assert_close(s.get_value_at_time(1.0), 1.0, 1e-9);
        let approx = s.get_value_at_time(1.1);
        assert_close(approx, 2.0 - (-1.0f64).exp(), 0.05);
        assert_eq!(s.get_value_at_time(1.6), 2.0);
        assert_eq!(s.get_value_at_time(5.0), 2.0);
    }

    #[test]
    fn test_duration_of_ticks() {
        let mut s = signal(2.0);
        assert_close(s.get_duration_of_ticks(4.0, 1.0), 2.0, 1e-9);

        s.set_value_at_time(4.0, 2.0);
        // Two ticks at 2/s then two ticks at 4/s
        assert_close(s.get_duration_of_ticks(4.0, 1.0), 1.5, 1e-3);
        assert_close(s.ticks_to_time(4.0, 1.0), s.get_duration_of_ticks(4.0, 1.0), 1e-12);
        assert_close(s.time_to_ticks(1.5, 1.0), 4.0, 1e-3);
    }

    #[test]
    fn test_zero_frequency_never_reaches_tick() {
        let s = signal(0.0);
        assert_eq!(s.get_ticks_at_time(10.0), 0.0);
        assert!(s.get_time_of_tick(1.0).is_infinite());
    }

    #[test]
    fn test_cancel_restores_constant_rate() {
        let mut s = signal(1.0);
        s.linear_ramp_to_value_at_time(5.0, 1.0);
        s.cancel_scheduled_values(0.5);

        assert_close(s.get_ticks_at_time(2.0), 2.0, 1e-9);
    }

    #[test]
    fn test_cancel_and_hold_freezes_rate() {
        let mut s = signal(1.0);
        s.linear_ramp_to_value_at_time(3.0, 2.0);
        s.cancel_and_hold_at_time(1.0);

        // 1.5 ticks in the first second, then 2 ticks per second.
        // The hold lands on a set event, so the ramp end is read one sample early.
        assert_close(s.get_ticks_at_time(3.0), 5.5, 1e-4);
    }

    #[test]
    fn test_bpm_units() {
        let ctx = Context::default();
        let s = TickSignal::bpm(ctx, 120.0);
        assert_eq!(s.get_value_at_time(0.0), 120.0);
        assert_close(s.get_ticks_at_time(1.0), 384.0, 1e-9);
        assert_close(s.get_time_of_tick(192.0), 0.5, 1e-9);
    }
}
