// Timeline - Time-ordered event store
// Binary search lookup (hit/before/between/after) and range iteration over sorted events

pub mod state;

pub use state::{PlaybackState, StateEvent, StateTimeline};

/// Absolute tolerance for comparing timeline keys.
/// Keys closer than this are treated as the same instant.
pub const EPSILON: f64 = 1e-6;

pub(crate) fn approx_eq(a: f64, b: f64) -> bool {
    (a - b).abs() < EPSILON
}

fn approx_lt(a: f64, b: f64) -> bool {
    a < b - EPSILON
}

fn approx_gt(a: f64, b: f64) -> bool {
    a > b + EPSILON
}

/// An event that can be stored on a [`Timeline`]
///
/// Events are ordered by `time + offset`.
pub trait TimelineEvent {
    fn time(&self) -> f64;

    fn offset(&self) -> f64 {
        0.0
    }

    fn key(&self) -> f64 {
        self.time() + self.offset()
    }
}

/// Outcome of a binary search over the timeline keys
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchResult {
    /// Key is less than every event (or the timeline is empty)
    Before,
    /// Key is greater than every event
    After,
    /// Key matches one or more consecutive events
    Hit { first: usize, last: usize },
    /// Key falls strictly between two adjacent events
    Between { lower: usize, upper: usize },
}

/// Time-ordered event store
///
/// The backing vector is always sorted by [`TimelineEvent::key`]. Events that share
/// a key keep their insertion order, so the most recently added one wins lookups.
#[derive(Debug, Clone)]
pub struct Timeline<T> {
    events: Vec<T>,
    memory: usize,
}

impl<T: TimelineEvent> Timeline<T> {
    /// Create an unbounded timeline
    pub fn new() -> Self {
        Self::with_memory(usize::MAX)
    }

    /// Create a timeline that keeps at most `memory` events, dropping the oldest first
    pub fn with_memory(memory: usize) -> Self {
        assert!(memory > 0, "Timeline memory must be > 0");
        Self {
            events: Vec::new(),
            memory,
        }
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn memory(&self) -> usize {
        self.memory
    }

    /// All events in key order
    pub fn events(&self) -> &[T] {
        &self.events
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.events.iter()
    }

    pub fn event(&self, index: usize) -> Option<&T> {
        self.events.get(index)
    }

    /// Mutable access by index. Callers must not change the event's key.
    pub fn event_mut(&mut self, index: usize) -> Option<&mut T> {
        self.events.get_mut(index)
    }

    /// First event
    pub fn peek(&self) -> Option<&T> {
        self.events.first()
    }

    /// Remove and return the first event
    pub fn shift(&mut self) -> Option<T> {
        if self.events.is_empty() {
            None
        } else {
            Some(self.events.remove(0))
        }
    }

    /// Insert an event at its sorted position, after any events with an equal key.
    /// Returns the index the event landed on, or `None` if the memory limit
    /// evicted it straight away.
    pub fn add(&mut self, event: T) -> Option<usize> {
        let key = event.key();
        let index = self.events.partition_point(|e| !approx_gt(e.key(), key));
        self.events.insert(index, event);

        if self.events.len() > self.memory {
            let overflow = self.events.len() - self.memory;
            self.events.drain(..overflow);
            return index.checked_sub(overflow);
        }

        Some(index)
    }

    /// Remove the first event equal to `event`. Returns false if it is not a member.
    pub fn remove(&mut self, event: &T) -> bool
    where
        T: PartialEq,
    {
        match self.events.iter().position(|e| e == event) {
            Some(index) => {
                self.events.remove(index);
                true
            }
            None => false,
        }
    }

    /// Keep only the events matching the predicate, preserving order
    pub fn retain<F>(&mut self, f: F)
    where
        F: FnMut(&T) -> bool,
    {
        self.events.retain(f);
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }

    /// Binary search by the event key
    pub fn search(&self, value: f64) -> SearchResult {
        self.search_by(value, T::key)
    }

    /// Binary search by an alternative key.
    /// The key must be non-decreasing along the timeline.
    pub fn search_by<K>(&self, value: f64, key: K) -> SearchResult
    where
        K: Fn(&T) -> f64,
    {
        let first = self.events.partition_point(|e| approx_lt(key(e), value));
        let end = self.events.partition_point(|e| !approx_gt(key(e), value));

        if first < end {
            SearchResult::Hit {
                first,
                last: end - 1,
            }
        } else if first == 0 {
            SearchResult::Before
        } else if first == self.events.len() {
            SearchResult::After
        } else {
            SearchResult::Between {
                lower: first - 1,
                upper: first,
            }
        }
    }

    /// Index of the last event at or before `value`
    pub fn get_index(&self, value: f64) -> Option<usize> {
        self.get_index_by(value, T::key)
    }

    pub fn get_index_by<K>(&self, value: f64, key: K) -> Option<usize>
    where
        K: Fn(&T) -> f64,
    {
        match self.search_by(value, key) {
            SearchResult::Before => None,
            SearchResult::After => self.events.len().checked_sub(1),
            SearchResult::Hit { last, .. } => Some(last),
            SearchResult::Between { lower, .. } => Some(lower),
        }
    }

    /// Index of the first event strictly after `value`
    pub fn get_after_index(&self, value: f64) -> Option<usize> {
        self.get_after_index_by(value, T::key)
    }

    pub fn get_after_index_by<K>(&self, value: f64, key: K) -> Option<usize>
    where
        K: Fn(&T) -> f64,
    {
        let index = match self.search_by(value, key) {
            SearchResult::Before => 0,
            SearchResult::After => return None,
            SearchResult::Hit { last, .. } => last + 1,
            SearchResult::Between { upper, .. } => upper,
        };
        (index < self.events.len()).then_some(index)
    }

    /// Index of the last event strictly before `value`
    pub fn get_before_index(&self, value: f64) -> Option<usize> {
        match self.search(value) {
            SearchResult::Before => None,
            SearchResult::After => self.events.len().checked_sub(1),
            SearchResult::Hit { first, .. } => first.checked_sub(1),
            SearchResult::Between { lower, .. } => Some(lower),
        }
    }

    /// Last event at or before `value`
    pub fn get(&self, value: f64) -> Option<&T> {
        self.get_index(value).map(|i| &self.events[i])
    }

    /// Last event whose alternative key is at or before `value`
    pub fn get_by<K>(&self, value: f64, key: K) -> Option<&T>
    where
        K: Fn(&T) -> f64,
    {
        self.get_index_by(value, key).map(|i| &self.events[i])
    }

    /// First event strictly after `value`
    pub fn get_after(&self, value: f64) -> Option<&T> {
        self.get_after_index(value).map(|i| &self.events[i])
    }

    /// First event whose alternative key is strictly after `value`
    pub fn get_after_by<K>(&self, value: f64, key: K) -> Option<&T>
    where
        K: Fn(&T) -> f64,
    {
        self.get_after_index_by(value, key).map(|i| &self.events[i])
    }

    /// Last event strictly before `value`
    pub fn get_before(&self, value: f64) -> Option<&T> {
        self.get_before_index(value).map(|i| &self.events[i])
    }

    /// The event preceding `event` in the timeline
    pub fn previous_event(&self, event: &T) -> Option<&T>
    where
        T: PartialEq,
    {
        let index = self.events.iter().position(|e| e == event)?;
        index.checked_sub(1).map(|i| &self.events[i])
    }

    fn first_index_at_or_after(&self, value: f64) -> usize {
        match self.search(value) {
            SearchResult::Before => 0,
            SearchResult::After => self.events.len(),
            SearchResult::Hit { first, .. } => first,
            SearchResult::Between { upper, .. } => upper,
        }
    }

    fn end_index_after(&self, value: f64) -> usize {
        self.get_index(value).map_or(0, |i| i + 1)
    }

    /// Events with `start <= key < end`
    pub fn between(&self, start: f64, end: f64) -> &[T] {
        let lower = self.first_index_at_or_after(start);
        let upper = self.first_index_at_or_after(end);
        if lower < upper {
            &self.events[lower..upper]
        } else {
            &[]
        }
    }

    /// Events with `start <= key <= end`
    pub fn between_inclusive(&self, start: f64, end: f64) -> &[T] {
        let lower = self.first_index_at_or_after(start);
        let upper = self.end_index_after(end);
        if lower < upper {
            &self.events[lower..upper]
        } else {
            &[]
        }
    }

    /// Events sharing exactly the key `time`
    pub fn at_time(&self, time: f64) -> &[T] {
        match self.search(time) {
            SearchResult::Hit { first, last } => &self.events[first..=last],
            _ => &[],
        }
    }

    /// Iterate `[start, end)`
    pub fn for_each_between<F>(&self, start: f64, end: f64, f: F)
    where
        F: FnMut(&T),
    {
        self.between(start, end).iter().for_each(f);
    }

    /// Iterate every event at or before `time`
    pub fn for_each_before<F>(&self, time: f64, f: F)
    where
        F: FnMut(&T),
    {
        let upper = self.end_index_after(time);
        self.events[..upper].iter().for_each(f);
    }

    /// Iterate every event strictly after `time`
    pub fn for_each_after<F>(&self, time: f64, f: F)
    where
        F: FnMut(&T),
    {
        let lower = self.end_index_after(time);
        self.events[lower..].iter().for_each(f);
    }

    /// Iterate every event at or after `time`
    pub fn for_each_from<F>(&self, time: f64, f: F)
    where
        F: FnMut(&T),
    {
        let lower = self.first_index_at_or_after(time);
        self.events[lower..].iter().for_each(f);
    }

    /// Iterate the events at exactly `time`
    pub fn for_each_at_time<F>(&self, time: f64, f: F)
    where
        F: FnMut(&T),
    {
        self.at_time(time).iter().for_each(f);
    }

    /// Mutably iterate the events at exactly `time`
    pub fn for_each_at_time_mut<F>(&mut self, time: f64, f: F)
    where
        F: FnMut(&mut T),
    {
        if let SearchResult::Hit { first, last } = self.search(time) {
            self.events[first..=last].iter_mut().for_each(f);
        }
    }

    /// Remove every event at or after `after`
    pub fn cancel(&mut self, after: f64) {
        let index = self.first_index_at_or_after(after);
        self.events.truncate(index);
    }

    /// Remove every event strictly before `time`
    pub fn cancel_before(&mut self, time: f64) {
        let index = self.first_index_at_or_after(time);
        self.events.drain(..index);
    }
}

impl<T: TimelineEvent> Default for Timeline<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    struct Marker {
        time: f64,
        offset: f64,
        label: &'static str,
    }

    impl Marker {
        fn at(time: f64, label: &'static str) -> Self {
            Self {
                time,
                offset: 0.0,
                label,
            }
        }
    }

    impl TimelineEvent for Marker {
        fn time(&self) -> f64 {
            self.time
        }

        fn offset(&self) -> f64 {
            self.offset
        }
    }

    fn labels(events: &[Marker]) -> Vec<&'static str> {
        events.iter().map(|e| e.label).collect()
    }

    #[test]
    fn test_search_single_event() {
        let mut timeline = Timeline::new();
        timeline.add(Marker::at(1.0, "a"));

        assert_eq!(timeline.search(0.0), SearchResult::Before);
        assert_eq!(timeline.search(1.0), SearchResult::Hit { first: 0, last: 0 });
        assert_eq!(timeline.search(2.0), SearchResult::After);
    }

    #[test]
    fn test_search_repeated_keys() {
        let mut timeline = Timeline::new();
        timeline.add(Marker::at(1.0, "a"));
        timeline.add(Marker::at(1.0, "b"));
        timeline.add(Marker::at(1.0, "c"));
        timeline.add(Marker::at(2.0, "d"));

        assert_eq!(timeline.search(1.0), SearchResult::Hit { first: 0, last: 2 });
        assert_eq!(
            timeline.search(1.5),
            SearchResult::Between { lower: 2, upper: 3 }
        );
        assert_eq!(timeline.search(3.0), SearchResult::After);
    }

    #[test]
    fn test_empty_timeline_queries() {
        let mut timeline: Timeline<Marker> = Timeline::new();
        assert_eq!(timeline.search(1.0), SearchResult::Before);
        assert!(timeline.get(1.0).is_none());
        assert!(timeline.get_before(1.0).is_none());
        assert!(timeline.get_after(1.0).is_none());
        assert!(timeline.between(0.0, 10.0).is_empty());

        timeline.cancel(0.0);
        timeline.cancel_before(10.0);
        assert!(timeline.is_empty());
    }

    #[test]
    fn test_add_keeps_order() {
        let mut timeline = Timeline::new();
        timeline.add(Marker::at(3.0, "c"));
        timeline.add(Marker::at(1.0, "a"));
        timeline.add(Marker::at(2.0, "b"));
        timeline.add(Marker::at(0.5, "first"));

        assert_eq!(labels(timeline.events()), vec!["first", "a", "b", "c"]);
    }

    #[test]
    fn test_offset_contributes_to_key() {
        let mut timeline = Timeline::new();
        timeline.add(Marker::at(2.0, "plain"));
        timeline.add(Marker {
            time: 1.0,
            offset: 1.5,
            label: "shifted",
        });

        assert_eq!(labels(timeline.events()), vec!["plain", "shifted"]);
        assert_eq!(timeline.get(2.2).map(|e| e.label), Some("plain"));
    }

    #[test]
    fn test_get_before_after() {
        let mut timeline = Timeline::new();
        timeline.add(Marker::at(1.0, "a"));
        timeline.add(Marker::at(2.0, "b"));
        timeline.add(Marker::at(2.0, "c"));
        timeline.add(Marker::at(3.0, "d"));

        assert_eq!(timeline.get(2.0).map(|e| e.label), Some("c"));
        assert_eq!(timeline.get(2.5).map(|e| e.label), Some("c"));
        assert_eq!(timeline.get(0.5).map(|e| e.label), None);

        assert_eq!(timeline.get_before(2.0).map(|e| e.label), Some("a"));
        assert_eq!(timeline.get_before(1.0).map(|e| e.label), None);
        assert_eq!(timeline.get_before(9.0).map(|e| e.label), Some("d"));

        assert_eq!(timeline.get_after(2.0).map(|e| e.label), Some("d"));
        assert_eq!(timeline.get_after(0.0).map(|e| e.label), Some("a"));
        assert_eq!(timeline.get_after(3.0).map(|e| e.label), None);
    }

    #[test]
    fn test_remove() {
        let mut timeline = Timeline::new();
        let a = Marker::at(1.0, "a");
        timeline.add(a.clone());
        timeline.add(Marker::at(2.0, "b"));

        assert!(timeline.remove(&a));
        assert!(!timeline.remove(&a));
        assert_eq!(timeline.len(), 1);
    }

    #[test]
    fn test_for_each_between_is_half_open() {
        let mut timeline = Timeline::new();
        for (time, label) in [(0.0, "a"), (1.0, "b"), (2.0, "c"), (3.0, "d")] {
            timeline.add(Marker::at(time, label));
        }

        let mut seen = Vec::new();
        timeline.for_each_between(1.0, 3.0, |e| seen.push(e.label));
        assert_eq!(seen, vec!["b", "c"]);

        assert_eq!(labels(timeline.between(0.5, 2.5)), vec!["b", "c"]);
        assert_eq!(labels(timeline.between(-5.0, 0.0)), Vec::<&str>::new());
        assert_eq!(labels(timeline.between_inclusive(1.0, 3.0)), vec!["b", "c", "d"]);
    }

    #[test]
    fn test_for_each_before_after_from() {
        let mut timeline = Timeline::new();
        for (time, label) in [(0.0, "a"), (1.0, "b"), (2.0, "c")] {
            timeline.add(Marker::at(time, label));
        }

        let mut before = Vec::new();
        timeline.for_each_before(1.0, |e| before.push(e.label));
        assert_eq!(before, vec!["a", "b"]);

        let mut after = Vec::new();
        timeline.for_each_after(1.0, |e| after.push(e.label));
        assert_eq!(after, vec!["c"]);

        let mut from = Vec::new();
        timeline.for_each_from(1.0, |e| from.push(e.label));
        assert_eq!(from, vec!["b", "c"]);
    }

    #[test]
    fn test_cancel_truncates_from_time() {
        let mut timeline = Timeline::new();
        for (time, label) in [(0.0, "a"), (1.0, "b"), (1.0, "c"), (2.0, "d")] {
            timeline.add(Marker::at(time, label));
        }

        timeline.cancel(1.0);
        assert_eq!(labels(timeline.events()), vec!["a"]);

        timeline.cancel(5.0);
        assert_eq!(timeline.len(), 1);

        timeline.cancel(-1.0);
        assert!(timeline.is_empty());
    }

    #[test]
    fn test_cancel_before() {
        let mut timeline = Timeline::new();
        for (time, label) in [(0.0, "a"), (1.0, "b"), (2.0, "c")] {
            timeline.add(Marker::at(time, label));
        }

        timeline.cancel_before(1.0);
        assert_eq!(labels(timeline.events()), vec!["b", "c"]);
    }

    #[test]
    fn test_memory_drops_oldest() {
        let mut timeline = Timeline::with_memory(2);
        timeline.add(Marker::at(0.0, "a"));
        timeline.add(Marker::at(1.0, "b"));
        timeline.add(Marker::at(2.0, "c"));

        assert_eq!(labels(timeline.events()), vec!["b", "c"]);
    }

    #[test]
    fn test_add_reports_evicted_event() {
        let mut timeline = Timeline::with_memory(2);
        assert_eq!(timeline.add(Marker::at(1.0, "a")), Some(0));
        assert_eq!(timeline.add(Marker::at(2.0, "b")), Some(1));

        // Older than everything kept: dropped on insertion
        assert_eq!(timeline.add(Marker::at(0.0, "old")), None);
        assert_eq!(labels(timeline.events()), vec!["a", "b"]);

        assert_eq!(timeline.add(Marker::at(1.5, "mid")), Some(0));
        assert_eq!(labels(timeline.events()), vec!["mid", "b"]);
    }

    #[test]
    fn test_search_by_alternative_key() {
        let mut timeline = Timeline::new();
        timeline.add(Marker {
            time: 0.0,
            offset: 10.0,
            label: "a",
        });
        timeline.add(Marker {
            time: 1.0,
            offset: 20.0,
            label: "b",
        });

        let by_offset = |e: &Marker| e.offset;
        assert_eq!(timeline.get_by(15.0, by_offset).map(|e| e.label), Some("a"));
        assert_eq!(timeline.get_after_by(15.0, by_offset).map(|e| e.label), Some("b"));
    }

    #[test]
    fn test_near_tie_insertion_order() {
        let mut timeline = Timeline::new();
        timeline.add(Marker::at(1.0 + 1e-7, "late"));
        timeline.add(Marker::at(1.0 - 1e-7, "early"));

        assert_eq!(timeline.get(1.0 - 1e-7).map(|e| e.label), Some("early"));
        let mut at = Vec::new();
        timeline.for_each_at_time(1.0, |e| at.push(e.label));
        assert_eq!(at, vec!["late", "early"]);
    }

    #[test]
    fn test_previous_event_and_shift() {
        let mut timeline = Timeline::new();
        let b = Marker::at(1.0, "b");
        timeline.add(Marker::at(0.0, "a"));
        timeline.add(b.clone());

        assert_eq!(timeline.previous_event(&b).map(|e| e.label), Some("a"));
        assert_eq!(timeline.shift().map(|e| e.label), Some("a"));
        assert_eq!(timeline.peek().map(|e| e.label), Some("b"));
    }
}
