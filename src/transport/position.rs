// Position - Musical time in bars, beats and ticks
// Conversion between transport ticks and bar:beat:tick for a time signature and resolution

use std::fmt;

/// Time signature (numerator/denominator)
/// Example: 4/4 time = TimeSignature { numerator: 4, denominator: 4 }
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct TimeSignature {
    pub numerator: u8,   // Beats per bar
    pub denominator: u8, // Note value of one beat (4 = quarter note, 8 = eighth note)
}

impl TimeSignature {
    pub fn new(numerator: u8, denominator: u8) -> Self {
        assert!(numerator > 0, "Time signature numerator must be > 0");
        assert!(
            denominator.is_power_of_two(),
            "Time signature denominator must be power of 2"
        );
        Self {
            numerator,
            denominator,
        }
    }

    pub fn four_four() -> Self {
        Self::new(4, 4)
    }

    pub fn three_four() -> Self {
        Self::new(3, 4)
    }

    pub fn six_eight() -> Self {
        Self::new(6, 8)
    }

    /// False for signatures deserialized from invalid input
    pub fn is_valid(&self) -> bool {
        self.numerator > 0 && self.denominator.is_power_of_two()
    }

    /// Ticks in one beat at `ppq` ticks per quarter note
    /// Example: 6/8 at 192 ppq = 96
    pub fn ticks_per_beat(&self, ppq: u32) -> u64 {
        ppq as u64 * 4 / self.denominator as u64
    }

    pub fn ticks_per_bar(&self, ppq: u32) -> u64 {
        self.ticks_per_beat(ppq) * self.numerator as u64
    }
}

impl Default for TimeSignature {
    fn default() -> Self {
        Self::four_four()
    }
}

impl fmt::Display for TimeSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.numerator, self.denominator)
    }
}

/// Position as bar:beat:tick
/// Bars and beats are 1-based, ticks within the beat are 0-based
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MusicalTime {
    pub bar: u32,
    pub beat: u8,
    pub tick: u32,
}

impl MusicalTime {
    pub fn new(bar: u32, beat: u8, tick: u32) -> Self {
        assert!(bar > 0 && beat > 0, "Bars and beats are 1-based");
        Self { bar, beat, tick }
    }

    /// Bar 1, beat 1, tick 0
    pub fn zero() -> Self {
        Self::new(1, 1, 0)
    }

    pub fn to_total_ticks(&self, time_signature: &TimeSignature, ppq: u32) -> u64 {
        let ticks_per_beat = time_signature.ticks_per_beat(ppq);
        let ticks_per_bar = time_signature.ticks_per_bar(ppq);

        let bar_0 = (self.bar - 1) as u64;
        let beat_0 = (self.beat - 1) as u64;

        bar_0 * ticks_per_bar + beat_0 * ticks_per_beat + self.tick as u64
    }

    pub fn from_total_ticks(total_ticks: u64, time_signature: &TimeSignature, ppq: u32) -> Self {
        let ticks_per_beat = time_signature.ticks_per_beat(ppq);
        let ticks_per_bar = time_signature.ticks_per_bar(ppq);

        let bar = total_ticks / ticks_per_bar + 1;
        let within_bar = total_ticks % ticks_per_bar;
        let beat = within_bar / ticks_per_beat + 1;
        let tick = within_bar % ticks_per_beat;

        Self::new(bar as u32, beat as u8, tick as u32)
    }

    /// Position of fractional transport ticks, truncated to the tick
    pub fn from_ticks(ticks: f64, time_signature: &TimeSignature, ppq: u32) -> Self {
        Self::from_total_ticks(ticks.max(0.0).floor() as u64, time_signature, ppq)
    }

    /// Round to the nearest `1/subdivision` of a beat
    /// Example: subdivision = 4 for sixteenth notes in 4/4
    pub fn quantize(&self, time_signature: &TimeSignature, ppq: u32, subdivision: u32) -> Self {
        assert!(subdivision > 0, "Subdivision must be > 0");
        let total = self.to_total_ticks(time_signature, ppq);
        let step = (time_signature.ticks_per_beat(ppq) / subdivision as u64).max(1);
        let quantized = (total + step / 2) / step * step;
        Self::from_total_ticks(quantized, time_signature, ppq)
    }
}

impl Default for MusicalTime {
    fn default() -> Self {
        Self::zero()
    }
}

impl fmt::Display for MusicalTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{:02}:{:03}", self.bar, self.beat, self.tick)
    }
}
