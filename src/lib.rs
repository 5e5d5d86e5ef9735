// tick_engine - Library exports for tests and benchmarks

pub mod clock;
pub mod config;
pub mod context;
pub mod driver;
pub mod error;
pub mod param;
pub mod timeline;
pub mod transport;

// Re-export commonly used types for convenience
pub use clock::{Clock, ClockEvent, ListenerId, Listeners, TickOffsetEvent, TickSource};
pub use config::EngineConfig;
pub use context::{Context, Seconds, Ticks};
pub use driver::BlockDriver;
pub use error::{EngineError, EngineResult};
pub use param::{
    Automatable, AutomationEvent, AutomationKind, Param, SyncedParam, TickSignal, Units,
};
pub use timeline::{
    PlaybackState, SearchResult, StateEvent, StateTimeline, Timeline, TimelineEvent,
};
pub use transport::{EventId, LoopEvent, MusicalTime, TimeSignature, Transport};
