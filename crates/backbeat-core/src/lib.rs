//! backbeat-core: Pattern model, mutation, and lookahead scheduling for the drum trainer

pub mod clock;
mod error;
pub mod instrument;
pub mod library;
pub mod mutator;
pub mod pattern;
pub mod scheduler;
pub mod session;
pub mod settings;
pub mod transition;

pub use clock::{AudioClock, ManualClock};
pub use error::{BackbeatError, PatternError, Result, SessionError};
pub use instrument::{Instrument, InstrumentGroup, MuteMask, Step};
pub use library::{Category, LibraryEntry, PatternLibrary, CATEGORIES};
pub use pattern::{Meter, Pattern};
pub use scheduler::{step_duration, ScheduledEvent, Scheduler, TickReport, TriggerSink};
pub use session::{PatternRequest, Session};
pub use settings::{EngineConfig, PlaybackSettings, SpeedRate, Swing};
pub use transition::Transition;
