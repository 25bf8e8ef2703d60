//! backbeat-services: Playback driver, drum voices, audio output, and offline bounce

pub mod audio_io;
pub mod bounce;
pub mod kit;
pub mod playback;
pub mod renderer;

pub use audio_io::{default_device_info, AudioOutputError, RealtimeOutputStream, StreamClock};
pub use bounce::{bounce_to_wav, render_session, write_wav, BounceError, BounceOptions, BounceSummary};
pub use kit::{Layer, Sound, Voice, Waveform};
pub use playback::{
    PlaybackCommand, PlaybackEngine, PlaybackError, PlaybackEvent, PlaybackSink, RealtimePlayer,
    StatusSnapshot, StepNotice,
};
pub use renderer::{Renderer, SharedRenderer, MAX_VOICES};
