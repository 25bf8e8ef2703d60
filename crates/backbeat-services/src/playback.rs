//! Playback driver: owns a session on its own thread and wakes it on a fixed ticker

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use backbeat_core::{
    AudioClock, Instrument, InstrumentGroup, PatternRequest, PlaybackSettings, ScheduledEvent,
    Session, SessionError, Transition, TriggerSink,
};
use crossbeam_channel::{bounded, select, tick, unbounded, Receiver, Sender, TrySendError};
use thiserror::Error;
use tracing::{debug, info, trace, warn};

use crate::audio_io::{AudioOutputError, RealtimeOutputStream};
use crate::renderer::{Renderer, SharedRenderer};

/// Capacity of the step notice channel. Notices are dropped, not queued,
/// when a consumer falls this far behind; replies travel on their own
/// unbounded channel and are never crowded out.
const STEP_CAPACITY: usize = 1024;

#[derive(Debug, Error)]
pub enum PlaybackError {
    #[error("Audio output error: {0}")]
    Output(#[from] AudioOutputError),
    #[error("Playback driver has shut down")]
    Disconnected,
    #[error("Playback driver thread panicked")]
    DriverPanicked,
    #[error("Failed to spawn playback thread: {0}")]
    Spawn(std::io::Error),
}

/// Control-surface requests, applied between ticks
#[derive(Debug, Clone, PartialEq)]
pub enum PlaybackCommand {
    Play,
    Stop,
    Request(PatternRequest),
    SetTempo(f64),
    SetSpeedRate(f64),
    Faster,
    Slower,
    SetSwing(u8),
    SetPreRoll(u8),
    SetMetronome(bool),
    SetMuted(InstrumentGroup, bool),
    Status,
    Shutdown,
}

/// Point-in-time view of the session
#[derive(Debug, Clone, PartialEq)]
pub struct StatusSnapshot {
    pub playing: bool,
    pub step: i32,
    pub active: Option<String>,
    pub pending: Option<String>,
    pub settings: PlaybackSettings,
}

/// A scheduled step with its intended audio time; consumers delay visual
/// effects by `time - now`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StepNotice {
    pub step: i32,
    pub time: f64,
}

/// What the driver reports back to its owner, one per command
#[derive(Debug, Clone, PartialEq)]
pub enum PlaybackEvent {
    Started,
    Stopped,
    PatternChange { label: String, transition: Transition },
    SettingsChanged(PlaybackSettings),
    Status(StatusSnapshot),
    Rejected(SessionError),
}

/// Destination for the driver's triggers
pub trait PlaybackSink: TriggerSink + Send {
    /// Transport stopped: discard anything queued but not yet sounding
    fn cancel_pending(&mut self) {}
}

impl PlaybackSink for SharedRenderer {
    fn cancel_pending(&mut self) {
        SharedRenderer::cancel_pending(self);
    }
}

impl PlaybackSink for Vec<ScheduledEvent> {}

/// Forwards triggers to the output sink and step notices to the step channel
struct DriverSink<'a> {
    output: &'a mut dyn PlaybackSink,
    steps: &'a Sender<StepNotice>,
}

impl TriggerSink for DriverSink<'_> {
    fn on_trigger(&mut self, instrument: Instrument, time: f64) {
        self.output.on_trigger(instrument, time);
    }

    fn on_metronome_tick(&mut self, accent: bool, time: f64) {
        self.output.on_metronome_tick(accent, time);
    }

    fn on_step(&mut self, step: i32, time: f64) {
        self.output.on_step(step, time);
        if let Err(TrySendError::Full(_)) = self.steps.try_send(StepNotice { step, time }) {
            trace!(step, "Step channel full, dropping step notice");
        }
    }
}

struct Driver {
    session: Session,
    clock: Arc<dyn AudioClock>,
    sink: Box<dyn PlaybackSink>,
    command_rx: Receiver<PlaybackCommand>,
    event_tx: Sender<PlaybackEvent>,
    step_tx: Sender<StepNotice>,
    tick_interval: Duration,
}

impl Driver {
    fn run(mut self) {
        let ticker = tick(self.tick_interval);
        loop {
            select! {
                recv(self.command_rx) -> msg => match msg {
                    Ok(cmd) => {
                        if !self.handle_command(cmd) {
                            break;
                        }
                    }
                    Err(_) => break,
                },
                recv(ticker) -> _ => self.tick(),
            }
        }
        self.session.stop();
        debug!("Playback driver exited");
    }

    fn tick(&mut self) {
        let now = self.clock.now();
        let mut sink = DriverSink {
            output: self.sink.as_mut(),
            steps: &self.step_tx,
        };
        let report = self.session.tick(now, &mut sink);
        if report.capped {
            warn!(now, "Scheduler fell behind; catching up over several ticks");
        }
    }

    /// Returns false on shutdown
    fn handle_command(&mut self, cmd: PlaybackCommand) -> bool {
        trace!(?cmd, "Playback command");
        let result = match cmd {
            PlaybackCommand::Shutdown => return false,
            PlaybackCommand::Play => self.session.play(self.clock.now()).map(|()| {
                // schedule the first window without waiting for the ticker
                self.tick();
                PlaybackEvent::Started
            }),
            PlaybackCommand::Stop => {
                self.session.stop();
                self.sink.cancel_pending();
                Ok(PlaybackEvent::Stopped)
            }
            PlaybackCommand::Request(request) => {
                self.session.request_change(request).map(|transition| PlaybackEvent::PatternChange {
                    label: self.current_label(),
                    transition,
                })
            }
            PlaybackCommand::SetTempo(bpm) => self.session.set_tempo(bpm).map(|()| self.settings_event()),
            PlaybackCommand::SetSpeedRate(rate) => {
                self.session.set_speed_rate(rate).map(|()| self.settings_event())
            }
            PlaybackCommand::Faster => {
                self.session.faster();
                Ok(self.settings_event())
            }
            PlaybackCommand::Slower => {
                self.session.slower();
                Ok(self.settings_event())
            }
            PlaybackCommand::SetSwing(percent) => self.session.set_swing(percent).map(|()| self.settings_event()),
            PlaybackCommand::SetPreRoll(beats) => self.session.set_pre_roll(beats).map(|()| self.settings_event()),
            PlaybackCommand::SetMetronome(on) => {
                self.session.set_metronome(on);
                Ok(self.settings_event())
            }
            PlaybackCommand::SetMuted(group, muted) => {
                self.session.set_muted(group, muted);
                Ok(self.settings_event())
            }
            PlaybackCommand::Status => Ok(PlaybackEvent::Status(self.snapshot())),
        };

        let event = result.unwrap_or_else(|e| {
            warn!(error = %e, "Rejected playback command");
            PlaybackEvent::Rejected(e)
        });
        // the owner may have stopped listening; keep running until Shutdown
        if let Err(e) = self.event_tx.send(event) {
            debug!(event = ?e.into_inner(), "No listener for playback reply");
        }
        true
    }

    /// Label of whatever plays next: the queued pattern, else the active one
    fn current_label(&self) -> String {
        self.session
            .pending_pattern()
            .or_else(|| self.session.active_pattern())
            .map(|p| p.label.clone())
            .unwrap_or_default()
    }

    fn settings_event(&self) -> PlaybackEvent {
        PlaybackEvent::SettingsChanged(*self.session.settings())
    }

    fn snapshot(&self) -> StatusSnapshot {
        StatusSnapshot {
            playing: self.session.is_playing(),
            step: self.session.current_step(),
            active: self.session.active_pattern().map(|p| p.label.clone()),
            pending: self.session.pending_pattern().map(|p| p.label.clone()),
            settings: *self.session.settings(),
        }
    }
}

/// Handle to a running playback driver thread
pub struct PlaybackEngine {
    command_tx: Sender<PlaybackCommand>,
    event_rx: Receiver<PlaybackEvent>,
    step_rx: Receiver<StepNotice>,
    thread: Option<JoinHandle<()>>,
}

impl PlaybackEngine {
    /// Move `session` onto a driver thread ticking every `tick_interval`
    pub fn spawn(
        session: Session,
        clock: Arc<dyn AudioClock>,
        sink: Box<dyn PlaybackSink>,
        tick_interval: Duration,
    ) -> Result<Self, PlaybackError> {
        let (command_tx, command_rx) = unbounded();
        let (event_tx, event_rx) = unbounded();
        let (step_tx, step_rx) = bounded(STEP_CAPACITY);

        let driver = Driver {
            session,
            clock,
            sink,
            command_rx,
            event_tx,
            step_tx,
            tick_interval,
        };
        let thread = thread::Builder::new()
            .name("backbeat-playback".into())
            .spawn(move || driver.run())
            .map_err(PlaybackError::Spawn)?;

        info!(tick_ms = tick_interval.as_millis() as u64, "Playback driver started");
        Ok(Self {
            command_tx,
            event_rx,
            step_rx,
            thread: Some(thread),
        })
    }

    pub fn send(&self, cmd: PlaybackCommand) -> Result<(), PlaybackError> {
        self.command_tx.send(cmd).map_err(|_| PlaybackError::Disconnected)
    }

    pub fn events(&self) -> &Receiver<PlaybackEvent> {
        &self.event_rx
    }

    /// Lossy feed of scheduled steps
    pub fn steps(&self) -> &Receiver<StepNotice> {
        &self.step_rx
    }

    /// Stop the driver and wait for its thread
    pub fn shutdown(mut self) -> Result<(), PlaybackError> {
        self.join()
    }

    fn join(&mut self) -> Result<(), PlaybackError> {
        let _ = self.command_tx.send(PlaybackCommand::Shutdown);
        match self.thread.take() {
            Some(handle) => handle.join().map_err(|_| PlaybackError::DriverPanicked),
            None => Ok(()),
        }
    }
}

impl Drop for PlaybackEngine {
    fn drop(&mut self) {
        let _ = self.join();
    }
}

/// Live playback on the default output device
pub struct RealtimePlayer {
    engine: PlaybackEngine,
    stream: RealtimeOutputStream,
}

impl RealtimePlayer {
    pub fn start(session: Session, gain: f32) -> Result<Self, PlaybackError> {
        let renderer = SharedRenderer::new(Renderer::new(44_100, gain));
        let callback_renderer = renderer.clone();
        let stream = RealtimeOutputStream::start(move |buffer, sample_rate, channels| {
            callback_renderer.render(buffer, sample_rate, channels);
        })?;
        renderer.with(|r| r.set_sample_rate(stream.sample_rate()));

        let tick_interval = Duration::from_millis(session_tick_ms(&session));
        let engine = PlaybackEngine::spawn(session, stream.clock(), Box::new(renderer), tick_interval)?;
        Ok(Self { engine, stream })
    }

    pub fn engine(&self) -> &PlaybackEngine {
        &self.engine
    }

    pub fn send(&self, cmd: PlaybackCommand) -> Result<(), PlaybackError> {
        self.engine.send(cmd)
    }

    pub fn events(&self) -> &Receiver<PlaybackEvent> {
        self.engine.events()
    }

    pub fn steps(&self) -> &Receiver<StepNotice> {
        self.engine.steps()
    }

    pub fn shutdown(self) -> Result<(), PlaybackError> {
        let Self { engine, stream } = self;
        let result = engine.shutdown();
        stream.stop();
        result
    }
}

fn session_tick_ms(session: &Session) -> u64 {
    session.engine_config().tick_interval_ms.max(1)
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::time::Instant;

    use backbeat_core::{EngineConfig, ManualClock, PatternLibrary};

    use super::*;

    /// Records everything the driver emits, visible to the test thread
    #[derive(Clone, Default)]
    struct Recorder {
        events: Arc<Mutex<Vec<ScheduledEvent>>>,
        cancels: Arc<Mutex<usize>>,
    }

    impl TriggerSink for Recorder {
        fn on_trigger(&mut self, instrument: Instrument, time: f64) {
            if let Ok(mut e) = self.events.lock() {
                e.push(ScheduledEvent::Trigger { instrument, time });
            }
        }

        fn on_metronome_tick(&mut self, accent: bool, time: f64) {
            if let Ok(mut e) = self.events.lock() {
                e.push(ScheduledEvent::Metronome { accent, time });
            }
        }
    }

    impl PlaybackSink for Recorder {
        fn cancel_pending(&mut self) {
            if let Ok(mut c) = self.cancels.lock() {
                *c += 1;
            }
        }
    }

    fn engine() -> (PlaybackEngine, Arc<ManualClock>, Recorder) {
        let session = Session::new(
            PatternLibrary::builtin(),
            EngineConfig::default(),
            fastrand::Rng::with_seed(5),
        );
        let clock = Arc::new(ManualClock::default());
        let recorder = Recorder::default();
        let engine = PlaybackEngine::spawn(
            session,
            clock.clone(),
            Box::new(recorder.clone()),
            Duration::from_millis(5),
        )
        .unwrap();
        (engine, clock, recorder)
    }

    fn wait_for<F>(engine: &PlaybackEngine, mut pred: F) -> Option<PlaybackEvent>
    where
        F: FnMut(&PlaybackEvent) -> bool,
    {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            if let Ok(event) = engine.events().recv_timeout(Duration::from_millis(50)) {
                if pred(&event) {
                    return Some(event);
                }
            }
        }
        None
    }

    #[test]
    fn test_play_schedules_first_window_immediately() {
        let (engine, _clock, recorder) = engine();
        engine.send(PlaybackCommand::Play).unwrap();
        assert!(wait_for(&engine, |e| *e == PlaybackEvent::Started).is_some());
        let events = recorder.events.lock().unwrap().clone();
        // step 0 of the money beat at the start margin
        assert!(events.contains(&ScheduledEvent::Trigger { instrument: Instrument::Kick, time: 0.05 }));
        engine.shutdown().unwrap();
    }

    #[test]
    fn test_clock_drives_steps() {
        let (engine, clock, _recorder) = engine();
        engine.send(PlaybackCommand::Play).unwrap();
        assert!(wait_for(&engine, |e| *e == PlaybackEvent::Started).is_some());
        clock.set(1.0);
        let deadline = Instant::now() + Duration::from_secs(5);
        let mut sixth = None;
        while sixth.is_none() && Instant::now() < deadline {
            if let Ok(notice) = engine.steps().recv_timeout(Duration::from_millis(50)) {
                sixth = Some(notice).filter(|n| n.step == 6);
            }
        }
        match sixth {
            Some(notice) => assert!((notice.time - 0.95).abs() < 1e-9),
            None => panic!("step 6 never scheduled"),
        }
        engine.shutdown().unwrap();
    }

    #[test]
    fn test_replies_survive_a_full_step_channel() {
        let (engine, clock, _recorder) = engine();
        engine.send(PlaybackCommand::Play).unwrap();
        assert!(wait_for(&engine, |e| *e == PlaybackEvent::Started).is_some());
        // far more steps than the step channel holds, none of them drained
        clock.set(STEP_CAPACITY as f64 * 0.5);
        let deadline = Instant::now() + Duration::from_secs(5);
        while engine.steps().len() < STEP_CAPACITY && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(5));
        }
        assert_eq!(engine.steps().len(), STEP_CAPACITY);

        engine.send(PlaybackCommand::Stop).unwrap();
        assert!(wait_for(&engine, |e| *e == PlaybackEvent::Stopped).is_some());
        engine.send(PlaybackCommand::SetTempo(1000.0)).unwrap();
        assert!(wait_for(&engine, |e| matches!(e, PlaybackEvent::Rejected(_))).is_some());
        engine.shutdown().unwrap();
    }

    #[test]
    fn test_invalid_command_is_rejected() {
        let (engine, _clock, _recorder) = engine();
        engine.send(PlaybackCommand::SetTempo(1000.0)).unwrap();
        let event = wait_for(&engine, |e| matches!(e, PlaybackEvent::Rejected(_)));
        assert_eq!(event, Some(PlaybackEvent::Rejected(SessionError::InvalidTempo(1000.0))));
        engine.send(PlaybackCommand::SetSwing(20)).unwrap();
        let event = wait_for(&engine, |e| matches!(e, PlaybackEvent::SettingsChanged(_)));
        assert!(matches!(event, Some(PlaybackEvent::SettingsChanged(s)) if s.swing.percent() == 20));
    }

    #[test]
    fn test_stop_cancels_sink_and_reports_status() {
        let (engine, _clock, recorder) = engine();
        engine.send(PlaybackCommand::Play).unwrap();
        engine.send(PlaybackCommand::Stop).unwrap();
        assert!(wait_for(&engine, |e| *e == PlaybackEvent::Stopped).is_some());
        assert_eq!(*recorder.cancels.lock().unwrap(), 1);

        engine
            .send(PlaybackCommand::Request(PatternRequest::Select("p_3".into())))
            .unwrap();
        let change = wait_for(&engine, |e| matches!(e, PlaybackEvent::PatternChange { .. }));
        assert!(matches!(
            change,
            Some(PlaybackEvent::PatternChange { transition: Transition::Immediate, .. })
        ));

        engine.send(PlaybackCommand::Status).unwrap();
        match wait_for(&engine, |e| matches!(e, PlaybackEvent::Status(_))) {
            Some(PlaybackEvent::Status(status)) => {
                assert!(!status.playing);
                assert_eq!(status.step, 0);
                let expected = PatternLibrary::builtin().get("p_3").unwrap().label.clone();
                assert_eq!(status.active, Some(expected));
                assert_eq!(status.pending, None);
            }
            other => panic!("expected status, got {other:?}"),
        }
    }

    #[test]
    fn test_send_after_shutdown_fails() {
        let (engine, _clock, _recorder) = engine();
        let tx = engine.command_tx.clone();
        engine.shutdown().unwrap();
        assert!(tx.send(PlaybackCommand::Play).is_err());
    }
}
