use std::sync::Arc;

use async_channel::Receiver;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};
use voicecast_protocol::EncryptionMode;

use crate::broadcast::BroadcastLink;
use crate::config::DispatchOptions;
use crate::connection::{DispatcherId, VoiceConnection};
use crate::dispatcher::handle::Command;
use crate::error::{DispatchError, StreamError};
use crate::events::{DispatchEvent, EventEmitter};
use crate::network::Transport;
use crate::scheduler::{FrameScheduler, WakeHandle};
use crate::session::{DispatchSession, PauseKind};
use crate::source::{EncoderControl, Frame, FrameSource, SilenceSource};
use crate::speaking::SpeakingTracker;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Playing,
    /// Source ended; sending trailing silence.
    Finishing { remaining: u32 },
    Destroyed,
}

enum Pulled {
    Frame(Frame),
    Failed(StreamError),
    Ended,
    ClockStopped,
}

enum Step {
    /// `true` when teardown was requested, `false` once every handle is gone.
    Shutdown(bool),
    Command(Option<Command>),
    Pulled(Pulled),
    Idle,
}

/// Owns one outbound stream and drives it frame by frame.
pub(crate) struct DispatchEngine<S: FrameSource, T: Transport> {
    id: DispatcherId,
    session: DispatchSession,
    phase: Phase,
    source: Option<S>,
    silence: SilenceSource,
    transport: T,
    connection: Arc<dyn VoiceConnection>,
    broadcast: Option<Arc<dyn BroadcastLink>>,
    speaking: SpeakingTracker,
    events: EventEmitter,
    status: watch::Sender<DispatchSession>,
    shutdown: watch::Receiver<bool>,
    options: DispatchOptions,
}

impl<S: FrameSource, T: Transport> DispatchEngine<S, T> {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        id: DispatcherId,
        source: S,
        transport: T,
        connection: Arc<dyn VoiceConnection>,
        broadcast: Option<Arc<dyn BroadcastLink>>,
        events: EventEmitter,
        shutdown: watch::Receiver<bool>,
        options: DispatchOptions,
    ) -> Self {
        let (status, _) = watch::channel(DispatchSession::new());

        Self {
            id,
            session: DispatchSession::new(),
            phase: Phase::Playing,
            source: Some(source),
            silence: SilenceSource,
            transport,
            connection,
            broadcast,
            speaking: SpeakingTracker::new(),
            events,
            status,
            shutdown,
            options,
        }
    }

    pub(crate) fn status(&self) -> watch::Receiver<DispatchSession> {
        self.status.subscribe()
    }

    #[cfg(test)]
    pub(crate) fn session(&self) -> &DispatchSession {
        &self.session
    }

    /// Runs until finished or destroyed. Returns an error only for a fatal
    /// stream failure while this dispatcher was the active one.
    pub(crate) async fn run(mut self, commands: Receiver<Command>) -> Result<(), DispatchError> {
        let ticks = self.broadcast.as_ref().map(|link| link.subscribe(self.id));
        let mut wake = WakeHandle::new();
        let mut commands_open = true;
        let mut shutdown_open = true;

        self.apply_options();
        info!("Dispatcher {} started", self.id);

        while self.phase != Phase::Destroyed {
            let wants_frame = self.wants_frame();
            if ticks.is_none() && wants_frame && !wake.is_armed() {
                if let Some(deadline) = FrameScheduler::next_deadline(&self.session, Instant::now()) {
                    wake.arm(deadline);
                }
            }
            let silent = self.is_silent();

            let step = tokio::select! {
                biased;
                requested = shutdown_requested(&mut self.shutdown), if shutdown_open => {
                    Step::Shutdown(requested)
                }
                command = commands.recv(), if commands_open => Step::Command(command.ok()),
                pulled = Self::pull(
                    &mut wake,
                    ticks.as_ref(),
                    &mut self.source,
                    &mut self.silence,
                    silent,
                ), if wants_frame => Step::Pulled(pulled),
                else => Step::Idle,
            };

            match step {
                Step::Shutdown(true) => self.destroy(),
                Step::Shutdown(false) => shutdown_open = false,
                Step::Command(Some(command)) => self.handle_command(command, &mut wake),
                Step::Command(None) => {
                    debug!("Dispatcher {} has no handles left", self.id);
                    commands_open = false;
                }
                Step::Pulled(Pulled::Frame(frame)) => self.on_frame(&frame).await,
                Step::Pulled(Pulled::Failed(error)) => return self.fail(error),
                Step::Pulled(Pulled::Ended) => self.on_end(),
                Step::Pulled(Pulled::ClockStopped) => {
                    self.events.debug("Broadcast clock stopped");
                    self.destroy();
                }
                // Hard-paused with nobody left to resume.
                Step::Idle => self.destroy(),
            }
        }

        Ok(())
    }

    async fn pull(
        wake: &mut WakeHandle,
        ticks: Option<&Receiver<()>>,
        source: &mut Option<S>,
        silence: &mut SilenceSource,
        silent: bool,
    ) -> Pulled {
        if let Some(ticks) = ticks {
            if ticks.recv().await.is_err() {
                return Pulled::ClockStopped;
            }
        } else {
            wake.fired().await;
        }

        if silent {
            return Pulled::Frame(silence.next_silence());
        }

        match source {
            Some(source) => match source.next_frame().await {
                Some(Ok(frame)) => Pulled::Frame(frame),
                Some(Err(error)) => Pulled::Failed(error),
                None => Pulled::Ended,
            },
            None => Pulled::Ended,
        }
    }

    fn wants_frame(&self) -> bool {
        self.phase != Phase::Destroyed
            && !matches!(self.session.paused, Some(p) if p.kind == PauseKind::Hard)
    }

    fn is_silent(&self) -> bool {
        matches!(self.phase, Phase::Finishing { .. })
            || matches!(self.session.paused, Some(p) if p.kind == PauseKind::Silent)
    }

    /// Seal and send one frame, then advance sequencing. A teardown request
    /// abandons a send stuck on a full transport.
    pub(crate) async fn dispatch_frame(&mut self, frame: &[u8]) {
        if self.session.start(Instant::now()) {
            info!("Dispatcher {} sending first frame", self.id);
            self.events.emit(DispatchEvent::Start);
        }

        if let Some(packet) = self.seal_frame(frame) {
            self.set_speaking(true);
            let sent = tokio::select! {
                biased;
                true = shutdown_requested(&mut self.shutdown) => None,
                result = self.transport.send(packet) => Some(result),
            };
            match sent {
                None => {
                    debug!("Dispatcher {} dropped an unsent packet on teardown", self.id);
                    self.destroy();
                    return;
                }
                Some(Err(e)) => {
                    warn!("Dispatcher {} failed to send a packet: {}", self.id, e);
                    self.set_speaking(false);
                    self.events.debug(format!("Failed to send a packet - {e}"));
                }
                Some(Ok(())) => {}
            }
        }

        self.session.advance();
        self.publish();
    }

    /// `None` when sending is suppressed or sealing failed.
    fn seal_frame(&mut self, frame: &[u8]) -> Option<Vec<u8>> {
        if !self.connection.is_active_dispatcher(self.id) {
            return None;
        }
        let context = self.connection.encryption()?;

        let lite_nonce = match context.mode() {
            EncryptionMode::Lite => self.session.next_lite_nonce(),
            EncryptionMode::Normal | EncryptionMode::Suffix => self.session.nonce_counter,
        };
        let header = self.session.header(context.ssrc());

        match context.seal(&header, lite_nonce, frame) {
            Ok(packet) => Some(packet),
            Err(e) => {
                warn!(
                    "Dispatcher {} dropped frame {}: {}",
                    self.id, self.session.sequence, e
                );
                self.events.emit(DispatchEvent::Error(e));
                None
            }
        }
    }

    async fn on_frame(&mut self, frame: &[u8]) {
        self.dispatch_frame(frame).await;

        if let Phase::Finishing { remaining } = self.phase {
            if remaining <= 1 {
                self.finish();
            } else {
                self.phase = Phase::Finishing {
                    remaining: remaining - 1,
                };
            }
        }
    }

    fn on_end(&mut self) {
        match self.options.trailing_silence_frames {
            0 => self.finish(),
            remaining => {
                debug!("Dispatcher {} source ended, sending {} silence frames", self.id, remaining);
                self.phase = Phase::Finishing { remaining };
            }
        }
    }

    fn finish(&mut self) {
        info!(
            "Dispatcher {} finished after {} frames",
            self.id, self.session.frame_count
        );
        self.set_speaking(false);
        self.events.emit(DispatchEvent::Finish);
        self.destroy();
    }

    /// Tags the failure, escalates it if this dispatcher is the active one,
    /// and tears down either way.
    fn fail(&mut self, error: StreamError) -> Result<(), DispatchError> {
        let active = self.connection.is_active_dispatcher(self.id);
        self.events.debug(format!("[{}] {}", error.stage, error.message));

        let result = if active {
            error!("Dispatcher {} stopped by {} error: {}", self.id, error.stage, error.message);
            self.events.emit(DispatchEvent::Exception(error.clone()));
            Err(DispatchError::Stream(error))
        } else {
            Ok(())
        };

        self.destroy();
        result
    }

    pub(crate) fn handle_command(&mut self, command: Command, wake: &mut WakeHandle) {
        match command {
            Command::Pause { silence } => self.pause(silence, wake),
            Command::Resume => self.resume(),
            Command::SetVolume { volume, reply } => {
                let _ = reply.send(self.set_volume(volume));
            }
            Command::SetBitrate {
                bits_per_second,
                reply,
            } => {
                let applied = self
                    .encoder()
                    .is_some_and(|encoder| encoder.set_bitrate(bits_per_second));
                let _ = reply.send(applied);
            }
            Command::SetFec { enabled, reply } => {
                let applied = self.encoder().is_some_and(|encoder| encoder.set_fec(enabled));
                let _ = reply.send(applied);
            }
            Command::SetPlp { percent, reply } => {
                let applied = self.encoder().is_some_and(|encoder| encoder.set_plp(percent));
                let _ = reply.send(applied);
            }
        }
    }

    fn pause(&mut self, silence: bool, wake: &mut WakeHandle) {
        let kind = if silence {
            PauseKind::Silent
        } else {
            PauseKind::Hard
        };
        if !self.session.pause(Instant::now(), kind) {
            return;
        }

        if kind == PauseKind::Hard {
            wake.cancel();
            self.set_speaking(false);
        }
        debug!("Dispatcher {} paused ({:?})", self.id, kind);
        self.publish();
    }

    fn resume(&mut self) {
        if let Some((kind, elapsed)) = self.session.resume(Instant::now()) {
            debug!(
                "Dispatcher {} resumed after {:?} ({:?} pause)",
                self.id, elapsed, kind
            );
            self.publish();
        }
    }

    fn set_volume(&mut self, volume: f64) -> bool {
        let Some(control) = self.source.as_mut().and_then(|source| source.volume()) else {
            return false;
        };
        let old = control.volume();
        if !control.set_volume(volume) {
            return false;
        }

        self.events.emit(DispatchEvent::VolumeChange { old, new: volume });
        true
    }

    fn encoder(&mut self) -> Option<&mut dyn EncoderControl> {
        self.source.as_mut().and_then(|source| source.encoder())
    }

    fn apply_options(&mut self) {
        let options = self.options.clone();

        if let Some(bits) = options.bitrate {
            if !self.encoder().is_some_and(|encoder| encoder.set_bitrate(bits)) {
                warn!("Dispatcher {} could not apply bitrate {}", self.id, bits);
            }
        }
        if let Some(enabled) = options.fec {
            if !self.encoder().is_some_and(|encoder| encoder.set_fec(enabled)) {
                warn!("Dispatcher {} could not apply FEC={}", self.id, enabled);
            }
        }
        if let Some(percent) = options.plp {
            if !self.encoder().is_some_and(|encoder| encoder.set_plp(percent)) {
                warn!("Dispatcher {} could not apply PLP={}%", self.id, percent);
            }
        }
        if (options.volume - 1.0).abs() > f64::EPSILON && !self.set_volume(options.volume) {
            warn!("Dispatcher {} could not apply volume {}", self.id, options.volume);
        }
    }

    fn set_speaking(&mut self, speaking: bool) {
        if self.speaking.set(speaking) {
            self.connection.set_speaking(speaking);
            self.events.emit(DispatchEvent::Speaking(speaking));
        }
    }

    /// Idempotent teardown: detach from connection and broadcast, release the source.
    pub(crate) fn destroy(&mut self) {
        if self.phase == Phase::Destroyed {
            return;
        }
        self.phase = Phase::Destroyed;

        self.set_speaking(false);
        self.connection.detach_dispatcher(self.id);
        if let Some(link) = self.broadcast.take() {
            link.remove_subscriber(self.id);
        }
        if let Some(mut source) = self.source.take() {
            source.dispose();
        }

        info!("Dispatcher {} destroyed", self.id);
        self.session.end(Instant::now());
        self.publish();
    }

    fn publish(&self) {
        self.status.send_replace(self.session.clone());
    }
}

/// Resolves with `true` once teardown is requested, or `false` when every
/// handle is gone and no request can arrive.
async fn shutdown_requested(shutdown: &mut watch::Receiver<bool>) -> bool {
    shutdown.wait_for(|stop| *stop).await.is_ok()
}

impl<S: FrameSource, T: Transport> Drop for DispatchEngine<S, T> {
    fn drop(&mut self) {
        self.destroy();
    }
}
