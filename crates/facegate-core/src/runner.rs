//! Real-time driver for [`CaptureSession`].
//!
//! Each started capture runs as one tokio task that owns the countdown
//! ticker, the detection poller and the timeout deadline. All three are
//! locals of that task, so they are released together on every exit path:
//! terminal phase, cancel, handle drop, or runtime shutdown.

use crate::config::CaptureConfig;
use crate::detector::{Detector, DetectorError};
use crate::session::{CaptureError, CaptureSession, Millis, Phase, SessionStatus};
use crate::types::{Descriptor, Frame};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, Interval, MissedTickBehavior};

const COUNTDOWN_PERIOD: Duration = Duration::from_secs(1);
const EVENT_BUFFER: usize = 64;

type DetectResult = Result<Option<Frame>, DetectorError>;
type ForceReply = oneshot::Sender<Result<Descriptor, CaptureError>>;

/// Detector shared between consecutive sessions of one engine.
pub type SharedDetector = Arc<Mutex<Box<dyn Detector>>>;

enum SessionCommand {
    Cancel,
    ForceCapture { reply: ForceReply },
}

/// Starts capture sessions against one detector, at most one at a time.
pub struct CaptureEngine {
    detector: SharedDetector,
    busy: Arc<AtomicBool>,
}

impl CaptureEngine {
    pub fn new(detector: impl Detector + 'static) -> Self {
        let detector: Box<dyn Detector> = Box::new(detector);
        Self::from_shared(Arc::new(Mutex::new(detector)))
    }

    pub fn from_shared(detector: SharedDetector) -> Self {
        Self {
            detector,
            busy: Arc::new(AtomicBool::new(false)),
        }
    }

    /// True while a session task is alive.
    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    /// Start a session. Must be called from within a tokio runtime.
    ///
    /// Fails with [`CaptureError::SessionActive`] while another session
    /// from this engine is still running.
    pub fn start(&self, config: CaptureConfig) -> Result<CaptureHandle, CaptureError> {
        let mut session = CaptureSession::new(config)?;

        if self
            .busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(CaptureError::SessionActive);
        }
        let busy = BusyGuard(Arc::clone(&self.busy));

        let origin = Instant::now();
        session.start(0)?;

        let (cmd_tx, cmd_rx) = mpsc::channel(8);
        let (events_tx, first_events) = broadcast::channel(EVENT_BUFFER);
        let (status_tx, status_rx) = watch::channel(session.status());
        let (result_tx, result_rx) = oneshot::channel();

        let run = SessionRun {
            session,
            origin,
            detector: Arc::clone(&self.detector),
            events: events_tx.clone(),
            status: status_tx,
            _busy: busy,
        };
        tokio::spawn(run.drive(cmd_rx, result_tx));

        Ok(CaptureHandle {
            commands: cmd_tx,
            events: events_tx,
            status: status_rx,
            first_events: Some(first_events),
            result: Some(result_rx),
        })
    }
}

/// Caller-side handle to a running session. Dropping it cancels the session.
pub struct CaptureHandle {
    commands: mpsc::Sender<SessionCommand>,
    events: broadcast::Sender<SessionStatus>,
    status: watch::Receiver<SessionStatus>,
    /// Subscribed before the session task was spawned.
    first_events: Option<broadcast::Receiver<SessionStatus>>,
    result: Option<oneshot::Receiver<Result<Descriptor, CaptureError>>>,
}

impl CaptureHandle {
    /// Latest status snapshot.
    pub fn status(&self) -> SessionStatus {
        self.status.borrow().clone()
    }

    pub fn phase(&self) -> Phase {
        self.status.borrow().phase
    }

    /// Status changes in order. The first call sees every status since the
    /// session started; later calls see changes from the moment of the call.
    pub fn subscribe(&mut self) -> broadcast::Receiver<SessionStatus> {
        self.first_events
            .take()
            .unwrap_or_else(|| self.events.subscribe())
    }

    /// Latest-value view of the status, for renderers that only need the
    /// current state.
    pub fn watch(&self) -> watch::Receiver<SessionStatus> {
        self.status.clone()
    }

    /// Cloneable cancel/force/status access that does not keep the session
    /// alive once this handle is dropped.
    pub fn control(&self) -> SessionControl {
        SessionControl {
            commands: self.commands.downgrade(),
            status: self.status.clone(),
        }
    }

    /// Request cancellation. A session that already finished is left as is.
    pub async fn cancel(&self) {
        send_cancel(&self.commands).await;
    }

    /// Capture the face visible right now, ignoring the stability streak.
    pub async fn force_capture(&self) -> Result<Descriptor, CaptureError> {
        send_force(&self.commands, self.phase()).await
    }

    /// Wait for the session to end and take its descriptor.
    ///
    /// Only the first completed call observes the outcome; later calls fail
    /// with [`CaptureError::AlreadyConsumed`]. Dropping the future before it
    /// completes leaves the outcome in place.
    pub async fn result(&mut self) -> Result<Descriptor, CaptureError> {
        let rx = self.result.as_mut().ok_or(CaptureError::AlreadyConsumed)?;
        let outcome = rx.await;
        self.result = None;
        outcome.map_err(|_| CaptureError::ChannelClosed)?
    }
}

/// Detached control half of a [`CaptureHandle`].
#[derive(Clone)]
pub struct SessionControl {
    commands: mpsc::WeakSender<SessionCommand>,
    status: watch::Receiver<SessionStatus>,
}

impl SessionControl {
    pub fn status(&self) -> SessionStatus {
        self.status.borrow().clone()
    }

    pub fn phase(&self) -> Phase {
        self.status.borrow().phase
    }

    pub async fn cancel(&self) {
        match self.commands.upgrade() {
            Some(commands) => send_cancel(&commands).await,
            None => tracing::debug!("cancel requested after handle dropped"),
        }
    }

    pub async fn force_capture(&self) -> Result<Descriptor, CaptureError> {
        let commands = self
            .commands
            .upgrade()
            .ok_or_else(|| CaptureError::NotActive(self.phase()))?;
        send_force(&commands, self.phase()).await
    }
}

async fn send_cancel(commands: &mpsc::Sender<SessionCommand>) {
    if commands.send(SessionCommand::Cancel).await.is_err() {
        tracing::debug!("cancel requested after session ended");
    }
}

async fn send_force(
    commands: &mpsc::Sender<SessionCommand>,
    phase: Phase,
) -> Result<Descriptor, CaptureError> {
    let (reply, rx) = oneshot::channel();
    commands
        .send(SessionCommand::ForceCapture { reply })
        .await
        .map_err(|_| CaptureError::NotActive(phase))?;
    rx.await.map_err(|_| CaptureError::ChannelClosed)?
}

/// Clears the engine's busy flag when the session task ends, however it ends.
struct BusyGuard(Arc<AtomicBool>);

impl Drop for BusyGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// One outstanding detector call.
struct InFlight {
    handle: JoinHandle<DetectResult>,
    /// Set when the call was issued for a manual capture.
    forced: Option<ForceReply>,
}

struct SessionRun {
    session: CaptureSession,
    origin: Instant,
    detector: SharedDetector,
    events: broadcast::Sender<SessionStatus>,
    status: watch::Sender<SessionStatus>,
    _busy: BusyGuard,
}

impl SessionRun {
    async fn drive(
        mut self,
        mut commands: mpsc::Receiver<SessionCommand>,
        result_tx: oneshot::Sender<Result<Descriptor, CaptureError>>,
    ) {
        let mut countdown =
            tokio::time::interval_at(self.origin + COUNTDOWN_PERIOD, COUNTDOWN_PERIOD);
        countdown.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut poller: Option<Interval> = None;
        let mut deadline: Option<Instant> = None;
        let mut in_flight: Option<InFlight> = None;
        let mut pending_force: Option<ForceReply> = None;

        let mut last = self.session.status();
        let _ = self.events.send(last.clone());

        while !self.session.phase().is_terminal() {
            if poller.is_none() {
                if let (Some(since), Some(until)) =
                    (self.session.detecting_since(), self.session.detection_deadline())
                {
                    let period = Duration::from_millis(self.session.config().poll_interval_ms);
                    let mut interval = tokio::time::interval_at(self.at(since) + period, period);
                    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
                    poller = Some(interval);
                    deadline = Some(self.at(until));
                }
            }

            tokio::select! {
                _ = countdown.tick(), if self.session.phase() == Phase::Countdown => {
                    let now = self.now();
                    if let Some(remaining) = self.session.countdown_tick(now) {
                        tracing::debug!(remaining, "countdown");
                    }
                }
                _ = next_tick(&mut poller) => {
                    let now = self.now();
                    if in_flight.is_some() {
                        tracing::debug!("detector still busy, skipping poll");
                    } else if self.session.begin_poll(now) {
                        in_flight = Some(InFlight {
                            handle: self.spawn_detect(),
                            forced: None,
                        });
                    }
                }
                result = join_flight(&mut in_flight) => {
                    let now = self.now();
                    let forced = in_flight.take().and_then(|f| f.forced);
                    match forced {
                        Some(reply) => {
                            let _ = reply.send(self.session.force_capture(now, result));
                        }
                        None => {
                            self.session.complete_poll(now, result);
                        }
                    }
                    if let Some(reply) = pending_force.take() {
                        if self.session.phase().is_active() {
                            in_flight = Some(InFlight {
                                handle: self.spawn_detect(),
                                forced: Some(reply),
                            });
                        } else {
                            let _ = reply.send(self.session.take_descriptor());
                        }
                    }
                }
                _ = expire(deadline) => {
                    let now = self.now();
                    // Clamp so timer rounding can never leave the deadline unobserved.
                    let now = self.session.detection_deadline().map_or(now, |d| now.max(d));
                    self.session.check_timeout(now);
                }
                cmd = commands.recv() => match cmd {
                    Some(SessionCommand::Cancel) => {
                        self.session.cancel();
                    }
                    None => {
                        tracing::debug!("capture handle dropped");
                        self.session.cancel();
                    }
                    Some(SessionCommand::ForceCapture { reply }) => {
                        if !self.session.phase().is_active() {
                            let _ = reply.send(Err(CaptureError::NotActive(self.session.phase())));
                        } else if pending_force.is_some() {
                            let _ = reply.send(Err(CaptureError::ForcePending));
                        } else if let Some(flight) = in_flight.as_ref() {
                            if flight.forced.is_some() {
                                let _ = reply.send(Err(CaptureError::ForcePending));
                            } else {
                                pending_force = Some(reply);
                            }
                        } else {
                            in_flight = Some(InFlight {
                                handle: self.spawn_detect(),
                                forced: Some(reply),
                            });
                        }
                    }
                },
            }

            let status = self.session.status();
            if status != last {
                let _ = self.events.send(status.clone());
                self.status.send_replace(status.clone());
                last = status;
            }
        }

        // A detector call still running is abandoned; its result is dropped.
        if let Some(flight) = in_flight.take() {
            if let Some(reply) = flight.forced {
                let _ = reply.send(Err(CaptureError::NotActive(self.session.phase())));
            }
        }
        if let Some(reply) = pending_force.take() {
            let _ = reply.send(Err(CaptureError::NotActive(self.session.phase())));
        }

        tracing::info!(phase = %self.session.phase(), "capture session finished");
        let _ = result_tx.send(self.session.take_descriptor());
    }

    fn now(&self) -> Millis {
        Millis::try_from(self.origin.elapsed().as_millis()).unwrap_or(Millis::MAX)
    }

    fn at(&self, ms: Millis) -> Instant {
        self.origin + Duration::from_millis(ms)
    }

    /// Run one detector call on the blocking pool.
    fn spawn_detect(&self) -> JoinHandle<DetectResult> {
        let detector = Arc::clone(&self.detector);
        tokio::task::spawn_blocking(move || {
            // A panic in an earlier call does not make the detector unusable.
            let mut detector = detector.lock().unwrap_or_else(PoisonError::into_inner);
            detector.detect()
        })
    }
}

async fn next_tick(interval: &mut Option<Interval>) {
    match interval {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}

async fn join_flight(in_flight: &mut Option<InFlight>) -> DetectResult {
    match in_flight {
        Some(flight) => match (&mut flight.handle).await {
            Ok(result) => result,
            Err(e) => Err(DetectorError::Backend(format!("detector task failed: {e}"))),
        },
        None => std::future::pending().await,
    }
}

async fn expire(deadline: Option<Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}
