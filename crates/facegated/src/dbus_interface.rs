use facegate_core::{
    CaptureConfig, CaptureEngine, CaptureError, CaptureHandle, CaptureMode, CaptureSession,
    Profile, SessionControl, SessionStatus,
};
use std::str::FromStr;
use tokio::sync::{broadcast, Mutex};
use zbus::interface;
use zbus::object_server::SignalEmitter;

pub const BUS_NAME: &str = "io.facegate.Capture1";
pub const OBJECT_PATH: &str = "/io/facegate/Capture1";

/// D-Bus interface for the face-capture daemon.
///
/// Bus name: io.facegate.Capture1
/// Object path: /io/facegate/Capture1
pub struct CaptureService {
    engine: CaptureEngine,
    defaults: CaptureConfig,
    /// Most recent session; kept after it finishes so its descriptor can be taken.
    active: Mutex<Option<CaptureHandle>>,
}

impl CaptureService {
    pub fn new(engine: CaptureEngine, defaults: CaptureConfig) -> Self {
        Self {
            engine,
            defaults,
            active: Mutex::new(None),
        }
    }

    /// Session config for one `Start` call. Empty strings keep the daemon defaults.
    fn session_config(&self, mode: &str, profile: &str) -> Result<CaptureConfig, CaptureError> {
        let mut config = self.defaults.clone();
        if !mode.is_empty() {
            config.mode = CaptureMode::from_str(mode)?;
        }
        if !profile.is_empty() {
            config.profile = Profile::from_str(profile)?;
            config.thresholds = None;
        }
        Ok(config)
    }

    fn idle_status(&self) -> Result<SessionStatus, CaptureError> {
        Ok(CaptureSession::new(self.defaults.clone())?.status())
    }

    /// Start a session and keep its handle. The returned receiver sees every
    /// status of the new session, starting with the first.
    async fn begin(
        &self,
        mode: &str,
        profile: &str,
    ) -> Result<(SessionStatus, broadcast::Receiver<SessionStatus>), CaptureError> {
        let config = self.session_config(mode, profile)?;
        let mut active = self.active.lock().await;
        let mut handle = self.engine.start(config)?;
        let status = handle.status();
        let events = handle.subscribe();
        // Any previous handle belongs to a finished session; its unclaimed
        // descriptor is discarded here.
        *active = Some(handle);
        Ok((status, events))
    }

    /// Control half of the current session. The lock is released on return,
    /// so callers can await the session without blocking other requests.
    async fn control(&self) -> Option<SessionControl> {
        self.active.lock().await.as_ref().map(CaptureHandle::control)
    }
}

#[interface(name = "io.facegate.Capture1")]
impl CaptureService {
    /// Start a capture session. `mode` is "register" or "match", `profile`
    /// is "lenient" or "strict"; empty strings use the daemon defaults.
    ///
    /// Returns the initial status as JSON. Progress is reported through
    /// `StatusChanged`.
    async fn start(
        &self,
        mode: &str,
        profile: &str,
        #[zbus(signal_emitter)] emitter: SignalEmitter<'_>,
    ) -> zbus::fdo::Result<String> {
        tracing::info!(mode, profile, "start requested");
        let (status, events) = self.begin(mode, profile).await.map_err(to_fdo)?;
        tokio::spawn(forward_status(events, emitter.into_owned()));
        to_json(&status)
    }

    /// Cancel the running session. Returns false when nothing was running.
    async fn cancel(&self) -> zbus::fdo::Result<bool> {
        tracing::info!("cancel requested");
        let Some(control) = self.control().await else {
            return Ok(false);
        };
        if !control.phase().is_active() {
            return Ok(false);
        }
        control.cancel().await;
        Ok(true)
    }

    /// Capture whatever face is visible now, bypassing the stability streak.
    /// Returns the descriptor as a JSON array.
    async fn force_capture(&self) -> zbus::fdo::Result<String> {
        tracing::info!("manual capture requested");
        let control = self
            .control()
            .await
            .ok_or_else(|| zbus::fdo::Error::Failed("no capture session".into()))?;
        let descriptor = control.force_capture().await.map_err(to_fdo)?;
        to_json(&descriptor)
    }

    /// Take the descriptor of the finished session, once.
    async fn take_descriptor(&self) -> zbus::fdo::Result<String> {
        let mut active = self.active.lock().await;
        let handle = active
            .as_mut()
            .ok_or_else(|| zbus::fdo::Error::Failed("no capture session".into()))?;
        if !handle.phase().is_terminal() {
            return Err(to_fdo(CaptureError::NotFinished));
        }
        let descriptor = handle.result().await.map_err(to_fdo)?;
        to_json(&descriptor)
    }

    /// Status of the current or most recent session as JSON.
    async fn status(&self) -> zbus::fdo::Result<String> {
        let status = match self.control().await {
            Some(control) => control.status(),
            None => self.idle_status().map_err(to_fdo)?,
        };
        to_json(&status)
    }

    /// Emitted on every status change of a running session.
    #[zbus(signal)]
    async fn status_changed(emitter: &SignalEmitter<'_>, status: &str) -> zbus::Result<()>;
}

/// Relay session events to `StatusChanged` until the session ends.
async fn forward_status(
    mut events: broadcast::Receiver<SessionStatus>,
    emitter: SignalEmitter<'static>,
) {
    loop {
        match events.recv().await {
            Ok(status) => {
                let done = status.phase.is_terminal();
                match serde_json::to_string(&status) {
                    Ok(json) => {
                        if let Err(e) = CaptureService::status_changed(&emitter, &json).await {
                            tracing::warn!(error = %e, "failed to emit StatusChanged");
                        }
                    }
                    Err(e) => tracing::warn!(error = %e, "failed to encode status"),
                }
                if done {
                    break;
                }
            }
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "status listener lagged");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

fn to_fdo(e: CaptureError) -> zbus::fdo::Error {
    zbus::fdo::Error::Failed(e.to_string())
}

fn to_json<T: serde::Serialize>(value: &T) -> zbus::fdo::Result<String> {
    serde_json::to_string(value).map_err(|e| zbus::fdo::Error::Failed(e.to_string()))
}
