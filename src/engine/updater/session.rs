//! Update Session
//!
//! Drives one device through check → classify → confirm → download →
//! upload. The session's busy states double as its lock: any call made
//! while it is checking, waiting for confirmation or flashing is refused.
//!
//! Entering `Downloading` from anywhere else runs the flash-start hooks;
//! leaving the flash states runs the flash-finish hooks. No other path
//! toggles them.

use std::sync::{Arc, Mutex, MutexGuard};

use tracing::{debug, info, warn};

use super::catalog::ReleaseFeed;
use super::confirm::ConfirmationGate;
use super::download::{proxied_url, FirmwareSource};
use super::error::{SessionError, UpdateError};
use super::selector::select_asset;
use super::signals::{NoopObserver, SessionObserver};
use super::state::{SessionSnapshot, SessionState, UpdateKind};
use super::upload::{ota_endpoint, UploadMetadata, UploadTransport};
use super::version::{compare_versions, is_known_version, UNKNOWN_VERSION};
use crate::engine::config::{Channel, Config};

/// Values the session consumes from its surroundings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSettings {
    pub device_url: String,
    pub architecture: String,
    pub local_version: Option<String>,
    pub channel: Channel,
    pub download_proxy_url: String,
}

impl SessionSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            device_url: config.device.url.clone(),
            architecture: config.device.architecture.clone().unwrap_or_default(),
            local_version: config.device.firmware_version.clone(),
            channel: config.update.channel,
            download_proxy_url: config.update.download_proxy_url.clone(),
        }
    }
}

pub struct UpdateSession {
    data: Mutex<SessionSnapshot>,
    settings: SessionSettings,
    catalog: Arc<dyn ReleaseFeed>,
    firmware: Arc<dyn FirmwareSource>,
    transport: Arc<dyn UploadTransport>,
    gate: Arc<ConfirmationGate>,
    observer: Arc<dyn SessionObserver>,
}

impl UpdateSession {
    pub fn new(
        settings: SessionSettings,
        catalog: Arc<dyn ReleaseFeed>,
        firmware: Arc<dyn FirmwareSource>,
        transport: Arc<dyn UploadTransport>,
    ) -> Self {
        Self {
            data: Mutex::new(SessionSnapshot::default()),
            settings,
            catalog,
            firmware,
            transport,
            gate: Arc::new(ConfirmationGate::new()),
            observer: Arc::new(NoopObserver),
        }
    }

    pub fn with_gate(mut self, gate: Arc<ConfirmationGate>) -> Self {
        self.gate = gate;
        self
    }

    pub fn with_observer(mut self, observer: Arc<dyn SessionObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn settings(&self) -> &SessionSettings {
        &self.settings
    }

    pub fn gate(&self) -> Arc<ConfirmationGate> {
        Arc::clone(&self.gate)
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.lock().clone()
    }

    pub fn state(&self) -> SessionState {
        self.lock().state
    }

    fn lock(&self) -> MutexGuard<'_, SessionSnapshot> {
        self.data.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Look for a new release and classify it against the device.
    ///
    /// Returns the state the check ended in; `Err` only when the call was
    /// refused and nothing changed.
    pub async fn check(&self) -> Result<SessionState, SessionError> {
        let local = self
            .settings
            .local_version
            .clone()
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| UNKNOWN_VERSION.to_string());

        let ((), _, guard) = self.begin(SessionState::Checking, |state| {
            if state.can_check() {
                Ok(())
            } else {
                Err(SessionError::Busy { state })
            }
        })?;
        let state = self.run_check(local).await;
        guard.disarm();
        Ok(state)
    }

    async fn run_check(&self, local: String) -> SessionState {
        self.lock().local_version = Some(local.clone());
        self.status("Fetching releases...");

        let architecture = self.settings.architecture.trim();
        if architecture.is_empty() {
            return self.fail(UpdateError::UnknownArchitecture);
        }

        let releases = match self.catalog.fetch_releases().await {
            Ok(releases) => releases,
            Err(e) => return self.fail(e.into()),
        };

        let selection = match select_asset(&releases, architecture, self.settings.channel) {
            Ok(selection) => selection,
            Err(e) => return self.fail(e.into()),
        };
        info!(firmware = %selection.asset.name, release = %selection.release.tag, "Using firmware");

        let remote = selection.release.tag.clone();
        let ordering = compare_versions(&local, &remote);
        {
            let mut data = self.lock();
            data.remote_version = Some(remote.clone());
            data.selected_asset = Some(selection.asset.clone());
            if is_known_version(&local) && is_known_version(&remote) {
                data.set_comparison(Some(ordering));
            }
        }

        let Some(kind) = UpdateKind::from_comparison(ordering) else {
            self.status(&format!("Up to date ({})", remote));
            self.set_state(SessionState::UpToDate);
            return SessionState::UpToDate;
        };

        let firmware_url =
            match proxied_url(&self.settings.download_proxy_url, &selection.asset.download_url) {
                Ok(url) => url,
                Err(e) => return self.fail(e.into()),
            };
        self.lock().firmware_url = Some(firmware_url);

        self.status(&available_message(kind, &remote));
        let state = SessionState::Available(kind);
        self.set_state(state);
        state
    }

    /// Ask for confirmation, then download and flash the selected firmware.
    ///
    /// Returns the state the install ended in: `Available` when declined,
    /// otherwise `Succeeded` or `Failed`. Dropping the future before then
    /// withdraws the question, or fails the flash if it had started.
    pub async fn request_install(&self) -> Result<SessionState, SessionError> {
        let (kind, before, guard) =
            self.begin(SessionState::AwaitingConfirmation, |state| match state {
                SessionState::Available(kind) => Ok(kind),
                state if state.is_busy() => Err(SessionError::Busy { state }),
                state => Err(SessionError::InvalidState {
                    operation: "install",
                    state,
                }),
            })?;
        let result = self.run_install(kind, before).await;
        guard.disarm();
        result
    }

    async fn run_install(
        &self,
        kind: UpdateKind,
        before: SessionSnapshot,
    ) -> Result<SessionState, SessionError> {
        let local = before.local_version.clone().unwrap_or_default();
        let remote = before.remote_version.clone().unwrap_or_default();

        let message = format!(
            "Are you sure to {} firmware {} to: {}?",
            kind.verb(),
            local,
            remote
        );
        let decision = match self.gate.request(&message) {
            Ok(decision) => decision,
            Err(e) => {
                self.set_state(before.state);
                return Err(e.into());
            }
        };
        self.observer.on_confirmation(&message);

        if !decision.wait().await {
            debug!("Install declined");
            self.status(&available_message(kind, &remote));
            self.set_state(before.state);
            return Ok(before.state);
        }

        let (Some(firmware_url), Some(asset)) = (before.firmware_url, before.selected_asset) else {
            return Ok(self.fail(UpdateError::NoAsset {
                architecture: self.settings.architecture.clone(),
                tag: remote,
                expected_suffix: super::selector::expected_suffix(&self.settings.architecture),
            }));
        };

        self.lock().progress_percent = 0;
        self.set_state(SessionState::Downloading);
        self.observer.on_progress(0);
        self.status("Downloading firmware...");

        let image = match self.firmware.fetch(&firmware_url).await {
            Ok(image) => image,
            Err(e) => return Ok(self.fail(e.into())),
        };
        info!(size = image.len(), "Firmware size");

        self.set_state(SessionState::Uploading);
        self.status("Uploading to device... DO NOT REBOOT.");

        let metadata = UploadMetadata {
            size: image.len(),
            firmware_name: asset.name.clone(),
        };
        let endpoint = ota_endpoint(&self.settings.device_url);
        let mut on_progress = |percent: u8| self.record_progress(percent);

        let outcome = self
            .transport
            .send(&endpoint, image.bytes, &metadata, &mut on_progress)
            .await;

        match outcome {
            Ok(()) => {
                self.record_progress(100);
                self.status("Update successful! Rebooting...");
                self.set_state(SessionState::Succeeded);
                Ok(SessionState::Succeeded)
            }
            Err(e) => Ok(self.fail(e.into())),
        }
    }

    /// Validate and enter `next` atomically, returning the data as it was
    /// and a guard that settles the session if the caller is dropped early
    fn begin<T, F>(
        &self,
        next: SessionState,
        validate: F,
    ) -> Result<(T, SessionSnapshot, Abandon<'_>), SessionError>
    where
        F: FnOnce(SessionState) -> Result<T, SessionError>,
    {
        let (accepted, before) = {
            let mut data = self.lock();
            let accepted = validate(data.state)?;
            let before = data.clone();
            if next == SessionState::Checking {
                *data = SessionSnapshot::default();
            }
            data.state = next;
            (accepted, before)
        };
        self.run_hooks(before.state, next);
        let guard = Abandon {
            session: self,
            resume: before.state,
            armed: true,
        };
        Ok((accepted, before, guard))
    }

    fn set_state(&self, next: SessionState) {
        let previous = {
            let mut data = self.lock();
            std::mem::replace(&mut data.state, next)
        };
        self.run_hooks(previous, next);
    }

    fn run_hooks(&self, previous: SessionState, next: SessionState) {
        debug!(from = %previous, to = %next, "Session transition");
        self.observer.on_state(next);
        if !previous.is_flashing() && next.is_flashing() {
            self.observer.on_flash_started();
        }
        if previous.is_flashing() && !next.is_flashing() {
            self.observer.on_flash_finished(next == SessionState::Succeeded);
        }
    }

    fn status(&self, message: &str) {
        self.lock().status = message.to_string();
        self.observer.on_status(message);
    }

    fn record_progress(&self, percent: u8) {
        let percent = percent.min(100);
        {
            let mut data = self.lock();
            if percent <= data.progress_percent && !(percent == 0 && data.progress_percent == 0) {
                return;
            }
            data.progress_percent = percent;
        }
        self.observer.on_progress(percent);
        if percent < 100 {
            self.status(&format!("Flashing: {}%", percent));
        }
    }

    fn fail(&self, error: UpdateError) -> SessionState {
        if error.during_flash() {
            warn!(error = %error, "Flash failed");
        } else {
            warn!(error = %error, "Update check failed");
        }
        self.lock().failure = Some(error.to_string());
        self.status(&error.to_string());
        self.set_state(SessionState::Failed);
        SessionState::Failed
    }
}

/// Settles a session whose operation future was dropped mid-flight.
///
/// A pending confirmation is withdrawn and the session returns to where the
/// install started. Any other busy state ends in `Failed`, which also runs
/// the flash-finish hooks.
struct Abandon<'a> {
    session: &'a UpdateSession,
    resume: SessionState,
    armed: bool,
}

impl Abandon<'_> {
    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for Abandon<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        match self.session.state() {
            SessionState::AwaitingConfirmation => {
                debug!("Confirmation abandoned");
                self.session.gate.cancel();
                self.session.set_state(self.resume);
            }
            state if state.is_busy() => {
                self.session.fail(UpdateError::Interrupted { state });
            }
            _ => {}
        }
    }
}

fn available_message(kind: UpdateKind, remote: &str) -> String {
    match kind.warning() {
        Some(warning) => format!("Available: {}. {}", remote, warning),
        None => format!("New update available: {}", remote),
    }
}
