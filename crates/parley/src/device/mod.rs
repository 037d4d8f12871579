//! Audio device: one exclusive resource with two roles.
//!
//! Capture and playback share a single device. At most one role holds it at
//! a time:
//! - `Idle` → `Capturing` via `start_capture()` (preempts any playback)
//! - `Idle` → `Playing` via `play()`
//! - `Playing` → `Playing` via `play()` (stops the prior narration first)
//! - `Capturing` → `Idle` via `stop_capture()`
//! - `play()` while `Capturing` fails with `DeviceBusy`
//!
//! Platform specifics live behind [`AudioBackend`].

mod file;

use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;

use crate::error::DeviceError;
use crate::turn::AudioRef;

pub use file::FileAudioBackend;

/// Platform audio I/O. Implementations do not arbitrate between roles;
/// [`AudioDevice`] does.
#[async_trait]
pub trait AudioBackend: Send + Sync {
    /// Acquire the microphone.
    async fn start_capture(&self) -> Result<(), DeviceError>;

    /// Release the microphone and return everything recorded (empty if nothing was).
    async fn stop_capture(&self) -> Result<Vec<u8>, DeviceError>;

    /// Narrate `audio`. Resolves when playback finishes or is stopped.
    async fn play(&self, audio: &AudioRef) -> Result<(), DeviceError>;

    /// Interrupt current playback, if any.
    async fn stop_playback(&self);
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DeviceRole {
    #[default]
    Idle,
    Capturing,
    Playing,
}

#[derive(Debug, Default)]
struct Occupancy {
    role: DeviceRole,
    /// Bumped on every acquisition so a superseded playback cannot release
    /// the device out from under its successor.
    generation: u64,
}

impl Occupancy {
    fn acquire(&mut self, role: DeviceRole) -> u64 {
        self.generation += 1;
        self.role = role;
        self.generation
    }

    fn release(&mut self, role: DeviceRole, generation: u64) -> bool {
        if self.role == role && self.generation == generation {
            self.role = DeviceRole::Idle;
            true
        } else {
            false
        }
    }
}

pub struct AudioDevice {
    backend: Arc<dyn AudioBackend>,
    occupancy: Mutex<Occupancy>,
}

impl AudioDevice {
    pub fn new(backend: Arc<dyn AudioBackend>) -> Self {
        Self {
            backend,
            occupancy: Mutex::new(Occupancy::default()),
        }
    }

    fn occupancy(&self) -> MutexGuard<'_, Occupancy> {
        match self.occupancy.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                tracing::error!("Audio device mutex poisoned - recovering");
                poisoned.into_inner()
            }
        }
    }

    pub fn role(&self) -> DeviceRole {
        self.occupancy().role
    }

    pub fn is_capturing(&self) -> bool {
        self.role() == DeviceRole::Capturing
    }

    pub fn is_playing(&self) -> bool {
        self.role() == DeviceRole::Playing
    }

    /// Take the device for recording, interrupting narration if needed.
    pub async fn start_capture(&self) -> Result<(), DeviceError> {
        let (generation, interrupted) = {
            let mut occupancy = self.occupancy();
            let interrupted = match occupancy.role {
                DeviceRole::Capturing => return Err(DeviceError::DeviceBusy),
                DeviceRole::Playing => true,
                DeviceRole::Idle => false,
            };
            (occupancy.acquire(DeviceRole::Capturing), interrupted)
        };

        if interrupted {
            tracing::debug!("Stopping narration to start capture");
            self.backend.stop_playback().await;
        }

        if let Err(e) = self.backend.start_capture().await {
            self.occupancy().release(DeviceRole::Capturing, generation);
            tracing::warn!(error = %e, "Capture start failed");
            return Err(e);
        }

        tracing::debug!("Capture started");
        Ok(())
    }

    /// Release the microphone. Returns no bytes if nothing was being captured.
    pub async fn stop_capture(&self) -> Result<Vec<u8>, DeviceError> {
        let generation = {
            let occupancy = self.occupancy();
            if occupancy.role != DeviceRole::Capturing {
                return Ok(Vec::new());
            }
            occupancy.generation
        };

        let result = self.backend.stop_capture().await;
        self.occupancy().release(DeviceRole::Capturing, generation);

        match &result {
            Ok(bytes) => tracing::debug!(bytes = bytes.len(), "Capture stopped"),
            Err(e) => tracing::warn!(error = %e, "Capture stop failed"),
        }
        result
    }

    /// Narrate `audio`, replacing any narration in progress.
    ///
    /// Resolves when this narration finishes or is superseded.
    pub async fn play(&self, audio: &AudioRef) -> Result<(), DeviceError> {
        let (generation, interrupted) = {
            let mut occupancy = self.occupancy();
            let interrupted = match occupancy.role {
                DeviceRole::Capturing => return Err(DeviceError::DeviceBusy),
                DeviceRole::Playing => true,
                DeviceRole::Idle => false,
            };
            (occupancy.acquire(DeviceRole::Playing), interrupted)
        };

        if interrupted {
            tracing::debug!(audio = %audio, "Replacing narration in progress");
            self.backend.stop_playback().await;
        }

        let result = self.backend.play(audio).await;
        self.occupancy().release(DeviceRole::Playing, generation);
        result
    }

    pub async fn stop_playback(&self) {
        let playing = self.is_playing();
        if playing {
            self.backend.stop_playback().await;
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::sync::Mutex as StdMutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use tokio::sync::Notify;

    use super::*;

    /// Scriptable backend shared with orchestrator tests.
    #[derive(Default)]
    pub(crate) struct MockBackend {
        pub recording: StdMutex<Vec<u8>>,
        pub start_error: StdMutex<Option<DeviceError>>,
        pub stop_error: StdMutex<Option<DeviceError>>,
        pub played: StdMutex<Vec<AudioRef>>,
        pub stops: AtomicUsize,
        pub capture_stops: AtomicUsize,
        /// When set, `play()` waits until `stop_playback()` is called.
        pub hold_playback: bool,
        /// When set, `start_capture()` waits for a notification.
        pub start_gate: Option<Arc<Notify>>,
        /// When set, `stop_capture()` waits for a notification.
        pub stop_gate: Option<Arc<Notify>>,
        playback_stopped: Notify,
    }

    impl MockBackend {
        pub fn with_recording(bytes: &[u8]) -> Self {
            let backend = Self::default();
            *backend.recording.lock().unwrap() = bytes.to_vec();
            backend
        }

        /// `play()` blocks until `stop_playback()` is called.
        pub fn holding_playback() -> Self {
            Self {
                hold_playback: true,
                ..Default::default()
            }
        }

        pub fn played(&self) -> Vec<AudioRef> {
            self.played.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl AudioBackend for MockBackend {
        async fn start_capture(&self) -> Result<(), DeviceError> {
            if let Some(gate) = &self.start_gate {
                gate.notified().await;
            }
            match self.start_error.lock().unwrap().take() {
                Some(e) => Err(e),
                None => Ok(()),
            }
        }

        async fn stop_capture(&self) -> Result<Vec<u8>, DeviceError> {
            self.capture_stops.fetch_add(1, Ordering::SeqCst);
            if let Some(gate) = &self.stop_gate {
                gate.notified().await;
            }
            if let Some(e) = self.stop_error.lock().unwrap().take() {
                return Err(e);
            }
            Ok(self.recording.lock().unwrap().clone())
        }

        async fn play(&self, audio: &AudioRef) -> Result<(), DeviceError> {
            self.played.lock().unwrap().push(audio.clone());
            if self.hold_playback {
                self.playback_stopped.notified().await;
            }
            Ok(())
        }

        async fn stop_playback(&self) {
            self.stops.fetch_add(1, Ordering::SeqCst);
            self.playback_stopped.notify_one();
        }
    }

    pub(crate) async fn wait_for(mut condition: impl FnMut() -> bool) {
        tokio::time::timeout(Duration::from_secs(1), async {
            while !condition() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("condition not reached in time");
    }

    #[tokio::test]
    async fn capture_round_trip_returns_recording() {
        let backend = Arc::new(MockBackend::with_recording(b"pcm"));
        let device = AudioDevice::new(backend);

        device.start_capture().await.unwrap();
        assert!(device.is_capturing());

        let bytes = device.stop_capture().await.unwrap();
        assert_eq!(bytes, b"pcm");
        assert_eq!(device.role(), DeviceRole::Idle);
    }

    #[tokio::test]
    async fn second_capture_is_busy() {
        let device = AudioDevice::new(Arc::new(MockBackend::default()));

        device.start_capture().await.unwrap();
        assert_eq!(device.start_capture().await, Err(DeviceError::DeviceBusy));
        assert!(device.is_capturing());
    }

    #[tokio::test]
    async fn failed_capture_start_leaves_device_idle() {
        let backend = MockBackend::default();
        *backend.start_error.lock().unwrap() = Some(DeviceError::PermissionDenied);
        let device = AudioDevice::new(Arc::new(backend));

        assert_eq!(
            device.start_capture().await,
            Err(DeviceError::PermissionDenied)
        );
        assert_eq!(device.role(), DeviceRole::Idle);
    }

    #[tokio::test]
    async fn stop_without_capture_returns_nothing() {
        let backend = Arc::new(MockBackend::with_recording(b"pcm"));
        let device = AudioDevice::new(backend);

        assert!(device.stop_capture().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn playback_is_refused_while_capturing() {
        let backend = Arc::new(MockBackend::default());
        let device = AudioDevice::new(Arc::clone(&backend) as Arc<dyn AudioBackend>);

        device.start_capture().await.unwrap();
        assert_eq!(
            device.play(&AudioRef::new("a1")).await,
            Err(DeviceError::DeviceBusy)
        );
        assert!(backend.played().is_empty());
    }

    #[tokio::test]
    async fn new_playback_replaces_previous() {
        let backend = Arc::new(MockBackend::holding_playback());
        let device = Arc::new(AudioDevice::new(
            Arc::clone(&backend) as Arc<dyn AudioBackend>
        ));

        let first = {
            let device = Arc::clone(&device);
            tokio::spawn(async move { device.play(&AudioRef::new("a1")).await })
        };
        wait_for(|| backend.played().len() == 1).await;
        assert!(device.is_playing());

        let second = {
            let device = Arc::clone(&device);
            tokio::spawn(async move { device.play(&AudioRef::new("a2")).await })
        };

        first.await.unwrap().unwrap();
        wait_for(|| backend.played().len() == 2).await;
        // The superseded narration must not release the device.
        assert!(device.is_playing());
        assert_eq!(backend.stops.load(Ordering::SeqCst), 1);

        device.stop_playback().await;
        second.await.unwrap().unwrap();
        assert_eq!(device.role(), DeviceRole::Idle);
    }

    #[tokio::test]
    async fn capture_interrupts_playback() {
        let backend = Arc::new(MockBackend::holding_playback());
        let device = Arc::new(AudioDevice::new(
            Arc::clone(&backend) as Arc<dyn AudioBackend>
        ));

        let narration = {
            let device = Arc::clone(&device);
            tokio::spawn(async move { device.play(&AudioRef::new("a1")).await })
        };
        wait_for(|| device.is_playing()).await;

        device.start_capture().await.unwrap();
        narration.await.unwrap().unwrap();

        assert!(device.is_capturing());
        assert_eq!(backend.stops.load(Ordering::SeqCst), 1);
    }
}
