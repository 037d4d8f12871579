//! File-backed audio for headless use.
//!
//! "Recording" hands back the bytes of a prerecorded clip; "playback" logs the
//! narration URL and completes immediately.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;

use super::AudioBackend;
use crate::error::DeviceError;
use crate::turn::AudioRef;

pub struct FileAudioBackend {
    source: Option<PathBuf>,
    capturing: AtomicBool,
}

impl FileAudioBackend {
    /// `source` is the clip returned by each capture. `None` disables capture.
    pub fn new(source: Option<PathBuf>) -> Self {
        Self {
            source,
            capturing: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl AudioBackend for FileAudioBackend {
    async fn start_capture(&self) -> Result<(), DeviceError> {
        let Some(ref source) = self.source else {
            return Err(DeviceError::Unavailable(
                "no capture source configured".to_string(),
            ));
        };

        let metadata = tokio::fs::metadata(source).await?;
        if !metadata.is_file() {
            return Err(DeviceError::Unavailable(format!(
                "{} is not a file",
                source.display()
            )));
        }

        if self.capturing.swap(true, Ordering::AcqRel) {
            return Err(DeviceError::DeviceBusy);
        }
        Ok(())
    }

    async fn stop_capture(&self) -> Result<Vec<u8>, DeviceError> {
        if !self.capturing.swap(false, Ordering::AcqRel) {
            return Ok(Vec::new());
        }
        match self.source {
            Some(ref source) => Ok(tokio::fs::read(source).await?),
            None => Ok(Vec::new()),
        }
    }

    async fn play(&self, audio: &AudioRef) -> Result<(), DeviceError> {
        tracing::info!(audio_url = %audio, "Narration available");
        Ok(())
    }

    async fn stop_playback(&self) {}
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[tokio::test]
    async fn capture_returns_clip_bytes() {
        let mut clip = tempfile::NamedTempFile::new().unwrap();
        clip.write_all(b"RIFF....WAVE").unwrap();

        let backend = FileAudioBackend::new(Some(clip.path().to_path_buf()));
        backend.start_capture().await.unwrap();
        assert_eq!(backend.stop_capture().await.unwrap(), b"RIFF....WAVE");
    }

    #[tokio::test]
    async fn capture_without_source_is_unavailable() {
        let backend = FileAudioBackend::new(None);
        assert!(matches!(
            backend.start_capture().await,
            Err(DeviceError::Unavailable(_))
        ));
    }

    #[tokio::test]
    async fn missing_clip_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FileAudioBackend::new(Some(dir.path().join("missing.wav")));
        assert!(matches!(
            backend.start_capture().await,
            Err(DeviceError::Unavailable(_))
        ));
    }

    #[tokio::test]
    async fn stop_without_start_returns_nothing() {
        let clip = tempfile::NamedTempFile::new().unwrap();
        let backend = FileAudioBackend::new(Some(clip.path().to_path_buf()));
        assert!(backend.stop_capture().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn double_start_is_busy() {
        let clip = tempfile::NamedTempFile::new().unwrap();
        let backend = FileAudioBackend::new(Some(clip.path().to_path_buf()));
        backend.start_capture().await.unwrap();
        assert_eq!(backend.start_capture().await, Err(DeviceError::DeviceBusy));
    }
}
