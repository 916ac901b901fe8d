//! Looping frame sources
//!
//! A [`FrameSource`] wraps a [`VideoCapture`] backend and hides the end of the
//! stream from its caller: exhausted streams are rewound, closed handles are
//! reopened from the original locator. Consecutive failures are bounded by a
//! [`RetryPolicy`] and end in a terminal [`SourceError`].

#[cfg(feature = "gstreamer")]
pub mod gst;
pub mod image_seq;

use crate::config::RetryPolicy;
use crate::frame::Frame;
use std::path::Path;
use thiserror::Error;

/// Errors raised by a capture backend
#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("Failed to open '{locator}': {reason}")]
    Open { locator: String, reason: String },
    #[error("Failed to read frame: {0}")]
    Read(String),
    #[error("Failed to rewind: {0}")]
    Rewind(String),
    #[error("Unsupported source '{0}'")]
    Unsupported(String),
}

/// Terminal frame source failures
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("Source '{locator}' unavailable after {attempts} attempts: {source}")]
    Unavailable {
        locator: String,
        attempts: u32,
        #[source]
        source: CaptureError,
    },
    #[error("Source '{locator}' produced no frames after {attempts} attempts")]
    NoFrames { locator: String, attempts: u32 },
}

/// A decoder handle over one media stream
pub trait VideoCapture: Send {
    /// Whether the handle can still be read from
    fn is_opened(&self) -> bool;

    /// Read the next frame; `Ok(None)` means the stream has no frame right now
    fn read(&mut self) -> Result<Option<Frame>, CaptureError>;

    /// Seek back to the first frame
    fn rewind(&mut self) -> Result<(), CaptureError>;

    /// Release the underlying resources
    fn release(&mut self);
}

/// Opens a capture for a locator
pub type CaptureOpener =
    Box<dyn Fn(&str) -> Result<Box<dyn VideoCapture>, CaptureError> + Send + Sync>;

/// Open the capture backend matching a locator.
///
/// Directories are read as image sequences; anything else needs the
/// `gstreamer` feature.
pub fn open_capture(locator: &str) -> Result<Box<dyn VideoCapture>, CaptureError> {
    if Path::new(locator).is_dir() {
        return Ok(Box::new(image_seq::ImageSequence::open(locator)?));
    }

    #[cfg(feature = "gstreamer")]
    {
        Ok(Box::new(gst::GstVideoCapture::open(locator)?))
    }

    #[cfg(not(feature = "gstreamer"))]
    {
        Err(CaptureError::Unsupported(format!(
            "{} (video sources require the 'gstreamer' feature)",
            locator
        )))
    }
}

/// Endless frame producer over a looping stream
pub struct FrameSource {
    locator: String,
    opener: CaptureOpener,
    policy: RetryPolicy,
    capture: Option<Box<dyn VideoCapture>>,
}

impl FrameSource {
    /// Open `locator` with the default backend selection
    pub fn open(locator: &str, policy: RetryPolicy) -> Result<Self, CaptureError> {
        Self::with_opener(locator, policy, Box::new(open_capture))
    }

    /// Open `locator` through a custom opener.
    ///
    /// The first open happens here; failing it fails construction.
    pub fn with_opener(
        locator: &str,
        policy: RetryPolicy,
        opener: CaptureOpener,
    ) -> Result<Self, CaptureError> {
        let capture = opener(locator)?;
        log::info!("Opened frame source '{}'", locator);
        Ok(Self {
            locator: locator.to_string(),
            opener,
            policy,
            capture: Some(capture),
        })
    }

    pub fn locator(&self) -> &str {
        &self.locator
    }

    /// Next frame of the stream, looping back to the start when it ends.
    ///
    /// A successful rewind is not a failure. An end of stream read straight
    /// after a rewind is, since the stream then has no frames at all.
    pub async fn next_frame(&mut self) -> Result<Frame, SourceError> {
        let mut failures: u32 = 0;
        let mut rewound = false;

        loop {
            if failures > 0 {
                if self.policy.exhausted(failures) {
                    return Err(self.give_up(failures));
                }
                let delay = self.policy.backoff(failures);
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
            }

            let read = match self.ensure_open() {
                Ok(capture) => capture.read(),
                Err(e) => {
                    failures += 1;
                    log::warn!(
                        "Reopening '{}' failed (attempt {}): {}",
                        self.locator,
                        failures,
                        e
                    );
                    if self.policy.exhausted(failures) {
                        return Err(SourceError::Unavailable {
                            locator: self.locator.clone(),
                            attempts: failures,
                            source: e,
                        });
                    }
                    continue;
                }
            };

            match read {
                Ok(Some(frame)) => return Ok(frame),
                Ok(None) => {
                    if rewound {
                        failures += 1;
                        log::debug!("No frames in '{}' after rewinding", self.locator);
                    } else {
                        log::debug!("End of '{}', rewinding", self.locator);
                    }
                    match self.rewind() {
                        Ok(()) => rewound = true,
                        Err(e) => {
                            failures += 1;
                            rewound = false;
                            log::warn!("{}; reopening '{}'", e, self.locator);
                            self.close();
                        }
                    }
                }
                Err(e) => {
                    failures += 1;
                    rewound = false;
                    log::warn!("{}; reopening '{}'", e, self.locator);
                    self.close();
                }
            }
        }
    }

    fn rewind(&mut self) -> Result<(), CaptureError> {
        match self.capture.as_mut() {
            Some(capture) => capture.rewind(),
            None => Ok(()),
        }
    }

    fn ensure_open(&mut self) -> Result<&mut Box<dyn VideoCapture>, CaptureError> {
        let closed = self.capture.as_ref().map_or(true, |c| !c.is_opened());
        if closed {
            self.close();
            log::info!("Reopening frame source '{}'", self.locator);
            self.capture = Some((self.opener)(&self.locator)?);
        }
        self.capture
            .as_mut()
            .ok_or_else(|| CaptureError::Open {
                locator: self.locator.clone(),
                reason: "capture missing after open".to_string(),
            })
    }

    fn give_up(&self, attempts: u32) -> SourceError {
        SourceError::NoFrames {
            locator: self.locator.clone(),
            attempts,
        }
    }

    fn close(&mut self) {
        if let Some(mut capture) = self.capture.take() {
            capture.release();
        }
    }
}

impl Drop for FrameSource {
    fn drop(&mut self) {
        self.close();
    }
}
