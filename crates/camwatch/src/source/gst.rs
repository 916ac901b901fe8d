//! GStreamer video capture
//!
//! Decodes a file or URI to RGB frames pulled synchronously from an appsink:
//!
//! ```text
//! filesrc location=... ! decodebin ! videoconvert ! video/x-raw,format=RGB ! appsink
//! uridecodebin uri=...             ! videoconvert ! video/x-raw,format=RGB ! appsink
//! ```

use super::{CaptureError, VideoCapture};
use crate::frame::Frame;
use gstreamer::prelude::*;

/// How long a single pull may block before the read reports no frame
const PULL_TIMEOUT_SECS: u64 = 5;

/// How long opening may wait for the pipeline to preroll
const PREROLL_TIMEOUT_SECS: u64 = 10;

pub struct GstVideoCapture {
    pipeline: gstreamer::Pipeline,
    sink: gstreamer_app::AppSink,
    opened: bool,
}

impl GstVideoCapture {
    pub fn open(locator: &str) -> Result<Self, CaptureError> {
        let open_err = |reason: String| CaptureError::Open {
            locator: locator.to_string(),
            reason,
        };

        if !gstreamer::INITIALIZED.load(std::sync::atomic::Ordering::Relaxed) {
            gstreamer::init().map_err(|e| open_err(e.to_string()))?;
        }

        let pipeline_desc = pipeline_description(locator);
        log::debug!("Creating pipeline: {}", pipeline_desc);

        let pipeline = gstreamer::parse::launch(&pipeline_desc)
            .map_err(|e| open_err(e.to_string()))?
            .dynamic_cast::<gstreamer::Pipeline>()
            .map_err(|_| open_err("failed to downcast pipeline".to_string()))?;

        let sink = pipeline
            .by_name("sink")
            .ok_or_else(|| open_err("appsink not found".to_string()))?
            .dynamic_cast::<gstreamer_app::AppSink>()
            .map_err(|_| open_err("failed to downcast appsink".to_string()))?;

        pipeline
            .set_state(gstreamer::State::Playing)
            .map_err(|e| open_err(e.to_string()))?;

        let (preroll, _, _) =
            pipeline.state(gstreamer::ClockTime::from_seconds(PREROLL_TIMEOUT_SECS));
        if let Err(e) = preroll {
            let _ = pipeline.set_state(gstreamer::State::Null);
            return Err(open_err(format!("pipeline failed to start: {}", e)));
        }

        Ok(Self {
            pipeline,
            sink,
            opened: true,
        })
    }

    /// Drain pending bus errors; any error closes the capture
    fn check_bus(&mut self) {
        let Some(bus) = self.pipeline.bus() else {
            return;
        };
        while let Some(msg) = bus.pop_filtered(&[gstreamer::MessageType::Error]) {
            if let gstreamer::MessageView::Error(err) = msg.view() {
                log::warn!("GStreamer error: {} ({:?})", err.error(), err.debug());
            }
            self.opened = false;
        }
    }
}

fn pipeline_description(locator: &str) -> String {
    let tail = "videoconvert ! video/x-raw,format=RGB ! \
                appsink name=sink sync=false max-buffers=1";
    if locator.contains("://") {
        format!("uridecodebin uri=\"{}\" ! {}", locator, tail)
    } else {
        format!("filesrc location=\"{}\" ! decodebin ! {}", locator, tail)
    }
}

fn sample_to_frame(sample: &gstreamer::Sample) -> Result<Frame, CaptureError> {
    let caps = sample
        .caps()
        .ok_or_else(|| CaptureError::Read("sample has no caps".to_string()))?;
    let info = gstreamer_video::VideoInfo::from_caps(caps)
        .map_err(|e| CaptureError::Read(e.to_string()))?;
    let buffer = sample
        .buffer()
        .ok_or_else(|| CaptureError::Read("sample has no buffer".to_string()))?;
    let map = buffer
        .map_readable()
        .map_err(|_| CaptureError::Read("buffer not readable".to_string()))?;

    let width = info.width();
    let height = info.height();
    let row = width as usize * 3;
    let stride = info.stride()[0] as usize;
    let src = map.as_slice();

    let mut data = Vec::with_capacity(row * height as usize);
    for y in 0..height as usize {
        let start = y * stride;
        let line = src
            .get(start..start + row)
            .ok_or_else(|| CaptureError::Read("short frame buffer".to_string()))?;
        data.extend_from_slice(line);
    }

    Ok(Frame::new(data, width, height))
}

impl VideoCapture for GstVideoCapture {
    fn is_opened(&self) -> bool {
        self.opened
    }

    fn read(&mut self) -> Result<Option<Frame>, CaptureError> {
        self.check_bus();
        if !self.opened {
            return Err(CaptureError::Read("pipeline reported an error".to_string()));
        }

        match self
            .sink
            .try_pull_sample(gstreamer::ClockTime::from_seconds(PULL_TIMEOUT_SECS))
        {
            Some(sample) => sample_to_frame(&sample).map(Some),
            None => Ok(None),
        }
    }

    fn rewind(&mut self) -> Result<(), CaptureError> {
        self.pipeline
            .seek_simple(
                gstreamer::SeekFlags::FLUSH | gstreamer::SeekFlags::KEY_UNIT,
                gstreamer::ClockTime::ZERO,
            )
            .map_err(|e| CaptureError::Rewind(e.to_string()))
    }

    fn release(&mut self) {
        if self.opened {
            let _ = self.pipeline.send_event(gstreamer::event::Eos::new());
        }
        let _ = self.pipeline.set_state(gstreamer::State::Null);
        self.opened = false;
    }
}

impl Drop for GstVideoCapture {
    fn drop(&mut self) {
        let _ = self.pipeline.set_state(gstreamer::State::Null);
    }
}
