//! Still-image sequence capture
//!
//! Treats a directory of images as a video: files are played in name order
//! and decoded on read.

use super::{CaptureError, VideoCapture};
use crate::frame::Frame;
use std::path::{Path, PathBuf};

const EXTENSIONS: &[&str] = &["jpg", "jpeg", "png"];

pub struct ImageSequence {
    frames: Vec<PathBuf>,
    position: usize,
    opened: bool,
}

impl ImageSequence {
    pub fn open(dir: impl AsRef<Path>) -> Result<Self, CaptureError> {
        let dir = dir.as_ref();
        let open_err = |reason: String| CaptureError::Open {
            locator: dir.display().to_string(),
            reason,
        };

        let mut frames: Vec<PathBuf> = std::fs::read_dir(dir)
            .map_err(|e| open_err(e.to_string()))?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| path.is_file() && has_image_extension(path))
            .collect();
        frames.sort();

        if frames.is_empty() {
            return Err(open_err("no images found".to_string()));
        }

        log::debug!("Image sequence '{}': {} frames", dir.display(), frames.len());

        Ok(Self {
            frames,
            position: 0,
            opened: true,
        })
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}

fn has_image_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

impl VideoCapture for ImageSequence {
    fn is_opened(&self) -> bool {
        self.opened
    }

    fn read(&mut self) -> Result<Option<Frame>, CaptureError> {
        let Some(path) = self.frames.get(self.position) else {
            return Ok(None);
        };
        let img = image::open(path)
            .map_err(|e| CaptureError::Read(format!("{}: {}", path.display(), e)))?;
        self.position += 1;
        Ok(Some(Frame::from(img.to_rgb8())))
    }

    fn rewind(&mut self) -> Result<(), CaptureError> {
        self.position = 0;
        Ok(())
    }

    fn release(&mut self) {
        self.opened = false;
        self.frames.clear();
    }
}
