//! Frame post-processing.
//!
//! Turns a raw device frame into a display-ready RGB frame: orientation
//! correction, BGR to RGB conversion, and an aspect-preserving resize
//! into the target box. Failures here are soft faults: the frame is
//! dropped and the device is not considered unhealthy.

use crate::capture::{Frame, PixelFormat, RawFrame};
use image::imageops::{self, FilterType};
use image::RgbImage;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur while post-processing a frame.
#[derive(Debug, Clone, Error)]
pub enum ProcessError {
    #[error("frame has zero dimension ({width}x{height})")]
    EmptyFrame { width: u32, height: u32 },
    #[error("stride {stride} is smaller than a row of {row} bytes")]
    StrideTooSmall { stride: usize, row: usize },
    #[error("buffer too short: got {got} bytes, need {need}")]
    BufferTooShort { got: usize, need: usize },
}

/// Orientation correction for cameras mounted sideways or upside down.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Orientation {
    #[default]
    None,
    FlipHorizontal,
    FlipVertical,
    Rotate90,
    Rotate180,
    Rotate270,
}

/// Converts raw frames into sized RGB output frames.
#[derive(Debug, Clone)]
pub struct FrameProcessor {
    target_width: u32,
    target_height: u32,
    orientation: Orientation,
}

impl FrameProcessor {
    pub fn new(target_width: u32, target_height: u32, orientation: Orientation) -> Self {
        Self {
            target_width,
            target_height,
            orientation,
        }
    }

    /// Processes one raw frame.
    pub fn process(&self, raw: RawFrame, sequence: u64) -> Result<Frame, ProcessError> {
        let image = to_rgb_image(raw)?;

        let image = match self.orientation {
            Orientation::None => image,
            Orientation::FlipHorizontal => imageops::flip_horizontal(&image),
            Orientation::FlipVertical => imageops::flip_vertical(&image),
            Orientation::Rotate90 => imageops::rotate90(&image),
            Orientation::Rotate180 => imageops::rotate180(&image),
            Orientation::Rotate270 => imageops::rotate270(&image),
        };

        let (width, height) = fit_within(
            image.dimensions(),
            (self.target_width, self.target_height),
        );
        let image = if (width, height) == image.dimensions() {
            image
        } else {
            imageops::resize(&image, width, height, FilterType::Triangle)
        };

        Ok(Frame::new(image.into_raw(), width, height, sequence))
    }
}

/// Largest size with the source aspect ratio that fits the target box.
fn fit_within((width, height): (u32, u32), (max_w, max_h): (u32, u32)) -> (u32, u32) {
    let scale = (f64::from(max_w) / f64::from(width)).min(f64::from(max_h) / f64::from(height));
    let w = (f64::from(width) * scale).round().clamp(1.0, f64::from(max_w)) as u32;
    let h = (f64::from(height) * scale).round().clamp(1.0, f64::from(max_h)) as u32;
    (w, h)
}

/// Repacks a raw frame into a tight RGB buffer.
fn to_rgb_image(raw: RawFrame) -> Result<RgbImage, ProcessError> {
    let (width, height) = (raw.width(), raw.height());
    if width == 0 || height == 0 {
        return Err(ProcessError::EmptyFrame { width, height });
    }

    let row = width as usize * 3;
    let stride = raw.stride();
    if stride < row {
        return Err(ProcessError::StrideTooSmall { stride, row });
    }

    let need = stride * (height as usize - 1) + row;
    if raw.data().len() < need {
        return Err(ProcessError::BufferTooShort {
            got: raw.data().len(),
            need,
        });
    }

    let format = raw.format();
    let mut pixels = if stride == row {
        let mut data = raw.into_data();
        data.truncate(row * height as usize);
        data
    } else {
        raw.data()
            .chunks(stride)
            .take(height as usize)
            .flat_map(|line| &line[..row])
            .copied()
            .collect()
    };

    if format == PixelFormat::Bgr {
        for px in pixels.chunks_exact_mut(3) {
            px.swap(0, 2);
        }
    }

    RgbImage::from_raw(width, height, pixels).ok_or(ProcessError::BufferTooShort {
        got: 0,
        need: row * height as usize,
    })
}
