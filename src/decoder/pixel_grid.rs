//! Pixel-grid classifier for image schedules
//!
//! The schedule image is two stacked tables of 24 half-hour columns with one
//! row per group. Columns 0-23 live in the upper table and 24-47 in the lower
//! one. Each cell is classified from a single sampled pixel:
//!
//! ```text
//! x = origin_x + (column % 24) * step_x
//! y = origin_y + row * step_y
//! ```
//!
//! where the origin is the upper or the lower table's. A cell is `on` when
//! the mean of the pixel's R, G and B is above the threshold, `off`
//! otherwise, and `unknown` when the coordinate falls outside the image.

use std::collections::BTreeMap;

use chrono::DateTime;
use chrono_tz::Tz;
use image::{DynamicImage, GenericImageView};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::ScheduleDecoder;
use crate::fetch::Artifact;
use crate::metadata::ocr::ImageMetadataReader;
use crate::models::{DaySlots, DecodedSchedule, TimeSlot, SLOTS_PER_DAY};
use crate::utils::error::DecodeError;

/// Calibration of one source's image layout
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GridLayout {
    /// Sample point of row 0, column 0 in the upper table
    pub top_origin: (f64, f64),

    /// Sample point of row 0, column 24 in the lower table
    pub bottom_origin: (f64, f64),

    /// Distance between neighbouring columns and rows
    pub step: (f64, f64),

    /// Brightness above which a cell is `on` (0-255)
    pub threshold: u8,
}

impl Default for GridLayout {
    fn default() -> Self {
        Self {
            top_origin: (205.0, 447.0),
            bottom_origin: (205.0, 1337.0),
            step: (66.0, 60.5),
            threshold: 160,
        }
    }
}

const COLUMNS_PER_TABLE: usize = SLOTS_PER_DAY / 2;

impl GridLayout {
    /// Sample coordinate of a cell, truncated toward zero
    ///
    /// `None` when either coordinate is negative or not finite.
    pub fn sample_point(&self, row: usize, column: usize) -> Option<(u32, u32)> {
        let (origin, local) = if column < COLUMNS_PER_TABLE {
            (self.top_origin, column)
        } else {
            (self.bottom_origin, column - COLUMNS_PER_TABLE)
        };

        let x = origin.0 + local as f64 * self.step.0;
        let y = origin.1 + row as f64 * self.step.1;

        if !x.is_finite() || !y.is_finite() || x < 0.0 || y < 0.0 {
            return None;
        }
        if x >= u32::MAX as f64 || y >= u32::MAX as f64 {
            return None;
        }

        Some((x.trunc() as u32, y.trunc() as u32))
    }

    /// Classify a pixel by mean brightness
    pub fn classify(&self, rgb: [u8; 3]) -> TimeSlot {
        let mean = (u16::from(rgb[0]) + u16::from(rgb[1]) + u16::from(rgb[2])) as f64 / 3.0;
        if mean > f64::from(self.threshold) {
            TimeSlot::On
        } else {
            TimeSlot::Off
        }
    }
}

/// Samples the grid of an already-decoded image
#[derive(Debug, Clone)]
pub struct PixelGridDecoder {
    layout: GridLayout,
    groups: Vec<String>,
}

impl PixelGridDecoder {
    /// `groups` maps grid rows to group codes, in row order
    pub fn new(layout: GridLayout, groups: Vec<String>) -> Self {
        Self { layout, groups }
    }

    pub fn layout(&self) -> &GridLayout {
        &self.layout
    }

    /// Decode encoded image bytes into an image
    pub fn load(bytes: &[u8]) -> Result<DynamicImage, DecodeError> {
        if bytes.is_empty() {
            return Err(DecodeError::EmptyArtifact);
        }
        Ok(image::load_from_memory(bytes)?)
    }

    /// Classify every cell of every configured row
    pub fn sample(&self, image: &DynamicImage) -> BTreeMap<String, DaySlots> {
        let (width, height) = image.dimensions();
        let mut per_group = BTreeMap::new();

        for (row, group) in self.groups.iter().enumerate() {
            let mut slots = DaySlots::default();

            for column in 0..SLOTS_PER_DAY {
                let state = match self.layout.sample_point(row, column) {
                    Some((x, y)) if x < width && y < height => {
                        let pixel = image.get_pixel(x, y);
                        self.layout.classify([pixel[0], pixel[1], pixel[2]])
                    }
                    _ => TimeSlot::Unknown,
                };
                slots.set(column, state);
            }

            per_group.insert(group.clone(), slots);
        }

        per_group
    }

    /// Decode and sample encoded image bytes
    pub fn decode_bytes(&self, bytes: &[u8]) -> Result<BTreeMap<String, DaySlots>, DecodeError> {
        let image = Self::load(bytes)?;
        Ok(self.sample(&image))
    }
}

/// Decoder for image sources: grid sampling plus caption recognition
pub struct ImageScheduleDecoder {
    grid: PixelGridDecoder,
    metadata: Option<ImageMetadataReader>,
}

impl ImageScheduleDecoder {
    pub fn new(grid: PixelGridDecoder, metadata: Option<ImageMetadataReader>) -> Self {
        Self { grid, metadata }
    }
}

impl ScheduleDecoder for ImageScheduleDecoder {
    fn name(&self) -> &'static str {
        "pixel_grid"
    }

    fn decode(
        &self,
        artifact: &Artifact,
        acquired_at: DateTime<Tz>,
    ) -> Result<DecodedSchedule, DecodeError> {
        let Artifact::Image { bytes, .. } = artifact else {
            return Err(DecodeError::WrongArtifact {
                expected: "image",
                actual: artifact.kind_name(),
            });
        };

        let image = PixelGridDecoder::load(bytes)?;
        let (width, height) = image.dimensions();
        let per_group = self.grid.sample(&image);

        let metadata = self
            .metadata
            .as_ref()
            .map(|reader| reader.read(&image))
            .unwrap_or_default();
        let date = metadata.date_or(&acquired_at);

        debug!(
            width = width,
            height = height,
            groups = per_group.len(),
            date = %date,
            as_of = ?metadata.as_of_time,
            "Image schedule decoded"
        );

        Ok(DecodedSchedule {
            date,
            as_of_time: metadata.as_of_time,
            acquired_at,
            per_group,
        })
    }
}
