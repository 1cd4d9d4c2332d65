//! Artifact decoders
//!
//! Each source format gets its own [`ScheduleDecoder`]:
//!
//! - [`pixel_grid::ImageScheduleDecoder`] samples a calibrated grid of an
//!   image and reads its caption by OCR
//! - [`text_interval::TextIntervalDecoder`] extracts outage intervals from a
//!   page's text
//!
//! Decoders are pure with respect to the artifact: the acquisition instant is
//! passed in and only used as the date fallback.

pub mod pixel_grid;
pub mod text_interval;

use std::sync::Arc;

use chrono::DateTime;
use chrono_tz::Tz;

use crate::fetch::Artifact;
use crate::models::DecodedSchedule;
use crate::utils::error::DecodeError;

pub use pixel_grid::{GridLayout, ImageScheduleDecoder, PixelGridDecoder};
pub use text_interval::{Granularity, TextIntervalDecoder, TextPatterns};

/// Maps a raw artifact to a schedule
pub trait ScheduleDecoder: Send + Sync {
    /// Short decoder name for logs
    fn name(&self) -> &'static str;

    /// Decode `artifact`, acquired at `acquired_at`
    ///
    /// An artifact without recognizable groups decodes to an empty schedule.
    fn decode(
        &self,
        artifact: &Artifact,
        acquired_at: DateTime<Tz>,
    ) -> Result<DecodedSchedule, DecodeError>;
}

/// Shared decoder handle
pub type SharedDecoder = Arc<dyn ScheduleDecoder>;
