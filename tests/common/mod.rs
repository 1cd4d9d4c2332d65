//! Common test utilities

#![allow(dead_code)]

use std::io::Cursor;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use image::{ImageFormat, Rgb, RgbImage};

use svitlo::decoder::GridLayout;
use svitlo::fetch::resources::{AutomationResources, HttpResources, SessionIdentity};
use svitlo::fetch::session::PageSession;
use svitlo::metadata::ocr::TextRecognizer;
use svitlo::models::{DaySlots, TimeSlot, SLOTS_PER_DAY};
use svitlo::utils::clock::FixedClock;
use svitlo::utils::error::{FetchError, OcrError};

pub fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

/// Clock frozen at a Kyiv wall-clock time
pub fn kyiv_clock(year: i32, month: u32, day: u32, hour: u32, minute: u32) -> Arc<FixedClock> {
    Arc::new(FixedClock::at_local(
        chrono_tz::Europe::Kyiv,
        year,
        month,
        day,
        hour,
        minute,
    ))
}

/// Compact grid: upper table at (6, 20), lower table at (6, 60), 4px cells
pub fn small_layout() -> GridLayout {
    GridLayout {
        top_origin: (6.0, 20.0),
        bottom_origin: (6.0, 60.0),
        step: (4.0, 4.0),
        threshold: 160,
    }
}

/// Slots with `[start, end)` off and the rest on
pub fn outage(start: usize, end: usize) -> DaySlots {
    let mut slots = DaySlots::all_on();
    slots.fill_range(start, end, TimeSlot::Off);
    slots
}

/// PNG whose sample points reproduce `rows` (white = on, dark = off)
pub fn grid_png(layout: &GridLayout, rows: &[DaySlots], width: u32, height: u32) -> Vec<u8> {
    let mut img = RgbImage::from_pixel(width, height, Rgb([250, 250, 250]));

    for (row, slots) in rows.iter().enumerate() {
        for column in 0..SLOTS_PER_DAY {
            if slots.get(column) != Some(TimeSlot::Off) {
                continue;
            }
            if let Some((x, y)) = layout.sample_point(row, column) {
                if x < width && y < height {
                    img.put_pixel(x, y, Rgb([40, 40, 40]));
                }
            }
        }
    }

    encode_png(&img)
}

pub fn encode_png(img: &RgbImage) -> Vec<u8> {
    let mut out = Cursor::new(Vec::new());
    img.write_to(&mut out, ImageFormat::Png)
        .expect("PNG encoding should succeed");
    out.into_inner()
}

/// Recognizer returning a fixed reply
pub struct FakeRecognizer {
    reply: Option<String>,
    calls: Arc<AtomicUsize>,
}

impl FakeRecognizer {
    pub fn replying(text: &str) -> Self {
        Self {
            reply: Some(text.to_string()),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn failing() -> Self {
        Self {
            reply: None,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn calls(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.calls)
    }
}

impl TextRecognizer for FakeRecognizer {
    fn recognize(&self, png: &[u8]) -> Result<String, OcrError> {
        assert!(!png.is_empty(), "caption crop should be PNG-encoded");
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.reply
            .clone()
            .ok_or_else(|| OcrError::Engine("engine crashed".to_string()))
    }
}

/// Counts resource calls and delegates to [`HttpResources`]
#[derive(Default)]
pub struct CountingResources {
    inner: HttpResources,
    pub acquired: AtomicUsize,
    pub released: AtomicUsize,
    pub purged: AtomicUsize,
    pub cleared: AtomicUsize,
}

impl CountingResources {
    pub fn count(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AutomationResources for CountingResources {
    async fn acquire_session(
        &self,
        headless: bool,
        identity: &SessionIdentity,
    ) -> Result<Box<dyn PageSession>, FetchError> {
        self.acquired.fetch_add(1, Ordering::SeqCst);
        self.inner.acquire_session(headless, identity).await
    }

    async fn release(&self, session: Box<dyn PageSession>) {
        self.released.fetch_add(1, Ordering::SeqCst);
        self.inner.release(session).await;
    }

    async fn purge_stale_processes(&self) {
        self.purged.fetch_add(1, Ordering::SeqCst);
        self.inner.purge_stale_processes().await;
    }

    async fn clear_temp_artifacts(&self) {
        self.cleared.fetch_add(1, Ordering::SeqCst);
        self.inner.clear_temp_artifacts().await;
    }
}
