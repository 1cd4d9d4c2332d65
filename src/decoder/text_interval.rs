//! Textual-interval extractor for markup schedules
//!
//! The page text is split into one chunk per group token ("Група 3.2 ...").
//! A chunk ends at the next group token or at the end of its line, whichever
//! comes first; each block element of the page is one line. In every chunk
//! that mentions an outage, each `HH:MM <connector> HH:MM` interval marks its
//! slots `off`; all other slots are `on`. The document
//! date is the first `DD.MM.YYYY` shortly after an anchor phrase, and the
//! as-of time comes from its own pattern. All patterns are configurable.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, NaiveTime};
use chrono_tz::Tz;
use regex::Regex;
use scraper::Html;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::ScheduleDecoder;
use crate::fetch::Artifact;
use crate::metadata::{find_date, SourceMetadata};
use crate::models::{
    is_valid_group_code, slot_index, DaySlots, DecodedSchedule, TimeSlot, HOURS_PER_DAY,
    SLOTS_PER_DAY,
};
use crate::utils::error::DecodeError;
use crate::utils::normalize_whitespace;

/// Resolution at which intervals are applied
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Granularity {
    /// Exact half-hour slots
    #[default]
    HalfHour,
    /// Whole hours: an interval ending at `HH:MM` with `MM > 0` covers hour
    /// `HH`; the 24 hourly values are then expanded to 48 slots
    Hourly,
}

/// Per-source text patterns
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TextPatterns {
    /// Group token; capture 1 is the group code
    pub group_token: String,

    /// Interval; captures 1-4 are start hour, start minute, end hour, end minute.
    /// Alternatives may repeat the four captures (5-8, ...); the first set
    /// that participates in a match is used.
    pub interval: String,

    /// A chunk mentioning none of these has no outages (empty = always extract)
    pub outage_keywords: Vec<String>,

    /// Phrases the document date follows (empty = first date anywhere)
    pub date_anchors: Vec<String>,

    /// How many characters after an anchor the date may start
    pub date_window: usize,

    /// As-of time; captures 1-2 are hour and minute
    pub as_of: String,

    pub granularity: Granularity,
}

impl Default for TextPatterns {
    fn default() -> Self {
        Self {
            group_token: r"(?i)(?:група|черга|group)\s+(\d+(?:\.\d+)?)".to_string(),
            // "по" also joins date ranges ("з 14.03 по 15.03"), so it needs colons
            interval: concat!(
                r"(?i)(\d{1,2})[:.](\d{2})\s*(?:to|до|-|–|—)\s*(\d{1,2})[:.](\d{2})",
                r"|(\d{1,2}):(\d{2})\s*по\s*(\d{1,2}):(\d{2})",
            )
            .to_string(),
            outage_keywords: [
                "відключ",
                "знеструм",
                "немає",
                "не буде",
                "відсутн",
                "unavailable",
                "outage",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            date_anchors: [
                "графік погодинних відключень на",
                "графік відключень на",
                "schedule for",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            date_window: 40,
            as_of: r"(?i)(?:станом на|оновлено|as of|updated)[^0-9]{0,12}(?:\d{2}\.\d{2}\.\d{4}[^0-9]{0,12})?(\d{1,2})[:.](\d{2})"
                .to_string(),
            granularity: Granularity::HalfHour,
        }
    }
}

/// What a markup page yields before the date fallback
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedText {
    pub metadata: SourceMetadata,
    pub per_group: BTreeMap<String, DaySlots>,
}

/// Decoder for markup sources
#[derive(Debug, Clone)]
pub struct TextIntervalDecoder {
    group_re: Regex,
    interval_re: Regex,
    as_of_re: Regex,
    anchors: Vec<Regex>,
    keywords: Vec<String>,
    date_window: usize,
    granularity: Granularity,
}

fn compile(pattern: &str, captures: usize) -> Result<Regex, DecodeError> {
    let re = Regex::new(pattern).map_err(|e| DecodeError::pattern(pattern, e))?;
    if re.captures_len() < captures + 1 {
        return Err(DecodeError::pattern(
            pattern,
            format!("expected at least {captures} capture groups"),
        ));
    }
    Ok(re)
}

impl TextIntervalDecoder {
    /// Compile the patterns
    ///
    /// # Errors
    ///
    /// Returns `DecodeError::Pattern` for invalid regexes or missing captures
    pub fn new(patterns: &TextPatterns) -> Result<Self, DecodeError> {
        let anchors = patterns
            .date_anchors
            .iter()
            .map(|anchor| {
                let pattern = format!("(?i){}", regex::escape(anchor));
                compile(&pattern, 0)
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            group_re: compile(&patterns.group_token, 1)?,
            interval_re: compile(&patterns.interval, 4)?,
            as_of_re: compile(&patterns.as_of, 2)?,
            anchors,
            keywords: patterns
                .outage_keywords
                .iter()
                .map(|k| k.to_lowercase())
                .collect(),
            date_window: patterns.date_window,
            granularity: patterns.granularity,
        })
    }

    /// Visible text of a page, one line per run of text inside a block element
    ///
    /// Inline markup (`<b>`, `<span>`, ...) stays on its block's line. Script,
    /// style and template content is skipped.
    pub fn extract_text(html: &str) -> String {
        let document = Html::parse_document(html);
        let mut lines: Vec<String> = Vec::new();
        let mut current_block = None;

        for node in document.root_element().descendants() {
            let Some(text) = node.value().as_text() else {
                continue;
            };

            let hidden = node.ancestors().any(|ancestor| {
                ancestor.value().as_element().is_some_and(|el| {
                    matches!(el.name(), "script" | "style" | "noscript" | "template")
                })
            });
            if hidden {
                continue;
            }

            let piece = normalize_whitespace(&clean_invisible(text));
            if piece.is_empty() {
                continue;
            }

            let block = node
                .ancestors()
                .find(|ancestor| ancestor.value().as_element().is_some_and(|el| is_block(el.name())))
                .map(|ancestor| ancestor.id());

            let same_block = block == current_block;
            current_block = block;

            if let Some(line) = lines.last_mut().filter(|_| same_block) {
                line.push(' ');
                line.push_str(&piece);
            } else {
                lines.push(piece);
            }
        }

        lines.join("\n")
    }

    /// Parse already-extracted plain text
    pub fn parse_text(&self, text: &str) -> ParsedText {
        let tokens: Vec<(usize, String)> = self
            .group_re
            .captures_iter(text)
            .filter_map(|caps| {
                let start = caps.get(0)?.start();
                let code = caps.get(1)?.as_str().to_string();
                Some((start, code))
            })
            .collect();

        let mut per_group = BTreeMap::new();
        for (i, (start, code)) in tokens.iter().enumerate() {
            if !is_valid_group_code(code) {
                debug!(group = %code, "Skipping malformed group code");
                continue;
            }
            if per_group.contains_key(code) {
                debug!(group = %code, "Duplicate group token; keeping first occurrence");
                continue;
            }

            let next_token = tokens.get(i + 1).map_or(text.len(), |(next, _)| *next);
            let line_end = text[*start..].find('\n').map_or(text.len(), |n| start + n);
            let chunk = &text[*start..next_token.min(line_end)];
            per_group.insert(code.clone(), self.decode_chunk(code, chunk));
        }

        ParsedText {
            metadata: SourceMetadata {
                date: self.find_document_date(text),
                as_of_time: self.find_as_of(text),
            },
            per_group,
        }
    }

    fn decode_chunk(&self, group: &str, chunk: &str) -> DaySlots {
        if !self.mentions_outage(chunk) {
            return DaySlots::all_on();
        }

        let intervals: Vec<Interval> = self
            .interval_re
            .captures_iter(chunk)
            .filter_map(|caps| {
                let [sh, sm, eh, em] = interval_fields(&caps)?;
                let parsed = Interval::parse(sh, sm, eh, em);
                if parsed.is_none() {
                    warn!(group = %group, interval = &caps[0], "Ignoring invalid interval");
                }
                parsed
            })
            .collect();

        match self.granularity {
            Granularity::HalfHour => {
                let mut slots = DaySlots::all_on();
                for interval in &intervals {
                    let (start, end) = interval.slot_range();
                    slots.fill_range(start, end, TimeSlot::Off);
                }
                slots
            }
            Granularity::Hourly => {
                let mut hours = [TimeSlot::On; HOURS_PER_DAY];
                for interval in &intervals {
                    let (start, end) = interval.hour_range();
                    for hour in &mut hours[start..end] {
                        *hour = TimeSlot::Off;
                    }
                }
                DaySlots::from_hourly(hours)
            }
        }
    }

    fn mentions_outage(&self, chunk: &str) -> bool {
        if self.keywords.is_empty() {
            return true;
        }
        let chunk = chunk.to_lowercase();
        self.keywords.iter().any(|k| chunk.contains(k.as_str()))
    }

    fn find_document_date(&self, text: &str) -> Option<NaiveDate> {
        if self.anchors.is_empty() {
            return find_date(text);
        }

        self.anchors.iter().find_map(|anchor| {
            anchor.find_iter(text).find_map(|m| {
                let window: String = text[m.end()..].chars().take(self.date_window).collect();
                find_date(&window)
            })
        })
    }

    fn find_as_of(&self, text: &str) -> Option<NaiveTime> {
        self.as_of_re.captures_iter(text).find_map(|caps| {
            let hour = caps[1].parse().ok()?;
            let minute = caps[2].parse().ok()?;
            NaiveTime::from_hms_opt(hour, minute, 0)
        })
    }
}

impl ScheduleDecoder for TextIntervalDecoder {
    fn name(&self) -> &'static str {
        "text_interval"
    }

    fn decode(
        &self,
        artifact: &Artifact,
        acquired_at: DateTime<Tz>,
    ) -> Result<DecodedSchedule, DecodeError> {
        let Artifact::Markup { html, .. } = artifact else {
            return Err(DecodeError::WrongArtifact {
                expected: "markup",
                actual: artifact.kind_name(),
            });
        };

        if html.trim().is_empty() {
            return Err(DecodeError::EmptyArtifact);
        }

        let text = Self::extract_text(html);
        let parsed = self.parse_text(&text);
        let date = parsed.metadata.date_or(&acquired_at);

        debug!(
            chars = text.len(),
            groups = parsed.per_group.len(),
            date = %date,
            as_of = ?parsed.metadata.as_of_time,
            "Markup schedule decoded"
        );

        Ok(DecodedSchedule {
            date,
            as_of_time: parsed.metadata.as_of_time,
            acquired_at,
            per_group: parsed.per_group,
        })
    }
}

/// Clock interval as written by the source
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Interval {
    start: (u32, u32),
    end: (u32, u32),
}

impl Interval {
    fn parse(sh: &str, sm: &str, eh: &str, em: &str) -> Option<Self> {
        let start = (sh.parse().ok()?, sm.parse().ok()?);
        let end = (eh.parse().ok()?, em.parse().ok()?);

        let start_ok = start.0 < 24 && start.1 < 60;
        let end_ok = (end.0 < 24 && end.1 < 60) || end == (24, 0);

        (start_ok && end_ok).then_some(Self { start, end })
    }

    /// Slots `[start, end)`; an end at or before the start runs to midnight
    fn slot_range(&self) -> (usize, usize) {
        let start = slot_index(self.start.0, self.start.1);
        let end = slot_index(self.end.0, self.end.1);
        if end <= start {
            (start, SLOTS_PER_DAY)
        } else {
            (start, end)
        }
    }

    /// Hours `[start, end)`; a partial final hour counts as a whole one
    fn hour_range(&self) -> (usize, usize) {
        let start = self.start.0 as usize;
        let end = (self.end.0 as usize + usize::from(self.end.1 > 0)).min(HOURS_PER_DAY);
        if end <= start {
            (start, HOURS_PER_DAY)
        } else {
            (start, end)
        }
    }
}

/// First capture set of four that took part in the match
fn interval_fields<'t>(caps: &regex::Captures<'t>) -> Option<[&'t str; 4]> {
    (1..caps.len()).step_by(4).find_map(|first| {
        let field = |i: usize| caps.get(first + i).map(|m| m.as_str());
        Some([field(0)?, field(1)?, field(2)?, field(3)?])
    })
}

fn is_block(name: &str) -> bool {
    matches!(
        name,
        "html"
            | "body"
            | "div"
            | "p"
            | "li"
            | "ul"
            | "ol"
            | "tr"
            | "table"
            | "tbody"
            | "thead"
            | "section"
            | "article"
            | "header"
            | "footer"
            | "main"
            | "h1"
            | "h2"
            | "h3"
            | "h4"
            | "h5"
            | "h6"
            | "blockquote"
            | "pre"
    )
}

/// Replace no-break spaces and drop zero-width characters
fn clean_invisible(text: &str) -> String {
    text.chars()
        .filter(|c| !matches!(c, '\u{200B}' | '\u{200C}' | '\u{200D}' | '\u{FEFF}'))
        .map(|c| if c == '\u{00A0}' { ' ' } else { c })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn decoder() -> TextIntervalDecoder {
        TextIntervalDecoder::new(&TextPatterns::default()).unwrap()
    }

    fn off_slots(slots: &DaySlots) -> Vec<usize> {
        (0..SLOTS_PER_DAY)
            .filter(|i| slots.get(*i) == Some(TimeSlot::Off))
            .collect()
    }

    #[test]
    fn test_interval_marks_half_hour_slots() {
        let parsed = decoder().parse_text("Group 2.1 power unavailable from 08:00 to 10:30");
        let slots = parsed.per_group["2.1"];

        assert_eq!(off_slots(&slots), (16..=20).collect::<Vec<_>>());
        assert_eq!(slots.count(TimeSlot::On), 43);
    }

    #[test]
    fn test_chunk_without_outage_is_all_on() {
        let parsed = decoder().parse_text("Група 1.1. Електроенергія є");
        assert_eq!(parsed.per_group["1.1"], DaySlots::all_on());
    }

    #[test]
    fn test_intervals_ignored_without_keyword() {
        let parsed = decoder().parse_text("Група 1.1 працює 08:00-17:00");
        assert_eq!(parsed.per_group["1.1"], DaySlots::all_on());
    }

    #[test]
    fn test_connectors_and_separators() {
        let text = "Група 3.2 відключення 06.00–07.30, 12:00 - 13:00 та 20:30 до 21:00";
        let slots = decoder().parse_text(text).per_group["3.2"];

        let mut expected: Vec<usize> = (12..15).collect();
        expected.extend(24..26);
        expected.push(41);
        assert_eq!(off_slots(&slots), expected);
    }

    #[test]
    fn test_interval_ending_at_midnight() {
        let slots = decoder()
            .parse_text("Група 4.1 немає з 22:00 до 00:00")
            .per_group["4.1"];
        assert_eq!(off_slots(&slots), (44..48).collect::<Vec<_>>());

        let slots = decoder()
            .parse_text("Група 4.2 немає з 23:00 до 24:00")
            .per_group["4.2"];
        assert_eq!(off_slots(&slots), vec![46, 47]);
    }

    #[test]
    fn test_invalid_interval_skipped() {
        let slots = decoder()
            .parse_text("Група 5.1 немає з 25:00 до 26:00, з 01:00 до 02:00")
            .per_group["5.1"];
        assert_eq!(off_slots(&slots), vec![2, 3]);
    }

    #[test]
    fn test_first_chunk_wins() {
        let parsed = decoder().parse_text(
            "Група 1.1 немає з 08:00 до 09:00\nГрупа 1.2 Електроенергія є\nГрупа 1.1 немає з 10:00 до 11:00",
        );
        assert_eq!(parsed.per_group.len(), 2);
        assert_eq!(off_slots(&parsed.per_group["1.1"]), vec![16, 17]);
    }

    #[test]
    fn test_chunk_ends_at_line() {
        let text = "Група 6.1 немає з 08:00 до 09:00\nГрупа 6.2 Електроенергія є\nУвага! Можливі відключення з 12:00 до 16:00";
        let parsed = decoder().parse_text(text);

        assert_eq!(off_slots(&parsed.per_group["6.1"]), vec![16, 17]);
        assert_eq!(parsed.per_group["6.2"], DaySlots::all_on());
    }

    #[test]
    fn test_trailing_notice_not_attributed_to_last_group() {
        let html = r#"<body>
            <div>Група 6.1. Електроенергії <b>немає</b> з 08:00 до 09:00.</div>
            <div>Група 6.2. Електроенергія є.</div>
            <p>Увага! У разі аварій можливі відключення з 12:00 до 16:00.</p>
            </body>"#;

        let text = TextIntervalDecoder::extract_text(html);
        assert_eq!(text.lines().count(), 3);

        let parsed = decoder().parse_text(&text);
        assert_eq!(off_slots(&parsed.per_group["6.1"]), vec![16, 17]);
        assert_eq!(parsed.per_group["6.2"], DaySlots::all_on());
    }

    #[test]
    fn test_date_range_is_not_an_interval() {
        let slots = decoder()
            .parse_text("Група 3.1 відключення діють з 14.03 по 15.03")
            .per_group["3.1"];
        assert_eq!(slots, DaySlots::all_on());

        let slots = decoder()
            .parse_text("Група 3.1 відключення з 14:00 по 15:00")
            .per_group["3.1"];
        assert_eq!(off_slots(&slots), vec![28, 29]);
    }

    #[test]
    fn test_hourly_granularity() {
        let decoder = TextIntervalDecoder::new(&TextPatterns {
            granularity: Granularity::Hourly,
            outage_keywords: Vec::new(),
            ..TextPatterns::default()
        })
        .unwrap();

        let slots = decoder.parse_text("Група 2.2 08:00 до 10:30").per_group["2.2"];
        assert_eq!(off_slots(&slots), (16..22).collect::<Vec<_>>());
    }

    #[test]
    fn test_document_date_and_as_of() {
        let text = "Графік погодинних відключень на 15.03.2026\nСтаном на 07:40\nГрупа 1.1 Електроенергія є";
        let parsed = decoder().parse_text(text);

        assert_eq!(parsed.metadata.date, NaiveDate::from_ymd_opt(2026, 3, 15));
        assert_eq!(parsed.metadata.as_of_time, NaiveTime::from_hms_opt(7, 40, 0));
    }

    #[test]
    fn test_date_requires_anchor() {
        let parsed = decoder().parse_text("Новини від 01.03.2026\nГрупа 1.1 Електроенергія є");
        assert_eq!(parsed.metadata.date, None);

        let anywhere = TextIntervalDecoder::new(&TextPatterns {
            date_anchors: Vec::new(),
            ..TextPatterns::default()
        })
        .unwrap();
        let parsed = anywhere.parse_text("Новини від 01.03.2026");
        assert_eq!(parsed.metadata.date, NaiveDate::from_ymd_opt(2026, 3, 1));
    }

    #[test]
    fn test_extract_text_skips_scripts() {
        let html = r#"<html><head><style>p { color: red }</style>
            <script>var g = "Група 9.9 немає з 00:00 до 23:00";</script></head>
            <body><p>Група&nbsp;1.1 <b>немає</b> з 08:00 до 09:00</p></body></html>"#;

        let text = TextIntervalDecoder::extract_text(html);
        assert!(!text.contains("9.9"));
        assert!(!text.contains("color"));

        let parsed = decoder().parse_text(&text);
        assert_eq!(parsed.per_group.keys().collect::<Vec<_>>(), vec!["1.1"]);
        assert_eq!(off_slots(&parsed.per_group["1.1"]), vec![16, 17]);
    }

    #[test]
    fn test_decode_falls_back_to_acquisition_date() {
        let tz = chrono_tz::Europe::Kyiv;
        let acquired = tz.with_ymd_and_hms(2026, 3, 15, 9, 12, 0).unwrap();
        let artifact = Artifact::markup("<p>Група 1.1 Електроенергія є</p>", "https://x.ua/");

        let decoded = decoder().decode(&artifact, acquired).unwrap();
        assert_eq!(decoded.date, NaiveDate::from_ymd_opt(2026, 3, 15).unwrap());
        assert_eq!(decoded.as_of_time, None);
        assert_eq!(decoded.acquired_at, acquired);
    }

    #[test]
    fn test_invalid_pattern_rejected() {
        let result = TextIntervalDecoder::new(&TextPatterns {
            interval: r"(\d+):(\d+)".to_string(),
            ..TextPatterns::default()
        });
        assert!(matches!(result, Err(DecodeError::Pattern { .. })));

        let result = TextIntervalDecoder::new(&TextPatterns {
            group_token: "(".to_string(),
            ..TextPatterns::default()
        });
        assert!(matches!(result, Err(DecodeError::Pattern { .. })));
    }
}
