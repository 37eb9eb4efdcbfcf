// Progress parsing for yt-dlp's text output
//
// yt-dlp prints lines like:
//   [download]  45.0% of ~ 343.72MiB at  420.30KiB/s ETA 12:32 (frag 29/454)
//   [download] 100% of 10.00MiB in 00:00:03
// Older builds print integer percentages, newer ones one decimal.

use std::time::{Duration, Instant};

use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref MARKED_PERCENT_RE: Regex =
        Regex::new(r"\[download\]\s+(\d+(?:\.\d+)?)%").expect("valid progress regex");
    static ref BARE_PERCENT_RE: Regex =
        Regex::new(r"(\d+(?:\.\d+)?)%").expect("valid percent regex");
}

/// Extract the last percentage in a chunk of output.
///
/// Lines carrying the `[download]` marker take precedence over bare
/// percentages elsewhere in the chunk. Values above 100 are rejected.
pub fn parse_percent(chunk: &str) -> Option<f32> {
    let last_capture = |re: &Regex| {
        re.captures_iter(chunk)
            .filter_map(|caps| caps.get(1)?.as_str().parse::<f32>().ok())
            .filter(|p| (0.0..=100.0).contains(p))
            .last()
    };

    last_capture(&MARKED_PERCENT_RE).or_else(|| last_capture(&BARE_PERCENT_RE))
}

/// Throttled percentage extractor.
///
/// The only state is the instant of the last emission. 100% is never
/// throttled.
#[derive(Debug, Clone)]
pub struct ProgressParser {
    interval: Duration,
    last_emit: Option<Instant>,
}

impl ProgressParser {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_emit: None,
        }
    }

    pub fn feed(&mut self, chunk: &str) -> Option<f32> {
        self.feed_at(chunk, Instant::now())
    }

    /// Same as [`feed`](Self::feed) with an explicit clock reading
    pub fn feed_at(&mut self, chunk: &str, now: Instant) -> Option<f32> {
        let percent = parse_percent(chunk)?;

        let throttled = self
            .last_emit
            .is_some_and(|last| now.saturating_duration_since(last) < self.interval);
        if throttled && percent < 100.0 {
            return None;
        }

        self.last_emit = Some(now);
        Some(percent)
    }
}

impl Default for ProgressParser {
    fn default() -> Self {
        Self::new(Duration::from_millis(500))
    }
}
