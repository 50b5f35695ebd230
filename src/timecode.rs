//! Time labels for the transport bar.
//!
//! `format_clock` renders seconds as `"MM : SS"`. `ScrubLabel` holds the
//! dragged position while the user scrubs and clears itself once the drag
//! has been idle for the cooldown (0.5 s by default), so the label falls
//! back to the live playhead.

use std::time::{Duration, Instant};

/// Idle time after the last drag before the scrub label clears
pub const SCRUB_LABEL_COOLDOWN_MS: u64 = 500;

/// `"MM : SS"`; negative and non-finite input render as zero.
///
/// Minutes are not wrapped into hours: 3725 s is `"62 : 05"`.
pub fn format_clock(seconds: f64) -> String {
    let total = if seconds.is_finite() && seconds > 0.0 {
        seconds.floor() as u64
    } else {
        0
    };
    format!("{:02} : {:02}", total / 60, total % 60)
}

/// `"MM : SS / MM : SS"` for playhead and duration.
pub fn format_progress(time: f64, duration: f64) -> String {
    format!("{} / {}", format_clock(time), format_clock(duration))
}

/// Debounced label for the scrub slider.
///
/// # Usage
/// ```ignore
/// // While dragging:
/// label.drag(position);
///
/// // Every UI update:
/// let text = label.tick().map(format_clock).unwrap_or_else(|| format_clock(playhead));
/// ```
#[derive(Debug, Clone)]
pub struct ScrubLabel {
    cooldown: Duration,
    /// Dragged position and when it expires
    pending: Option<(f64, Instant)>,
}

impl Default for ScrubLabel {
    fn default() -> Self {
        Self::new(SCRUB_LABEL_COOLDOWN_MS)
    }
}

impl ScrubLabel {
    pub fn new(cooldown_ms: u64) -> Self {
        Self {
            cooldown: Duration::from_millis(cooldown_ms),
            pending: None,
        }
    }

    pub fn cooldown_ms(&self) -> u64 {
        self.cooldown.as_millis() as u64
    }

    /// Show `seconds` and restart the cooldown.
    pub fn drag(&mut self, seconds: f64) {
        self.drag_at(seconds, Instant::now());
    }

    fn drag_at(&mut self, seconds: f64, now: Instant) {
        self.pending = Some((seconds, now + self.cooldown));
        log::trace!("ScrubLabel: {:.2}s for {}ms", seconds, self.cooldown.as_millis());
    }

    /// Hide the label now (scrub reset on track change)
    pub fn clear(&mut self) {
        self.pending = None;
    }

    /// Position to display, or `None` once the cooldown has elapsed.
    pub fn tick(&mut self) -> Option<f64> {
        self.tick_at(Instant::now())
    }

    fn tick_at(&mut self, now: Instant) -> Option<f64> {
        let (seconds, expires_at) = self.pending?;
        if now >= expires_at {
            self.pending = None;
            log::trace!("ScrubLabel: cleared");
            None
        } else {
            Some(seconds)
        }
    }

    pub fn is_visible(&self) -> bool {
        self.pending.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_clock() {
        assert_eq!(format_clock(0.0), "00 : 00");
        assert_eq!(format_clock(5.9), "00 : 05");
        assert_eq!(format_clock(65.0), "01 : 05");
        assert_eq!(format_clock(3725.0), "62 : 05");
        assert_eq!(format_clock(-3.0), "00 : 00");
        assert_eq!(format_clock(f64::NAN), "00 : 00");
        assert_eq!(format_progress(61.0, 90.0), "01 : 01 / 01 : 30");
    }

    #[test]
    fn test_visible_during_cooldown() {
        let mut label = ScrubLabel::new(500);
        let t0 = Instant::now();
        label.drag_at(12.5, t0);
        assert_eq!(label.tick_at(t0 + Duration::from_millis(100)), Some(12.5));
        assert!(label.is_visible());
    }

    #[test]
    fn test_clears_after_cooldown() {
        let mut label = ScrubLabel::default();
        let t0 = Instant::now();
        label.drag_at(3.0, t0);
        assert_eq!(label.tick_at(t0 + Duration::from_millis(600)), None);
        assert!(!label.is_visible());
    }

    #[test]
    fn test_drag_restarts_cooldown() {
        let mut label = ScrubLabel::new(500);
        let t0 = Instant::now();
        label.drag_at(1.0, t0);
        label.drag_at(2.0, t0 + Duration::from_millis(400));
        assert_eq!(label.tick_at(t0 + Duration::from_millis(700)), Some(2.0));

        label.clear();
        assert_eq!(label.tick_at(t0 + Duration::from_millis(700)), None);
    }
}
