//! Page-window planning under a feed's published request limits.

use std::time::Duration;

use crate::error::FeedError;

/// One request's slice of the result set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageWindow {
    pub offset: u32,
    pub limit: u32,
}

/// Result of validating a caller-supplied `(limit, offset)` pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValidatedWindow {
    pub limit: u32,
    pub offset: u32,
    /// `true` when `limit` had to be lowered (or raised from zero).
    pub clamped: bool,
}

/// Pure planner: no state beyond its limit configuration.
#[derive(Debug, Clone)]
pub struct RateLimitPlanner {
    max_page_size: u32,
    max_offset: u32,
    min_delay: Duration,
}

impl RateLimitPlanner {
    #[must_use]
    pub fn new(max_page_size: u32, max_offset: u32, min_delay: Duration) -> Self {
        Self {
            max_page_size: max_page_size.max(1),
            max_offset,
            min_delay,
        }
    }

    #[must_use]
    pub fn max_page_size(&self) -> u32 {
        self.max_page_size
    }

    #[must_use]
    pub fn max_offset(&self) -> u32 {
        self.max_offset
    }

    #[must_use]
    pub fn min_delay(&self) -> Duration {
        self.min_delay
    }

    /// Delay to wait before issuing window `index`; the first request goes
    /// out immediately.
    #[must_use]
    pub fn delay_before(&self, index: usize) -> Duration {
        if index == 0 {
            Duration::ZERO
        } else {
            self.min_delay
        }
    }

    /// Split `total` records starting at `start_offset` into windows.
    ///
    /// No window ends past `max_offset`. The last window is shrunk to fit,
    /// and planning stops once there is no room left, so a large `total`
    /// yields a partial plan instead of an error.
    #[must_use]
    pub fn plan(&self, start_offset: u32, total: u32) -> Vec<PageWindow> {
        let mut windows = Vec::new();
        let mut offset = start_offset;
        let mut remaining = total;

        while remaining > 0 {
            let room = self.max_offset.saturating_sub(offset);
            let limit = remaining.min(self.max_page_size).min(room);
            if limit == 0 {
                tracing::debug!(
                    offset,
                    remaining,
                    max_offset = self.max_offset,
                    "plan truncated at max offset"
                );
                break;
            }
            windows.push(PageWindow { offset, limit });
            offset += limit;
            remaining -= limit;
        }

        windows
    }

    /// Validate a single request, clamping `limit` instead of failing.
    ///
    /// # Errors
    ///
    /// Returns [`FeedError::OffsetOutOfRange`] when `offset` leaves no room
    /// below `max_offset`.
    pub fn validate(&self, limit: u32, offset: u32) -> Result<ValidatedWindow, FeedError> {
        if offset >= self.max_offset {
            return Err(FeedError::OffsetOutOfRange {
                offset,
                max_offset: self.max_offset,
            });
        }

        let room = self.max_offset - offset;
        let clamped_limit = limit.clamp(1, self.max_page_size).min(room);

        Ok(ValidatedWindow {
            limit: clamped_limit,
            offset,
            clamped: clamped_limit != limit,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn planner(page: u32, max_offset: u32) -> RateLimitPlanner {
        RateLimitPlanner::new(page, max_offset, Duration::from_millis(1500))
    }

    #[test]
    fn plan_splits_into_full_pages_and_remainder() {
        let windows = planner(100, 10_000).plan(0, 250);
        assert_eq!(
            windows,
            vec![
                PageWindow { offset: 0, limit: 100 },
                PageWindow { offset: 100, limit: 100 },
                PageWindow { offset: 200, limit: 50 },
            ]
        );
    }

    #[test]
    fn plan_respects_start_offset() {
        let windows = planner(50, 10_000).plan(120, 60);
        assert_eq!(windows[0], PageWindow { offset: 120, limit: 50 });
        assert_eq!(windows[1], PageWindow { offset: 170, limit: 10 });
    }

    #[test]
    fn plan_never_crosses_max_offset() {
        for (page, max_offset, start, total) in [
            (100, 1_000, 0, 5_000),
            (100, 950, 0, 5_000),
            (7, 100, 3, 1_000),
            (50, 10_000, 9_990, 100),
            (1, 5, 0, 10),
        ] {
            let windows = planner(page, max_offset).plan(start, total);
            for w in &windows {
                assert!(w.limit <= page, "limit {} above page {page}", w.limit);
                assert!(
                    w.offset + w.limit <= max_offset,
                    "window {w:?} crosses {max_offset}"
                );
            }
        }
    }

    #[test]
    fn plan_is_partial_when_total_exceeds_room() {
        let windows = planner(100, 250).plan(0, 1_000);
        let planned: u32 = windows.iter().map(|w| w.limit).sum();
        assert_eq!(planned, 250);
        assert_eq!(windows.last(), Some(&PageWindow { offset: 200, limit: 50 }));
    }

    #[test]
    fn plan_is_empty_at_or_beyond_max_offset() {
        assert!(planner(100, 500).plan(500, 10).is_empty());
        assert!(planner(100, 500).plan(900, 10).is_empty());
        assert!(planner(100, 500).plan(0, 0).is_empty());
    }

    #[test]
    fn validate_clamps_oversized_limit() {
        let v = planner(100, 10_000).validate(500, 0).unwrap();
        assert_eq!(v.limit, 100);
        assert!(v.clamped);
    }

    #[test]
    fn validate_passes_through_legal_limit() {
        let v = planner(100, 10_000).validate(40, 200).unwrap();
        assert_eq!(v, ValidatedWindow { limit: 40, offset: 200, clamped: false });
    }

    #[test]
    fn validate_clamps_to_room_below_max_offset() {
        let v = planner(100, 1_000).validate(100, 950).unwrap();
        assert_eq!(v.limit, 50);
        assert!(v.clamped);
    }

    #[test]
    fn validate_raises_zero_limit() {
        let v = planner(100, 1_000).validate(0, 0).unwrap();
        assert_eq!(v.limit, 1);
        assert!(v.clamped);
    }

    #[test]
    fn validate_rejects_offset_beyond_max() {
        let err = planner(100, 1_000).validate(10, 1_000).unwrap_err();
        assert!(matches!(
            err,
            FeedError::OffsetOutOfRange { offset: 1_000, max_offset: 1_000 }
        ));
    }

    #[test]
    fn first_window_has_no_delay() {
        let p = planner(100, 1_000);
        assert_eq!(p.delay_before(0), Duration::ZERO);
        assert_eq!(p.delay_before(1), Duration::from_millis(1500));
    }
}
