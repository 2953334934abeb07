//! Weighted sliding-window arithmetic.
//!
//! Time is cut into fixed windows aligned to multiples of the window size.
//! The rate at a given second blends the previous window's count, decayed
//! linearly by how far the current window has progressed, with the current
//! window's count.

/// Window boundaries for one evaluation instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlidingWindow {
    /// Width of a window in seconds
    pub size_secs: u64,
    /// The evaluation instant, Unix seconds
    pub now: i64,
    /// Start of the window containing `now`
    pub current_start: i64,
    /// Start of the window before it
    pub previous_start: i64,
}

impl SlidingWindow {
    /// Compute window boundaries for `now`. `size_secs` must be non-zero.
    pub fn at(now: i64, size_secs: u64) -> Self {
        let size = i64::try_from(size_secs).unwrap_or(i64::MAX).max(1);
        let current_start = now - now.rem_euclid(size);

        Self {
            size_secs: size as u64,
            now,
            current_start,
            previous_start: current_start.saturating_sub(size),
        }
    }

    /// Seconds since the current window started, in `0..size_secs`.
    pub fn elapsed(&self) -> u64 {
        (self.now - self.current_start) as u64
    }

    /// Seconds until the current window rolls over.
    pub fn retry_after(&self) -> u64 {
        self.size_secs - self.elapsed()
    }

    /// Half-open range of the previous window, `[previous_start, current_start)`.
    pub fn previous_range(&self) -> (i64, i64) {
        (self.previous_start, self.current_start)
    }

    /// Half-open range covering the current window up to and including `now`.
    pub fn current_range(&self) -> (i64, i64) {
        (self.current_start, self.now.saturating_add(1))
    }

    /// Blend the two window counts into the estimated rate.
    pub fn weighted_rate(&self, previous_count: u64, current_count: u64) -> f64 {
        let size = self.size_secs as f64;
        let remaining = (self.size_secs - self.elapsed()) as f64;
        previous_count as f64 * (remaining / size) + current_count as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_window_alignment() {
        let window = SlidingWindow::at(125, 60);
        assert_eq!(window.current_start, 120);
        assert_eq!(window.previous_start, 60);
        assert_eq!(window.elapsed(), 5);
        assert_eq!(window.retry_after(), 55);
        assert_eq!(window.previous_range(), (60, 120));
        assert_eq!(window.current_range(), (120, 126));
    }

    #[test]
    fn test_window_start_has_zero_elapsed() {
        let window = SlidingWindow::at(180, 60);
        assert_eq!(window.current_start, 180);
        assert_eq!(window.elapsed(), 0);
        assert_eq!(window.retry_after(), 60);
    }

    #[test]
    fn test_previous_window_full_weight_at_boundary() {
        let window = SlidingWindow::at(180, 60);
        assert_eq!(window.weighted_rate(10, 0), 10.0);
    }

    #[test]
    fn test_previous_window_decays() {
        let window = SlidingWindow::at(150, 60);
        assert_eq!(window.weighted_rate(10, 0), 5.0);
        assert_eq!(window.weighted_rate(10, 3), 8.0);

        let late = SlidingWindow::at(179, 60);
        assert!(late.weighted_rate(10, 0) < 0.2);
    }

    #[test]
    fn test_negative_time_aligns_down() {
        let window = SlidingWindow::at(-1, 60);
        assert_eq!(window.current_start, -60);
        assert_eq!(window.elapsed(), 59);
    }
}
