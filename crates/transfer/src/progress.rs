use std::sync::atomic::{AtomicU8, Ordering};

/// Receives progress and state updates from a transfer.
///
/// Called synchronously from whichever path produced the update: the writer
/// path for state changes, the transport's notification context for
/// acknowledgment progress. Implementations must not block.
pub trait SessionObserver: Send + Sync {
    /// Progress of the current file in percent (0–100).
    fn on_progress(&self, percent: u8);

    /// Human-readable state label.
    fn on_state_change(&self, label: &str);
}

/// Observer that ignores every update.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl SessionObserver for NoopObserver {
    fn on_progress(&self, _percent: u8) {}
    fn on_state_change(&self, _label: &str) {}
}

/// Percent of chunks the device has received, floored.
///
/// Capped at 99: 100 is reserved for the device's storage confirmation.
/// Returns `None` when there are no chunks to count.
pub fn chunk_progress(received_count: u32, total_chunks: u32) -> Option<u8> {
    if total_chunks == 0 {
        return None;
    }
    let percent = u64::from(received_count) * 100 / u64::from(total_chunks);
    Some(percent.min(99) as u8)
}

/// Last progress value reported for a session. Only moves forward.
#[derive(Debug, Default)]
pub(crate) struct ProgressLatch {
    value: AtomicU8,
}

impl ProgressLatch {
    /// Raises the value to `percent`. Returns `true` if it increased.
    pub(crate) fn advance(&self, percent: u8) -> bool {
        let previous = self.value.fetch_max(percent, Ordering::AcqRel);
        percent > previous
    }

    /// Forces the value to 100. Returns `true` only for the first call.
    pub(crate) fn complete(&self) -> bool {
        self.value.swap(100, Ordering::AcqRel) != 100
    }

    #[cfg(test)]
    fn get(&self) -> u8 {
        self.value.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunk_progress_floors() {
        assert_eq!(chunk_progress(1, 6), Some(16));
        assert_eq!(chunk_progress(3, 6), Some(50));
        assert_eq!(chunk_progress(5, 6), Some(83));
        assert_eq!(chunk_progress(0, 6), Some(0));
    }

    #[test]
    fn chunk_progress_never_reaches_100() {
        assert_eq!(chunk_progress(6, 6), Some(99));
        assert_eq!(chunk_progress(9, 6), Some(99));
    }

    #[test]
    fn chunk_progress_without_chunks() {
        assert_eq!(chunk_progress(0, 0), None);
    }

    #[test]
    fn latch_is_monotonic() {
        let latch = ProgressLatch::default();
        assert!(latch.advance(30));
        assert!(!latch.advance(30));
        assert!(!latch.advance(10));
        assert_eq!(latch.get(), 30);
        assert!(latch.advance(31));
    }

    #[test]
    fn latch_completes_once() {
        let latch = ProgressLatch::default();
        latch.advance(50);
        assert!(latch.complete());
        assert!(!latch.complete());
        assert!(!latch.advance(99));
        assert_eq!(latch.get(), 100);
    }
}
