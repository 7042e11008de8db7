use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, Utc};
use tracing::debug;

use shared_utils::Clock;

/// Suppresses repeat dispatch of the same (patient, threshold type) alert
/// inside a sliding window. Evaluation still happens; only sending is skipped.
pub struct AlertDebouncer {
    window: Duration,
    clock: Arc<dyn Clock>,
    last_sent: Mutex<HashMap<(String, String), DateTime<Utc>>>,
}

impl AlertDebouncer {
    pub fn new(window_seconds: u64, clock: Arc<dyn Clock>) -> Self {
        Self {
            window: Duration::seconds(i64::try_from(window_seconds).unwrap_or(i64::MAX / 1000)),
            clock,
            last_sent: Mutex::new(HashMap::new()),
        }
    }

    /// Returns true and records the dispatch when no identical alert went out
    /// within the window. A zero window never suppresses.
    pub fn should_dispatch(&self, patient_id: &str, threshold_type: &str) -> bool {
        let now = self.clock.now();
        let mut last_sent = match self.last_sent.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        // Drop entries that can no longer suppress anything.
        let window = self.window;
        last_sent.retain(|_, sent_at| now - *sent_at < window);

        let key = (patient_id.to_string(), threshold_type.to_string());
        if let Some(previous) = last_sent.get(&key) {
            debug!(
                patient_id = %patient_id,
                threshold_type = %threshold_type,
                since = %previous,
                "Alert debounced"
            );
            return false;
        }

        if self.window > Duration::zero() {
            last_sent.insert(key, now);
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use shared_utils::FixedClock;

    fn debouncer(window_seconds: u64) -> (AlertDebouncer, Arc<FixedClock>) {
        let clock = Arc::new(FixedClock::new(Utc.with_ymd_and_hms(2026, 10, 14, 12, 0, 0).unwrap()));
        (AlertDebouncer::new(window_seconds, clock.clone()), clock)
    }

    #[test]
    fn test_repeat_alert_inside_window_is_suppressed() {
        let (debouncer, clock) = debouncer(300);

        assert!(debouncer.should_dispatch("p1", "glucose_low"));
        clock.advance(Duration::seconds(299));
        assert!(!debouncer.should_dispatch("p1", "glucose_low"));
        clock.advance(Duration::seconds(1));
        assert!(debouncer.should_dispatch("p1", "glucose_low"));
    }

    #[test]
    fn test_keys_are_independent() {
        let (debouncer, _) = debouncer(300);

        assert!(debouncer.should_dispatch("p1", "glucose_low"));
        assert!(debouncer.should_dispatch("p1", "heart_rate_high"));
        assert!(debouncer.should_dispatch("p2", "glucose_low"));
    }

    #[test]
    fn test_zero_window_disables_debounce() {
        let (debouncer, _) = debouncer(0);

        assert!(debouncer.should_dispatch("p1", "glucose_low"));
        assert!(debouncer.should_dispatch("p1", "glucose_low"));
    }
}
