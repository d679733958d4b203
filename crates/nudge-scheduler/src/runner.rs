//! Delivery scheduler background loop.
//!
//! Wakes after a short warm-up delay and then on a fixed interval. Each
//! tick reads the due reminders, attempts delivery, and reconciles:
//! delivered or permanently-undeliverable reminders are deleted, transient
//! failures stay for the next tick (at-least-once delivery; each reminder
//! is deleted after at most one successful delivery).

use std::sync::Arc;
use std::time::Duration;

use chrono::{Local, NaiveDateTime};
use tracing::{debug, error, info, warn};

use nudge_core::error::NudgeError;
use nudge_core::types::{Reminder, DUE_TIME_FORMAT};
use nudge_store::ReminderRepository;
use nudge_transport::{DeliveryError, MessageTransport};

/// Delay before the first due scan, in seconds.
const FIRST_TICK_DELAY_SECS: u64 = 10;

/// Interval between due scans, in seconds.
const TICK_INTERVAL_SECS: u64 = 60;

/// Clock used to evaluate dueness. Injectable so tests can pin it.
pub type ClockFn = Box<dyn Fn() -> NaiveDateTime + Send + Sync>;

/// Outcome counts of one scheduler tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickSummary {
    /// Reminders returned by the due scan.
    pub due: usize,
    /// Delivered and deleted.
    pub delivered: usize,
    /// Deleted without delivery (recipient permanently unreachable).
    pub dropped: usize,
    /// Left in place for the next tick (transient failure).
    pub retained: usize,
}

/// Background job delivering due reminders.
pub struct DeliveryRunner<T: MessageTransport> {
    reminders: ReminderRepository,
    transport: Arc<T>,
    first_tick_delay: Duration,
    tick_interval: Duration,
    clock: ClockFn,
}

impl<T: MessageTransport> DeliveryRunner<T> {
    pub fn new(reminders: ReminderRepository, transport: Arc<T>) -> Self {
        Self {
            reminders,
            transport,
            first_tick_delay: Duration::from_secs(FIRST_TICK_DELAY_SECS),
            tick_interval: Duration::from_secs(TICK_INTERVAL_SECS),
            clock: Box::new(|| Local::now().naive_local()),
        }
    }

    /// Override the warm-up delay and tick interval.
    pub fn with_intervals(mut self, first_tick_delay: Duration, tick_interval: Duration) -> Self {
        self.first_tick_delay = first_tick_delay;
        self.tick_interval = tick_interval;
        self
    }

    /// Replace the clock (tests pin it to a fixed instant).
    pub fn with_clock(mut self, clock: ClockFn) -> Self {
        self.clock = clock;
        self
    }

    /// Run one scan-dispatch-reconcile cycle.
    ///
    /// A failed due scan aborts the whole tick without deleting anything;
    /// the next tick retries from scratch. Per-reminder failures never
    /// affect the rest of the batch.
    pub async fn tick(&self) -> Result<TickSummary, NudgeError> {
        let now = (self.clock)().format(DUE_TIME_FORMAT).to_string();
        let due = self.reminders.due_before(&now)?;

        let mut summary = TickSummary {
            due: due.len(),
            ..TickSummary::default()
        };

        for reminder in due {
            self.dispatch(&reminder, &mut summary).await;
        }

        if summary.due > 0 {
            info!(
                due = summary.due,
                delivered = summary.delivered,
                dropped = summary.dropped,
                retained = summary.retained,
                "Delivery tick complete"
            );
        } else {
            debug!("Delivery tick — nothing due");
        }

        Ok(summary)
    }

    async fn dispatch(&self, reminder: &Reminder, summary: &mut TickSummary) {
        let notification = format!("🔔 Reminder:\n{}", reminder.text);

        match self.transport.send(reminder.user_id, &notification).await {
            Ok(()) => {
                if let Err(e) = self.reminders.delete(reminder.id) {
                    // Delivered but not deleted; delete is idempotent, so
                    // the retry on the next tick is harmless at the store
                    // level, though the user may see the reminder twice.
                    error!(
                        reminder_id = reminder.id,
                        error = %e,
                        "Failed to delete delivered reminder"
                    );
                    summary.retained += 1;
                    return;
                }
                debug!(reminder_id = reminder.id, user_id = reminder.user_id, "Reminder delivered");
                summary.delivered += 1;
            }
            Err(DeliveryError::RecipientUnreachable(reason)) => {
                // No retry can ever succeed; reconcile by deleting.
                warn!(
                    reminder_id = reminder.id,
                    user_id = reminder.user_id,
                    reason = %reason,
                    "Recipient unreachable; dropping reminder"
                );
                if let Err(e) = self.reminders.delete(reminder.id) {
                    error!(reminder_id = reminder.id, error = %e, "Failed to drop reminder");
                    summary.retained += 1;
                    return;
                }
                summary.dropped += 1;
            }
            Err(DeliveryError::Transient(reason)) => {
                // Leave in place; the next tick retries.
                warn!(
                    reminder_id = reminder.id,
                    user_id = reminder.user_id,
                    reason = %reason,
                    "Transient delivery failure; will retry"
                );
                summary.retained += 1;
            }
        }
    }

    /// Run forever: warm-up delay, then one tick per interval.
    pub async fn run(self) {
        info!(
            first_tick_delay_secs = self.first_tick_delay.as_secs(),
            tick_interval_secs = self.tick_interval.as_secs(),
            "Delivery scheduler started"
        );

        tokio::time::sleep(self.first_tick_delay).await;

        let mut interval = tokio::time::interval(self.tick_interval);
        // The interval's first tick completes immediately; consume it here
        // so each loop iteration runs exactly one scan per interval.
        interval.tick().await;

        loop {
            if let Err(e) = self.tick().await {
                // Scan failure: abandon this tick, retry next interval.
                error!(error = %e, "Delivery tick aborted");
            }
            interval.tick().await;
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use chrono::NaiveDate;

    use nudge_store::Database;
    use nudge_transport::{RecordingTransport, SendOutcome};

    fn fixed_now() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 6, 1)
            .unwrap()
            .and_hms_opt(10, 0, 0)
            .unwrap()
    }

    struct Harness {
        db: Arc<Database>,
        repo: ReminderRepository,
        transport: Arc<RecordingTransport>,
        runner: DeliveryRunner<RecordingTransport>,
    }

    fn make_harness() -> Harness {
        let db = Arc::new(Database::in_memory().unwrap());
        let repo = ReminderRepository::new(Arc::clone(&db));
        let transport = Arc::new(RecordingTransport::new());
        let runner = DeliveryRunner::new(repo.clone(), Arc::clone(&transport))
            .with_clock(Box::new(fixed_now));
        Harness {
            db,
            repo,
            transport,
            runner,
        }
    }

    #[tokio::test]
    async fn test_due_reminder_is_delivered_and_deleted() {
        let h = make_harness();
        h.repo.insert(1, "buy milk", "2025-06-01 09:00").unwrap();

        let summary = h.runner.tick().await.unwrap();

        assert_eq!(summary.due, 1);
        assert_eq!(summary.delivered, 1);
        assert_eq!(h.repo.count().unwrap(), 0);

        let texts = h.transport.sent_texts_for(1);
        assert_eq!(texts.len(), 1);
        assert!(texts[0].contains("buy milk"));
    }

    #[tokio::test]
    async fn test_future_reminder_is_untouched() {
        let h = make_harness();
        h.repo.insert(1, "later", "2099-01-01 09:00").unwrap();

        let summary = h.runner.tick().await.unwrap();

        assert_eq!(summary.due, 0);
        assert_eq!(h.repo.count().unwrap(), 1);
        assert!(h.transport.sent().is_empty());
    }

    #[tokio::test]
    async fn test_unreachable_recipient_is_dropped() {
        let h = make_harness();
        h.repo.insert(1, "blocked user", "2025-06-01 09:00").unwrap();
        h.transport.set_outcome(1, SendOutcome::Unreachable);

        let summary = h.runner.tick().await.unwrap();

        assert_eq!(summary.dropped, 1);
        assert_eq!(summary.delivered, 0);
        // Removed even though delivery "failed".
        assert_eq!(h.repo.count().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_transient_failure_is_retried_next_tick() {
        let h = make_harness();
        h.repo.insert(1, "flaky", "2025-06-01 09:00").unwrap();
        h.transport.set_outcome(1, SendOutcome::Transient);

        let summary = h.runner.tick().await.unwrap();
        assert_eq!(summary.retained, 1);
        assert_eq!(h.repo.count().unwrap(), 1);

        // The transport recovers; the next tick delivers.
        h.transport.set_outcome(1, SendOutcome::Deliver);
        let summary = h.runner.tick().await.unwrap();
        assert_eq!(summary.delivered, 1);
        assert_eq!(h.repo.count().unwrap(), 0);

        // Two attempts total for the same reminder.
        assert_eq!(h.transport.sent_texts_for(1).len(), 2);
    }

    #[tokio::test]
    async fn test_failures_are_isolated_within_a_batch() {
        let h = make_harness();
        h.repo.insert(1, "ok", "2025-06-01 09:00").unwrap();
        h.repo.insert(2, "gone", "2025-06-01 09:00").unwrap();
        h.repo.insert(3, "flaky", "2025-06-01 09:00").unwrap();
        h.transport.set_outcome(2, SendOutcome::Unreachable);
        h.transport.set_outcome(3, SendOutcome::Transient);

        let summary = h.runner.tick().await.unwrap();

        assert_eq!(summary.due, 3);
        assert_eq!(summary.delivered, 1);
        assert_eq!(summary.dropped, 1);
        assert_eq!(summary.retained, 1);

        // Only the transient one remains.
        let remaining = h.repo.due_before("2025-06-01 10:00").unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].user_id, 3);
    }

    #[tokio::test]
    async fn test_scan_failure_aborts_tick() {
        let h = make_harness();

        h.db.with_conn(|conn| {
            conn.execute_batch("DROP TABLE reminders")
                .map_err(|e| NudgeError::Storage(e.to_string()))
        })
        .unwrap();

        let result = h.runner.tick().await;
        assert!(result.is_err());
        assert!(h.transport.sent().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_fires_once_per_interval_after_warmup() {
        let h = make_harness();
        h.repo.insert(1, "flaky", "2025-06-01 09:00").unwrap();
        h.transport.set_outcome(1, SendOutcome::Transient);

        let transport = Arc::clone(&h.transport);
        tokio::spawn(h.runner.run());

        // Warm-up scan at t=10: exactly one delivery attempt.
        tokio::time::sleep(Duration::from_millis(10_500)).await;
        assert_eq!(transport.sent_texts_for(1).len(), 1);

        // The retained reminder waits for the next interval, not sooner.
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(transport.sent_texts_for(1).len(), 1);

        // Second scan at t=70 retries it.
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(transport.sent_texts_for(1).len(), 2);
    }

    #[tokio::test]
    async fn test_delivery_at_exact_due_time() {
        let h = make_harness();
        // Clock is pinned to 2025-06-01 10:00.
        h.repo.insert(1, "on the dot", "2025-06-01 10:00").unwrap();

        let summary = h.runner.tick().await.unwrap();
        assert_eq!(summary.delivered, 1);
    }
}
