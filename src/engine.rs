//! Recurring-job engine: bounded-concurrency trigger dispatch.
//!
//! Each registered job gets a driver task running a small state machine:
//! Sleeping(next) → Firing → Settling. Drivers pause in standby without
//! losing their triggers, so a later start resumes them, and a due time is
//! never dispatched twice — the settle delay pushes the recompute past the
//! minute edge that just fired.

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use cron::Schedule;
use futures::future::BoxFuture;
use tokio::sync::{watch, Semaphore};
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

/// Delay after a firing before the next occurrence is computed, so a wake on
/// a coarse clock edge cannot match the occurrence that just fired.
const SETTLE_DELAY: Duration = Duration::from_millis(1100);

/// Placeholder for "no specific value" in the day-of-month field.
pub const DAY_OF_MONTH_ANY: &str = "?";

/// Job payload is the normalized trigger expression; the callback re-derives
/// what to do from it.
pub type JobCallback =
    Arc<dyn Fn(String) -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync>;

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub max_concurrency: usize,
    pub misfire_threshold: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_concurrency: 5,
            misfire_threshold: Duration::from_secs(60),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TriggerError {
    #[error("invalid trigger expression `{expression}`: {source}")]
    Malformed {
        expression: String,
        source: cron::error::Error,
    },
    #[error("trigger `{0}` sets both day-of-month and day-of-week; one must be `?`")]
    DayFieldConflict(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Started,
    Standby,
}

/// State of a freshly scheduled trigger, reported back to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerState {
    /// Waiting for its next occurrence.
    Normal,
    /// The expression has no future occurrence.
    Exhausted,
}

struct RegisteredJob {
    id: u32,
    expression: String,
    schedule: Schedule,
    callback: JobCallback,
}

pub struct JobEngine {
    state: watch::Sender<EngineState>,
    permits: Arc<Semaphore>,
    misfire_threshold: Duration,
}

impl JobEngine {
    /// Engine construction is asynchronous; callers that race it must wait
    /// for the build to finish before starting the engine.
    pub async fn build(config: EngineConfig) -> Self {
        tokio::task::yield_now().await;
        let (state, _) = watch::channel(EngineState::Standby);
        info!(
            max_concurrency = config.max_concurrency,
            misfire_threshold = ?config.misfire_threshold,
            "job engine built"
        );
        Self {
            state,
            permits: Arc::new(Semaphore::new(config.max_concurrency)),
            misfire_threshold: config.misfire_threshold,
        }
    }

    /// Parse the trigger and spawn its driver. The driver idles until the
    /// engine is started. Fails deterministically on a malformed expression
    /// without affecting any other registered job.
    pub fn schedule_job(
        &self,
        id: u32,
        expression: &str,
        callback: JobCallback,
    ) -> Result<TriggerState, TriggerError> {
        let fields: Vec<&str> = expression.split_whitespace().collect();
        if let (Some(dom), Some(dow)) = (fields.get(3), fields.get(5)) {
            let concrete = |f: &str| f != DAY_OF_MONTH_ANY && f != "*";
            if concrete(dom) && concrete(dow) {
                return Err(TriggerError::DayFieldConflict(expression.to_string()));
            }
        }

        // Engine-native syntax has no `?`; it reads as "every".
        let native = expression.replace('?', "*");
        let schedule = Schedule::from_str(&native).map_err(|source| TriggerError::Malformed {
            expression: expression.to_string(),
            source,
        })?;

        let trigger_state = match schedule.after(&Utc::now()).next() {
            Some(next) => {
                debug!(job_id = id, "first fire at {next}");
                TriggerState::Normal
            }
            None => TriggerState::Exhausted,
        };

        let job = RegisteredJob {
            id,
            expression: expression.to_string(),
            schedule,
            callback,
        };
        tokio::spawn(drive(
            job,
            self.state.subscribe(),
            Arc::clone(&self.permits),
            self.misfire_threshold,
        ));

        Ok(trigger_state)
    }

    pub fn start(&self) {
        self.state.send_if_modified(|state| {
            if *state != EngineState::Started {
                *state = EngineState::Started;
                true
            } else {
                false
            }
        });
    }

    /// Stop firing triggers but keep the jobs; a later start resumes them.
    pub fn standby(&self) {
        self.state.send_if_modified(|state| {
            if *state != EngineState::Standby {
                *state = EngineState::Standby;
                true
            } else {
                false
            }
        });
    }

    pub fn is_started(&self) -> bool {
        *self.state.borrow() == EngineState::Started
    }

    pub fn in_standby(&self) -> bool {
        *self.state.borrow() == EngineState::Standby
    }
}

async fn drive(
    job: RegisteredJob,
    mut state: watch::Receiver<EngineState>,
    permits: Arc<Semaphore>,
    misfire_threshold: Duration,
) {
    loop {
        // Hold here while the engine is in standby. A closed channel means
        // the engine was dropped; the trigger dies with it.
        while *state.borrow_and_update() != EngineState::Started {
            if state.changed().await.is_err() {
                return;
            }
        }

        let Some(due) = job.schedule.after(&Utc::now()).next() else {
            warn!(
                job_id = job.id,
                expression = %job.expression,
                "no upcoming occurrence; trigger retired"
            );
            return;
        };

        // Sleeping: wake at the due time, or early on a state change.
        let wait = (due - Utc::now()).to_std().unwrap_or(Duration::ZERO);
        debug!(
            job_id = job.id,
            expression = %job.expression,
            "sleeping {wait:?} until {due}"
        );
        tokio::select! {
            _ = sleep(wait) => {}
            changed = state.changed() => {
                if changed.is_err() {
                    return;
                }
                continue; // standby or resume; recompute on the next pass
            }
        }

        let now = Utc::now();
        if is_misfire(due, now, misfire_threshold) {
            let lateness = (now - due).to_std().unwrap_or(Duration::ZERO);
            warn!(
                job_id = job.id,
                expression = %job.expression,
                "misfire: occurrence at {due} missed by {lateness:?}"
            );
        } else {
            // Firing: bounded by the engine-wide permit pool. Callback
            // failures are logged here, never silently dropped.
            let _permit = match Arc::clone(&permits).acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => return,
            };
            info!(job_id = job.id, expression = %job.expression, "firing");
            if let Err(e) = (job.callback)(job.expression.clone()).await {
                error!(job_id = job.id, error = format!("{e:#}"), "job callback failed");
            }
        }

        // Settling
        sleep(SETTLE_DELAY).await;
    }
}

/// An occurrence missed by more than the threshold is skipped, never
/// replayed. Waking early or on time is not a misfire.
fn is_misfire(due: DateTime<Utc>, now: DateTime<Utc>, threshold: Duration) -> bool {
    (now - due).to_std().unwrap_or(Duration::ZERO) > threshold
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::FutureExt;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio::sync::Notify;

    fn counting_callback(
        count: Arc<AtomicU32>,
        fired: Arc<Notify>,
        payload: Arc<std::sync::Mutex<String>>,
    ) -> JobCallback {
        Arc::new(move |expression| {
            let count = Arc::clone(&count);
            let fired = Arc::clone(&fired);
            let payload = Arc::clone(&payload);
            async move {
                count.fetch_add(1, Ordering::SeqCst);
                *payload.lock().unwrap() = expression;
                fired.notify_one();
                anyhow::Ok(())
            }
            .boxed()
        })
    }

    fn noop_callback() -> JobCallback {
        Arc::new(|_expression| async { anyhow::Ok(()) }.boxed())
    }

    #[tokio::test]
    async fn malformed_expression_is_rejected() {
        let engine = JobEngine::build(EngineConfig::default()).await;
        let result = engine.schedule_job(1, "not a trigger", noop_callback());
        assert!(matches!(result, Err(TriggerError::Malformed { .. })));
    }

    #[tokio::test]
    async fn conflicting_day_fields_are_rejected() {
        let engine = JobEngine::build(EngineConfig::default()).await;
        let result = engine.schedule_job(1, "0 0 12 1 * MON *", noop_callback());
        assert!(matches!(result, Err(TriggerError::DayFieldConflict(_))));
    }

    #[tokio::test]
    async fn start_and_standby_are_idempotent() {
        let engine = JobEngine::build(EngineConfig::default()).await;
        assert!(engine.in_standby());

        engine.start();
        engine.start();
        assert!(engine.is_started());

        engine.standby();
        engine.standby();
        assert!(engine.in_standby());
        assert!(!engine.is_started());
    }

    #[tokio::test]
    async fn every_second_trigger_fires_with_its_payload() {
        let engine = JobEngine::build(EngineConfig::default()).await;
        let count = Arc::new(AtomicU32::new(0));
        let fired = Arc::new(Notify::new());
        let payload = Arc::new(std::sync::Mutex::new(String::new()));

        let state = engine
            .schedule_job(
                1,
                "* * * * * * *",
                counting_callback(Arc::clone(&count), Arc::clone(&fired), Arc::clone(&payload)),
            )
            .unwrap();
        assert_eq!(state, TriggerState::Normal);

        engine.start();
        tokio::time::timeout(Duration::from_secs(3), fired.notified())
            .await
            .expect("trigger should fire within its interval");
        assert!(count.load(Ordering::SeqCst) >= 1);
        assert_eq!(&*payload.lock().unwrap(), "* * * * * * *");
    }

    #[test]
    fn misfire_is_decided_at_the_threshold_boundary() {
        let threshold = Duration::from_secs(60);
        let due = Utc::now();

        assert!(!is_misfire(due, due, threshold), "on time is not a misfire");
        assert!(
            !is_misfire(due, due - chrono::Duration::seconds(5), threshold),
            "an early wake is not a misfire"
        );
        assert!(
            !is_misfire(due, due + chrono::Duration::seconds(60), threshold),
            "exactly at the threshold still fires"
        );
        assert!(
            is_misfire(due, due + chrono::Duration::seconds(61), threshold),
            "past the threshold the occurrence is skipped"
        );
    }

    #[tokio::test]
    async fn start_after_standby_resumes_firing() {
        let engine = JobEngine::build(EngineConfig::default()).await;
        let count = Arc::new(AtomicU32::new(0));
        let fired = Arc::new(Notify::new());
        let payload = Arc::new(std::sync::Mutex::new(String::new()));

        engine
            .schedule_job(
                1,
                "* * * * * * *",
                counting_callback(Arc::clone(&count), Arc::clone(&fired), Arc::clone(&payload)),
            )
            .unwrap();

        engine.start();
        tokio::time::timeout(Duration::from_secs(3), fired.notified())
            .await
            .expect("trigger should fire while started");

        engine.standby();
        // Let any in-flight firing settle before taking the baseline.
        tokio::time::sleep(Duration::from_millis(1500)).await;
        let before = count.load(Ordering::SeqCst);

        engine.start();
        tokio::time::timeout(Duration::from_secs(3), async {
            loop {
                fired.notified().await;
                if count.load(Ordering::SeqCst) > before {
                    return;
                }
            }
        })
        .await
        .expect("trigger should fire again after resume");
    }

    #[tokio::test]
    async fn standby_holds_triggers() {
        let engine = JobEngine::build(EngineConfig::default()).await;
        let count = Arc::new(AtomicU32::new(0));
        let fired = Arc::new(Notify::new());
        let payload = Arc::new(std::sync::Mutex::new(String::new()));

        engine
            .schedule_job(
                1,
                "* * * * * * *",
                counting_callback(Arc::clone(&count), Arc::clone(&fired), Arc::clone(&payload)),
            )
            .unwrap();

        // Never started: nothing may fire.
        tokio::time::sleep(Duration::from_millis(1500)).await;
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }
}
