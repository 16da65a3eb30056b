//! Scheduler: owns the job engine and the trigger-expression normalization.
//!
//! The engine is built on a background task at construction time; `start`,
//! `stop` and `register_jobs` all wait for that build to finish, so callers
//! can race the constructor freely.

use std::sync::Arc;

use tokio::sync::watch;
use tracing::{error, info};

use crate::engine::{EngineConfig, JobCallback, JobEngine, DAY_OF_MONTH_ANY};

/// One registration: a 5-field domain trigger expression
/// (`min hour dom month dow`) and the callback to fire.
pub struct ScheduleEntry {
    pub expression: String,
    pub callback: JobCallback,
}

pub struct Scheduler {
    engine: watch::Receiver<Option<Arc<JobEngine>>>,
}

impl Scheduler {
    /// Kick off the engine build in the background. Must be called from
    /// within a tokio runtime.
    pub fn new(config: EngineConfig) -> Self {
        let (tx, rx) = watch::channel(None);
        tokio::spawn(async move {
            let engine = JobEngine::build(config).await;
            let _ = tx.send(Some(Arc::new(engine)));
        });
        Self { engine: rx }
    }

    /// Wait for the background build to publish the engine.
    async fn engine(&self) -> Arc<JobEngine> {
        let mut rx = self.engine.clone();
        loop {
            if let Some(engine) = rx.borrow_and_update().as_ref() {
                return Arc::clone(engine);
            }
            rx.changed()
                .await
                .expect("engine build task dropped without publishing");
        }
    }

    /// Normalize and schedule every entry. A malformed entry is logged and
    /// skipped without aborting the rest; its identity is rolled back so the
    /// jobs that did register keep contiguous ids. Returns the registered
    /// count.
    pub async fn register_jobs(&self, entries: Vec<ScheduleEntry>) -> usize {
        let engine = self.engine().await;
        let mut job_count: u32 = 0;
        for entry in entries {
            let expression = normalize_expression(&entry.expression);
            info!("creating job and trigger for `{expression}`");
            job_count += 1;
            match engine.schedule_job(job_count, &expression, entry.callback) {
                Ok(state) => {
                    info!("job #{job_count} scheduled with trigger `{expression}`");
                    info!("job trigger is in {state:?} state");
                }
                Err(e) => {
                    error!("trigger expression is invalid: {e}");
                    error!("job #{job_count} FAILED!");
                    job_count -= 1;
                }
            }
        }
        job_count as usize
    }

    /// Idempotent; blocks until the engine build has finished.
    pub async fn start(&self) {
        let engine = self.engine().await;
        if engine.is_started() {
            return;
        }
        engine.start();
        info!("announcement scheduler started");
    }

    /// Idempotent; places the engine in standby without discarding jobs.
    pub async fn stop(&self) {
        let engine = self.engine().await;
        if engine.in_standby() {
            return;
        }
        engine.standby();
        info!("announcement scheduler placed in standby");
    }
}

/// Translate a 5-field domain expression into the engine's 7-field form:
/// prepend a literal `0` seconds field, force day-of-month to the `?`
/// placeholder (the domain recurs by day of week, and the engine rejects
/// both day fields being concrete), append an every-year field. Purely
/// positional; field order is never touched.
pub fn normalize_expression(expression: &str) -> String {
    let mut fields: Vec<&str> = Vec::with_capacity(7);
    fields.push("0");
    fields.extend(expression.split_whitespace());
    if fields.len() > 3 {
        fields[3] = DAY_OF_MONTH_ANY;
    }
    let mut normalized = fields.join(" ");
    normalized.push_str(" *");
    normalized
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::FutureExt;

    fn noop_entry(expression: &str) -> ScheduleEntry {
        ScheduleEntry {
            expression: expression.to_string(),
            callback: Arc::new(|_| async { anyhow::Ok(()) }.boxed()),
        }
    }

    #[test]
    fn normalization_prepends_seconds_and_blanks_day_of_month() {
        assert_eq!(
            normalize_expression("30 * * * SUN-SAT"),
            "0 30 * ? * SUN-SAT *"
        );
    }

    #[test]
    fn normalization_preserves_field_order() {
        assert_eq!(
            normalize_expression("15 6-18 1 JAN MON-SAT"),
            "0 15 6-18 ? JAN MON-SAT *"
        );
    }

    #[test]
    fn normalized_quarter_expressions_land_on_their_minute() {
        use std::str::FromStr;
        for (expression, minute) in [
            ("0 * * * SUN-SAT", 0),
            ("15 * * * SUN-SAT", 15),
            ("30 * * * SUN-SAT", 30),
            ("45 * * * SUN-SAT", 45),
        ] {
            let normalized = normalize_expression(expression).replace('?', "*");
            let schedule = cron::Schedule::from_str(&normalized).unwrap();
            let now = chrono::Utc::now();
            let next = schedule.after(&now).next().unwrap();
            assert!(next > now, "next occurrence must be in the future");
            assert_eq!(
                chrono::Timelike::minute(&next),
                minute,
                "expression {expression} must fire on minute {minute}"
            );
        }
    }

    #[tokio::test]
    async fn malformed_entry_is_skipped_without_blocking_the_rest() {
        let scheduler = Scheduler::new(EngineConfig::default());
        let registered = scheduler
            .register_jobs(vec![
                noop_entry("15 * * * SUN-SAT"),
                noop_entry("this is not a trigger expression at all ! !"),
                noop_entry("45 * * * SUN-SAT"),
            ])
            .await;
        assert_eq!(registered, 2);
    }

    #[tokio::test]
    async fn start_twice_and_stop_twice_are_no_ops() {
        let scheduler = Scheduler::new(EngineConfig::default());
        scheduler.start().await;
        scheduler.start().await;
        assert!(scheduler.engine().await.is_started());

        scheduler.stop().await;
        scheduler.stop().await;
        assert!(scheduler.engine().await.in_standby());
    }

    #[tokio::test]
    async fn stop_before_start_is_a_no_op() {
        let scheduler = Scheduler::new(EngineConfig::default());
        scheduler.stop().await;
        assert!(scheduler.engine().await.in_standby());
    }
}
