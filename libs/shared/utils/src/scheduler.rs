use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::task::AbortHandle;
use tracing::{debug, warn};

use crate::clock::Clock;

struct ScheduledJob {
    id: u64,
    group: String,
    next_fire_at: Option<DateTime<Utc>>,
    recurring: bool,
    handle: AbortHandle,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobInfo {
    pub key: String,
    pub group: String,
    pub next_fire_at: Option<DateTime<Utc>>,
    pub recurring: bool,
}

/// Owns every pending timer, keyed by a deterministic job name and tagged with
/// a group (patient id, incident id) for bulk cancellation. Each job runs on its
/// own task so a slow job never delays another.
#[derive(Clone)]
pub struct JobScheduler {
    jobs: Arc<Mutex<HashMap<String, ScheduledJob>>>,
    next_id: Arc<AtomicU64>,
    clock: Arc<dyn Clock>,
}

impl JobScheduler {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            jobs: Arc::new(Mutex::new(HashMap::new())),
            next_id: Arc::new(AtomicU64::new(1)),
            clock,
        }
    }

    pub fn clock(&self) -> Arc<dyn Clock> {
        Arc::clone(&self.clock)
    }

    fn table(&self) -> MutexGuard<'_, HashMap<String, ScheduledJob>> {
        match self.jobs.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                warn!("Job table lock was poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }

    /// Runs `job` once at `fire_at`, replacing any job already under `key`.
    pub fn schedule_once<F>(&self, key: &str, group: &str, fire_at: DateTime<Utc>, job: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let mut table = self.table();
        if let Some(previous) = table.remove(key) {
            previous.handle.abort();
        }
        self.spawn_once(&mut table, key, group, fire_at, job);
    }

    /// Like `schedule_once` but leaves an existing job untouched. Returns
    /// whether the job was installed.
    pub fn schedule_once_if_absent<F>(&self, key: &str, group: &str, fire_at: DateTime<Utc>, job: F) -> bool
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let mut table = self.table();
        if table.contains_key(key) {
            debug!(key = %key, "Job already pending, not rescheduling");
            return false;
        }
        self.spawn_once(&mut table, key, group, fire_at, job);
        true
    }

    fn spawn_once<F>(
        &self,
        table: &mut HashMap<String, ScheduledJob>,
        key: &str,
        group: &str,
        fire_at: DateTime<Utc>,
        job: F,
    ) where
        F: Future<Output = ()> + Send + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let jobs = Arc::clone(&self.jobs);
        let clock = Arc::clone(&self.clock);
        let task_key = key.to_string();

        let task = tokio::spawn(async move {
            let delay = (fire_at - clock.now()).to_std().unwrap_or_default();
            tokio::time::sleep(delay).await;

            // Detach before running: cancelling now must not abort an in-flight send.
            if let Ok(mut table) = jobs.lock() {
                if table.get(&task_key).map(|job| job.id) == Some(id) {
                    table.remove(&task_key);
                }
            }

            debug!(key = %task_key, "Firing one-shot job");
            job.await;
        });

        table.insert(
            key.to_string(),
            ScheduledJob {
                id,
                group: group.to_string(),
                next_fire_at: Some(fire_at),
                recurring: false,
                handle: task.abort_handle(),
            },
        );
    }

    /// Installs a recurring job. `next_fire` maps "now" to the next nominal
    /// fire time (strictly later than now); `None` ends the job. `job` receives
    /// the nominal time it fired for.
    pub fn schedule_recurring<N, J, Fut>(&self, key: &str, group: &str, next_fire: N, job: J)
    where
        N: Fn(DateTime<Utc>) -> Option<DateTime<Utc>> + Send + Sync + 'static,
        J: Fn(DateTime<Utc>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let mut table = self.table();
        if let Some(previous) = table.remove(key) {
            previous.handle.abort();
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let jobs = Arc::clone(&self.jobs);
        let clock = Arc::clone(&self.clock);
        let task_key = key.to_string();
        let first_fire = next_fire(clock.now());

        let task = tokio::spawn(async move {
            loop {
                let now = clock.now();
                let Some(fire_at) = next_fire(now) else {
                    break;
                };

                if let Ok(mut table) = jobs.lock() {
                    match table.get_mut(&task_key) {
                        Some(entry) if entry.id == id => entry.next_fire_at = Some(fire_at),
                        _ => return,
                    }
                }

                let delay = (fire_at - now).to_std().unwrap_or_default();
                tokio::time::sleep(delay).await;

                debug!(key = %task_key, fire_at = %fire_at, "Firing recurring job");
                job(fire_at).await;
            }

            if let Ok(mut table) = jobs.lock() {
                if table.get(&task_key).map(|job| job.id) == Some(id) {
                    table.remove(&task_key);
                }
            }
        });

        table.insert(
            key.to_string(),
            ScheduledJob {
                id,
                group: group.to_string(),
                next_fire_at: first_fire,
                recurring: true,
                handle: task.abort_handle(),
            },
        );
    }

    pub fn cancel(&self, key: &str) -> bool {
        match self.table().remove(key) {
            Some(job) => {
                job.handle.abort();
                true
            }
            None => false,
        }
    }

    /// Cancels every job in `group`. Returns how many were cancelled; zero is not an error.
    pub fn cancel_group(&self, group: &str) -> usize {
        let mut table = self.table();
        let keys: Vec<String> = table
            .iter()
            .filter(|(_, job)| job.group == group)
            .map(|(key, _)| key.clone())
            .collect();

        for key in &keys {
            if let Some(job) = table.remove(key) {
                job.handle.abort();
            }
        }
        keys.len()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.table().contains_key(key)
    }

    pub fn jobs_in_group(&self, group: &str) -> Vec<JobInfo> {
        let mut jobs: Vec<JobInfo> = self
            .table()
            .iter()
            .filter(|(_, job)| job.group == group)
            .map(|(key, job)| JobInfo {
                key: key.clone(),
                group: job.group.clone(),
                next_fire_at: job.next_fire_at,
                recurring: job.recurring,
            })
            .collect();
        jobs.sort_by(|a, b| a.key.cmp(&b.key));
        jobs
    }

    pub fn len(&self) -> usize {
        self.table().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use chrono::Duration;
    use std::sync::atomic::AtomicUsize;

    fn scheduler() -> (JobScheduler, Arc<FixedClock>) {
        let clock = Arc::new(FixedClock::new(Utc::now()));
        (JobScheduler::new(clock.clone()), clock)
    }

    #[tokio::test(start_paused = true)]
    async fn test_one_shot_fires_and_leaves_table() {
        let (scheduler, clock) = scheduler();
        let fired = Arc::new(AtomicUsize::new(0));
        let counter = fired.clone();

        scheduler.schedule_once("job-a", "patient-1", clock.now() + Duration::minutes(5), async move {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        assert!(scheduler.contains("job-a"));

        tokio::time::sleep(std::time::Duration::from_secs(301)).await;

        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert!(!scheduler.contains("job-a"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_group_only_touches_that_group() {
        let (scheduler, clock) = scheduler();
        let fired = Arc::new(AtomicUsize::new(0));

        for (key, group) in [("a1", "patient-1"), ("a2", "patient-1"), ("b1", "patient-2")] {
            let counter = fired.clone();
            scheduler.schedule_once(key, group, clock.now() + Duration::minutes(1), async move {
                counter.fetch_add(1, Ordering::SeqCst);
            });
        }

        assert_eq!(scheduler.cancel_group("patient-1"), 2);
        assert_eq!(scheduler.cancel_group("patient-1"), 0);
        assert!(scheduler.contains("b1"));

        tokio::time::sleep(std::time::Duration::from_secs(120)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_if_absent_keeps_first_job() {
        let (scheduler, clock) = scheduler();
        let at = clock.now() + Duration::minutes(1);

        assert!(scheduler.schedule_once_if_absent("tier", "inc", at, async {}));
        assert!(!scheduler.schedule_once_if_absent("tier", "inc", at, async {}));
        assert_eq!(scheduler.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_recurring_job_fires_repeatedly_until_cancelled() {
        let (scheduler, clock) = scheduler();
        let fired = Arc::new(AtomicUsize::new(0));
        let counter = fired.clone();
        let start = clock.now();

        scheduler.schedule_recurring(
            "recurring",
            "patient-1",
            move |_now| Some(start + Duration::minutes(10)),
            move |_at| {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                }
            },
        );

        tokio::time::sleep(std::time::Duration::from_secs(25 * 60)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 2);

        assert!(scheduler.cancel("recurring"));
        tokio::time::sleep(std::time::Duration::from_secs(60 * 60)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 2);
    }
}
