//! The scheduler service: fires a fixed list of recurring entries onto a
//! queue, replaying missed firings on startup from a persisted cursor.

use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;

use crate::error::{JobFrameworkError, Result};
use crate::jobs::job::JobIdentifier;
use crate::jobs::queue::{JobQueue, PushOptions};
use crate::jobs::scheduler::recurrence::Recurrence;

const LAST_DATE_METADATA_KEY: &str = "jobScheduleLastDate";

/// How stale firings are handled when the scheduler starts (or wakes)
/// long after the last firing it recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Accuracy {
    /// Collapse every stale firing for an entry into a single push.
    Latest,
    /// Push every firing in `(lastDate, now]`, in order.
    All,
}

/// One recurring job registration.
struct ScheduleEntry {
    name: JobIdentifier,
    parameters: Vec<u8>,
    schedule: Recurrence,
    accuracy: Accuracy,
    next_scheduled_date: DateTime<Utc>,
}

/// Long-running service that pushes each registered entry's job onto a
/// [`JobQueue`] at its scheduled instants.
///
/// The schedule list is mutated only by the task running [`Self::run`]
/// (single-writer), so entries live behind a plain `Vec` guarded by the
/// fact that `add_job` is only meant to be called before `run` starts.
pub struct Scheduler {
    queue: JobQueue,
    entries: Vec<ScheduleEntry>,
    cancellation: CancellationToken,
}

impl Scheduler {
    pub fn new(queue: JobQueue) -> Self {
        Self {
            queue,
            entries: Vec::new(),
            cancellation: CancellationToken::new(),
        }
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancellation.clone()
    }

    /// Register a recurring job. `next_scheduled_date` is computed from
    /// `schedule.next_date(after: now)` once [`Self::run`] starts, so the
    /// order of `add_job` calls relative to wall-clock time doesn't
    /// matter.
    pub fn add_job(
        &mut self,
        name: impl Into<JobIdentifier>,
        parameters: Vec<u8>,
        schedule: Recurrence,
        accuracy: Accuracy,
    ) {
        self.entries.push(ScheduleEntry {
            name: name.into(),
            parameters,
            schedule,
            accuracy,
            // Placeholder; recomputed from the persisted cursor in `run`.
            next_scheduled_date: Utc::now(),
        });
    }

    /// Returns `(index, next_scheduled_date)` of the entry with the
    /// smallest `next_scheduled_date`, ties broken by lower index. Plain
    /// linear scan: entry counts are a handful of recurring registrations,
    /// not per-request data, so a heap is unneeded complexity here.
    fn next_job(&self) -> Option<(usize, DateTime<Utc>)> {
        self.entries
            .iter()
            .enumerate()
            .map(|(i, e)| (i, e.next_scheduled_date))
            .min_by_key(|(_, date)| *date)
    }

    async fn push_entry(&self, index: usize) -> Result<()> {
        let entry = &self.entries[index];
        self.queue
            .push(entry.name.clone(), entry.parameters.clone(), PushOptions::default())
            .await
            .map_err(JobFrameworkError::Driver)?;
        Ok(())
    }

    async fn persist_last_date(&self, date: DateTime<Utc>) -> Result<()> {
        self.queue
            .driver()
            .set_metadata(LAST_DATE_METADATA_KEY, date.to_rfc3339().into_bytes())
            .await
            .map_err(JobFrameworkError::Driver)?;
        Ok(())
    }

    async fn read_last_date(&self) -> Result<DateTime<Utc>> {
        let raw = self
            .queue
            .driver()
            .get_metadata(LAST_DATE_METADATA_KEY)
            .await
            .map_err(JobFrameworkError::Driver)?;

        match raw {
            Some(bytes) => {
                let text = String::from_utf8(bytes)
                    .map_err(|err| JobFrameworkError::MalformedEnvelope(err.to_string()))?;
                DateTime::parse_from_rfc3339(&text)
                    .map(|dt| dt.with_timezone(&Utc))
                    .map_err(|err| JobFrameworkError::MalformedEnvelope(err.to_string()))
            }
            None => Ok(Utc::now()),
        }
    }

    /// Run the catch-up pass followed by the steady fire loop, until the
    /// cancellation token fires.
    pub async fn run(&mut self) -> Result<()> {
        let last_date = self.read_last_date().await?;
        for entry in &mut self.entries {
            entry.next_scheduled_date = entry.schedule.next_date(last_date);
        }

        self.catch_up().await?;
        self.steady_loop().await
    }

    async fn catch_up(&mut self) -> Result<()> {
        loop {
            let now = Utc::now();
            let due_indices: Vec<usize> = self
                .entries
                .iter()
                .enumerate()
                .filter(|(_, e)| e.next_scheduled_date <= now)
                .map(|(i, _)| i)
                .collect();

            if due_indices.is_empty() {
                return Ok(());
            }

            // Accuracy is per-entry; partition the due set by each entry's
            // own policy rather than assuming a single global accuracy.
            let all_indices: Vec<usize> = due_indices
                .iter()
                .copied()
                .filter(|&i| self.entries[i].accuracy == Accuracy::All)
                .collect();

            if let Some(&index) = all_indices
                .iter()
                .min_by_key(|&&i| self.entries[i].next_scheduled_date)
            {
                self.push_entry(index).await?;
                let entry = &mut self.entries[index];
                entry.next_scheduled_date = entry.schedule.next_date(entry.next_scheduled_date);
                continue;
            }

            for &index in &due_indices {
                self.push_entry(index).await?;
                let entry = &mut self.entries[index];
                entry.next_scheduled_date = entry.schedule.next_date(now);
            }
        }
    }

    async fn steady_loop(&mut self) -> Result<()> {
        loop {
            let Some((_, fire)) = self.next_job() else {
                return Ok(());
            };

            let now = Utc::now();
            let wait = (fire - now).to_std().unwrap_or_default();

            tokio::select! {
                biased;
                _ = self.cancellation.cancelled() => return Ok(()),
                _ = tokio::time::sleep(wait) => {}
            }

            let due_now: Vec<usize> = self
                .entries
                .iter()
                .enumerate()
                .filter(|(_, e)| e.next_scheduled_date == fire)
                .map(|(i, _)| i)
                .collect();

            for index in due_now {
                self.push_entry(index).await?;
                let entry = &mut self.entries[index];
                entry.next_scheduled_date = entry.schedule.next_date(fire);
            }

            self.persist_last_date(fire).await?;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::memory::InMemoryDriver;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn entry(accuracy: Accuracy, next_scheduled_date: DateTime<Utc>) -> ScheduleEntry {
        ScheduleEntry {
            name: JobIdentifier::new("recurring"),
            parameters: vec![],
            schedule: Recurrence::EveryMinute { second: 0 },
            accuracy,
            next_scheduled_date,
        }
    }

    fn scheduler_with_push_counter() -> (Scheduler, Arc<AtomicUsize>) {
        let driver = Arc::new(InMemoryDriver::new());
        let counter = Arc::new(AtomicUsize::new(0));
        let counter_clone = counter.clone();
        let queue = JobQueue::new(driver).with_on_push_job(move |_req| {
            let counter = counter_clone.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
            }
        });
        (Scheduler::new(queue), counter)
    }

    #[test]
    fn next_job_picks_smallest_breaking_ties_by_index() {
        let (mut scheduler, _counter) = scheduler_with_push_counter();
        let now = Utc::now();
        scheduler.entries.push(entry(Accuracy::Latest, now + chrono::Duration::seconds(10)));
        scheduler.entries.push(entry(Accuracy::Latest, now + chrono::Duration::seconds(5)));
        scheduler.entries.push(entry(Accuracy::Latest, now + chrono::Duration::seconds(5)));

        let (index, date) = scheduler.next_job().unwrap();
        assert_eq!(index, 1);
        assert_eq!(date, now + chrono::Duration::seconds(5));
    }

    #[tokio::test]
    async fn catch_up_with_accuracy_all_pushes_every_missed_firing() {
        let (mut scheduler, counter) = scheduler_with_push_counter();
        let now = Utc::now();
        scheduler.entries.push(entry(Accuracy::All, now - chrono::Duration::seconds(120)));

        scheduler.catch_up().await.unwrap();

        // EveryMinute(second=0) fires once per minute; two minutes in the
        // past plus the current instant yields at least two catch-up pushes.
        assert!(counter.load(Ordering::SeqCst) >= 2, "expected at least 2 pushes, got {}", counter.load(Ordering::SeqCst));
        assert!(scheduler.entries[0].next_scheduled_date > now);
    }

    #[tokio::test]
    async fn catch_up_with_accuracy_latest_collapses_to_one_push() {
        let (mut scheduler, counter) = scheduler_with_push_counter();
        let now = Utc::now();
        scheduler.entries.push(entry(Accuracy::Latest, now - chrono::Duration::seconds(120)));

        scheduler.catch_up().await.unwrap();

        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert!(scheduler.entries[0].next_scheduled_date > now);
    }

    #[tokio::test]
    async fn catch_up_is_a_no_op_when_nothing_is_due() {
        let (mut scheduler, counter) = scheduler_with_push_counter();
        let now = Utc::now();
        scheduler
            .entries
            .push(entry(Accuracy::All, now + chrono::Duration::seconds(60)));

        scheduler.catch_up().await.unwrap();

        assert_eq!(counter.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn last_date_persists_and_round_trips() {
        let (scheduler, _counter) = scheduler_with_push_counter();
        let at = Utc::now();

        scheduler.persist_last_date(at).await.unwrap();
        let read_back = scheduler.read_last_date().await.unwrap();

        assert_eq!(read_back.timestamp(), at.timestamp());
    }
}
