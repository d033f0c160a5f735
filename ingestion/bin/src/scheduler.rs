use media_ingestion_application::tasks::{BULK_MEDIA_REFRESH, REMOVE_ALL_ORPHANS_MEDIA};
use media_ingestion_application::{TaskRunError, TaskRunner};
use media_ingestion_domain::TaskStatus;
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};

const DAY: Duration = Duration::from_secs(24 * 60 * 60);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduledTask {
    pub task: &'static str,
    pub every: Duration,
}

pub fn default_schedule() -> Vec<ScheduledTask> {
    vec![
        ScheduledTask {
            task: BULK_MEDIA_REFRESH,
            every: DAY,
        },
        ScheduledTask {
            task: REMOVE_ALL_ORPHANS_MEDIA,
            every: 7 * DAY,
        },
    ]
}

/// Runs each task immediately and then at its interval until `shutdown`
/// resolves. Runs in flight at shutdown are cancelled and recorded as failed
/// before this returns.
pub async fn run_until<S>(runner: Arc<TaskRunner>, schedule: Vec<ScheduledTask>, shutdown: S)
where
    S: Future<Output = ()>,
{
    let (stop_tx, stop_rx) = watch::channel(false);
    let mut jobs = JoinSet::new();
    for entry in schedule {
        let runner = runner.clone();
        let stop = stop_rx.clone();
        info!("Scheduling {} every {:?}", entry.task, entry.every);
        jobs.spawn(async move {
            let mut ticker = tokio::time::interval(entry.every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = ticker.tick() => run_once(&runner, entry.task, stopped(stop.clone())).await,
                    _ = stopped(stop.clone()) => break,
                }
                if *stop.borrow() {
                    break;
                }
            }
        });
    }

    shutdown.await;
    info!("Stopping scheduler");
    let _ = stop_tx.send(true);
    while let Some(joined) = jobs.join_next().await {
        if let Err(e) = joined {
            error!("Scheduled job ended abnormally: {}", e);
        }
    }
}

/// Resolves once the stop flag is set or its sender is gone.
async fn stopped(mut stop: watch::Receiver<bool>) {
    let _ = stop.wait_for(|stopped| *stopped).await;
}

async fn run_once<S>(runner: &TaskRunner, task: &str, shutdown: S)
where
    S: Future<Output = ()>,
{
    match runner.run_until_cancelled(task, Value::Null, shutdown).await {
        Ok(report) if report.status == TaskStatus::Failed => {
            warn!("Scheduled task {} finished with failures", task)
        }
        Ok(_) => {}
        Err(TaskRunError::AlreadyRunning(_)) => {
            info!("Skipping scheduled {}: another run is in progress", task)
        }
        Err(e) => error!("Scheduled task {} could not start: {}", task, e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use media_ingestion_application::tasks::EmptyInput;
    use media_ingestion_application::{
        TaskContext, TaskDefinition, TaskError, TaskHandler, TaskRegistry, TaskRunRepository,
    };
    use media_ingestion_domain::TaskVisibility;
    use media_ingestion_infrastructure::InMemoryTaskRunRepository;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Counting(Arc<AtomicUsize>);

    #[async_trait]
    impl TaskHandler for Counting {
        type Input = EmptyInput;

        async fn handle(&self, _ctx: &TaskContext, _input: EmptyInput) -> Result<(), TaskError> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_tasks_run_at_their_intervals() {
        let refreshes = Arc::new(AtomicUsize::new(0));
        let cleanups = Arc::new(AtomicUsize::new(0));

        let mut registry = TaskRegistry::new();
        registry
            .register(TaskDefinition::new(
                BULK_MEDIA_REFRESH,
                "counts",
                TaskVisibility::Admin,
                Counting(refreshes.clone()),
            ))
            .unwrap();
        registry
            .register(TaskDefinition::new(
                REMOVE_ALL_ORPHANS_MEDIA,
                "counts",
                TaskVisibility::Admin,
                Counting(cleanups.clone()),
            ))
            .unwrap();
        let runner = Arc::new(TaskRunner::new(
            Arc::new(registry),
            Arc::new(InMemoryTaskRunRepository::new()),
        ));

        // Three days: refresh at 0h, 24h and 48h; cleanup only at 0h.
        let shutdown = tokio::time::sleep(3 * DAY - Duration::from_secs(60));
        run_until(runner, default_schedule(), shutdown).await;

        assert_eq!(refreshes.load(Ordering::SeqCst), 3);
        assert_eq!(cleanups.load(Ordering::SeqCst), 1);
    }

    struct Parked;

    #[async_trait]
    impl TaskHandler for Parked {
        type Input = EmptyInput;

        async fn handle(&self, ctx: &TaskContext, _input: EmptyInput) -> Result<(), TaskError> {
            ctx.step("refresh-movies", || async {
                tokio::time::sleep(DAY).await;
                Ok::<_, TaskError>(())
            })
            .await
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_records_cancelled_run_as_failed() {
        let mut registry = TaskRegistry::new();
        registry
            .register(TaskDefinition::new(
                BULK_MEDIA_REFRESH,
                "parks for a day",
                TaskVisibility::Admin,
                Parked,
            ))
            .unwrap();
        let runs = Arc::new(InMemoryTaskRunRepository::new());
        let runner = Arc::new(TaskRunner::new(Arc::new(registry), runs.clone()));
        let schedule = vec![ScheduledTask {
            task: BULK_MEDIA_REFRESH,
            every: DAY,
        }];

        run_until(
            runner.clone(),
            schedule,
            tokio::time::sleep(Duration::from_secs(10)),
        )
        .await;

        let state = runs.get(BULK_MEDIA_REFRESH).await.unwrap().unwrap();
        assert_eq!(state.status, TaskStatus::Failed);
        let report = state.report.unwrap();
        assert_eq!(report.step_log.len(), 1);
        assert!(report.error.unwrap().contains("shutdown"));

        // A restart is not blocked by the cancelled run.
        let next = runner
            .run_with_deadline(BULK_MEDIA_REFRESH, Value::Null, Duration::from_secs(1))
            .await;
        assert!(next.is_ok());
    }
}
