use jobledger::{prelude::*, repository::memory::InMemoryJobRepository};
use tokio::sync::mpsc;

const DEFAULT_LOG_LEVEL: tracing::Level = tracing::Level::INFO;
const LOG_LEVEL: &str = "JOBLEDGER_LOG_LEVEL";

#[tokio::main]
pub async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let log_level = std::env::var(LOG_LEVEL)
        .ok()
        .and_then(|level| level.parse().ok())
        .unwrap_or(DEFAULT_LOG_LEVEL);
    tracing_subscriber::fmt().with_max_level(log_level).init();

    let manager = JobManager::new(InMemoryJobRepository::new());
    let task = TaskId::from("nightly_report");

    let (sender, mut receiver) = mpsc::unbounded_channel::<StatusChange>();
    let audit = tokio::spawn(async move {
        while let Some(change) = receiver.recv().await {
            tracing::info!(
                job_id = %change.job_id,
                "Audit: {} -> {}",
                change.previous,
                change.current
            );
        }
    });

    let log_change = Subscriber::from_fn(|job: &Job, change: &StatusChange| {
        println!("{} moved from {} to {}", job.id(), change.previous, change.current);
    });

    let mut first = manager.create(&task, [log_change, sender.into()]).await?;
    println!("Created job {}", first.id());

    first.mark_pending()?;
    first.mark_running()?;
    manager.set(&first).await?;

    if let Err(err) = manager.delete(&first, false).await {
        println!("Could not delete running job: {err}");
    }

    first.mark_failed("worker lost connection")?;
    manager.set(&first).await?;

    let mut second = manager.create(&task, []).await?;
    second.mark_running()?;
    second.mark_completed()?;
    manager.set(&second).await?;

    let latest = manager.get_latest_job(&task).await?;
    println!("Latest job for {task}: {} ({})", latest.id(), latest.status());

    for job in manager.get_jobs_for_task(&task).await? {
        println!("  {} {} {:?}", job.id(), job.status(), job.stacktrace());
        manager.delete(&job, false).await?;
    }

    drop(first);
    audit.await?;
    Ok(())
}
