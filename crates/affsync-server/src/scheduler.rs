//! Background job scheduler.
//!
//! Registers the recurring reconcile pass over every brand.

use affsync_sync::IngestionPipeline;
use tokio_cron_scheduler::{Job, JobScheduler, JobSchedulerError};

/// Builds and starts the background job scheduler.
///
/// Returns the running [`JobScheduler`] handle, which must be kept alive for
/// the lifetime of the process. Dropping it stops the jobs.
///
/// # Errors
///
/// Returns [`JobSchedulerError`] if `reconcile_cron` does not parse or the
/// scheduler cannot be initialised or started.
pub async fn build_scheduler(
    pipeline: IngestionPipeline,
    reconcile_cron: &str,
) -> Result<JobScheduler, JobSchedulerError> {
    let scheduler = JobScheduler::new().await?;
    register_reconcile_job(&scheduler, pipeline, reconcile_cron).await?;
    scheduler.start().await?;
    Ok(scheduler)
}

async fn register_reconcile_job(
    scheduler: &JobScheduler,
    pipeline: IngestionPipeline,
    cron: &str,
) -> Result<(), JobSchedulerError> {
    let job = Job::new_async(cron, move |_uuid, _lock| {
        let pipeline = pipeline.clone();

        Box::pin(async move {
            tracing::info!("scheduler: starting reconcile pass");
            run_reconcile_job(&pipeline).await;
        })
    })?;

    scheduler.add(job).await?;
    tracing::info!(cron, "scheduler: reconcile job registered");
    Ok(())
}

async fn run_reconcile_job(pipeline: &IngestionPipeline) {
    let results = match pipeline.reconcile_all().await {
        Ok(r) => r,
        Err(e) => {
            tracing::error!(error = %e, "scheduler: reconcile pass failed");
            return;
        }
    };

    let (checked, soft_deleted, failed) =
        results
            .iter()
            .fold((0u32, 0u32, 0u32), |(c, s, f), (_, summary)| {
                (
                    c + summary.checked,
                    s + summary.soft_deleted,
                    f + summary.failed,
                )
            });

    tracing::info!(
        brands = results.len(),
        checked,
        soft_deleted,
        failed,
        "scheduler: reconcile pass complete"
    );
}
