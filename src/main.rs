use async_trait::async_trait;
use clap::Parser;
use miette::{IntoDiagnostic, Result};
use payhub::application::queue::SubmitOutcome;
use payhub::application::scheduler::PaymentScheduler;
use payhub::config::SchedulerConfig;
use payhub::domain::event::EventType;
use payhub::domain::ports::RetryHandler;
use payhub::domain::work::{Amount, PaymentPriority, WorkItem};
use payhub::domain::worker::ANY_WORK_TYPE;
use payhub::error::ExecutionError;
use payhub::infrastructure::clock::SystemClock;
use payhub::infrastructure::in_memory::{InMemoryEventStore, TracingAlertSink};
use rust_decimal::Decimal;
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Number of synthetic payments to run through the scheduler.
    #[arg(long, default_value_t = 24)]
    payments: usize,

    /// Every Nth payment fails its downstream call (deterministic).
    #[arg(long, default_value_t = 7)]
    fail_every: usize,

    /// Number of simulated workers to register.
    #[arg(long, default_value_t = 3)]
    workers: u32,

    /// Optional scheduler configuration overrides (JSON).
    #[arg(long)]
    config: Option<PathBuf>,
}

/// Demo retry handler: real deployments re-dispatch into the orchestration
/// layer here.
struct LoggingRetry;

#[async_trait]
impl RetryHandler for LoggingRetry {
    async fn retry(&self, work_id: &str, attempt: u32) {
        tracing::info!(work_id, attempt, "retry fired");
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => {
            let raw = std::fs::read_to_string(path).into_diagnostic()?;
            serde_json::from_str::<SchedulerConfig>(&raw).into_diagnostic()?
        }
        None => SchedulerConfig::default(),
    };

    let scheduler = Arc::new(PaymentScheduler::new(
        config,
        Arc::new(InMemoryEventStore::new()),
        Arc::new(TracingAlertSink),
        Arc::new(LoggingRetry),
        Arc::new(SystemClock),
    ));

    // Simulated worker fleet: load grows with the index so selection has
    // something to choose between.
    for i in 0..cli.workers.max(1) {
        let types: HashSet<String> = [ANY_WORK_TYPE.to_string()].into();
        scheduler
            .update_worker(&format!("worker-{i}"), i * 25, 100, types)
            .await;
    }

    // Admit and queue the synthetic workload.
    let priorities = [
        PaymentPriority::Critical,
        PaymentPriority::HighValue,
        PaymentPriority::VipCustomer,
        PaymentPriority::Urgent,
        PaymentPriority::Standard,
        PaymentPriority::Batch,
    ];
    let mut admitted = 0usize;
    for i in 0..cli.payments {
        let tenant = format!("tenant-{}", i % 3);
        let user = format!("user-{i}");
        if !scheduler.can_admit(&tenant, &user).await {
            tracing::warn!(payment = i, "admission denied, shedding");
            continue;
        }

        let amount = Amount::new(Decimal::from(100 + i as i64)).into_diagnostic()?;
        let item = WorkItem::new(
            format!("pay-{i}"),
            tenant,
            user,
            priorities[i % priorities.len()],
            amount,
        );
        match scheduler.submit(item).await {
            SubmitOutcome::Accepted => {
                scheduler
                    .record_event(&format!("pay-{i}"), EventType::Submitted, serde_json::json!({}))
                    .await
                    .into_diagnostic()?;
                admitted += 1;
            }
            SubmitOutcome::RejectedQueueFull => {
                tracing::warn!(payment = i, "queue full, shedding");
            }
        }
    }

    // Drain the queue in dispatch order.
    let mut batch_ids = Vec::with_capacity(admitted);
    while let Some(item) = scheduler.take_next(Duration::from_millis(10)).await {
        batch_ids.push(item.id);
    }

    // Dispatch as one batch. Failures are deterministic: every Nth payment.
    let fail_every = cli.fail_every.max(1);
    let unit_scheduler = Arc::clone(&scheduler);
    let result = scheduler
        .process_batch(batch_ids, move |id| {
            let scheduler = Arc::clone(&unit_scheduler);
            async move {
                let index: usize = id
                    .strip_prefix("pay-")
                    .and_then(|n| n.parse().ok())
                    .unwrap_or(0);
                let bank = ["BANK_A", "BANK_B", "BANK_C"][index % 3];

                let worker = scheduler
                    .select_worker(ANY_WORK_TYPE, "demo")
                    .await
                    .unwrap_or_else(|| "worker-0".to_string());
                scheduler
                    .record_event(
                        &id,
                        EventType::Routed,
                        serde_json::json!({"processor": bank, "worker": worker}),
                    )
                    .await
                    .map_err(|e| ExecutionError::new(e.to_string()))?;

                let call = scheduler
                    .execute_protected(bank, || async move {
                        if index > 0 && index % fail_every == 0 {
                            Err(ExecutionError::new("PROCESSING_ERROR"))
                        } else {
                            Ok(())
                        }
                    })
                    .await;

                match call {
                    Ok(()) => {
                        scheduler
                            .record_event(&id, EventType::Completed, serde_json::json!({}))
                            .await
                            .map_err(|e| ExecutionError::new(e.to_string()))?;
                        Ok(())
                    }
                    Err(_) => {
                        scheduler
                            .record_event(
                                &id,
                                EventType::Failed,
                                serde_json::json!({"error": "PROCESSING_ERROR"}),
                            )
                            .await
                            .map_err(|e| ExecutionError::new(e.to_string()))?;
                        Err(ExecutionError::new("PROCESSING_ERROR"))
                    }
                }
            }
        })
        .await;

    println!(
        "batch: {}/{} succeeded ({} failed) in {}ms",
        result.succeeded, result.total, result.failed, result.elapsed_ms
    );

    // Run the failed payments through the retry pipeline; exhaust the
    // budget for the first one to show the dead-letter path.
    for (i, id) in result.failed_ids.iter().enumerate() {
        let attempt = if i == 0 { 3 } else { 0 };
        scheduler
            .record_failure(id, "tenant-demo", "user-demo", "PROCESSING_ERROR", attempt)
            .await
            .into_diagnostic()?;
    }

    let dead = scheduler.drain_dead_letters().await;
    for entry in &dead {
        println!(
            "dead-lettered: {} after {} retries ({})",
            entry.work_id, entry.retry_count, entry.last_error
        );
        let state = scheduler.project(&entry.work_id).await.into_diagnostic()?;
        println!("  projected state: {state:?}");
    }

    // Feed the advisor enough history to produce a recommendation.
    let volumes: HashMap<u32, f64> = (0..24u32)
        .map(|h| (h, if (9..=11).contains(&h) { 900.0 } else { 120.0 }))
        .collect();
    for _ in 0..6 {
        scheduler
            .record_load_sample(volumes.clone(), cli.workers, 75.0)
            .await;
    }
    let recommendation = scheduler.recommend().await;
    println!(
        "scaling: {} workers recommended ({})",
        recommendation.worker_count, recommendation.reason
    );

    let metrics = scheduler.fleet_metrics().await;
    println!(
        "fleet: {} workers, avg load {:.1}, capacity {}/{}",
        metrics.total_workers, metrics.average_load, metrics.used_capacity, metrics.total_capacity
    );

    for (key, (state, failures)) in scheduler.breaker_status().await {
        println!("breaker {key}: {state:?} ({failures} consecutive failures)");
    }

    scheduler.shutdown();
    Ok(())
}
