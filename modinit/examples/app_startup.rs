//! Application Startup Demo
//!
//! Initializes the subsystems of a small web application in dependency order.
//!
//! ## Module Graph
//!
//! ```text
//!               config
//!                 |
//!      ┌──────────┼──────────┐
//!      │          │          │
//!   database    cache     metrics
//!      │          │
//!      └────┬─────┘
//!           │
//!        sessions
//!           │
//!          http
//! ```
//!
//! ## Key Demonstration
//!
//! - database, cache and metrics start in parallel once config is done
//! - cache fails on the first pass, so sessions and http are skipped while
//!   metrics still completes
//! - after `reset`, a second pass with a working cache initializes everything
//!
//! ## Run with
//!
//! ```bash
//! RUST_LOG=modinit=debug cargo run --example app_startup
//! ```

use modinit::prelude::*;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

async fn simulate(work: Duration) -> InitResult {
    tokio::time::sleep(work).await;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    println!("\n=== Application Startup Demo ===\n");

    let config = RunConfig::concurrent(4)
        .with_module_timeout(Duration::from_secs(2))
        .with_pass_timeout(Duration::from_secs(10));
    let coordinator = Coordinator::new(config);

    let cache_online = Arc::new(AtomicBool::new(false));

    coordinator.register("config", &[], || simulate(Duration::from_millis(50)))?;
    coordinator.register("database", &["config"], || {
        simulate(Duration::from_millis(300))
    })?;
    let online = Arc::clone(&cache_online);
    coordinator.register("cache", &["config"], move || {
        let online = online.load(Ordering::SeqCst);
        async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            if online {
                Ok(())
            } else {
                Err(InitError::new("cache backend unreachable at 127.0.0.1:6379"))
            }
        }
    })?;
    coordinator.register("metrics", &["config"], || {
        simulate(Duration::from_millis(150))
    })?;
    coordinator.register("sessions", &["database", "cache"], || {
        simulate(Duration::from_millis(50))
    })?;
    coordinator.register("http", &["sessions"], || simulate(Duration::from_millis(20)))?;

    println!("Initialization levels:");
    for (depth, level) in coordinator.levels()?.iter().enumerate() {
        let names: Vec<&str> = level.iter().map(ModuleId::name).collect();
        println!("  {depth}: {}", names.join(", "));
    }
    println!("\nGraphviz:\n{}", coordinator.to_dot());

    // First pass: the cache is down
    let report = coordinator.run().await?;
    print_report("First pass", &report);

    // Bring the cache up and try again
    cache_online.store(true, Ordering::SeqCst);
    coordinator.reset()?;
    let report = coordinator.run().await?;
    print_report("Second pass", &report);

    println!("Report as JSON:\n{}", serde_json::to_string_pretty(&report)?);

    Ok(())
}

fn print_report(title: &str, report: &RunReport) {
    println!("\n--- {title} ({}) ---", report.summary());
    for entry in report.modules() {
        let detail = match &entry.outcome {
            ModuleOutcome::Done { elapsed } => format!("done in {elapsed:?}"),
            ModuleOutcome::Failed { failure } => format!("FAILED: {failure}"),
            ModuleOutcome::Skipped {
                reason: SkipReason::DependencyFailed { dependency },
            } => format!("skipped, '{dependency}' failed"),
            ModuleOutcome::Skipped {
                reason: SkipReason::Cancelled,
            } => "skipped, pass cancelled".to_string(),
        };
        println!("  {:<10} {detail}", entry.module.name());
    }
    println!();
}
