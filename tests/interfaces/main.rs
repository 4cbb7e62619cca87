//! Interface tests for the bridge using Cucumber.
//!
//! Scenarios drive the event listener, the correlation saga and the job
//! workers against the in-memory clients:
//!
//! ```bash
//! cargo test --test interfaces
//! ```

mod steps;

use cucumber::World;
use steps::correlation::CorrelationWorld;
use steps::job_workers::JobWorkerWorld;

#[tokio::main]
async fn main() {
    println!("\n=== Running IM Correlation Interface Tests ===\n");
    CorrelationWorld::cucumber()
        .fail_on_skipped()
        .run("tests/interfaces/features/correlation.feature")
        .await;

    println!("\n=== Running Job Worker Interface Tests ===\n");
    JobWorkerWorld::cucumber()
        .fail_on_skipped()
        .run("tests/interfaces/features/job_workers.feature")
        .await;
}
