//! Allocates a handful of supplier and project codes against an
//! in-memory store and prints the results.
//!
//! Run with `cargo run --example allocate`.

use tokenmint_alloc::Allocator;
use tokenmint_core::{CodeFormat, DateSegment};
use tokenmint_storage::InMemoryStore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("debug")),
        )
        .init();

    let store = InMemoryStore::seeded(["SUPP-0001", "SUPP-0002", "SUPP-0003"]);
    let suppliers = Allocator::new(store, CodeFormat::builder().prefix("SUPP").build())?;

    for _ in 0..3 {
        let allocation = suppliers.allocate_and_insert().await?;
        println!(
            "supplier code: {} (degraded: {})",
            allocation.token(),
            allocation.is_degraded()
        );
    }

    let projects = Allocator::new(
        InMemoryStore::new(),
        CodeFormat::builder()
            .prefix("PRJ")
            .date_segment(Some(DateSegment::Year))
            .build(),
    )?;

    let allocation = projects.allocate_and_insert().await?;
    println!("project code: {}", allocation.token());

    Ok(())
}
