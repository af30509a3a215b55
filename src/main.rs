use anyhow::Result;
use clap::Parser;

use route_amenities::app::{Cli, run};

fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        tracing::Level::INFO
    } else {
        tracing::Level::WARN
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::builder()
                .with_default_directive(level.into())
                .from_env_lossy(),
        )
        .with_writer(std::io::stderr)
        .init();

    let start = std::time::Instant::now();
    let report = run(&cli)?;

    if report.batches_failed > 0 || report.cancelled {
        tracing::warn!(
            "Incomplete result: {}/{} batches failed{}",
            report.batches_failed,
            report.batches_total,
            if report.cancelled { ", cancelled" } else { "" }
        );
    }
    if report.skipped_ways > 0 {
        tracing::warn!(
            "Skipped {} ways with incomplete node data",
            report.skipped_ways
        );
    }
    tracing::info!(
        "Done! Added {} waypoints ({} nodes, {} ways, {} skipped, cache {}) in {:.2}s",
        report.waypoints_added,
        report.nodes,
        report.ways,
        report.skipped_ways,
        if report.cache_hit { "hit" } else { "miss" },
        start.elapsed().as_secs_f64()
    );

    Ok(())
}
