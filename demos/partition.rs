//! Number partitioning example - solves a random instance on several
//! worker counts
//!
//! Usage: `cargo run --example partition [n] [max] [seed]`
//! Set `RUST_LOG=forkbound=debug` to see executor and search events.

use forkbound::prelude::*;
use forkbound::problems::partition::{random_instance, NumberPartition};
use std::env;
use std::sync::Arc;

fn arg<T: std::str::FromStr>(index: usize, default: T) -> T {
    env::args()
        .nth(index)
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

fn main() {
    tracing_subscriber::fmt::init();

    let n: usize = arg(1, 28);
    let max: i64 = arg(2, 1 << 40);
    let seed: u64 = arg(3, 1);

    println!("=== Number Partitioning ===\n");
    println!("{} numbers in 0..={}, seed {}", n, max, seed);

    let problem = Arc::new(
        NumberPartition::new(random_instance(n, max, seed)).expect("Failed to build instance"),
    );
    let root = problem.root_state();

    for threads in [1, 2, 4, 8] {
        let config = Config::builder()
            .num_threads(threads)
            .fork_depth_threshold(2)
            .build()
            .expect("Failed to build config");

        let report = BranchAndBound::with_shared(Arc::clone(&problem), config)
            .expect("Failed to create driver")
            .solve(root.clone())
            .expect("Search failed");

        let stats = &report.stats;
        println!(
            "\n{} worker(s): best difference {:?} in {:?}{}",
            threads,
            report.best,
            report.elapsed,
            if report.optimal_sentinel_hit { " (perfect)" } else { "" }
        );
        println!(
            "  visited {} (pruned {}, branched {}), submitted {}, inline fallbacks {}",
            stats.nodes_visited(),
            stats.nodes_pruned,
            stats.nodes_branched,
            stats.nodes_submitted,
            stats.inline_fallbacks
        );
        println!(
            "  release requests {}, late branches {}, peak queue {}",
            stats.release_requests, stats.late_branches, stats.executor.peak_queue_depth
        );
    }
}
