//! Maximum clique example - random graph, both release strategies
//!
//! Usage: `cargo run --example clique [vertices] [density] [seed]`

use forkbound::prelude::*;
use forkbound::problems::MaxClique;
use rand::{Rng, SeedableRng};
use rand_pcg::Pcg64;
use std::env;
use std::sync::Arc;

fn main() {
    tracing_subscriber::fmt::init();

    let mut args = env::args().skip(1);
    let n: usize = args.next().and_then(|s| s.parse().ok()).unwrap_or(48);
    let density: f64 = args.next().and_then(|s| s.parse().ok()).unwrap_or(0.6);
    let seed: u64 = args.next().and_then(|s| s.parse().ok()).unwrap_or(7);

    println!("=== Maximum Clique ===\n");

    let mut rng = Pcg64::seed_from_u64(seed);
    let mut edges = Vec::new();
    for u in 0..n {
        for v in u + 1..n {
            if rng.gen_bool(density) {
                edges.push((u, v));
            }
        }
    }
    println!("{} vertices, {} edges", n, edges.len());

    let graph = Arc::new(MaxClique::new(n, &edges).expect("Failed to build graph"));
    let root = graph.root_state();

    for strategy in [ReleaseStrategy::Request, ReleaseStrategy::Resubmit] {
        let config = Config::builder()
            .release_strategy(strategy)
            .min_fork_size(6)
            .build()
            .expect("Failed to build config");
        let threads = config.worker_threads();

        let report = BranchAndBound::with_shared(Arc::clone(&graph), config)
            .expect("Failed to create driver")
            .solve(root)
            .expect("Search failed");

        println!(
            "\n{:?} on {} worker(s): clique size {:?} in {:?}",
            strategy, threads, report.best, report.elapsed
        );
        println!(
            "  visited {}, submitted {}, cross-worker releases {}",
            report.stats.nodes_visited(),
            report.stats.nodes_submitted,
            report.stats.release_requests + report.stats.resubmitted_releases
        );
        println!(
            "  {:.0} nodes/s on the executor",
            report.stats.executor.items_per_second()
        );
    }
}
