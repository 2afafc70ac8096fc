use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;
use tracing::info;
use tracing_subscriber::EnvFilter;
use turbo_sync::Shared;

struct Ledger {
    name: &'static str,
    hits: AtomicU64,
}

impl Drop for Ledger {
    fn drop(&mut self) {
        info!(name = self.name, hits = self.hits.load(Ordering::Relaxed), "ledger dropped");
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    const NUM_THREADS: usize = 8;
    const NUM_OPERATIONS: u64 = 10_000;

    let ledger = Shared::new(Ledger {
        name: "orders",
        hits: AtomicU64::new(0),
    });

    let workers: Vec<_> = (0..NUM_THREADS)
        .map(|_| {
            let local = ledger.clone();
            thread::spawn(move || {
                for _ in 0..NUM_OPERATIONS {
                    let copy = local.clone();
                    copy.hits.fetch_add(1, Ordering::Relaxed);
                }
            })
        })
        .collect();

    info!(use_count = ledger.use_count(), "workers running");
    for w in workers {
        w.join().unwrap();
    }
    info!(
        use_count = ledger.use_count(),
        hits = ledger.hits.load(Ordering::Relaxed),
        "workers done"
    );

    let mut replaced = ledger.clone();
    replaced.reset_to(Ledger {
        name: "refunds",
        hits: AtomicU64::new(0),
    });
    info!(orders = ledger.use_count(), refunds = replaced.use_count(), "after reset_to");
}
