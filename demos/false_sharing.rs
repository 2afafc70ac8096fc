//! Two threads hammer two counters, first on one cache line, then padded apart.

use crossbeam_utils::CachePadded;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::{Duration, Instant};

const RUN_FOR: Duration = Duration::from_secs(3);

#[repr(align(64))]
#[derive(Default)]
struct SameLine {
    a: AtomicUsize,
    b: AtomicUsize,
}

#[derive(Default)]
struct Padded {
    a: CachePadded<AtomicUsize>,
    b: CachePadded<AtomicUsize>,
}

fn hammer(a: &AtomicUsize, b: &AtomicUsize) -> (usize, Duration) {
    let start = Instant::now();
    let end = start + RUN_FOR;
    thread::scope(|s| {
        for counter in [a, b] {
            s.spawn(move || {
                while Instant::now() < end {
                    counter.fetch_add(1, Ordering::Relaxed);
                }
            });
        }
    });
    let total = a.load(Ordering::Relaxed) + b.load(Ordering::Relaxed);
    (total, start.elapsed())
}

fn report(label: &str, (total, elapsed): (usize, Duration)) -> f64 {
    let per_sec = total as f64 / elapsed.as_secs_f64();
    println!("{label}:");
    println!("  Total ops: {}", total);
    println!("  Time: {:?}", elapsed);
    println!("  Throughput: {:.2} ops/sec\n", per_sec);
    per_sec
}

fn main() {
    println!("Cache line test ({:?} per run)", RUN_FOR);
    println!("==============================\n");

    let same = SameLine::default();
    let shared_line = report("Same cache line", hammer(&same.a, &same.b));

    let padded = Padded::default();
    let split_lines = report("Separate cache lines", hammer(&padded.a, &padded.b));

    println!("Padded / same-line speedup: {:.2}x", split_lines / shared_line);
}
