//! Stress tests: randomized interleavings and high contention.
//!
//! These tests push the queue to its limits to find lost updates,
//! duplicated deliveries, and chain corruption under contention.

use rand::Rng;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Instant;
use tagged_queue::TaggedQueue;

/// Threads perform randomly interleaved push/pop calls. Afterwards the
/// observed history must reconcile with FIFO semantics: every pushed
/// value is seen exactly once, nothing else is ever seen.
#[test]
#[cfg_attr(miri, ignore)]
fn test_random_interleaved_ops() {
    const THREADS: usize = 8;
    const OPS: usize = 20_000;

    let q = Arc::new(TaggedQueue::new());
    let seen: Arc<Vec<AtomicBool>> = Arc::new(
        (0..THREADS * OPS).map(|_| AtomicBool::new(false)).collect(),
    );
    let pushed = Arc::new(AtomicUsize::new(0));
    let popped = Arc::new(AtomicUsize::new(0));

    let mut handles = vec![];
    for tid in 0..THREADS {
        let q = q.clone();
        let seen = seen.clone();
        let pushed = pushed.clone();
        let popped = popped.clone();

        handles.push(thread::spawn(move || {
            let mut rng = rand::thread_rng();
            let mut next_value = tid * OPS;

            for _ in 0..OPS {
                if rng.gen_bool(0.5) {
                    q.push(next_value);
                    next_value += 1;
                    pushed.fetch_add(1, Ordering::Relaxed);
                } else if let Some(v) = q.pop() {
                    assert!(!seen[v].swap(true, Ordering::Relaxed), "duplicate value {}", v);
                    popped.fetch_add(1, Ordering::Relaxed);
                }
            }
        }));
    }

    for h in handles {
        h.join().unwrap();
    }

    // Drain what the random schedule left behind.
    while let Some(v) = q.pop() {
        assert!(!seen[v].swap(true, Ordering::Relaxed), "duplicate value {}", v);
        popped.fetch_add(1, Ordering::Relaxed);
    }

    let total_pushed = pushed.load(Ordering::Relaxed);
    let total_popped = popped.load(Ordering::Relaxed);
    assert_eq!(total_pushed, total_popped, "lost or invented values");

    let total_seen = seen.iter().filter(|b| b.load(Ordering::Relaxed)).count();
    assert_eq!(total_seen, total_pushed);
    assert!(q.is_empty());
}

#[test]
#[cfg_attr(miri, ignore)]
fn test_high_contention() {
    // Many threads hammering the same queue with push/pop pairs
    const NUM_THREADS: usize = 16;
    const ITERATIONS: usize = 50_000;

    let q = Arc::new(TaggedQueue::new());
    let ops_count = Arc::new(AtomicUsize::new(0));
    let mut handles = vec![];

    let start = Instant::now();

    for tid in 0..NUM_THREADS {
        let q = q.clone();
        let ops_count = ops_count.clone();

        handles.push(thread::spawn(move || {
            for i in 0..ITERATIONS {
                q.push(tid * ITERATIONS + i);
                while q.pop().is_none() {
                    thread::yield_now();
                }
                ops_count.fetch_add(1, Ordering::Relaxed);
            }
        }));
    }

    for handle in handles {
        handle.join().unwrap();
    }

    let elapsed = start.elapsed();
    let total_ops = ops_count.load(Ordering::Relaxed);
    let throughput = total_ops as f64 / elapsed.as_secs_f64();

    println!("High contention test:");
    println!("  {} push/pop pairs in {:?}", total_ops, elapsed);
    println!("  Throughput: {:.0} pairs/sec", throughput);

    assert_eq!(total_ops, NUM_THREADS * ITERATIONS);
    assert!(q.pop().is_none());
}

#[test]
#[cfg_attr(miri, ignore)]
fn test_oversubscription() {
    // More threads than cores; preemption mid-CAS-loop exercises the
    // helping paths.
    let num_cores = thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4);
    let num_threads = num_cores * 4;
    const ITERATIONS: usize = 10_000;

    let q = Arc::new(TaggedQueue::new());
    let mut handles = vec![];

    let start = Instant::now();

    for tid in 0..num_threads {
        let q = q.clone();
        handles.push(thread::spawn(move || {
            for i in 0..ITERATIONS {
                q.push(tid * ITERATIONS + i);
                while q.pop().is_none() {
                    thread::yield_now();
                }
            }
        }));
    }

    for handle in handles {
        handle.join().unwrap();
    }

    let elapsed = start.elapsed();
    let total_ops = num_threads * ITERATIONS;
    let throughput = total_ops as f64 / elapsed.as_secs_f64();

    println!(
        "Oversubscription test ({} threads on {} cores):",
        num_threads, num_cores
    );
    println!("  {} push/pop pairs in {:?}", total_ops, elapsed);
    println!("  Throughput: {:.0} pairs/sec", throughput);

    assert!(q.pop().is_none());
}

#[test]
#[cfg_attr(miri, ignore)]
fn test_burst_workload() {
    // Alternating full-drain cycles: producers flood, consumers drain,
    // repeat. The queue crosses the empty boundary constantly.
    const NUM_THREADS: usize = 8;
    const BURSTS: usize = 20;
    const OPS_PER_BURST: usize = 5_000;

    let q = Arc::new(TaggedQueue::new());

    for _ in 0..BURSTS {
        let mut handles = vec![];
        for tid in 0..NUM_THREADS {
            let q = q.clone();
            handles.push(thread::spawn(move || {
                for i in 0..OPS_PER_BURST {
                    q.push(tid * OPS_PER_BURST + i);
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }

        let mut drained = 0;
        while q.pop().is_some() {
            drained += 1;
        }
        assert_eq!(drained, NUM_THREADS * OPS_PER_BURST);
        assert!(q.is_empty());
    }
}
