#![cfg(loom)]

use loom::sync::atomic::{AtomicUsize, Ordering};
use loom::sync::Arc;
use loom::thread;
use turbo_sync::{channel, Shared};

#[test]
fn loom_spsc_fifo() {
    loom::model(|| {
        let (mut tx, mut rx) = channel::<i32>(2);

        let producer = thread::spawn(move || {
            for i in 0..2 {
                tx.push(i);
            }
        });

        let consumer = thread::spawn(move || {
            let mut received = vec![];
            for _ in 0..2 {
                received.push(rx.pop());
            }
            received
        });

        producer.join().unwrap();
        let received = consumer.join().unwrap();
        assert_eq!(received, vec![0, 1]);
    });
}

#[test]
fn loom_payload_visible_with_tail() {
    loom::model(|| {
        let (mut tx, mut rx) = channel::<usize>(3);

        let producer = thread::spawn(move || {
            tx.push(7);
            tx.push(8);
        });

        // Slot reads go through loom's cell, so a tail store weaker than
        // Release shows up as a causality violation here.
        let mut seen = vec![];
        while let Some(v) = rx.try_pop() {
            seen.push(v);
        }
        producer.join().unwrap();
        seen.extend(rx.try_pop());
        seen.extend(rx.try_pop());
        assert_eq!(seen, vec![7, 8]);
    });
}

#[test]
fn loom_slot_reused_after_head_release() {
    loom::model(|| {
        let (mut tx, mut rx) = channel::<usize>(2);

        let producer = thread::spawn(move || {
            for i in 1..=3 {
                tx.push(i);
            }
        });

        // The third push lands in slot 0 again and must not race with the
        // consumer's read of the first value.
        let received: Vec<_> = (0..3).map(|_| rx.pop()).collect();
        producer.join().unwrap();
        assert_eq!(received, vec![1, 2, 3]);
    });
}

#[test]
fn loom_full_queue() {
    loom::model(|| {
        let (mut tx, mut rx) = channel::<i32>(2);

        let producer = thread::spawn(move || {
            let first = tx.try_push(1).is_ok();
            let second = tx.try_push(2).is_ok();
            (first, second)
        });

        let popped = rx.try_pop();
        let (first, second) = producer.join().unwrap();
        assert!(first);

        let mut count = usize::from(popped.is_some());
        while rx.try_pop().is_some() {
            count += 1;
        }
        assert_eq!(count, usize::from(first) + usize::from(second));
    });
}

#[test]
fn loom_shared_drop_once() {
    loom::model(|| {
        let drops = Arc::new(AtomicUsize::new(0));

        struct Tracked(Arc<AtomicUsize>);
        impl Drop for Tracked {
            fn drop(&mut self) {
                self.0.fetch_add(1, Ordering::Relaxed);
            }
        }

        let a = Shared::new(Tracked(drops.clone()));
        let b = a.clone();

        let t = thread::spawn(move || drop(b));
        drop(a);
        t.join().unwrap();

        assert_eq!(drops.load(Ordering::Relaxed), 1);
    });
}

#[test]
fn loom_shared_writes_visible_to_final_drop() {
    loom::model(|| {
        struct Cell(AtomicUsize);
        impl Drop for Cell {
            fn drop(&mut self) {
                assert_eq!(self.0.load(Ordering::Relaxed), 2);
            }
        }

        let a = Shared::new(Cell(AtomicUsize::new(0)));
        let b = a.clone();

        let t = thread::spawn(move || {
            b.0.fetch_add(1, Ordering::Relaxed);
        });
        a.0.fetch_add(1, Ordering::Relaxed);
        drop(a);
        t.join().unwrap();
    });
}
