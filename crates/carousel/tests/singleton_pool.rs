use std::sync::{Arc, Barrier};
use std::thread;

use carousel::{Carousel, PoolKind};
use carousel_test::pool;

fn singleton_options(pool_size: u32) -> Carousel {
    Carousel::new()
        .kind(PoolKind::SingletonThread)
        .pool_size(pool_size)
}

#[test]
fn each_thread_keeps_its_own_session() -> anyhow::Result<()> {
    let (pool, connect) = pool(singleton_options(4));

    let mut ids = Vec::new();
    for _ in 0..3 {
        let pool = pool.clone();
        let handle = thread::spawn(move || -> carousel::Result<u64> {
            let first = pool.connect()?.with_session(|s| s.id())?;
            // a second acquisition on the same thread reuses the record
            let second = pool.connect()?.with_session(|s| s.id())?;
            assert_eq!(first, second);
            Ok(first)
        });
        ids.push(handle.join().expect("worker panicked")?);
    }

    // three threads, three distinct sessions
    ids.sort_unstable();
    ids.dedup();
    assert_eq!(ids.len(), 3);
    assert_eq!(connect.created(), 3);

    Ok(())
}

#[test]
fn surplus_thread_sessions_are_evicted() -> anyhow::Result<()> {
    let (pool, connect) = pool(singleton_options(2));

    let barrier = Arc::new(Barrier::new(3));
    let workers: Vec<_> = (0..3)
        .map(|_| {
            let pool = pool.clone();
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || -> carousel::Result<()> {
                let h = pool.connect()?;
                h.with_session(|s| s.ping())??;
                // hold all three sessions live at once
                barrier.wait();
                drop(h);
                Ok(())
            })
        })
        .collect();

    for worker in workers {
        worker.join().expect("worker panicked")?;
    }

    assert_eq!(connect.created(), 3);
    // the store retains at most pool_size records; the evicted extra closed
    // once its thread let go
    let status = pool.status();
    assert!(status.contains("size: 2"), "{status}");
    assert_eq!(connect.closed(), 1);

    pool.dispose();
    assert_eq!(connect.closed(), 3);

    Ok(())
}

#[test]
fn same_thread_reuses_across_checkouts() -> anyhow::Result<()> {
    let (pool, connect) = pool(singleton_options(2));

    let first = pool.connect()?.with_session(|s| s.id())?;
    let second = pool.connect()?.with_session(|s| s.id())?;
    assert_eq!(first, second);
    assert_eq!(connect.created(), 1);

    Ok(())
}

#[test]
fn dispose_local_drops_only_this_thread() -> anyhow::Result<()> {
    let (pool, connect) = pool(singleton_options(2));

    drop(pool.connect()?);
    assert_eq!(pool.size(), 1);

    pool.dispose_local();
    assert_eq!(pool.size(), 0);

    // the next acquisition on this thread opens fresh
    drop(pool.connect()?);
    assert_eq!(connect.created(), 2);

    Ok(())
}
