use std::thread;
use std::time::{Duration, Instant};

use carousel::{Carousel, Error};
use carousel_test::pool;

#[test]
fn times_out_when_capacity_and_overflow_exhausted() -> anyhow::Result<()> {
    let (pool, _connect) = pool(
        Carousel::new()
            .pool_size(2)
            .max_overflow(0)
            .timeout(Duration::from_millis(250))
            .use_threadlocal(false),
    );

    let _h1 = pool.connect()?;
    let _h2 = pool.connect()?;

    let started = Instant::now();
    let res = pool.connect();
    assert!(started.elapsed() >= Duration::from_millis(250));
    match res {
        Err(Error::PoolTimedOut {
            size, overflow, ..
        }) => {
            assert_eq!(size, 2);
            assert_eq!(overflow, 0);
        }
        other => panic!("expected PoolTimedOut, got {other:?}"),
    }

    Ok(())
}

#[test]
fn returned_session_is_reused_and_reset() -> anyhow::Result<()> {
    let (pool, connect) = pool(
        Carousel::new()
            .pool_size(1)
            .use_threadlocal(false),
    );

    let h1 = pool.connect()?;
    let first = h1.with_session(|s| s.id())?;
    h1.close()?;
    assert_eq!(connect.rollbacks(), 1);

    let h2 = pool.connect()?;
    let second = h2.with_session(|s| s.id())?;
    assert_eq!(first, second);
    assert_eq!(connect.created(), 1);

    Ok(())
}

#[test]
fn no_rollback_when_reset_disabled() -> anyhow::Result<()> {
    let (pool, connect) = pool(
        Carousel::new()
            .pool_size(1)
            .reset_on_return(false)
            .use_threadlocal(false),
    );

    drop(pool.connect()?);
    assert_eq!(connect.rollbacks(), 0);

    Ok(())
}

#[test]
fn failed_rollback_invalidates_the_record() -> anyhow::Result<()> {
    let (pool, connect) = pool(
        Carousel::new()
            .pool_size(1)
            .use_threadlocal(false),
    );

    connect.fail_rollbacks(true);
    drop(pool.connect()?);
    assert_eq!(connect.closed(), 1);

    // the record went back empty and reopens on the next acquisition
    connect.fail_rollbacks(false);
    let h = pool.connect()?;
    assert!(h.with_session(|s| s.id())? > 0);
    assert_eq!(connect.created(), 2);

    Ok(())
}

#[test]
fn waiter_is_woken_by_a_release() -> anyhow::Result<()> {
    let (pool, _connect) = pool(
        Carousel::new()
            .pool_size(1)
            .max_overflow(0)
            .timeout(Duration::from_secs(5))
            .use_threadlocal(false),
    );

    let h1 = pool.connect()?;
    let first = h1.with_session(|s| s.id())?;

    let waiter = {
        let pool = pool.clone();
        thread::spawn(move || {
            let h = pool.connect()?;
            h.with_session(|s| s.id())
        })
    };

    thread::sleep(Duration::from_millis(100));
    drop(h1);

    let second = waiter.join().expect("waiter thread panicked")?;
    assert_eq!(first, second);

    Ok(())
}

#[test]
fn overflow_sessions_are_discarded_on_return() -> anyhow::Result<()> {
    let (pool, connect) = pool(
        Carousel::new()
            .pool_size(1)
            .max_overflow(1)
            .use_threadlocal(false),
    );

    let h1 = pool.connect()?;
    let h2 = pool.connect()?;
    assert_eq!(connect.created(), 2);
    assert_eq!(pool.size(), 2);

    drop(h1);
    drop(h2);

    // one rests idle, the overflow extra was closed
    assert_eq!(pool.num_idle(), 1);
    assert_eq!(pool.size(), 1);
    assert_eq!(connect.closed(), 1);

    Ok(())
}

#[test]
fn idle_sessions_are_served_fifo() -> anyhow::Result<()> {
    let (pool, _connect) = pool(
        Carousel::new()
            .pool_size(2)
            .use_threadlocal(false),
    );

    let h1 = pool.connect()?;
    let h2 = pool.connect()?;
    let first = h1.with_session(|s| s.id())?;
    let second = h2.with_session(|s| s.id())?;
    drop(h1);
    drop(h2);

    assert_eq!(pool.connect()?.with_session(|s| s.id())?, first);
    assert_eq!(pool.connect()?.with_session(|s| s.id())?, second);

    Ok(())
}

#[test]
fn pool_size_zero_opens_per_use() -> anyhow::Result<()> {
    let (pool, connect) = pool(
        Carousel::new()
            .pool_size(0)
            .max_overflow(-1)
            .use_threadlocal(false),
    );

    for _ in 0..3 {
        drop(pool.connect()?);
    }

    assert_eq!(connect.created(), 3);
    assert_eq!(connect.closed(), 3);
    assert_eq!(pool.num_idle(), 0);

    Ok(())
}

#[test]
fn dispose_drains_idle_sessions() -> anyhow::Result<()> {
    let (pool, connect) = pool(
        Carousel::new()
            .pool_size(2)
            .use_threadlocal(false),
    );

    drop(pool.connect()?);
    assert_eq!(pool.num_idle(), 1);

    pool.dispose();
    assert_eq!(pool.num_idle(), 0);
    assert_eq!(pool.size(), 0);
    assert_eq!(connect.closed(), 1);

    // disposing again drains nothing
    pool.dispose();
    assert_eq!(connect.closed(), 1);

    Ok(())
}

#[test]
fn status_reports_counts() -> anyhow::Result<()> {
    let (pool, _connect) = pool(
        Carousel::new()
            .pool_size(3)
            .use_threadlocal(false),
    );

    let _h = pool.connect()?;
    let status = pool.status();
    assert!(status.contains("Pool size: 3"), "{status}");
    assert!(status.contains("Current overflow: -2"), "{status}");
    assert!(status.contains("Checked out sessions: 1"), "{status}");

    Ok(())
}

#[test]
fn churn_under_threads_settles_clean() -> anyhow::Result<()> {
    let _ = env_logger::builder().is_test(true).try_init();

    let (pool, connect) = pool(
        Carousel::new()
            .pool_size(4)
            .max_overflow(2)
            .timeout(Duration::from_secs(10))
            .use_threadlocal(false),
    );

    let workers: Vec<_> = (0..8)
        .map(|_| {
            let pool = pool.clone();
            thread::spawn(move || -> carousel::Result<()> {
                for _ in 0..50 {
                    let h = pool.connect()?;
                    h.with_session(|s| s.ping())??;
                }
                Ok(())
            })
        })
        .collect();

    for worker in workers {
        worker.join().expect("worker panicked")?;
    }

    // at quiescence every live record rests idle
    assert_eq!(pool.size() as usize, pool.num_idle());
    assert!(pool.size() <= 4);
    assert!(connect.created() <= 6);

    Ok(())
}
