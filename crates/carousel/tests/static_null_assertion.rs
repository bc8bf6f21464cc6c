use carousel::{Carousel, Error, PoolKind};
use carousel_test::pool;

#[test]
fn static_pool_shares_one_session() -> anyhow::Result<()> {
    let (pool, connect) = pool(
        Carousel::new()
            .kind(PoolKind::Static)
            .use_threadlocal(false),
    );

    let h1 = pool.connect()?;
    let h2 = pool.connect()?;
    assert_eq!(
        h1.with_session(|s| s.id())?,
        h2.with_session(|s| s.id())?
    );
    assert_eq!(connect.created(), 1);

    drop(h1);
    drop(h2);
    assert_eq!(pool.connect()?.with_session(|s| s.id())?, 0);
    assert_eq!(connect.created(), 1);

    Ok(())
}

#[test]
fn static_pool_forbids_invalidation() -> anyhow::Result<()> {
    let (pool, connect) = pool(
        Carousel::new()
            .kind(PoolKind::Static)
            .use_threadlocal(false),
    );

    let h = pool.connect()?;
    match h.invalidate(None) {
        Err(Error::InvalidRequest(message)) => {
            assert!(message.contains("invalidation"), "{message}");
        }
        other => panic!("expected InvalidRequest, got {other:?}"),
    }
    // the shared session is untouched
    assert_eq!(connect.closed(), 0);

    Ok(())
}

#[test]
fn static_pool_dispose_closes_the_session() -> anyhow::Result<()> {
    let (pool, connect) = pool(
        Carousel::new()
            .kind(PoolKind::Static)
            .use_threadlocal(false),
    );

    drop(pool.connect()?);
    pool.dispose();
    assert_eq!(connect.closed(), 1);

    // a disposed static pool lazily opens a replacement
    drop(pool.connect()?);
    assert_eq!(connect.created(), 2);

    Ok(())
}

#[test]
fn null_pool_opens_and_closes_per_use() -> anyhow::Result<()> {
    let (pool, connect) = pool(
        Carousel::new()
            .kind(PoolKind::Null)
            .use_threadlocal(false),
    );

    let h1 = pool.connect()?;
    let h2 = pool.connect()?;
    assert_ne!(
        h1.with_session(|s| s.id())?,
        h2.with_session(|s| s.id())?
    );
    drop(h1);
    drop(h2);

    assert_eq!(connect.created(), 2);
    assert_eq!(connect.closed(), 2);
    assert_eq!(pool.status(), "NullPool");

    // dispose holds no state to drain
    pool.dispose();
    assert_eq!(connect.closed(), 2);

    Ok(())
}

#[test]
fn assertion_pool_rejects_a_second_checkout() -> anyhow::Result<()> {
    let (pool, connect) = pool(
        Carousel::new()
            .kind(PoolKind::Assertion)
            .use_threadlocal(false),
    );

    let h1 = pool.connect()?;
    match pool.connect() {
        Err(Error::Assertion(message)) => {
            assert!(message.contains("already checked out"), "{message}");
        }
        other => panic!("expected Assertion, got {other:?}"),
    }

    // returning the session frees the slot, and the record is reused
    drop(h1);
    let h2 = pool.connect()?;
    assert_eq!(h2.with_session(|s| s.id())?, 0);
    assert_eq!(connect.created(), 1);

    Ok(())
}

#[test]
fn assertion_pool_rejects_a_stray_return() -> anyhow::Result<()> {
    let (pool, _connect) = pool(
        Carousel::new()
            .kind(PoolKind::Assertion)
            .use_threadlocal(false),
    );

    let h = pool.connect()?;
    // disposing flips the checked-out flag behind the handle's back
    pool.dispose();
    match h.close() {
        Err(Error::Assertion(message)) => {
            assert!(message.contains("not checked out"), "{message}");
        }
        other => panic!("expected Assertion, got {other:?}"),
    }

    Ok(())
}
