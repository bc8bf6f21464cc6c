use carousel::{Carousel, Error, PoolKind};
use carousel_test::pool;

fn two_server_options() -> Carousel {
    // the null store opens a fresh session per acquisition, which makes the
    // factory's cursor visible in the attempt log
    Carousel::new()
        .kind(PoolKind::Null)
        .servers(["a:9160", "b:9160"])
        .use_threadlocal(false)
}

#[test]
fn creation_round_robins_across_servers() -> anyhow::Result<()> {
    let (pool, _connect) = pool(two_server_options());

    let h = pool.connect()?;
    assert_eq!(h.with_session(|s| s.server().to_string())?, "a:9160");
    drop(h);

    let h = pool.connect()?;
    assert_eq!(h.with_session(|s| s.server().to_string())?, "b:9160");
    drop(h);

    let h = pool.connect()?;
    assert_eq!(h.with_session(|s| s.server().to_string())?, "a:9160");

    Ok(())
}

#[test]
fn failed_primary_fails_over_in_list_order() -> anyhow::Result<()> {
    let (pool, connect) = pool(two_server_options());
    connect.set_down("a:9160", true);

    let h = pool.connect()?;
    assert_eq!(h.with_session(|s| s.server().to_string())?, "b:9160");
    assert_eq!(connect.attempts(), vec!["a:9160", "b:9160"]);
    drop(h);

    // the cursor advanced once for the attempted creation, so the next
    // creation starts straight at b
    let h = pool.connect()?;
    assert_eq!(h.with_session(|s| s.server().to_string())?, "b:9160");
    assert_eq!(connect.attempts(), vec!["a:9160", "b:9160", "b:9160"]);

    Ok(())
}

#[test]
fn all_servers_down_reports_no_server_available() -> anyhow::Result<()> {
    let (pool, connect) = pool(two_server_options());
    connect.set_down("a:9160", true);
    connect.set_down("b:9160", true);

    match pool.connect() {
        Err(Error::NoServerAvailable { attempted, last }) => {
            assert_eq!(attempted, 2);
            assert!(last.contains("refused"), "{last}");
        }
        other => panic!("expected NoServerAvailable, got {other:?}"),
    }

    // with both servers back, acquisition recovers
    connect.set_down("a:9160", false);
    connect.set_down("b:9160", false);
    assert!(pool.connect().is_ok());

    Ok(())
}

#[test]
fn non_connect_errors_do_not_fail_over() -> anyhow::Result<()> {
    let (pool, connect) = pool(two_server_options());
    connect.set_fatal("a:9160", true);

    match pool.connect() {
        Err(Error::InvalidRequest(message)) => {
            assert!(message.contains("rejected"), "{message}");
        }
        other => panic!("expected the connector error, got {other:?}"),
    }
    // b was never attempted
    assert_eq!(connect.attempts(), vec!["a:9160"]);

    Ok(())
}
