use std::io;
use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};
use std::thread;
use std::time::{Duration, Instant};

use clap::Parser;
use rand::Rng;

use carousel::{Carousel, Connect, Credentials, Error, PoolKind, Result, Session};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Number of worker threads
    #[arg(short, long, default_value_t = 8)]
    threads: usize,

    /// Operations per thread
    #[arg(short, long, default_value_t = 10000)]
    ops: u64,

    /// Pool kind: queue, singleton, null, static or assertion
    #[arg(long, default_value = "queue")]
    kind: String,

    /// Idle capacity of the pool
    #[arg(long, default_value_t = 5)]
    pool_size: u32,

    /// Extra sessions beyond the idle capacity, -1 for unbounded
    #[arg(long, default_value_t = 10)]
    max_overflow: i32,

    /// Acquire timeout in milliseconds
    #[arg(long, default_value_t = 30000)]
    timeout_ms: u64,

    /// Recycle sessions older than this many milliseconds
    #[arg(long)]
    recycle_ms: Option<u64>,

    /// Simulated request latency in microseconds
    #[arg(long, default_value_t = 50)]
    latency_us: u64,

    /// Probability that a simulated open fails with a transport error
    #[arg(long, default_value_t = 0.0)]
    fail_rate: f64,

    /// Probability that a worker invalidates its session after a request
    #[arg(long, default_value_t = 0.0)]
    invalidate_rate: f64,

    /// Emit pool events at INFO
    #[arg(long)]
    echo: bool,
}

/// A backend session that burns a little wall-clock time per request.
struct JitterySession {
    latency: Duration,
    requests: u64,
}

impl Session for JitterySession {
    fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

impl JitterySession {
    fn request(&mut self) -> u64 {
        if !self.latency.is_zero() {
            thread::sleep(self.latency);
        }
        self.requests += 1;
        self.requests
    }
}

struct JitteryConnect {
    latency: Duration,
    fail_rate: f64,
    opened: Arc<AtomicU64>,
}

impl Connect for JitteryConnect {
    type Session = JitterySession;

    fn open(
        &self,
        _keyspace: &str,
        server: &str,
        _credentials: Option<&Credentials>,
    ) -> Result<JitterySession> {
        if self.fail_rate > 0.0 && rand::rng().random_bool(self.fail_rate) {
            return Err(Error::Io(io::Error::new(
                io::ErrorKind::ConnectionRefused,
                format!("{server} refused (simulated)"),
            )));
        }
        self.opened.fetch_add(1, Ordering::Relaxed);
        // opening costs an order of magnitude more than a request
        thread::sleep(self.latency * 10);
        Ok(JitterySession {
            latency: self.latency,
            requests: 0,
        })
    }
}

fn pool_kind(name: &str) -> PoolKind {
    match name {
        "queue" => PoolKind::Queue,
        "singleton" => PoolKind::SingletonThread,
        "null" => PoolKind::Null,
        "static" => PoolKind::Static,
        "assertion" => PoolKind::Assertion,
        other => {
            eprintln!("unknown pool kind {other:?}, using queue");
            PoolKind::Queue
        }
    }
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    let opened = Arc::new(AtomicU64::new(0));
    let connector = JitteryConnect {
        latency: Duration::from_micros(args.latency_us),
        fail_rate: args.fail_rate,
        opened: Arc::clone(&opened),
    };

    let mut options = Carousel::new()
        .kind(pool_kind(&args.kind))
        .servers(["stress-a:9160", "stress-b:9160", "stress-c:9160"])
        .pool_size(args.pool_size)
        .max_overflow(args.max_overflow)
        .timeout(Duration::from_millis(args.timeout_ms))
        .logging_name("stresstest")
        .echo(args.echo);
    if let Some(ms) = args.recycle_ms {
        options = options.recycle(Duration::from_millis(ms));
    }
    let pool = options.build(connector);

    let completed = Arc::new(AtomicU64::new(0));
    let errored = Arc::new(AtomicU64::new(0));

    let started = Instant::now();
    let workers: Vec<_> = (0..args.threads)
        .map(|_| {
            let pool = pool.clone();
            let completed = Arc::clone(&completed);
            let errored = Arc::clone(&errored);
            let invalidate_rate = args.invalidate_rate;
            let ops = args.ops;
            thread::spawn(move || {
                for _ in 0..ops {
                    let outcome = pool.connect().and_then(|handle| {
                        handle.with_session(|session| session.request())?;
                        if invalidate_rate > 0.0 && rand::rng().random_bool(invalidate_rate) {
                            handle.invalidate(None)?;
                        }
                        Ok(())
                    });
                    match outcome {
                        Ok(()) => completed.fetch_add(1, Ordering::Relaxed),
                        Err(_) => errored.fetch_add(1, Ordering::Relaxed),
                    };
                }
            })
        })
        .collect();

    for worker in workers {
        worker.join().expect("worker thread panicked");
    }

    let elapsed = started.elapsed();
    let completed = completed.load(Ordering::Relaxed);
    let errored = errored.load(Ordering::Relaxed);
    let per_second = completed as f64 / elapsed.as_secs_f64();

    println!("{}", pool.status());
    println!(
        "{completed} ops ({errored} errors) across {} threads in {elapsed:.2?} | {per_second:.0} ops/sec | {} sessions opened",
        args.threads,
        opened.load(Ordering::Relaxed),
    );

    Ok(())
}
