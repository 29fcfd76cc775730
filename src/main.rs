//! desk demo: bounded-buffer producers and consumers.
//!
//! Producers and consumers share one buffer resource. Producers wait while
//! it is full, consumers wait while it is empty, and every change is
//! announced with `notify_all`. Delays are drawn from seeded RNGs, so the
//! same arguments always produce the same trace and final clock.

use std::collections::VecDeque;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, error, info, Level};
use tracing_subscriber::FmtSubscriber;

use desk::{KernelResult, QueueBackend, ResourceId, Runtime, RuntimeConfig, TaskContext};

#[derive(Parser, Debug)]
#[command(name = "desk-demo", about = "Producer/consumer run on the desk simulation kernel")]
struct Args {
    /// Number of producer tasks
    #[arg(short, long, default_value_t = 3)]
    producers: usize,

    /// Number of consumer tasks
    #[arg(short, long, default_value_t = 2)]
    consumers: usize,

    /// Items each producer makes
    #[arg(short = 'n', long, default_value_t = 20)]
    items: usize,

    /// Buffer capacity
    #[arg(long, default_value_t = 4)]
    capacity: usize,

    /// Seed for the delay generators
    #[arg(short, long, default_value_t = 42)]
    seed: u64,

    /// Waiting-queue backend (tree or calendar)
    #[arg(short, long, default_value = "tree")]
    backend: QueueBackend,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,
}

const BUFFER: ResourceId = ResourceId::new(1);

/// State guarded by the `BUFFER` resource.
#[derive(Debug, Default)]
struct Shelf {
    items: VecDeque<(usize, usize)>,
    consumed: usize,
}

fn produce(
    cx: &TaskContext,
    shelf: &Mutex<Shelf>,
    producer: usize,
    items: usize,
    capacity: usize,
    mut rng: StdRng,
) -> KernelResult<()> {
    for seq in 0..items {
        cx.sleep_for(rng.gen_range(0.5..3.0))?;
        cx.lock(BUFFER)?;
        while shelf.lock().items.len() >= capacity {
            cx.wait(BUFFER)?;
        }
        shelf.lock().items.push_back((producer, seq));
        debug!(producer, seq, time = cx.now(), "produced");
        cx.notify_all(BUFFER);
        cx.unlock(BUFFER);
    }
    Ok(())
}

fn consume(
    cx: &TaskContext,
    shelf: &Mutex<Shelf>,
    consumer: usize,
    total: usize,
    mut rng: StdRng,
) -> KernelResult<()> {
    loop {
        cx.lock(BUFFER)?;
        loop {
            let s = shelf.lock();
            if !s.items.is_empty() || s.consumed >= total {
                break;
            }
            drop(s);
            cx.wait(BUFFER)?;
        }
        let taken = {
            let mut s = shelf.lock();
            let item = s.items.pop_front();
            if item.is_some() {
                s.consumed += 1;
            }
            item
        };
        cx.notify_all(BUFFER);
        cx.unlock(BUFFER);
        match taken {
            Some((producer, seq)) => {
                debug!(consumer, producer, seq, time = cx.now(), "consumed");
                cx.sleep_for(rng.gen_range(1.0..4.0))?;
            }
            None => return Ok(()),
        }
    }
}

fn run(args: &Args) -> KernelResult<Runtime> {
    let config = RuntimeConfig::default()
        .with_name("demo")
        .with_waiting_queue(args.backend)
        .with_start_suspended(true);
    let rt = Runtime::new(config);
    let shelf = Arc::new(Mutex::new(Shelf::default()));
    let total = args.producers * args.items;

    for p in 0..args.producers {
        let shelf = Arc::clone(&shelf);
        let rng = StdRng::seed_from_u64(args.seed.wrapping_add(p as u64));
        let (items, capacity) = (args.items, args.capacity.max(1));
        rt.submit_at(0.0, move |cx| produce(cx, &shelf, p, items, capacity, rng))?;
    }
    for c in 0..args.consumers {
        let shelf = Arc::clone(&shelf);
        let rng = StdRng::seed_from_u64(args.seed.wrapping_add(1_000 + c as u64));
        rt.submit_at(0.0, move |cx| consume(cx, &shelf, c, total, rng))?;
    }

    rt.resume()?;
    rt.wait_quiescent(Duration::from_secs(60))?;

    let consumed = shelf.lock().consumed;
    info!(consumed, total, "run complete");
    Ok(rt)
}

fn main() -> ExitCode {
    let args = Args::parse();

    let level = if args.verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder().with_max_level(level).finish();
    tracing::subscriber::set_global_default(subscriber)
        .expect("Failed to set tracing subscriber");

    info!(
        producers = args.producers,
        consumers = args.consumers,
        items = args.items,
        backend = %args.backend,
        seed = args.seed,
        "desk demo"
    );
    if args.consumers == 0 && args.producers > 0 {
        error!("at least one consumer is needed to drain the buffer");
        return ExitCode::FAILURE;
    }

    match run(&args) {
        Ok(rt) => {
            println!("{}", rt.info());
            for fault in rt.faults() {
                println!("  fault: {}", fault);
            }
            for worker in rt.workers() {
                println!("  {}", worker);
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(error = %e, "simulation failed");
            ExitCode::FAILURE
        }
    }
}
