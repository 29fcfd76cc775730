//! The worker thread's main loop.

use std::any::Any;
use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{Builder, JoinHandle};

use tracing::debug;

use crate::error::KernelError;
use crate::runtime::dispatch::{finish_task, Next, Outcome};
use crate::runtime::Shared;
use crate::task::{Task, TaskKind};

use super::context::TaskContext;
use super::handle::{Signal, Worker};

/// Start the OS thread behind `worker`.
pub(crate) fn spawn(shared: &Arc<Shared>, worker: Arc<Worker>) -> io::Result<JoinHandle<()>> {
    let mut builder = Builder::new().name(format!("{}-worker-{}", shared.config.name, worker.id().raw()));
    if let Some(size) = shared.config.worker_stack_size {
        builder = builder.stack_size(size);
    }
    let shared = Arc::clone(shared);
    builder.spawn(move || run(shared, worker))
}

fn run(shared: Arc<Shared>, worker: Arc<Worker>) {
    loop {
        let task = match worker.park() {
            Signal::Run(task) => task,
            // A resume that raced a reassignment; nothing to return from.
            Signal::Resume => continue,
            Signal::Cancel | Signal::Exit => break,
        };
        if !run_chain(&shared, &worker, task) {
            break;
        }
    }
    debug!(worker = %worker.id(), "worker loop exiting");
    shared.retire(worker.id());
}

/// Run `task` and whatever the scheduler hands back afterwards.
///
/// Returns `false` once the worker must terminate.
fn run_chain(shared: &Arc<Shared>, worker: &Arc<Worker>, mut task: Task) -> bool {
    loop {
        let outcome = execute(shared, worker, task);
        match finish_task(shared, worker.id(), outcome) {
            Next::Run(next) => task = next,
            Next::Idle => return true,
            Next::Terminate => return false,
        }
    }
}

fn execute(shared: &Arc<Shared>, worker: &Arc<Worker>, task: Task) -> Outcome {
    let handle = task.handle();
    let payload = match task.kind {
        TaskKind::Execute(payload) => payload,
        TaskKind::Notify(target) => {
            return Outcome::Fault(format!("{} handed a wake-up for {}", worker.id(), target.worker));
        }
    };
    let cx = TaskContext::new(Arc::clone(shared), Arc::clone(worker), handle);
    match panic::catch_unwind(AssertUnwindSafe(|| payload(&cx))) {
        Ok(Ok(())) => Outcome::Completed,
        Ok(Err(KernelError::Cancelled)) => Outcome::Cancelled,
        Ok(Err(e)) => Outcome::Fault(e.to_string()),
        Err(panic) => Outcome::Fault(format!("panicked: {}", panic_message(panic.as_ref()))),
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
