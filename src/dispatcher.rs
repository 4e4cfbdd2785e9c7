//! Owner-thread dispatch
//!
//! Capture sessions and the display brush belong to the thread that created
//! them (the UI thread). Async workflows resume on arbitrary runtime threads,
//! so thread-affine work is sent back explicitly with [`run_on_owner`].

use std::thread::{self, ThreadId};

use anyhow::{anyhow, Result};
use tokio::sync::{mpsc, oneshot};

pub type OwnerJob = Box<dyn FnOnce() + Send>;

/// Runs jobs on the owner thread
pub trait OwnerDispatcher: Send + Sync {
    fn is_owner_thread(&self) -> bool;

    /// Queue `job` to run on the owner thread.
    fn post(&self, job: OwnerJob) -> Result<()>;
}

/// Run `f` on the owner thread and return its result.
///
/// Runs inline when already on the owner thread.
pub async fn run_on_owner<R, F>(owner: &dyn OwnerDispatcher, f: F) -> Result<R>
where
    F: FnOnce() -> Result<R> + Send + 'static,
    R: Send + 'static,
{
    if owner.is_owner_thread() {
        return f();
    }

    let (tx, rx) = oneshot::channel();
    owner.post(Box::new(move || {
        let _ = tx.send(f());
    }))?;
    rx.await
        .map_err(|_| anyhow!("owner thread dropped the job before running it"))?
}

/// Sending half of the owner queue; cheap to clone and share.
#[derive(Clone)]
pub struct OwnerQueue {
    sender: mpsc::UnboundedSender<OwnerJob>,
    owner: ThreadId,
}

impl OwnerDispatcher for OwnerQueue {
    fn is_owner_thread(&self) -> bool {
        thread::current().id() == self.owner
    }

    fn post(&self, job: OwnerJob) -> Result<()> {
        self.sender
            .send(job)
            .map_err(|_| anyhow!("owner thread is no longer pumping jobs"))
    }
}

/// Receiving half, drained by the owner thread's loop.
pub struct OwnerPump {
    receiver: mpsc::UnboundedReceiver<OwnerJob>,
}

impl OwnerPump {
    /// Run every queued job. Returns how many ran.
    pub fn run_pending(&mut self) -> usize {
        let mut ran = 0;
        while let Ok(job) = self.receiver.try_recv() {
            job();
            ran += 1;
        }
        ran
    }
}

/// Create a queue whose owner is the calling thread.
pub fn owner_queue() -> (OwnerQueue, OwnerPump) {
    let (sender, receiver) = mpsc::unbounded_channel();
    let queue = OwnerQueue {
        sender,
        owner: thread::current().id(),
    };
    (queue, OwnerPump { receiver })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn block_on<F: std::future::Future>(future: F) -> F::Output {
        tokio::runtime::Builder::new_current_thread()
            .build()
            .unwrap()
            .block_on(future)
    }

    #[test]
    fn runs_inline_on_owner_thread() {
        let (queue, mut pump) = owner_queue();
        let caller = thread::current().id();

        let ran_on = block_on(run_on_owner(&queue, move || Ok(thread::current().id()))).unwrap();

        assert_eq!(ran_on, caller);
        assert_eq!(pump.run_pending(), 0);
    }

    #[test]
    fn other_threads_wait_for_the_owner_pump() {
        let (queue, mut pump) = owner_queue();
        let owner = thread::current().id();

        let worker = thread::spawn(move || {
            block_on(run_on_owner(&queue, || Ok(thread::current().id())))
        });

        let mut ran = 0;
        while !worker.is_finished() {
            ran += pump.run_pending();
            thread::sleep(Duration::from_millis(1));
        }

        assert_eq!(ran, 1);
        assert_eq!(worker.join().unwrap().unwrap(), owner);
    }

    #[test]
    fn errors_from_the_job_reach_the_caller() {
        let (queue, mut pump) = owner_queue();

        let worker = thread::spawn(move || {
            block_on(run_on_owner(&queue, || -> Result<()> { Err(anyhow!("device lost")) }))
        });
        while !worker.is_finished() {
            pump.run_pending();
            thread::sleep(Duration::from_millis(1));
        }

        let err = worker.join().unwrap().unwrap_err();
        assert_eq!(err.to_string(), "device lost");
    }

    #[test]
    fn posting_after_pump_is_dropped_fails() {
        let (queue, pump) = owner_queue();
        drop(pump);
        assert!(queue.post(Box::new(|| {})).is_err());
    }
}
