// 后台执行线程池与任务句柄
use crate::utils::error::{Result, SshError};
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TryRecvError};
use log::{debug, warn};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

pub struct ThreadPool {
    workers: Vec<Worker>,
    sender: Option<Sender<Job>>,
}

type Job = Box<dyn FnOnce() + Send + 'static>;

impl ThreadPool {
    /// Starts `size` workers sharing a queue of `capacity` pending jobs.
    ///
    /// With one worker, jobs run strictly in submission order.
    pub fn new(size: usize, capacity: usize) -> ThreadPool {
        assert!(size > 0);

        let (sender, receiver) = bounded(capacity.max(1));
        let receiver = Arc::new(receiver);
        let mut workers = Vec::with_capacity(size);

        for id in 0..size {
            workers.push(Worker::new(id, Arc::clone(&receiver)));
        }

        ThreadPool {
            workers,
            sender: Some(sender),
        }
    }

    /// Queues `f` and returns a handle to its result.
    ///
    /// Blocks while the queue is full.
    pub fn submit<F, T>(&self, f: F) -> TaskHandle<T>
    where
        F: FnOnce() -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let (result_tx, result_rx) = bounded(1);
        let job: Job = Box::new(move || {
            // 调用方放弃句柄时结果直接丢弃
            if result_tx.send(f()).is_err() {
                debug!("Task result discarded, handle was dropped");
            }
        });

        let queued = self
            .sender
            .as_ref()
            .map(|sender| sender.send(job).is_ok())
            .unwrap_or(false);
        if !queued {
            warn!("Thread pool is shut down, task rejected");
        }

        TaskHandle { receiver: result_rx }
    }
}

impl Drop for ThreadPool {
    fn drop(&mut self) {
        // 关闭队列，工作线程处理完剩余任务后退出
        drop(self.sender.take());

        for worker in &mut self.workers {
            if let Some(thread) = worker.thread.take() {
                if thread.join().is_err() {
                    warn!("Worker {} panicked", worker.id);
                }
            }
        }
    }
}

struct Worker {
    id: usize,
    thread: Option<thread::JoinHandle<()>>,
}

impl Worker {
    fn new(id: usize, receiver: Arc<Receiver<Job>>) -> Worker {
        let thread = thread::Builder::new()
            .name(format!("ssh-exec-worker-{id}"))
            .spawn(move || {
                while let Ok(job) = receiver.recv() {
                    job();
                }
                debug!("Worker {} stopped", id);
            })
            .ok();

        if thread.is_none() {
            warn!("Failed to spawn worker {}", id);
        }

        Worker { id, thread }
    }
}

/// Pending result of a submitted task.
///
/// Dropping the handle does not stop the task.
#[derive(Debug)]
pub struct TaskHandle<T> {
    receiver: Receiver<Result<T>>,
}

impl<T> TaskHandle<T> {
    /// Blocks until the task finished.
    pub fn wait(self) -> Result<T> {
        self.receiver.recv().unwrap_or(Err(SshError::WorkerStopped))
    }

    /// Like [`wait`](Self::wait) but gives up after `timeout`; the handle stays usable.
    pub fn wait_timeout(&self, timeout: Duration) -> Result<T> {
        match self.receiver.recv_timeout(timeout) {
            Ok(result) => result,
            Err(RecvTimeoutError::Timeout) => Err(SshError::WaitTimeout(timeout)),
            Err(RecvTimeoutError::Disconnected) => Err(SshError::WorkerStopped),
        }
    }

    /// Returns the result if it is already available.
    pub fn try_result(&self) -> Option<Result<T>> {
        match self.receiver.try_recv() {
            Ok(result) => Some(result),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => Some(Err(SshError::WorkerStopped)),
        }
    }
}
