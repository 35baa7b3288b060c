//! Confinement of state to the UI thread.
//!
//! Other threads never touch UI-owned state directly: they send a job through
//! a [`DispatcherHandle`] and the UI thread runs it against the state from its
//! [`DispatchQueue`]. [`DispatcherHandle::invoke`] waits for the job to finish,
//! [`DispatcherHandle::post`] does not.

use crate::Error;
use futures::StreamExt;
use futures::channel::{mpsc, oneshot};
use std::thread::{self, ThreadId};

/// A unit of work to run on the UI thread against a `T`.
pub struct Job<T>(Box<dyn FnOnce(&mut T) + Send>);

impl<T> Job<T> {
    pub fn run(self, target: &mut T) {
        (self.0)(target)
    }
}

/// Sending side of the dispatcher. Cheap to clone and usable from any thread.
pub struct DispatcherHandle<T> {
    sender: mpsc::UnboundedSender<Job<T>>,
    owner: ThreadId,
}

impl<T> Clone for DispatcherHandle<T> {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
            owner: self.owner,
        }
    }
}

impl<T> std::fmt::Debug for DispatcherHandle<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DispatcherHandle")
            .field("owner", &self.owner)
            .field("closed", &self.sender.is_closed())
            .finish()
    }
}

/// Receiving side of the dispatcher, drained by the UI thread.
pub struct DispatchQueue<T> {
    receiver: mpsc::UnboundedReceiver<Job<T>>,
}

/// Create a dispatcher whose owner is the calling thread.
pub fn channel<T>() -> (DispatcherHandle<T>, DispatchQueue<T>) {
    let (sender, receiver) = mpsc::unbounded();
    (
        DispatcherHandle {
            sender,
            owner: thread::current().id(),
        },
        DispatchQueue { receiver },
    )
}

impl<T: 'static> DispatcherHandle<T> {
    /// Run `f` on the UI thread and block until it has returned.
    ///
    /// There is no timeout. Jobs sent from one thread run in the order they
    /// were sent.
    pub fn invoke<R, F>(&self, f: F) -> Result<R, Error>
    where
        F: FnOnce(&mut T) -> R + Send + 'static,
        R: Send + 'static,
    {
        if self.is_owner_thread() {
            return Err(Error::OwnerThread);
        }

        let (done, completion) = oneshot::channel();
        self.send(Job(Box::new(move |target| {
            let _ = done.send(f(target));
        })))?;

        // The sender is dropped unrun if the queue goes away first.
        futures::executor::block_on(completion).map_err(|_| Error::DispatcherClosed)
    }

    /// Queue `f` for the UI thread without waiting for it.
    pub fn post<F>(&self, f: F) -> Result<(), Error>
    where
        F: FnOnce(&mut T) + Send + 'static,
    {
        self.send(Job(Box::new(f)))
    }

    fn send(&self, job: Job<T>) -> Result<(), Error> {
        self.sender
            .unbounded_send(job)
            .map_err(|_| Error::DispatcherClosed)
    }

    /// Stop accepting jobs. Jobs already queued still run.
    pub fn shutdown(&self) {
        self.sender.close_channel();
    }

    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }

    /// Whether the calling thread is the UI thread that drains the queue.
    pub fn is_owner_thread(&self) -> bool {
        thread::current().id() == self.owner
    }
}

impl<T> DispatchQueue<T> {
    /// Wait for the next job. `None` once the dispatcher is shut down and drained.
    pub async fn next(&mut self) -> Option<Job<T>> {
        self.receiver.next().await
    }

    /// Run every job that is already queued, without waiting for more.
    pub fn run_pending(&mut self, target: &mut T) -> usize {
        let mut ran = 0;
        while let Ok(Some(job)) = self.receiver.try_next() {
            job.run(target);
            ran += 1;
        }
        ran
    }

    /// Run jobs as they arrive until the dispatcher is shut down, or every
    /// handle is dropped, and the queue is empty.
    pub fn run_until_closed(&mut self, target: &mut T) {
        while let Some(job) = futures::executor::block_on(self.next()) {
            job.run(target);
        }
        log::debug!("dispatch queue closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc as std_mpsc;

    /// Run a "UI thread" owning a `Vec<u32>` and return its handle.
    fn spawn_ui() -> (DispatcherHandle<Vec<u32>>, thread::JoinHandle<Vec<u32>>) {
        let (handle_tx, handle_rx) = std_mpsc::channel();
        let ui = thread::spawn(move || {
            let (handle, mut queue) = channel::<Vec<u32>>();
            handle_tx.send(handle).unwrap();
            let mut state = Vec::new();
            queue.run_until_closed(&mut state);
            state
        });
        (handle_rx.recv().unwrap(), ui)
    }

    #[test]
    fn invoke_returns_result_of_job() {
        let (handle, ui) = spawn_ui();
        let len = handle
            .invoke(|state| {
                state.push(1);
                state.len()
            })
            .unwrap();
        assert_eq!(len, 1);

        handle.shutdown();
        assert_eq!(ui.join().unwrap(), vec![1]);
    }

    #[test]
    fn jobs_run_in_send_order() {
        let (handle, ui) = spawn_ui();
        for i in 0..100 {
            if i % 2 == 0 {
                handle.invoke(move |state| state.push(i)).unwrap();
            } else {
                handle.post(move |state| state.push(i)).unwrap();
            }
        }
        handle.shutdown();
        assert_eq!(ui.join().unwrap(), (0..100).collect::<Vec<_>>());
    }

    #[test]
    fn invoke_from_owner_thread_is_rejected() {
        let (handle, mut queue) = channel::<u8>();
        assert!(handle.is_owner_thread());
        assert!(matches!(handle.invoke(|_| ()), Err(Error::OwnerThread)));

        handle.post(|v| *v += 1).unwrap();
        let mut value = 0;
        assert_eq!(queue.run_pending(&mut value), 1);
        assert_eq!(value, 1);
    }

    #[test]
    fn closed_dispatcher_rejects_work() {
        let (handle, ui) = spawn_ui();
        handle.shutdown();
        ui.join().unwrap();

        assert!(handle.is_closed());
        assert!(matches!(handle.invoke(|_| ()), Err(Error::DispatcherClosed)));
        assert!(matches!(handle.post(|_| ()), Err(Error::DispatcherClosed)));
    }

    #[test]
    fn dropped_queue_releases_blocked_invoker() {
        let (handle_tx, handle_rx) = std_mpsc::channel();
        let (ready_tx, ready_rx) = std_mpsc::channel::<()>();
        let ui = thread::spawn(move || {
            let (handle, queue) = channel::<()>();
            handle_tx.send(handle).unwrap();
            ready_rx.recv().unwrap();
            drop(queue);
        });
        let handle = handle_rx.recv().unwrap();

        // Whether the job lands before or after the queue is dropped, the
        // invoker must come back with an error instead of hanging.
        let invoker = thread::spawn(move || handle.invoke(|_| ()));
        ready_tx.send(()).unwrap();
        ui.join().unwrap();

        assert!(matches!(invoker.join().unwrap(), Err(Error::DispatcherClosed)));
    }
}
