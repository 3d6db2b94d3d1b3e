use std::{
    collections::VecDeque,
    io,
    panic::{self, AssertUnwindSafe},
    sync::mpsc::{self, Receiver, Sender},
    thread,
};

use bytes::Bytes;

use super::{
    worker::{HashWorker, WorkerReply},
    Callback, Digest, DigestError,
};

/// A pending digest request.
pub(crate) struct HashTask {
    pub(crate) buffer: Bytes,
    pub(crate) callback: Callback,
}

impl std::fmt::Debug for HashTask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HashTask")
            .field("len", &self.buffer.len())
            .finish()
    }
}

/// Messages consumed by the queue thread.
#[derive(Debug)]
pub(crate) enum Event {
    Enqueue(HashTask),
    Completed(Result<Digest, DigestError>),
    Shutdown,
}

/// Sending side of a running queue.
///
/// Dropping the last submitter lets the queue thread drain and exit.
#[derive(Debug)]
pub(crate) struct Submitter {
    events: Sender<Event>,
}

impl Submitter {
    /// Hand `task` to the queue, or return it if the queue is gone.
    pub(crate) fn submit(&self, task: HashTask) -> Result<(), HashTask> {
        self.events
            .send(Event::Enqueue(task))
            .map_err(|mpsc::SendError(event)| match event {
                Event::Enqueue(task) => task,
                _ => unreachable!("only enqueue events are submitted"),
            })
    }
}

impl Drop for Submitter {
    fn drop(&mut self) {
        let _ = self.events.send(Event::Shutdown);
    }
}

/// FIFO of hash tasks feeding a single worker, one task in flight.
pub(crate) struct WorkerQueue<W> {
    tasks: VecDeque<HashTask>,
    worker: Option<W>,
    events: Sender<Event>,
}

impl<W: HashWorker> WorkerQueue<W> {
    /// Start the queue thread in front of `worker`.
    pub(crate) fn start(worker: W) -> io::Result<Submitter> {
        let (events, rx) = mpsc::channel();
        let queue = WorkerQueue {
            tasks: VecDeque::new(),
            worker: Some(worker),
            events: events.clone(),
        };

        thread::Builder::new()
            .name("imgstore-digest-queue".to_owned())
            .spawn(move || queue.run(rx))?;

        Ok(Submitter { events })
    }

    fn run(mut self, events: Receiver<Event>) {
        let mut closing = false;

        while let Ok(event) = events.recv() {
            match event {
                Event::Enqueue(task) => self.enqueue(task),
                Event::Completed(result) => self.complete(result),
                Event::Shutdown => closing = true,
            }

            if closing && self.tasks.is_empty() {
                break;
            }
        }

        tracing::debug!("digest queue stopped");
    }

    fn enqueue(&mut self, task: HashTask) {
        self.tasks.push_back(task);

        // Anything more than the new task means a computation is in flight and
        // will pick this one up when it completes.
        if self.tasks.len() == 1 {
            self.dispatch_head();
        }
    }

    fn complete(&mut self, result: Result<Digest, DigestError>) {
        let Some(task) = self.tasks.pop_front() else {
            tracing::warn!("digest completed with no task in flight");
            return;
        };

        if let Err(err) = &result {
            tracing::warn!(err = %err, len = task.buffer.len(), "digest failed");
        }

        let callback = task.callback;
        if panic::catch_unwind(AssertUnwindSafe(move || callback(result))).is_err() {
            tracing::error!("digest callback panicked");
        }

        if !self.tasks.is_empty() {
            self.dispatch_head();
        }
    }

    fn dispatch_head(&mut self) {
        let Some(task) = self.tasks.front() else {
            return;
        };

        let reply = WorkerReply::new(self.events.clone());
        let reply = match self.worker.as_mut() {
            Some(worker) => match worker.post(task.buffer.clone(), reply) {
                Ok(()) => return,
                Err(reply) => {
                    tracing::warn!("digest worker is gone, hashing on the queue thread");
                    self.worker = None;
                    reply
                }
            },
            None => reply,
        };

        reply.send(Ok(Digest::compute(&task.buffer)));
    }
}
