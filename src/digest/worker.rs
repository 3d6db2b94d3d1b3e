use std::{
    io,
    sync::mpsc::{self, SendError, Sender},
    thread,
};

use bytes::Bytes;

use super::{queue::Event, Digest, DigestError};

/// One-shot reply slot for a payload posted to a [`HashWorker`].
///
/// Dropping a reply without sending reports a computation error for its task,
/// so a lost payload never leaves the queue waiting.
#[derive(Debug)]
pub struct WorkerReply {
    events: Option<Sender<Event>>,
}

impl WorkerReply {
    pub(crate) fn new(events: Sender<Event>) -> Self {
        Self {
            events: Some(events),
        }
    }

    /// Deliver the result for the posted payload.
    pub fn send(mut self, result: Result<Digest, DigestError>) {
        if let Some(events) = self.events.take() {
            // The queue outlives every reply it hands out.
            let _ = events.send(Event::Completed(result));
        }
    }
}

impl Drop for WorkerReply {
    fn drop(&mut self) {
        if let Some(events) = self.events.take() {
            tracing::error!("worker dropped a payload without replying");
            let _ = events.send(Event::Completed(Err(DigestError::Computation(
                "worker dropped the payload without replying".to_owned(),
            ))));
        }
    }
}

/// Background worker boundary: takes raw payloads, answers with digests.
///
/// The queue posts at most one payload at a time and waits for its reply
/// before posting the next.
pub trait HashWorker: Send + 'static {
    /// Post `payload` for hashing. The worker answers through `reply`.
    ///
    /// Returns the reply back if the worker can no longer accept work.
    fn post(&mut self, payload: Bytes, reply: WorkerReply) -> Result<(), WorkerReply>;
}

/// Worker hashing payloads on a dedicated OS thread.
#[derive(Debug)]
pub struct ThreadWorker {
    jobs: Sender<(Bytes, WorkerReply)>,
}

impl ThreadWorker {
    /// Start the worker thread.
    pub fn spawn() -> io::Result<Self> {
        let (jobs, rx) = mpsc::channel::<(Bytes, WorkerReply)>();

        thread::Builder::new()
            .name("imgstore-digest-worker".to_owned())
            .spawn(move || {
                for (payload, reply) in rx {
                    reply.send(Ok(Digest::compute(&payload)));
                }
                tracing::debug!("digest worker stopped");
            })?;

        Ok(Self { jobs })
    }
}

impl HashWorker for ThreadWorker {
    fn post(&mut self, payload: Bytes, reply: WorkerReply) -> Result<(), WorkerReply> {
        self.jobs
            .send((payload, reply))
            .map_err(|SendError((_, reply))| reply)
    }
}
