use std::{
    future::{self, Future},
    pin::Pin,
    sync::{Arc, OnceLock},
    task::{Context, Poll},
    thread,
};

use bytes::Bytes;
use futures_util::FutureExt;
use tokio::{
    runtime::{self, Handle},
    sync::oneshot,
    task,
};

use super::{
    queue::{HashTask, Submitter, WorkerQueue},
    source::{DigestOptions, DigestSource, HttpSourceReader, SourceReader},
    worker::{HashWorker, ThreadWorker},
    Callback, Digest, DigestError,
};

static SHARED: OnceLock<DigestEngine> = OnceLock::new();
static BACKGROUND: OnceLock<Option<Handle>> = OnceLock::new();

/// Computes digests, on a background worker when one is available.
///
/// Cloning is cheap; clones share the same worker queue.
///
/// Requests resolving a file or URL, and requests made while no worker is
/// available, run on the current Tokio runtime. Outside of one they run on a
/// background runtime started on first use.
#[derive(Debug, Clone)]
pub struct DigestEngine {
    submitter: Option<Arc<Submitter>>,
    reader: Arc<dyn SourceReader>,
}

/// Builder for [`DigestEngine`].
#[derive(Debug)]
pub struct DigestEngineBuilder {
    client: reqwest::Client,
    reader: Option<Arc<dyn SourceReader>>,
    worker_enabled: bool,
}

impl Default for DigestEngineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl DigestEngineBuilder {
    /// Create a new [`DigestEngineBuilder`].
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
            reader: None,
            worker_enabled: true,
        }
    }

    /// Configure the `client` used to fetch URL sources.
    pub fn set_client(self, client: reqwest::Client) -> Self {
        Self { client, ..self }
    }

    /// Configure how delegation descriptors are resolved. Takes precedence
    /// over the client.
    pub fn set_source_reader(self, reader: impl SourceReader) -> Self {
        Self {
            reader: Some(Arc::new(reader)),
            ..self
        }
    }

    /// Enable or disable the background worker.
    pub fn set_worker_enabled(self, worker_enabled: bool) -> Self {
        Self {
            worker_enabled,
            ..self
        }
    }

    fn reader(&mut self) -> Arc<dyn SourceReader> {
        self.reader
            .take()
            .unwrap_or_else(|| Arc::new(HttpSourceReader::new(self.client.clone())))
    }

    /// Build the [`DigestEngine`], starting a [`ThreadWorker`] if enabled.
    ///
    /// If the worker or its queue cannot be started, the engine falls back to
    /// hashing on a Tokio runtime.
    pub fn build(mut self) -> DigestEngine {
        let reader = self.reader();

        if !self.worker_enabled {
            return DigestEngine {
                submitter: None,
                reader,
            };
        }

        let submitter = match ThreadWorker::spawn().and_then(WorkerQueue::start) {
            Ok(submitter) => Some(Arc::new(submitter)),
            Err(err) => {
                tracing::debug!(err = %err, "background worker unavailable, using fallback");
                None
            }
        };

        DigestEngine { submitter, reader }
    }

    /// Build the [`DigestEngine`] in front of a custom `worker`.
    pub fn build_with_worker<W: HashWorker>(mut self, worker: W) -> DigestEngine {
        let reader = self.reader();
        let submitter = match WorkerQueue::start(worker) {
            Ok(submitter) => Some(Arc::new(submitter)),
            Err(err) => {
                tracing::debug!(err = %err, "digest queue unavailable, using fallback");
                None
            }
        };

        DigestEngine { submitter, reader }
    }
}

impl DigestEngine {
    /// Process-wide engine, created with default settings on first use and
    /// never torn down.
    pub fn shared() -> &'static DigestEngine {
        SHARED.get_or_init(|| DigestEngineBuilder::new().build())
    }

    /// Whether hashing is offloaded to a background worker.
    pub fn has_worker(&self) -> bool {
        self.submitter.is_some()
    }

    /// Request the digest of `source`; `callback` is invoked exactly once,
    /// never from within this call.
    pub fn digest_with<F>(&self, source: impl Into<DigestSource>, callback: F)
    where
        F: FnOnce(Result<Digest, DigestError>) + Send + 'static,
    {
        let callback: Callback = Box::new(callback);

        match source.into() {
            DigestSource::Binary(buffer) => self.schedule(HashTask { buffer, callback }),

            source => {
                let engine = self.clone();
                spawn(callback, move |callback| async move {
                    match engine.reader.resolve(&source).await {
                        // Resolved bytes are only ever hashed as raw binary.
                        Ok(buffer) => engine.schedule(HashTask { buffer, callback }),
                        Err(err) => {
                            tracing::warn!(err = %err, "could not resolve digest source");
                            callback(Err(err));
                        }
                    }
                });
            }
        }
    }

    /// Like [`DigestEngine::digest_with`], interpreting `data` according to
    /// `options`.
    pub fn digest_data_with<F>(&self, data: impl Into<Bytes>, options: DigestOptions, callback: F)
    where
        F: FnOnce(Result<Digest, DigestError>) + Send + 'static,
    {
        match DigestSource::from_data(data.into(), options) {
            Ok(source) => self.digest_with(source, callback),
            Err(err) => spawn(Box::new(callback), move |callback| async move {
                callback(Err(err));
            }),
        }
    }

    /// Request the digest of `source`, returning a handle resolving to the
    /// result.
    ///
    /// The request is made immediately; the handle need not be polled for it
    /// to progress. Dropping the handle discards the result.
    pub fn submit(&self, source: impl Into<DigestSource>) -> DigestHandle {
        let (tx, rx) = oneshot::channel();
        self.digest_with(source, move |result| {
            let _ = tx.send(result);
        });
        DigestHandle { rx }
    }

    /// Compute the digest of `source`.
    ///
    /// # Example
    ///
    /// ```rust
    /// use imgstore_auth::digest::DigestEngine;
    ///
    /// # #[tokio::main(flavor = "current_thread")]
    /// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
    /// let digest = DigestEngine::shared().digest(b"hello".as_slice()).await?;
    /// assert_eq!(digest.as_str(), "5d41402abc4b2a76b9719d911017c592");
    /// # Ok(())
    /// # }
    /// ```
    pub async fn digest(&self, source: impl Into<DigestSource>) -> Result<Digest, DigestError> {
        self.submit(source).await
    }

    fn schedule(&self, task: HashTask) {
        let task = match &self.submitter {
            Some(submitter) => match submitter.submit(task) {
                Ok(()) => return,
                Err(task) => {
                    tracing::warn!("digest queue is gone, using fallback");
                    task
                }
            },
            None => task,
        };

        fallback(task);
    }
}

/// Hash on the runtime's blocking pool and call back from a spawned task, so
/// the callback never runs within the caller's stack.
fn fallback(task: HashTask) {
    let HashTask { buffer, callback } = task;

    spawn(callback, move |callback| async move {
        let result = task::spawn_blocking(move || Digest::compute(&buffer))
            .await
            .map_err(|err| DigestError::Computation(err.to_string()));
        callback(result);
    });
}

/// Run the future built by `work` on [`runtime_handle`]. If no runtime can be
/// had at all, `callback` is failed instead.
fn spawn<F, Fut>(callback: Callback, work: F)
where
    F: FnOnce(Callback) -> Fut,
    Fut: Future<Output = ()> + Send + 'static,
{
    match runtime_handle() {
        Some(handle) => {
            handle.spawn(work(callback));
        }
        None => callback(Err(DigestError::Computation(
            "no runtime available to run the digest".to_owned(),
        ))),
    }
}

/// The caller's runtime, or the background runtime for callers outside of
/// one, such as plain threads and callbacks running on the queue thread.
fn runtime_handle() -> Option<Handle> {
    Handle::try_current()
        .ok()
        .or_else(|| BACKGROUND.get_or_init(start_background).clone())
}

fn start_background() -> Option<Handle> {
    let rt = match runtime::Builder::new_current_thread().enable_all().build() {
        Ok(rt) => rt,
        Err(err) => {
            tracing::error!(err = %err, "could not build background digest runtime");
            return None;
        }
    };
    let handle = rt.handle().clone();

    let spawned = thread::Builder::new()
        .name("imgstore-digest-runtime".to_owned())
        .spawn(move || rt.block_on(future::pending::<()>()));

    match spawned {
        Ok(_) => {
            tracing::debug!("started background digest runtime");
            Some(handle)
        }
        Err(err) => {
            tracing::error!(err = %err, "could not start background digest runtime");
            None
        }
    }
}

/// Pending digest result returned by [`DigestEngine::submit`].
#[derive(Debug)]
pub struct DigestHandle {
    rx: oneshot::Receiver<Result<Digest, DigestError>>,
}

impl Future for DigestHandle {
    type Output = Result<Digest, DigestError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        self.rx.poll_unpin(cx).map(|received| {
            received.unwrap_or_else(|_| {
                Err(DigestError::Computation(
                    "digest request dropped without a result".to_owned(),
                ))
            })
        })
    }
}
