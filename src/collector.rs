//! The collector: a background ingestion task plus the query and wait API.

use crate::replay::{self, Emissions, Journal, SharedJournal, lock};
use crate::{BoxError, CollectOptions, Context, Error, FailureKind, Outcome, Result, UpstreamFailure};
use futures_core::Stream;
use futures_util::stream::{self, BoxStream, StreamExt};
use log::{debug, info, warn};
use std::{any::Any, fmt, time::Duration};
use tokio::{
    runtime::{Handle, Runtime, RuntimeFlavor},
    sync::{oneshot, watch},
    task::{JoinError, JoinHandle},
};

type Upstream<T> = BoxStream<'static, std::result::Result<T, BoxError>>;

/// Records everything an upstream stream produces, on a task of its own.
///
/// Values are appended in arrival order and never dropped. A producer error
/// or panic is stored, not raised; call [`assert_no_errors`](Self::assert_no_errors)
/// to turn it into a test failure.
///
/// Async methods may be awaited from any runtime. The `*_blocking` variants
/// drive the future on the collector's own runtime handle and must not be
/// called from async contexts.
pub struct Collector<T> {
    tag: String,
    verbose: bool,
    default_timeout: Duration,
    journal: SharedJournal<T>,
    published: watch::Receiver<usize>,
    stop: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<Outcome>>,
    handle: Handle,
    runtime: Option<Runtime>,
}

impl<T> fmt::Debug for Collector<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Collector")
            .field("tag", &self.tag)
            .field("collected", &lock(&self.journal).values().len())
            .field("running", &self.is_running())
            .finish_non_exhaustive()
    }
}

impl<T> Collector<T>
where
    T: Clone + fmt::Debug + Send + 'static,
{
    /// Starts collecting `source` and returns immediately.
    ///
    /// With [`Context::Current`] this must be called from inside a Tokio runtime.
    pub fn start<S, E>(source: S, opts: CollectOptions) -> Result<Self>
    where
        S: Stream<Item = std::result::Result<T, E>> + Send + 'static,
        E: Into<BoxError>,
    {
        let (runtime, handle) = match opts.context {
            Context::Isolated => {
                let rt = tokio::runtime::Builder::new_multi_thread()
                    .worker_threads(1)
                    .thread_name(format!("{}-ingest", opts.tag))
                    .enable_all()
                    .build()?;
                let handle = rt.handle().clone();
                (Some(rt), handle)
            }
            Context::Current => (None, Handle::try_current()?),
            Context::Handle(handle) => (None, handle),
        };

        let journal = Journal::shared();
        let (tx, published) = watch::channel(0usize);
        let (stop, stopped) = oneshot::channel();
        let upstream: Upstream<T> = source.map(|item| item.map_err(Into::into)).boxed();

        info!("{}: collecting", opts.tag);
        let task = handle.spawn(ingest(
            upstream,
            journal.clone(),
            tx,
            stopped,
            opts.tag.clone(),
            opts.verbose,
        ));

        Ok(Self {
            tag: opts.tag,
            verbose: opts.verbose,
            default_timeout: opts.timeout,
            journal,
            published,
            stop: Some(stop),
            task: Some(task),
            handle,
            runtime,
        })
    }

    // ===== Queries =====

    /// Replays every value since collection began, then follows live values.
    /// Ends once ingestion has stopped and the backlog is drained.
    pub fn emissions(&self) -> Emissions<T> {
        replay::replay(self.journal.clone(), self.published.clone())
    }

    pub fn latest_value(&self) -> Result<T> {
        lock(&self.journal)
            .values()
            .last()
            .cloned()
            .ok_or(Error::EmptyHistory)
    }

    /// Snapshot of everything collected so far.
    pub fn latest_values(&self) -> Vec<T> {
        lock(&self.journal).values().to_vec()
    }

    // ===== Waiting =====

    /// [`wait_for_timeout`](Self::wait_for_timeout) with the configured default timeout.
    pub async fn wait_for<P>(&self, predicate: P) -> Result<T>
    where
        P: FnMut(&[T], &T) -> bool,
    {
        self.wait_for_timeout(self.default_timeout, predicate).await
    }

    /// Returns the first value, backlog included, for which `predicate` holds.
    ///
    /// The predicate sees the values received before the candidate and the
    /// candidate itself. Every call walks the history with its own cursor, so
    /// concurrent waits do not interfere.
    pub async fn wait_for_timeout<P>(&self, timeout: Duration, mut predicate: P) -> Result<T>
    where
        P: FnMut(&[T], &T) -> bool,
    {
        // A stopped collector has nothing more to offer; the wait still runs
        // to its deadline.
        let mut emissions = self.emissions().chain(stream::pending()).boxed();
        let mut history: Vec<T> = Vec::new();
        let search = async {
            while let Some(value) = emissions.next().await {
                if predicate(history.as_slice(), &value) {
                    return Some(value);
                }
                history.push(value);
            }
            None
        };
        match tokio::time::timeout(timeout, search).await {
            Ok(Some(value)) => Ok(value),
            Ok(None) | Err(_) => Err(Error::Timeout(timeout)),
        }
    }

    // ===== Completion =====

    /// Waits until ingestion has stopped, optionally asking it to stop first.
    ///
    /// Failures seen while waiting (a producer panic, the task being torn down)
    /// are recorded as the terminal error rather than returned.
    pub async fn finish(&mut self, cancel: bool) -> Outcome {
        if cancel {
            self.request_stop();
        }
        if let Some(task) = self.task.take() {
            let outcome = match task.await {
                Ok(outcome) => outcome,
                Err(err) => {
                    let failure = join_failure(err);
                    warn!("{}: ingestion task failed: {failure}", self.tag);
                    Outcome::Failed(failure)
                }
            };
            lock(&self.journal).settle(outcome);
        }
        self.outcome().unwrap_or(Outcome::Cancelled)
    }

    /// Stops a running collector and waits for the task to acknowledge.
    pub async fn cancel(&mut self) -> Result<()> {
        if !self.is_running() {
            self.finish(false).await;
            return Err(Error::AlreadyStopped);
        }
        self.finish(true).await;
        Ok(())
    }

    /// Waits for the producer to finish, then fails if it reported an error.
    pub async fn assert_no_errors(&mut self) -> Result<()> {
        self.finish(false).await;
        match self.terminal_error() {
            Some(failure) => Err(Error::Unexpected(failure)),
            None => Ok(()),
        }
    }

    // ===== Blocking variants =====

    //
    // `Handle::block_on` cannot drive the scheduler or timers of a
    // current-thread runtime, so these fail with `BlockingUnsupported` there.

    pub fn wait_for_blocking<P>(&self, predicate: P) -> Result<T>
    where
        P: FnMut(&[T], &T) -> bool,
    {
        self.blocking_handle()?.block_on(self.wait_for(predicate))
    }

    pub fn wait_for_timeout_blocking<P>(&self, timeout: Duration, predicate: P) -> Result<T>
    where
        P: FnMut(&[T], &T) -> bool,
    {
        self.blocking_handle()?
            .block_on(self.wait_for_timeout(timeout, predicate))
    }

    pub fn finish_blocking(&mut self, cancel: bool) -> Result<Outcome> {
        let handle = self.blocking_handle()?;
        Ok(handle.block_on(self.finish(cancel)))
    }

    pub fn cancel_blocking(&mut self) -> Result<()> {
        let handle = self.blocking_handle()?;
        handle.block_on(self.cancel())
    }

    pub fn assert_no_errors_blocking(&mut self) -> Result<()> {
        let handle = self.blocking_handle()?;
        handle.block_on(self.assert_no_errors())
    }
}

impl<T> Collector<T> {
    pub fn tag(&self) -> &str {
        &self.tag
    }

    pub fn is_verbose(&self) -> bool {
        self.verbose
    }

    /// True until ingestion has stopped for any reason.
    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|t| !t.is_finished())
    }

    pub fn len(&self) -> usize {
        lock(&self.journal).values().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn terminal_error(&self) -> Option<UpstreamFailure> {
        lock(&self.journal).failure().cloned()
    }

    /// How ingestion ended, or `None` while it is still running.
    pub fn outcome(&self) -> Option<Outcome> {
        lock(&self.journal).outcome().cloned()
    }

    fn blocking_handle(&self) -> Result<Handle> {
        match self.handle.runtime_flavor() {
            RuntimeFlavor::CurrentThread => Err(Error::BlockingUnsupported),
            _ => Ok(self.handle.clone()),
        }
    }

    fn request_stop(&mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
    }
}

impl<T> Drop for Collector<T> {
    fn drop(&mut self) {
        self.request_stop();
        if let Some(rt) = self.runtime.take() {
            rt.shutdown_background();
        }
    }
}

fn join_failure(err: JoinError) -> UpstreamFailure {
    if err.is_panic() {
        UpstreamFailure::new(FailureKind::Panicked, panic_message(err.into_panic()))
    } else {
        UpstreamFailure::new(FailureKind::Aborted, err.to_string())
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    match payload.downcast::<String>() {
        Ok(msg) => *msg,
        Err(payload) => match payload.downcast::<&'static str>() {
            Ok(msg) => (*msg).to_string(),
            Err(_) => "non-string panic payload".to_string(),
        },
    }
}

async fn ingest<T>(
    mut upstream: Upstream<T>,
    journal: SharedJournal<T>,
    published: watch::Sender<usize>,
    mut stopped: oneshot::Receiver<()>,
    tag: String,
    verbose: bool,
) -> Outcome
where
    T: fmt::Debug + Send + 'static,
{
    let outcome = loop {
        tokio::select! {
            biased;
            // A dropped sender means the collector itself is gone.
            _ = &mut stopped => break Outcome::Cancelled,
            next = upstream.next() => match next {
                Some(Ok(value)) => {
                    if verbose {
                        debug!("{tag}: received {value:?}");
                    }
                    let len = lock(&journal).push(value);
                    published.send_replace(len);
                }
                Some(Err(err)) => {
                    let failure = UpstreamFailure::new(FailureKind::Error, err);
                    warn!("{tag}: upstream failed: {failure}");
                    break Outcome::Failed(failure);
                }
                None => break Outcome::Completed,
            },
        }
    };
    let collected = {
        let mut j = lock(&journal);
        j.settle(outcome.clone());
        j.values().len()
    };
    info!("{tag}: {outcome} after {collected} values");
    outcome
}
