//! Public API surface, collection options, and entry points.
//!
//! A [`Collector`] attaches to any async stream and records every value it
//! produces on a background task. Test code can read the history, wait for a
//! value matching a predicate, or assert that the producer finished cleanly.
//!
//! ```ignore
//! let mut c = stream_collector::collect_values(futures_util::stream::iter([1, 2, 3]))?;
//! assert_eq!(c.wait_for_blocking(|_, v| *v == 3)?, 3);
//! c.assert_no_errors_blocking()?;
//! assert_eq!(c.latest_values(), vec![1, 2, 3]);
//! ```

mod collector;
mod replay;

#[cfg(feature = "mock")]
pub mod mock;

pub mod types;
pub use crate::collector::Collector;
pub use crate::replay::Emissions;
pub use crate::types::{BoxError, Error, FailureKind, Outcome, Result, UpstreamFailure};

use futures_core::Stream;
use futures_util::StreamExt;
use once_cell::sync::Lazy;
use std::{convert::Infallible, fmt, time::Duration};

pub const DEFAULT_TAG: &str = "collector";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

// ===== Env-driven defaults =====

static VERBOSE_DEFAULT: Lazy<bool> =
    Lazy::new(|| std::env::var("STREAM_COLLECTOR_VERBOSE").ok().as_deref() == Some("1"));

// ===== Scheduling context =====

/// Where the ingestion task runs.
#[derive(Clone, Debug, Default)]
pub enum Context {
    /// A dedicated single-worker runtime owned by the collector.
    #[default]
    Isolated,
    /// The runtime that is current when the collector starts.
    Current,
    /// An explicit runtime handle. The `*_blocking` methods need a
    /// multi-thread runtime.
    Handle(tokio::runtime::Handle),
}

// ===== Options =====

#[derive(Clone, Debug)]
pub struct CollectOptions {
    pub tag: String,
    /// Log every received value. Defaults to `STREAM_COLLECTOR_VERBOSE=1`.
    pub verbose: bool,
    pub context: Context,
    /// Used by [`Collector::wait_for`] and its blocking variant.
    pub timeout: Duration,
}

impl CollectOptions {
    pub fn new() -> Self {
        Self {
            tag: DEFAULT_TAG.to_string(),
            verbose: *VERBOSE_DEFAULT,
            context: Context::default(),
            timeout: DEFAULT_TIMEOUT,
        }
    }
    pub fn tag(mut self, tag: impl fmt::Display) -> Self {
        self.tag = tag.to_string();
        self
    }
    pub fn verbose(mut self, on: bool) -> Self {
        self.verbose = on;
        self
    }
    pub fn context(mut self, context: Context) -> Self {
        self.context = context;
        self
    }
    pub fn default_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

impl Default for CollectOptions {
    fn default() -> Self {
        Self::new()
    }
}

// ===== Public API (thin) =====

/// Collect a fallible stream with default options.
pub fn collect<T, S, E>(source: S) -> Result<Collector<T>>
where
    T: Clone + fmt::Debug + Send + 'static,
    S: Stream<Item = std::result::Result<T, E>> + Send + 'static,
    E: Into<BoxError>,
{
    Collector::start(source, CollectOptions::new())
}

/// Collect a fallible stream with options.
pub fn collect_with<T, S, E>(source: S, opts: CollectOptions) -> Result<Collector<T>>
where
    T: Clone + fmt::Debug + Send + 'static,
    S: Stream<Item = std::result::Result<T, E>> + Send + 'static,
    E: Into<BoxError>,
{
    Collector::start(source, opts)
}

/// Collect a stream that cannot fail, with default options.
pub fn collect_values<T, S>(source: S) -> Result<Collector<T>>
where
    T: Clone + fmt::Debug + Send + 'static,
    S: Stream<Item = T> + Send + 'static,
{
    collect_values_with(source, CollectOptions::new())
}

/// Collect a stream that cannot fail, with options.
pub fn collect_values_with<T, S>(source: S, opts: CollectOptions) -> Result<Collector<T>>
where
    T: Clone + fmt::Debug + Send + 'static,
    S: Stream<Item = T> + Send + 'static,
{
    Collector::start(source.map(Ok::<T, Infallible>), opts)
}
