//! Append-only journal shared between the ingestion task and readers, plus
//! the replaying emission stream built on top of it.
//!
//! The ingestion task owns the only `watch::Sender<usize>`; after every append
//! it publishes the new length. Each subscriber keeps its own cursor into the
//! journal and reads `cursor..len` whenever the published length moves, so a
//! coalesced notification never loses values. Dropping the sender (ingestion
//! stopped) ends every subscriber once its cursor reaches the end.

use crate::{Outcome, UpstreamFailure};
use futures_util::stream::{self, BoxStream, StreamExt};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::watch;
use tokio_stream::wrappers::WatchStream;

/// Every value emitted since collection began, backlog first.
pub type Emissions<T> = BoxStream<'static, T>;

pub(crate) type SharedJournal<T> = Arc<Mutex<Journal<T>>>;

#[derive(Debug)]
pub(crate) struct Journal<T> {
    values: Vec<T>,
    failure: Option<UpstreamFailure>,
    outcome: Option<Outcome>,
}

impl<T> Journal<T> {
    pub(crate) fn shared() -> SharedJournal<T> {
        Arc::new(Mutex::new(Self {
            values: Vec::new(),
            failure: None,
            outcome: None,
        }))
    }

    /// Appends and returns the new length.
    pub(crate) fn push(&mut self, value: T) -> usize {
        self.values.push(value);
        self.values.len()
    }

    pub(crate) fn values(&self) -> &[T] {
        &self.values
    }

    pub(crate) fn failure(&self) -> Option<&UpstreamFailure> {
        self.failure.as_ref()
    }

    pub(crate) fn outcome(&self) -> Option<&Outcome> {
        self.outcome.as_ref()
    }

    /// First failure wins; returns false if one was already recorded.
    pub(crate) fn fail(&mut self, failure: UpstreamFailure) -> bool {
        if self.failure.is_some() {
            return false;
        }
        self.failure = Some(failure);
        true
    }

    /// Records how ingestion ended. A later outcome never replaces an earlier one.
    pub(crate) fn settle(&mut self, outcome: Outcome) {
        if let Outcome::Failed(failure) = &outcome {
            self.fail(failure.clone());
        }
        if self.outcome.is_none() {
            self.outcome = Some(outcome);
        }
    }
}

/// The journal only ever grows, so a guard from a poisoned lock is still
/// consistent.
pub(crate) fn lock<T>(journal: &Mutex<Journal<T>>) -> MutexGuard<'_, Journal<T>> {
    journal.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

pub(crate) fn replay<T>(journal: SharedJournal<T>, published: watch::Receiver<usize>) -> Emissions<T>
where
    T: Clone + Send + 'static,
{
    let mut cursor = 0usize;
    WatchStream::new(published)
        .flat_map(move |len| {
            let fresh = lock(&journal)
                .values
                .get(cursor..len)
                .map(<[T]>::to_vec)
                .unwrap_or_default();
            cursor = cursor.max(len);
            stream::iter(fresh)
        })
        .boxed()
}
