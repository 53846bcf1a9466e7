// src/mock.rs
//! Scripted producers for tests and demos.

use futures_util::stream::{self, BoxStream, StreamExt};
use std::{future, time::Duration};
use tokio::time;
use tokio_stream::wrappers::IntervalStream;

enum Step<T> {
    Emit(T),
    Pause(Duration),
    Fail(String),
    Hang,
}

/// A producer that plays back a fixed script of emissions, pauses and
/// terminal events. Without a `fail` or `hang` step it completes normally
/// after the last step.
pub struct ScriptedSource<T> {
    steps: Vec<Step<T>>,
}

impl<T: Send + 'static> ScriptedSource<T> {
    pub fn new() -> Self {
        Self { steps: Vec::new() }
    }
    pub fn emit(mut self, value: T) -> Self {
        self.steps.push(Step::Emit(value));
        self
    }
    pub fn emit_all(mut self, values: impl IntoIterator<Item = T>) -> Self {
        self.steps.extend(values.into_iter().map(Step::Emit));
        self
    }
    pub fn pause(mut self, d: Duration) -> Self {
        self.steps.push(Step::Pause(d));
        self
    }
    /// Terminate with an error. Later steps are never reached.
    pub fn fail(mut self, msg: impl Into<String>) -> Self {
        self.steps.push(Step::Fail(msg.into()));
        self
    }
    /// Stay open forever without emitting.
    pub fn hang(mut self) -> Self {
        self.steps.push(Step::Hang);
        self
    }

    pub fn into_stream(self) -> BoxStream<'static, anyhow::Result<T>> {
        stream::unfold(self.steps.into_iter(), |mut steps| async move {
            loop {
                match steps.next()? {
                    Step::Emit(v) => return Some((Ok(v), steps)),
                    Step::Pause(d) => time::sleep(d).await,
                    Step::Fail(msg) => return Some((Err(anyhow::anyhow!(msg)), Vec::new().into_iter())),
                    Step::Hang => future::pending::<()>().await,
                }
            }
        })
        .boxed()
    }
}

impl<T: Send + 'static> Default for ScriptedSource<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// An endless producer emitting `f(n)` at `hz`, starting with `n = 0`.
///
/// The interval is created on first poll, so the stream can be built outside
/// a runtime and handed to a collector.
pub fn ticker<T, F>(hz: f32, mut f: F) -> BoxStream<'static, T>
where
    T: Send + 'static,
    F: FnMut(u64) -> T + Send + 'static,
{
    let period = Duration::from_secs_f32(1.0 / hz.max(1.0));
    stream::once(async move { IntervalStream::new(time::interval(period)) })
        .flatten()
        .enumerate()
        .map(move |(n, _)| f(n as u64))
        .boxed()
}
