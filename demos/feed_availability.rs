//! A tiny view-model that turns a device-discovery stream into a
//! video-feed-availability stream, checked with a collector.
//!
//! Run with: cargo run --example feed_availability

use futures_util::StreamExt;
use std::time::Duration;
use stream_collector::{CollectOptions, collect_with, mock::ScriptedSource};

#[derive(Clone, Debug, PartialEq)]
enum FeedState {
    Unavailable,
    Available { device: String },
}

/// Maps each discovery snapshot to whether the named goggles are visible.
fn feed_states(
    discovered: impl futures_util::Stream<Item = anyhow::Result<Vec<String>>> + Send + 'static,
    wanted: &'static str,
) -> impl futures_util::Stream<Item = anyhow::Result<FeedState>> + Send + 'static {
    discovered.map(move |snapshot| {
        snapshot.map(|devices| {
            if devices.iter().any(|d| d == wanted) {
                FeedState::Available {
                    device: wanted.to_string(),
                }
            } else {
                FeedState::Unavailable
            }
        })
    })
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let discovery = ScriptedSource::new()
        .emit(vec![])
        .pause(Duration::from_millis(100))
        .emit(vec!["headset".to_string()])
        .pause(Duration::from_millis(100))
        .emit(vec!["headset".to_string(), "goggles".to_string()])
        .into_stream();

    let opts = CollectOptions::new().tag("feed").verbose(true);
    let mut feed = collect_with(feed_states(discovery, "goggles"), opts)?;

    let available = feed.wait_for_blocking(|_, s| matches!(s, FeedState::Available { .. }))?;
    println!("feed became available: {available:?}");

    feed.assert_no_errors_blocking()?;
    println!("history: {:?}", feed.latest_values());
    Ok(())
}
