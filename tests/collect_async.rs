#![cfg(feature = "mock")]

use futures_util::{StreamExt, stream};
use stream_collector::{
    CollectOptions, Context, Error, FailureKind, Outcome, collect, collect_values, collect_with,
    mock::{ScriptedSource, ticker},
};
use tokio::time::{Duration, Instant, sleep, timeout};

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

#[tokio::test(flavor = "multi_thread")]
async fn completed_producer_is_recorded_in_order() {
    init_logging();
    let mut c = collect(ScriptedSource::new().emit_all([1, 2, 3]).into_stream()).expect("start");
    c.assert_no_errors().await.expect("no errors");
    assert_eq!(c.latest_values(), vec![1, 2, 3]);
    assert_eq!(c.latest_value().expect("latest"), 3);
    assert!(!c.is_running());
    assert!(matches!(c.outcome(), Some(Outcome::Completed)));
}

#[tokio::test(flavor = "multi_thread")]
async fn upstream_failure_is_captured_not_raised() {
    init_logging();
    let mut c = collect(ScriptedSource::new().emit("a").fail("link lost").into_stream())
        .expect("start");
    let outcome = c.finish(false).await;
    assert_eq!(outcome.failure().map(|f| f.to_string()).as_deref(), Some("link lost"));
    assert_eq!(c.latest_values(), vec!["a"]);

    match c.assert_no_errors().await {
        Err(Error::Unexpected(f)) => {
            assert_eq!(f.kind(), FailureKind::Error);
            assert_eq!(f.to_string(), "link lost");
        }
        other => panic!("expected Unexpected, got {other:?}"),
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn latest_value_before_any_emission_is_an_error() {
    let mut c = collect(ScriptedSource::<u32>::new().hang().into_stream()).expect("start");
    assert!(matches!(c.latest_value(), Err(Error::EmptyHistory)));
    assert!(c.is_empty());
    c.cancel().await.expect("cancel");
}

#[tokio::test(flavor = "multi_thread")]
async fn emissions_replay_backlog_for_every_subscriber() {
    let mut c = collect_values(stream::iter(1..=5)).expect("start");
    c.finish(false).await;
    let first: Vec<_> = c.emissions().collect().await;
    let second: Vec<_> = c.emissions().collect().await;
    assert_eq!(first, vec![1, 2, 3, 4, 5]);
    assert_eq!(first, second);
}

#[tokio::test(flavor = "multi_thread")]
async fn subscriber_before_and_during_emission_sees_everything() {
    let source = ScriptedSource::new()
        .pause(Duration::from_millis(20))
        .emit_all([1, 2])
        .pause(Duration::from_millis(50))
        .emit_all([3, 4])
        .into_stream();
    let mut c = collect(source).expect("start");
    let early = c.emissions();

    c.wait_for(|_, v| *v == 2).await.expect("two arrives");
    let during = c.emissions();

    let early: Vec<_> = timeout(Duration::from_secs(2), early.collect()).await.expect("early ends");
    let during: Vec<_> = timeout(Duration::from_secs(2), during.collect()).await.expect("during ends");
    assert_eq!(early, vec![1, 2, 3, 4]);
    assert_eq!(during, vec![1, 2, 3, 4]);
    c.assert_no_errors().await.expect("no errors");
}

#[tokio::test(flavor = "multi_thread")]
async fn wait_for_returns_backlog_match_immediately() {
    let mut c = collect_values(stream::iter(0..10)).expect("start");
    c.finish(false).await;
    let t0 = Instant::now();
    let v = c.wait_for_timeout(Duration::from_secs(5), |_, v| *v == 7).await;
    assert_eq!(v.expect("seven"), 7);
    assert!(t0.elapsed() < Duration::from_secs(1));
}

#[tokio::test(flavor = "multi_thread")]
async fn wait_for_picks_up_future_values() {
    let source = ScriptedSource::new()
        .emit(1)
        .pause(Duration::from_millis(100))
        .emit(2)
        .emit(3)
        .into_stream();
    let mut c = collect(source).expect("start");
    let v = c.wait_for(|_, v| *v == 3).await.expect("three");
    assert_eq!(v, 3);
    c.assert_no_errors().await.expect("no errors");
}

#[tokio::test(flavor = "multi_thread")]
async fn predicate_receives_prior_history() {
    let c = collect_values(stream::iter(["x", "y", "z", "w"])).expect("start");
    let v = c
        .wait_for(|history, _| history == ["x", "y"])
        .await
        .expect("third value");
    assert_eq!(v, "z");
}

#[tokio::test(flavor = "multi_thread")]
async fn timed_out_wait_leaves_ingestion_running() {
    init_logging();
    let mut c = collect_values(ticker(200.0, |n| n)).expect("start");
    let res = c.wait_for_timeout(Duration::from_millis(50), |_, _| false).await;
    assert!(matches!(res, Err(Error::Timeout(d)) if d == Duration::from_millis(50)));
    assert!(c.is_running());

    let seen = c.len();
    sleep(Duration::from_millis(100)).await;
    assert!(c.len() > seen, "collector stopped growing after a timed out wait");
    c.cancel().await.expect("cancel");
}

#[tokio::test(flavor = "current_thread", start_paused = true)]
async fn silent_producer_times_out_after_ten_seconds() {
    let c = collect_with(
        ScriptedSource::<u32>::new().hang().into_stream(),
        CollectOptions::new().context(Context::Current),
    )
    .expect("start");
    let t0 = Instant::now();
    let res = c.wait_for(|_, _| true).await;
    assert!(matches!(res, Err(Error::Timeout(d)) if d == Duration::from_secs(10)));
    assert!(t0.elapsed() >= Duration::from_secs(10));
}

#[tokio::test(flavor = "multi_thread")]
async fn wait_on_stopped_collector_times_out() {
    let mut c = collect_values(stream::iter([1, 2])).expect("start");
    c.finish(false).await;
    let t0 = Instant::now();
    let res = c.wait_for_timeout(Duration::from_millis(100), |_, v| *v == 9).await;
    assert!(matches!(res, Err(Error::Timeout(d)) if d == Duration::from_millis(100)));
    assert!(t0.elapsed() >= Duration::from_millis(100));
}

#[tokio::test(flavor = "multi_thread")]
async fn empty_completed_producer_times_out() {
    let mut c = collect_values(stream::iter(Vec::<u32>::new())).expect("start");
    assert!(c.finish(false).await.is_completed());
    let res = c.wait_for_timeout(Duration::from_millis(300), |_, _| true).await;
    assert!(matches!(res, Err(Error::Timeout(_))));
}

#[tokio::test(flavor = "multi_thread")]
async fn explicit_handle_runs_ingestion_on_that_runtime() {
    let opts = CollectOptions::new().context(Context::Handle(tokio::runtime::Handle::current()));
    let mut c = collect_with(ScriptedSource::new().emit_all([4, 5]).into_stream(), opts)
        .expect("start");
    assert_eq!(c.wait_for(|_, v| *v == 5).await.expect("five"), 5);
    c.assert_no_errors().await.expect("no errors");
    assert_eq!(c.latest_values(), vec![4, 5]);
}

#[tokio::test(flavor = "multi_thread")]
async fn cancel_stops_growth_and_cannot_repeat() {
    let mut c = collect_values(ticker(200.0, |n| n)).expect("start");
    c.wait_for(|_, v| *v >= 3).await.expect("some ticks");
    c.cancel().await.expect("first cancel");

    let frozen = c.latest_values();
    sleep(Duration::from_millis(50)).await;
    assert_eq!(c.latest_values(), frozen);
    assert!(matches!(c.outcome(), Some(Outcome::Cancelled)));
    assert!(matches!(c.cancel().await, Err(Error::AlreadyStopped)));
    c.assert_no_errors().await.expect("cancel is not an error");
}

#[tokio::test(flavor = "multi_thread")]
async fn cancel_after_completion_is_already_stopped() {
    let mut c = collect_values(stream::iter([1])).expect("start");
    assert!(c.finish(false).await.is_completed());
    assert!(matches!(c.cancel().await, Err(Error::AlreadyStopped)));
}

#[tokio::test(flavor = "multi_thread")]
async fn finish_with_cancel_reports_cancelled() {
    let mut c = collect(ScriptedSource::new().emit(7u8).hang().into_stream()).expect("start");
    c.wait_for(|_, _| true).await.expect("seven");
    let outcome = c.finish(true).await;
    assert!(matches!(outcome, Outcome::Cancelled));
    assert_eq!(c.latest_values(), vec![7]);
}

#[tokio::test(flavor = "multi_thread")]
async fn concurrent_waits_are_independent() {
    let source = ScriptedSource::new()
        .emit(1)
        .pause(Duration::from_millis(30))
        .emit_all([2, 3])
        .pause(Duration::from_millis(30))
        .emit(4)
        .into_stream();
    let mut c = collect(source).expect("start");
    let (a, b, first) = tokio::join!(
        c.wait_for(|_, v| *v == 4),
        c.wait_for(|_, v| *v == 2),
        c.wait_for(|_, _| true),
    );
    assert_eq!(a.expect("four"), 4);
    assert_eq!(b.expect("two"), 2);
    assert_eq!(first.expect("one"), 1);
    c.assert_no_errors().await.expect("no errors");
}

#[tokio::test(flavor = "multi_thread")]
async fn producer_panic_is_recorded_as_terminal_error() {
    let source = stream::iter(1..=3).map(|v: i32| {
        if v == 2 {
            panic!("sensor exploded");
        }
        Ok::<_, std::io::Error>(v)
    });
    let mut c = collect(source).expect("start");
    let outcome = c.finish(false).await;
    let failure = outcome.failure().expect("failed").clone();
    assert_eq!(failure.kind(), FailureKind::Panicked);
    assert!(failure.to_string().contains("sensor exploded"));
    assert_eq!(c.latest_values(), vec![1]);
    assert!(matches!(c.assert_no_errors().await, Err(Error::Unexpected(_))));
}

#[tokio::test(flavor = "multi_thread")]
async fn verbose_and_tag_leave_collected_data_unchanged() {
    init_logging();
    let opts = CollectOptions::new().tag("feed").verbose(true);
    let mut c = collect_with(ScriptedSource::new().emit_all(["on", "off"]).into_stream(), opts)
        .expect("start");
    assert_eq!(c.tag(), "feed");
    assert!(c.is_verbose());
    c.assert_no_errors().await.expect("no errors");
    assert_eq!(c.latest_values(), vec!["on", "off"]);
}

#[tokio::test(flavor = "multi_thread")]
async fn payloads_need_not_be_sync() {
    use std::cell::Cell;
    let mut c = collect_values(stream::iter([Cell::new(1u8), Cell::new(2)])).expect("start");
    let two = c.wait_for(|_, v| v.get() == 2).await.expect("two");
    assert_eq!(two.get(), 2);
    c.assert_no_errors().await.expect("no errors");
    assert_eq!(c.latest_value().expect("latest").get(), 2);
}
