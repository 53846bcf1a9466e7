use std::time::Duration;
use stream_collector::{collect_values, mock::ticker};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let mut c = collect_values(ticker(60.0, |n| 95.0 + 20.0 * (n as f32 * 0.04).sin()))?;
    println!("Collecting (blocking), tag={}", c.tag());

    let high = c.wait_for_timeout_blocking(Duration::from_secs(5), |_, a| *a > 110.0)?;
    println!("first sample above 110: {high:6.2}");

    let rising = c.wait_for_blocking(|history, a| history.last().is_some_and(|prev| a > prev))?;
    println!("a rising sample: {rising:6.2}");

    c.cancel_blocking()?;
    println!("stopped after {} samples, latest={:6.2}", c.len(), c.latest_value()?);
    Ok(())
}
