//! Periodic trigger with a randomized first delay.
//!
//! Many independently deployed collectors may start at the same moment. The
//! first tick is drawn uniformly from `[period/2, 3*period/2)` so their passes
//! spread out over the registry; after that ticks are strictly periodic.

use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use chrono::{DateTime, Utc};
use rand::Rng;
use tokio::time::{Instant, Interval, MissedTickBehavior, interval_at};
use tokio_stream::Stream;

/// Draw the delay before the first tick
pub fn initial_delay<R: Rng>(rng: &mut R, period: Duration) -> Duration {
    period.mul_f64(rng.gen_range(0.5..1.5))
}

/// Infinite stream of trigger instants.
///
/// A consumer that falls behind gets one overdue tick immediately and then
/// resumes on the periodic grid; missed ticks are never replayed in a burst.
#[derive(Debug)]
pub struct JitteredTicks {
    interval: Interval,
}

impl Stream for JitteredTicks {
    type Item = DateTime<Utc>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.interval.poll_tick(cx).map(|_| Some(Utc::now()))
    }
}

/// Start the trigger sequence. `period` must be non-zero.
pub fn schedule<R: Rng>(rng: &mut R, period: Duration) -> JitteredTicks {
    let first = Instant::now() + initial_delay(rng, period);
    let mut interval = interval_at(first, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    JitteredTicks { interval }
}
