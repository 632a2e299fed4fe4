use time::{Duration, OffsetDateTime};

/// Logs the number of arcs emitted, at most once per interval.
pub struct ProgressLogger {
    interval: Duration,
    start: OffsetDateTime,
    last: OffsetDateTime,
    count: u64,
}

impl ProgressLogger {
    pub fn new(interval: Duration) -> ProgressLogger {
        let now = OffsetDateTime::now_utc();
        ProgressLogger { interval, start: now, last: now, count: 0 }
    }

    pub fn count(&self) -> u64 { self.count }

    /// Adds `count` items, reporting if the interval has elapsed.
    pub fn update(&mut self, count: u64) {
        self.count += count;
        let now = OffsetDateTime::now_utc();
        if now - self.last >= self.interval {
            self.last = now;
            info!("{} arcs, {:.0} arcs/s", self.count, self.rate(now));
        }
    }

    pub fn done(&self) {
        let now = OffsetDateTime::now_utc();
        info!("{} arcs in {:.3}s ({:.0} arcs/s)", self.count, (now - self.start).as_seconds_f64(), self.rate(now));
    }

    fn rate(&self, now: OffsetDateTime) -> f64 {
        let elapsed = (now - self.start).as_seconds_f64();
        if elapsed > 0.0 { self.count as f64 / elapsed } else { 0.0 }
    }
}

#[test]
#[cfg(test)]
fn counts_updates() {
    let mut progress = ProgressLogger::new(Duration::ZERO);
    progress.update(3);
    progress.update(4);
    assert_eq!(progress.count(), 7);
    progress.done();
}
