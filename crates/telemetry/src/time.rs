// Path: crates/telemetry/src/time.rs
use std::time::Instant;

/// Receives the measured duration of a scope.
pub trait DurationSink: Sync {
    /// Called once with the elapsed seconds when the timer drops.
    fn observe_duration(&self, label: &'static str, seconds: f64);
}

/// A sink that emits the observation as a structured `debug!` event.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl DurationSink for TracingSink {
    fn observe_duration(&self, label: &'static str, seconds: f64) {
        tracing::debug!(label, seconds, "scope finished");
    }
}

/// Measures a scope from construction to drop.
pub struct Timer<'a> {
    sink: &'a dyn DurationSink,
    label: &'static str,
    start: Instant,
}

impl<'a> Timer<'a> {
    /// Starts a timer reporting to `sink` under `label`.
    pub fn new(sink: &'a dyn DurationSink, label: &'static str) -> Self {
        Self {
            sink,
            label,
            start: Instant::now(),
        }
    }
}

impl Drop for Timer<'_> {
    fn drop(&mut self) {
        self.sink
            .observe_duration(self.label, self.start.elapsed().as_secs_f64());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct Recording(Mutex<Option<f64>>);

    impl DurationSink for Recording {
        fn observe_duration(&self, _label: &'static str, seconds: f64) {
            *self.0.lock().unwrap() = Some(seconds);
        }
    }

    #[test]
    fn timer_reports_on_drop() {
        let sink = Recording(Mutex::new(None));
        {
            let _timer = Timer::new(&sink, "scope");
        }
        assert!(sink.0.lock().unwrap().is_some());
    }
}
