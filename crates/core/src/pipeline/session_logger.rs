use std::collections::HashMap;
use std::time::Instant;

/// Cross-cutting logger for detection loop events.
///
/// Decouples the loop from specific output mechanisms so each host can
/// observe tick behavior without changing the orchestration code.
pub trait SessionLogger: Send {
    /// Report that `completed` ticks have run a detection so far.
    fn tick(&mut self, completed: usize);

    /// Record how long a named stage took for one tick.
    fn timing(&mut self, stage: &str, duration_ms: f64);

    /// Record that a tick did not run a detection, and why.
    fn skipped(&mut self, reason: &str);

    /// Record a point-in-time metric (e.g. face count).
    fn metric(&mut self, name: &str, value: f64);

    /// Log a human-readable status message.
    fn info(&mut self, message: &str);

    /// Emit an end-of-session summary. Default: no-op.
    fn summary(&self) {}
}

/// Silent logger that discards all events.
pub struct NullSessionLogger;

impl SessionLogger for NullSessionLogger {
    fn tick(&mut self, _completed: usize) {}
    fn timing(&mut self, _stage: &str, _duration_ms: f64) {}
    fn skipped(&mut self, _reason: &str) {}
    fn metric(&mut self, _name: &str, _value: f64) {}
    fn info(&mut self, _message: &str) {}
}

/// Logger backed by the `log` facade that tracks per-stage timing, metrics
/// and skip reasons, and reports a summary when the session stops.
///
/// Status lines are throttled to every `throttle_ticks` ticks.
pub struct LogSessionLogger {
    throttle_ticks: usize,
    timings: HashMap<String, Vec<f64>>,
    metrics: HashMap<String, Vec<f64>>,
    skips: HashMap<String, usize>,
    start_time: Instant,
    ticks: usize,
    messages: Vec<String>,
}

impl LogSessionLogger {
    pub fn new(throttle_ticks: usize) -> Self {
        Self {
            throttle_ticks: throttle_ticks.max(1),
            timings: HashMap::new(),
            metrics: HashMap::new(),
            skips: HashMap::new(),
            start_time: Instant::now(),
            ticks: 0,
            messages: Vec::new(),
        }
    }

    /// Returns the formatted summary string, or `None` if nothing was recorded.
    pub fn summary_string(&self) -> Option<String> {
        if self.timings.is_empty() && self.metrics.is_empty() && self.skips.is_empty() {
            return None;
        }

        let elapsed_ms = self.start_time.elapsed().as_secs_f64() * 1000.0;
        let ticks = self.ticks;
        let mut lines = Vec::new();

        lines.push(format!(
            "Session summary ({ticks} ticks, {:.1}s total):",
            elapsed_ms / 1000.0
        ));

        let mut stages: Vec<_> = self.timings.keys().collect();
        stages.sort();
        for stage in stages {
            let durations = &self.timings[stage];
            let total_ms: f64 = durations.iter().sum();
            let avg_ms = if durations.is_empty() {
                0.0
            } else {
                total_ms / durations.len() as f64
            };
            let max_ms = durations.iter().copied().fold(0.0, f64::max);
            lines.push(format!(
                "  {stage:12}: avg {avg_ms:6.1}ms  max {max_ms:6.1}ms  total {total_ms:7.0}ms"
            ));
        }

        let mut metric_names: Vec<_> = self.metrics.keys().collect();
        metric_names.sort();
        for name in metric_names {
            let values = &self.metrics[name];
            let avg = if values.is_empty() {
                0.0
            } else {
                values.iter().sum::<f64>() / values.len() as f64
            };
            lines.push(format!("  {name}: avg {avg:.1}"));
        }

        let mut reasons: Vec<_> = self.skips.iter().collect();
        reasons.sort();
        for (reason, count) in reasons {
            lines.push(format!("  skipped ({reason}): {count}"));
        }

        if ticks > 0 && elapsed_ms > 0.0 {
            let rate = ticks as f64 / (elapsed_ms / 1000.0);
            lines.push(format!("  Detection rate: {rate:.1} ticks/s"));
        }

        Some(lines.join("\n"))
    }

    pub fn timings_for(&self, stage: &str) -> Option<&[f64]> {
        self.timings.get(stage).map(|v| v.as_slice())
    }

    pub fn metrics_for(&self, name: &str) -> Option<&[f64]> {
        self.metrics.get(name).map(|v| v.as_slice())
    }

    pub fn skips_for(&self, reason: &str) -> usize {
        self.skips.get(reason).copied().unwrap_or(0)
    }

    pub fn messages(&self) -> &[String] {
        &self.messages
    }
}

impl Default for LogSessionLogger {
    fn default() -> Self {
        Self::new(25)
    }
}

impl SessionLogger for LogSessionLogger {
    fn tick(&mut self, completed: usize) {
        self.ticks = completed;
        if completed % self.throttle_ticks == 0 {
            let faces = self
                .metrics
                .get("faces")
                .and_then(|v| v.last())
                .copied()
                .unwrap_or(0.0);
            log::info!("Monitoring: {completed} ticks, {faces} face(s) in last frame");
        }
    }

    fn timing(&mut self, stage: &str, duration_ms: f64) {
        self.timings
            .entry(stage.to_string())
            .or_default()
            .push(duration_ms);
    }

    fn skipped(&mut self, reason: &str) {
        *self.skips.entry(reason.to_string()).or_default() += 1;
        log::debug!("Tick skipped: {reason}");
    }

    fn metric(&mut self, name: &str, value: f64) {
        self.metrics
            .entry(name.to_string())
            .or_default()
            .push(value);
    }

    fn info(&mut self, message: &str) {
        self.messages.push(message.to_string());
        log::info!("{message}");
    }

    fn summary(&self) {
        if let Some(text) = self.summary_string() {
            log::info!("\n\n{text}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_null_logger_all_methods_are_noop() {
        let mut logger = NullSessionLogger;
        logger.tick(1);
        logger.timing("detect", 5.0);
        logger.skipped("not_decodable");
        logger.metric("faces", 1.0);
        logger.info("hello");
        logger.summary();
    }

    #[test]
    fn test_timing_records_values() {
        let mut logger = LogSessionLogger::new(10);
        logger.timing("detect", 20.0);
        logger.timing("detect", 30.0);

        let detect = logger.timings_for("detect").unwrap();
        assert_eq!(detect.len(), 2);
        assert_relative_eq!(detect[1], 30.0);
        assert!(logger.timings_for("missing").is_none());
    }

    #[test]
    fn test_metric_records_values() {
        let mut logger = LogSessionLogger::new(10);
        logger.metric("faces", 1.0);
        logger.metric("faces", 2.0);

        let values = logger.metrics_for("faces").unwrap();
        assert_relative_eq!(values.iter().sum::<f64>() / values.len() as f64, 1.5);
    }

    #[test]
    fn test_skips_are_counted_by_reason() {
        let mut logger = LogSessionLogger::new(10);
        logger.skipped("not_decodable");
        logger.skipped("not_decodable");
        logger.skipped("detector_error");
        assert_eq!(logger.skips_for("not_decodable"), 2);
        assert_eq!(logger.skips_for("detector_error"), 1);
        assert_eq!(logger.skips_for("other"), 0);
    }

    #[test]
    fn test_summary_includes_all_sections() {
        let mut logger = LogSessionLogger::new(10);
        logger.tick(2);
        logger.timing("detect", 20.0);
        logger.metric("faces", 1.0);
        logger.skipped("not_decodable");

        let summary = logger.summary_string().unwrap();
        assert!(summary.contains("Session summary (2 ticks"));
        assert!(summary.contains("detect"));
        assert!(summary.contains("faces: avg 1.0"));
        assert!(summary.contains("skipped (not_decodable): 1"));
        assert!(summary.contains("ticks/s"));
    }

    #[test]
    fn test_empty_summary_returns_none() {
        assert!(LogSessionLogger::new(10).summary_string().is_none());
    }

    #[test]
    fn test_info_stores_messages() {
        let mut logger = LogSessionLogger::new(10);
        logger.info("camera ready");
        assert_eq!(logger.messages(), ["camera ready".to_string()]);
    }

    #[test]
    fn test_default_throttle() {
        assert_eq!(LogSessionLogger::default().throttle_ticks, 25);
        assert_eq!(LogSessionLogger::new(0).throttle_ticks, 1);
    }
}
