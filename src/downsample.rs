use serde_json::Value;

use crate::coerce::field_f64;

pub const DEFAULT_TIME_FIELD: &str = "videoTimeMs";

/// Keeps records at least `min_dt_ms` apart, measured against the last record
/// kept rather than the previous raw record.
#[derive(Debug, Clone)]
pub struct Downsampler {
    min_dt_ms: f64,
    time_field: String,
    last_kept_ms: Option<f64>,
}

impl Downsampler {
    pub fn new(min_dt_ms: f64) -> Self {
        Self::with_time_field(min_dt_ms, DEFAULT_TIME_FIELD)
    }

    pub fn with_time_field(min_dt_ms: f64, time_field: &str) -> Self {
        Self {
            min_dt_ms: min_dt_ms.max(0.0),
            time_field: time_field.to_string(),
            last_kept_ms: None,
        }
    }

    pub fn min_dt_ms(&self) -> f64 {
        self.min_dt_ms
    }

    /// Forget the last kept timestamp. Call at every source unit boundary.
    pub fn reset(&mut self) {
        self.last_kept_ms = None;
    }

    pub fn keep(&mut self, record: &Value) -> bool {
        let Some(t) = field_f64(record, &self.time_field) else {
            return false;
        };
        self.keep_timestamp(t)
    }

    pub fn keep_timestamp(&mut self, t: f64) -> bool {
        if let Some(last) = self.last_kept_ms
            && t - last < self.min_dt_ms
        {
            return false;
        }
        self.last_kept_ms = Some(t);
        true
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn spacing_is_measured_from_last_kept() {
        let mut ds = Downsampler::new(100.0);
        let kept = [0.0, 40.0, 90.0, 100.0, 210.0]
            .into_iter()
            .filter(|t| ds.keep_timestamp(*t))
            .collect::<Vec<_>>();
        assert_eq!(kept, vec![0.0, 100.0, 210.0]);
    }

    #[test]
    fn records_without_timestamp_are_dropped() {
        let mut ds = Downsampler::new(100.0);
        assert!(!ds.keep(&json!({"frameNum": 1})));
        assert!(!ds.keep(&json!({"videoTimeMs": null})));
        assert!(ds.keep(&json!({"videoTimeMs": "250"})));
        assert!(!ds.keep(&json!({"videoTimeMs": 300})));
    }

    #[test]
    fn reset_starts_a_new_unit() {
        let mut ds = Downsampler::new(100.0);
        assert!(ds.keep_timestamp(1000.0));
        assert!(!ds.keep_timestamp(10.0));
        ds.reset();
        assert!(ds.keep_timestamp(10.0));
    }
}
