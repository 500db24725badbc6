/*!
 * # Sliding Window Detector
 *
 * Flags a blood-pressure reading as anomalous when either channel deviates
 * from the rolling mean of the most recent readings by more than a fixed
 * fraction.
 *
 * The window is seeded with baseline readings at construction, so it is never
 * empty. Means are taken over the window *after* the new reading has been
 * admitted and the oldest readings evicted.
 */

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};
use thiserror::Error;

pub const DEFAULT_WINDOW_SIZE: usize = 10;
pub const DEFAULT_THRESHOLD: f64 = 0.15;
pub const DEFAULT_BASELINE_SYSTOLIC: f64 = 120.0;
pub const DEFAULT_BASELINE_DIASTOLIC: f64 = 70.0;

/// Guards the deviation ratio against a zero mean.
pub const EPSILON: f64 = 1e-5;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum DetectorError {
    #[error("{0}")]
    InvalidInput(String),

    #[error("Invalid detector configuration: {0}")]
    InvalidConfig(String),
}

/// Window capacity and deviation cutoff.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DetectorConfig {
    pub window_size: usize,
    pub threshold: f64,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            window_size: DEFAULT_WINDOW_SIZE,
            threshold: DEFAULT_THRESHOLD,
        }
    }
}

impl DetectorConfig {
    pub fn new(window_size: usize, threshold: f64) -> Result<Self, DetectorError> {
        let config = Self {
            window_size,
            threshold,
        };
        config.check()?;
        Ok(config)
    }

    fn check(&self) -> Result<(), DetectorError> {
        if self.window_size == 0 {
            return Err(DetectorError::InvalidConfig(
                "window_size must be at least 1".into(),
            ));
        }
        if !self.threshold.is_finite() || self.threshold < 0.0 {
            return Err(DetectorError::InvalidConfig(
                "threshold must be a finite, non-negative fraction".into(),
            ));
        }
        Ok(())
    }
}

/// A single blood-pressure observation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    pub timestamp: DateTime<Utc>,
    pub systolic: f64,
    pub diastolic: f64,
}

impl Reading {
    pub fn new(systolic: f64, diastolic: f64) -> Self {
        Self {
            timestamp: Utc::now(),
            systolic,
            diastolic,
        }
    }
}

/// Fixed-capacity FIFO of readings, oldest first.
#[derive(Debug, Clone)]
pub struct HistoryWindow {
    capacity: usize,
    readings: VecDeque<Reading>,
}

impl HistoryWindow {
    /// Builds a full window of `capacity` copies of `baseline`.
    pub fn seeded(capacity: usize, baseline: Reading) -> Self {
        let mut readings = VecDeque::with_capacity(capacity + 1);
        readings.extend(std::iter::repeat(baseline).take(capacity));
        Self { capacity, readings }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.readings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.readings.is_empty()
    }

    /// Appends `reading` and returns how many readings were evicted.
    pub fn admit(&mut self, reading: Reading) -> usize {
        self.readings.push_back(reading);
        let mut evicted = 0;
        while self.readings.len() > self.capacity {
            self.readings.pop_front();
            evicted += 1;
        }
        evicted
    }

    /// Mean systolic and diastolic over the whole window.
    pub fn means(&self) -> (f64, f64) {
        let count = self.readings.len().max(1) as f64;
        let (sys, dia) = self
            .readings
            .iter()
            .fold((0.0, 0.0), |(s, d), r| (s + r.systolic, d + r.diastolic));
        (sys / count, dia / count)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Reading> {
        self.readings.iter()
    }

    pub fn to_vec(&self) -> Vec<Reading> {
        self.readings.iter().copied().collect()
    }
}

/// Outcome of evaluating one reading. Values are rounded to 2 decimal places.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Evaluation {
    pub mean_systolic: f64,
    pub mean_diastolic: f64,
    pub systolic_deviation_percent: f64,
    pub diastolic_deviation_percent: f64,
    pub alert: bool,
}

/// Relative deviation of `observed` from `mean`, as a fraction.
pub fn relative_deviation(observed: f64, mean: f64) -> f64 {
    (observed - mean).abs() / (mean + EPSILON)
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Accepts a present, finite, non-negative pressure value.
fn require_pressure(name: &str, value: Option<f64>) -> Result<f64, DetectorError> {
    match value {
        Some(v) if v.is_finite() && v >= 0.0 => Ok(v),
        Some(_) => Err(DetectorError::InvalidInput(format!(
            "{} must be a finite, non-negative number",
            name
        ))),
        None => Err(DetectorError::InvalidInput(format!("Missing {}", name))),
    }
}

/// Scores `reading` against `window`, which must already contain it.
///
/// Values near `f64::MAX` can overflow the window sums or the percentage
/// scaling; any non-finite output is reported as invalid input.
fn score(
    window: &HistoryWindow,
    reading: &Reading,
    threshold: f64,
) -> Result<Evaluation, DetectorError> {
    let (mean_sys, mean_dia) = window.means();
    let dev_sys = relative_deviation(reading.systolic, mean_sys);
    let dev_dia = relative_deviation(reading.diastolic, mean_dia);

    let evaluation = Evaluation {
        mean_systolic: round2(mean_sys),
        mean_diastolic: round2(mean_dia),
        systolic_deviation_percent: round2(dev_sys * 100.0),
        diastolic_deviation_percent: round2(dev_dia * 100.0),
        alert: dev_sys > threshold || dev_dia > threshold,
    };

    let all_finite = [
        evaluation.mean_systolic,
        evaluation.mean_diastolic,
        evaluation.systolic_deviation_percent,
        evaluation.diastolic_deviation_percent,
    ]
    .iter()
    .all(|v| v.is_finite());
    if !all_finite {
        return Err(DetectorError::InvalidInput(
            "reading is too large to score against the window".into(),
        ));
    }
    Ok(evaluation)
}

/// Streaming detector over a bounded history window.
///
/// All access to the window goes through one mutex, so concurrent
/// `evaluate` calls are serialized over the whole admit-then-measure sequence.
/// The reading is admitted into a copy of the window and committed only once
/// it has been scored.
#[derive(Debug)]
pub struct SlidingWindowDetector {
    config: DetectorConfig,
    window: Mutex<HistoryWindow>,
}

impl SlidingWindowDetector {
    /// Creates a detector seeded with the default 120/70 baseline.
    pub fn new(config: DetectorConfig) -> Result<Self, DetectorError> {
        Self::with_baseline(config, DEFAULT_BASELINE_SYSTOLIC, DEFAULT_BASELINE_DIASTOLIC)
    }

    pub fn with_baseline(
        config: DetectorConfig,
        systolic: f64,
        diastolic: f64,
    ) -> Result<Self, DetectorError> {
        config.check()?;
        let systolic = require_pressure("baseline systolic", Some(systolic))
            .map_err(|e| DetectorError::InvalidConfig(e.to_string()))?;
        let diastolic = require_pressure("baseline diastolic", Some(diastolic))
            .map_err(|e| DetectorError::InvalidConfig(e.to_string()))?;

        let baseline = Reading::new(systolic, diastolic);
        Ok(Self {
            config,
            window: Mutex::new(HistoryWindow::seeded(config.window_size, baseline)),
        })
    }

    pub fn config(&self) -> DetectorConfig {
        self.config
    }

    /// Admits a reading and scores it against the updated window.
    ///
    /// Fails with [`DetectorError::InvalidInput`] when either value is absent,
    /// negative or not finite, or when scoring it would overflow; the window
    /// is untouched in that case.
    pub fn evaluate(
        &self,
        systolic: Option<f64>,
        diastolic: Option<f64>,
    ) -> Result<Evaluation, DetectorError> {
        let systolic = require_pressure("systolic", systolic)?;
        let diastolic = require_pressure("diastolic", diastolic)?;
        let reading = Reading::new(systolic, diastolic);

        let mut window = self.lock();
        let mut candidate = window.clone();
        candidate.admit(reading);
        let evaluation = score(&candidate, &reading, self.config.threshold)?;
        *window = candidate;
        Ok(evaluation)
    }

    /// Copy of the current window, oldest first.
    pub fn snapshot(&self) -> Vec<Reading> {
        self.lock().to_vec()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    // The window is only ever replaced wholesale, so a poisoned lock still
    // guards a consistent window.
    fn lock(&self) -> std::sync::MutexGuard<'_, HistoryWindow> {
        self.window.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for SlidingWindowDetector {
    fn default() -> Self {
        let config = DetectorConfig::default();
        let baseline = Reading::new(DEFAULT_BASELINE_SYSTOLIC, DEFAULT_BASELINE_DIASTOLIC);
        Self {
            config,
            window: Mutex::new(HistoryWindow::seeded(config.window_size, baseline)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn detector() -> SlidingWindowDetector {
        SlidingWindowDetector::default()
    }

    #[test]
    fn fresh_detector_is_seeded_to_capacity() {
        let d = detector();
        assert_eq!(d.len(), DEFAULT_WINDOW_SIZE);
        assert!(d
            .snapshot()
            .iter()
            .all(|r| r.systolic == 120.0 && r.diastolic == 70.0));
    }

    #[test]
    fn large_systolic_jump_raises_alert() {
        let result = detector().evaluate(Some(180.0), Some(70.0)).unwrap();
        assert_eq!(result.mean_systolic, 126.0);
        assert_eq!(result.mean_diastolic, 70.0);
        assert_eq!(result.systolic_deviation_percent, 42.86);
        assert_eq!(result.diastolic_deviation_percent, 0.0);
        assert!(result.alert);
    }

    #[test]
    fn small_drift_does_not_alert() {
        let result = detector().evaluate(Some(121.0), Some(71.0)).unwrap();
        assert_eq!(result.mean_systolic, 120.1);
        assert_eq!(result.mean_diastolic, 70.1);
        assert_eq!(result.systolic_deviation_percent, 0.75);
        assert_eq!(result.diastolic_deviation_percent, 1.28);
        assert!(!result.alert);
    }

    #[test]
    fn diastolic_channel_alone_can_alert() {
        let result = detector().evaluate(Some(120.0), Some(110.0)).unwrap();
        assert!(result.systolic_deviation_percent == 0.0);
        assert!(result.alert);
    }

    #[test]
    fn missing_value_is_rejected_without_mutation() {
        let d = detector();
        let before = d.snapshot();

        let err = d.evaluate(None, Some(70.0)).unwrap_err();
        assert!(matches!(err, DetectorError::InvalidInput(_)));
        let err = d.evaluate(Some(120.0), None).unwrap_err();
        assert!(matches!(err, DetectorError::InvalidInput(_)));

        assert_eq!(d.snapshot(), before);
    }

    #[test]
    fn non_finite_value_is_rejected() {
        let d = detector();
        assert!(d.evaluate(Some(f64::NAN), Some(70.0)).is_err());
        assert!(d.evaluate(Some(120.0), Some(f64::INFINITY)).is_err());
        assert_eq!(d.len(), DEFAULT_WINDOW_SIZE);
    }

    #[test]
    fn negative_value_is_rejected_without_mutation() {
        let d = detector();
        let before = d.snapshot();

        let err = d.evaluate(Some(-120.0), Some(70.0)).unwrap_err();
        assert!(matches!(err, DetectorError::InvalidInput(_)));
        assert!(d.evaluate(Some(120.0), Some(-0.5)).is_err());

        assert_eq!(d.snapshot(), before);
    }

    #[test]
    fn overflowing_reading_is_rejected_without_mutation() {
        let d = detector();
        let before = d.snapshot();

        let err = d.evaluate(Some(1e308), Some(70.0)).unwrap_err();
        assert!(matches!(err, DetectorError::InvalidInput(_)));
        assert!(d.evaluate(Some(120.0), Some(f64::MAX)).is_err());
        assert_eq!(d.snapshot(), before);

        let result = d.evaluate(Some(120.0), Some(70.0)).unwrap();
        assert_eq!(result.mean_systolic, 120.0);
        assert_eq!(result.mean_diastolic, 70.0);
    }

    #[test]
    fn large_finite_reading_is_still_scored() {
        let result = detector().evaluate(Some(1e300), Some(70.0)).unwrap();
        assert!(result.mean_systolic.is_finite());
        assert!(result.systolic_deviation_percent.is_finite());
        assert!(result.alert);
    }

    #[test]
    fn near_zero_mean_yields_finite_deviation() {
        let config = DetectorConfig::new(2, 0.15).unwrap();
        let d = SlidingWindowDetector::with_baseline(config, 0.0, 0.0).unwrap();
        let result = d.evaluate(Some(0.001), Some(0.0)).unwrap();

        assert!(result.systolic_deviation_percent.is_finite());
        assert!(result.systolic_deviation_percent >= 0.0);
        assert_eq!(result.diastolic_deviation_percent, 0.0);
        assert!(result.alert);
    }

    #[test]
    fn steady_readings_keep_window_bounded() {
        let d = detector();
        for _ in 0..11 {
            let result = d.evaluate(Some(120.0), Some(70.0)).unwrap();
            assert_eq!(result.mean_systolic, 120.0);
            assert_eq!(result.mean_diastolic, 70.0);
            assert!(!result.alert);
        }
        assert_eq!(d.len(), DEFAULT_WINDOW_SIZE);
    }

    #[test]
    fn admit_evicts_oldest_first() {
        let base = Reading::new(1.0, 1.0);
        let mut window = HistoryWindow::seeded(3, base);
        window.admit(Reading::new(2.0, 2.0));
        window.admit(Reading::new(3.0, 3.0));
        let evicted = window.admit(Reading::new(4.0, 4.0));

        assert_eq!(evicted, 1);
        let values: Vec<f64> = window.iter().map(|r| r.systolic).collect();
        assert_eq!(values, vec![2.0, 3.0, 4.0]);
    }

    #[test]
    fn zero_mean_does_not_divide_by_zero() {
        let config = DetectorConfig::new(2, 0.15).unwrap();
        let d = SlidingWindowDetector::with_baseline(config, 0.0, 0.0).unwrap();
        let result = d.evaluate(Some(0.0), Some(0.0)).unwrap();
        assert_eq!(result.systolic_deviation_percent, 0.0);
        assert!(!result.alert);
    }

    #[test]
    fn invalid_config_is_rejected() {
        assert!(DetectorConfig::new(0, 0.15).is_err());
        assert!(DetectorConfig::new(10, f64::NAN).is_err());
        assert!(DetectorConfig::new(10, -0.1).is_err());
        assert!(SlidingWindowDetector::with_baseline(
            DetectorConfig::default(),
            f64::NAN,
            70.0
        )
        .is_err());
        assert!(matches!(
            SlidingWindowDetector::with_baseline(DetectorConfig::default(), 120.0, -70.0),
            Err(DetectorError::InvalidConfig(_))
        ));
    }

    #[test]
    fn config_serializes_as_plain_object() {
        let json = serde_json::to_value(DetectorConfig::default()).unwrap();
        assert_eq!(json, serde_json::json!({ "window_size": 10, "threshold": 0.15 }));
    }

    #[test]
    fn concurrent_evaluations_are_all_admitted() {
        let d = Arc::new(detector());
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let d = Arc::clone(&d);
                std::thread::spawn(move || {
                    for _ in 0..25 {
                        d.evaluate(Some(100.0 + i as f64), Some(60.0)).unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let window = d.snapshot();
        assert_eq!(window.len(), DEFAULT_WINDOW_SIZE);
        assert!(window.iter().all(|r| r.systolic >= 100.0 && r.systolic < 108.0));
    }
}
