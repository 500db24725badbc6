use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::detector::{DetectorConfig, DetectorError, Evaluation, Reading, SlidingWindowDetector};
use crate::errors::{ServiceError, MISSING_READING_MESSAGE};
use crate::metrics::BP_METRICS;

/// Wire payload for `POST /bp_alert`.
///
/// Fields are kept as raw JSON so that non-numeric values are rejected here
/// instead of failing inside the decoder with a less specific message. Built
/// from a JSON object only; see the `TryFrom<Value>` impl.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BpAlertRequest {
    pub systolic_bp: Option<Value>,
    pub diastolic_bp: Option<Value>,
}

impl TryFrom<Value> for BpAlertRequest {
    type Error = ServiceError;

    /// Arrays, scalars and `null` carry no named fields and are rejected.
    fn try_from(body: Value) -> Result<Self, Self::Error> {
        match body {
            Value::Object(mut fields) => Ok(Self {
                systolic_bp: fields.remove("systolic_bp"),
                diastolic_bp: fields.remove("diastolic_bp"),
            }),
            _ => Err(ServiceError::InvalidInput(MISSING_READING_MESSAGE.to_string())),
        }
    }
}

impl BpAlertRequest {
    pub fn new(systolic: f64, diastolic: f64) -> Self {
        Self {
            systolic_bp: Some(Value::from(systolic)),
            diastolic_bp: Some(Value::from(diastolic)),
        }
    }

    fn numeric(value: &Option<Value>) -> Option<f64> {
        value.as_ref().and_then(Value::as_f64)
    }
}

pub type BpAlertResponse = Evaluation;

/// Current window contents, oldest first.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WindowSnapshot {
    pub readings: Vec<Reading>,
    pub count: usize,
}

/// Scores submissions against a shared sliding-window detector.
#[derive(Clone, Debug)]
pub struct BpAlertService {
    detector: Arc<SlidingWindowDetector>,
}

impl BpAlertService {
    pub fn new(detector: Arc<SlidingWindowDetector>) -> Self {
        Self { detector }
    }

    pub fn evaluate(&self, request: BpAlertRequest) -> Result<BpAlertResponse, ServiceError> {
        let systolic = BpAlertRequest::numeric(&request.systolic_bp);
        let diastolic = BpAlertRequest::numeric(&request.diastolic_bp);

        let evaluation = match self.detector.evaluate(systolic, diastolic) {
            Ok(evaluation) => evaluation,
            Err(DetectorError::InvalidInput(reason)) => {
                BP_METRICS.record_invalid_request();
                debug!(%reason, "rejected blood-pressure submission");
                return Err(ServiceError::InvalidInput(MISSING_READING_MESSAGE.to_string()));
            }
            Err(other) => return Err(other.into()),
        };

        BP_METRICS.record_evaluation(evaluation.alert, self.detector.len());

        if evaluation.alert {
            warn!(
                systolic = ?systolic,
                diastolic = ?diastolic,
                systolic_deviation_percent = evaluation.systolic_deviation_percent,
                diastolic_deviation_percent = evaluation.diastolic_deviation_percent,
                "blood-pressure reading deviates from rolling mean"
            );
        } else {
            info!(
                mean_systolic = evaluation.mean_systolic,
                mean_diastolic = evaluation.mean_diastolic,
                "blood-pressure reading within threshold"
            );
        }

        Ok(evaluation)
    }

    pub fn config(&self) -> DetectorConfig {
        self.detector.config()
    }

    pub fn window(&self) -> WindowSnapshot {
        let readings = self.detector.snapshot();
        WindowSnapshot {
            count: readings.len(),
            readings,
        }
    }

    pub fn window_len(&self) -> usize {
        self.detector.len()
    }
}
