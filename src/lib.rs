//! BP Alert API Library
//!
//! Rolling-window blood-pressure anomaly detection behind a small HTTP API.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![allow(elided_lifetimes_in_paths)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

// Core modules
pub mod config;
pub mod detector;
pub mod errors;
pub mod handlers;
pub mod metrics;
pub mod middleware_helpers;
pub mod services;
pub mod tracing;

use axum::{routing::get, Router};
use std::sync::Arc;
use std::time::Instant;

use crate::detector::{DetectorError, SlidingWindowDetector};
use crate::services::bp_alert::BpAlertService;

// App state definition
#[derive(Clone)]
pub struct AppState {
    pub bp_alert: BpAlertService,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(detector: Arc<SlidingWindowDetector>) -> Self {
        Self {
            bp_alert: BpAlertService::new(detector),
            started_at: Instant::now(),
        }
    }

    /// Builds state with a detector seeded from configuration.
    pub fn from_config(cfg: &config::AppConfig) -> Result<Self, DetectorError> {
        let detector = SlidingWindowDetector::with_baseline(
            cfg.detector_config()?,
            cfg.baseline_systolic,
            cfg.baseline_diastolic,
        )?;
        Ok(Self::new(Arc::new(detector)))
    }
}

/// Full application router: liveness, health, detector and metrics routes,
/// wrapped in HTTP tracing and request id middleware.
pub fn app(state: AppState) -> Router {
    Router::new()
        .merge(handlers::health::health_routes())
        .merge(handlers::bp_alert::bp_alert_routes())
        .route("/metrics", get(metrics::metrics_handler))
        .route("/metrics/json", get(metrics::metrics_json_handler))
        .layer(crate::tracing::configure_http_tracing())
        .layer(axum::middleware::from_fn(
            middleware_helpers::request_id::request_id_middleware,
        ))
        .with_state(state)
}
