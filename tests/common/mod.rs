#![allow(dead_code)]

use std::sync::Arc;

use axum::{
    body::{to_bytes, Body},
    http::{Method, Request},
    Router,
};
use bp_alert_api::{detector::SlidingWindowDetector, AppState};
use serde_json::Value;
use tower::ServiceExt;

/// Router plus a handle on the detector it serves.
pub struct TestApp {
    router: Router,
    pub detector: Arc<SlidingWindowDetector>,
}

impl TestApp {
    /// Fresh app with a default detector (10 × 120/70 baseline, 15% threshold).
    pub fn new() -> Self {
        Self::with_detector(SlidingWindowDetector::default())
    }

    pub fn with_detector(detector: SlidingWindowDetector) -> Self {
        let detector = Arc::new(detector);
        let router = bp_alert_api::app(AppState::new(detector.clone()));
        Self { router, detector }
    }

    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
    ) -> axum::response::Response {
        let mut builder = Request::builder().method(method).uri(uri);

        let body = if let Some(json) = body {
            builder = builder.header("content-type", "application/json");
            Body::from(serde_json::to_vec(&json).expect("failed to serialize json request body"))
        } else {
            Body::empty()
        };

        self.send(builder.body(body).expect("failed to build request"))
            .await
    }

    pub async fn send(&self, request: Request<Body>) -> axum::response::Response {
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("router error during test request")
    }

    pub async fn submit(&self, body: Value) -> axum::response::Response {
        self.request(Method::POST, "/bp_alert", Some(body)).await
    }
}

pub async fn body_bytes(response: axum::response::Response) -> Vec<u8> {
    to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("failed to read response body")
        .to_vec()
}

pub async fn response_json(response: axum::response::Response) -> Value {
    let bytes = body_bytes(response).await;
    serde_json::from_slice(&bytes).expect("response body is not valid json")
}
