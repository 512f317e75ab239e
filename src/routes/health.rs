//! Health check endpoint

use axum::Json;
use chrono::{SecondsFormat, Utc};
use serde::Serialize;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub time: String,
}

pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        time: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
    })
}
