// src/routes/health.rs
use axum::Json;

use crate::message::HealthStatus;

/// Constant body; never consults bot state.
pub async fn health_handler() -> Json<HealthStatus> {
    Json(HealthStatus::running())
}
