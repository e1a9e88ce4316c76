//! Replica autoscaling decision engine
//!
//! This crate provides:
//! - A bounded metrics history and fixed-shape feature extraction
//! - A trainable regression predictor and a weighted rule-based scorer
//! - Hybrid decision making with hysteresis and cooldown
//! - Prometheus and Kubernetes adapters, model persistence
//! - Health checks and observability for the control loop

pub mod config;
pub mod dampening;
pub mod error;
pub mod health;
pub mod history;
pub mod models;
pub mod observability;
pub mod orchestrator;
pub mod predictor;
pub mod sink;
pub mod source;
pub mod store;

pub use config::ScalerConfig;
pub use error::{Result, ScalerError};
pub use health::{
    ComponentHealth, ComponentStatus, HealthRegistry, HealthResponse, ReadinessResponse,
};
pub use models::*;
pub use observability::{ScalerMetrics, StructuredLogger};
pub use orchestrator::{Orchestrator, SharedDecision};
