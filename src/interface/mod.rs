//! Interface layer - External interfaces
//!
//! This layer handles:
//! - The telephony media stream WebSocket endpoint
//! - Health and Prometheus metrics endpoints

pub mod api;
