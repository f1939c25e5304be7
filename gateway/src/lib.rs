//! Fleet telemetry gateway: polls the upstream topology API, keeps the latest
//! record per device and fans updates out to WebSocket subscribers.

pub mod config;
pub mod errors;
pub mod hub;
pub mod metrics;
pub mod model;
pub mod normalize;
pub mod poller;
pub mod rest;
pub mod state;
pub mod subscribers;
pub mod upstream;
pub mod ws;
