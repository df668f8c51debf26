// src/lib.rs

pub mod storage;
pub mod service;
pub mod api;
pub mod middleware;
pub mod telemetry;
pub mod logging;
pub mod signals;
pub mod app_state;
pub mod config;
