//! HTTP service for stress-level prediction

pub mod api;
pub mod config;
