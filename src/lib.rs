//! Dogtalk Gate - generation gating for talking-dog videos
//!
//! This crate decides when a client may start another AI video generation
//! (a per-IP cooldown window that paid requests bypass) and how long the
//! generated video should be for a given line of dialogue. Both are exposed
//! to the product backend over a small JSON HTTP API.

pub mod config;
pub mod duration;
pub mod error;
pub mod http;
pub mod ratelimit;
