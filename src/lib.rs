//! Vibe-based media recommendations: embed a free-text mood, find the nearest
//! vibe profiles the user has not seen, and optionally let a chat model rerank
//! and explain the top picks.

pub mod api;
pub mod config;
pub mod db;
pub mod error;
pub mod middleware;
pub mod models;
pub mod services;
