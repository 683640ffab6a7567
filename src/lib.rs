//! Arena Room Core Library
//!
//! Visibility, broadcast routing and sync replication for one multiplayer
//! arena room.
//!
//! # Features
//!
//! - `strict` - Panic on viewport API misuse instead of logging it
//! - `metrics_extended` - Serve the metrics endpoint from the binary (enabled by default)

pub mod config;
pub mod util;
pub mod game;
pub mod net;
pub mod sync;
pub mod metrics;
