//! Storyloom — a small self-hosted backend that keeps user accounts in a
//! flat JSON file and turns one-line story ideas into full stories via an
//! external text-generation API.

pub mod auth;
pub mod config;
pub mod gateway;
pub mod generator;
pub mod session;
pub mod store;
