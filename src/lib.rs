//! Library exports for the URL shortener application
//!
//! This module exposes internal components for testing and potential library usage.

pub mod config;
pub mod creation;
pub mod database;
pub mod error;
pub mod handler;
pub mod hashing;
pub mod middleware;
pub mod model;
pub mod qr;
pub mod ranking;
pub mod reachability;
pub mod route;
pub mod safety;
pub mod state;
pub mod worker;
