//! # devHelp API Server Library
//!
//! HTTP surface of the devHelp backend.
//!
//! ## Modules
//!
//! - `app`: Application state and router builder
//! - `config`: Configuration management
//! - `cookies`: Refresh token cookie
//! - `error`: Error handling and HTTP response mapping
//! - `extract`: Validating extractors
//! - `middleware`: Authentication, rate limiting, security headers
//! - `routes`: API route handlers

pub mod app;
pub mod config;
pub mod cookies;
pub mod error;
pub mod extract;
pub mod middleware;
pub mod routes;
