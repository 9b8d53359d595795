//! # devHelp Shared Library
//!
//! Domain types, storage, authentication primitives and the application use
//! cases behind the devHelp API server.
//!
//! ## Module Organization
//!
//! - `models`: Persisted entities and their SQL
//! - `store`: Repository traits, unit of work, Postgres and in-memory backends
//! - `db`: Connection pool and migrations
//! - `auth`: Passwords, JWTs, one-time tokens, role checks
//! - `mail`: Email delivery and templates
//! - `usecases`: Signup, login, invitations, company and platform management
//! - `error`: Application error type with HTTP status and code

pub mod auth;
pub mod db;
pub mod error;
pub mod mail;
pub mod models;
pub mod store;
pub mod usecases;

/// Current version of the devHelp shared library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_is_set() {
        assert!(!VERSION.is_empty());
    }
}
