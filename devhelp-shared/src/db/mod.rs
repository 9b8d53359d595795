/// PostgreSQL plumbing: connection pool and schema migrations
///
/// The repositories built on top of this live in [`crate::store`].

pub mod migrations;
pub mod pool;
