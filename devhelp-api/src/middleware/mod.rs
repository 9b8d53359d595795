/// Middleware modules for the API server
///
/// - `auth`: Bearer authentication and role guards
/// - `rate_limit`: Fixed-window limits on the public auth endpoints
/// - `security`: Security headers

pub mod auth;
pub mod rate_limit;
pub mod security;
