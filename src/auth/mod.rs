//! Authentication module
//!
//! Token issuance and verification, the session store that tracks live
//! tokens, the guard that protects routes, and request admission.

pub mod guard;
pub mod handlers;
pub mod middleware;
mod rate_limit;
pub mod session;
pub mod token;

pub use guard::{AccessGuard, Authenticated, ADMIN_ROLE};
pub use rate_limit::{RateLimiter, RateLimitConfig};
pub use session::{redis_endpoint, KeyValueStore, MemoryStore, RedisStore, ReferenceStatus, SessionKey, SessionStore};
pub use token::{AccessDetails, TokenLifetimes, TokenPair, TokenService};
