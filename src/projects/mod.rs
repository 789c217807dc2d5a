//! Project write endpoints. Every route is owner-scoped through the
//! `{uid}` path segment and runs the access guard before touching storage.

pub mod handlers;
