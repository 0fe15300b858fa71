//! Persistence contracts for users and refresh tokens.
//!
//! Every operation takes an explicit `PgExecutor`, so the same code runs
//! against the ambient pool or inside an open transaction — the caller
//! chooses the execution context, nothing is stashed implicitly.

pub mod tokens;
pub mod users;
