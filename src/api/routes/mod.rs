//! API Routes
//!
//! Route handlers organized by functionality.

pub mod conversations;
pub mod health;
