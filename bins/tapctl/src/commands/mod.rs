//! tapctl command implementations.

pub mod create;
pub mod list;
pub mod show;
