//! Personal task manager: users, per-user task lists, and a dashboard where
//! completing a task only becomes durable after a short grace period.

pub mod cli;
pub mod io;
pub mod model;
pub mod ops;
