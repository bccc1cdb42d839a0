//! Data transfer objects
//!
//! Request and response bodies exchanged over HTTP, either between callers and
//! the scheduler API or between the scheduler and worker nodes.

pub mod run;
pub mod task;
pub mod worker;
