//! Core domain types
//!
//! This module contains the domain structures shared between the scheduler
//! (which owns run state) and the worker nodes it dispatches to (which execute).

pub mod build;
pub mod environment;
pub mod event;
pub mod process;
pub mod project;
pub mod runner;
pub mod spec;
