//! Runq Core
//!
//! Core types shared by the runq scheduler, its HTTP clients and the CLI.
//!
//! This crate contains:
//! - Domain types: run specifications, processes, worker runners, projects, builds, events
//! - DTOs: request/response bodies for the scheduler API and the worker wire protocol

pub mod domain;
pub mod dto;
