#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]

pub mod cli;
pub mod config;
pub mod dialogue;
pub mod error;
pub mod gate;
pub mod metric;
pub mod segment;
pub mod service;
pub mod session;
