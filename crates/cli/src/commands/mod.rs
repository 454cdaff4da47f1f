//! CLI Commands

pub mod config;
pub mod lifecycle;
pub mod service;
