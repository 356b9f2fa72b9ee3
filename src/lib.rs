// src/lib.rs
pub mod config;
pub mod error;
pub mod message;
pub mod routes;
pub mod runner;
pub mod services;
