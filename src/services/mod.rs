// src/services/mod.rs
pub mod completion_client;
pub mod reply_dispatcher;
pub mod telegram;
pub mod transport;
