// src/api/mod.rs
// API module - HTTP endpoints (§6 External Interfaces).

pub mod http;
