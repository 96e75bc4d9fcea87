// src/lib.rs
pub mod services;
pub mod models;
pub mod handlers;
pub mod routes;
