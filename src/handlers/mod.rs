// src/handlers/mod.rs
pub mod chat;
