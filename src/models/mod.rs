// src/models/mod.rs
pub mod auth;
pub mod chat;
pub mod deployment;
pub mod stocks;
