// src/agent/mod.rs
pub mod capabilities;
pub mod dispatcher;
pub mod handlers;
pub mod model;
pub mod projection;
pub mod render;
