// src/handlers/mod.rs

pub mod posts;
pub mod uploads;
