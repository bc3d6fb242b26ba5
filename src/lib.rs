// src/lib.rs

//! schedwatch: schedule change detection and subscriber notification.

pub mod error;
pub mod models;
pub mod pipeline;
pub mod services;
pub mod storage;
pub mod utils;
