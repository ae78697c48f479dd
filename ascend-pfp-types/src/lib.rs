//! Shared wire types for the ASCEND profile-picture service.

mod base64_serde;

pub mod api;
pub mod config;
pub mod content;
pub mod enums;
pub mod models;
pub mod response;
pub mod storage;
