//! ASCEND profile-picture service: provider client, blob store, and the
//! `generate-pfp` pipeline behind an axum route.

pub mod assets;
pub mod base_image;
pub mod client;
pub mod config;
pub mod credentials;
pub mod error;
pub mod models;
pub mod pfp;
pub mod server;
pub mod storage;

#[cfg(test)]
mod test_support;

pub use ascend_pfp_types as types;

pub use client::{Backend, Client, ClientBuilder, Credentials, HttpOptions, VertexConfig};
pub use config::Config;
pub use credentials::ServiceAccountKey;
pub use error::{Error, Result};
pub use pfp::{PfpError, PfpRequest, ProfilePictureService};
pub use storage::{Bucket, Storage, UploadOptions};
