//! Grabber GitLab - GitLab provider client
//!
//! Implements the `GitClient` contract against the GitLab v4 REST API,
//! addressing projects by their URL-encoded full path.

pub mod client;
mod mapping;

pub use client::{GitLabClient, DEFAULT_API_URL};
