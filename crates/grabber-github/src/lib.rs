//! Grabber GitHub - GitHub provider client
//!
//! Implements the `GitClient` contract against the GitHub REST API:
//! - Repository, branch and commit listing with pagination
//! - Commit patches and compare diffs via the diff media type
//! - Branch and pull request creation
//! - Repository webhook lifecycle

pub mod client;
mod mapping;

pub use client::{GitHubClient, DEFAULT_API_URL};
