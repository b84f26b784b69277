//! Client for the GitHub releases API.
//!
//! Only one endpoint is used: `GET /repos/{owner}/{repo}/releases/latest`.
//! The response is reduced to the release tag and the cumulative download
//! count of each asset.

pub mod client;
pub mod error;
pub mod types;

pub use client::{GitHubClient, ReleaseSource};
pub use error::FetchError;
pub use types::{Release, ReleaseAsset};
