//! Trellis GitHub - API client for the issue graph crawler
//!
//! [`GitHubClient`] talks to the REST API for issues, sub-issues, comments
//! and timelines, and to the GraphQL API for parent links, project
//! membership and collaborator permissions. It implements all three
//! collaborator traits from `trellis-core`, so one client can fill every
//! slot of a crawl:
//!
//! ```no_run
//! use std::sync::Arc;
//! use trellis_core::GitHubConfig;
//! use trellis_github::GitHubClient;
//!
//! let mut config = GitHubConfig::default();
//! config.apply_env();
//! let client = Arc::new(GitHubClient::new(config)?);
//! # Ok::<(), trellis_core::ApiError>(())
//! ```
//!
//! Non-2xx responses become `ApiError::Status` carrying the status code and
//! the `x-ratelimit-remaining` header, which the crawler uses to tell rate
//! limits apart from inaccessible repositories.

mod client;
mod graphql;
mod rest;

pub use client::GitHubClient;
