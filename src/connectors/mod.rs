//! Upstream source-control connectors.
//!
//! GitHub is the only provider; the client covers login, discovery, and the
//! REST reads that feed ingestion and the Codebase Age sensor.

pub mod github;

pub use github::{
    AuthType, GitHubClient, GitHubError, GitHubUser, Installation, PullRequest, PullRequestFile,
    RepositorySummary,
};
