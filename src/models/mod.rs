//! # Data Models
//!
//! SeaORM entities backing the event store and the GitHub session layer.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

pub mod event;
pub mod oauth_state;
pub mod repository;
pub mod session;
pub mod user;

pub use event::Entity as Event;
pub use oauth_state::Entity as OAuthState;
pub use repository::Entity as Repository;
pub use session::Entity as Session;
pub use user::Entity as User;

/// Basic service information response
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ServiceInfo {
    /// The name of the service
    pub service: String,
    /// The version of the service
    pub version: String,
}

impl Default for ServiceInfo {
    fn default() -> Self {
        Self {
            service: "signalkit".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}
