//! # OAuth State Model
//!
//! CSRF state tokens issued by `GET /auth/github/login` and consumed once by
//! the callback.

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;
use uuid::Uuid;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "oauth_states")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    /// Random URL-safe token echoed back by GitHub
    #[sea_orm(unique)]
    pub state: String,

    /// Which credential pair the callback must use (`oauth` or `app`)
    pub auth_type: String,

    /// Redirect URI sent on the authorize request; the token exchange must repeat it
    pub redirect_uri: String,

    pub expires_at: DateTimeWithTimeZone,

    pub created_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    /// Whether the state can no longer be redeemed at `now`.
    pub fn is_expired_at(&self, now: DateTimeWithTimeZone) -> bool {
        self.expires_at <= now
    }
}
