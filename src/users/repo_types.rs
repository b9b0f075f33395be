use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

/// User record in the database.
#[derive(Debug, Clone, FromRow)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub name: Option<String>,
    pub provider: String,         // identity provider, e.g. "google"
    pub provider_user_id: String, // subject id at the provider
    pub given_name: Option<String>,
    pub photo_url: Option<String>,
    pub created_at: OffsetDateTime,
}

/// Identity fields used when a user is seen for the first time.
#[derive(Debug, Clone, Copy)]
pub struct NewUser<'a> {
    pub provider: &'a str,
    pub subject_id: &'a str,
    pub email: &'a str,
    pub name: Option<&'a str>,
}

#[derive(Debug, Clone, Copy)]
pub struct ResolvedUser {
    pub id: Uuid,
    pub created: bool,
}

/// Mutable profile fields. `None` leaves the stored value untouched.
#[derive(Debug, Clone, Default)]
pub struct ProfilePatch {
    pub given_name: Option<String>,
    pub photo_url: Option<String>,
}
