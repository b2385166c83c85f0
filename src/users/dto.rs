use serde::{Deserialize, Serialize};

use super::repo::User;

/// Request body for user registration.
#[derive(Debug, Clone, Deserialize)]
pub struct NewUser {
    pub username: String,
    pub fullname: String,
    pub email: String,
    pub password: String,
}

/// User as returned to clients.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PublicUser {
    pub id: i64,
    pub username: String,
    pub fullname: String,
    pub email: String,
    pub is_active: bool,
}

impl From<User> for PublicUser {
    fn from(u: User) -> Self {
        Self {
            id: u.id,
            username: u.username,
            fullname: u.fullname,
            email: u.email,
            is_active: u.is_active,
        }
    }
}
