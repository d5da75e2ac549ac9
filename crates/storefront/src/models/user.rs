//! User domain types.
//!
//! [`User`] is the credential-free projection of a stored account. The
//! password hash never leaves the identity store except through the login
//! path in [`crate::db::IdentityStore::credential_for_email`].

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use sole_core::profile::ProfileDetails;
use sole_core::{Email, UserId};

/// A storefront user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: UserId,
    pub email: Email,
    /// Display name given at registration.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dob: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub age: Option<u32>,
    pub email_verified: bool,
    pub created_at: DateTime<Utc>,
}

impl User {
    /// The checkout-relevant profile fields.
    #[must_use]
    pub fn profile(&self) -> ProfileDetails {
        ProfileDetails {
            first_name: self.first_name.clone(),
            last_name: self.last_name.clone(),
            dob: self.dob,
        }
    }

    /// Profile with first/last name prefilled from the display name where missing.
    #[must_use]
    pub fn profile_with_suggestions(&self) -> ProfileDetails {
        self.profile().with_name_suggestion(self.name.as_deref())
    }
}

/// Profile fields written through to the identity store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfileUpdate {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub dob: Option<NaiveDate>,
    pub age: Option<u32>,
}
