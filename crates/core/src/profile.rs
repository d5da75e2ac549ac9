//! Checkout profile details.
//!
//! Checkout needs a first name, last name and date of birth before it will
//! request a payment intent. Profiles arrive piecemeal, so every field is
//! optional here and [`ProfileDetails::is_complete`] is the guard.

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

/// Which required field is missing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ProfileField {
    FirstName,
    LastName,
    #[serde(rename = "dob")]
    DateOfBirth,
}

impl ProfileField {
    /// Field name as it appears in JSON bodies.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::FirstName => "firstName",
            Self::LastName => "lastName",
            Self::DateOfBirth => "dob",
        }
    }
}

/// Optional profile fields collected during checkout.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileDetails {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dob: Option<NaiveDate>,
}

impl ProfileDetails {
    /// Fields still missing. Blank strings count as missing.
    #[must_use]
    pub fn missing(&self) -> Vec<ProfileField> {
        let mut missing = Vec::new();
        if is_blank(self.first_name.as_deref()) {
            missing.push(ProfileField::FirstName);
        }
        if is_blank(self.last_name.as_deref()) {
            missing.push(ProfileField::LastName);
        }
        if self.dob.is_none() {
            missing.push(ProfileField::DateOfBirth);
        }
        missing
    }

    /// True when first name, last name and date of birth are all present.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.missing().is_empty()
    }

    /// Overlay the non-empty fields of `patch` onto `self`.
    #[must_use]
    pub fn merged(mut self, patch: &Self) -> Self {
        if let Some(first) = non_blank(patch.first_name.as_deref()) {
            self.first_name = Some(first);
        }
        if let Some(last) = non_blank(patch.last_name.as_deref()) {
            self.last_name = Some(last);
        }
        if patch.dob.is_some() {
            self.dob = patch.dob;
        }
        self
    }

    /// Fill missing first/last name from a display name like `"Jane Doe"`.
    #[must_use]
    pub fn with_name_suggestion(mut self, display_name: Option<&str>) -> Self {
        let Some((first, last)) = display_name.map(split_display_name) else {
            return self;
        };
        if is_blank(self.first_name.as_deref()) && !first.is_empty() {
            self.first_name = Some(first.to_owned());
        }
        if is_blank(self.last_name.as_deref()) && !last.is_empty() {
            self.last_name = Some(last.to_owned());
        }
        self
    }
}

/// Split a display name on its first space: `"Mary Ann Lee"` gives
/// `("Mary", "Ann Lee")`.
#[must_use]
pub fn split_display_name(name: &str) -> (&str, &str) {
    let name = name.trim();
    match name.split_once(' ') {
        Some((first, rest)) => (first, rest.trim()),
        None => (name, ""),
    }
}

/// Age in whole years on `today`.
///
/// Year difference, minus one if the birthday has not yet come round this
/// year. A date of birth after `today` yields 0.
#[must_use]
pub fn age_on(dob: NaiveDate, today: NaiveDate) -> u32 {
    if dob > today {
        return 0;
    }
    let mut years = today.year() - dob.year();
    if (today.month(), today.day()) < (dob.month(), dob.day()) {
        years -= 1;
    }
    u32::try_from(years).unwrap_or(0)
}

fn is_blank(value: Option<&str>) -> bool {
    value.is_none_or(|v| v.trim().is_empty())
}

fn non_blank(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(ToOwned::to_owned)
}
