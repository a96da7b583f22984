use crate::access::Role;
use chrono::{DateTime, Duration, SubsecRound, Utc};
use serde::{Deserialize, Serialize};

/// Application-level user record, keyed by the identity's user id
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub id: String,
    pub email: String,
    #[serde(default)]
    pub full_name: Option<String>,
    pub role: Role,
    #[serde(default)]
    pub avatar_url: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Profile {
    /// First word of the full name, if there is one.
    pub fn first_name(&self) -> Option<&str> {
        self.full_name
            .as_deref()
            .and_then(|name| name.split_whitespace().next())
    }

    /// Full name, falling back to the email address.
    pub fn display_name(&self) -> &str {
        self.full_name
            .as_deref()
            .filter(|name| !name.trim().is_empty())
            .unwrap_or(&self.email)
    }
}

/// Fields a user may change on their own profile
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ProfileUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub full_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
}

impl ProfileUpdate {
    pub fn full_name(mut self, value: impl Into<String>) -> Self {
        self.full_name = Some(value.into());
        self
    }

    pub fn phone(mut self, value: impl Into<String>) -> Self {
        self.phone = Some(value.into());
        self
    }

    pub fn avatar_url(mut self, value: impl Into<String>) -> Self {
        self.avatar_url = Some(value.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.full_name.is_none() && self.phone.is_none() && self.avatar_url.is_none()
    }

    /// Merges the set fields and the stamp into `profile`.
    pub fn apply_to(&self, profile: &mut Profile, stamp: DateTime<Utc>) {
        if let Some(full_name) = &self.full_name {
            profile.full_name = Some(full_name.clone());
        }
        if let Some(phone) = &self.phone {
            profile.phone = Some(phone.clone());
        }
        if let Some(avatar_url) = &self.avatar_url {
            profile.avatar_url = Some(avatar_url.clone());
        }
        profile.updated_at = stamp;
    }
}

/// Body written to the store for a profile update
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProfilePatch {
    #[serde(flatten)]
    pub fields: ProfileUpdate,
    pub updated_at: DateTime<Utc>,
}

/// Next `updated_at` value, strictly after `previous`.
///
/// Stamps are kept at microsecond precision so they survive a round trip
/// through the store unchanged.
pub fn next_stamp(previous: Option<DateTime<Utc>>) -> DateTime<Utc> {
    let now = Utc::now().trunc_subsecs(6);
    match previous {
        Some(prev) if now <= prev => prev.trunc_subsecs(6) + Duration::microseconds(1),
        _ => now,
    }
}

/// Profile fields supplied at sign-up
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewProfileFields {
    pub full_name: Option<String>,
    pub role: Role,
    pub phone: Option<String>,
}

impl NewProfileFields {
    pub fn new(role: Role) -> Self {
        Self {
            full_name: None,
            role,
            phone: None,
        }
    }
}

/// Row inserted into `profiles` when an identity is created
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewProfile {
    pub id: String,
    pub email: String,
    pub full_name: Option<String>,
    pub role: Role,
    pub phone: Option<String>,
}

impl NewProfile {
    pub fn new(id: &str, email: &str, fields: NewProfileFields) -> Self {
        Self {
            id: id.to_string(),
            email: email.to_string(),
            full_name: fields.full_name,
            role: fields.role,
            phone: fields.phone,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample() -> Profile {
        let at = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        Profile {
            id: "u1".into(),
            email: "jane@school.com".into(),
            full_name: Some("Jane Doe".into()),
            role: Role::Student,
            avatar_url: None,
            phone: None,
            created_at: at,
            updated_at: at,
        }
    }

    #[test]
    fn parses_store_row() {
        let profile: Profile = serde_json::from_value(serde_json::json!({
            "id": "u2",
            "email": "t@school.com",
            "full_name": null,
            "role": "teacher",
            "avatar_url": null,
            "phone": "+1-555-0002",
            "created_at": "2024-03-01T10:00:00.123456+00:00",
            "updated_at": "2024-03-01T10:00:00.123456+00:00"
        }))
        .unwrap();
        assert_eq!(profile.role, Role::Teacher);
        assert_eq!(profile.display_name(), "t@school.com");
        assert_eq!(profile.first_name(), None);
    }

    #[test]
    fn update_serializes_only_set_fields() {
        let patch = ProfilePatch {
            fields: ProfileUpdate::default().phone("555-1111"),
            updated_at: Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap(),
        };
        let body = serde_json::to_value(&patch).unwrap();
        assert_eq!(body["phone"], "555-1111");
        assert!(body.get("full_name").is_none());
        assert!(body.get("updated_at").is_some());
    }

    #[test]
    fn apply_merges_fields() {
        let mut profile = sample();
        let stamp = Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap();
        ProfileUpdate::default()
            .full_name("Janet Doe")
            .apply_to(&mut profile, stamp);
        assert_eq!(profile.first_name(), Some("Janet"));
        assert_eq!(profile.updated_at, stamp);
        assert_eq!(profile.phone, None);
    }

    #[test]
    fn stamp_is_strictly_increasing() {
        let future = Utc::now() + Duration::hours(1);
        let stamp = next_stamp(Some(future));
        assert!(stamp > future);

        let past = Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap();
        assert!(next_stamp(Some(past)) > past);
        assert!(ProfileUpdate::default().is_empty());
    }
}
