//! User profile updates.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::debug;

use coursegraph_core::NodeRef;
use coursegraph_storage::{GraphStore, Properties, StoredNode};

use crate::error::SyncError;
use crate::with_transaction;

/// Editable profile fields. `None` leaves a field untouched; a blank value
/// clears it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileUpdates {
    pub nickname: Option<String>,
    pub given_name: Option<String>,
    pub position: Option<String>,
    pub company: Option<String>,
    pub country: Option<String>,
}

impl ProfileUpdates {
    fn into_properties(self) -> Properties {
        [
            ("nickname", self.nickname),
            ("givenName", self.given_name),
            ("position", self.position),
            ("company", self.company),
            ("country", self.country),
        ]
        .into_iter()
        .filter_map(|(key, value)| {
            let value = value?;
            let value = if value.trim().is_empty() {
                Value::Null
            } else {
                Value::String(value)
            };
            Some((key.to_string(), value))
        })
        .collect()
    }
}

/// A user's profile as stored after an update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub sub: String,
    pub nickname: Option<String>,
    pub given_name: Option<String>,
    pub position: Option<String>,
    pub company: Option<String>,
    pub country: Option<String>,
    pub profile_completed_at: Option<String>,
    pub updated_at: Option<String>,
}

impl UserProfile {
    fn from_node(sub: &str, node: &StoredNode) -> Self {
        let field = |key: &str| node.str_property(key).map(str::to_string);
        UserProfile {
            sub: sub.to_string(),
            nickname: field("nickname"),
            given_name: field("givenName"),
            position: field("position"),
            company: field("company"),
            country: field("country"),
            profile_completed_at: field("profileCompletedAt"),
            updated_at: field("updatedAt"),
        }
    }
}

/// Applies `updates` to the user identified by `sub`.
pub fn update_user<S: GraphStore + ?Sized>(
    store: &mut S,
    sub: &str,
    updates: ProfileUpdates,
) -> Result<UserProfile, SyncError> {
    update_user_at(store, sub, updates, Utc::now())
}

/// [`update_user`] with an explicit clock.
///
/// Fails with [`SyncError::NotFound`] and writes nothing if the user does
/// not exist. `profileCompletedAt` is only set the first time.
pub fn update_user_at<S: GraphStore + ?Sized>(
    store: &mut S,
    sub: &str,
    updates: ProfileUpdates,
    now: DateTime<Utc>,
) -> Result<UserProfile, SyncError> {
    let user = NodeRef::user(sub);
    with_transaction(store, |store| {
        let existing = store
            .get_node(&user)?
            .ok_or_else(|| SyncError::NotFound(format!("No user with sub {}", sub)))?;

        let timestamp = json!(now.to_rfc3339_opts(SecondsFormat::Millis, true));
        let mut properties = updates.into_properties();
        properties.insert("updatedAt".to_string(), timestamp.clone());
        if existing.property("profileCompletedAt").is_none() {
            properties.insert("profileCompletedAt".to_string(), timestamp);
        }
        store.set_properties(&user, &properties)?;

        let updated = store
            .get_node(&user)?
            .ok_or_else(|| SyncError::NotFound(format!("No user with sub {}", sub)))?;
        debug!(sub, "user profile updated");
        Ok(UserProfile::from_node(sub, &updated))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use coursegraph_storage::InMemoryStore;

    fn at(s: &str) -> DateTime<Utc> {
        s.parse().unwrap()
    }

    fn store_with_user(sub: &str) -> InMemoryStore {
        let mut store = InMemoryStore::new();
        let user = NodeRef::user(sub);
        store.merge_node(&user).unwrap();
        let mut props = Properties::new();
        props.insert("sub".into(), json!(sub));
        props.insert("company".into(), json!("Acme"));
        store.set_properties(&user, &props).unwrap();
        store
    }

    #[test]
    fn missing_user_is_not_found_and_writes_nothing() {
        let mut store = InMemoryStore::new();
        let err = update_user(&mut store, "auth0|nobody", ProfileUpdates::default()).unwrap_err();
        assert!(matches!(err, SyncError::NotFound(msg) if msg == "No user with sub auth0|nobody"));
        assert_eq!(store.count_nodes(None).unwrap(), 0);
        assert!(!store.in_transaction());
    }

    #[test]
    fn blank_values_clear_fields_and_absent_ones_are_kept() {
        let mut store = store_with_user("auth0|1");
        let updates = ProfileUpdates {
            nickname: Some("neo".into()),
            company: Some("   ".into()),
            ..Default::default()
        };
        let profile = update_user_at(&mut store, "auth0|1", updates, at("2024-01-01T00:00:00Z")).unwrap();

        assert_eq!(profile.nickname.as_deref(), Some("neo"));
        assert_eq!(profile.company, None);
        assert_eq!(profile.updated_at.as_deref(), Some("2024-01-01T00:00:00.000Z"));
    }

    #[test]
    fn profile_completed_at_is_set_once() {
        let mut store = store_with_user("auth0|1");
        update_user_at(&mut store, "auth0|1", ProfileUpdates::default(), at("2024-01-01T00:00:00Z")).unwrap();
        let profile =
            update_user_at(&mut store, "auth0|1", ProfileUpdates::default(), at("2024-06-01T00:00:00Z")).unwrap();

        assert_eq!(profile.profile_completed_at.as_deref(), Some("2024-01-01T00:00:00.000Z"));
        assert_eq!(profile.updated_at.as_deref(), Some("2024-06-01T00:00:00.000Z"));
        assert_eq!(profile.company.as_deref(), Some("Acme"));
    }
}
