//! Effective access resolution
//!
//! Precedence, first match wins:
//!
//! 1. `role == admin`
//! 2. `can_view_all` flag
//! 3. `view_all` in capabilities
//! 4. the entity does not require membership
//! 5. the user is enrolled in the entity
//!
//! Reordering these steps changes observable access outcomes.

use serde::{Deserialize, Deserializer, Serialize};
use tracing::debug;

use crate::error::{SheetError, SheetResult};
use crate::types::Sheet;

pub const VIEW_ALL_CAPABILITY: &str = "view_all";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Instructor,
    #[default]
    Student,
    #[serde(other)]
    Other,
}

/// One enrollment record. Either identifier may match the target entity.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Enrollment {
    #[serde(deserialize_with = "id_string")]
    pub course_id: String,
    #[serde(default, deserialize_with = "optional_id_string")]
    pub external_id: Option<String>,
}

impl Enrollment {
    pub fn new(course_id: impl Into<String>) -> Self {
        Self {
            course_id: course_id.into(),
            external_id: None,
        }
    }

    pub fn with_external_id(mut self, external_id: impl Into<String>) -> Self {
        self.external_id = Some(external_id.into());
        self
    }

    pub fn matches(&self, entity_id: &str) -> bool {
        let target = normalize_id(entity_id);
        if target.is_empty() {
            return false;
        }
        normalize_id(&self.course_id) == target
            || self
                .external_id
                .as_deref()
                .is_some_and(|ext| normalize_id(ext) == target)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    #[serde(default)]
    pub role: Role,
    #[serde(default)]
    pub can_view_all: bool,
    #[serde(default)]
    pub capabilities: Vec<String>,
    #[serde(default)]
    pub enrollments: Vec<Enrollment>,
}

impl User {
    pub fn new(id: impl Into<String>, role: Role) -> Self {
        Self {
            id: id.into(),
            role,
            ..Self::default()
        }
    }

    pub fn is_enrolled(&self, entity_id: &str) -> bool {
        self.enrollments.iter().any(|e| e.matches(entity_id))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum AccessReason {
    Admin,
    ViewAllFlag,
    ViewAllCapability,
    OpenEntity,
    Enrolled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "decision", content = "reason", rename_all = "camelCase")]
pub enum AccessDecision {
    Granted(AccessReason),
    Denied,
}

impl AccessDecision {
    pub fn is_granted(&self) -> bool {
        matches!(self, AccessDecision::Granted(_))
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct PermissionResolver;

impl PermissionResolver {
    pub fn new() -> Self {
        Self
    }

    pub fn decide(
        &self,
        user: &User,
        entity_id: &str,
        entity_requires_membership: bool,
    ) -> AccessDecision {
        let decision = if user.role == Role::Admin {
            AccessDecision::Granted(AccessReason::Admin)
        } else if user.can_view_all {
            AccessDecision::Granted(AccessReason::ViewAllFlag)
        } else if user.capabilities.iter().any(|c| c == VIEW_ALL_CAPABILITY) {
            AccessDecision::Granted(AccessReason::ViewAllCapability)
        } else if !entity_requires_membership {
            AccessDecision::Granted(AccessReason::OpenEntity)
        } else if user.is_enrolled(entity_id) {
            AccessDecision::Granted(AccessReason::Enrolled)
        } else {
            AccessDecision::Denied
        };

        debug!(user_id = %user.id, entity_id, ?decision, "access resolved");
        decision
    }

    pub fn has_access(&self, user: &User, entity_id: &str, entity_requires_membership: bool) -> bool {
        self.decide(user, entity_id, entity_requires_membership)
            .is_granted()
    }

    /// `PermissionDenied` unless access is granted
    pub fn check(
        &self,
        user: &User,
        entity_id: &str,
        entity_requires_membership: bool,
    ) -> SheetResult<AccessReason> {
        match self.decide(user, entity_id, entity_requires_membership) {
            AccessDecision::Granted(reason) => Ok(reason),
            AccessDecision::Denied => Err(SheetError::PermissionDenied(format!(
                "user '{}' cannot access '{}'",
                user.id, entity_id
            ))),
        }
    }

    /// Access to a sheet is governed by its owning course
    pub fn check_sheet(&self, user: &User, sheet: &Sheet) -> SheetResult<AccessReason> {
        self.check(user, &sheet.course_id, sheet.requires_membership)
    }
}

fn normalize_id(id: &str) -> String {
    id.trim().to_string()
}

/// Accept ids stored as strings or numbers
fn id_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::String(s) => Ok(s),
        serde_json::Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "expected string or number id, got {}",
            other
        ))),
    }
}

fn optional_id_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::Null => Ok(None),
        serde_json::Value::String(s) => Ok(Some(s)),
        serde_json::Value::Number(n) => Ok(Some(n.to_string())),
        other => Err(serde::de::Error::custom(format!(
            "expected string or number id, got {}",
            other
        ))),
    }
}
