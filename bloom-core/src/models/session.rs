use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::config::SubjectConfig;
use crate::error::ValidationError;

/// Opaque, server-issued identifier of one assessment attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(Uuid);

impl SessionId {
    pub fn new(id: Uuid) -> Self {
        Self(id)
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for SessionId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

impl From<Uuid> for SessionId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

/// Who is being assessed. Written once, when the session row is created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubjectProfile {
    pub name: String,
    pub age: i32,
    pub gender: String,
}

impl SubjectProfile {
    pub fn new(name: impl Into<String>, age: i32, gender: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            age,
            gender: gender.into(),
        }
    }

    pub fn validate(&self, rules: &SubjectConfig) -> Result<(), ValidationError> {
        if self.name.trim().is_empty() {
            return Err(ValidationError::MissingName);
        }
        if self.gender.trim().is_empty() {
            return Err(ValidationError::MissingGender);
        }
        if self.age < rules.min_age || self.age > rules.max_age {
            return Err(ValidationError::AgeOutOfRange {
                age: self.age,
                min: rules.min_age,
                max: rules.max_age,
            });
        }
        Ok(())
    }
}

/// Row of the assessments listing.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct SessionSummary {
    pub id: Uuid,
    pub child_name: String,
    pub gender: String,
    pub age: i32,
    pub report_url: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Full session row as a column -> value object.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionRecord(pub Map<String, Value>);

impl SessionRecord {
    pub fn get(&self, column: &str) -> Option<&Value> {
        self.0.get(column).filter(|v| !v.is_null())
    }

    pub fn is_complete(&self) -> bool {
        self.get("completed_at").is_some()
    }
}
