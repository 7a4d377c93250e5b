use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrgId(pub Uuid);

impl fmt::Display for OrgId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for OrgId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s.trim()).map(Self)
    }
}

/// Identifier of any persisted record (definitions, rules, documents, obligations).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(pub Uuid);

impl RecordId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for RecordId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Ownership of a configurable record: a shared template or an organization override.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scope {
    Template,
    Org(OrgId),
}

impl Scope {
    /// Narrower scopes rank higher.
    pub const fn specificity(&self) -> u8 {
        match self {
            Scope::Template => 0,
            Scope::Org(_) => 1,
        }
    }

    pub const fn org_id(&self) -> Option<OrgId> {
        match self {
            Scope::Template => None,
            Scope::Org(org) => Some(*org),
        }
    }

    pub fn is_visible_to(&self, org: &OrgId) -> bool {
        match self {
            Scope::Template => true,
            Scope::Org(owner) => owner == org,
        }
    }

    pub const fn label(&self) -> &'static str {
        match self {
            Scope::Template => "template",
            Scope::Org(_) => "org",
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scope::Template => write!(f, "template"),
            Scope::Org(org) => write!(f, "org:{org}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleStatus {
    Draft,
    Active,
    Archived,
}

impl LifecycleStatus {
    pub const fn is_active(self) -> bool {
        matches!(self, LifecycleStatus::Active)
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::Draft => "Draft",
            Self::Active => "Active",
            Self::Archived => "Archived",
        }
    }
}

/// The families of scoped configuration records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    DocumentType,
    BusinessRule,
    NormalizationRule,
    ReportDefinition,
}

impl EntityKind {
    pub const fn label(self) -> &'static str {
        match self {
            Self::DocumentType => "document_type",
            Self::BusinessRule => "business_rule",
            Self::NormalizationRule => "normalization_rule",
            Self::ReportDefinition => "report_definition",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for EntityKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "document_type" => Ok(Self::DocumentType),
            "business_rule" => Ok(Self::BusinessRule),
            "normalization_rule" => Ok(Self::NormalizationRule),
            "report_definition" => Ok(Self::ReportDefinition),
            other => Err(format!("unknown entity kind '{other}'")),
        }
    }
}

/// Reference data for one organization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Organization {
    pub id: OrgId,
    pub name: String,
    #[serde(default = "default_true")]
    pub active: bool,
}

fn default_true() -> bool {
    true
}

/// One extracted value as delivered by the extraction pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractedField {
    pub value: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f32>,
}

impl ExtractedField {
    pub fn new(value: impl Into<Value>, confidence: Option<f32>) -> Self {
        Self {
            value: value.into(),
            confidence,
        }
    }
}

/// Extracted values keyed by field key.
pub type FieldValues = BTreeMap<String, ExtractedField>;

/// Classification definition for uploaded documents.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentType {
    pub id: RecordId,
    pub key: String,
    pub scope: Scope,
    #[serde(default)]
    pub parent_id: Option<RecordId>,
    #[serde(default)]
    pub display_name: Option<String>,
    /// Semantic version such as `1.2` or `1.2.0`.
    #[serde(default)]
    pub version: Option<String>,
    pub status: LifecycleStatus,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub workflow_state: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Reporting template bound to obligation keys.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportDefinition {
    pub id: RecordId,
    pub key: String,
    pub scope: Scope,
    #[serde(default)]
    pub parent_id: Option<RecordId>,
    #[serde(default)]
    pub version: Option<String>,
    pub status: LifecycleStatus,
    #[serde(default)]
    pub template: Option<Value>,
    #[serde(default)]
    pub binding_rules: Option<Value>,
    #[serde(default)]
    pub export_capabilities: Option<Vec<String>>,
    #[serde(default)]
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

pub(crate) fn is_semantic_version(value: &str) -> bool {
    let parts: Vec<&str> = value.split('.').collect();
    (2..=3).contains(&parts.len())
        && parts
            .iter()
            .all(|part| !part.is_empty() && part.chars().all(|c| c.is_ascii_digit()))
}
