//! JSON configuration snapshot: every record the engine reads, loaded in one
//! document and compiled into resolvers, catalogs and the rule registry.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::config::{EngineConfig, SchedulerConfig};
use crate::workflows::compliance::audit::AuditSink;
use crate::workflows::compliance::domain::{
    DocumentType, OrgId, Organization, ReportDefinition,
};
use crate::workflows::compliance::obligations::{
    InMemoryObligationStore, Obligation, ObligationScheduler, ObligationStore,
};
use crate::workflows::compliance::recurrence::{
    RecurrenceBook, RecurrenceError, RecurrenceExpander, RecurrenceRule,
};
use crate::workflows::compliance::rules::{
    BusinessRule, ConflictPolicy, NormalizationRule, RuleMatcher, RuleRegistry,
};
use crate::workflows::compliance::scope::{
    Catalog, DefinitionCatalogs, OrganizationDirectory, OrganizationRegistry, ScopeError,
    ScopeResolver,
};

#[derive(Debug, thiserror::Error)]
pub enum SnapshotError {
    #[error("failed to read snapshot {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse snapshot {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error(transparent)]
    Scope(#[from] ScopeError),
    #[error(transparent)]
    Recurrence(#[from] RecurrenceError),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConfigurationSnapshot {
    #[serde(default)]
    pub organizations: Vec<Organization>,
    #[serde(default)]
    pub document_types: Vec<DocumentType>,
    #[serde(default)]
    pub report_definitions: Vec<ReportDefinition>,
    #[serde(default)]
    pub business_rules: Vec<BusinessRule>,
    #[serde(default)]
    pub normalization_rules: Vec<NormalizationRule>,
    #[serde(default)]
    pub conflict_policies: Vec<ConflictPolicy>,
    #[serde(default)]
    pub recurrence_rules: Vec<RecurrenceRule>,
    #[serde(default)]
    pub obligations: Vec<Obligation>,
}

impl ConfigurationSnapshot {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, SnapshotError> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path).map_err(|source| SnapshotError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&raw).map_err(|source| SnapshotError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn directory(&self) -> OrganizationRegistry {
        OrganizationRegistry::new(self.organizations.iter().cloned())
    }

    /// Index the scoped records, rejecting duplicates and unknown organizations.
    pub fn catalogs(
        &self,
        directory: &dyn OrganizationDirectory,
    ) -> Result<DefinitionCatalogs, ScopeError> {
        Ok(DefinitionCatalogs {
            document_types: Catalog::build(self.document_types.iter().cloned(), directory)?,
            business_rules: Catalog::build(self.business_rules.iter().cloned(), directory)?,
            normalization_rules: Catalog::build(
                self.normalization_rules.iter().cloned(),
                directory,
            )?,
            report_definitions: Catalog::build(
                self.report_definitions.iter().cloned(),
                directory,
            )?,
        })
    }

    /// Active recurrence rules must be internally consistent before any
    /// obligation is scheduled against them.
    pub fn recurrence_book(
        &self,
        expander: &RecurrenceExpander,
    ) -> Result<RecurrenceBook, RecurrenceError> {
        for rule in self
            .recurrence_rules
            .iter()
            .filter(|rule| rule.status.is_active())
        {
            expander.validate(rule)?;
        }
        Ok(RecurrenceBook::new(self.recurrence_rules.iter().cloned()))
    }

    pub fn obligation_store(&self) -> InMemoryObligationStore {
        InMemoryObligationStore::with_obligations(self.obligations.iter().cloned())
    }

    pub fn compile(&self, config: &EngineConfig) -> Result<CompiledConfiguration, SnapshotError> {
        let directory = self.directory();
        let catalogs = self.catalogs(&directory)?;
        let expander = RecurrenceExpander::new(config.recurrence.clone());
        let recurrence = self.recurrence_book(&expander)?;

        info!(
            organizations = self.organizations.len(),
            document_types = self.document_types.len(),
            business_rules = self.business_rules.len(),
            normalization_rules = self.normalization_rules.len(),
            recurrence_rules = self.recurrence_rules.len(),
            obligations = self.obligations.len(),
            "compiled configuration snapshot"
        );

        Ok(CompiledConfiguration {
            resolver: ScopeResolver::new(config.resolver.clone(), Arc::new(directory)),
            catalogs,
            policies: self.conflict_policies.clone(),
            registry: RuleRegistry::new(),
            recurrence,
            expander,
        })
    }
}

/// Everything needed to resolve, match and schedule against one snapshot.
pub struct CompiledConfiguration {
    pub resolver: ScopeResolver,
    pub catalogs: DefinitionCatalogs,
    pub policies: Vec<ConflictPolicy>,
    pub registry: RuleRegistry,
    pub recurrence: RecurrenceBook,
    pub expander: RecurrenceExpander,
}

impl CompiledConfiguration {
    /// Matcher over the organization's current rule snapshot, publishing one
    /// on first use.
    pub fn matcher(&self, org: &OrgId) -> Result<RuleMatcher, ScopeError> {
        let snapshot = match self.registry.snapshot(org) {
            Some(snapshot) => snapshot,
            None => self
                .registry
                .publish(&self.resolver, &self.catalogs, &self.policies, org)?,
        };
        Ok(RuleMatcher::new(snapshot))
    }

    pub fn scheduler<S, A>(
        &self,
        store: Arc<S>,
        audit: Arc<A>,
        config: SchedulerConfig,
    ) -> ObligationScheduler<S, A>
    where
        S: ObligationStore + 'static,
        A: AuditSink + 'static,
    {
        ObligationScheduler::new(
            store,
            audit,
            self.expander.clone(),
            self.recurrence.clone(),
            config,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflows::compliance::domain::EntityKind;
    use crate::workflows::compliance::scope::ResolvedDefinition;
    use uuid::Uuid;

    const ORG: &str = "00000000-0000-0000-0000-00000000c0de";

    fn snapshot_json(extra_rule: &str) -> String {
        format!(
            r#"{{
                "organizations": [{{ "id": "{ORG}", "name": "Riverside CDE" }}],
                "document_types": [
                    {{
                        "id": "00000000-0000-0000-0000-000000000001",
                        "key": "annual_report",
                        "scope": "template",
                        "display_name": "Annual Report",
                        "version": "1.0",
                        "status": "active",
                        "created_at": "2025-01-01T00:00:00Z"
                    }},
                    {{
                        "id": "00000000-0000-0000-0000-000000000002",
                        "key": "annual_report",
                        "scope": {{ "org": "{ORG}" }},
                        "status": "active",
                        "notes": "Riverside variant",
                        "created_at": "2025-02-01T00:00:00Z"
                    }}
                ],
                "recurrence_rules": [{extra_rule}]
            }}"#
        )
    }

    fn write_snapshot(name: &str, body: &str) -> PathBuf {
        let path = std::env::temp_dir().join(format!("compliance-snapshot-{name}.json"));
        fs::write(&path, body).expect("write snapshot");
        path
    }

    #[test]
    fn loads_and_resolves_an_org_override() {
        let path = write_snapshot("override", &snapshot_json(""));
        let snapshot = ConfigurationSnapshot::load(&path).expect("snapshot loads");
        let compiled = snapshot.compile(&EngineConfig::default()).expect("compiles");
        let org = OrgId(Uuid::parse_str(ORG).unwrap());

        match compiled
            .catalogs
            .resolve(&compiled.resolver, "annual_report", &org, EntityKind::DocumentType)
            .unwrap()
        {
            ResolvedDefinition::DocumentType(definition) => {
                assert_eq!(definition.definition.notes.as_deref(), Some("Riverside variant"));
                assert_eq!(definition.definition.display_name.as_deref(), Some("Annual Report"));
            }
            other => panic!("expected a document type, got {other:?}"),
        }
        let _ = fs::remove_file(path);
    }

    #[test]
    fn inconsistent_recurrence_rules_fail_the_load() {
        let rule = r#"{
            "id": "00000000-0000-0000-0000-000000000010",
            "key": "semiannual_filing",
            "frequency": "quarterly",
            "periods_per_year": 2,
            "status": "active"
        }"#;
        let path = write_snapshot("inconsistent", &snapshot_json(rule));
        let snapshot = ConfigurationSnapshot::load(&path).expect("snapshot parses");

        match snapshot.compile(&EngineConfig::default()) {
            Err(SnapshotError::Recurrence(RecurrenceError::InconsistentFrequency { .. })) => {}
            Err(other) => panic!("expected inconsistent frequency, got {other:?}"),
            Ok(_) => panic!("expected inconsistent frequency"),
        }
        let _ = fs::remove_file(path);
    }

    #[test]
    fn missing_files_report_the_path() {
        match ConfigurationSnapshot::load("/nonexistent/compliance.json") {
            Err(SnapshotError::Read { path, .. }) => {
                assert_eq!(path, PathBuf::from("/nonexistent/compliance.json"))
            }
            other => panic!("expected read error, got {other:?}"),
        }
    }
}
