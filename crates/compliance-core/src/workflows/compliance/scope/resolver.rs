use std::sync::Arc;

use serde::Serialize;
use tracing::debug;

use super::super::domain::{DocumentType, EntityKind, OrgId, RecordId, ReportDefinition, Scope};
use super::super::rules::{BusinessRule, NormalizationRule};
use super::catalog::{Catalog, OrganizationDirectory};
use super::ScopedRecord;
use crate::config::ResolverConfig;

/// Why a parent chain could not be walked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HierarchyFault {
    /// The chain is longer than the configured limit (usually a cycle).
    TooDeep { limit: usize },
    /// A `parent_id` points at a record that does not exist.
    DanglingParent(RecordId),
    /// A parent belongs to a different organization than the child.
    ForeignParent(RecordId),
}

impl std::fmt::Display for HierarchyFault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HierarchyFault::TooDeep { limit } => write!(f, "parent chain exceeds depth {limit}"),
            HierarchyFault::DanglingParent(id) => write!(f, "parent {id} does not exist"),
            HierarchyFault::ForeignParent(id) => {
                write!(f, "parent {id} belongs to another organization")
            }
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ScopeError {
    #[error("no active {kind} definition for key '{key}' visible to organization {org}")]
    NotFound {
        kind: EntityKind,
        key: String,
        org: OrgId,
    },
    #[error("invalid {kind} hierarchy for key '{key}': {fault}")]
    InvalidHierarchy {
        kind: EntityKind,
        key: String,
        fault: HierarchyFault,
    },
    #[error("organization {org} is unknown or inactive")]
    UnknownOrganization { org: OrgId },
    #[error("more than one active {kind} for key '{key}' at scope {scope}")]
    DuplicateDefinition {
        kind: EntityKind,
        key: String,
        scope: Scope,
    },
    #[error("invalid {kind} record {id}: {reason}")]
    InvalidRecord {
        kind: EntityKind,
        id: RecordId,
        reason: String,
    },
}

/// The single definition that applies to an organization after resolution.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EffectiveDefinition<T> {
    /// Winning row with inherited fields filled in.
    pub definition: T,
    pub source_id: RecordId,
    pub source_scope: Scope,
    /// Winning row first, then every ancestor consulted, nearest first.
    pub lineage: Vec<RecordId>,
}

impl<T> EffectiveDefinition<T> {
    pub fn is_override(&self) -> bool {
        matches!(self.source_scope, Scope::Org(_))
    }
}

/// Pure resolver over catalogs; owns no state besides its limits.
#[derive(Clone)]
pub struct ScopeResolver {
    config: ResolverConfig,
    directory: Arc<dyn OrganizationDirectory>,
}

impl ScopeResolver {
    pub fn new(config: ResolverConfig, directory: Arc<dyn OrganizationDirectory>) -> Self {
        Self { config, directory }
    }

    pub fn directory(&self) -> &dyn OrganizationDirectory {
        self.directory.as_ref()
    }

    pub fn resolve<T: ScopedRecord>(
        &self,
        catalog: &Catalog<T>,
        key: &str,
        org: &OrgId,
    ) -> Result<EffectiveDefinition<T>, ScopeError> {
        if !self.directory.is_active(org) {
            return Err(ScopeError::UnknownOrganization { org: *org });
        }

        let org_row = catalog.active_row(key, &Scope::Org(*org));
        let template_row = catalog.active_row(key, &Scope::Template);

        let (winner, implicit_parent) = match (org_row, template_row) {
            (Some(row), template) => (row, template),
            (None, Some(row)) => (row, None),
            (None, None) => {
                return Err(ScopeError::NotFound {
                    kind: T::KIND,
                    key: key.to_string(),
                    org: *org,
                })
            }
        };

        let mut definition = winner.clone();
        let mut lineage = vec![winner.id()];
        let mut next = winner
            .parent_id()
            .or_else(|| implicit_parent.map(ScopedRecord::id));
        let mut depth = 0usize;

        while let Some(parent_id) = next {
            depth += 1;
            if depth > self.config.max_hierarchy_depth {
                return Err(self.hierarchy_error::<T>(
                    key,
                    HierarchyFault::TooDeep {
                        limit: self.config.max_hierarchy_depth,
                    },
                ));
            }

            let parent = catalog.get(&parent_id).ok_or_else(|| {
                self.hierarchy_error::<T>(key, HierarchyFault::DanglingParent(parent_id))
            })?;

            // Specialization only narrows: a template never inherits from an org row.
            if !parent.scope().is_visible_to(org)
                || parent.scope().specificity() > winner.scope().specificity()
            {
                return Err(
                    self.hierarchy_error::<T>(key, HierarchyFault::ForeignParent(parent_id))
                );
            }

            definition.inherit_from(parent);
            lineage.push(parent_id);
            next = parent.parent_id();
        }

        debug!(
            kind = %T::KIND,
            key,
            %org,
            scope = winner.scope().label(),
            depth,
            "resolved effective definition"
        );

        Ok(EffectiveDefinition {
            definition,
            source_id: winner.id(),
            source_scope: winner.scope(),
            lineage,
        })
    }

    /// Resolve every key visible to `org`, ordered by key.
    pub fn resolve_all<T: ScopedRecord>(
        &self,
        catalog: &Catalog<T>,
        org: &OrgId,
    ) -> Result<Vec<EffectiveDefinition<T>>, ScopeError> {
        catalog
            .visible_keys(org)
            .into_iter()
            .map(|key| self.resolve(catalog, key, org))
            .collect()
    }

    fn hierarchy_error<T: ScopedRecord>(&self, key: &str, fault: HierarchyFault) -> ScopeError {
        ScopeError::InvalidHierarchy {
            kind: T::KIND,
            key: key.to_string(),
            fault,
        }
    }
}

/// Catalogs for every scoped entity kind.
#[derive(Debug, Clone, Default)]
pub struct DefinitionCatalogs {
    pub document_types: Catalog<DocumentType>,
    pub business_rules: Catalog<BusinessRule>,
    pub normalization_rules: Catalog<NormalizationRule>,
    pub report_definitions: Catalog<ReportDefinition>,
}

/// Result of a kind-dispatched resolution.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ResolvedDefinition {
    DocumentType(EffectiveDefinition<DocumentType>),
    BusinessRule(EffectiveDefinition<BusinessRule>),
    NormalizationRule(EffectiveDefinition<NormalizationRule>),
    ReportDefinition(EffectiveDefinition<ReportDefinition>),
}

impl ResolvedDefinition {
    pub fn source_id(&self) -> RecordId {
        match self {
            ResolvedDefinition::DocumentType(def) => def.source_id,
            ResolvedDefinition::BusinessRule(def) => def.source_id,
            ResolvedDefinition::NormalizationRule(def) => def.source_id,
            ResolvedDefinition::ReportDefinition(def) => def.source_id,
        }
    }
}

impl DefinitionCatalogs {
    /// `resolve(key, organization, kind)` over the catalog of that kind.
    pub fn resolve(
        &self,
        resolver: &ScopeResolver,
        key: &str,
        org: &OrgId,
        kind: EntityKind,
    ) -> Result<ResolvedDefinition, ScopeError> {
        Ok(match kind {
            EntityKind::DocumentType => ResolvedDefinition::DocumentType(resolver.resolve(
                &self.document_types,
                key,
                org,
            )?),
            EntityKind::BusinessRule => ResolvedDefinition::BusinessRule(resolver.resolve(
                &self.business_rules,
                key,
                org,
            )?),
            EntityKind::NormalizationRule => ResolvedDefinition::NormalizationRule(
                resolver.resolve(&self.normalization_rules, key, org)?,
            ),
            EntityKind::ReportDefinition => ResolvedDefinition::ReportDefinition(
                resolver.resolve(&self.report_definitions, key, org)?,
            ),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflows::compliance::domain::{LifecycleStatus, Organization};
    use crate::workflows::compliance::scope::OrganizationRegistry;
    use chrono::{TimeZone, Utc};
    use uuid::Uuid;

    fn org() -> OrgId {
        OrgId(Uuid::from_u128(0xA1))
    }

    fn resolver_with(max_depth: usize) -> (ScopeResolver, OrganizationRegistry) {
        let registry = OrganizationRegistry::new([
            Organization {
                id: org(),
                name: "Riverside CDE".to_string(),
                active: true,
            },
            Organization {
                id: OrgId(Uuid::from_u128(0xB2)),
                name: "Dormant Fund".to_string(),
                active: false,
            },
        ]);
        let resolver = ScopeResolver::new(
            ResolverConfig {
                max_hierarchy_depth: max_depth,
            },
            Arc::new(registry.clone()),
        );
        (resolver, registry)
    }

    fn doc_type(id: u128, scope: Scope, parent: Option<u128>) -> DocumentType {
        DocumentType {
            id: RecordId(Uuid::from_u128(id)),
            key: "allocation_agreement".to_string(),
            scope,
            parent_id: parent.map(|p| RecordId(Uuid::from_u128(p))),
            display_name: None,
            version: None,
            status: LifecycleStatus::Active,
            category: None,
            workflow_state: None,
            notes: None,
            created_at: Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap(),
        }
    }

    #[test]
    fn org_override_inherits_unset_fields_from_template() {
        let (resolver, registry) = resolver_with(32);
        let mut template = doc_type(1, Scope::Template, None);
        template.display_name = Some("Allocation Agreement".to_string());
        template.version = Some("1.0.0".to_string());
        let mut override_row = doc_type(2, Scope::Org(org()), None);
        override_row.version = Some("1.1.0".to_string());

        let catalog = Catalog::build([template, override_row], &registry).unwrap();
        let effective = resolver
            .resolve(&catalog, "allocation_agreement", &org())
            .unwrap();

        assert!(effective.is_override());
        assert_eq!(effective.definition.version.as_deref(), Some("1.1.0"));
        assert_eq!(
            effective.definition.display_name.as_deref(),
            Some("Allocation Agreement")
        );
        assert_eq!(effective.lineage.len(), 2);
    }

    #[test]
    fn inactive_override_falls_back_to_template() {
        let (resolver, registry) = resolver_with(32);
        let template = doc_type(1, Scope::Template, None);
        let mut draft = doc_type(2, Scope::Org(org()), None);
        draft.status = LifecycleStatus::Draft;

        let catalog = Catalog::build([template, draft], &registry).unwrap();
        let effective = resolver
            .resolve(&catalog, "allocation_agreement", &org())
            .unwrap();
        assert_eq!(effective.source_scope, Scope::Template);
    }

    #[test]
    fn missing_key_is_not_found() {
        let (resolver, registry) = resolver_with(32);
        let catalog = Catalog::<DocumentType>::build([], &registry).unwrap();
        match resolver.resolve(&catalog, "qlici_loan", &org()) {
            Err(ScopeError::NotFound { key, .. }) => assert_eq!(key, "qlici_loan"),
            other => panic!("expected not found, got {other:?}"),
        }
    }

    #[test]
    fn cyclic_parents_hit_the_depth_guard() {
        let (resolver, registry) = resolver_with(4);
        let mut a = doc_type(1, Scope::Template, Some(2));
        a.key = "cycle".to_string();
        let mut b = doc_type(2, Scope::Template, Some(1));
        b.key = "cycle_parent".to_string();

        let catalog = Catalog::build([a, b], &registry).unwrap();
        match resolver.resolve(&catalog, "cycle", &org()) {
            Err(ScopeError::InvalidHierarchy {
                fault: HierarchyFault::TooDeep { limit },
                ..
            }) => assert_eq!(limit, 4),
            other => panic!("expected depth guard, got {other:?}"),
        }
    }

    #[test]
    fn dangling_parent_is_invalid_hierarchy() {
        let (resolver, registry) = resolver_with(32);
        let child = doc_type(1, Scope::Template, Some(99));
        let catalog = Catalog::build([child], &registry).unwrap();
        assert!(matches!(
            resolver.resolve(&catalog, "allocation_agreement", &org()),
            Err(ScopeError::InvalidHierarchy {
                fault: HierarchyFault::DanglingParent(_),
                ..
            })
        ));
    }

    #[test]
    fn template_cannot_inherit_from_org_row() {
        let (resolver, registry) = resolver_with(32);
        let mut org_row = doc_type(2, Scope::Org(org()), None);
        org_row.key = "private_base".to_string();
        let template = doc_type(1, Scope::Template, Some(2));
        let catalog = Catalog::build([template, org_row], &registry).unwrap();
        assert!(matches!(
            resolver.resolve(&catalog, "allocation_agreement", &org()),
            Err(ScopeError::InvalidHierarchy {
                fault: HierarchyFault::ForeignParent(_),
                ..
            })
        ));
    }

    #[test]
    fn inactive_organization_cannot_resolve() {
        let (resolver, registry) = resolver_with(32);
        let catalog = Catalog::build([doc_type(1, Scope::Template, None)], &registry).unwrap();
        let dormant = OrgId(Uuid::from_u128(0xB2));
        assert!(matches!(
            resolver.resolve(&catalog, "allocation_agreement", &dormant),
            Err(ScopeError::UnknownOrganization { .. })
        ));
    }

    #[test]
    fn catalog_rejects_rows_for_unknown_organizations() {
        let (_, registry) = resolver_with(32);
        let stranger = OrgId(Uuid::from_u128(0xFF));
        let row = doc_type(1, Scope::Org(stranger), None);
        assert!(matches!(
            Catalog::build([row], &registry),
            Err(ScopeError::UnknownOrganization { org }) if org == stranger
        ));
    }

    #[test]
    fn catalog_rejects_duplicate_active_rows_and_bad_versions() {
        let (_, registry) = resolver_with(32);
        let a = doc_type(1, Scope::Template, None);
        let b = doc_type(2, Scope::Template, None);
        assert!(matches!(
            Catalog::build([a, b], &registry),
            Err(ScopeError::DuplicateDefinition { .. })
        ));

        let mut bad = doc_type(3, Scope::Template, None);
        bad.version = Some("v1".to_string());
        assert!(matches!(
            Catalog::build([bad], &registry),
            Err(ScopeError::InvalidRecord { .. })
        ));
    }
}
