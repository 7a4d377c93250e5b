//! Template/organization scope resolution for configuration records.
//!
//! A key may be defined once as a shared template and once per organization.
//! Resolution picks the organization row when it is active, falls back to the
//! template row otherwise, and fills unset fields from the parent chain.

mod catalog;
mod resolver;

pub use catalog::{Catalog, OrganizationDirectory, OrganizationRegistry};
pub use resolver::{
    DefinitionCatalogs, EffectiveDefinition, HierarchyFault, ResolvedDefinition, ScopeError,
    ScopeResolver,
};

use super::domain::{
    is_semantic_version, DocumentType, EntityKind, LifecycleStatus, RecordId, ReportDefinition,
    Scope,
};

/// Shape shared by every record that can exist at template and org scope.
pub trait ScopedRecord: Clone {
    const KIND: EntityKind;

    fn id(&self) -> RecordId;
    fn key(&self) -> &str;
    fn scope(&self) -> Scope;
    fn parent_id(&self) -> Option<RecordId>;
    fn status(&self) -> LifecycleStatus;

    /// Fill fields this record leaves unset from an ancestor. Identity fields
    /// (id, key, scope, parent, status) are never inherited.
    fn inherit_from(&mut self, ancestor: &Self);

    /// Record-level validation applied when a catalog is built.
    fn validate(&self) -> Result<(), String> {
        Ok(())
    }
}

pub(crate) fn fill<T: Clone>(target: &mut Option<T>, source: &Option<T>) {
    if target.is_none() {
        target.clone_from(source);
    }
}

impl ScopedRecord for DocumentType {
    const KIND: EntityKind = EntityKind::DocumentType;

    fn id(&self) -> RecordId {
        self.id
    }

    fn key(&self) -> &str {
        &self.key
    }

    fn scope(&self) -> Scope {
        self.scope
    }

    fn parent_id(&self) -> Option<RecordId> {
        self.parent_id
    }

    fn status(&self) -> LifecycleStatus {
        self.status
    }

    fn inherit_from(&mut self, ancestor: &Self) {
        fill(&mut self.display_name, &ancestor.display_name);
        fill(&mut self.version, &ancestor.version);
        fill(&mut self.category, &ancestor.category);
        fill(&mut self.workflow_state, &ancestor.workflow_state);
        fill(&mut self.notes, &ancestor.notes);
    }

    fn validate(&self) -> Result<(), String> {
        match &self.version {
            Some(version) if !is_semantic_version(version) => {
                Err(format!("version '{version}' is not a semantic version"))
            }
            _ => Ok(()),
        }
    }
}

impl ScopedRecord for ReportDefinition {
    const KIND: EntityKind = EntityKind::ReportDefinition;

    fn id(&self) -> RecordId {
        self.id
    }

    fn key(&self) -> &str {
        &self.key
    }

    fn scope(&self) -> Scope {
        self.scope
    }

    fn parent_id(&self) -> Option<RecordId> {
        self.parent_id
    }

    fn status(&self) -> LifecycleStatus {
        self.status
    }

    fn inherit_from(&mut self, ancestor: &Self) {
        fill(&mut self.version, &ancestor.version);
        fill(&mut self.template, &ancestor.template);
        fill(&mut self.binding_rules, &ancestor.binding_rules);
        fill(&mut self.export_capabilities, &ancestor.export_capabilities);
        fill(&mut self.notes, &ancestor.notes);
    }

    fn validate(&self) -> Result<(), String> {
        match &self.version {
            Some(version) if !is_semantic_version(version) => {
                Err(format!("version '{version}' is not a semantic version"))
            }
            _ => Ok(()),
        }
    }
}
