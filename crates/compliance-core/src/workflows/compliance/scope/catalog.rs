use std::collections::{BTreeMap, BTreeSet, HashMap};

use super::super::domain::{OrgId, Organization, RecordId, Scope};
use super::resolver::ScopeError;
use super::ScopedRecord;

/// Reference store answering organization validity questions.
pub trait OrganizationDirectory: Send + Sync {
    fn contains(&self, org: &OrgId) -> bool;
    fn is_active(&self, org: &OrgId) -> bool;
}

/// Directory backed by an in-memory list of organizations.
#[derive(Debug, Clone, Default)]
pub struct OrganizationRegistry {
    organizations: BTreeMap<OrgId, Organization>,
}

impl OrganizationRegistry {
    pub fn new(organizations: impl IntoIterator<Item = Organization>) -> Self {
        Self {
            organizations: organizations
                .into_iter()
                .map(|org| (org.id, org))
                .collect(),
        }
    }

    pub fn get(&self, org: &OrgId) -> Option<&Organization> {
        self.organizations.get(org)
    }
}

impl OrganizationDirectory for OrganizationRegistry {
    fn contains(&self, org: &OrgId) -> bool {
        self.organizations.contains_key(org)
    }

    fn is_active(&self, org: &OrgId) -> bool {
        self.organizations
            .get(org)
            .map(|organization| organization.active)
            .unwrap_or(false)
    }
}

/// Indexed set of scoped records of one kind.
///
/// Parent links are resolved through the id index, never through references,
/// so corrupted data can at worst produce a dangling or cyclic id chain.
#[derive(Debug, Clone)]
pub struct Catalog<T> {
    by_id: HashMap<RecordId, T>,
    by_key: BTreeMap<String, Vec<RecordId>>,
}

impl<T> Default for Catalog<T> {
    fn default() -> Self {
        Self {
            by_id: HashMap::new(),
            by_key: BTreeMap::new(),
        }
    }
}

impl<T: ScopedRecord> Catalog<T> {
    /// Index `records`, rejecting rows that break the scope invariants.
    pub fn build(
        records: impl IntoIterator<Item = T>,
        directory: &dyn OrganizationDirectory,
    ) -> Result<Self, ScopeError> {
        let mut catalog = Self::default();
        let mut active_slots: BTreeSet<(String, Scope)> = BTreeSet::new();

        for record in records {
            let id = record.id();

            record
                .validate()
                .map_err(|reason| ScopeError::InvalidRecord {
                    kind: T::KIND,
                    id,
                    reason,
                })?;

            if let Scope::Org(org) = record.scope() {
                if !directory.contains(&org) {
                    return Err(ScopeError::UnknownOrganization { org });
                }
            }

            if record.status().is_active()
                && !active_slots.insert((record.key().to_string(), record.scope()))
            {
                return Err(ScopeError::DuplicateDefinition {
                    kind: T::KIND,
                    key: record.key().to_string(),
                    scope: record.scope(),
                });
            }

            if catalog.by_id.contains_key(&id) {
                return Err(ScopeError::InvalidRecord {
                    kind: T::KIND,
                    id,
                    reason: "duplicate record id".to_string(),
                });
            }

            catalog
                .by_key
                .entry(record.key().to_string())
                .or_default()
                .push(id);
            catalog.by_id.insert(id, record);
        }

        Ok(catalog)
    }

    pub fn get(&self, id: &RecordId) -> Option<&T> {
        self.by_id.get(id)
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    /// The active row for `key` at exactly `scope`, if any.
    pub fn active_row(&self, key: &str, scope: &Scope) -> Option<&T> {
        self.by_key
            .get(key)?
            .iter()
            .filter_map(|id| self.by_id.get(id))
            .find(|record| record.status().is_active() && record.scope() == *scope)
    }

    /// Keys with at least one active row visible to `org`.
    pub fn visible_keys(&self, org: &OrgId) -> Vec<&str> {
        self.by_key
            .iter()
            .filter(|(_, ids)| {
                ids.iter().filter_map(|id| self.by_id.get(id)).any(|record| {
                    record.status().is_active() && record.scope().is_visible_to(org)
                })
            })
            .map(|(key, _)| key.as_str())
            .collect()
    }

    pub fn records(&self) -> impl Iterator<Item = &T> {
        self.by_id.values()
    }
}
