use chroma_types::{CatalogError, CollectionUuid, Segment, SegmentScope};

/// Whether a new segment may be created for a collection, given the
/// segments that already exist for it.
///
/// Segment scope exclusivity is left ambiguous by the source system (see
/// the open question on segment scope uniqueness); the catalog delegates
/// the decision here rather than hard-coding either answer.
pub trait SegmentScopeValidator: Send + Sync + std::fmt::Debug {
    fn validate(
        &self,
        existing: &[Segment],
        candidate_scope: SegmentScope,
        candidate_collection: CollectionUuid,
    ) -> Result<(), CatalogError>;
}

/// At most one segment per `(collection, scope)`. The default wired into
/// both catalog backends in this implementation.
#[derive(Debug, Default, Clone)]
pub struct ExclusiveScopePerCollection;

impl SegmentScopeValidator for ExclusiveScopePerCollection {
    fn validate(
        &self,
        existing: &[Segment],
        candidate_scope: SegmentScope,
        candidate_collection: CollectionUuid,
    ) -> Result<(), CatalogError> {
        let conflict = existing
            .iter()
            .any(|s| s.collection == candidate_collection && s.scope == candidate_scope);
        if conflict {
            return Err(CatalogError::AlreadyExists(format!(
                "collection {} already has a {} segment",
                candidate_collection, candidate_scope
            )));
        }
        Ok(())
    }
}

/// No constraint: any number of segments of any scope may coexist for a
/// collection. Useful where scope exclusivity is enforced elsewhere, or not
/// at all.
#[derive(Debug, Default, Clone)]
pub struct UnrestrictedScope;

impl SegmentScopeValidator for UnrestrictedScope {
    fn validate(
        &self,
        _existing: &[Segment],
        _candidate_scope: SegmentScope,
        _candidate_collection: CollectionUuid,
    ) -> Result<(), CatalogError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chroma_types::SegmentUuid;
    use uuid::Uuid;

    fn segment(collection: CollectionUuid, scope: SegmentScope) -> Segment {
        Segment {
            id: SegmentUuid(Uuid::new_v4()),
            r#type: "hnsw".to_string(),
            scope,
            collection,
            metadata: None,
        }
    }

    #[test]
    fn exclusive_scope_allows_different_scopes_for_same_collection() {
        let collection = CollectionUuid(Uuid::new_v4());
        let existing = vec![segment(collection, SegmentScope::Vector)];
        let validator = ExclusiveScopePerCollection;
        assert!(validator
            .validate(&existing, SegmentScope::Metadata, collection)
            .is_ok());
    }

    #[test]
    fn exclusive_scope_allows_same_scope_for_different_collections() {
        let collection_a = CollectionUuid(Uuid::new_v4());
        let collection_b = CollectionUuid(Uuid::new_v4());
        let existing = vec![segment(collection_a, SegmentScope::Vector)];
        let validator = ExclusiveScopePerCollection;
        assert!(validator
            .validate(&existing, SegmentScope::Vector, collection_b)
            .is_ok());
    }

    #[test]
    fn exclusive_scope_rejects_duplicate_scope_same_collection() {
        let collection = CollectionUuid(Uuid::new_v4());
        let existing = vec![segment(collection, SegmentScope::Vector)];
        let validator = ExclusiveScopePerCollection;
        assert!(validator
            .validate(&existing, SegmentScope::Vector, collection)
            .is_err());
    }

    #[test]
    fn unrestricted_scope_always_allows() {
        let collection = CollectionUuid(Uuid::new_v4());
        let existing = vec![
            segment(collection, SegmentScope::Vector),
            segment(collection, SegmentScope::Vector),
        ];
        let validator = UnrestrictedScope;
        assert!(validator
            .validate(&existing, SegmentScope::Vector, collection)
            .is_ok());
    }
}
