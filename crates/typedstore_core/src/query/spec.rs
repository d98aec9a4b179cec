//! Query and batch-delete request descriptions.

use crate::model::object::{EntityId, EntityKind, ManagedObject};
use crate::query::predicate::Predicate;
use crate::query::sort::{sort_objects, SortKey};

/// Which objects a fetch or batch delete targets.
#[derive(Debug, Clone)]
pub struct QuerySpec {
    /// Entity kind the request addresses.
    pub entity_name: String,
    /// Optional filter; `None` matches every object of the kind.
    pub predicate: Option<Predicate>,
    /// Ordering applied in listed order.
    pub sort: Vec<SortKey>,
    /// Maximum rows to return.
    pub limit: Option<u32>,
    /// Number of rows to skip after sorting.
    pub offset: u32,
}

impl QuerySpec {
    /// Creates a request matching every object of `entity_name`.
    pub fn new(entity_name: impl Into<String>) -> Self {
        Self {
            entity_name: entity_name.into(),
            predicate: None,
            sort: Vec::new(),
            limit: None,
            offset: 0,
        }
    }

    /// Creates a request matching every object of kind `T`.
    pub fn for_kind<T: EntityKind>() -> Self {
        Self::new(T::ENTITY_NAME)
    }

    pub fn with_predicate(mut self, predicate: Predicate) -> Self {
        self.predicate = Some(predicate);
        self
    }

    pub fn with_sort(mut self, sort: impl IntoIterator<Item = SortKey>) -> Self {
        self.sort = sort.into_iter().collect();
        self
    }

    pub fn with_limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn with_offset(mut self, offset: u32) -> Self {
        self.offset = offset;
        self
    }

    /// Returns whether `object` has the requested kind and passes the filter.
    pub fn matches(&self, object: &ManagedObject) -> bool {
        if !object.is_entity(&self.entity_name) {
            return false;
        }
        match self.predicate.as_ref() {
            Some(predicate) => object.with_fields(|fields| predicate.evaluate(fields)),
            None => true,
        }
    }

    /// Filters, sorts and pages `candidates`, given in storage order.
    pub fn apply(&self, candidates: Vec<ManagedObject>) -> Vec<ManagedObject> {
        let matching: Vec<ManagedObject> = candidates
            .into_iter()
            .filter(|object| self.matches(object))
            .collect();
        let sorted = sort_objects(matching, &self.sort);
        let paged = sorted.into_iter().skip(self.offset as usize);
        match self.limit {
            Some(limit) => paged.take(limit as usize).collect(),
            None => paged.collect(),
        }
    }
}

/// Bulk removal request executed directly against storage.
#[derive(Debug, Clone)]
pub enum BatchDeleteRequest {
    /// Delete everything a query matches.
    Query(QuerySpec),
    /// Delete exactly these identifiers.
    Ids(Vec<EntityId>),
}

#[cfg(test)]
mod tests {
    use super::QuerySpec;
    use crate::model::object::ManagedObject;
    use crate::query::predicate::Predicate;
    use crate::query::sort::SortKey;

    fn numbered(entity: &str, n: i64) -> ManagedObject {
        let object = ManagedObject::new(entity);
        object.set("n", n);
        object
    }

    #[test]
    fn apply_filters_kind_then_pages_sorted_rows() {
        let candidates = vec![
            numbered("User", 3),
            numbered("Order", 1),
            numbered("User", 1),
            numbered("User", 4),
            numbered("User", 2),
        ];

        let spec = QuerySpec::new("User")
            .with_predicate(Predicate::ge("n", 2))
            .with_sort([SortKey::ascending("n")])
            .with_offset(1)
            .with_limit(1);

        let result = spec.apply(candidates);
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].get("n"), Some(serde_json::json!(3)));
    }

    #[test]
    fn offset_without_limit_returns_tail() {
        let candidates = (0..4).map(|n| numbered("User", n)).collect();
        let result = QuerySpec::new("User").with_offset(3).apply(candidates);
        assert_eq!(result.len(), 1);
    }
}
