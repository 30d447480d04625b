use std::collections::BTreeMap;
use std::fmt;

use crate::errors::CrudError;
use crate::fields::{EntityFields, SearchableField};
use crate::filtering::{Filter, check_combinations};
use crate::pagination::Pagination;

use super::{SortBy, SortOrder};

/// A backend-agnostic read request for entity fields `F`.
///
/// Field names are already resolved against the entity whitelists. Filters on different fields
/// are ANDed, and so are the filters listed under one field.
pub struct FindQuery<F: EntityFields> {
    pub page: Option<u64>,
    pub size: Option<u64>,
    pub sort: Vec<SortBy<F::Sortable>>,
    pub select: Vec<F::Selectable>,
    pub filters: BTreeMap<F::Searchable, Vec<Filter>>,
}

impl<F: EntityFields> FindQuery<F> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            page: None,
            size: None,
            sort: Vec::new(),
            select: Vec::new(),
            filters: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn page(mut self, page: u64) -> Self {
        self.page = Some(page);
        self
    }

    #[must_use]
    pub fn size(mut self, size: u64) -> Self {
        self.size = Some(size);
        self
    }

    #[must_use]
    pub fn sort_by(mut self, field: F::Sortable, order: SortOrder) -> Self {
        self.sort.push(SortBy { field, order });
        self
    }

    #[must_use]
    pub fn select(mut self, field: F::Selectable) -> Self {
        if !self.select.contains(&field) {
            self.select.push(field);
        }
        self
    }

    #[must_use]
    pub fn filter(mut self, field: F::Searchable, filter: Filter) -> Self {
        self.add_filter(field, filter);
        self
    }

    pub fn add_filter(&mut self, field: F::Searchable, filter: Filter) {
        self.filters.entry(field).or_default().push(filter);
    }

    #[must_use]
    pub fn pagination(&self, default_size: u64, max_size: u64) -> Pagination {
        Pagination::normalize(self.page, self.size, default_size, max_size)
    }

    /// Re-check every filter against its field declaration and the combination rules.
    ///
    /// Queries parsed from the wire already satisfy this; queries assembled in code or rewritten
    /// by an authorization hook may not.
    ///
    /// # Errors
    ///
    /// [`CrudError::ValidationFailed`] listing every problem found.
    pub fn validate(&self) -> Result<(), CrudError> {
        let errors = validate_filters(&self.filters);
        if errors.is_empty() {
            Ok(())
        } else {
            Err(CrudError::validation_failed(errors))
        }
    }
}

pub(crate) fn validate_filters<S: SearchableField>(
    filters: &BTreeMap<S, Vec<Filter>>,
) -> Vec<String> {
    let mut errors = Vec::new();
    for (field, field_filters) in filters {
        for filter in field_filters {
            if let Err(err) = filter.check_for(field.field_type(), field.indexed()) {
                errors.push(format!("{}: {err}", field.name()));
            }
        }
        if let Err(violations) = check_combinations(field_filters) {
            errors.extend(
                violations
                    .into_iter()
                    .map(|err| format!("{}: {err}", field.name())),
            );
        }
    }
    errors
}

impl<F: EntityFields> Default for FindQuery<F> {
    fn default() -> Self {
        Self::new()
    }
}

impl<F: EntityFields> Clone for FindQuery<F> {
    fn clone(&self) -> Self {
        Self {
            page: self.page,
            size: self.size,
            sort: self.sort.clone(),
            select: self.select.clone(),
            filters: self.filters.clone(),
        }
    }
}

impl<F: EntityFields> fmt::Debug for FindQuery<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FindQuery")
            .field("page", &self.page)
            .field("size", &self.size)
            .field("sort", &self.sort)
            .field("select", &self.select)
            .field("filters", &self.filters)
            .finish()
    }
}
