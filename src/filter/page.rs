use std::collections::HashMap;

use serde::Serialize;

use super::schema::EntitySchema;
use crate::errors::{AppError, Result};

pub const DEFAULT_PAGE_SIZE: u64 = 20;
pub const MAX_PAGE_SIZE: u64 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Asc,
    Desc,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sort {
    pub column: String,
    pub direction: SortDirection,
}

impl Sort {
    pub fn desc(column: impl Into<String>) -> Self {
        Sort {
            column: column.into(),
            direction: SortDirection::Desc,
        }
    }
}

/// Zero-based page request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pageable {
    pub page: u64,
    pub size: u64,
    pub sort: Option<Sort>,
}

impl Default for Pageable {
    fn default() -> Self {
        Pageable::new(0, DEFAULT_PAGE_SIZE)
    }
}

impl Pageable {
    pub fn new(page: u64, size: u64) -> Self {
        Pageable {
            page,
            size: size.clamp(1, MAX_PAGE_SIZE),
            sort: None,
        }
    }

    pub fn with_sort(mut self, sort: Sort) -> Self {
        self.sort = Some(sort);
        self
    }

    pub fn offset(&self) -> u64 {
        self.page.saturating_mul(self.size)
    }

    /// Reads `page`, `size` and `sort=<field>[,asc|desc]` from query parameters.
    /// The sort field must be declared on the schema.
    pub fn from_params(schema: &EntitySchema, params: &HashMap<String, String>) -> Result<Self> {
        let number = |key: &str, default: u64| -> Result<u64> {
            match params.get(key).map(|v| v.trim()).filter(|v| !v.is_empty()) {
                Some(raw) => raw
                    .parse::<u64>()
                    .map_err(|_| AppError::ValidationError(format!("'{}' must be a non-negative integer", key))),
                None => Ok(default),
            }
        };

        let mut pageable = Pageable::new(number("page", 0)?, number("size", DEFAULT_PAGE_SIZE)?);

        if let Some(raw) = params.get("sort").map(|v| v.trim()).filter(|v| !v.is_empty()) {
            let mut parts = raw.split(',').map(str::trim);
            let field = parts.next().unwrap_or_default();
            let descriptor = schema
                .resolve(field)
                .ok_or_else(|| AppError::UnknownFilterField(field.to_string()))?;
            let direction = match parts.next() {
                Some(dir) if dir.eq_ignore_ascii_case("desc") => SortDirection::Desc,
                Some(dir) if dir.eq_ignore_ascii_case("asc") || dir.is_empty() => SortDirection::Asc,
                None => SortDirection::Asc,
                Some(other) => {
                    return Err(AppError::ValidationError(format!(
                        "Sort direction must be asc or desc, got '{}'",
                        other
                    )))
                }
            };
            pageable = pageable.with_sort(Sort {
                column: descriptor.column.to_string(),
                direction,
            });
        }

        Ok(pageable)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Page<T> {
    pub content: Vec<T>,
    pub page: u64,
    pub size: u64,
    pub total_elements: u64,
}

impl<T> Page<T> {
    pub fn new(content: Vec<T>, pageable: &Pageable, total_elements: u64) -> Self {
        Page {
            content,
            page: pageable.page,
            size: pageable.size,
            total_elements,
        }
    }

    pub fn total_pages(&self) -> u64 {
        if self.size == 0 {
            return 0;
        }
        self.total_elements.div_ceil(self.size)
    }

    pub fn has_previous(&self) -> bool {
        self.page > 0
    }

    pub fn has_next(&self) -> bool {
        self.page.saturating_add(1) < self.total_pages()
    }

    pub fn is_last(&self) -> bool {
        !self.has_next()
    }

    pub fn map<U, F: FnMut(T) -> U>(self, f: F) -> Page<U> {
        Page {
            content: self.content.into_iter().map(f).collect(),
            page: self.page,
            size: self.size,
            total_elements: self.total_elements,
        }
    }
}
