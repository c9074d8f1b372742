//! Repository operations, one module per entity family.
//!
//! Reads return `Option`/`Vec` and collapse failures to empty (the failure is
//! logged at the connection boundary). Writes return `Result<_, DbError>`.

pub mod announcements;
pub mod blogs;
pub mod mentorship;
pub mod messages;
pub mod questions;
pub mod users;

use std::str::FromStr;

use mentorlink_types::models::UnknownVariant;
use rusqlite::types::{ToSql, Type};
use rusqlite::Row;

pub(crate) const DEFAULT_LIMIT: u32 = 50;
pub(crate) const MAX_LIMIT: u32 = 500;

pub(crate) fn clamp_limit(limit: Option<u32>) -> u32 {
    limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT)
}

/// Read a lowercase status/role text column into its enum.
pub(crate) fn text_enum<T>(row: &Row<'_>, column: &str) -> rusqlite::Result<T>
where
    T: FromStr<Err = UnknownVariant>,
{
    let raw: String = row.get(column)?;
    raw.parse()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(0, Type::Text, Box::new(e)))
}

/// Like [`text_enum`] for nullable columns; unknown text reads as `None`.
pub(crate) fn opt_text_enum<T>(row: &Row<'_>, column: &str) -> rusqlite::Result<Option<T>>
where
    T: FromStr<Err = UnknownVariant>,
{
    let raw: Option<String> = row.get(column)?;
    Ok(raw.and_then(|s| s.parse().ok()))
}

/// Accumulates `AND`-joined WHERE clauses with numbered placeholders.
#[derive(Default)]
pub(crate) struct Conditions {
    clauses: Vec<String>,
    params: Vec<Box<dyn ToSql>>,
}

impl Conditions {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Add `template` with its `{}` replaced by the next placeholder.
    pub(crate) fn push(&mut self, template: &str, value: impl ToSql + 'static) {
        let placeholder = self.bind(value);
        self.clauses.push(template.replace("{}", &placeholder));
    }

    /// Add a clause that binds nothing.
    pub(crate) fn push_raw(&mut self, clause: &str) {
        self.clauses.push(clause.to_string());
    }

    /// Bind a value without adding a clause; returns its placeholder.
    pub(crate) fn bind(&mut self, value: impl ToSql + 'static) -> String {
        self.params.push(Box::new(value));
        format!("?{}", self.params.len())
    }

    pub(crate) fn where_sql(&self) -> String {
        if self.clauses.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", self.clauses.join(" AND "))
        }
    }

    pub(crate) fn params(&self) -> Vec<&dyn ToSql> {
        self.params.iter().map(|p| p.as_ref()).collect()
    }
}

/// Accumulates `column = ?N` assignments for a partial UPDATE.
#[derive(Default)]
pub(crate) struct Assignments {
    sets: Vec<String>,
    params: Vec<Box<dyn ToSql>>,
}

impl Assignments {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn set_opt(&mut self, column: &str, value: Option<String>) {
        if let Some(value) = value {
            self.set(column, value);
        }
    }

    pub(crate) fn set(&mut self, column: &str, value: impl ToSql + 'static) {
        self.params.push(Box::new(value));
        self.sets.push(format!("{} = ?{}", column, self.params.len()));
    }

    /// Raw SQL assignment such as `updated_at = datetime('now')`.
    pub(crate) fn set_raw(&mut self, assignment: &str) {
        self.sets.push(assignment.to_string());
    }

    /// `UPDATE table SET ... WHERE id = ?N`
    pub(crate) fn update_by_id(mut self, table: &str, id: i64) -> (String, Vec<Box<dyn ToSql>>) {
        self.params.push(Box::new(id));
        let sql = format!(
            "UPDATE {} SET {} WHERE id = ?{}",
            table,
            self.sets.join(", "),
            self.params.len()
        );
        (sql, self.params)
    }
}

pub(crate) fn as_params(params: &[Box<dyn ToSql>]) -> Vec<&dyn ToSql> {
    params.iter().map(|p| p.as_ref()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conditions_number_placeholders_in_order() {
        let mut cond = Conditions::new();
        assert_eq!(cond.where_sql(), "");
        cond.push("b.status = {}", "published".to_string());
        cond.push("b.author_id = {}", 4_i64);
        assert_eq!(cond.where_sql(), "WHERE b.status = ?1 AND b.author_id = ?2");
        assert_eq!(cond.bind(10_u32), "?3");
        assert_eq!(cond.params().len(), 3);
    }

    #[test]
    fn assignments_append_id_last() {
        let mut set = Assignments::new();
        set.set_opt("title", Some("New".to_string()));
        set.set_opt("excerpt", None);
        set.set_raw("updated_at = datetime('now')");
        let (sql, params) = set.update_by_id("blogs", 9);
        assert_eq!(sql, "UPDATE blogs SET title = ?1, updated_at = datetime('now') WHERE id = ?2");
        assert_eq!(params.len(), 2);
    }

    #[test]
    fn limits_are_clamped() {
        assert_eq!(clamp_limit(None), DEFAULT_LIMIT);
        assert_eq!(clamp_limit(Some(0)), 1);
        assert_eq!(clamp_limit(Some(10_000)), MAX_LIMIT);
    }
}
