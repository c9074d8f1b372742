use serde::Serialize;

use crate::Database;

/// Which optional columns this deployment's schema carries.
///
/// Built once per [`Database`] handle. Projections substitute `NULL AS <col>`
/// for absent columns so every row type has the same shape on every schema.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ColumnSet {
    pub user_phone: bool,
    pub user_location: bool,
    pub user_skills: bool,
    pub user_interests: bool,
    pub blog_approved_at: bool,
    pub blog_approved_by: bool,
    pub message_sender_role: bool,
}

const USER_BASE_COLUMNS: &[&str] = &[
    "id",
    "name",
    "email",
    "password_hash",
    "role",
    "status",
    "is_email_verified",
    "verification_status",
    "avatar",
    "bio",
    "created_at",
    "updated_at",
];

const BLOG_BASE_COLUMNS: &[&str] = &[
    "id",
    "title",
    "content",
    "excerpt",
    "category",
    "author_id",
    "status",
    "views",
    "created_at",
    "updated_at",
];

impl ColumnSet {
    pub(crate) fn probe(db: &Database) -> Self {
        Self {
            user_phone: db.has_column("users", "phone"),
            user_location: db.has_column("users", "location"),
            user_skills: db.has_column("users", "skills"),
            user_interests: db.has_column("users", "interests"),
            blog_approved_at: db.has_column("blogs", "approved_at"),
            blog_approved_by: db.has_column("blogs", "approved_by"),
            message_sender_role: db.has_column("messages", "sender_role"),
        }
    }

    /// Every optional `users` column with its availability.
    pub fn user_optional(&self) -> [(&'static str, bool); 4] {
        [
            ("phone", self.user_phone),
            ("location", self.user_location),
            ("skills", self.user_skills),
            ("interests", self.user_interests),
        ]
    }

    /// SELECT list for a `users` row aliased as `alias`.
    pub fn user_projection(&self, alias: &str) -> String {
        let mut cols = base(alias, USER_BASE_COLUMNS);
        for (column, present) in self.user_optional() {
            cols.push(optional(alias, column, present));
        }
        cols.join(", ")
    }

    /// SELECT list for a `blogs` row aliased as `alias`.
    pub fn blog_projection(&self, alias: &str) -> String {
        let mut cols = base(alias, BLOG_BASE_COLUMNS);
        cols.push(optional(alias, "approved_at", self.blog_approved_at));
        cols.push(optional(alias, "approved_by", self.blog_approved_by));
        cols.join(", ")
    }

    pub fn sender_role_projection(&self, alias: &str) -> String {
        optional(alias, "sender_role", self.message_sender_role)
    }
}

fn base(alias: &str, columns: &[&str]) -> Vec<String> {
    columns
        .iter()
        .map(|c| format!("{}.{} AS {}", alias, c, c))
        .collect()
}

fn optional(alias: &str, column: &str, present: bool) -> String {
    if present {
        format!("{}.{} AS {}", alias, column, column)
    } else {
        format!("NULL AS {}", column)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{fresh_db, legacy_db};

    #[test]
    fn absent_columns_project_as_null() {
        let set = ColumnSet {
            user_phone: true,
            ..ColumnSet::default()
        };
        let sql = set.user_projection("u");
        assert!(sql.contains("u.phone AS phone"));
        assert!(sql.contains("NULL AS location"));
        assert!(sql.starts_with("u.id AS id, u.name AS name"));

        let blog = ColumnSet::default().blog_projection("b");
        assert!(blog.ends_with("NULL AS approved_at, NULL AS approved_by"));
    }

    #[test]
    fn column_set_is_negotiated_once() {
        let (_dir, db) = fresh_db();
        let first = *db.columns();
        assert!(first.blog_approved_at && first.message_sender_role);
        let changes = db.schema_changes();

        let again = *db.columns();
        assert_eq!(first, again);
        assert_eq!(db.schema_changes(), changes);
    }

    #[test]
    fn evolution_can_be_disabled() {
        let (_dir, db) = legacy_db();
        assert_eq!(*db.columns(), ColumnSet::default());
        assert_eq!(db.schema_changes(), 0);
    }
}
