use mentorlink_types::models::{AccountStatus, Actor, Role, VerificationStatus};
use rusqlite::types::ToSql;
use rusqlite::{Connection, OptionalExtension, Row, params};
use tracing::{debug, info};

use crate::columns::ColumnSet;
use crate::models::{
    MentorListing, MentorProfileInput, MentorProfileRow, NewUser, StudentProfileInput,
    StudentProfileRow, UserFilter, UserProfileUpdate, UserRow,
};
use crate::queries::{Assignments, Conditions, as_params, clamp_limit, text_enum};
use crate::{Database, DbError};

impl Database {
    // -- Users --

    pub fn create_user(&self, user: &NewUser) -> Result<i64, DbError> {
        self.with_conn(|conn| insert_user(conn, user))
    }

    /// Create a student account and its profile row in one transaction.
    pub fn register_student(
        &self,
        user: &NewUser,
        profile: &StudentProfileInput,
    ) -> Result<i64, DbError> {
        if user.role != Role::Student {
            return Err(DbError::validation("Student registration requires the student role"));
        }
        let id = self.with_tx(|tx| {
            let id = insert_user(tx, user)?;
            write_student_profile(tx, id, profile)?;
            Ok(id)
        })?;
        info!("Registered student {} ({})", id, user.email);
        Ok(id)
    }

    /// Create a mentor account and its profile row in one transaction.
    pub fn register_mentor(
        &self,
        user: &NewUser,
        profile: &MentorProfileInput,
    ) -> Result<i64, DbError> {
        if user.role != Role::Mentor {
            return Err(DbError::validation("Mentor registration requires the mentor role"));
        }
        let id = self.with_tx(|tx| {
            let id = insert_user(tx, user)?;
            write_mentor_profile(tx, id, profile)?;
            Ok(id)
        })?;
        info!("Registered mentor {} ({})", id, user.email);
        Ok(id)
    }

    pub fn get_user_by_id(&self, id: i64) -> Option<UserRow> {
        let cols = *self.columns();
        self.with_conn(|conn| query_user(conn, &cols, "u.id = ?1", &id))
            .unwrap_or_default()
    }

    /// Lookup for the auth collaborator. Emails compare case-insensitively.
    pub fn get_user_by_email(&self, email: &str) -> Option<UserRow> {
        let cols = *self.columns();
        self.with_conn(|conn| query_user(conn, &cols, "u.email = ?1", &email))
            .unwrap_or_default()
    }

    pub fn list_users(&self, filter: &UserFilter) -> Vec<UserRow> {
        let cols = *self.columns();
        let mut cond = Conditions::new();
        if let Some(role) = filter.role {
            cond.push("u.role = {}", role.as_str());
        }
        if let Some(status) = filter.status {
            cond.push("u.status = {}", status.as_str());
        }
        if let Some(verification) = filter.verification_status {
            cond.push("u.verification_status = {}", verification.as_str());
        }
        let limit = cond.bind(clamp_limit(filter.limit));

        let sql = format!(
            "SELECT {} FROM users u {} ORDER BY u.created_at DESC, u.id DESC LIMIT {}",
            cols.user_projection("u"),
            cond.where_sql(),
            limit
        );

        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(cond.params().as_slice(), map_user)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
        .unwrap_or_default()
    }

    /// Apply a profile edit. Fields backed by optional columns are dropped
    /// when this schema lacks them. Returns whether the user exists.
    pub fn update_user_profile(&self, id: i64, update: &UserProfileUpdate) -> Result<bool, DbError> {
        let cols = *self.columns();
        let mut set = Assignments::new();
        set.set_opt("name", update.name.clone());
        set.set_opt("bio", update.bio.clone());
        set.set_opt("avatar", update.avatar.clone());

        let optional = [
            ("phone", &update.phone),
            ("location", &update.location),
            ("skills", &update.skills),
            ("interests", &update.interests),
        ];
        for ((column, value), (_, present)) in optional.into_iter().zip(cols.user_optional()) {
            if !present {
                if value.is_some() {
                    debug!("Skipping users.{} update: column not available", column);
                }
                continue;
            }
            set.set_opt(column, value.clone());
        }
        set.set_raw("updated_at = datetime('now')");

        let (sql, params) = set.update_by_id("users", id);
        self.with_conn(|conn| Ok(conn.execute(&sql, as_params(&params).as_slice())? > 0))
    }

    pub fn delete_user(&self, id: i64) -> Result<bool, DbError> {
        self.with_conn(|conn| Ok(conn.execute("DELETE FROM users WHERE id = ?1", [id])? > 0))
    }

    // -- Profiles --

    pub fn get_student_profile(&self, user_id: i64) -> Option<StudentProfileRow> {
        self.with_conn(|conn| {
            let row = conn
                .query_row(
                    "SELECT user_id, roll_number, branch, year, college_id_path
                     FROM students WHERE user_id = ?1",
                    [user_id],
                    |row| {
                        Ok(StudentProfileRow {
                            user_id: row.get("user_id")?,
                            roll_number: row.get("roll_number")?,
                            branch: row.get("branch")?,
                            year: row.get("year")?,
                            college_id_path: row.get("college_id_path")?,
                        })
                    },
                )
                .optional()?;
            Ok(row)
        })
        .unwrap_or_default()
    }

    pub fn get_mentor_profile(&self, user_id: i64) -> Option<MentorProfileRow> {
        self.with_conn(|conn| {
            let row = conn
                .query_row(
                    "SELECT user_id, company, position, expertise, job_id_path, verified_by_admin
                     FROM mentors WHERE user_id = ?1",
                    [user_id],
                    |row| {
                        Ok(MentorProfileRow {
                            user_id: row.get("user_id")?,
                            company: row.get("company")?,
                            position: row.get("position")?,
                            expertise: row.get("expertise")?,
                            job_id_path: row.get("job_id_path")?,
                            verified_by_admin: row.get("verified_by_admin")?,
                        })
                    },
                )
                .optional()?;
            Ok(row)
        })
        .unwrap_or_default()
    }

    /// Insert-or-update the student extension row; never duplicates it.
    pub fn upsert_student_profile(
        &self,
        user_id: i64,
        profile: &StudentProfileInput,
    ) -> Result<(), DbError> {
        self.with_tx(|tx| {
            require_role(tx, user_id, Role::Student)?;
            write_student_profile(tx, user_id, profile)
        })
    }

    /// Insert-or-update the mentor extension row. Leaves the admin
    /// verification flag alone.
    pub fn upsert_mentor_profile(
        &self,
        user_id: i64,
        profile: &MentorProfileInput,
    ) -> Result<(), DbError> {
        self.with_tx(|tx| {
            require_role(tx, user_id, Role::Mentor)?;
            write_mentor_profile(tx, user_id, profile)
        })
    }

    /// Admin-verified, active mentors for the mentor directory.
    pub fn list_mentors(&self, limit: Option<u32>) -> Vec<MentorListing> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT u.id, u.name, u.avatar, u.bio, m.company, m.position, m.expertise
                 FROM mentors m
                 JOIN users u ON u.id = m.user_id
                 WHERE m.verified_by_admin = 1 AND u.status = 'active'
                 ORDER BY u.name
                 LIMIT ?1",
            )?;
            let rows = stmt
                .query_map([clamp_limit(limit)], |row| {
                    Ok(MentorListing {
                        user_id: row.get(0)?,
                        name: row.get(1)?,
                        avatar: row.get(2)?,
                        bio: row.get(3)?,
                        company: row.get(4)?,
                        position: row.get(5)?,
                        expertise: row.get(6)?,
                    })
                })?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
        .unwrap_or_default()
    }

    // -- Verification moderation --

    /// Approve or reject an account. Approval also marks the email verified,
    /// activates the account and, for mentors, sets `verified_by_admin`;
    /// rejection deactivates. Users and mentors change in one transaction.
    /// Returns `false` when the user does not exist.
    pub fn set_verification_status(
        &self,
        actor: &Actor,
        user_id: i64,
        status: VerificationStatus,
    ) -> Result<bool, DbError> {
        if !actor.is_admin() {
            return Err(DbError::validation("Only administrators can verify accounts"));
        }
        let (account, email_verified, mentor_flag) = match status {
            VerificationStatus::Approved => (AccountStatus::Active, true, true),
            VerificationStatus::Rejected => (AccountStatus::Inactive, false, false),
            VerificationStatus::Pending => {
                return Err(DbError::validation("Accounts can only be approved or rejected"));
            }
        };

        let updated = self.with_tx(|tx| {
            let role: Option<Role> = tx
                .query_row("SELECT role FROM users WHERE id = ?1", [user_id], |row| {
                    text_enum(row, "role")
                })
                .optional()?;
            let Some(role) = role else {
                return Ok(false);
            };

            tx.execute(
                "UPDATE users
                 SET verification_status = ?1,
                     status = ?2,
                     is_email_verified = CASE WHEN ?3 THEN 1 ELSE is_email_verified END,
                     updated_at = datetime('now')
                 WHERE id = ?4",
                params![status.as_str(), account.as_str(), email_verified, user_id],
            )?;

            if role == Role::Mentor {
                tx.execute(
                    "UPDATE mentors SET verified_by_admin = ?1 WHERE user_id = ?2",
                    params![mentor_flag, user_id],
                )?;
            }
            Ok(true)
        })?;

        if updated {
            info!("User {} {} by admin {}", user_id, status, actor.user_id);
        }
        Ok(updated)
    }
}

fn insert_user(conn: &Connection, user: &NewUser) -> Result<i64, DbError> {
    conn.execute(
        "INSERT INTO users (name, email, password_hash, role, status, is_email_verified, verification_status)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            user.name,
            user.email.trim(),
            user.password_hash,
            user.role.as_str(),
            user.status.as_str(),
            user.is_email_verified,
            user.verification_status.as_str(),
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

fn write_student_profile(
    conn: &Connection,
    user_id: i64,
    profile: &StudentProfileInput,
) -> Result<(), DbError> {
    conn.execute(
        "INSERT INTO students (user_id, roll_number, branch, year, college_id_path)
         VALUES (?1, ?2, ?3, ?4, ?5)
         ON CONFLICT(user_id) DO UPDATE SET
             roll_number = excluded.roll_number,
             branch = excluded.branch,
             year = excluded.year,
             college_id_path = COALESCE(excluded.college_id_path, students.college_id_path)",
        params![
            user_id,
            profile.roll_number.trim(),
            profile.branch,
            profile.year,
            profile.college_id_path,
        ],
    )?;
    Ok(())
}

fn write_mentor_profile(
    conn: &Connection,
    user_id: i64,
    profile: &MentorProfileInput,
) -> Result<(), DbError> {
    conn.execute(
        "INSERT INTO mentors (user_id, company, position, expertise, job_id_path)
         VALUES (?1, ?2, ?3, ?4, ?5)
         ON CONFLICT(user_id) DO UPDATE SET
             company = excluded.company,
             position = excluded.position,
             expertise = excluded.expertise,
             job_id_path = COALESCE(excluded.job_id_path, mentors.job_id_path)",
        params![
            user_id,
            profile.company,
            profile.position,
            profile.expertise,
            profile.job_id_path,
        ],
    )?;
    Ok(())
}

fn require_role(conn: &Connection, user_id: i64, expected: Role) -> Result<(), DbError> {
    let role: Option<Role> = conn
        .query_row("SELECT role FROM users WHERE id = ?1", [user_id], |row| {
            text_enum(row, "role")
        })
        .optional()?;
    match role {
        Some(role) if role == expected => Ok(()),
        Some(_) => Err(DbError::validation(format!("User is not a {}", expected))),
        None => Err(DbError::validation("User not found")),
    }
}

fn query_user(
    conn: &Connection,
    cols: &ColumnSet,
    predicate: &str,
    value: &dyn ToSql,
) -> Result<Option<UserRow>, DbError> {
    let sql = format!("SELECT {} FROM users u WHERE {}", cols.user_projection("u"), predicate);
    let row = conn.query_row(&sql, [value], map_user).optional()?;
    Ok(row)
}

pub(crate) fn map_user(row: &Row<'_>) -> rusqlite::Result<UserRow> {
    Ok(UserRow {
        id: row.get("id")?,
        name: row.get("name")?,
        email: row.get("email")?,
        password_hash: row.get("password_hash")?,
        role: text_enum(row, "role")?,
        status: text_enum(row, "status")?,
        is_email_verified: row.get("is_email_verified")?,
        verification_status: text_enum(row, "verification_status")?,
        avatar: row.get("avatar")?,
        bio: row.get("bio")?,
        phone: row.get("phone")?,
        location: row.get("location")?,
        skills: row.get("skills")?,
        interests: row.get("interests")?,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{add_admin, add_mentor, add_student, fresh_db, legacy_db};

    #[test]
    fn registration_creates_user_and_profile() {
        let (_dir, db) = fresh_db();
        let id = add_student(&db, "Sam Student", "CS-001");

        let user = db.get_user_by_id(id).unwrap();
        assert_eq!(user.role, Role::Student);
        assert_eq!(user.verification_status, VerificationStatus::Pending);
        assert!(!user.can_authenticate());

        let profile = db.get_student_profile(id).unwrap();
        assert_eq!(profile.roll_number, "CS-001");
        assert!(db.get_mentor_profile(id).is_none());
    }

    #[test]
    fn email_lookup_ignores_case() {
        let (_dir, db) = fresh_db();
        let id = add_student(&db, "Sam Student", "CS-001");
        let user = db.get_user_by_email("SAM.STUDENT@students.test").unwrap();
        assert_eq!(user.id, id);
        assert!(db.get_user_by_email("nobody@students.test").is_none());
    }

    #[test]
    fn duplicate_email_is_reported_precisely() {
        let (_dir, db) = fresh_db();
        add_student(&db, "Sam Student", "CS-001");

        let err = db
            .register_student(
                &NewUser::new("Other Sam", "Sam.Student@students.test", "hash", Role::Student),
                &StudentProfileInput {
                    roll_number: "CS-002".to_string(),
                    ..Default::default()
                },
            )
            .unwrap_err();
        assert_eq!(err.to_string(), "Email already exists");
    }

    #[test]
    fn duplicate_roll_number_rolls_back_the_user() {
        let (_dir, db) = fresh_db();
        add_student(&db, "Sam Student", "CS-001");

        let err = db
            .register_student(
                &NewUser::new("Kim", "kim@students.test", "hash", Role::Student),
                &StudentProfileInput {
                    roll_number: "CS-001".to_string(),
                    ..Default::default()
                },
            )
            .unwrap_err();
        assert_eq!(err.to_string(), "Roll number already exists");
        assert!(db.get_user_by_email("kim@students.test").is_none());
    }

    #[test]
    fn profile_upsert_updates_in_place() {
        let (_dir, db) = fresh_db();
        let id = add_student(&db, "Sam Student", "CS-001");

        db.upsert_student_profile(
            id,
            &StudentProfileInput {
                roll_number: "CS-001".to_string(),
                branch: Some("ECE".to_string()),
                year: Some(4),
                college_id_path: Some("uploads/ids/sam.png".to_string()),
            },
        )
        .unwrap();

        let count: i64 = db
            .with_conn(|conn| {
                Ok(conn.query_row("SELECT COUNT(*) FROM students WHERE user_id = ?1", [id], |r| r.get(0))?)
            })
            .unwrap();
        assert_eq!(count, 1);

        let profile = db.get_student_profile(id).unwrap();
        assert_eq!(profile.branch.as_deref(), Some("ECE"));
        assert_eq!(profile.year, Some(4));
        assert_eq!(profile.college_id_path.as_deref(), Some("uploads/ids/sam.png"));
    }

    #[test]
    fn profile_upsert_checks_role() {
        let (_dir, db) = fresh_db();
        let mentor = add_mentor(&db, "Maya Mentor");
        let err = db
            .upsert_student_profile(
                mentor,
                &StudentProfileInput {
                    roll_number: "X".to_string(),
                    ..Default::default()
                },
            )
            .unwrap_err();
        assert_eq!(err.to_string(), "User is not a student");
        assert!(db.upsert_mentor_profile(9_999, &MentorProfileInput::default()).is_err());
    }

    #[test]
    fn approving_a_mentor_cascades() {
        let (_dir, db) = fresh_db();
        let admin = add_admin(&db);
        let mentor = add_mentor(&db, "Maya Mentor");

        assert!(db
            .set_verification_status(&admin, mentor, VerificationStatus::Approved)
            .unwrap());

        let user = db.get_user_by_id(mentor).unwrap();
        assert_eq!(user.status, AccountStatus::Active);
        assert_eq!(user.verification_status, VerificationStatus::Approved);
        assert!(user.is_email_verified);
        assert!(user.can_authenticate());
        assert!(db.get_mentor_profile(mentor).unwrap().verified_by_admin);
        assert_eq!(db.list_mentors(None).len(), 1);
    }

    #[test]
    fn cascade_failure_leaves_nothing_half_applied() {
        let (_dir, db) = fresh_db();
        let admin = add_admin(&db);
        let mentor = add_mentor(&db, "Maya Mentor");

        db.with_conn(|conn| {
            conn.execute_batch(
                "CREATE TRIGGER fail_mentor_flag BEFORE UPDATE ON mentors
                 BEGIN SELECT RAISE(ABORT, 'simulated failure'); END;",
            )?;
            Ok(())
        })
        .unwrap();

        let result = db.set_verification_status(&admin, mentor, VerificationStatus::Approved);
        assert!(result.is_err());

        let user = db.get_user_by_id(mentor).unwrap();
        assert_eq!(user.status, AccountStatus::Inactive);
        assert_eq!(user.verification_status, VerificationStatus::Pending);
        assert!(!user.is_email_verified);
        assert!(!db.get_mentor_profile(mentor).unwrap().verified_by_admin);
    }

    #[test]
    fn rejection_deactivates() {
        let (_dir, db) = fresh_db();
        let admin = add_admin(&db);
        let mentor = add_mentor(&db, "Maya Mentor");
        db.set_verification_status(&admin, mentor, VerificationStatus::Approved)
            .unwrap();
        db.set_verification_status(&admin, mentor, VerificationStatus::Rejected)
            .unwrap();

        let user = db.get_user_by_id(mentor).unwrap();
        assert_eq!(user.status, AccountStatus::Inactive);
        assert_eq!(user.verification_status, VerificationStatus::Rejected);
        assert!(!db.get_mentor_profile(mentor).unwrap().verified_by_admin);
        assert!(db.list_mentors(None).is_empty());
    }

    #[test]
    fn verification_requires_admin_and_existing_user() {
        let (_dir, db) = fresh_db();
        let admin = add_admin(&db);
        let student = add_student(&db, "Sam Student", "CS-001");
        let mentor = add_mentor(&db, "Maya Mentor");

        let as_mentor = Actor::new(mentor, Role::Mentor);
        assert!(db
            .set_verification_status(&as_mentor, student, VerificationStatus::Approved)
            .is_err());
        assert!(!db
            .set_verification_status(&admin, 4_242, VerificationStatus::Approved)
            .unwrap());
        assert!(db
            .set_verification_status(&admin, student, VerificationStatus::Pending)
            .is_err());
    }

    #[test]
    fn list_users_filters_by_role_and_status() {
        let (_dir, db) = fresh_db();
        add_admin(&db);
        add_student(&db, "Sam Student", "CS-001");
        add_mentor(&db, "Maya Mentor");

        let pending = db.list_users(&UserFilter {
            verification_status: Some(VerificationStatus::Pending),
            ..Default::default()
        });
        assert_eq!(pending.len(), 2);

        let mentors = db.list_users(&UserFilter {
            role: Some(Role::Mentor),
            ..Default::default()
        });
        assert_eq!(mentors.len(), 1);
        assert_eq!(mentors[0].name, "Maya Mentor");
    }

    #[test]
    fn optional_profile_fields_follow_the_schema() {
        let (_dir, db) = fresh_db();
        let id = add_student(&db, "Sam Student", "CS-001");
        let update = UserProfileUpdate {
            bio: Some("Learning Rust".to_string()),
            phone: Some("+1 555 0100".to_string()),
            ..Default::default()
        };
        assert!(db.update_user_profile(id, &update).unwrap());
        let user = db.get_user_by_id(id).unwrap();
        assert_eq!(user.phone.as_deref(), Some("+1 555 0100"));
        assert!(user.updated_at.is_some());

        let (_legacy_dir, legacy) = legacy_db();
        let id = add_student(&legacy, "Sam Student", "CS-001");
        assert!(legacy.update_user_profile(id, &update).unwrap());
        let user = legacy.get_user_by_id(id).unwrap();
        assert_eq!(user.bio.as_deref(), Some("Learning Rust"));
        assert_eq!(user.phone, None);
    }

    #[test]
    fn deleting_a_user_removes_the_profile() {
        let (_dir, db) = fresh_db();
        let id = add_student(&db, "Sam Student", "CS-001");
        assert!(db.delete_user(id).unwrap());
        assert!(!db.delete_user(id).unwrap());
        assert!(db.get_student_profile(id).is_none());
    }
}
