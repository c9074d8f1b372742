use mentorlink_types::models::{Actor, Role};
use tempfile::TempDir;

use crate::models::{MentorProfileInput, NewUser, StudentProfileInput};
use crate::{Database, DbConfig};

pub(crate) fn open_in(dir: &TempDir, evolve: bool) -> Database {
    let mut config = DbConfig::new(dir.path().join("mentorlink.db"));
    config.auto_evolve = evolve;
    Database::open(&config).unwrap()
}

/// Database that evolves to the current schema on first use.
pub(crate) fn fresh_db() -> (TempDir, Database) {
    let dir = tempfile::tempdir().unwrap();
    let db = open_in(&dir, true);
    (dir, db)
}

/// Database pinned to the baseline schema: optional columns stay absent.
pub(crate) fn legacy_db() -> (TempDir, Database) {
    let dir = tempfile::tempdir().unwrap();
    let db = open_in(&dir, false);
    (dir, db)
}

pub(crate) fn add_admin(db: &Database) -> Actor {
    let id = db
        .create_user(&NewUser::admin("Ada Admin", "admin@mentorlink.test", "hash"))
        .unwrap();
    Actor::new(id, Role::Admin)
}

pub(crate) fn add_student(db: &Database, name: &str, roll_number: &str) -> i64 {
    let email = format!("{}@students.test", name.to_lowercase().replace(' ', "."));
    db.register_student(
        &NewUser::new(name, &email, "hash", Role::Student),
        &StudentProfileInput {
            roll_number: roll_number.to_string(),
            branch: Some("CSE".to_string()),
            year: Some(3),
            college_id_path: None,
        },
    )
    .unwrap()
}

pub(crate) fn add_mentor(db: &Database, name: &str) -> i64 {
    let email = format!("{}@mentors.test", name.to_lowercase().replace(' ', "."));
    db.register_mentor(
        &NewUser::new(name, &email, "hash", Role::Mentor),
        &MentorProfileInput {
            company: Some("Initech".to_string()),
            position: Some("Staff Engineer".to_string()),
            expertise: Some("Distributed systems".to_string()),
            job_id_path: None,
        },
    )
    .unwrap()
}
