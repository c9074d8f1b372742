//! Database row types and write inputs.
//! Row types map one SQLite row (plus joined display names and read-time
//! derived fields); they are what repository reads hand back to callers.

use mentorlink_types::models::{
    AccountStatus, Actor, BlogStatus, RequestStatus, Role, VerificationStatus,
};
use serde::Serialize;

// -- Users and profiles --

#[derive(Debug, Clone, Serialize)]
pub struct UserRow {
    pub id: i64,
    pub name: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub role: Role,
    pub status: AccountStatus,
    pub is_email_verified: bool,
    pub verification_status: VerificationStatus,
    pub avatar: Option<String>,
    pub bio: Option<String>,
    pub phone: Option<String>,
    pub location: Option<String>,
    pub skills: Option<String>,
    pub interests: Option<String>,
    pub created_at: String,
    pub updated_at: Option<String>,
}

impl UserRow {
    pub fn actor(&self) -> Actor {
        Actor::new(self.id, self.role)
    }

    /// The three flags the login collaborator requires together.
    pub fn can_authenticate(&self) -> bool {
        self.status == AccountStatus::Active
            && self.verification_status == VerificationStatus::Approved
            && self.is_email_verified
    }
}

#[derive(Debug, Clone)]
pub struct NewUser {
    pub name: String,
    pub email: String,
    pub password_hash: String,
    pub role: Role,
    pub status: AccountStatus,
    pub verification_status: VerificationStatus,
    pub is_email_verified: bool,
}

impl NewUser {
    /// A self-registered account: inactive and unverified until an admin
    /// approves it.
    pub fn new(name: &str, email: &str, password_hash: &str, role: Role) -> Self {
        Self {
            name: name.to_string(),
            email: email.to_string(),
            password_hash: password_hash.to_string(),
            role,
            status: AccountStatus::Inactive,
            verification_status: VerificationStatus::Pending,
            is_email_verified: false,
        }
    }

    /// An operator-provisioned administrator, usable immediately.
    pub fn admin(name: &str, email: &str, password_hash: &str) -> Self {
        Self {
            status: AccountStatus::Active,
            verification_status: VerificationStatus::Approved,
            is_email_verified: true,
            ..Self::new(name, email, password_hash, Role::Admin)
        }
    }
}

/// Profile edit; `None` leaves a field unchanged. Optional-column fields are
/// skipped on schemas that lack them.
#[derive(Debug, Clone, Default)]
pub struct UserProfileUpdate {
    pub name: Option<String>,
    pub bio: Option<String>,
    pub avatar: Option<String>,
    pub phone: Option<String>,
    pub location: Option<String>,
    pub skills: Option<String>,
    pub interests: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct UserFilter {
    pub role: Option<Role>,
    pub status: Option<AccountStatus>,
    pub verification_status: Option<VerificationStatus>,
    pub limit: Option<u32>,
}

#[derive(Debug, Clone, Serialize)]
pub struct StudentProfileRow {
    pub user_id: i64,
    pub roll_number: String,
    pub branch: Option<String>,
    pub year: Option<i64>,
    pub college_id_path: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct StudentProfileInput {
    pub roll_number: String,
    pub branch: Option<String>,
    pub year: Option<i64>,
    /// Opaque path handed over by the upload collaborator.
    pub college_id_path: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MentorProfileRow {
    pub user_id: i64,
    pub company: Option<String>,
    pub position: Option<String>,
    pub expertise: Option<String>,
    pub job_id_path: Option<String>,
    pub verified_by_admin: bool,
}

#[derive(Debug, Clone, Default)]
pub struct MentorProfileInput {
    pub company: Option<String>,
    pub position: Option<String>,
    pub expertise: Option<String>,
    pub job_id_path: Option<String>,
}

/// A verified mentor as shown in the mentor directory.
#[derive(Debug, Clone, Serialize)]
pub struct MentorListing {
    pub user_id: i64,
    pub name: String,
    pub avatar: Option<String>,
    pub bio: Option<String>,
    pub company: Option<String>,
    pub position: Option<String>,
    pub expertise: Option<String>,
}

// -- Blogs --

#[derive(Debug, Clone, Serialize)]
pub struct BlogRow {
    pub id: i64,
    pub title: String,
    pub content: String,
    pub excerpt: Option<String>,
    pub category: Option<String>,
    pub author_id: i64,
    pub author_name: Option<String>,
    pub status: BlogStatus,
    pub views: i64,
    pub approved_at: Option<String>,
    pub approved_by: Option<i64>,
    pub created_at: String,
    pub updated_at: Option<String>,
    pub read_time_minutes: u32,
    pub created_ago: String,
}

#[derive(Debug, Clone)]
pub struct NewBlog {
    pub title: String,
    pub content: String,
    /// Derived from `content` when not supplied.
    pub excerpt: Option<String>,
    pub category: Option<String>,
    pub author_id: i64,
}

#[derive(Debug, Clone, Default)]
pub struct BlogUpdate {
    pub title: Option<String>,
    pub content: Option<String>,
    pub excerpt: Option<String>,
    pub category: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct BlogFilter {
    pub status: Option<BlogStatus>,
    pub author_id: Option<i64>,
    pub category: Option<String>,
    pub limit: Option<u32>,
}

// -- Questions and answers --

#[derive(Debug, Clone, Serialize)]
pub struct QuestionRow {
    pub id: i64,
    pub title: String,
    pub content: String,
    pub author_id: i64,
    pub author_name: Option<String>,
    pub views: i64,
    pub answers_count: i64,
    pub has_verified_answer: bool,
    pub created_at: String,
    pub created_ago: String,
}

#[derive(Debug, Clone, Default)]
pub struct QuestionFilter {
    pub author_id: Option<i64>,
    pub unanswered_only: bool,
    pub limit: Option<u32>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AnswerRow {
    pub id: i64,
    pub question_id: i64,
    pub author_id: i64,
    pub author_name: Option<String>,
    pub author_role: Option<Role>,
    pub content: String,
    pub is_verified: bool,
    pub created_at: String,
    pub created_ago: String,
}

// -- Mentorship --

#[derive(Debug, Clone, Serialize)]
pub struct MentorshipRequestRow {
    pub id: i64,
    pub student_id: i64,
    pub student_name: Option<String>,
    pub mentor_id: i64,
    pub mentor_name: Option<String>,
    pub status: RequestStatus,
    pub message: Option<String>,
    pub created_at: String,
    pub created_ago: String,
}

#[derive(Debug, Clone, Default)]
pub struct RequestFilter {
    pub student_id: Option<i64>,
    pub mentor_id: Option<i64>,
    pub status: Option<RequestStatus>,
    pub limit: Option<u32>,
}

// -- Announcements and messages --

#[derive(Debug, Clone, Serialize)]
pub struct AnnouncementRow {
    pub id: i64,
    pub title: String,
    pub content: String,
    pub created_by: i64,
    pub author_name: Option<String>,
    pub created_at: String,
    pub created_ago: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct MessageRow {
    pub id: i64,
    pub request_id: i64,
    pub sender_id: i64,
    pub sender_name: Option<String>,
    pub sender_role: Option<Role>,
    pub receiver_id: i64,
    pub message: String,
    pub created_at: String,
}
