use anyhow::Context;
use clap::{Parser, Subcommand};
use serde_json::{Value, json};
use tracing::info;

use mentorlink_db::models::{BlogFilter, UserFilter};
use mentorlink_db::{Database, DbConfig, DbError};
use mentorlink_types::api::Envelope;
use mentorlink_types::models::{Actor, BlogStatus, RequestStatus, VerificationStatus};

#[derive(Parser, Debug)]
#[clap(
    name = "mentorlink",
    version = env!("CARGO_PKG_VERSION"),
    about = "Operator tool for the MentorLink datastore"
)]
struct Cli {
    #[clap(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Bring the schema up to date and report the negotiated column set
    Migrate,
    /// Accounts and blog posts awaiting moderation
    Pending {
        #[clap(long)]
        limit: Option<u32>,
    },
    ApproveUser {
        user_id: i64,
        /// Id of the acting administrator
        #[clap(long = "as")]
        admin: i64,
    },
    RejectUser {
        user_id: i64,
        #[clap(long = "as")]
        admin: i64,
    },
    PublishBlog {
        blog_id: i64,
        #[clap(long = "as")]
        admin: i64,
    },
    RejectBlog {
        blog_id: i64,
        #[clap(long = "as")]
        admin: i64,
    },
    /// Post an announcement
    Announce {
        #[clap(long = "as")]
        admin: i64,
        #[clap(long)]
        title: String,
        #[clap(long)]
        content: String,
    },
    /// Send a mentorship request, subject to the per-pair cooldown
    RequestMentorship {
        #[clap(long)]
        student: i64,
        #[clap(long)]
        mentor: i64,
        #[clap(long, default_value = "")]
        message: String,
    },
    /// Move a request to approved, rejected or completed
    SetRequestStatus {
        request_id: i64,
        status: RequestStatus,
        /// The addressed mentor, or an administrator
        #[clap(long = "as")]
        actor: i64,
    },
}

fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Logs go to stderr; stdout carries the JSON result
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "mentorlink=info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = DbConfig::from_env();
    let db = Database::open(&config)
        .with_context(|| format!("failed to open {}", config.path.display()))?;

    let output = run(&db, cli.command)?;
    println!("{}", serde_json::to_string_pretty(&output)?);

    if output.get("success") == Some(&Value::Bool(false)) {
        std::process::exit(1);
    }
    Ok(())
}

fn run(db: &Database, command: Command) -> anyhow::Result<Value> {
    match command {
        Command::Migrate => {
            let columns = *db.columns();
            info!("{} schema change(s) applied", db.schema_changes());
            Ok(json!({
                "columns": columns,
                "schemaChanges": db.schema_changes(),
            }))
        }
        Command::Pending { limit } => {
            let users = db.list_users(&UserFilter {
                verification_status: Some(VerificationStatus::Pending),
                limit,
                ..Default::default()
            });
            let blogs = db.list_blogs(&BlogFilter {
                status: Some(BlogStatus::Pending),
                limit,
                ..Default::default()
            });
            Ok(json!({ "users": users, "blogs": blogs }))
        }
        Command::ApproveUser { user_id, admin } => {
            let actor = resolve_actor(db, admin)?;
            envelope(
                db.set_verification_status(&actor, user_id, VerificationStatus::Approved)
                    .map(|hit| Envelope::from_affected(hit, "User not found")),
            )
        }
        Command::RejectUser { user_id, admin } => {
            let actor = resolve_actor(db, admin)?;
            envelope(
                db.set_verification_status(&actor, user_id, VerificationStatus::Rejected)
                    .map(|hit| Envelope::from_affected(hit, "User not found")),
            )
        }
        Command::PublishBlog { blog_id, admin } => {
            let actor = resolve_actor(db, admin)?;
            envelope(
                db.set_blog_status(&actor, blog_id, BlogStatus::Published)
                    .map(|hit| Envelope::from_affected(hit, "Blog not found")),
            )
        }
        Command::RejectBlog { blog_id, admin } => {
            let actor = resolve_actor(db, admin)?;
            envelope(
                db.set_blog_status(&actor, blog_id, BlogStatus::Rejected)
                    .map(|hit| Envelope::from_affected(hit, "Blog not found")),
            )
        }
        Command::Announce {
            admin,
            title,
            content,
        } => {
            let actor = resolve_actor(db, admin)?;
            envelope(
                db.create_announcement(&actor, &title, &content)
                    .map(Envelope::created),
            )
        }
        Command::RequestMentorship {
            student,
            mentor,
            message,
        } => envelope(
            db.create_mentorship_request(student, mentor, &message)
                .map(Envelope::from),
        ),
        Command::SetRequestStatus {
            request_id,
            status,
            actor,
        } => {
            let actor = resolve_actor(db, actor)?;
            envelope(
                db.update_mentorship_request_status(&actor, request_id, status)
                    .map(|hit| {
                        Envelope::from_affected(hit, "Request not found or cannot be updated")
                    }),
            )
        }
    }
}

fn resolve_actor(db: &Database, user_id: i64) -> anyhow::Result<Actor> {
    db.get_user_by_id(user_id)
        .map(|user| user.actor())
        .with_context(|| format!("user {} not found", user_id))
}

fn envelope(result: Result<Envelope, DbError>) -> anyhow::Result<Value> {
    let envelope = result.unwrap_or_else(Envelope::from);
    Ok(serde_json::to_value(envelope)?)
}
