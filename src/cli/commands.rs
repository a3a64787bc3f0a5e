use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(name = "td", about = concat!("td v", env!("CARGO_PKG_VERSION"), " - tasks, with five seconds to change your mind"), version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Output as JSON
    #[arg(long, global = true)]
    pub json: bool,

    /// Use a different data directory
    #[arg(short = 'D', long = "data-dir", global = true)]
    pub data_dir: Option<PathBuf>,

    /// More logging (repeatable)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Less logging (repeatable)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub quiet: u8,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Create an account and log in
    Register(RegisterArgs),
    /// Log in
    Login(LoginArgs),
    /// Log out
    Logout,
    /// Show the logged-in user
    Whoami,
    /// Add a task
    Add(AddArgs),
    /// List tasks on the pending or completed tab
    List(ListArgs),
    /// Show task details
    Show(IdArgs),
    /// Mark a task completed (commits after the grace period)
    Done(IdArgs),
    /// Mark a completed task pending again
    Undone(IdArgs),
    /// Edit a task
    Edit(EditArgs),
    /// Delete a task
    Rm(IdArgs),
    /// Show pending and completed counts
    Stats,
}

// ---------------------------------------------------------------------------
// Session args
// ---------------------------------------------------------------------------

#[derive(Args)]
pub struct RegisterArgs {
    /// Display name
    pub name: String,
    /// Email address (must be unused)
    pub email: String,
    #[arg(long)]
    pub password: String,
}

#[derive(Args)]
pub struct LoginArgs {
    pub email: String,
    #[arg(long)]
    pub password: String,
}

// ---------------------------------------------------------------------------
// Task args
// ---------------------------------------------------------------------------

#[derive(Args)]
pub struct AddArgs {
    /// Task title
    pub title: String,
    /// Longer description
    #[arg(short, long)]
    pub description: Option<String>,
    /// Due date: YYYY-MM-DD, today or tomorrow (time defaults to 23:59)
    #[arg(long)]
    pub date: Option<String>,
    /// Due time: HH:MM or h:mm am/pm (date defaults to today)
    #[arg(long)]
    pub time: Option<String>,
}

#[derive(Args)]
pub struct ListArgs {
    /// Tab to show: pending or completed
    #[arg(long, default_value = "pending")]
    pub tab: String,
}

#[derive(Args)]
pub struct IdArgs {
    /// Task ID
    pub id: i64,
}

#[derive(Args)]
pub struct EditArgs {
    /// Task ID
    pub id: i64,
    /// New title
    #[arg(long)]
    pub title: Option<String>,
    /// New description
    #[arg(short, long)]
    pub description: Option<String>,
    /// New due date (YYYY-MM-DD, today or tomorrow)
    #[arg(long)]
    pub date: Option<String>,
    /// New due time (HH:MM or h:mm am/pm)
    #[arg(long)]
    pub time: Option<String>,
    /// Remove the due date
    #[arg(long, conflicts_with_all = ["date", "time"])]
    pub clear_due: bool,
}
