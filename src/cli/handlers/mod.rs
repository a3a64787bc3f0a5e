use std::path::{Path, PathBuf};

use chrono::Local;
use tracing::debug;

use crate::cli::commands::*;
use crate::cli::output::*;
use crate::io::config_io;
use crate::io::lock::DataLock;
use crate::io::store::{FileStore, Persistence};
use crate::model::config::AppConfig;
use crate::model::task::{NewTask, TaskPatch, TaskStatus};
use crate::ops::dashboard::{Dashboard, Tab, UpdateOutcome};
use crate::ops::due;
use crate::ops::scheduler::{CompletionScheduler, shared};
use crate::ops::session::{AuthError, Session};
use crate::ops::task_repo::TaskRepository;

type CmdResult = Result<(), Box<dyn std::error::Error>>;

// ---------------------------------------------------------------------------
// Dispatch
// ---------------------------------------------------------------------------

pub async fn dispatch(cli: Cli) -> CmdResult {
    let json = cli.json;
    let ctx = Context::open(cli.data_dir.as_deref())?;

    match cli.command {
        // Session
        Commands::Register(args) => cmd_register(&ctx, args, json).await,
        Commands::Login(args) => cmd_login(&ctx, args, json).await,
        Commands::Logout => cmd_logout(&ctx),
        Commands::Whoami => cmd_whoami(&ctx, json),

        // Read commands
        Commands::List(args) => cmd_list(&ctx, args, json),
        Commands::Show(args) => cmd_show(&ctx, args, json),
        Commands::Stats => cmd_stats(&ctx, json),

        // Write commands
        Commands::Add(args) => cmd_add(&ctx, args, json),
        Commands::Done(args) => cmd_done(&ctx, args, json).await,
        Commands::Undone(args) => cmd_undone(&ctx, args, json),
        Commands::Edit(args) => cmd_edit(&ctx, args, json),
        Commands::Rm(args) => cmd_rm(&ctx, args, json),
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Everything a command needs from the data directory
struct Context {
    data_dir: PathBuf,
    persistence: Persistence,
    config: AppConfig,
}

impl Context {
    fn open(data_dir_override: Option<&Path>) -> Result<Self, Box<dyn std::error::Error>> {
        let data_dir = config_io::data_dir(data_dir_override);
        let store = FileStore::open(&data_dir).map_err(|e| {
            format!(
                "cannot open data directory {}: {}",
                data_dir.display(),
                e
            )
        })?;
        let config = config_io::read_config(&data_dir)?;
        debug!(data_dir = %data_dir.display(), "data directory opened");
        Ok(Context {
            data_dir,
            persistence: Persistence::new(std::sync::Arc::new(store)),
            config,
        })
    }

    fn session(&self) -> Session {
        Session::init(self.persistence.clone(), self.config.timing.auth_delay())
    }

    /// Dashboard for the logged-in user, over a freshly loaded repository
    fn dashboard(&self) -> Result<Dashboard, AuthError> {
        let user = self.session().require_user()?.clone();
        let repo = TaskRepository::open(self.persistence.clone());
        let scheduler = CompletionScheduler::with_data_lock(
            shared(repo),
            self.config.timing.grace_period(),
            &self.data_dir,
        );
        Ok(Dashboard::new(user, scheduler))
    }

    fn lock(&self) -> Result<DataLock, Box<dyn std::error::Error>> {
        Ok(DataLock::acquire_default(&self.data_dir)?)
    }
}

fn print_json<T: serde::Serialize>(value: &T) -> CmdResult {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn not_found(id: i64) -> Box<dyn std::error::Error> {
    format!("task not found: {}", id).into()
}

/// Parse `--date`/`--time` into a due instant in the local zone
fn parse_due(date: Option<&str>, time: Option<&str>) -> Result<Option<chrono::DateTime<chrono::Utc>>, due::DueError> {
    let now = Local::now();
    let date = date
        .map(|d| due::parse_date(d, now.date_naive()))
        .transpose()?;
    let time = time.map(due::parse_time).transpose()?;
    Ok(due::resolve_due(date, time, &now))
}

// ---------------------------------------------------------------------------
// Session commands
// ---------------------------------------------------------------------------

async fn cmd_register(ctx: &Context, args: RegisterArgs, json: bool) -> CmdResult {
    let _lock = ctx.lock()?;
    let mut session = ctx.session();
    let user = session
        .register(&args.name, &args.email, &args.password)
        .await?;
    if json {
        print_json(&user)
    } else {
        println!("Registered and logged in as {}", format_user(&user));
        Ok(())
    }
}

async fn cmd_login(ctx: &Context, args: LoginArgs, json: bool) -> CmdResult {
    let _lock = ctx.lock()?;
    let mut session = ctx.session();
    let user = session.login(&args.email, &args.password).await?;
    if json {
        print_json(&user)
    } else {
        println!("Logged in as {}", format_user(&user));
        Ok(())
    }
}

fn cmd_logout(ctx: &Context) -> CmdResult {
    let _lock = ctx.lock()?;
    ctx.session().logout()?;
    println!("Logged out");
    Ok(())
}

fn cmd_whoami(ctx: &Context, json: bool) -> CmdResult {
    let session = ctx.session();
    if json {
        return print_json(&WhoamiJson {
            user: session.current(),
        });
    }
    match session.current() {
        Some(user) => println!("{}", format_user(user)),
        None => println!("not logged in"),
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Read commands
// ---------------------------------------------------------------------------

fn cmd_list(ctx: &Context, args: ListArgs, json: bool) -> CmdResult {
    let tab: Tab = args.tab.parse()?;
    let view = ctx.dashboard()?.view(tab);
    if json {
        return print_json(&view);
    }
    for line in format_view(&view) {
        println!("{}", line);
    }
    Ok(())
}

fn cmd_show(ctx: &Context, args: IdArgs, json: bool) -> CmdResult {
    let dash = ctx.dashboard()?;
    let task = dash.task(args.id).ok_or_else(|| not_found(args.id))?;
    let completing = dash.scheduler().is_completing(task.id);
    if json {
        return print_json(&TaskDetailJson {
            task: &task,
            completing,
        });
    }
    for line in format_task_detail(&task, completing) {
        println!("{}", line);
    }
    Ok(())
}

fn cmd_stats(ctx: &Context, json: bool) -> CmdResult {
    let view = ctx.dashboard()?.view(Tab::Pending);
    if json {
        return print_json(&StatsJson {
            pending: view.pending_count,
            completed: view.completed_count,
        });
    }
    println!("{}", format_counts(view.pending_count, view.completed_count));
    Ok(())
}

// ---------------------------------------------------------------------------
// Write commands
// ---------------------------------------------------------------------------

fn cmd_add(ctx: &Context, args: AddArgs, json: bool) -> CmdResult {
    let _lock = ctx.lock()?;
    let dash = ctx.dashboard()?;
    let due_date = parse_due(args.date.as_deref(), args.time.as_deref())?;
    let created = dash.add_task(NewTask {
        title: args.title,
        description: args.description.unwrap_or_default(),
        due_date,
    })?;

    match created {
        Some(task) if json => print_json(&task),
        Some(task) => {
            println!("{}", task.id);
            Ok(())
        }
        None => {
            eprintln!("nothing added: title is empty");
            Ok(())
        }
    }
}

/// Arm the completion, then keep the process alive until it commits.
/// Interrupting the wait leaves the task pending.
async fn cmd_done(ctx: &Context, args: IdArgs, json: bool) -> CmdResult {
    let dash = ctx.dashboard()?;
    let outcome = {
        let _lock = ctx.lock()?;
        dash.update_task(args.id, TaskPatch::status(TaskStatus::Completed))?
    };

    match outcome {
        UpdateOutcome::NotFound => Err(not_found(args.id)),
        UpdateOutcome::Committed(task) => {
            if json {
                print_json(&task)
            } else {
                println!("{} is already completed", task.id);
                Ok(())
            }
        }
        UpdateOutcome::Scheduled(task) => {
            let grace = dash.scheduler().grace_period();
            if !json {
                println!(
                    "Completing {} \"{}\" in {}...",
                    task.id,
                    task.title,
                    format_grace(grace)
                );
            }
            dash.scheduler().settle().await;

            let committed = dash.task(task.id).ok_or_else(|| not_found(task.id))?;
            if json {
                print_json(&DoneJson {
                    task: &committed,
                    grace_period_ms: grace.as_millis() as u64,
                })
            } else {
                println!("Completed {}", committed.id);
                Ok(())
            }
        }
    }
}

fn cmd_undone(ctx: &Context, args: IdArgs, json: bool) -> CmdResult {
    let _lock = ctx.lock()?;
    let dash = ctx.dashboard()?;
    match dash.update_task(args.id, TaskPatch::status(TaskStatus::Pending))? {
        UpdateOutcome::Committed(task) | UpdateOutcome::Scheduled(task) => {
            if json {
                print_json(&task)
            } else {
                println!("{} is pending", task.id);
                Ok(())
            }
        }
        UpdateOutcome::NotFound => Err(not_found(args.id)),
    }
}

fn cmd_edit(ctx: &Context, args: EditArgs, json: bool) -> CmdResult {
    let due_date = if args.clear_due {
        Some(None)
    } else if args.date.is_some() || args.time.is_some() {
        Some(parse_due(args.date.as_deref(), args.time.as_deref())?)
    } else {
        None
    };
    let patch = TaskPatch {
        title: args.title,
        description: args.description,
        due_date,
        status: None,
    };
    if patch.is_empty() {
        return Err("nothing to change (see `td edit --help`)".into());
    }

    let _lock = ctx.lock()?;
    let dash = ctx.dashboard()?;
    match dash.update_task(args.id, patch)? {
        UpdateOutcome::Committed(task) | UpdateOutcome::Scheduled(task) => {
            if json {
                print_json(&task)
            } else {
                println!("Updated {}", task.id);
                Ok(())
            }
        }
        UpdateOutcome::NotFound => Err(not_found(args.id)),
    }
}

fn cmd_rm(ctx: &Context, args: IdArgs, json: bool) -> CmdResult {
    let _lock = ctx.lock()?;
    let dash = ctx.dashboard()?;
    let removed = dash.delete_task(args.id)?.ok_or_else(|| not_found(args.id))?;
    if json {
        print_json(&removed)
    } else {
        println!("Deleted {} \"{}\"", removed.id, removed.title);
        Ok(())
    }
}
