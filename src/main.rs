use std::sync::Arc;

use anyhow::Result;
use clap::{ArgGroup, Parser, Subcommand};
use tracing::info;

use rentops::schedule::handlers::generate_rents::{GenerateRentsHandler, InMemoryRentLedger};
use rentops::schedule::{
    build_scheduler, seed, EngineError, Execution, HandlerRegistry, TaskExecutor, TaskScheduler,
    TaskType,
};
use rentops::storage::task::sqlite::SqliteTaskStorage;
use rentops::storage::task::TaskStorage;
use rentops::storage::Pagination;
use rentops::utils::logger;
use rentops::SQLITE_PATH;

#[derive(Parser)]
#[command(
    name = "rentops",
    version = env!("GIT_HASH"),
    about = "Rental back-office scheduled task engine"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the missing task rows, one per known task type
    Init,
    /// Execute every due task once and report the aggregate result
    RunDueTasks,
    /// Force-execute a single task by id or type
    #[command(group(ArgGroup::new("target").required(true).args(["id", "task_type"])))]
    RunTask {
        #[arg(long)]
        id: Option<i64>,
        #[arg(long = "type", value_name = "TYPE")]
        task_type: Option<String>,
    },
    /// List task rows
    ListTasks {
        #[arg(long, default_value_t = 1)]
        page: u64,
        #[arg(long, default_value_t = 50)]
        size: u64,
    },
    /// Show task counts by status
    Stats,
}

#[tokio::main]
async fn main() -> Result<()> {
    rentops::init_env();
    let _guard = logger::init("./logs".to_string())?;
    let cli = Cli::parse();

    let storage: Arc<dyn TaskStorage> = Arc::new(SqliteTaskStorage::new(&SQLITE_PATH).await?);

    // Handlers are owned by the business modules; deployments register their
    // real collaborators here. The demo ledger keeps the binary runnable
    // standalone.
    let mut registry = HandlerRegistry::new();
    registry.register(Box::new(GenerateRentsHandler::new(Arc::new(
        InMemoryRentLedger::new(Vec::new()),
    ))));
    let registry = Arc::new(registry);

    let (executor, scheduler) = build_scheduler(storage.clone(), registry);

    if let Err(e) = run(cli.command, &storage, &executor, &scheduler).await {
        // store-unavailable is a process-level fault: exit and rely on the
        // next scheduled invocation for a fresh connection
        if e.is_store_unavailable() {
            eprintln!("task store unavailable: {}", e);
            std::process::exit(2);
        }
        return Err(e.into());
    }

    info!("Done");
    Ok(())
}

async fn run(
    command: Commands,
    storage: &Arc<dyn TaskStorage>,
    executor: &Arc<TaskExecutor>,
    scheduler: &TaskScheduler,
) -> Result<(), EngineError> {
    match command {
        Commands::Init => {
            let created = seed::seed_missing(storage).await?;
            println!("Seeded {} task(s)", created);
        }
        Commands::RunDueTasks => {
            let batch = scheduler.run_due_tasks().await?;
            println!("{} executed, {} failed", batch.executed, batch.failed);
            for error in &batch.errors {
                println!("  {}", error);
            }
        }
        Commands::RunTask { id, task_type } => {
            let task_id = match (id, task_type) {
                (Some(id), _) => id,
                (None, Some(raw)) => {
                    let task_type: TaskType = raw
                        .parse()
                        .map_err(|_| EngineError::UnknownTaskType(raw.clone()))?;
                    storage
                        .get_by_type(task_type.as_str())
                        .await?
                        .ok_or(EngineError::NoTaskOfType(raw))?
                        .id
                }
                (None, None) => unreachable!("clap enforces the target group"),
            };

            match executor.force_execute_task(task_id).await? {
                Execution::Succeeded { message } => {
                    println!("Task {} succeeded: {}", task_id, message.unwrap_or_default());
                }
                Execution::Failed { error } => {
                    println!("Task {} failed: {}", task_id, error);
                }
                Execution::Skipped => {
                    println!("Task {} skipped (not claimable)", task_id);
                }
            }
        }
        Commands::ListTasks { page, size } => {
            let pagination = Pagination { index: page, size };
            for r in storage.list(&pagination).await? {
                println!(
                    "{:>4}  {:<28} {:<9} {:<10} runs={} ok={} ko={} next={}",
                    r.id,
                    r.task_type,
                    r.status,
                    r.frequency,
                    r.run_count,
                    r.success_count,
                    r.failure_count,
                    r.next_run_at
                        .map(|t| t.to_rfc3339())
                        .unwrap_or_else(|| "-".to_string()),
                );
            }
        }
        Commands::Stats => {
            let stats = scheduler.task_statistics().await?;
            println!(
                "inactive={} active={} running={} completed={} failed={} total={}",
                stats.inactive,
                stats.active,
                stats.running,
                stats.completed,
                stats.failed,
                stats.total()
            );
        }
    }
    Ok(())
}
