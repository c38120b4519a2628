//! Scheduler supervisor CLI: `-r/--repo`, `-d/--jobs-dir`, `-v/--verbose`,
//! `-f/--force-sync`, `-h/--help`.

use clap::Parser;
use gitjob_supervisor::{Scheduler, SupervisorConfig};

/// GitOps-driven cron supervisor: syncs a job repository and runs its jobs
/// on schedule.
#[derive(Debug, Parser)]
#[command(name = "gitjob-supervisor", version, about)]
struct Cli {
    /// Remote repository URL to keep the jobs directory synchronized with.
    #[arg(short = 'r', long = "repo")]
    repo: String,

    /// Directory the repository is cloned/pulled into.
    #[arg(short = 'd', long = "jobs-dir", default_value = gitjob_supervisor::config::DEFAULT_JOBS_DIR)]
    jobs_dir: std::path::PathBuf,

    /// Lower the log level floor to debug.
    #[arg(short = 'v', long = "verbose")]
    verbose: bool,

    /// Perform one sync + reload immediately, then exit rather than running
    /// the dispatcher.
    #[arg(short = 'f', long = "force-sync")]
    force_sync: bool,
}

/// `clap::Parser::parse()` exits with code 2 on a usage error, but spec §6
/// documents "missing required operands / unknown command → exit 1" for
/// this CLI's surface. Parse manually so usage errors honor that contract
/// while `--help`/`--version` still exit 0.
fn parse_args() -> Cli {
    match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            let code = match e.kind() {
                clap::error::ErrorKind::DisplayHelp | clap::error::ErrorKind::DisplayVersion => 0,
                _ => 1,
            };
            std::process::exit(code);
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = parse_args();
    gitjob_supervisor::logging::init(cli.verbose);

    let config = SupervisorConfig::new(cli.repo, cli.jobs_dir, cli.verbose, cli.force_sync);

    let scheduler = Scheduler::new(
        config.repo_url,
        config.jobs_dir,
        config.history_path,
        config.secrets_file,
        config.key_file,
        config.interpreter,
        config.sync_interval,
    )
    .await?;

    if config.force_sync {
        scheduler.force_sync().await?;
        tracing::info!("Force sync complete");
        return Ok(());
    }

    scheduler.start().await?;
    Ok(())
}
