// ABOUTME: Entry point for the caravel CLI application.
// ABOUTME: Parses arguments and dispatches to appropriate command handlers.

mod cli;

use caravel::compose::{ComposeOps, DockerCompose};
use caravel::config::Config;
use caravel::deploy::{Adapters, Runner, RunnerOptions};
use caravel::error::{Error, Result};
use caravel::git::GitCli;
use caravel::notify::Shoutrrr;
use caravel::poller::Poller;
use caravel::queue::{ConcurrencyPolicy, DeployQueue, QueueError, TriggerReason};
use caravel::secrets::SopsCli;
use caravel::store::{DeploymentStatus, DeploymentStore, Registry};
use caravel::types::{DeploymentId, RepoName};
use clap::Parser;
use cli::{Cli, Commands};
use std::env;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();

    if let Err(e) = run(cli).await {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = load_config(&cli)?;

    match cli.command {
        Commands::Serve => serve(config).await,
        Commands::Deploy { repo } => deploy_one(config, &repo).await,
        Commands::Status => status(&config),
        Commands::History { repo, limit } => history(&config, repo.as_deref(), limit),
        Commands::Logs { container, tail } => logs(&container, tail).await,
    }
}

fn load_config(cli: &Cli) -> Result<Config> {
    match &cli.config {
        Some(path) => Config::load(path),
        None => Config::discover(&env::current_dir()?),
    }
}

fn open_store(config: &Config) -> Result<(Arc<DeploymentStore>, Arc<Registry>)> {
    let store = Arc::new(DeploymentStore::open(&config.settings.state_dir)?);
    let registry = Arc::new(Registry::from_config(config, &store));
    Ok((store, registry))
}

fn build_queue(config: &Config) -> Result<Arc<DeployQueue>> {
    let (store, registry) = open_store(config)?;

    let adapters = Adapters {
        git: Arc::new(GitCli::new()),
        secrets: Arc::new(SopsCli::new()),
        compose: Arc::new(DockerCompose::connect().map_err(|e| Error::Runtime(e.to_string()))?),
        notifier: Arc::new(Shoutrrr::new()),
    };
    let options = RunnerOptions {
        step_timeout: config.settings.step_timeout,
        notify_timeout: config.settings.notify_timeout,
        prune_images: config.settings.prune_images,
    };

    let runner = Arc::new(Runner::new(adapters, options, store, registry));
    Ok(Arc::new(DeployQueue::new(runner)))
}

fn policy(config: &Config) -> ConcurrencyPolicy {
    match config.settings.concurrency {
        0 | 1 => ConcurrencyPolicy::Sequential,
        n => ConcurrencyPolicy::Parallel(n),
    }
}

/// Run the orchestrator until interrupted.
async fn serve(config: Config) -> Result<()> {
    let queue = build_queue(&config)?;
    queue.start(policy(&config));
    let poller = Poller::start(Arc::clone(&queue));

    let repos = queue.runner().registry().all().len();
    tracing::info!(repositories = repos, "caravel serving");

    tokio::signal::ctrl_c().await?;
    tracing::info!("shutdown requested, draining in-flight deployments");

    poller.stop().await;
    queue.stop().await;
    Ok(())
}

/// Trigger one deployment through the queue and wait for its outcome, so
/// manual runs respect project exclusion and dependency gating too.
async fn deploy_one(config: Config, repo: &str) -> Result<()> {
    let name = RepoName::new(repo).map_err(|_| Error::UnknownRepository(repo.to_string()))?;
    let queue = build_queue(&config)?;

    let resolved = queue
        .runner()
        .registry()
        .get(&name)
        .ok_or_else(|| Error::UnknownRepository(repo.to_string()))?;

    let store = Arc::clone(queue.runner().store());

    // A gated request would never be admitted here: this process only
    // deploys the requested repository, so the dependency cannot reach
    // success while we wait. Report the blockage instead of hanging.
    if let Some(dep) = &resolved.depends_on {
        let dep_succeeded = store
            .latest_for(dep)
            .is_some_and(|r| r.status == DeploymentStatus::Success);
        if !dep_succeeded {
            return Err(Error::DependencyBlocked {
                repo: name.to_string(),
                dep: dep.to_string(),
            });
        }
    }

    let baseline = store.latest_for(&name).map(|r| r.id);

    queue.start(ConcurrencyPolicy::Sequential);
    queue
        .trigger(&name, TriggerReason::Manual)
        .map_err(|e| match e {
            QueueError::UnknownRepository(r) => Error::UnknownRepository(r.to_string()),
            other => Error::Queue(other.to_string()),
        })?;

    let record = wait_for_outcome(&store, &name, baseline).await;
    queue.stop().await;

    for line in &record.log {
        println!("{line}");
    }
    match record.status {
        DeploymentStatus::Success => {
            println!("deployment {} succeeded", record.id);
            Ok(())
        }
        _ => Err(Error::Runtime(format!("deployment {} failed", record.id))),
    }
}

async fn wait_for_outcome(
    store: &DeploymentStore,
    repo: &RepoName,
    baseline: Option<DeploymentId>,
) -> caravel::store::DeploymentRecord {
    loop {
        if let Some(record) = store.latest_for(repo) {
            let is_new = baseline.is_none_or(|prior| record.id > prior);
            if is_new && record.status.is_terminal() {
                return record;
            }
        }
        tokio::time::sleep(Duration::from_millis(200)).await;
    }
}

/// Show every configured repository with its deployed commit.
fn status(config: &Config) -> Result<()> {
    let (store, registry) = open_store(config)?;

    for repo in registry.all() {
        let Some(state) = registry.current_state(&repo.name, &store) else {
            continue;
        };
        let commit = state
            .last_commit_hash
            .map(|h| h.short().to_string())
            .unwrap_or_else(|| "-".to_string());
        let latest = store
            .latest_for(&repo.name)
            .map(|r| r.status.to_string())
            .unwrap_or_else(|| "never deployed".to_string());
        let activity = if state.deploying { " (deploying)" } else { "" };
        println!(
            "{}/{} [{}] commit={} last={}{}",
            repo.project, repo.name, repo.branch, commit, latest, activity
        );
    }
    Ok(())
}

fn history(config: &Config, repo: Option<&str>, limit: usize) -> Result<()> {
    let (store, _) = open_store(config)?;
    let name = repo
        .map(|r| RepoName::new(r).map_err(|_| Error::UnknownRepository(r.to_string())))
        .transpose()?;

    for record in store.list(name.as_ref(), limit) {
        let commit = record
            .commit_hash
            .map(|h| h.short().to_string())
            .unwrap_or_else(|| "-".to_string());
        let finished = record
            .finished_at
            .map(|t| t.to_rfc3339())
            .unwrap_or_else(|| "-".to_string());
        println!(
            "#{} {} {} commit={} started={} finished={}",
            record.id,
            record.repo,
            record.status,
            commit,
            record.started_at.to_rfc3339(),
            finished
        );
    }
    Ok(())
}

async fn logs(container: &str, tail: u64) -> Result<()> {
    let compose = DockerCompose::connect().map_err(|e| Error::Runtime(e.to_string()))?;
    let output = compose
        .tail_logs(container, tail)
        .await
        .map_err(|e| Error::Runtime(e.to_string()))?;
    print!("{output}");
    Ok(())
}
