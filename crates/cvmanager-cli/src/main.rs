//! cvmanager - content view management CLI
//!
//! The `cvmanager` command drives content view operations on a Katello /
//! Satellite server.
//!
//! ## Commands
//!
//! - `resolve`: Show which version of a content view sits in each environment
//! - `update`: Incrementally add packages/errata to those versions
//! - `publish`: Publish a new version of a content view
//! - `promote`: Promote a version into a lifecycle environment
//! - `wait`: Wait for already running tasks

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use cvmanager_core::{
    environment_names, resolver, version, ContentItems, ContentView, ContentViewVersion,
    LifecycleEnvironment, OutcomeStatus, RunOptions, Session, TaskId, TaskWaiter, UpdateOutcome, UpdatePlan,
    UpdateScheduler, WaitPolicy,
};
use satellite_api::{ClientConfig, SatelliteClient};
use tracing::info;

#[derive(Parser)]
#[command(name = "cvmanager")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Content view management for Katello / Satellite", long_about = None)]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Debug)]
struct GlobalArgs {
    /// URI to the Satellite
    #[arg(short = 'U', long, env = "SATELLITE_URL", default_value = "https://localhost", global = true)]
    uri: String,

    /// User to log in to Satellite
    #[arg(short, long, env = "SATELLITE_USER", default_value = "admin", global = true)]
    user: String,

    /// Password to log in to Satellite
    #[arg(short, long, env = "SATELLITE_PASSWORD", hide_env_values = true, global = true)]
    pass: Option<String>,

    /// Timeout in seconds for API calls, -1 never times out
    #[arg(short, long, default_value_t = 300, allow_negative_numbers = true, global = true)]
    timeout: i64,

    /// ID of the organization to manage content views in
    #[arg(short, long = "organization-id", default_value_t = 1, global = true)]
    organization: u64,

    /// Description for publish, promote and update operations
    #[arg(short, long, default_value = "autopublish", global = true)]
    description: String,

    /// Do not actually submit anything
    #[arg(short, long, global = true)]
    noop: bool,

    /// Wait for started tasks to finish
    #[arg(long, global = true)]
    wait: bool,

    /// Give up waiting after this many seconds
    #[arg(long, value_name = "SECS", global = true)]
    wait_timeout: Option<u64>,

    /// Seconds to pause between consecutive requests
    #[arg(long, value_name = "SECS", default_value_t = 10, global = true)]
    request_delay: u64,

    /// Don't verify SSL certificates
    #[arg(long, global = true)]
    no_verify_ssl: bool,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines and results
    #[arg(long, global = true)]
    json: bool,
}

#[derive(Args, Debug)]
struct TargetArgs {
    /// Content view name
    #[arg(short = 'w', long)]
    content_view: String,

    /// Repository that a composite's components must contain
    #[arg(short, long)]
    repository: Option<String>,

    /// Comma-separated lifecycle environment names (e.g. Test,Prod)
    #[arg(short, long)]
    lifecycle_environments: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the content view version published in each environment
    Resolve {
        #[command(flatten)]
        target: TargetArgs,
    },

    /// Add packages/errata to the version in each environment
    Update {
        #[command(flatten)]
        target: TargetArgs,

        /// Package ids to add (comma-separated)
        #[arg(long, value_delimiter = ',')]
        package_ids: Vec<u64>,

        /// Errata ids to add (comma-separated)
        #[arg(long, value_delimiter = ',')]
        errata_ids: Vec<String>,
    },

    /// Publish a new version of a content view
    Publish {
        /// Content view name
        #[arg(short = 'w', long)]
        content_view: String,
    },

    /// Promote a content view version into a lifecycle environment
    Promote {
        /// Content view name
        #[arg(short = 'w', long)]
        content_view: String,

        /// Target lifecycle environment
        #[arg(short, long)]
        lifecycle_environment: String,

        /// Version id to promote (default: newest version)
        #[arg(long, conflicts_with = "from_prior")]
        version_id: Option<u64>,

        /// Promote the version currently in the prior environment
        #[arg(long)]
        from_prior: bool,

        /// Force promotion out of the regular lifecycle order
        #[arg(short, long)]
        force: bool,
    },

    /// Wait for running tasks to finish
    Wait {
        /// Task ids
        #[arg(required = true)]
        tasks: Vec<String>,
    },
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    cvmanager_core::init_tracing(cli.global.json, cli.global.verbose);

    let client = SatelliteClient::new(client_config(&cli.global)?)
        .context("Failed to set up Satellite client")?;
    let session = Session::new(Arc::new(client), run_options(&cli.global, &cli.command));

    let run = async {
        match cli.command {
            Commands::Resolve { target } => cmd_resolve(&session, &target).await,
            Commands::Update {
                target,
                package_ids,
                errata_ids,
            } => {
                let content = ContentItems {
                    package_ids,
                    errata_ids,
                };
                cmd_update(&session, &target, &content, cli.global.json).await
            }
            Commands::Publish { content_view } => {
                cmd_publish(&session, &content_view, cli.global.json).await
            }
            Commands::Promote {
                content_view,
                lifecycle_environment,
                version_id,
                from_prior,
                force,
            } => {
                cmd_promote(
                    &session,
                    &content_view,
                    &lifecycle_environment,
                    version_id,
                    from_prior,
                    force,
                    cli.global.json,
                )
                .await
            }
            Commands::Wait { tasks } => cmd_wait(&session, tasks).await,
        }
    };

    tokio::select! {
        result = run => result,
        _ = tokio::signal::ctrl_c() => {
            bail!("interrupted; requests already submitted stay applied")
        }
    }
}

fn client_config(global: &GlobalArgs) -> Result<ClientConfig> {
    let Some(password) = global.pass.as_deref() else {
        bail!("no password given, use --pass or SATELLITE_PASSWORD");
    };
    let timeout = u64::try_from(global.timeout).ok().map(Duration::from_secs);
    Ok(ClientConfig::new(&global.uri, &global.user, password)
        .with_timeout(timeout)
        .with_verify_tls(!global.no_verify_ssl))
}

fn run_options(global: &GlobalArgs, command: &Commands) -> RunOptions {
    // waiting for tasks is the whole point of `wait`
    let enabled = global.wait || matches!(command, Commands::Wait { .. });
    let wait = WaitPolicy {
        enabled,
        ..WaitPolicy::default()
    }
    .with_timeout(global.wait_timeout.map(Duration::from_secs));

    RunOptions::default()
        .with_organization(global.organization)
        .with_description(&global.description)
        .with_noop(global.noop)
        .with_wait(wait)
        .with_request_delay(Duration::from_secs(global.request_delay))
}

/// Show the version per environment
async fn cmd_resolve(session: &Session, target: &TargetArgs) -> Result<()> {
    let plan = build_plan(session, target).await?;

    println!("Content view {} (id: {})", plan.content_view.name, plan.content_view.id);
    for t in &plan.targets {
        println!(
            "  environment {}: {} v{} (version id: {})",
            t.environment_id, t.content_view_name, t.version, t.version_id
        );
    }
    for gap in plan.gaps() {
        println!("  environment {gap}: nothing published");
    }
    Ok(())
}

/// Incrementally update the version in every environment
async fn cmd_update(
    session: &Session,
    target: &TargetArgs,
    content: &ContentItems,
    json: bool,
) -> Result<()> {
    let plan = build_plan(session, target).await?;
    if plan.targets.is_empty() {
        bail!(
            "content view {} has no version in any of: {}",
            plan.content_view.name,
            target.lifecycle_environments
        );
    }

    let outcomes = UpdateScheduler::new(session)
        .incremental_updates(&plan.targets, content)
        .await
        .context("Incremental update failed")?;
    for outcome in &outcomes {
        print_outcome(outcome, json)?;
    }
    check_outcomes(&outcomes)
}

/// Publish a new content view version
async fn cmd_publish(session: &Session, content_view: &str, json: bool) -> Result<()> {
    let cv = fetch_content_view(session, content_view).await?;
    let outcome = UpdateScheduler::new(session)
        .publish(&cv)
        .await
        .context("Publish failed")?;
    print_outcome(&outcome, json)?;
    check_outcomes(std::slice::from_ref(&outcome))
}

/// Promote a content view version
async fn cmd_promote(
    session: &Session,
    content_view: &str,
    environment: &str,
    version_id: Option<u64>,
    from_prior: bool,
    force: bool,
    json: bool,
) -> Result<()> {
    let cv = fetch_content_view(session, content_view).await?;
    let target = resolver::lifecycle_environment(session, environment)
        .await
        .context("Failed to resolve target lifecycle environment")?;

    let prior = if from_prior && version_id.is_none() {
        let prior = resolver::prior_environment(session, environment)
            .await?
            .with_context(|| format!("{environment} has no prior environment"))?;
        Some(prior)
    } else {
        None
    };
    let chosen = choose_version(&cv, version_id, prior.as_ref())?;

    if !needs_promotion(chosen, &target, force) {
        info!(
            content_view = %cv.name,
            version = %chosen.version,
            environment = %target.name,
            "version already in environment, nothing to promote"
        );
        return Ok(());
    }

    let outcome = UpdateScheduler::new(session)
        .promote(chosen.id, target.id, force)
        .await
        .context("Promote failed")?;
    print_outcome(&outcome, json)?;
    check_outcomes(std::slice::from_ref(&outcome))
}

/// Wait for existing tasks
async fn cmd_wait(session: &Session, tasks: Vec<String>) -> Result<()> {
    let tasks: Vec<TaskId> = tasks.into_iter().map(TaskId::new).collect();
    let report = TaskWaiter::new(session)
        .wait_until(tasks, async {
            tokio::signal::ctrl_c().await.ok();
        })
        .await?;
    for (task, result) in &report.failed {
        println!("{task}: failed with result {result}");
    }
    if !report.failed.is_empty() {
        bail!("{} task(s) did not succeed", report.failed.len());
    }
    println!("All tasks finished");
    Ok(())
}

async fn build_plan(session: &Session, target: &TargetArgs) -> Result<UpdatePlan> {
    let environments = environment_names(&target.lifecycle_environments);
    UpdatePlan::build(
        session,
        &target.content_view,
        target.repository.as_deref(),
        &environments,
    )
    .await
    .context("Failed to resolve content view versions")
}

async fn fetch_content_view(session: &Session, name: &str) -> Result<ContentView> {
    let id = resolver::content_view_id(session, name).await?;
    Ok(session.content_view(id).await?)
}

/// Version to promote: an explicit id, the one in `prior`, or the newest.
fn choose_version<'a>(
    cv: &'a ContentView,
    version_id: Option<u64>,
    prior: Option<&LifecycleEnvironment>,
) -> Result<&'a ContentViewVersion> {
    if let Some(id) = version_id {
        return cv
            .versions
            .iter()
            .find(|v| v.id.0 == id)
            .with_context(|| format!("content view {} has no version id {id}", cv.name));
    }
    if let Some(prior) = prior {
        return version::resolve_version(cv, prior.id)?.with_context(|| {
            format!("{} has no version in prior environment {}", cv.name, prior.name)
        });
    }
    latest_version(cv).with_context(|| format!("content view {} has no versions", cv.name))
}

fn needs_promotion(
    version: &ContentViewVersion,
    target: &LifecycleEnvironment,
    force: bool,
) -> bool {
    force || !version.is_in(target.id)
}

/// Newest version by number; unparseable versions sort last.
fn latest_version(cv: &ContentView) -> Option<&ContentViewVersion> {
    cv.versions.iter().max_by(|a, b| {
        let a = a.number().unwrap_or(f64::NEG_INFINITY);
        let b = b.number().unwrap_or(f64::NEG_INFINITY);
        a.total_cmp(&b)
    })
}

/// Fail the run when any submitted task ended without success.
fn check_outcomes(outcomes: &[UpdateOutcome]) -> Result<()> {
    let failed = outcomes
        .iter()
        .filter(|o| o.status == OutcomeStatus::Failed)
        .count();
    if failed > 0 {
        bail!("{failed} of {} operations did not succeed", outcomes.len());
    }
    Ok(())
}

fn print_outcome(outcome: &UpdateOutcome, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string(outcome)?);
        return Ok(());
    }
    let task = outcome
        .task
        .as_ref()
        .map(|t| t.to_string())
        .unwrap_or_else(|| "-".to_string());
    let status = match outcome.status {
        OutcomeStatus::Completed => "completed".to_string(),
        OutcomeStatus::Failed => format!(
            "failed with result {}",
            outcome.result.as_deref().unwrap_or("unknown")
        ),
        OutcomeStatus::Submitted => "submitted".to_string(),
        OutcomeStatus::Skipped => "skipped (noop)".to_string(),
    };
    println!("{}: {status} (task: {task})", outcome.operation);
    Ok(())
}
