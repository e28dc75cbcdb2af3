//! Grabber CLI

mod config;
mod factory;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use config::GrabberConfig;
use grabber_core::{GitClient, Location, PullRequestRequest};
use tracing::{info, Level};
use tracing_subscriber::EnvFilter;

/// Initialize logging with the specified verbosity level
fn init_logging(verbose: u8, quiet: bool, json: bool) -> Result<()> {
    let level = if quiet {
        Level::ERROR
    } else {
        match verbose {
            0 => Level::WARN,
            1 => Level::INFO,
            2 => Level::DEBUG,
            _ => Level::TRACE,
        }
    };

    let mut filter = EnvFilter::from_default_env();
    for target in ["grabber", "grabber_core", "grabber_github", "grabber_gitlab"] {
        filter = filter.add_directive(format!("{}={}", target, level).parse()?);
    }

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(verbose >= 2)
        .with_file(verbose >= 3)
        .with_line_number(verbose >= 3);

    if json {
        builder.json().init();
    } else {
        builder.init();
    }

    Ok(())
}

#[derive(Parser)]
#[command(name = "grabber")]
#[command(about = "Read and manage repositories across Git hosting providers")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file (default: ~/.config/grabber/config.toml)
    #[arg(long, env = "GRABBER_CONFIG", global = true)]
    config: Option<String>,

    /// Provider access token
    #[arg(long, env = "GRABBER_TOKEN", hide_env_values = true, global = true)]
    token: Option<String>,

    /// Provider, overriding the config file (github, gitlab)
    #[arg(long, global = true)]
    location: Option<Location>,

    /// API root, overriding the config file
    #[arg(long, global = true)]
    api_url: Option<String>,

    /// Increase verbosity (-v: info, -vv: debug, -vvv: trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Quiet mode (suppress non-error output)
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Output logs as JSON (for machine parsing)
    #[arg(long, global = true)]
    log_json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Check the token against the provider
    Auth,
    /// List repositories visible to the token
    Repos,
    /// List branches of a repository
    Branches {
        /// Repository as owner/name
        repo: String,
    },
    /// Issue-linked commits of a branch, with patches
    Commits {
        repo: String,
        #[arg(short, long, default_value = "main")]
        branch: String,
    },
    /// One commit, if it references an issue
    Commit { repo: String, sha: String },
    /// Raw patch of one commit
    Patch { repo: String, sha: String },
    /// Diff between two commits
    Diff {
        repo: String,
        first: String,
        second: String,
    },
    /// Branch management
    Branch {
        #[command(subcommand)]
        action: BranchAction,
    },
    /// Pull/merge request management
    Pr {
        #[command(subcommand)]
        action: PrAction,
    },
    /// Repository webhook management
    Hook {
        #[command(subcommand)]
        action: HookAction,
    },
}

#[derive(Subcommand)]
enum BranchAction {
    /// Create a branch from the head of another
    Create {
        repo: String,
        /// New branch name
        name: String,
        #[arg(long, default_value = "main")]
        from: String,
    },
}

#[derive(Subcommand)]
enum PrAction {
    Create {
        repo: String,
        #[arg(long)]
        source: String,
        #[arg(long, default_value = "main")]
        target: String,
        #[arg(long)]
        title: String,
    },
}

#[derive(Subcommand)]
enum HookAction {
    /// Register the push and pull request hook
    Create {
        repo: String,
        /// Internal repository id the hook secret is derived from
        #[arg(long)]
        id: String,
    },
    /// Remove a hook; succeeds if it is already gone
    Delete { repo: String, hook_id: String },
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(cli.verbose, cli.quiet, cli.log_json)?;

    let mut config = GrabberConfig::load(cli.config.as_deref())?;
    if let Some(location) = cli.location {
        config.provider.location = location;
    }
    if let Some(api_url) = cli.api_url {
        config.provider.api_url = Some(api_url);
    }

    let token = cli
        .token
        .context("No access token: pass --token or set GRABBER_TOKEN")?;
    let services = factory::build_services(&config)?;
    let client = factory::create_client(&token, &config.provider, services)?;
    let location = config.provider.location;

    run(cli.command, client.as_ref(), location).await
}

async fn run(command: Commands, client: &dyn GitClient, location: Location) -> Result<()> {
    let repository = |arg: &str| factory::parse_repository(arg, location);

    match command {
        Commands::Auth => {
            client.authenticate().await?;
            println!("Authenticated with {}", location);
        }

        Commands::Repos => print_json(&client.grab_repositories().await?)?,

        Commands::Branches { repo } => {
            print_json(&client.grab_branches(&repository(&repo)?).await?)?
        }

        Commands::Commits { repo, branch } => {
            let commits = client.grab_commits(&repository(&repo)?, &branch).await?;
            info!(count = commits.len(), branch = %branch, "Issue-linked commits");
            print_json(&commits)?
        }

        Commands::Commit { repo, sha } => {
            print_json(&client.grab_commit(&repository(&repo)?, &sha).await?)?
        }

        Commands::Patch { repo, sha } => {
            let diff = client.grab_commit_patch(&sha, &repository(&repo)?).await?;
            print!("{}", diff.patch);
        }

        Commands::Diff { repo, first, second } => {
            print!("{}", client.grab_diff(&repository(&repo)?, &first, &second).await?);
        }

        Commands::Branch { action } => match action {
            BranchAction::Create { repo, name, from } => {
                let repo = repository(&repo)?;
                let source = client
                    .grab_branches(&repo)
                    .await?
                    .into_iter()
                    .find(|b| b.name == from)
                    .with_context(|| format!("Branch '{}' not found in {}", from, repo.full_name))?;
                let created = client.make_branch(&repo, &source, &name).await?;
                println!("Created branch {} from {}", created, source.ref_sha);
            }
        },

        Commands::Pr { action } => match action {
            PrAction::Create {
                repo,
                source,
                target,
                title,
            } => {
                let request = PullRequestRequest::new(source, target, title);
                print_json(&client.make_pull_request(&repository(&repo)?, &request).await?)?
            }
        },

        Commands::Hook { action } => match action {
            HookAction::Create { repo, id } => {
                let repo = repository(&repo)?.with_internal_id(id);
                print_json(&client.create_repository_hook(&repo).await?)?
            }
            HookAction::Delete { repo, hook_id } => {
                client
                    .delete_repository_hook(&hook_id, &repository(&repo)?)
                    .await?;
                println!("Hook {} removed", hook_id);
            }
        },
    }

    Ok(())
}
