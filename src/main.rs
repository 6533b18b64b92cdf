//! commitdeck - CLI entry point.

use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use colored::Colorize;
use dialoguer::Confirm;
use tracing_subscriber::EnvFilter;

use commitdeck::config::{AppPaths, ConfigStore, EmptyChangeBehavior, Settings};
use commitdeck::git::{Git2Core, GitCore};
use commitdeck::orchestrator::CommitOrchestrator;
use commitdeck::protocol::{TerminalHost, transport};
use commitdeck::provider::{
    ClaudeProvider, GenerateOptions, GenerateResult, ManifestLoader, Provider, ProviderRegistry,
};
use commitdeck::session::Session;

/// Generate git commit messages with pluggable AI providers.
#[derive(Parser, Debug)]
#[command(name = "commitdeck")]
#[command(about = "Generate git commit messages with pluggable AI providers")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create the config directory, providers directory and default config.json
    Init,

    /// List every model offered by the registered providers
    ListModels,

    /// Make a model the active one
    SelectModel {
        /// Model id as shown by `list-models`
        id: String,
    },

    /// Generate a commit message for the staged changes
    Gen {
        /// Commit without asking for confirmation
        #[arg(short = 'y', long)]
        yes: bool,

        /// Model to use instead of the active one
        #[arg(short = 'm', long)]
        model: Option<String>,

        /// Language of the generated message (defaults to git.lang)
        #[arg(long)]
        lang: Option<String>,

        /// Amend the last commit instead of creating a new one
        #[arg(long)]
        amend: bool,
    },

    /// Run the webview host, speaking newline-delimited JSON on stdin/stdout
    Serve {
        /// Workspace root (defaults to the current directory)
        #[arg(long)]
        workspace: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {e:#}", "error:".red().bold());
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let paths = AppPaths::resolve().context("Failed to locate the commitdeck config directory")?;
    let settings = Arc::new(Settings::load(&paths));
    init_tracing(settings.as_ref());

    match cli.command {
        Command::Init => init(&paths),
        Command::ListModels => list_models(&paths, settings).await,
        Command::SelectModel { id } => {
            let orchestrator = orchestrator(&paths, settings);
            orchestrator.select_model(&id).await?;
            println!("{} Active model is now {}", "✓".green(), id.bold());
            Ok(())
        }
        Command::Gen {
            yes,
            model,
            lang,
            amend,
        } => gen_command(&paths, settings, yes, model, lang, amend).await,
        Command::Serve { workspace } => serve(&paths, settings, workspace).await,
    }
}

/// Logs go to stderr; stdout carries CLI output and the serve stream.
fn init_tracing(settings: &Settings) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(settings.preferences().log.level.as_str()));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn registry(paths: &AppPaths) -> Arc<ProviderRegistry> {
    let registry = Arc::new(ProviderRegistry::new(paths.providers_dir(), Arc::new(ManifestLoader)));
    registry.register(Arc::new(ClaudeProvider::new()));
    registry
}

fn orchestrator(paths: &AppPaths, settings: Arc<Settings>) -> CommitOrchestrator {
    CommitOrchestrator::new(registry(paths), settings)
}

fn init(paths: &AppPaths) -> Result<()> {
    paths.ensure_dirs().context("Failed to create config directories")?;
    let config_file = paths.config_file();
    let written = Settings::init_file(&config_file).context("Failed to write default config")?;

    println!("Config directory:    {}", paths.home().display());
    println!("Providers directory: {}", paths.providers_dir().display());
    if written {
        println!("{} Created {}", "✓".green(), config_file.display());
    } else {
        println!("Config file:         {} (kept)", config_file.display());
    }
    Ok(())
}

async fn list_models(paths: &AppPaths, settings: Arc<Settings>) -> Result<()> {
    let orchestrator = orchestrator(paths, settings);
    let active = orchestrator.active_model_id(None).await;

    let registry = orchestrator.registry();
    if registry.is_empty() {
        println!("No providers registered. Add one under {}", registry.dir().display());
        return Ok(());
    }

    for provider in registry.list() {
        println!("{} ({})", provider.display_name().bold(), provider.id());
        for model in provider.models() {
            let marker = if active.as_deref() == Some(model.id.as_str()) {
                "*".green().bold().to_string()
            } else {
                " ".to_string()
            };
            println!("  {marker} {:<24} {}", model.id, model.name);
        }
    }
    Ok(())
}

async fn gen_command(
    paths: &AppPaths,
    settings: Arc<Settings>,
    yes: bool,
    model: Option<String>,
    lang: Option<String>,
    amend: bool,
) -> Result<()> {
    let cwd = std::env::current_dir().context("Failed to read current directory")?;
    let git = Git2Core::discover(&cwd)
        .context("Not a git repository. Run commitdeck from within a git repository.")?;
    let prefs = settings.preferences();

    if prefs.git.auto_stage {
        git.stage_all().await.context("Failed to stage changes")?;
    }
    let staged = git.diff_summary(true).await.context("Failed to collect staged diff")?;

    let (diff, amend) = if !staged.is_empty() {
        (staged, amend)
    } else if amend || prefs.git.empty_change_behavior == EmptyChangeBehavior::Amend {
        let previous = git
            .last_commit_message()
            .await
            .context("Nothing staged and no commit to amend")?;
        println!("Nothing staged; rewording: {}", previous.lines().next().unwrap_or_default());
        (git.head_diff().await.context("Failed to read the last commit")?, true)
    } else {
        println!("Nothing to commit. Stage some changes first.");
        return Ok(());
    };

    println!(
        "Generating commit message for {} file(s), +{} -{}...",
        diff.changed, diff.insertions, diff.deletions
    );

    let orchestrator = orchestrator(paths, settings);
    let result = orchestrator
        .generate(diff, model.as_deref(), GenerateOptions { lang })
        .await
        .context("Failed to generate commit message")?;

    print_message(&result);
    let message = result.message();

    if !yes && !confirm(amend)? {
        println!("Aborted.");
        return Ok(());
    }

    if amend {
        git.amend_commit(&message).await.context("Failed to amend commit")?;
        println!("{} Amended last commit", "✓".green());
    } else {
        git.commit(&message).await.context("Failed to commit")?;
        println!("{} Committed", "✓".green());
    }
    Ok(())
}

fn print_message(result: &GenerateResult) {
    println!();
    println!("{}", result.title.bold());
    if let Some(body) = &result.body {
        println!();
        println!("{body}");
    }
    println!();
}

fn confirm(amend: bool) -> Result<bool> {
    if !std::io::stdin().is_terminal() {
        bail!("Refusing to commit without confirmation on a non-interactive terminal; pass -y");
    }
    let prompt = if amend {
        "Amend the last commit with this message?"
    } else {
        "Commit with this message?"
    };
    Confirm::new()
        .with_prompt(prompt)
        .default(true)
        .interact()
        .context("Failed to read confirmation")
}

async fn serve(paths: &AppPaths, settings: Arc<Settings>, workspace: Option<PathBuf>) -> Result<()> {
    let root = match workspace {
        Some(path) => Some(path),
        None => std::env::current_dir().ok(),
    };
    let git: Arc<dyn GitCore> = match root.as_deref() {
        Some(path) => Arc::new(Git2Core::discover(path).unwrap_or_else(|_| Git2Core::new(path))),
        None => Arc::new(Git2Core::new(Path::new("."))),
    };

    let config: Arc<dyn ConfigStore> = settings;
    let orchestrator = Arc::new(CommitOrchestrator::new(registry(paths), Arc::clone(&config)));
    let host = Arc::new(TerminalHost::new(root.clone().unwrap_or_default()));
    let session = Arc::new(Session::new(root, git, config, orchestrator));

    tracing::info!("Serving webview protocol on stdio");
    transport::serve(tokio::io::stdin(), tokio::io::stdout(), session, host)
        .await
        .context("Webview transport failed")
}
