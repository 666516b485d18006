//! Command line interface for browsing repositories published on Nostr
//! relays. Supports initialization, showing the current commit, listing and
//! reading paths, and following or replying to discussion threads.

use std::{fs, path::Path, sync::Arc};

use anyhow::Context;
use clap::{Parser, Subcommand};
use gitrelay::{
    config::Settings,
    content::FileDescriptor,
    error::ResolveError,
    event::Event,
    identity::{Identity, RepositoryRef},
    ipfs::IpfsHttpStore,
    path::RepoPath,
    profile::{DisplayNames, Nip05Resolver},
    relay::RelayTransport,
    repo::Resolver,
    thread::{comment_body, frame_root, ThreadKind},
    tree::{Intent, Resolved},
};
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Command line interface entry point.
#[derive(Parser)]
#[command(
    name = "gitrelay",
    author,
    version,
    about = "Browse git repositories published on Nostr relays"
)]
struct Cli {
    /// Path to the `.env` configuration file.
    #[arg(long, default_value = ".env")]
    env: String,
    /// Log at debug level unless `RUST_LOG` says otherwise.
    #[arg(long, global = true)]
    verbose: bool,
    /// Subcommand to execute.
    #[command(subcommand)]
    command: Commands,
}

/// Supported CLI subcommands.
#[derive(Subcommand)]
enum Commands {
    /// Write a default `.env` file if none exists.
    Init,
    /// Show the repository's current commit.
    Commit { owner: String, name: String },
    /// List a directory (or print a file) in the current snapshot.
    Ls {
        owner: String,
        name: String,
        #[arg(long, default_value = "/")]
        path: String,
    },
    /// Print a file, or a directory's readme.
    Show {
        owner: String,
        name: String,
        #[arg(long, default_value = "/")]
        path: String,
    },
    /// Print an issue or pull request with its replies.
    Thread {
        owner: String,
        name: String,
        root_id: String,
        #[arg(long)]
        pull_request: bool,
    },
    /// Reply to an issue or pull request, then print the updated thread.
    Reply {
        owner: String,
        name: String,
        root_id: String,
        content: String,
    },
}

/// Collaborators built from settings.
struct App {
    relay: RelayTransport,
    resolver: Resolver,
    names: DisplayNames,
}

impl App {
    fn new(cfg: &Settings) -> anyhow::Result<Self> {
        let relay = RelayTransport::new(cfg.relays.clone(), cfg.fetch_timeout)
            .with_socks(cfg.tor_socks.clone())
            .with_secret(cfg.secret_key);
        let store = IpfsHttpStore::new(&cfg.ipfs_api, cfg.fetch_timeout)?;
        let resolver = Resolver::new(Arc::new(relay.clone()), Arc::new(store));
        let names = DisplayNames::new(Arc::new(Nip05Resolver::new(
            Arc::new(relay.clone()),
            cfg.fetch_timeout,
        )?));
        Ok(Self {
            relay,
            resolver,
            names,
        })
    }

    async fn author(&self, ev: &Event) -> String {
        match Identity::parse(&ev.pubkey) {
            Ok(id) => self.names.resolve(&id).await,
            Err(_) => ev.pubkey.clone(),
        }
    }

    /// Root hash of the current snapshot, or empty when nothing is published.
    async fn root_hash(&self, repo: &RepositoryRef) -> anyhow::Result<String> {
        match self.resolver.commit(repo).await {
            Ok(commit) => Ok(commit.root_hash().to_string()),
            Err(ResolveError::RepositoryNotFound) => Ok(String::new()),
            Err(e) => Err(e.into()),
        }
    }

    async fn print_replies(&self, replies: &[Event], root_hash: &str) {
        for reply in replies {
            let body = comment_body(reply, root_hash);
            println!("--- {} ({})", self.author(reply).await, reply.created_at);
            println!("{}", body.content.unwrap_or_default());
        }
    }
}

/// Execute the selected CLI subcommand.
async fn run(cli: Cli) -> anyhow::Result<()> {
    ensure_env_file(&cli.env)?;
    if let Commands::Init = cli.command {
        return Ok(());
    }
    let cfg = Settings::from_env(&cli.env)?;
    let app = App::new(&cfg)?;
    match cli.command {
        Commands::Init => {}
        Commands::Commit { owner, name } => {
            let repo = RepositoryRef::parse(&owner, &name)?;
            let commit = app.resolver.commit(&repo).await?;
            println!("commit {}", commit.event.id);
            println!("root   {}", commit.root_hash());
            println!("date   {}", commit.event.created_at);
        }
        Commands::Ls { owner, name, path } => {
            let repo = RepositoryRef::parse(&owner, &name)?;
            let path = RepoPath::new(&path);
            let page = app.resolver.open(&repo, &path, Intent::Listing).await?;
            let trail: Vec<String> = path.breadcrumbs().into_iter().map(|(label, _)| label).collect();
            println!("{repo} {}", trail.join(" / "));
            print_resolved(page.resolved);
        }
        Commands::Show { owner, name, path } => {
            let repo = RepositoryRef::parse(&owner, &name)?;
            let page = app
                .resolver
                .open(&repo, &RepoPath::new(&path), Intent::Document)
                .await?;
            print_resolved(page.resolved);
        }
        Commands::Thread {
            owner,
            name,
            root_id,
            pull_request,
        } => {
            let repo = RepositoryRef::parse(&owner, &name)?;
            let root_hash = app.root_hash(&repo).await?;
            let kind = if pull_request {
                ThreadKind::PullRequest
            } else {
                ThreadKind::Issue
            };
            if let Some(root) = app.relay.fetch_event(&root_id).await? {
                let header = frame_root(&root, kind, &root_hash);
                println!("# {}", header.title);
                println!("by {}", app.author(&root).await);
                println!("{}", header.body.content.unwrap_or_default());
            }
            let thread = app.resolver.thread(&repo, &root_id).await?;
            app.print_replies(&thread.replies, &root_hash).await;
        }
        Commands::Reply {
            owner,
            name,
            root_id,
            content,
        } => {
            let repo = RepositoryRef::parse(&owner, &name)?;
            let root_hash = app.root_hash(&repo).await?;
            let mut session = app.resolver.thread_session(repo, &root_id);
            let thread = session.reply(&content).await?;
            info!(replies = thread.replies.len(), "reply published");
            app.print_replies(&thread.replies, &root_hash).await;
        }
    }
    Ok(())
}

fn print_resolved(resolved: Resolved) {
    match resolved {
        Resolved::Directory { entries } => {
            for entry in entries {
                if entry.is_directory {
                    println!("{}/", entry.name);
                } else {
                    println!("{}", entry.name);
                }
            }
        }
        Resolved::File(file) => print_file(&file),
    }
}

fn print_file(file: &FileDescriptor) {
    if file.too_large {
        println!("{}: file is too large to display", file.path);
    } else if let Some(content) = &file.content {
        print!("{content}");
        if !content.ends_with('\n') {
            println!();
        }
    } else {
        println!("{}: no text viewer for this file", file.path);
    }
}

/// Create a default `.env` file if one is not already present at `path`.
fn ensure_env_file(path: &str) -> anyhow::Result<()> {
    let env_path = Path::new(path);
    if env_path.exists() {
        return Ok(());
    }
    if let Some(parent) = env_path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)
                .with_context(|| format!("creating {}", parent.display()))?;
        }
    }
    let mut content = String::new();
    content.push_str("RELAYS=\n");
    content.push_str(&format!("IPFS_API={}\n", gitrelay::config::DEFAULT_IPFS_API));
    content.push_str("TOR_SOCKS=\n");
    content.push_str("SECRET_KEY=\n");
    content.push_str(&format!(
        "FETCH_TIMEOUT_SECS={}\n",
        gitrelay::config::DEFAULT_FETCH_TIMEOUT_SECS
    ));
    fs::write(env_path, content).with_context(|| format!("writing {path}"))?;
    Ok(())
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "gitrelay=debug" } else { "gitrelay=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[cfg(not(test))]
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    run(cli).await
}
