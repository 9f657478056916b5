//! Command-line entry point for biblio stores.
//!
//! # Responsibility
//! - Map flags onto a `StoreConfig` and open the selected backend.
//! - Load JSON record sets and report on stored collections.

use anyhow::{Context, Result};
use biblio_core::codec::LibraryEntity;
use biblio_core::config::DEFAULT_NODE_TAG;
use biblio_core::{
    default_log_level, init_logging, Author, Book, Category, DataLoader, DocumentRepository,
    DocumentStore, Filter, JsonFileSource, LazyHandle, LoadReport, Member, Publisher, Repository,
    ResetStrategy, SessionRepository, SessionStore, StoreConfig,
};
use clap::{Parser, Subcommand, ValueEnum};
use log::info;
use std::path::{Path, PathBuf};

#[derive(Parser, Debug)]
#[command(name = "biblio", version, about = "Load and inspect biblio library stores")]
struct Cli {
    /// Storage backend to operate on
    #[arg(long, value_enum, default_value_t = BackendKind::Document, global = true)]
    backend: BackendKind,

    /// SQLite database file
    #[arg(long, default_value = "biblio.db", global = true)]
    db: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Directory for rotated log files; logs go to stderr when omitted
    #[arg(long, global = true)]
    log_dir: Option<PathBuf>,

    /// Node tag appended to ids minted by the session backend
    #[arg(long, default_value = DEFAULT_NODE_TAG, global = true)]
    node_tag: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Check that the core library is linked
    Ping,
    /// Replace a collection with the records of a JSON array file
    Load {
        #[arg(value_enum)]
        entity: EntityKind,
        file: PathBuf,
        #[arg(long, value_enum, default_value_t = ResetArg::Drop)]
        reset: ResetArg,
    },
    /// Count the records of one collection
    Count {
        #[arg(value_enum)]
        entity: EntityKind,
    },
    /// List collections that currently hold data
    Collections,
    /// Remove every collection of the selected backend
    Reset,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum BackendKind {
    Document,
    Session,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum EntityKind {
    Authors,
    Books,
    Categories,
    Publishers,
    Members,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum ResetArg {
    Drop,
    DeleteAll,
}

impl From<ResetArg> for ResetStrategy {
    fn from(value: ResetArg) -> Self {
        match value {
            ResetArg::Drop => ResetStrategy::DropCollection,
            ResetArg::DeleteAll => ResetStrategy::DeleteAll,
        }
    }
}

/// Backend-specific repository construction behind one command runner.
trait Workspace {
    fn repository<T>(&self) -> Result<Box<dyn Repository<T>>>
    where
        T: LibraryEntity + 'static,
        T::Codec: 'static;

    fn collection_names(&self) -> Result<Vec<String>>;

    fn reset(&self) -> Result<()>;
}

impl Workspace for LazyHandle<DocumentStore> {
    fn repository<T>(&self) -> Result<Box<dyn Repository<T>>>
    where
        T: LibraryEntity + 'static,
        T::Codec: 'static,
    {
        let store = self.acquire_handle()?;
        Ok(Box::new(DocumentRepository::<T, T::Codec>::for_entity(&store)))
    }

    fn collection_names(&self) -> Result<Vec<String>> {
        Ok(self.acquire_handle()?.list_collection_names()?)
    }

    fn reset(&self) -> Result<()> {
        Ok(self.reset_storage()?)
    }
}

impl Workspace for LazyHandle<SessionStore> {
    fn repository<T>(&self) -> Result<Box<dyn Repository<T>>>
    where
        T: LibraryEntity + 'static,
        T::Codec: 'static,
    {
        let store = self.acquire_handle()?;
        Ok(Box::new(SessionRepository::<T>::for_entity(&store)))
    }

    fn collection_names(&self) -> Result<Vec<String>> {
        Ok(self.acquire_handle()?.list_collection_names()?)
    }

    fn reset(&self) -> Result<()> {
        Ok(self.reset_storage()?)
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = match (&cli.log_level, &cli.log_dir) {
        (Some(level), _) => level.as_str(),
        (None, Some(_)) => default_log_level(),
        (None, None) => "warn",
    };
    init_logging(level, cli.log_dir.as_deref())
        .map_err(|err| anyhow::anyhow!("failed to initialize logging: {err}"))?;

    let config = StoreConfig::file(&cli.db).with_node_tag(cli.node_tag.clone());
    config.validate()?;
    info!(
        "event=cli_start module=cli status=ok backend={:?} db={}",
        cli.backend,
        cli.db.display()
    );

    match cli.backend {
        BackendKind::Document => run(&LazyHandle::<DocumentStore>::new(config), cli.command),
        BackendKind::Session => run(&LazyHandle::<SessionStore>::new(config), cli.command),
    }
}

fn run<W: Workspace>(workspace: &W, command: Command) -> Result<()> {
    match command {
        Command::Ping => {
            println!("biblio_core ping={}", biblio_core::ping());
            println!("biblio_core version={}", biblio_core::core_version());
        }
        Command::Load {
            entity,
            file,
            reset,
        } => {
            let reset = ResetStrategy::from(reset);
            let report = match entity {
                EntityKind::Authors => load::<Author, _>(workspace, &file, reset),
                EntityKind::Books => load::<Book, _>(workspace, &file, reset),
                EntityKind::Categories => load::<Category, _>(workspace, &file, reset),
                EntityKind::Publishers => load::<Publisher, _>(workspace, &file, reset),
                EntityKind::Members => load::<Member, _>(workspace, &file, reset),
            }
            .with_context(|| format!("failed to load `{}`", file.display()))?;
            println!(
                "collection={} loaded={} source={}",
                report.collection,
                report.loaded(),
                report.source
            );
        }
        Command::Count { entity } => {
            let (collection, count) = match entity {
                EntityKind::Authors => count::<Author, _>(workspace)?,
                EntityKind::Books => count::<Book, _>(workspace)?,
                EntityKind::Categories => count::<Category, _>(workspace)?,
                EntityKind::Publishers => count::<Publisher, _>(workspace)?,
                EntityKind::Members => count::<Member, _>(workspace)?,
            };
            println!("collection={collection} count={count}");
        }
        Command::Collections => {
            for name in workspace.collection_names()? {
                println!("{name}");
            }
        }
        Command::Reset => {
            workspace.reset()?;
            println!("reset=ok");
        }
    }
    Ok(())
}

fn load<T, W>(workspace: &W, file: &Path, reset: ResetStrategy) -> Result<LoadReport>
where
    T: LibraryEntity + 'static,
    T::Codec: 'static,
    W: Workspace,
{
    let repo = workspace.repository::<T>()?;
    let source = JsonFileSource::<T>::new(file);
    Ok(DataLoader::new(repo.as_ref())
        .with_reset(reset)
        .load(&source)?)
}

fn count<T, W>(workspace: &W) -> Result<(String, u64)>
where
    T: LibraryEntity + 'static,
    T::Codec: 'static,
    W: Workspace,
{
    let repo = workspace.repository::<T>()?;
    let count = repo.count(&Filter::All)?;
    Ok((repo.collection_name().to_string(), count))
}
