//! Command handlers for the `bluesync` binary.
//!
//! Long-running operations run on the blocking pool through
//! [`spawn_operation`]; Ctrl-C cancels them through their token and waits
//! for the current file to finish.

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use bluesync_core::{
    AppConfig, ConfigManager, Error, Id3TagCodec, LibraryManager, OperationContext, Progress,
    ProgressSink, Result, Scope, TagCodec, sanitize, spawn_operation,
};
use tracing::{debug, info, warn};

use crate::{Cli, Command, PlaylistCommand};

/// Prints progress and warnings to stderr.
#[derive(Debug, Default)]
struct ConsoleProgress;

impl ProgressSink for ConsoleProgress {
    fn progress(&self, progress: &Progress) {
        if progress.message == bluesync_core::IDLE_MESSAGE {
            return;
        }
        let mut stderr = std::io::stderr().lock();
        let _ = match progress.percent {
            Some(percent) => writeln!(stderr, "[{percent:>5.1}%] {}", progress.message),
            None => writeln!(stderr, "[  ... ] {}", progress.message),
        };
    }

    fn error(&self, message: &str) {
        eprintln!("warning: {message}");
    }
}

/// State shared by all commands of one invocation.
pub struct AppState {
    /// Configuration manager.
    config_manager: ConfigManager,
    /// Tag codec used for every library operation.
    codec: Arc<dyn TagCodec>,
}

impl AppState {
    /// Create the state from the saved configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration cannot be loaded.
    pub fn new() -> Result<Self> {
        let config_manager = ConfigManager::new()?;
        Ok(Self {
            config_manager,
            codec: Arc::new(Id3TagCodec::new()),
        })
    }

    /// Run a parsed command line.
    ///
    /// # Errors
    ///
    /// Returns an error if the command fails.
    pub async fn execute(&mut self, cli: Cli) -> Result<()> {
        if let Command::Sanitize { text, max_len } = &cli.command {
            println!("{}", sanitize(text, *max_len));
            return Ok(());
        }

        let root = self.resolve_root(cli.root)?;
        let mut config = self.config_manager.config().clone();
        config.skip_missing_entries |= cli.skip_missing;

        let library = self.open(root, config).await?;
        let root = library.root().to_path_buf();

        match cli.command {
            Command::Scan => print_scan(&library),
            Command::Fix { mode, selection } => {
                let scope = selection.into_scope();
                let mode = mode.into();
                let outcome = run_cancellable(move |ctx| {
                    let mut library = library;
                    library.fix(&scope, mode, ctx)
                })
                .await?;
                let outcome = outcome?;
                println!("{}", outcome.fix.summary());
                println!("{}", outcome.playlists.summary());
                if let Some(failure) = outcome.fix.failure {
                    return Err(failure);
                }
            }
            Command::Delete { selection } => {
                if selection.is_empty() {
                    return Err(Error::Configuration(
                        "select the folders or tracks to delete".to_string(),
                    ));
                }
                let scope = selection.into_scope();
                let outcome = run_cancellable(move |ctx| {
                    let mut library = library;
                    library.delete(&scope, ctx)
                })
                .await?;
                let outcome = outcome?;
                println!("{}", outcome.delete.summary());
                println!("{}", outcome.playlists.summary());
                if let Some(failure) = outcome.delete.failure {
                    return Err(failure);
                }
            }
            Command::Cleanup => {
                let report = run_cancellable(move |ctx| {
                    let mut library = library;
                    library.cleanup(ctx)
                })
                .await?;
                println!("{}", report?.summary());
            }
            Command::Playlist { command } => {
                run_playlist_command(library, command).await?;
            }
            Command::Sanitize { .. } => {}
        }

        self.remember_root(&root);
        Ok(())
    }

    fn resolve_root(&self, root: Option<PathBuf>) -> Result<PathBuf> {
        root.or_else(|| self.config_manager.last_root().map(PathBuf::from))
            .ok_or_else(|| {
                Error::Configuration(
                    "no library root given and none saved, pass --root".to_string(),
                )
            })
    }

    async fn open(&self, root: PathBuf, config: AppConfig) -> Result<LibraryManager> {
        let codec = Arc::clone(&self.codec);
        run_cancellable(move |ctx| LibraryManager::open(&root, codec, config, ctx)).await?
    }

    fn remember_root(&mut self, root: &std::path::Path) {
        if self.config_manager.last_root() == Some(root) {
            return;
        }
        match self.config_manager.set_last_root(root) {
            Ok(()) => debug!("Saved {} as last library root", root.display()),
            Err(e) => warn!("Could not save last library root: {}", e),
        }
    }
}

/// Run `operation` in the background, cancelling it on Ctrl-C.
async fn run_cancellable<T, F>(operation: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce(&OperationContext) -> T + Send + 'static,
{
    let ctx = OperationContext::new().with_sink(Arc::new(ConsoleProgress));
    let handle = spawn_operation(ctx, operation);
    let token = handle.token();

    let join = handle.join();
    tokio::pin!(join);
    tokio::select! {
        result = &mut join => result,
        Ok(()) = tokio::signal::ctrl_c() => {
            info!("Cancel requested, finishing the current file");
            eprintln!("Cancelling...");
            token.cancel();
            join.await
        }
    }
}

fn print_scan(library: &LibraryManager) {
    let index = library.index();
    println!("Library: {}", index.root().display());
    for folder in index.folders() {
        println!("  {:<40} {:>4} tracks", folder.name, folder.tracks.len());
    }
    println!("Playlists:");
    for playlist in index.playlists() {
        println!("  {:<40} {:>4} entries", playlist.name, playlist.entries.len());
    }
    if let Some(warning) = index.error_warning() {
        println!("{warning}");
    }
}

async fn run_playlist_command(library: LibraryManager, command: PlaylistCommand) -> Result<()> {
    match command {
        PlaylistCommand::List => {
            for playlist in library.index().playlists() {
                println!("{} ({} entries)", playlist.name, playlist.entries.len());
            }
        }
        PlaylistCommand::Show { name } => {
            let playlist = library.index().find_playlist(&name).ok_or_else(|| {
                Error::Playlist(bluesync_core::PlaylistError::NotFound { name: name.clone() })
            })?;
            for entry in playlist.entries.iter() {
                println!("{entry}");
            }
        }
        PlaylistCommand::Create { name } => {
            let path = run_cancellable(move |ctx| {
                let mut library = library;
                library.create_playlist(&name, ctx)
            })
            .await?;
            println!("Created {}", path?.display());
        }
        PlaylistCommand::Rename { name, new_name } => {
            let path = run_cancellable(move |ctx| {
                let mut library = library;
                library.rename_playlist(&name, &new_name, ctx)
            })
            .await?;
            println!("Renamed to {}", path?.display());
        }
        PlaylistCommand::Delete { name } => {
            let result = run_cancellable(move |ctx| {
                let mut library = library;
                library.delete_playlist(&name, ctx)
            })
            .await?;
            result?;
            println!("Deleted playlist");
        }
        PlaylistCommand::Add { name, selection } => {
            let scope = require_selection(selection.into_scope())?;
            let added = run_cancellable(move |ctx| {
                let mut library = library;
                library.add_to_playlist(&name, &scope, ctx)
            })
            .await?;
            println!("Added {} tracks", added?);
        }
        PlaylistCommand::Remove { name, selection } => {
            let scope = require_selection(selection.into_scope())?;
            let removed = run_cancellable(move |ctx| {
                let mut library = library;
                library.remove_from_playlist(&name, &scope, ctx)
            })
            .await?;
            println!("Removed {} tracks", removed?);
        }
    }
    Ok(())
}

fn require_selection(scope: Scope) -> Result<Scope> {
    if scope == Scope::All {
        return Err(Error::Configuration(
            "select the folders or tracks with --folder or --track".to_string(),
        ));
    }
    Ok(scope)
}
