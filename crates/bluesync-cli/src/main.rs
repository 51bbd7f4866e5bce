//! Bluesync - keeps an MP3 library on a USB stick playable on Blue&Me
//! car head units.
//!
//! This is the command line entry point.

mod commands;
mod logging;

use std::path::PathBuf;
use std::process::ExitCode;

use bluesync_core::{FixMode, Scope};
use clap::{ArgAction, Args, Parser, Subcommand, ValueEnum};
use tracing::{error, info};

use crate::commands::AppState;
use crate::logging::LoggingConfig;

/// Keep an MP3 library and its playlists compatible with Blue&Me head units.
#[derive(Debug, Parser)]
#[command(name = "bluesync", version, about)]
pub struct Cli {
    /// Library root. Defaults to the root used last.
    #[arg(short, long, global = true)]
    pub root: Option<PathBuf>,

    /// Drop playlist entries whose file is missing instead of failing.
    #[arg(long, global = true)]
    pub skip_missing: bool,

    /// Increase console verbosity (-v info, -vv debug, -vvv trace).
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

/// Top-level commands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Show the folders, tracks and playlists of the library.
    Scan,
    /// Rewrite tags and optionally renumber folders and tracks.
    Fix {
        /// What to do with the selected tracks.
        #[arg(long, value_enum, default_value_t = ModeArg::Tags)]
        mode: ModeArg,
        #[command(flatten)]
        selection: Selection,
    },
    /// Delete tracks and drop them from every playlist.
    Delete {
        #[command(flatten)]
        selection: Selection,
    },
    /// Remove folders that no longer hold music.
    Cleanup,
    /// Print text as the head unit would show it.
    Sanitize {
        /// Text to sanitise.
        text: String,
        /// Maximum length of the result.
        #[arg(long)]
        max_len: Option<usize>,
    },
    /// Manage playlists.
    Playlist {
        #[command(subcommand)]
        command: PlaylistCommand,
    },
}

/// Playlist commands.
#[derive(Debug, Subcommand)]
pub enum PlaylistCommand {
    /// List every playlist.
    List,
    /// Show the entries of a playlist.
    Show {
        /// Playlist name.
        name: String,
    },
    /// Create an empty playlist.
    Create {
        /// Playlist name.
        name: String,
    },
    /// Rename a playlist.
    Rename {
        /// Current name.
        name: String,
        /// New name.
        new_name: String,
    },
    /// Delete a playlist.
    Delete {
        /// Playlist name.
        name: String,
    },
    /// Add tracks to a playlist.
    Add {
        /// Playlist name.
        name: String,
        #[command(flatten)]
        selection: Selection,
    },
    /// Remove tracks from a playlist.
    Remove {
        /// Playlist name.
        name: String,
        #[command(flatten)]
        selection: Selection,
    },
}

/// Fix mode as accepted on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ModeArg {
    /// Rewrite tags only.
    Tags,
    /// Renumber every selected folder and track from 1.
    RenameAll,
    /// Keep existing numbers, number only new tracks.
    RenameNew,
}

impl From<ModeArg> for FixMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Tags => Self::TagsOnly,
            ModeArg::RenameAll => Self::RenameAll,
            ModeArg::RenameNew => Self::RenameNewOnly,
        }
    }
}

/// Folders and tracks an operation works on.
#[derive(Debug, Clone, Default, Args)]
pub struct Selection {
    /// Album folder to include (repeatable).
    #[arg(long = "folder")]
    pub folders: Vec<PathBuf>,
    /// Track to include (repeatable). Takes precedence over folders.
    #[arg(long = "track")]
    pub tracks: Vec<PathBuf>,
}

impl Selection {
    /// Whether nothing was selected.
    pub fn is_empty(&self) -> bool {
        self.folders.is_empty() && self.tracks.is_empty()
    }

    /// Convert to a scope; an empty selection means the whole library.
    pub fn into_scope(self) -> Scope {
        Scope::from_selection(self.folders, self.tracks)
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let _guard = match logging::init(&LoggingConfig::for_verbosity(cli.verbose)) {
        Ok(guard) => Some(guard),
        Err(e) => {
            eprintln!("warning: file logging disabled: {e}");
            None
        }
    };
    info!("Starting bluesync {}", env!("CARGO_PKG_VERSION"));

    let result = match AppState::new() {
        Ok(mut state) => state.execute(cli).await,
        Err(e) => Err(e),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}
