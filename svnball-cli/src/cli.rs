use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Define CLI arguments
#[derive(Parser)]
#[command(
    author = "hua0512 <https://github.com/hua0512>",
    version,
    about = "Revision-named tarballs of Subversion repositories",
    long_about = "Builds and serves .tar.gz snapshots of Subversion repository paths.\n\
                  \n\
                  Archives are named after the module, branch and revision they contain,\n\
                  so each one is built once and served statically afterwards. Several\n\
                  worker processes can share one cache directory."
)]
pub struct CliArgs {
    /// Configuration file
    #[arg(
        short,
        long,
        global = true,
        help = "Path to the TOML configuration file (default: ./svnball.toml)"
    )]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true, help = "Enable detailed debug logging")]
    pub verbose: bool,

    /// Also write logs to this file
    #[arg(long, global = true, help = "Append log output to this file as well as stdout")]
    pub log_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Serve archive links and downloads over HTTP
    Serve {
        /// Address to listen on, overrides `server.bind`
        #[arg(short, long)]
        bind: Option<String>,
    },

    /// Print the archive name for a repository URL
    Resolve {
        url: String,

        /// Base file name replacing the module name
        #[arg(short = 'n', long)]
        base_filename: Option<String>,
    },

    /// Build the archive for a repository URL if it doesn't exist yet
    Generate {
        url: String,

        /// Base file name replacing the module name
        #[arg(short = 'n', long)]
        base_filename: Option<String>,
    },

    /// Refresh cached revisions, of one URL or of every known one
    Refresh { url: Option<String> },

    /// Print the branch and tag layout below a repository URL as JSON
    Tree {
        url: String,

        /// How many levels to descend
        #[arg(short, long, default_value = "2")]
        depth: usize,
    },
}
