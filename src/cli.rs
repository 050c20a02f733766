use clap::Parser;
use std::path::PathBuf;

use crate::hash::HashAlgorithm;
use crate::report::OutputFormat;

#[derive(Parser, Debug, Default)]
#[command(
    name = "dircmp",
    about = "Find duplicate files in a directory tree, or prune a repository tree against a candidate tree",
    after_help = "Typical usage:\n  \
        dircmp ~/photos                               report duplicates\n  \
        dircmp ~/photos --save-snapshot photos.db     digest once, reuse later\n  \
        dircmp ~/photos --repository /mnt/backup      decide which backup copies to keep\n  \
        dircmp ~/photos --repository /mnt/backup --new-files"
)]
pub struct Cli {
    /// Candidate tree to scan (the arbiter when a repository is given)
    pub dir: Option<PathBuf>,

    /// Repository tree to compare against and prune
    #[arg(short, long, value_name = "DIR")]
    pub repository: Option<PathBuf>,

    /// Load the candidate tree's digests from a snapshot instead of scanning
    #[arg(long, value_name = "FILE")]
    pub load_snapshot: Option<PathBuf>,

    /// Load the repository tree's digests from a snapshot instead of scanning
    #[arg(long, value_name = "FILE")]
    pub load_repository_snapshot: Option<PathBuf>,

    /// Digest DIR, save the result to FILE and stop
    #[arg(long, value_name = "FILE")]
    pub save_snapshot: Option<PathBuf>,

    /// Digest algorithm (default: xxh64)
    #[arg(long, value_enum)]
    pub hash: Option<HashAlgorithm>,

    /// List repository files whose content is not in the candidate tree
    #[arg(long)]
    pub new_files: bool,

    /// Really delete repository copies marked for deletion (default: report only)
    #[arg(long)]
    pub delete: bool,

    /// Output format (default: human)
    #[arg(long, value_enum)]
    pub format: Option<OutputFormat>,

    /// Shorthand for --format csv
    #[arg(short = 'c', long)]
    pub csv: bool,

    /// Print debugging information to stderr
    #[arg(long)]
    pub debug: bool,

    /// Number of hashing threads (default: available cores)
    #[arg(short, long, value_name = "N")]
    pub jobs: Option<usize>,

    /// Follow symbolic links
    #[arg(long)]
    pub follow_symlinks: bool,

    /// Include hidden files and directories
    #[arg(long)]
    pub hidden: bool,

    /// Ignore zero-length files
    #[arg(long)]
    pub skip_empty: bool,

    /// Include only files matching these glob patterns
    #[arg(long, value_name = "GLOB")]
    pub include: Vec<String>,

    /// Exclude files matching these glob patterns
    #[arg(long, value_name = "GLOB")]
    pub exclude: Vec<String>,

    /// Show a live progress panel while digesting
    #[arg(long)]
    pub progress: bool,

    /// Options file (default: dircmp_options.yaml in the current or executable directory)
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,
}

/// Exit code for a command line clap refused to parse. `--help` and
/// `--version` are not failures.
pub fn usage_exit_code(err: &clap::Error) -> i32 {
    if err.use_stderr() {
        1
    } else {
        0
    }
}
