//! Admin CLI surface (C12 ambient stack): one clap binary exposing the
//! behaviors of `afdcfg`/`set_pw`/`del_cache`/`fra_view` as subcommands,
//! grounded on the corpus's own `Cli`/`Commands` derive shape in `cli.rs`.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[clap(author, version, about = "Admin tool for the AFD coordination fabric", long_about = None)]
pub struct Cli {
    #[clap(long, help = "Work directory root (defaults to ~/.afd)")]
    pub work_dir: Option<PathBuf>,
    #[clap(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    #[clap(about = "Show or edit AFD_CONFIG knobs", name = "afdconfig", display_order = 1)]
    AfdConfig {
        #[clap(long, help = "Set the AMG rescan interval, seconds")]
        stat_interval_secs: Option<u64>,
        #[clap(long, help = "Set the default per-host retry interval, seconds")]
        default_retry_interval_secs: Option<u64>,
        #[clap(long, help = "Set the default max_errors before a host is rendered erroneous")]
        default_max_errors: Option<u32>,
    },
    /// Toggles FSA/FRA feature-flag bits the way the original `afdcfg` tool's
    /// `-a|-A|-c|-C|-d|-D|-r|-R|-s` flags do, one bit per invocation.
    #[clap(about = "Toggle FSA/FRA feature-flag bits for one host or directory", name = "afdcfg", display_order = 2)]
    Afdcfg {
        #[clap(short = 'a', help = "Enable archiving for HOST")]
        enable_archive: bool,
        #[clap(short = 'A', help = "Disable archiving for HOST")]
        disable_archive: bool,
        #[clap(short = 'c', help = "Disable create-target-dir for HOST")]
        disable_create_target_dir: bool,
        #[clap(short = 'C', help = "Enable create-target-dir for HOST")]
        enable_create_target_dir: bool,
        #[clap(short = 'r', help = "Enable retrieving for HOST")]
        enable_retrieve: bool,
        #[clap(short = 'R', help = "Disable retrieving for HOST")]
        disable_retrieve: bool,
        #[clap(short = 'd', help = "Enable the DIR alias (clears DIR_DISABLED)")]
        enable_dir: bool,
        #[clap(short = 'D', help = "Disable the DIR alias (sets DIR_DISABLED)")]
        disable_dir: bool,
        #[clap(short = 's', help = "Show current flag status instead of toggling")]
        show_status: bool,
        #[clap(long, help = "Host alias the -a/-A/-c/-C/-r/-R flags apply to")]
        host: Option<String>,
        #[clap(long, help = "Directory alias the -d/-D flags apply to")]
        dir: Option<String>,
    },
    #[clap(about = "Set or look up an obfuscated host password", name = "set_pw", display_order = 3)]
    SetPw {
        #[clap(help = "user@host alias")]
        user: String,
        #[clap(help = "remote host alias")]
        host: String,
        #[clap(long, short, help = "Password to store; omit to print the stored value")]
        password: Option<String>,
    },
    #[clap(about = "Remove a cached message by position", name = "del_cache", display_order = 4)]
    DelCache {
        #[clap(help = "position in the message cache to remove")]
        pos: usize,
    },
    #[clap(about = "Print FRA directory entries", name = "fra_view", display_order = 5)]
    FraView {
        #[clap(help = "only show the directory with this alias")]
        alias: Option<String>,
    },
}
