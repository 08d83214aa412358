use anyhow::Result;
use clap::Parser;

use afd_fabric::cli::{Cli, Commands};
use afd_fabric::config::AfdConfig;
use afd_fabric::{commands, logging};

fn default_work_dir() -> std::path::PathBuf {
    dirs::home_dir().unwrap_or_else(|| std::path::PathBuf::from(".")).join(".afd")
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let work_dir = cli.work_dir.clone().unwrap_or_else(default_work_dir);
    let config = AfdConfig::init(&work_dir, 0)?;

    // Keep the tracing guard alive for the rest of `main`; a short-lived
    // admin command does not need to leak it the way a long-running
    // daemon entry point would.
    let _tracing_guard = logging::init_tracing(&config.work_dir, false).ok();

    let exit = match cli.command {
        Commands::AfdConfig { stat_interval_secs, default_retry_interval_secs, default_max_errors } => {
            commands::handle_afdconfig(&config, stat_interval_secs, default_retry_interval_secs, default_max_errors)?
        }
        Commands::Afdcfg {
            enable_archive,
            disable_archive,
            disable_create_target_dir,
            enable_create_target_dir,
            enable_retrieve,
            disable_retrieve,
            enable_dir,
            disable_dir,
            show_status,
            host,
            dir,
        } => commands::handle_afdcfg(
            &config,
            commands::AfdcfgFlags {
                enable_archive,
                disable_archive,
                disable_create_target_dir,
                enable_create_target_dir,
                enable_retrieve,
                disable_retrieve,
                enable_dir,
                disable_dir,
                show_status,
                host,
                dir,
            },
        )?,
        Commands::SetPw { user, host, password } => commands::handle_set_pw(&config, user, host, password)?,
        Commands::DelCache { pos } => commands::handle_del_cache(&config, pos)?,
        Commands::FraView { alias } => commands::handle_fra_view(&config, alias)?,
    };

    std::process::exit(exit.code());
}
