#![cfg_attr(not(debug_assertions), windows_subsystem = "windows")]

use anyhow::Result;
use clap::Parser;
use weblauncher::LaunchOptions;

#[derive(Debug, Parser)]
#[command(name = "weblauncher", version, about = "Opens a configured web page from the system tray")]
struct Args {
    /// Stay resident in the tray even if the config says otherwise
    #[arg(long)]
    tray: bool,
    /// Open the page once and exit
    #[arg(long)]
    open: bool,
    /// Use built-in settings only: no config file, no live reload
    #[arg(long = "static")]
    static_config: bool,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    weblauncher::run(LaunchOptions {
        force_tray: args.tray,
        open_once: args.open,
        static_config: args.static_config,
    })
}
