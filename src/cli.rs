use clap::Parser;
use megagen_core::BrowserEngine;

#[derive(Parser)]
#[command(name = "megagen", about = "Provision accounts through a signup form and a disposable mailbox")]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "config/default.toml")]
    pub config: String,

    /// Number of accounts to provision, one after another
    #[arg(short, long = "loop", default_value_t = 1)]
    pub loops: u32,

    /// Browser engine (chromium, firefox, webkit)
    #[arg(long)]
    pub engine: Option<BrowserEngine>,

    /// Show the browser window
    #[arg(long)]
    pub headful: bool,
}
