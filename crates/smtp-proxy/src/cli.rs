use clap::Parser;
use std::path::PathBuf;

use crate::config::Config;

#[derive(Parser, Debug)]
#[command(name = "smtp-proxy", version, about = "TCP proxy and SMTP logger")]
pub struct Cli {
    /// Path to the configuration file
    #[arg(short, long, default_value = "smtp-proxy.yaml")]
    pub config: PathBuf,

    /// Local address to listen on (overrides config file setting)
    #[arg(long)]
    pub local: Option<String>,

    /// Upstream address to relay to (overrides config file setting)
    #[arg(long)]
    pub remote: Option<String>,

    /// Log file (overrides config file setting)
    #[arg(long)]
    pub log: Option<PathBuf>,

    /// Log hex dumps and read/write timings of every chunk
    #[arg(short, long)]
    pub verbose: bool,
}

impl Cli {
    /// Merge command-line overrides into the loaded configuration.
    pub fn apply(&self, cfg: &mut Config) {
        if let Some(ref local) = self.local {
            cfg.network.local_addr = local.clone();
        }
        if let Some(ref remote) = self.remote {
            cfg.network.remote_addr = remote.clone();
        }
        if let Some(ref log) = self.log {
            cfg.logging.log_file = log.clone();
        }
        if self.verbose {
            cfg.logging.verbose = true;
        }
    }
}
