//! Route keeper daemon. Runs until killed.

use std::env;
use std::thread;

use seqroute::{logging, Config, Result, SeqRouteDaemon};

fn main() -> Result<()> {
    let mut config = match env::args().nth(1) {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };
    config.apply_env()?;

    logging::init(&config.log_level)?;
    tracing::info!("Starting seqrouted as {:?}", config.client_name);

    let daemon = SeqRouteDaemon::builder().config(config).build_alsa()?;
    daemon.log_summary()?;

    // Background threads do the work; shutdown happens when the process dies
    loop {
        thread::park();
    }
}
