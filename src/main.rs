use aiterm_triggers::cli::{self, Cli};
use anyhow::Result;
use clap::Parser;

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Route log::info!() etc. to /tmp/aiterm_debug.log. When RUST_LOG is set,
    // also mirror to stderr. --log-level takes precedence over DEBUG_LEVEL.
    aiterm_triggers::debug::init_log_bridge(cli.log_level.map(|l| l.to_level_filter()));

    log::info!("Starting aiterm-triggers {}", aiterm_triggers::VERSION);

    match cli::run(cli) {
        Ok(0) => Ok(()),
        Ok(code) => {
            // Non-zero exit from a completed command; nothing left to drop.
            std::process::exit(code);
        }
        Err(e) => {
            eprintln!("aiterm-triggers: error: {e:#}");
            Err(e)
        }
    }
}
