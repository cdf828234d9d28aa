use directories::ProjectDirs;
use log::{debug, error};

use threedi_schema::cli::Cli;
use threedi_schema::config::{Config, CONFIG};
use threedi_schema::logging;

fn main() {
    let config = match ProjectDirs::from("nl", "nelen-schuurmans", "threedi-schema") {
        Some(project_dirs) => Config::load_config(&project_dirs),
        None => {
            eprintln!("Could not determine the configuration directory. Using defaults.");
            Config::default()
        }
    };

    // keep the handle alive so buffered log lines are flushed on exit
    let _logger = match logging::init_logging(&config.logging) {
        Ok(handle) => Some(handle),
        Err(e) => {
            eprintln!("Failed to start logging: {}", e);
            None
        }
    };
    CONFIG.set(config).ok();
    debug!("Command-line args: {:?}", std::env::args_os().collect::<Vec<_>>());

    if let Err(err) = Cli::handle_command_line() {
        error!("{:?}", err);
        eprintln!("{}", err);
        std::process::exit(1);
    }
}
