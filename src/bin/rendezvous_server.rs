use std::sync::Arc;
use std::{env, process};

use roomdrop::config::Config;
use roomdrop::log::LogSink;
use roomdrop::log::logger::{Logger, LoggingConfig};
use roomdrop::rendezvous::{RendezvousConfig, RendezvousServer};

fn main() -> std::io::Result<()> {
    // Supported:
    //   rendezvous_server                 -> [rendezvous] listen, or 0.0.0.0:8080
    //   rendezvous_server 0.0.0.0:6000
    //   rendezvous_server 127.0.0.1 6000
    //
    // ROOMDROP_CONFIG points at the settings file (default: roomdrop.conf).
    let config_path = env::var("ROOMDROP_CONFIG").unwrap_or_else(|_| "roomdrop.conf".to_owned());
    let cfg = match Config::load(&config_path) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("[rendezvous_server] {config_path}: {e}; using defaults");
            Config::empty()
        }
    };

    let args: Vec<String> = env::args().collect();
    let addr = match args.len() {
        1 => RendezvousConfig::from_config(&cfg).listen,
        2 => args[1].clone(),
        3 => format!("{}:{}", args[1], args[2]),
        _ => {
            eprintln!("Usage:");
            eprintln!("  {}                # listen on [rendezvous] listen or 0.0.0.0:8080", args[0]);
            eprintln!("  {} [ADDR]         # e.g. 0.0.0.0:6000", args[0]);
            eprintln!("  {} [IP] [PORT]    # e.g. 127.0.0.1 6000", args[0]);
            process::exit(1);
        }
    };

    let mut logging = LoggingConfig::from_config(&cfg);
    if cfg.get_non_empty("logging", "filename").is_none() {
        logging.app_name = "rendezvous_server".to_owned();
    }
    let logger = Logger::start(&logging);
    let log_sink: Arc<dyn LogSink> = Arc::new(logger.handle());

    eprintln!(
        "[rendezvous_server] starting on {} (log: {})",
        addr,
        logger.file_path().display()
    );
    RendezvousServer::bind(&addr, log_sink)?.run()
}
