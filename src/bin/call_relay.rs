use std::sync::Arc;
use std::{env, process};

use rustycall::config::Config;
use rustycall::log::{LogSink, Logger};
use rustycall::signaling::{CallRelay, serve};
use rustycall::sink_info;
use tokio::net::TcpListener;

const DEFAULT_ADDR: &str = "0.0.0.0:5000";

#[tokio::main(flavor = "current_thread")]
async fn main() -> std::io::Result<()> {
    // --- Config --------------------------------------------------------------
    //
    // Read from call_relay.conf, falling back to call_default.conf. The
    // listen address comes from the command line first, then
    // `[Relay] listen_addr`, then 0.0.0.0:5000.
    let config = Config::load("call_relay.conf")
        .or_else(|_| Config::load("call_default.conf"))
        .unwrap_or_else(|e| {
            eprintln!("Error loading config: {e}. Using empty config.");
            Config::empty()
        });

    // --- Parse CLI args ------------------------------------------------------
    //
    // Supported:
    //   call_relay                 -> [Relay] listen_addr or 0.0.0.0:5000
    //   call_relay 0.0.0.0:6000
    //   call_relay 127.0.0.1 7000
    let args: Vec<String> = env::args().collect();
    let addr = match args.len() {
        1 => config
            .get_non_empty_or_default("Relay", "listen_addr", DEFAULT_ADDR)
            .to_owned(),
        2 => args[1].clone(),
        3 => format!("{}:{}", args[1], args[2]),
        _ => {
            eprintln!("Usage:");
            eprintln!("  {}                # listen on [Relay] listen_addr or {DEFAULT_ADDR}", args[0]);
            eprintln!("  {} [ADDR]         # e.g. 0.0.0.0:6000", args[0]);
            eprintln!("  {} [IP] [PORT]    # e.g. 127.0.0.1 6000", args[0]);
            process::exit(1);
        }
    };

    // --- Start process logger ------------------------------------------------
    let logger = Logger::start_from_config(&config, "call_relay");
    let log_sink: Arc<dyn LogSink> = Arc::new(logger.handle());
    eprintln!("[call_relay] logging to {}", logger.file_path().display());

    let listener = TcpListener::bind(&addr).await?;
    sink_info!(log_sink, "[call_relay] listening on {}", addr);
    eprintln!("[call_relay] listening on {addr}");

    let relay = Arc::new(CallRelay::new(Arc::clone(&log_sink)));
    serve(listener, relay, log_sink)
        .await
        .map_err(|e| std::io::Error::other(e.to_string()))
}
