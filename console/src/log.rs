use log::LevelFilter;

/// Initializes the logger for the console.
///
/// Logs go to stderr so they never interleave with command output on stdout.
///
/// Log level is Debug in development builds and Info in production builds.
/// `RUST_LOG` overrides both, e.g. `RUST_LOG=ollama_console_lib=trace`.
pub fn init() {
    let default_level = if cfg!(debug_assertions) {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };

    let result = env_logger::Builder::new()
        .filter_level(default_level)
        .filter_module("hyper_util", LevelFilter::Warn)
        .filter_module("reqwest", LevelFilter::Info)
        .parse_env("RUST_LOG")
        .format_timestamp_millis()
        .try_init();

    if let Err(e) = result {
        eprintln!("Logger already initialized: {}", e);
    }
}
