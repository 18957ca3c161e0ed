use log::LevelFilter;

/// Installs `env_logger`, letting `RUST_LOG` override `level`. A second
/// call keeps the first logger.
pub fn init(level: LevelFilter) {
    let default_filter = level.to_string().to_ascii_lowercase();
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .format_timestamp_millis()
        .try_init();
}
