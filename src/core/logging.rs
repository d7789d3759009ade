//! Logging initialization

/// Initialize the logging system
///
/// Uses env_logger with default filter level of `info`.
/// Override with RUST_LOG environment variable, e.g. `RUST_LOG=verdant=debug`.
///
/// # Example
/// ```
/// verdant::core::logging::init();
/// log::info!("Grass field started");
/// ```
pub fn init() {
    init_with_default("info");
}

/// Initialize logging with a custom default filter.
///
/// Safe to call more than once; later calls are ignored.
pub fn init_with_default(filter: &str) {
    let _ = env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(filter)
    ).try_init();
}
