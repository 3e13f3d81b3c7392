//! Logging initialization

/// Initialize `env_logger` with millisecond timestamps and a default filter
/// of `info` (override with `RUST_LOG`).
///
/// Later calls are ignored, so tools and benches can call it freely.
///
/// ```no_run
/// solidtree::core::logging::init_with_timestamps();
/// log::info!("Engine started");
/// ```
pub fn init_with_timestamps() {
    let _ = env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or("info"),
    )
    .format_timestamp_millis()
    .try_init();
}
