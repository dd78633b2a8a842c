pub mod broadcast;
pub mod config;
pub mod domain;
pub mod opt_out;
pub mod queue;
pub mod routes;
pub mod sms_client;
pub mod startup;
pub mod store;
pub mod telemetry;
pub mod worker;
pub mod worker_pool;

/// Writes an error followed by its chain of sources, one per line.
pub fn error_chain_fmt(
    e: &impl std::error::Error,
    f: &mut std::fmt::Formatter<'_>,
) -> std::fmt::Result {
    writeln!(f, "{}", e)?;
    let mut current = e.source();
    while let Some(cause) = current {
        writeln!(f, "Caused by:\n\t{}", cause)?;
        current = cause.source();
    }
    Ok(())
}
