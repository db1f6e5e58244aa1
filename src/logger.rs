use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// Installs the global tracing subscriber.
///
/// Worker children pass `to_stderr` because their stdout carries the event stream.
pub fn init_logging(verbose: bool, no_color: bool, to_stderr: bool) {
    let filter = std::env::var("SOCKME_LOG")
        .or_else(|_| std::env::var("RUST_LOG"))
        .map_or_else(
            |_| {
                if verbose {
                    EnvFilter::new("debug")
                } else {
                    EnvFilter::new("info")
                }
            },
            |value| EnvFilter::try_new(value).unwrap_or_else(|_| EnvFilter::new("info")),
        );

    let builder = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_ansi(!no_color);

    let result = if to_stderr {
        tracing::subscriber::set_global_default(
            builder.with_writer(std::io::stderr).finish(),
        )
    } else {
        tracing::subscriber::set_global_default(builder.finish())
    };

    if let Err(err) = result {
        eprintln!("Failed to set global default subscriber: {}", err);
    }
}
