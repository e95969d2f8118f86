//! ytpipe: YouTube analytics ETL pipeline.
//!
//! Logs go to stderr so command output on stdout stays pipeable.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use ytpipe::cli;

fn default_filter(verbose: bool) -> &'static str {
    if verbose {
        "ytpipe=info,tower_http=info"
    } else {
        "ytpipe=warn"
    }
}

/// `YTPIPE_LOG` wins over `RUST_LOG`; `-v` raises the default to info.
fn init_logging() {
    let filter = EnvFilter::try_from_env("YTPIPE_LOG")
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new(default_filter(cli::is_verbose())));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // .env may hold RAW_BUCKET, GCP_PROJECT or YTPIPE_LOG, so it loads first
    dotenvy::dotenv().ok();
    init_logging();
    tracing::debug!("ytpipe {} starting", env!("CARGO_PKG_VERSION"));

    cli::run().await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_filter_parses() {
        for verbose in [false, true] {
            assert!(default_filter(verbose).parse::<EnvFilter>().is_ok());
        }
        assert!(default_filter(true).contains("ytpipe=info"));
        assert_eq!(default_filter(false), "ytpipe=warn");
    }
}
