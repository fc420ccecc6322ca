use tracing_subscriber::{filter::LevelFilter, EnvFilter};

/// The level picked by the `--verbose`/`--quiet` switches. Quiet always wins.
pub fn level(verbose: bool, quiet: bool) -> LevelFilter {
    if quiet {
        LevelFilter::OFF
    } else if verbose {
        LevelFilter::DEBUG
    } else {
        LevelFilter::INFO
    }
}

/// Install the global subscriber. `log` records from the library are forwarded to it.
///
/// `RUST_LOG` refines the level unless `quiet` is set.
pub fn init(verbose: bool, quiet: bool) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let filter = if quiet {
        EnvFilter::new("off")
    } else {
        EnvFilter::builder()
            .with_default_directive(level(verbose, quiet).into())
            .from_env_lossy()
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn levels() {
        assert_eq!(level(false, false), LevelFilter::INFO);
        assert_eq!(level(true, false), LevelFilter::DEBUG);
        assert_eq!(level(false, true), LevelFilter::OFF);
        assert_eq!(level(true, true), LevelFilter::OFF);
    }
}
