//! Tracing subscriber bootstrap for hosts embedding the core.

use tracing_subscriber::EnvFilter;

/// Install a formatted subscriber filtered by `RUST_LOG`, falling back to
/// `default_filter` (for example `"gote_core=info"`).
///
/// Returns `Ok(false)` if a global subscriber is already installed.
pub fn init_tracing(default_filter: &str) -> crate::Result<bool> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(default_filter).map_err(|e| {
            crate::GoteError::Config(format!("Invalid log filter {:?}: {}", default_filter, e))
        })?,
    };

    Ok(tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init()
        .is_ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_init_is_harmless() {
        init_tracing("gote_core=debug").unwrap();
        let second = init_tracing("gote_core=debug").unwrap();

        assert!(!second);
    }
}
