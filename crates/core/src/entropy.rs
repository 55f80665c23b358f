//! Process-wide randomness source for key and nonce generation.
//!
//! The source is installed exactly once. The default draws from the OS CSPRNG
//! through `getrandom` (Web Crypto on wasm); an embedder that wants a different
//! strong source must install it before the first key is generated.

use std::sync::OnceLock;

use tracing::debug;

pub type RandomFn = fn(&mut [u8]) -> Result<(), String>;

static RANDOM_SOURCE: OnceLock<RandomFn> = OnceLock::new();

fn os_random(dest: &mut [u8]) -> Result<(), String> {
    getrandom::getrandom(dest).map_err(|e| e.to_string())
}

/// Install the OS randomness source. Returns `false` when a source was
/// already configured (the call is then a no-op).
pub fn configure_random_source() -> bool {
    configure_random_source_with(os_random)
}

/// Install a custom randomness source. Only the first configuration wins.
pub fn configure_random_source_with(source: RandomFn) -> bool {
    let mut installed = false;
    RANDOM_SOURCE.get_or_init(|| {
        installed = true;
        source
    });
    if installed {
        debug!("[entropy] random source configured");
    }
    installed
}

/// Fill `dest` with random bytes, configuring the default source on first use.
pub fn fill_random(dest: &mut [u8]) -> Result<(), String> {
    let source = RANDOM_SOURCE.get_or_init(|| os_random as RandomFn);
    source(dest)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_configure_is_idempotent() {
        configure_random_source();
        assert!(!configure_random_source());
        assert!(!configure_random_source_with(|_| Err("never used".into())));
    }

    #[test]
    fn test_fill_random_produces_distinct_output() {
        let mut a = [0u8; 32];
        let mut b = [0u8; 32];
        fill_random(&mut a).unwrap();
        fill_random(&mut b).unwrap();
        assert_ne!(a, b);
    }
}
