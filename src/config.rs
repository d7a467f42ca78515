//! Compile-time configuration.
//!
//! `cts-server` has some configuration settings that are set at compile time.
//!
//! They are set via environment variables at build time: set the variable named
//! `CTS_SERVER_<value>`. For example `CTS_SERVER_NOTIFY_INTERVAL_MS=1000 cargo build`.
//! You can also set them in the `[env]` section of `.cargo/config.toml`.

mod raw {
    #![allow(unused)]
    include!(concat!(env!("OUT_DIR"), "/config.rs"));
}

/// ATT MTU used for every response.
///
/// Responses are truncated or bounded to this size, the opcode byte included.
///
/// Default: 23.
pub const ATT_MTU: usize = raw::ATT_MTU;

/// Number of response buffers that can be in flight at the same time.
///
/// Read-by-type responses are assembled in a buffer taken from this pool. When the
/// pool is exhausted the request fails with insufficient resources.
///
/// Default: 2.
pub const RESPONSE_POOL_SIZE: usize = raw::RESPONSE_POOL_SIZE;

/// Default interval between two current time notifications, in milliseconds.
///
/// Default: 2000.
pub const NOTIFY_INTERVAL_MS: usize = raw::NOTIFY_INTERVAL_MS;

/// Maximum length of an attribute value.
pub const ATT_VALUE_MAX_LEN: usize = 512;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_time_values_are_usable() {
        assert!((23..=517).contains(&ATT_MTU));
        assert!(RESPONSE_POOL_SIZE > 0);
        assert!(NOTIFY_INTERVAL_MS > 0);
    }
}
