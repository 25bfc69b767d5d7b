//! # Protocol Configuration & Constants
//!
//! Every policy number in Gavel lives here. If you're hardcoding an
//! extension window somewhere else, you're doing it wrong.
//!
//! Registries copy these into their own configuration at construction time,
//! so changing a constant never retroactively alters a running auction.

// ---------------------------------------------------------------------------
// Protocol Version
// ---------------------------------------------------------------------------

/// The full version string of the contract suite.
pub const PROTOCOL_VERSION: &str = "0.1.0";

// ---------------------------------------------------------------------------
// Auction Timing
// ---------------------------------------------------------------------------

/// Anti-snipe extension window in seconds.
///
/// A bid accepted with less than this much time left pushes the deadline to
/// `now + EXTENSION_WINDOW_SECS`, so every late bid can still be answered.
pub const EXTENSION_WINDOW_SECS: u64 = 300;

/// Default lower bound on auction duration: one hour.
pub const DEFAULT_MIN_DURATION_SECS: u64 = 3_600;

/// Default upper bound on auction duration: thirty days.
pub const DEFAULT_MAX_DURATION_SECS: u64 = 30 * 24 * 3_600;

// ---------------------------------------------------------------------------
// Registry Limits
// ---------------------------------------------------------------------------

/// Hard cap on the page size accepted by `get_instances`. Reads are
/// unauthenticated, so they must stay bounded.
pub const MAX_PAGE_SIZE: usize = 100;

// ---------------------------------------------------------------------------
// Rewards
// ---------------------------------------------------------------------------

/// Decimal places of the participation credit. Same as the fee currency
/// convention: 8.
pub const REWARD_DECIMALS: u8 = 8;

/// One whole participation credit in the smallest unit. Minted once per
/// accepted bid.
pub const REWARD_UNIT: u64 = 100_000_000;

// ---------------------------------------------------------------------------
// Identifiers
// ---------------------------------------------------------------------------

/// BLAKE3 derive-key context for engine identifiers. Changing this changes
/// every engine id a registry will ever hand out.
pub const ENGINE_ID_CONTEXT: &str = "gavel 2026-10 auction engine id v1";

/// Number of hash bytes kept in an engine identifier (address-sized).
pub const ENGINE_ID_BYTES: usize = 20;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_bounds_are_ordered() {
        assert!(DEFAULT_MIN_DURATION_SECS < DEFAULT_MAX_DURATION_SECS);
    }

    #[test]
    fn extension_window_fits_inside_minimum_duration() {
        assert!(EXTENSION_WINDOW_SECS < DEFAULT_MIN_DURATION_SECS);
    }

    #[test]
    fn reward_unit_matches_decimals() {
        assert_eq!(REWARD_UNIT, 10u64.pow(REWARD_DECIMALS as u32));
    }
}
