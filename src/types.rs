use garde::Validate;
use serde::Deserialize;
use std::fmt::Display;

/// Lease token value the cache uses to signal a *hot miss*: another requester
/// already holds the real lease and the receiver must back off and retry.
pub const HOT_MISS_TOKEN: u64 = 1;

/// Lease token value meaning "no active lease".
pub const NO_LEASE_TOKEN: u64 = 0;

/// Result-class discriminant of a cache wire reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyClass {
    Hit,
    Miss,
    /// Anything that is neither a hit nor a definite miss: timeouts, remote
    /// errors, shutdown in progress.
    Other,
}

impl ReplyClass {
    #[inline]
    pub fn is_hit(&self) -> bool {
        matches!(self, Self::Hit)
    }

    #[inline]
    pub fn is_miss(&self) -> bool {
        matches!(self, Self::Miss)
    }
}

/// Reply of a cache fetch operation (`get` / `lease_get`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchReply {
    pub class:       ReplyClass,
    /// Raw payload of a hit; the serialized form of a previously stored reply.
    pub value:       Option<Vec<u8>>,
    /// Token minted by the cache on a `lease_get` miss. [`NO_LEASE_TOKEN`]
    /// when leases are not in play for this reply.
    pub lease_token: u64,
}

impl FetchReply {
    pub fn hit(value: Vec<u8>) -> Self {
        Self {
            class:       ReplyClass::Hit,
            value:       Some(value),
            lease_token: NO_LEASE_TOKEN,
        }
    }

    pub fn miss() -> Self {
        Self {
            class:       ReplyClass::Miss,
            value:       None,
            lease_token: NO_LEASE_TOKEN,
        }
    }

    /// A miss carrying a lease token, as produced by `lease_get`.
    pub fn lease_miss(lease_token: u64) -> Self {
        Self {
            class: ReplyClass::Miss,
            value: None,
            lease_token,
        }
    }

    pub fn other() -> Self {
        Self {
            class:       ReplyClass::Other,
            value:       None,
            lease_token: NO_LEASE_TOKEN,
        }
    }
}

/// Reply of a cache store operation (`set` / `lease_set`).
///
/// `stored` is `false` when the cache refused the write, e.g. because the
/// lease token no longer named the current lease.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreReply {
    pub stored: bool,
}

/// Settings of the lease protocol on the read and write paths.
///
/// With leases enabled a miss hands the first requester a token that makes it
/// the designated writer; everyone else observes the hot-miss sentinel and
/// retries with exponential backoff instead of recomputing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Validate)]
#[serde(default)]
pub struct LeaseSettings {
    #[garde(skip)]
    pub enable_leases:   bool,
    /// Initial wait of a retry on a hot miss, milliseconds.
    #[garde(range(min = 1), custom(Self::at_most("max_wait_ms", &self.max_wait_ms)))]
    pub initial_wait_ms: i32,
    /// Cap on the exponentially growing retry wait, milliseconds.
    #[garde(range(min = 1))]
    pub max_wait_ms:     i32,
    /// Number of retries on a hot miss.
    #[garde(range(min = 0))]
    pub num_retries:     i32,
}

impl Default for LeaseSettings {
    fn default() -> Self {
        Self {
            enable_leases:   false,
            initial_wait_ms: 2,
            max_wait_ms:     500,
            num_retries:     10,
        }
    }
}

impl LeaseSettings {
    fn at_most<'a, T: PartialOrd + Display>(
        limit_name: &'static str,
        limit: &'a T,
    ) -> impl FnOnce(&'a T, &()) -> garde::Result {
        move |value, _| {
            if value > limit {
                Err(garde::Error::new(format!("must not exceed {limit_name} ({limit})")))
            }
            else {
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lease_defaults() {
        let settings = LeaseSettings::default();
        assert!(!settings.enable_leases);
        assert_eq!(settings.initial_wait_ms, 2);
        assert_eq!(settings.max_wait_ms, 500);
        assert_eq!(settings.num_retries, 10);
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn initial_wait_must_not_exceed_max_wait() {
        let settings = LeaseSettings {
            initial_wait_ms: 600,
            max_wait_ms: 500,
            ..Default::default()
        };
        assert!(settings.validate().is_err());
    }
}
