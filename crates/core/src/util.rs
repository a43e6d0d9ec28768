use std::time::{SystemTime, UNIX_EPOCH};

use ulid::Ulid;

/// Current unix time in whole seconds. A clock before the epoch reads as 0.
pub fn now_unix() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_secs() as i64)
}

/// Opaque id for a staged submission.
pub fn new_ulid() -> Ulid {
    Ulid::new()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clock_is_past_2023() {
        assert!(now_unix() > 1_672_531_200);
    }

    #[test]
    fn ulid_timestamp_matches_clock() {
        let secs = (new_ulid().timestamp_ms() / 1000) as i64;
        assert!((secs - now_unix()).abs() <= 1);
    }
}
