use std::sync::Mutex;

use ulid::{Generator, Ulid};

/// Process-local monotonic ULID source. Monotonicity only holds within a
/// single process; restarts start a fresh counter.
///
/// A single `Mutex`-guarded `ulid::Generator` is shared process-wide;
/// producing an ID only ever does a brief lock + increment, so callers never
/// block on external I/O for it.
static GENERATOR: Mutex<Generator> = Mutex::new(Generator::new());

/// Generates a new ULID, monotonic with respect to the previous call on this
/// process within the same millisecond.
///
/// # Panics
/// Panics only if the shared generator's internal counter overflows within a
/// single millisecond, which requires generating more than 2^80 ids in 1ms -
/// effectively unreachable.
pub fn new_ulid() -> Ulid {
    let mut generator = GENERATOR.lock().expect("ulid generator mutex poisoned");
    generator
        .generate()
        .expect("ulid monotonic counter overflowed within a millisecond")
}

pub fn new_ulid_string() -> String {
    new_ulid().to_string()
}

/// Returns true if `s` parses as a syntactically valid ULID.
pub fn is_ulid(s: &str) -> bool {
    Ulid::from_string(s).is_ok()
}

/// Parses the embedded timestamp (ms since epoch) out of a ULID string.
pub fn parse_time_ms(s: &str) -> Option<u64> {
    Ulid::from_string(s).ok().map(|u| u.timestamp_ms())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_ids_are_valid_ulids() {
        let id = new_ulid_string();
        assert!(is_ulid(&id));
        assert_eq!(id.len(), 26);
    }

    #[test]
    fn ids_are_monotonic_within_process() {
        let mut prev = new_ulid_string();
        for _ in 0..1000 {
            let next = new_ulid_string();
            assert!(next > prev, "{next} should sort after {prev}");
            prev = next;
        }
    }

    #[test]
    fn parsed_time_is_not_in_the_future() {
        let id = new_ulid_string();
        let now_ms = chrono::Utc::now().timestamp_millis() as u64;
        let ts = parse_time_ms(&id).expect("valid ulid");
        assert!(ts <= now_ms + 5);
    }

    #[test]
    fn rejects_non_ulid_strings() {
        assert!(!is_ulid("not-a-ulid"));
        assert!(!is_ulid(""));
    }
}
