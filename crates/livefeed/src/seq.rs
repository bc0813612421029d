use std::sync::atomic::{AtomicU64, Ordering};

/// Issues monotonically increasing request tokens for one surface and
/// rejects responses that arrive after a newer request was issued.
///
/// Each surface owns exactly one guard; sharing a guard across surfaces
/// would couple their refresh streams. Last-issued-wins, not
/// last-arrived-wins: a response is applied only if its token still equals
/// the counter when the response lands.
#[derive(Debug, Default)]
pub struct SequenceGuard {
    counter: AtomicU64,
}

impl SequenceGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Issue the next token. Every outgoing secondary fetch takes one.
    pub fn next(&self) -> u64 {
        self.counter.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Whether `token` is still the most recently issued one.
    pub fn is_current(&self, token: u64) -> bool {
        self.counter.load(Ordering::SeqCst) == token
    }
}

/// Extract the echoed sequence number from a fetched HTML fragment.
///
/// The table endpoint echoes the request's token back inside the fragment
/// as `data-sequence-number="N"`. No HTML parsing beyond locating that
/// attribute is done here; rendering the fragment is the caller's concern.
pub fn fragment_sequence_number(fragment: &str) -> Option<u64> {
    const ATTR: &str = "data-sequence-number=\"";
    let start = fragment.find(ATTR)? + ATTR.len();
    let rest = &fragment[start..];
    let end = rest.find('"')?;
    rest[..end].parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokens_strictly_increase() {
        let guard = SequenceGuard::new();
        let first = guard.next();
        let second = guard.next();
        assert!(second > first);
    }

    #[test]
    fn test_only_latest_token_is_current() {
        let guard = SequenceGuard::new();
        let stale = guard.next();
        let fresh = guard.next();
        assert!(!guard.is_current(stale));
        assert!(guard.is_current(fresh));
    }

    #[test]
    fn test_fragment_sequence_number_found() {
        let fragment =
            r#"<div class="notifications" data-sequence-number="17"><table></table></div>"#;
        assert_eq!(fragment_sequence_number(fragment), Some(17));
    }

    #[test]
    fn test_fragment_sequence_number_missing() {
        assert_eq!(fragment_sequence_number("<div></div>"), None);
    }

    #[test]
    fn test_fragment_sequence_number_unparseable() {
        assert_eq!(
            fragment_sequence_number(r#"<div data-sequence-number="x">"#),
            None
        );
    }
}
