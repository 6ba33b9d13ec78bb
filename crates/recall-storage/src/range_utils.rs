//! Range query helpers for prefix scans.

/// Exclusive end bound for a prefix range query.
///
/// "session-1:" becomes "session-1;" (next ASCII char after ':'), so
/// `range(prefix..end)` visits exactly the keys starting with the prefix.
pub fn prefix_end_bound(prefix: &str) -> String {
    if prefix.is_empty() {
        return String::new();
    }

    let mut bytes = prefix.as_bytes().to_vec();
    if let Some(last) = bytes.last_mut() {
        *last = last.saturating_add(1);
    }

    String::from_utf8(bytes).unwrap_or_else(|_| format!("{}\u{10FFFF}", prefix))
}

pub fn prefix_range(prefix: &str) -> (String, String) {
    (prefix.to_string(), prefix_end_bound(prefix))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prefix_end_bound() {
        assert_eq!(prefix_end_bound("session-1:"), "session-1;");
        assert_eq!(prefix_end_bound("a:b:"), "a:b;");
        assert_eq!(prefix_end_bound(""), "");
    }

    #[test]
    fn test_prefix_range_covers_sequence_keys() {
        let (start, end) = prefix_range("s:");
        let key = "s:00000000000000000042";
        assert!(start.as_str() <= key && key < end.as_str());
        assert!(!("t:0" < end.as_str()));
    }
}
