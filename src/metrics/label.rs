//! Label Sanitizer
//!
//! Metric and label names may only contain `[A-Za-z0-9_]`. Names supplied by
//! users or read from the cluster are mapped onto that alphabet: the common
//! separators `-`, `.` and `/` become `_`, every other character is dropped.
//! Label values are never sanitized.

/// Map an arbitrary string onto a valid metric or label name.
pub fn valid_label(name: &str) -> String {
    name.chars()
        .filter_map(|c| match c {
            'A'..='Z' | 'a'..='z' | '0'..='9' | '_' => Some(c),
            '-' | '.' | '/' => Some('_'),
            _ => None,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn is_valid_label(name: &str) -> bool {
        name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
    }

    #[test]
    fn test_maps_separators_to_underscore() {
        assert_eq!(valid_label("my-app.io/Name"), "my_app_io_Name");
        assert_eq!(valid_label("already_valid_123"), "already_valid_123");
    }

    #[test]
    fn test_drops_other_characters() {
        assert_eq!(valid_label("a b:c@d"), "abcd");
        assert_eq!(valid_label("émoji🚀"), "moji");
        assert_eq!(valid_label("!!!"), "");
        assert_eq!(valid_label(""), "");
    }

    #[test]
    fn test_namespace_prefixed_series_name() {
        assert_eq!(
            valid_label(&format!("{}_{}", "crossplane-system", "bucket")),
            "crossplane_system_bucket"
        );
    }

    proptest! {
        #[test]
        fn prop_output_uses_label_alphabet(s in ".*") {
            prop_assert!(is_valid_label(&valid_label(&s)));
        }

        #[test]
        fn prop_idempotent(s in ".*") {
            let once = valid_label(&s);
            prop_assert_eq!(valid_label(&once), once.clone());
        }

        #[test]
        fn prop_never_longer_than_input(s in ".*") {
            prop_assert!(valid_label(&s).chars().count() <= s.chars().count());
        }
    }
}
