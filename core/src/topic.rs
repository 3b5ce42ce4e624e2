//! Topic key builder (C2): pure composition of `<prefix>:<topic>` with
//! idempotent separator handling. No I/O.

/// Join `prefix` and `topic` with exactly one `:` separator at the seam,
/// regardless of whether either operand already ends or begins with one.
/// An empty prefix returns the bare topic.
pub fn build_topic_key(prefix: &str, topic: &str) -> String {
    if prefix.is_empty() {
        return topic.to_string();
    }

    let prefix_ends_colon = prefix.ends_with(':');
    let topic_starts_colon = topic.starts_with(':');

    if prefix_ends_colon && topic_starts_colon {
        format!("{prefix}{}", &topic[1..])
    } else if prefix_ends_colon || topic_starts_colon {
        format!("{prefix}{topic}")
    } else {
        format!("{prefix}:{topic}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_prefix_returns_bare_topic() {
        assert_eq!(build_topic_key("", "x"), "x");
    }

    #[test]
    fn no_seam_colons_inserts_one() {
        assert_eq!(build_topic_key("ai-re", "x"), "ai-re:x");
    }

    #[test]
    fn trailing_prefix_colon_and_leading_topic_colon_collapse_to_one() {
        assert_eq!(build_topic_key("ai-re:", ":x"), "ai-re:x");
    }

    #[test]
    fn trailing_prefix_colon_alone_is_not_duplicated() {
        assert_eq!(build_topic_key("ai-re:", "x"), "ai-re:x");
    }

    #[test]
    fn leading_topic_colon_alone_is_not_duplicated() {
        assert_eq!(build_topic_key("ai-re", ":x"), "ai-re:x");
    }

    #[test]
    fn never_produces_a_double_colon_at_the_seam() {
        for (prefix, topic) in [
            ("ai-re", "x"),
            ("ai-re:", "x"),
            ("ai-re", ":x"),
            ("ai-re:", ":x"),
            ("", "x"),
        ] {
            let key = build_topic_key(prefix, topic);
            assert!(!key.contains("::"), "double colon in {key:?}");
        }
    }

    #[test]
    fn session_timestamped_prefix() {
        assert_eq!(
            build_topic_key("ai-re:20250605143022", "user_message_raw"),
            "ai-re:20250605143022:user_message_raw"
        );
    }
}
