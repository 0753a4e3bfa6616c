//! `TopicUtils`: pure functions for filter validation, wildcard detection,
//! shared-subscription parsing, and topic/filter matching. No state.

pub mod validation;

pub use validation::{
    topic_matches_filter as matches, validate_topic_filter, validate_topic_filter_with_max_levels,
    validate_topic_name, validate_topic_name_with_max_levels,
};

/// Sentinel prefix for MQTT 5 shared subscriptions.
pub const SHARE_PREFIX: &str = "$share/";

/// True if `filter` contains `+` or `#`.
pub fn is_wildcard(filter: &str) -> bool {
    filter.contains('+') || filter.contains('#')
}

/// True if `topic` begins with the shared-subscription sentinel.
pub fn is_shared(topic: &str) -> bool {
    topic.starts_with(SHARE_PREFIX)
}

/// Split `$share/<group>/<filter>` into `(group, filter)`. Fails if malformed.
pub fn parse_shared(topic: &str) -> Result<(&str, &str), &'static str> {
    let rest = topic
        .strip_prefix(SHARE_PREFIX)
        .ok_or("not a shared subscription filter")?;
    let slash = rest.find('/').ok_or("invalid shared subscription format")?;
    let group = &rest[..slash];
    let actual = &rest[slash + 1..];
    if group.is_empty() {
        return Err("shared subscription group name cannot be empty");
    }
    if group.contains('+') || group.contains('#') {
        return Err("shared subscription group name cannot contain wildcards");
    }
    if actual.is_empty() {
        return Err("shared subscription filter cannot be empty");
    }
    Ok((group, actual))
}

/// Unwrap a topic that may carry a `$share/<group>/<filter>` prefix into
/// `(filter, shareGroup)`, ready to store on a `SubscriptionRecord`.
pub fn unwrap_shared(topic: &str) -> Result<(&str, Option<&str>), &'static str> {
    if is_shared(topic) {
        let (group, filter) = parse_shared(topic)?;
        Ok((filter, Some(group)))
    } else {
        Ok((topic, None))
    }
}

/// Re-wrap a filter and optional share group back into wire form, e.g. for
/// cluster broadcast so peers parse it identically to the subscribing client.
pub fn rewrap_shared(filter: &str, share_group: Option<&str>) -> String {
    match share_group {
        Some(group) => format!("{SHARE_PREFIX}{group}/{filter}"),
        None => filter.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wildcard_detection() {
        assert!(is_wildcard("a/+/c"));
        assert!(is_wildcard("a/#"));
        assert!(!is_wildcard("a/b/c"));
    }

    #[test]
    fn shared_round_trip() {
        let (filter, group) = unwrap_shared("$share/g1/a/b").unwrap();
        assert_eq!(filter, "a/b");
        assert_eq!(group, Some("g1"));
        assert_eq!(rewrap_shared(filter, group), "$share/g1/a/b");
    }

    #[test]
    fn non_shared_passes_through() {
        let (filter, group) = unwrap_shared("a/b").unwrap();
        assert_eq!(filter, "a/b");
        assert_eq!(group, None);
        assert_eq!(rewrap_shared(filter, group), "a/b");
    }

    #[test]
    fn malformed_shared_is_rejected() {
        assert!(parse_shared("$share/g1").is_err());
        assert!(parse_shared("$share//a/b").is_err());
        assert!(parse_shared("$share/g1/").is_err());
    }
}
