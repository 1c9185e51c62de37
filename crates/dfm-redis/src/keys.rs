//! Key and channel naming helpers.
//!
//! Kept pure and dependency-free so their naming conventions are covered by plain
//! unit tests with no live Redis connection, the same way the checkpointer crate's
//! key-naming methods are tested standalone.

/// The keyed-store key for one request's persisted state.
#[must_use]
pub fn request_key(request_id: &str) -> String {
    format!("request:{request_id}")
}

/// The sorted-set key backing the scheduler's deadline-ordered queue.
#[must_use]
pub fn scheduler_queue_key() -> String {
    "sched-queue".to_string()
}

/// The stream name for one `(source, destination, topic)` channel.
#[must_use]
pub fn stream_name(src: &str, dst: &str, topic: &str) -> String {
    format!("{src}.{dst}.{topic}.stream")
}

/// The consumer group name for one `(source, destination, topic)` channel.
#[must_use]
pub fn group_name(src: &str, dst: &str, topic: &str) -> String {
    format!("{src}.{dst}.{topic}.group")
}

/// The well-known channel every site publishes execute jobs to.
#[must_use]
pub fn execute_channel() -> (String, String) {
    (stream_name("ANY", "EXECUTE", "req"), group_name("ANY", "EXECUTE", "req"))
}

/// The well-known channel every site publishes deadline-bearing jobs to.
#[must_use]
pub fn scheduler_channel() -> (String, String) {
    (
        stream_name("ANY", "SCHEDULER", "req"),
        group_name("ANY", "SCHEDULER", "req"),
    )
}

/// The well-known channel cross-site packages are relayed over.
#[must_use]
pub fn uplink_channel() -> (String, String) {
    (stream_name("ANY", "UPLINK", "req"), group_name("ANY", "UPLINK", "req"))
}

/// The key the uplink collaborator publishes this site's advertised name
/// under; execute falls back to its own configuration when absent.
#[must_use]
pub fn this_site_key() -> String {
    "this_site".to_string()
}

/// One request's named mailbox, for inter-pipeline message passing.
#[must_use]
pub fn mailbox_key(request_id: &str, name: &str) -> String {
    format!("{request_id}.{name}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_key_is_namespaced() {
        assert_eq!(request_key("abc-123"), "request:abc-123");
    }

    #[test]
    fn scheduler_queue_key_is_stable() {
        assert_eq!(scheduler_queue_key(), "sched-queue");
    }

    #[test]
    fn stream_and_group_names_follow_src_dst_topic_convention() {
        assert_eq!(stream_name("SITE_A", "EXECUTE", "req"), "SITE_A.EXECUTE.req.stream");
        assert_eq!(group_name("SITE_A", "EXECUTE", "req"), "SITE_A.EXECUTE.req.group");
    }

    #[test]
    fn well_known_channels_match_the_documented_names() {
        assert_eq!(execute_channel().0, "ANY.EXECUTE.req.stream");
        assert_eq!(execute_channel().1, "ANY.EXECUTE.req.group");
        assert_eq!(scheduler_channel().0, "ANY.SCHEDULER.req.stream");
        assert_eq!(uplink_channel().0, "ANY.UPLINK.req.stream");
    }

    #[test]
    fn mailbox_key_is_namespaced_under_the_request() {
        assert_eq!(mailbox_key("abc-123", "progress"), "abc-123.progress");
    }
}
