//! Backing-store key layout.
//!
//! Shared by every process talking to the same store, so the names below
//! must not change:
//!
//! | Key | Type |
//! |---|---|
//! | `<prefix>:queues` | set of registered names |
//! | `<prefix>/<name>` | pending list |
//! | `<prefix>/<name>:processing` | list |
//! | `<prefix>/<name>:scheduled` | sorted set scored by due time |
//! | `<prefix>/<name>:dead` | list |
//! | `<prefix>/<name>:id` | counter |
//! | `<prefix>/<name>:data:<id>` | payload |
//! | `<prefix>/<name>:metadata:<id>` | message metadata hash |
//! | `<prefix>/<name>:metadata` | queue metadata hash |

/// Key of the registry set for `prefix`.
pub(crate) fn registry(prefix: Option<&str>) -> String {
    match prefix {
        Some(prefix) => format!("{prefix}:queues"),
        None => "queues".to_string(),
    }
}

/// Precomputed keys for one queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Keys {
    pub name: String,
    pub registry: String,
    /// Queue id; doubles as the pending list key.
    pub pending: String,
    pub processing: String,
    pub scheduled: String,
    pub dead: String,
    pub counter: String,
    pub metadata: String,
}

impl Keys {
    pub fn new(prefix: Option<&str>, name: &str) -> Self {
        let id = match prefix {
            Some(prefix) => format!("{prefix}/{name}"),
            None => name.to_string(),
        };

        Self {
            name: name.to_string(),
            registry: registry(prefix),
            processing: format!("{id}:processing"),
            scheduled: format!("{id}:scheduled"),
            dead: format!("{id}:dead"),
            counter: format!("{id}:id"),
            metadata: format!("{id}:metadata"),
            pending: id,
        }
    }

    /// Payload key of a message.
    pub fn data(&self, id: u64) -> String {
        format!("{}:data:{id}", self.pending)
    }

    /// Metadata key of a message.
    pub fn message_metadata(&self, id: u64) -> String {
        format!("{}:metadata:{id}", self.pending)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prefixed_layout() {
        let keys = Keys::new(Some("relq"), "jobs");

        assert_eq!(keys.registry, "relq:queues");
        assert_eq!(keys.pending, "relq/jobs");
        assert_eq!(keys.processing, "relq/jobs:processing");
        assert_eq!(keys.scheduled, "relq/jobs:scheduled");
        assert_eq!(keys.dead, "relq/jobs:dead");
        assert_eq!(keys.counter, "relq/jobs:id");
        assert_eq!(keys.metadata, "relq/jobs:metadata");
        assert_eq!(keys.data(12), "relq/jobs:data:12");
        assert_eq!(keys.message_metadata(12), "relq/jobs:metadata:12");
    }

    #[test]
    fn test_unprefixed_layout() {
        let keys = Keys::new(None, "jobs");

        assert_eq!(keys.registry, "queues");
        assert_eq!(keys.pending, "jobs");
        assert_eq!(keys.data(1), "jobs:data:1");
    }
}
