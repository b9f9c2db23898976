//! Injected dependencies for time and identifier generation.
//!
//! Services never call `Utc::now()` or `Uuid::new_v4()` directly; they receive
//! these traits so tests can pin both.

use crate::ids::RecordId;
use chrono::{DateTime, Utc};

/// Clock trait - abstracts time operations for testability
pub trait Clock: Send + Sync {
    /// Get the current time
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Source of fresh document ids.
pub trait IdGenerator: Send + Sync {
    /// Produce an id that has never been returned before.
    fn next_id(&self) -> RecordId;
}

/// Random (v4) UUID ids.
#[derive(Debug, Clone, Copy, Default)]
pub struct UuidIdGenerator;

impl IdGenerator for UuidIdGenerator {
    fn next_id(&self) -> RecordId {
        RecordId::new(uuid::Uuid::new_v4().simple().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn uuid_ids_are_unique_and_path_safe() {
        let ids = UuidIdGenerator;
        let generated: HashSet<_> = (0..100).map(|_| ids.next_id()).collect();
        assert_eq!(generated.len(), 100);
        assert!(generated.iter().all(|id| !id.as_str().contains('/')));
    }
}
