use std::time::Instant;

/// A message stamped with the logical time at which it entered a state machine.
///
/// Sans-I/O protocols never read the clock themselves; every input carries the
/// `now` the caller observed when it was produced.
#[derive(Debug, Clone, PartialEq)]
pub struct Tagged<T> {
    /// Received/produced time
    pub now: Instant,
    /// Message body with generic type
    pub message: T,
}

impl<T> Tagged<T> {
    pub fn new(now: Instant, message: T) -> Self {
        Self { now, message }
    }

    /// Transform the body while keeping the timestamp.
    pub fn map<U, F>(self, f: F) -> Tagged<U>
    where
        F: FnOnce(T) -> U,
    {
        Tagged {
            now: self.now,
            message: f(self.message),
        }
    }
}
