//! Caller identity handed in by the authentication layer.

use uuid::Uuid;

/// An authenticated caller.
///
/// The server does not interpret the subject; it only threads it and the
/// request ID through log records.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallerIdentity {
    /// Opaque subject from the identity layer.
    pub subject: String,
    /// Correlation ID for this request.
    pub request_id: Uuid,
}

impl CallerIdentity {
    /// Creates an identity with a fresh request ID.
    pub fn new(subject: impl Into<String>) -> Self {
        Self {
            subject: subject.into(),
            request_id: Uuid::new_v4(),
        }
    }

    /// Identity for operator tooling and tests.
    pub fn system() -> Self {
        Self::new("system")
    }

    /// Replaces the request ID with one supplied upstream.
    #[must_use]
    pub fn with_request_id(mut self, request_id: Uuid) -> Self {
        self.request_id = request_id;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_ids_are_unique() {
        let a = CallerIdentity::new("user-1");
        let b = CallerIdentity::new("user-1");
        assert_eq!(a.subject, b.subject);
        assert_ne!(a.request_id, b.request_id);

        let fixed = Uuid::nil();
        assert_eq!(a.with_request_id(fixed).request_id, fixed);
    }
}
