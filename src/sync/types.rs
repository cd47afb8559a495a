//! Sync result types.

use serde::Serialize;

/// Outcome of one push-then-pull cycle.
///
/// A cycle never fails as a whole; per-record and per-phase failures are
/// collected in `errors`, push errors first.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct SyncResult {
    /// Local changes the remote confirmed (creates, updates, deletes).
    pub pushed: usize,
    /// Remote records merged into the local store.
    pub pulled: usize,
    /// Human-readable failures, e.g. `"push rec_1: transport: offline"`.
    pub errors: Vec<String>,
}

impl SyncResult {
    /// Returns true if the cycle finished without any error.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }

    /// The first recorded error, if any.
    #[must_use]
    pub fn first_error(&self) -> Option<&str> {
        self.errors.first().map(String::as_str)
    }

    pub(crate) fn push_error(&mut self, record_id: &str, err: impl std::fmt::Display) {
        self.errors.push(format!("push {record_id}: {err}"));
    }

    pub(crate) fn pull_error(&mut self, remote_id: Option<&str>, err: impl std::fmt::Display) {
        match remote_id {
            Some(id) => self.errors.push(format!("pull {id}: {err}")),
            None => self.errors.push(format!("pull: {err}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::RemoteError;

    #[test]
    fn test_error_formats() {
        let mut result = SyncResult::default();
        assert!(result.is_clean());

        result.push_error("rec_1", RemoteError::Transport("offline".into()));
        result.pull_error(None, RemoteError::Unauthorized("expired".into()));
        result.pull_error(Some("r9"), "Validation error: title is required");

        assert_eq!(
            result.errors,
            vec![
                "push rec_1: transport: offline",
                "pull: unauthorized: expired",
                "pull r9: Validation error: title is required",
            ]
        );
        assert_eq!(result.first_error(), Some("push rec_1: transport: offline"));
    }
}
