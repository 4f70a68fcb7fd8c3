// ABOUTME: Diagnostics accumulator for non-fatal warnings during a cycle.
// ABOUTME: Collects problems that must not change the outcome but should reach the operator.

use serde::Serialize;

/// Collects non-fatal warnings during deployment operations.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(transparent)]
pub struct Diagnostics {
    warnings: Vec<Warning>,
}

impl Diagnostics {
    /// Record a warning, auto-logging it via tracing.
    pub fn warn(&mut self, warning: Warning) {
        tracing::warn!("{}", warning.message);
        self.warnings.push(warning);
    }

    pub fn warnings(&self) -> &[Warning] {
        &self.warnings
    }

    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }
}

/// A non-fatal warning collected during a cycle.
#[derive(Debug, Clone, Serialize)]
pub struct Warning {
    pub kind: WarningKind,
    pub message: String,
}

impl Warning {
    fn new(kind: WarningKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn lock_release(message: impl Into<String>) -> Self {
        Self::new(WarningKind::LockRelease, message)
    }

    pub fn hook(message: impl Into<String>) -> Self {
        Self::new(WarningKind::HookFailed, message)
    }

    pub fn notify(message: impl Into<String>) -> Self {
        Self::new(WarningKind::NotifyFailed, message)
    }

    pub fn history(message: impl Into<String>) -> Self {
        Self::new(WarningKind::HistoryWrite, message)
    }

    pub fn reconciled(message: impl Into<String>) -> Self {
        Self::new(WarningKind::StateInferred, message)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WarningKind {
    /// Failed to release deploy lock (lock file may remain).
    LockRelease,
    /// A post-deploy or on-error hook exited non-zero.
    HookFailed,
    /// The webhook could not be delivered.
    NotifyFailed,
    /// The history record could not be appended.
    HistoryWrite,
    /// The live color was inferred from running containers.
    StateInferred,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn diagnostics_starts_empty() {
        let diag = Diagnostics::default();
        assert!(!diag.has_warnings());
        assert!(diag.warnings().is_empty());
    }

    #[test]
    fn diagnostics_collects_warnings() {
        let mut diag = Diagnostics::default();

        diag.warn(Warning::lock_release("failed to remove lock file"));
        diag.warn(Warning::notify("webhook returned 502"));

        assert!(diag.has_warnings());
        assert_eq!(diag.warnings().len(), 2);
        assert_eq!(diag.warnings()[1].kind, WarningKind::NotifyFailed);
    }

    #[test]
    fn serializes_as_a_list() {
        let mut diag = Diagnostics::default();
        diag.warn(Warning::hook("post_deploy exited 1"));
        let json = serde_json::to_value(&diag).unwrap();
        assert_eq!(json[0]["kind"], "hook_failed");
    }
}
