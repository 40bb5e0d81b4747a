use crate::process::TerminateOutcome;

/// What a `cleanup()` call tore down
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CleanupReport {
    /// False when another trigger had already claimed cleanup
    pub performed: bool,
    /// How the connector was stopped, if one was running
    pub connector: Option<TerminateOutcome>,
    /// A DNS record was found and deleted
    pub dns_record_deleted: bool,
    /// The tunnel was deleted
    pub tunnel_deleted: bool,
    /// Steps that failed and may have left resources behind
    pub failures: Vec<String>,
}

impl CleanupReport {
    pub(crate) fn skipped() -> Self {
        Self::default()
    }

    /// Every attempted step succeeded
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}
