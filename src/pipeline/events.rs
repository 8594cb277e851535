use std::time::Duration;

use super::stage::Stage;

/// Whole milliseconds in `duration`, saturating at `u64::MAX`.
pub fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// Messages sent from the controller to a progress renderer or other consumer.
#[derive(Debug, Clone)]
pub enum PipelineEvent {
    /// Run started against the given seed
    RunStarted {
        seed_url: String,
        scope_host: String,
    },
    /// A stage has begun
    StageStarted {
        stage: Stage,
        display_name: &'static str,
    },
    /// A stage finished successfully
    StageCompleted {
        stage: Stage,
        display_name: &'static str,
        duration_ms: u64,
    },
    /// A stage was not enabled for this run
    StageSkipped {
        stage: Stage,
        display_name: &'static str,
    },
    /// A stage returned an error
    StageFailed {
        stage: Stage,
        display_name: &'static str,
        error: String,
    },
    /// Results were written to the result sink
    FindingsRecorded {
        stage: Stage,
        count: usize,
    },
    /// Report assembled
    RunCompleted {
        total_findings: usize,
        crawled: usize,
        scanned: usize,
        duration_ms: u64,
    },
    /// Run stopped by the user
    RunInterrupted,
    /// Run stopped by an error
    RunFailed {
        error: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duration_ms_saturates() {
        assert_eq!(duration_ms(Duration::from_millis(1500)), 1500);
        assert_eq!(duration_ms(Duration::from_micros(999)), 0);
        assert_eq!(duration_ms(Duration::MAX), u64::MAX);
    }
}
