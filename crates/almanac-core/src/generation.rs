//! Generation workflow state machine.
//!
//! A project moves through `NotStarted -> PreviewOnly -> GeneratingFull ->
//! FullyGenerated` with no path back. Transitions go through an explicit
//! table so illegal moves are rejected in one place instead of relying on
//! every call site.

use crate::catalog::FULL_MONTH_COUNT;
use crate::error::{AlmanacError, Result};
use crate::record::Project;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Position of a project in the preview/unlock/full-generation workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GenerationStage {
    NotStarted,
    PreviewOnly,
    GeneratingFull,
    FullyGenerated,
}

impl GenerationStage {
    /// Whether `next` is a legal forward transition from this stage.
    pub fn can_transition_to(self, next: GenerationStage) -> bool {
        use GenerationStage::*;
        matches!(
            (self, next),
            (NotStarted, PreviewOnly)
                | (PreviewOnly, GeneratingFull)
                | (GeneratingFull, FullyGenerated)
        )
    }

    /// Applies a transition, rejecting illegal moves with a typed error.
    pub fn transition(self, next: GenerationStage) -> Result<GenerationStage> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(AlmanacError::InvalidStageTransition {
                from: self,
                to: next,
            })
        }
    }
}

impl fmt::Display for GenerationStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self {
            GenerationStage::NotStarted => "not_started",
            GenerationStage::PreviewOnly => "preview_only",
            GenerationStage::GeneratingFull => "generating_full",
            GenerationStage::FullyGenerated => "fully_generated",
        };
        f.write_str(tag)
    }
}

impl Default for GenerationStage {
    fn default() -> Self {
        GenerationStage::NotStarted
    }
}

/// Per-month generation status.
///
/// `Failed` only re-enters `Processing` through an explicit regeneration
/// request; nothing transitions out of it automatically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MonthStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl MonthStatus {
    /// Whether `next` is an accepted status change. Re-asserting the
    /// current status is allowed (idempotent webhook retries).
    pub fn can_transition_to(self, next: MonthStatus) -> bool {
        use MonthStatus::*;
        if self == next {
            return true;
        }
        matches!(
            (self, next),
            (Pending, Processing) | (Processing, Completed) | (Processing, Failed) | (Failed, Processing)
        )
    }

    pub fn transition(self, next: MonthStatus) -> Result<MonthStatus> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(AlmanacError::InvalidStatusTransition {
                from: self,
                to: next,
            })
        }
    }
}

impl fmt::Display for MonthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self {
            MonthStatus::Pending => "pending",
            MonthStatus::Processing => "processing",
            MonthStatus::Completed => "completed",
            MonthStatus::Failed => "failed",
        };
        f.write_str(tag)
    }
}

impl Default for MonthStatus {
    fn default() -> Self {
        MonthStatus::Pending
    }
}

/// Infers the stage from month counts alone.
///
/// Used both for migration backfill of records written before the stage
/// field existed and for drift-tolerant status reads.
pub fn infer_stage_from_counts(total: usize, completed: usize) -> GenerationStage {
    if total == 0 {
        GenerationStage::NotStarted
    } else if total < FULL_MONTH_COUNT {
        GenerationStage::PreviewOnly
    } else if completed == FULL_MONTH_COUNT {
        GenerationStage::FullyGenerated
    } else {
        GenerationStage::GeneratingFull
    }
}

/// Snapshot of a project's generation progress, recomputed from the actual
/// month rows rather than the stored stage field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationStatus {
    pub stage: GenerationStage,
    /// 0..=100, derived from completed/total
    pub progress: u8,
    pub completed_months: usize,
    pub total_months: usize,
    pub has_payment_method: bool,
}

/// Recomputes the generation status for a project.
///
/// The stored `generation_stage` is deliberately not trusted here: the
/// reported stage is derived from the month rows so that drift between the
/// two representations cannot leak to callers. The stored value is left
/// untouched (read-only override).
pub fn status_of(project: &Project) -> GenerationStatus {
    let total = project.months.len();
    let completed = project.completed_month_count();
    let progress = if total == 0 {
        0
    } else {
        ((completed * 100) / total) as u8
    };

    GenerationStatus {
        stage: infer_stage_from_counts(total, completed),
        progress,
        completed_months: completed,
        total_months: total,
        has_payment_method: project.has_payment_method(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_legal_transitions() {
        use GenerationStage::*;
        assert_eq!(NotStarted.transition(PreviewOnly).unwrap(), PreviewOnly);
        assert_eq!(PreviewOnly.transition(GeneratingFull).unwrap(), GeneratingFull);
        assert_eq!(GeneratingFull.transition(FullyGenerated).unwrap(), FullyGenerated);
    }

    #[test]
    fn test_no_path_back() {
        use GenerationStage::*;
        for (from, to) in [
            (PreviewOnly, NotStarted),
            (GeneratingFull, PreviewOnly),
            (FullyGenerated, GeneratingFull),
            (NotStarted, FullyGenerated),
            (PreviewOnly, FullyGenerated),
        ] {
            let err = from.transition(to).unwrap_err();
            assert!(matches!(err, AlmanacError::InvalidStageTransition { .. }));
        }
    }

    #[test]
    fn test_month_status_transitions() {
        use MonthStatus::*;
        assert!(Pending.can_transition_to(Processing));
        assert!(Processing.can_transition_to(Completed));
        assert!(Processing.can_transition_to(Failed));
        assert!(Failed.can_transition_to(Processing));
        assert!(Completed.can_transition_to(Completed));

        assert!(!Completed.can_transition_to(Processing));
        assert!(!Pending.can_transition_to(Completed));
        assert!(!Failed.can_transition_to(Completed));
    }

    #[test]
    fn test_infer_stage_from_counts() {
        use GenerationStage::*;
        assert_eq!(infer_stage_from_counts(0, 0), NotStarted);
        assert_eq!(infer_stage_from_counts(3, 0), PreviewOnly);
        assert_eq!(infer_stage_from_counts(3, 3), PreviewOnly);
        assert_eq!(infer_stage_from_counts(13, 5), GeneratingFull);
        assert_eq!(infer_stage_from_counts(13, 13), FullyGenerated);
    }
}
