//! Stages, criticality tags and the fixed per-kind stage lists

use serde::{Deserialize, Serialize};

/// One unit of workflow execution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    DataCollection,
    DataValidation,
    CorrelationAnalysis,
    MlAnalysis,
    RegimeDetection,
    NetworkAnalysis,
    LlmProcessing,
    VectorStorage,
    Recommendation,
    Reporting,
    FrontendUpdate,
}

impl Stage {
    /// Stable string form used in status responses and log lines
    pub fn as_str(self) -> &'static str {
        match self {
            Self::DataCollection => "data_collection",
            Self::DataValidation => "data_validation",
            Self::CorrelationAnalysis => "correlation_analysis",
            Self::MlAnalysis => "ml_analysis",
            Self::RegimeDetection => "regime_detection",
            Self::NetworkAnalysis => "network_analysis",
            Self::LlmProcessing => "llm_processing",
            Self::VectorStorage => "vector_storage",
            Self::Recommendation => "recommendation",
            Self::Reporting => "reporting",
            Self::FrontendUpdate => "frontend_update",
        }
    }

    /// Whether a failure of this stage aborts the whole run
    ///
    /// The enrichment stages (LLM processing, vector storage,
    /// recommendation) are advisory; everything else is critical.
    pub fn is_critical(self) -> bool {
        !matches!(
            self,
            Self::LlmProcessing | Self::VectorStorage | Self::Recommendation
        )
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A stage together with its criticality tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageSpec {
    pub stage: Stage,
    pub critical: bool,
}

impl StageSpec {
    /// Spec with the stage's default criticality
    pub fn of(stage: Stage) -> Self {
        Self {
            stage,
            critical: stage.is_critical(),
        }
    }
}

/// Named workflow shapes with fixed stage lists
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowKind {
    /// Every stage from collection through frontend update
    Full,
    /// Collection, correlation and a frontend refresh
    Quick,
    /// Collection plus the model-driven stages
    MlFocused,
    /// Collection and correlation only (fallback for unknown kinds)
    Basic,
}

impl WorkflowKind {
    /// Parse a workflow-type string; unknown kinds fall back to Basic
    pub fn parse(s: &str) -> Self {
        match s {
            "full" | "full_analysis" => Self::Full,
            "quick" | "quick_analysis" => Self::Quick,
            "ml_focused" | "ml-focused" => Self::MlFocused,
            _ => Self::Basic,
        }
    }

    /// Stable string form
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Full => "full_analysis",
            Self::Quick => "quick_analysis",
            Self::MlFocused => "ml_focused",
            Self::Basic => "basic",
        }
    }
}

impl std::fmt::Display for WorkflowKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ordered list of stages for one workflow kind
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowDefinition {
    pub kind: WorkflowKind,
    pub stages: Vec<StageSpec>,
}

impl WorkflowDefinition {
    /// The fixed stage list for a workflow kind
    pub fn for_kind(kind: WorkflowKind) -> Self {
        use Stage::*;
        let stages: &[Stage] = match kind {
            WorkflowKind::Full => &[
                DataCollection,
                DataValidation,
                CorrelationAnalysis,
                MlAnalysis,
                RegimeDetection,
                NetworkAnalysis,
                LlmProcessing,
                VectorStorage,
                Recommendation,
                Reporting,
                FrontendUpdate,
            ],
            WorkflowKind::Quick => &[
                DataCollection,
                CorrelationAnalysis,
                LlmProcessing,
                FrontendUpdate,
            ],
            WorkflowKind::MlFocused => &[
                DataCollection,
                MlAnalysis,
                RegimeDetection,
                Recommendation,
                FrontendUpdate,
            ],
            WorkflowKind::Basic => &[DataCollection, CorrelationAnalysis],
        };
        Self {
            kind,
            stages: stages.iter().copied().map(StageSpec::of).collect(),
        }
    }

    /// The ordered stage names without criticality tags
    pub fn stage_list(&self) -> Vec<Stage> {
        self.stages.iter().map(|s| s.stage).collect()
    }
}

/// Result of executing one stage
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageOutcome {
    /// Whether the stage succeeded
    pub success: bool,
    /// Stage-specific result detail
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub detail: serde_json::Value,
    /// Failure description when `success` is false
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl StageOutcome {
    /// Successful outcome with detail
    pub fn ok(detail: serde_json::Value) -> Self {
        Self {
            success: true,
            detail,
            error: None,
        }
    }

    /// Failed outcome with a description
    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            detail: serde_json::Value::Null,
            error: Some(error.into()),
        }
    }
}
