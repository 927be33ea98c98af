use serde::{Deserialize, Serialize};
use std::fmt;

/// Job status definitions. String forms are stable wire values persisted by
/// providers and must not change between releases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JobStatus {
    /// Initial status when the job record is created
    New,
    /// Job has been enqueued but no unit of work has run yet
    Pending,
    /// Job is being driven forward
    InProgress,
    /// A reversible failure flipped the job into the compensation phase
    AwaitingCompensation,
    /// All steps completed successfully
    Completed,
    /// Job failed; completed steps were rolled back (or none had completed)
    Failed,
    /// A compensation itself failed permanently; manual intervention required
    #[serde(rename = "Compensation_Failed")]
    CompensationFailed,
}

impl JobStatus {
    /// Check if this is a terminal status (no further transitions allowed)
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::CompensationFailed)
    }

    /// Check if the job has started but not yet finished
    pub fn is_active(&self) -> bool {
        matches!(self, Self::InProgress | Self::AwaitingCompensation)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::New => write!(f, "New"),
            Self::Pending => write!(f, "Pending"),
            Self::InProgress => write!(f, "InProgress"),
            Self::AwaitingCompensation => write!(f, "AwaitingCompensation"),
            Self::Completed => write!(f, "Completed"),
            Self::Failed => write!(f, "Failed"),
            Self::CompensationFailed => write!(f, "Compensation_Failed"),
        }
    }
}

impl std::str::FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "New" => Ok(Self::New),
            "Pending" => Ok(Self::Pending),
            "InProgress" => Ok(Self::InProgress),
            "AwaitingCompensation" => Ok(Self::AwaitingCompensation),
            "Completed" => Ok(Self::Completed),
            "Failed" => Ok(Self::Failed),
            "Compensation_Failed" => Ok(Self::CompensationFailed),
            _ => Err(format!("Invalid job status: {s}")),
        }
    }
}

impl Default for JobStatus {
    fn default() -> Self {
        Self::New
    }
}

/// Step status definitions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StepStatus {
    /// Initial status when the step record is created
    Pending,
    /// Step has executed at least one chunk
    InProgress,
    /// Every chunk completed and the result has been aggregated
    Completed,
    /// Step is being rolled back
    Compensating,
    /// Rollback finished successfully
    Compensated,
    /// Step failed (forward failure kept for audit, or a failed compensation)
    Failed,
}

impl StepStatus {
    /// Check if this step will take no further work in either direction
    pub fn is_settled(&self) -> bool {
        matches!(self, Self::Compensated | Self::Failed)
    }
}

impl fmt::Display for StepStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "Pending"),
            Self::InProgress => write!(f, "InProgress"),
            Self::Completed => write!(f, "Completed"),
            Self::Compensating => write!(f, "Compensating"),
            Self::Compensated => write!(f, "Compensated"),
            Self::Failed => write!(f, "Failed"),
        }
    }
}

impl std::str::FromStr for StepStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Pending" => Ok(Self::Pending),
            "InProgress" => Ok(Self::InProgress),
            "Completed" => Ok(Self::Completed),
            "Compensating" => Ok(Self::Compensating),
            "Compensated" => Ok(Self::Compensated),
            "Failed" => Ok(Self::Failed),
            _ => Err(format!("Invalid step status: {s}")),
        }
    }
}

impl Default for StepStatus {
    fn default() -> Self {
        Self::Pending
    }
}

/// Chunk status definitions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChunkStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
}

impl fmt::Display for ChunkStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "Pending"),
            Self::InProgress => write!(f, "InProgress"),
            Self::Completed => write!(f, "Completed"),
            Self::Failed => write!(f, "Failed"),
        }
    }
}

impl std::str::FromStr for ChunkStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Pending" => Ok(Self::Pending),
            "InProgress" => Ok(Self::InProgress),
            "Completed" => Ok(Self::Completed),
            "Failed" => Ok(Self::Failed),
            _ => Err(format!("Invalid chunk status: {s}")),
        }
    }
}

impl Default for ChunkStatus {
    fn default() -> Self {
        Self::Pending
    }
}

/// Direction of travel through a job's steps. `Down` is forward execution in
/// increasing step index; `Up` is compensation in decreasing index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    Down,
    Up,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Down => write!(f, "Down"),
            Self::Up => write!(f, "Up"),
        }
    }
}

impl std::str::FromStr for Direction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Down" => Ok(Self::Down),
            "Up" => Ok(Self::Up),
            _ => Err(format!("Invalid direction: {s}")),
        }
    }
}

impl Default for Direction {
    fn default() -> Self {
        Self::Down
    }
}
