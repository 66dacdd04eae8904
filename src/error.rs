use thiserror::Error;

/// Fatal pipeline failures surfaced to the embedder.
///
/// Transient vehicle-state glitches are clamped where they occur and
/// skipped ticks are only logged; everything here shuts the pipeline down.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("worker pool size must be at least one")]
    InvalidPoolSize,
    #[error("pipeline needs at least one vehicle to manage")]
    NoVehicles,
    #[error("option `{name}` must be positive")]
    NonPositiveOption { name: &'static str },
    #[error("the waypoint map is empty")]
    EmptyMap,
    #[error("failed to spawn a stage thread")]
    ThreadSpawn(#[from] std::io::Error),
    #[error("the {stage} stage failed and was shut down")]
    StageFailed { stage: &'static str },
}
