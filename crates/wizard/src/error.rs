#![forbid(unsafe_code)]

/// Test-phase failures. Each message names the phase and where the
/// condition was detected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PhaseError {
    #[error("annotate: stored manifest of unit {unit} is empty")]
    ManifestMissing { unit: String },
    #[error("{phase}: manifest of unit {unit} could not be decoded: {message}")]
    Decode { phase: &'static str, unit: String, message: String },
    #[error("annotate: manifest of unit {unit} has no `annotations:` block to insert into")]
    NoAnnotations { unit: String },
    #[error("apply: no target with provider type {provider} in space {space}")]
    NoTarget { provider: String, space: String },
    #[error("{phase}: {message}")]
    External { phase: &'static str, message: String },
}

impl PhaseError {
    pub fn external(phase: &'static str, e: impl std::fmt::Display) -> Self {
        PhaseError::External { phase, message: e.to_string() }
    }
}
