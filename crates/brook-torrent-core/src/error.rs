//! Error taxonomy for the download creation pipeline.

use thiserror::Error;

/// Failures the pipeline can report.
///
/// Only [`PipelineError::Transport`], [`PipelineError::Parse`], and
/// [`PipelineError::Construction`] ever escalate into a raised error, and
/// only when the factory runs in immediate mode; everything else is
/// absorbed into the session log plus the outcome notification. Factory
/// API misuse (double load, load after a raw-data preload) is not
/// represented here: it is an internal invariant violation and panics.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Source unreachable or unreadable.
    #[error("{message}")]
    Transport {
        /// Human-readable failure description.
        message: String,
    },
    /// Document was retrieved but is malformed.
    #[error("{message}")]
    Parse {
        /// Human-readable failure description.
        message: String,
    },
    /// Registry rejected the parsed document.
    #[error("{message}")]
    Construction {
        /// Human-readable failure description.
        message: String,
    },
    /// A command executed against the new download failed.
    #[error("{message}")]
    Command {
        /// Human-readable failure description.
        message: String,
    },
    /// The download disappeared from the registry mid-initialization.
    #[error("The newly created download was removed")]
    Vanished,
}

impl PipelineError {
    /// Source unreachable or unreadable.
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }

    /// Malformed document.
    pub fn parse(message: impl Into<String>) -> Self {
        Self::Parse {
            message: message.into(),
        }
    }

    /// Registry rejected the document.
    pub fn construction(message: impl Into<String>) -> Self {
        Self::Construction {
            message: message.into(),
        }
    }

    /// Failed command execution.
    pub fn command(message: impl Into<String>) -> Self {
        Self::Command {
            message: message.into(),
        }
    }

    /// Whether this failure may be raised to an immediate-mode caller.
    #[must_use]
    pub fn is_escalatable(&self) -> bool {
        matches!(
            self,
            Self::Transport { .. } | Self::Parse { .. } | Self::Construction { .. }
        )
    }
}

/// Convenience alias for pipeline results.
pub type PipelineResult<T> = Result<T, PipelineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_source_side_failures_escalate() {
        assert!(PipelineError::transport("Could not open file").is_escalatable());
        assert!(PipelineError::parse("Reading torrent file failed").is_escalatable());
        assert!(PipelineError::construction("duplicate torrent").is_escalatable());
        assert!(!PipelineError::command("d.start failed").is_escalatable());
        assert!(!PipelineError::Vanished.is_escalatable());
    }

    #[test]
    fn display_is_the_bare_message() {
        let err = PipelineError::transport("404 Not Found");
        assert_eq!(err.to_string(), "404 Not Found");
        assert_eq!(
            PipelineError::Vanished.to_string(),
            "The newly created download was removed"
        );
    }
}
