use thiserror::Error;

pub type KernelResult<T> = Result<T, KernelError>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KernelError {
    #[error("{op}: invalid shape: {reason}")]
    InvalidShape { op: &'static str, reason: String },

    #[error("{op}: invalid parameters: {reason}")]
    InvalidParam { op: &'static str, reason: String },

    #[error("{op}: device allocation failed: {reason}")]
    Allocation { op: &'static str, reason: String },

    #[error("{op}: program `{program}` failed to compile: {reason}")]
    Compile {
        op: &'static str,
        program: String,
        reason: String,
    },

    #[error("{op}: device execution failed: {reason}")]
    Execution { op: &'static str, reason: String },

    #[error("{op}: run() called before prepare_for_run()")]
    NotPrepared { op: &'static str },

    #[error("{op}: refusing to run after failed preparation ({reason})")]
    Poisoned { op: &'static str, reason: String },

    #[error("no kernel registered for {key}")]
    NotRegistered { key: String },
}

impl KernelError {
    pub fn invalid_shape(op: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidShape {
            op,
            reason: reason.into(),
        }
    }

    pub fn invalid_param(op: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidParam {
            op,
            reason: reason.into(),
        }
    }

    pub fn allocation(op: &'static str, reason: impl Into<String>) -> Self {
        Self::Allocation {
            op,
            reason: reason.into(),
        }
    }

    pub fn compile(
        op: &'static str,
        program: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::Compile {
            op,
            program: program.into(),
            reason: reason.into(),
        }
    }

    pub fn execution(op: &'static str, reason: impl Into<String>) -> Self {
        Self::Execution {
            op,
            reason: reason.into(),
        }
    }

    /// Errors raised by `prepare_for_run`; fatal for the kernel instance.
    pub fn is_initialization(&self) -> bool {
        matches!(
            self,
            Self::InvalidShape { .. }
                | Self::InvalidParam { .. }
                | Self::Allocation { .. }
                | Self::Compile { .. }
        )
    }

    /// Errors raised while binding or submitting work in `run`.
    pub fn is_execution(&self) -> bool {
        matches!(self, Self::Execution { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classification() {
        assert!(KernelError::invalid_shape("mul", "k mismatch").is_initialization());
        assert!(KernelError::compile("mul", "mul_half", "bad wgsl").is_initialization());
        assert!(KernelError::execution("mul", "lost device").is_execution());
        let not_prepared = KernelError::NotPrepared { op: "mul" };
        assert!(!not_prepared.is_initialization() && !not_prepared.is_execution());
    }

    #[test]
    fn messages_name_the_op() {
        let err = KernelError::compile("reshape", "reshape_half", "unknown format");
        assert_eq!(
            err.to_string(),
            "reshape: program `reshape_half` failed to compile: unknown format"
        );
    }
}
