use crate::exit_codes::ExitCode;

#[derive(Debug)]
pub enum RunError {
    InvalidInput(anyhow::Error),
    SetupFailed(anyhow::Error),
    RuntimeError(anyhow::Error),
}

impl RunError {
    #[must_use]
    pub fn exit_code(&self) -> ExitCode {
        match self {
            Self::InvalidInput(_) => ExitCode::InvalidInput,
            Self::SetupFailed(_) => ExitCode::SetupFailed,
            Self::RuntimeError(_) => ExitCode::RuntimeError,
        }
    }

    #[must_use]
    pub fn anyhow(&self) -> &anyhow::Error {
        match self {
            Self::InvalidInput(e) | Self::SetupFailed(e) | Self::RuntimeError(e) => e,
        }
    }
}

impl From<volley_core::Error> for RunError {
    fn from(err: volley_core::Error) -> Self {
        if err.is_invalid_input() {
            return Self::InvalidInput(err.into());
        }
        match err {
            volley_core::Error::Setup(_) => Self::SetupFailed(err.into()),
            other => Self::RuntimeError(other.into()),
        }
    }
}

impl std::fmt::Display for RunError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidInput(e) | Self::SetupFailed(e) | Self::RuntimeError(e) => {
                write!(f, "{e:#}")
            }
        }
    }
}

impl std::error::Error for RunError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(self.anyhow().as_ref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn core_errors_map_to_exit_codes() {
        let invalid = RunError::from(volley_core::Error::InvalidVus);
        assert_eq!(invalid.exit_code(), ExitCode::InvalidInput);

        let setup = RunError::from(volley_core::Error::Setup(
            volley_core::AuthError::MissingAccessToken,
        ));
        assert_eq!(setup.exit_code(), ExitCode::SetupFailed);
    }
}
