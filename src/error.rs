use miette::Diagnostic;
use std::io;
use thiserror::Error;

#[derive(Error, Diagnostic, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Filesystem error: {0}")]
    #[diagnostic(
        code(rundev::filesystem::error),
        help("Check that the source directory exists and is readable")
    )]
    Filesystem(String),

    #[error("Sync error: {0}")]
    #[diagnostic(
        code(rundev::sync::error),
        help("Check that the run directory is writable; the next request will retry the sync")
    )]
    Sync(String),

    #[error("Failed to launch backend process: {0}")]
    #[diagnostic(
        code(rundev::process::launch_failed),
        help("Check that the command exists and is executable")
    )]
    ProcessLaunch(String),

    #[error("Backend request failed: {0}")]
    #[diagnostic(
        code(rundev::proxy::upstream),
        help("Check that the backend process is listening on its assigned port")
    )]
    Upstream(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Returns a helpful suggestion for resolving this error, if available.
    pub fn suggestion(&self) -> Option<String> {
        match self {
            Error::ProcessLaunch(_) => Some(
                "Check that the backend command exists and is executable. \
                 Pass it after `--`, e.g.: rundev -- python3 app.py"
                    .to_string(),
            ),
            Error::Filesystem(_) => {
                Some("Check that the source directory exists and is readable".to_string())
            }
            Error::Sync(_) => Some(
                "Check that the run directory is writable and not inside an ignored path"
                    .to_string(),
            ),
            Error::Upstream(_) | Error::Http(_) => Some(
                "The backend may still be booting or may have crashed; retry the request"
                    .to_string(),
            ),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn launch_error_carries_suggestion() {
        let err = Error::ProcessLaunch("No such file or directory".to_string());
        assert!(err.suggestion().unwrap().contains("--"));
        assert!(err.to_string().contains("launch backend"));
    }

    #[test]
    fn io_error_converts() {
        let io = io::Error::new(io::ErrorKind::NotFound, "gone");
        let err: Error = io.into();
        assert!(matches!(err, Error::Io(_)));
    }
}
