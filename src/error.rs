use std::path::PathBuf;

pub type AppResult<T> = Result<T, AppError>;

/// Failures around the compiler: reading sources, loading registry
/// extensions and config files, writing output. Compile errors themselves
/// are reported as diagnostics, not through this type.
#[derive(thiserror::Error, Debug)]
pub enum AppError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid registry {path}: {message}")]
    Registry { path: PathBuf, message: String },

    #[error("invalid config: {0}")]
    Config(String),
}

impl AppError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub fn registry(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Registry {
            path: path.into(),
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_names_the_path() {
        let err = AppError::io(
            "rules.evo",
            std::io::Error::new(std::io::ErrorKind::NotFound, "missing"),
        );
        assert_eq!(err.to_string(), "I/O error on rules.evo: missing");
        assert!(AppError::registry("r.json", "bad")
            .to_string()
            .starts_with("invalid registry r.json"));
    }

    #[test]
    fn json_errors_convert() {
        let json_err = serde_json::from_str::<u32>("nope").unwrap_err();
        let err: AppError = json_err.into();
        assert!(matches!(err, AppError::Json(_)));
    }
}
