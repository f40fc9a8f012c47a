use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum CliError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("failed to read {}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to walk {}", .path.display())]
    Walk {
        path: PathBuf,
        #[source]
        source: walkdir::Error,
    },

    #[error("invalid type manifest {}", .path.display())]
    Manifest {
        path: PathBuf,
        #[source]
        source: gotmpl_check_types::TypeTreeError,
    },

    #[error("invalid config {}", .path.display())]
    Config {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("no template files found under {paths:?}")]
    NoTemplates { paths: Vec<PathBuf> },

    #[error("{} does not exist", .path.display())]
    MissingPath { path: PathBuf },
}

pub type CliResult<T> = std::result::Result<T, CliError>;
