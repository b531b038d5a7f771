use skibbadb_core::Error as CoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MigratorError {
    #[error("migration plan for '{collection}' is breaking: {reasons:?}")]
    Breaking { collection: String, reasons: Vec<String> },

    #[error(transparent)]
    Core(#[from] CoreError),
}

impl From<MigratorError> for CoreError {
    fn from(err: MigratorError) -> Self {
        match err {
            MigratorError::Core(e) => e,
            other => CoreError::validation(other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, MigratorError>;
