use thiserror::Error;

/// The error taxonomy from the error handling design: every failure that can
/// escape a collection or database operation lowers into one of these kinds.
#[derive(Debug, Error)]
pub enum Error {
    /// The schema validator rejected a document, or a foreign-key field has
    /// no matching parent row.
    #[error("validation failed: {0}")]
    Validation(String),

    /// Insert/update would duplicate a unique column.
    #[error("unique constraint violated on {fields:?}")]
    UniqueConstraint { fields: Vec<String> },

    /// `put`/`delete` targeted a key that does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// Driver or SQL failure not otherwise classified.
    #[error("database error: {0}")]
    Database(String),

    /// A plugin hook raised a failure in strict mode.
    #[error("plugin '{plugin_name}' failed in hook '{hook_name}': {source}")]
    Plugin {
        plugin_name: String,
        hook_name: String,
        source: Box<Error>,
    },

    /// A plugin hook exceeded its configured timeout.
    #[error("plugin '{plugin_name}' timed out in hook '{hook_name}'")]
    PluginTimeout {
        plugin_name: String,
        hook_name: String,
    },

    /// Collection registration, query construction, or other caller misuse.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

impl Error {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn unique_constraint(fields: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self::UniqueConstraint {
            fields: fields.into_iter().map(Into::into).collect(),
        }
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn database(msg: impl Into<String>) -> Self {
        Self::Database(msg.into())
    }

    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    pub fn plugin(
        plugin_name: impl Into<String>,
        hook_name: impl Into<String>,
        source: Error,
    ) -> Self {
        Self::Plugin {
            plugin_name: plugin_name.into(),
            hook_name: hook_name.into(),
            source: Box::new(source),
        }
    }

    pub fn plugin_timeout(plugin_name: impl Into<String>, hook_name: impl Into<String>) -> Self {
        Self::PluginTimeout {
            plugin_name: plugin_name.into(),
            hook_name: hook_name.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
