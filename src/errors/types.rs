//! # Error Types
//!
//! Error types for the authentication store using `thiserror`.

/// Custom result type for authentication store operations
pub type Result<T> = std::result::Result<T, AuthStoreError>;

/// Boxed error used for upstream and configuration sources
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Main error type for the authentication store
#[derive(thiserror::Error, Debug)]
pub enum AuthStoreError {
    /// A record or its owning resource does not exist under the caller's tenant
    #[error("Resource not found: {resource_type} with ID '{id}'")]
    NotFound { resource_type: String, id: String },

    /// Malformed input: bad resource type, filter, identity or payload
    #[error("Bad request: {message}")]
    BadRequest { message: String, field: Option<String> },

    /// The deployed backend cannot perform the operation
    #[error("Unsupported operation: {message}")]
    Unsupported { message: String },

    /// Network or server-side failure from an external secret service
    #[error("Upstream failure from {service}: {message}")]
    Upstream {
        service: String,
        message: String,
        #[source]
        source: Option<BoxError>,
    },

    /// A key-value payload could not be reconstructed into a record
    #[error("Malformed secret at '{path}': {source}")]
    MalformedSecret {
        path: String,
        #[source]
        source: DecodeError,
    },

    /// Database and storage errors
    #[error("Database error: {context}")]
    Database {
        #[source]
        source: sqlx::Error,
        context: String,
    },

    /// Serialization/deserialization errors
    #[error("Serialization error: {context}")]
    Serialization {
        #[source]
        source: serde_json::Error,
        context: String,
    },

    /// Configuration errors
    #[error("Configuration error: {message}")]
    Config {
        message: String,
        #[source]
        source: Option<BoxError>,
    },

    /// Internal errors
    #[error("Internal error: {message}")]
    Internal { message: String },
}

/// Reasons a versioned key-value envelope fails to decode.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("missing required section '{0}'")]
    MissingSection(&'static str),

    #[error("field '{field}' has the wrong type, expected {expected}")]
    WrongType { field: String, expected: &'static str },

    #[error("field '{field}' has an invalid value: {reason}")]
    InvalidValue { field: String, reason: String },
}

impl AuthStoreError {
    /// Message carried by every operation of a deployment without a secret store
    pub const NO_SECRET_STORE: &'static str = "no secret store configured";

    /// Create a not found error
    pub fn not_found<R: Into<String>, I: Into<String>>(resource_type: R, id: I) -> Self {
        Self::NotFound { resource_type: resource_type.into(), id: id.into() }
    }

    /// Create a bad request error
    pub fn bad_request<S: Into<String>>(message: S) -> Self {
        Self::BadRequest { message: message.into(), field: None }
    }

    /// Create a bad request error with field information
    pub fn bad_request_field<S: Into<String>, F: Into<String>>(message: S, field: F) -> Self {
        Self::BadRequest { message: message.into(), field: Some(field.into()) }
    }

    /// The single error returned when no secret store is configured
    pub fn no_secret_store() -> Self {
        Self::Unsupported { message: Self::NO_SECRET_STORE.to_string() }
    }

    /// Create an upstream error without a source
    pub fn upstream<S: Into<String>, M: Into<String>>(service: S, message: M) -> Self {
        Self::Upstream { service: service.into(), message: message.into(), source: None }
    }

    /// Create an upstream error wrapping the client error
    pub fn upstream_with_source<S, M, E>(service: S, message: M, source: E) -> Self
    where
        S: Into<String>,
        M: Into<String>,
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Upstream {
            service: service.into(),
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create a malformed secret error
    pub fn malformed_secret<P: Into<String>>(path: P, source: DecodeError) -> Self {
        Self::MalformedSecret { path: path.into(), source }
    }

    /// Wrap a database error with context
    pub fn database<C: Into<String>>(source: sqlx::Error, context: C) -> Self {
        Self::Database { source, context: context.into() }
    }

    /// Create a new configuration error
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Config { message: message.into(), source: None }
    }

    /// Create a configuration error with source
    pub fn config_with_source<S: Into<String>>(message: S, source: BoxError) -> Self {
        Self::Config { message: message.into(), source: Some(source) }
    }

    /// Create an internal error
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::Internal { message: message.into() }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Get the HTTP status code that should be returned for this error
    pub fn status_code(&self) -> u16 {
        match self {
            AuthStoreError::NotFound { .. } => 404,
            AuthStoreError::BadRequest { .. } => 400,
            AuthStoreError::MalformedSecret { .. } => 400,
            AuthStoreError::Serialization { .. } => 400,
            AuthStoreError::Unsupported { .. } => 501,
            AuthStoreError::Upstream { .. } => 502,
            AuthStoreError::Database { .. } => 500,
            AuthStoreError::Config { .. } => 500,
            AuthStoreError::Internal { .. } => 500,
        }
    }
}

impl From<sqlx::Error> for AuthStoreError {
    fn from(error: sqlx::Error) -> Self {
        Self::Database { source: error, context: "Database operation failed".to_string() }
    }
}

impl From<serde_json::Error> for AuthStoreError {
    fn from(error: serde_json::Error) -> Self {
        Self::Serialization { source: error, context: "JSON serialization failed".to_string() }
    }
}

impl From<validator::ValidationErrors> for AuthStoreError {
    fn from(errors: validator::ValidationErrors) -> Self {
        let message = errors
            .field_errors()
            .iter()
            .map(|(field, field_errors)| {
                let error_messages: Vec<String> = field_errors
                    .iter()
                    .map(|e| e.message.as_ref().map_or("Invalid value".to_string(), |m| m.to_string()))
                    .collect();
                format!("{}: {}", field, error_messages.join(", "))
            })
            .collect::<Vec<_>>()
            .join("; ");

        Self::config(format!("Validation failed: {}", message))
    }
}
