use thiserror::Error;

/// Result type alias using QuarryError
pub type Result<T> = std::result::Result<T, QuarryError>;

// ========== Error Facility ==========

/// Canonical error kind taxonomy
///
/// A stable, structured classification of every error the engine can
/// produce. Each kind maps to a stable code usable in logs and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExErrorKind {
    // Configuration
    ConnectionNotEstablished,
    InvalidFieldType,
    Config,

    // Schema lookup
    InvalidInput,
    NotFound,
    UnknownField,
    UnknownRelationship,

    // Query / expression
    ExpressionSyntax,
    UnknownFunction,
    Evaluation,

    // Storage
    Persistence,
    Serialization,
    Migration,

    // Internal
    Internal,
}

impl ExErrorKind {
    /// Get the stable error code for this kind
    pub fn code(&self) -> &'static str {
        match self {
            ExErrorKind::ConnectionNotEstablished => "ERR_CONNECTION_NOT_ESTABLISHED",
            ExErrorKind::InvalidFieldType => "ERR_INVALID_FIELD_TYPE",
            ExErrorKind::Config => "ERR_CONFIG",
            ExErrorKind::InvalidInput => "ERR_INVALID_INPUT",
            ExErrorKind::NotFound => "ERR_NOT_FOUND",
            ExErrorKind::UnknownField => "ERR_UNKNOWN_FIELD",
            ExErrorKind::UnknownRelationship => "ERR_UNKNOWN_RELATIONSHIP",
            ExErrorKind::ExpressionSyntax => "ERR_EXPRESSION_SYNTAX",
            ExErrorKind::UnknownFunction => "ERR_UNKNOWN_FUNCTION",
            ExErrorKind::Evaluation => "ERR_EVALUATION",
            ExErrorKind::Persistence => "ERR_PERSISTENCE",
            ExErrorKind::Serialization => "ERR_SERIALIZATION",
            ExErrorKind::Migration => "ERR_MIGRATION",
            ExErrorKind::Internal => "ERR_INTERNAL",
        }
    }

    /// Configuration errors are fatal and never worth retrying.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            ExErrorKind::ConnectionNotEstablished | ExErrorKind::InvalidFieldType | ExErrorKind::Config
        )
    }
}

/// Canonical structured error type
///
/// Carries the classification plus optional context (operation, model,
/// record id) for logging and programmatic handling.
#[derive(Debug, Clone)]
pub struct ExError {
    kind: ExErrorKind,
    op: Option<String>,
    model: Option<String>,
    entity_id: Option<String>,
    message: String,
}

impl ExError {
    /// Create a new error with the specified kind
    pub fn new(kind: ExErrorKind) -> Self {
        Self {
            kind,
            op: None,
            model: None,
            entity_id: None,
            message: String::new(),
        }
    }

    /// Add operation context
    pub fn with_op(mut self, op: impl Into<String>) -> Self {
        self.op = Some(op.into());
        self
    }

    /// Add model or collection context
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Add record id context
    pub fn with_entity_id(mut self, id: impl Into<String>) -> Self {
        self.entity_id = Some(id.into());
        self
    }

    /// Add custom message
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    pub fn kind(&self) -> ExErrorKind {
        self.kind
    }

    pub fn code(&self) -> &'static str {
        self.kind.code()
    }

    pub fn op(&self) -> Option<&str> {
        self.op.as_deref()
    }

    pub fn model(&self) -> Option<&str> {
        self.model.as_deref()
    }

    pub fn entity_id(&self) -> Option<&str> {
        self.entity_id.as_deref()
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl std::fmt::Display for ExError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}]", self.code())?;
        if let Some(op) = &self.op {
            write!(f, " in operation '{}'", op)?;
        }
        if !self.message.is_empty() {
            write!(f, ": {}", self.message)?;
        }
        if let Some(model) = &self.model {
            write!(f, " (model: {})", model)?;
        }
        if let Some(entity_id) = &self.entity_id {
            write!(f, " (entity_id: {})", entity_id)?;
        }
        Ok(())
    }
}

impl std::error::Error for ExError {}

// ========== End Error Facility ==========

/// Error taxonomy for Quarry operations
#[derive(Error, Debug, Clone, PartialEq)]
pub enum QuarryError {
    // ===== Configuration Errors =====
    /// No driver has been connected to the engine
    #[error("Connection not established: connect a driver before using the engine")]
    ConnectionNotEstablished,

    /// A declared storage type does not map to any field type
    #[error("Invalid field type '{storage_type}' for field {field}")]
    InvalidFieldType { field: String, storage_type: String },

    /// Configuration could not be loaded or parsed
    #[error("Configuration error: {message}")]
    Config { message: String },

    // ===== Schema Lookup Errors =====
    #[error("Unknown model: {model}")]
    UnknownModel { model: String },

    #[error("Unknown field {field} on model {model}")]
    UnknownField { model: String, field: String },

    #[error("Unknown relationship {relationship} on model {model}")]
    UnknownRelationship { model: String, relationship: String },

    /// Caller supplied arguments the engine cannot act on
    #[error("Invalid input: {reason}")]
    InvalidInput { reason: String },

    // ===== Query / Expression Errors =====
    /// The tokenizer hit input it does not recognise
    #[error("Unrecognized input at offset {offset}: {fragment}")]
    Lex { offset: usize, fragment: String },

    /// A token stream did not match the filter grammar
    #[error("Parse error: {message}")]
    Parse { message: String },

    /// A filter called a function the lookup table does not provide
    #[error("Method does not exist: {name}")]
    UnknownFunction { name: String },

    #[error("Evaluation error: {message}")]
    Evaluation { message: String },

    // ===== Storage Errors =====
    /// Error reported by the underlying storage driver
    #[error("Storage error in {op}: {message}")]
    Storage { op: String, message: String },

    #[error("Serialization error: {message}")]
    Serialization { message: String },

    /// A migration step failed; the surrounding transaction was rolled back
    #[error("Migration {version} failed: {message}")]
    Migration { version: i64, message: String },

    // ===== Internal Errors =====
    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl QuarryError {
    /// Build a storage error for the given driver operation
    pub fn storage(op: impl Into<String>, message: impl Into<String>) -> Self {
        QuarryError::Storage {
            op: op.into(),
            message: message.into(),
        }
    }

    pub fn invalid_input(reason: impl Into<String>) -> Self {
        QuarryError::InvalidInput {
            reason: reason.into(),
        }
    }

    pub fn parse(message: impl Into<String>) -> Self {
        QuarryError::Parse {
            message: message.into(),
        }
    }
}

impl From<serde_json::Error> for QuarryError {
    fn from(err: serde_json::Error) -> Self {
        QuarryError::Serialization {
            message: err.to_string(),
        }
    }
}

impl From<QuarryError> for ExError {
    fn from(err: QuarryError) -> Self {
        let message = err.to_string();
        match err {
            QuarryError::ConnectionNotEstablished => {
                ExError::new(ExErrorKind::ConnectionNotEstablished).with_message(message)
            }
            QuarryError::InvalidFieldType { field, .. } => {
                ExError::new(ExErrorKind::InvalidFieldType)
                    .with_entity_id(field)
                    .with_message(message)
            }
            QuarryError::Config { .. } => ExError::new(ExErrorKind::Config).with_message(message),
            QuarryError::UnknownModel { model } => ExError::new(ExErrorKind::NotFound)
                .with_model(model)
                .with_message(message),
            QuarryError::UnknownField { model, field } => ExError::new(ExErrorKind::UnknownField)
                .with_model(model)
                .with_entity_id(field)
                .with_message(message),
            QuarryError::UnknownRelationship {
                model,
                relationship,
            } => ExError::new(ExErrorKind::UnknownRelationship)
                .with_model(model)
                .with_entity_id(relationship)
                .with_message(message),
            QuarryError::InvalidInput { .. } => {
                ExError::new(ExErrorKind::InvalidInput).with_message(message)
            }
            QuarryError::Lex { .. } | QuarryError::Parse { .. } => {
                ExError::new(ExErrorKind::ExpressionSyntax)
                    .with_op("parse_filter")
                    .with_message(message)
            }
            QuarryError::UnknownFunction { name } => ExError::new(ExErrorKind::UnknownFunction)
                .with_op("evaluate_filter")
                .with_entity_id(name)
                .with_message(message),
            QuarryError::Evaluation { .. } => ExError::new(ExErrorKind::Evaluation)
                .with_op("evaluate_filter")
                .with_message(message),
            QuarryError::Storage { op, .. } => ExError::new(ExErrorKind::Persistence)
                .with_op(op)
                .with_message(message),
            QuarryError::Serialization { .. } => {
                ExError::new(ExErrorKind::Serialization).with_message(message)
            }
            QuarryError::Migration { version, .. } => ExError::new(ExErrorKind::Migration)
                .with_op("migrate")
                .with_entity_id(version.to_string())
                .with_message(message),
            QuarryError::Internal { .. } => ExError::new(ExErrorKind::Internal).with_message(message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_includes_code_and_context() {
        let err = ExError::new(ExErrorKind::UnknownField)
            .with_op("find_by")
            .with_model("User")
            .with_message("no such field");
        let text = err.to_string();
        assert!(text.starts_with("[ERR_UNKNOWN_FIELD]"));
        assert!(text.contains("find_by"));
        assert!(text.contains("User"));
    }

    #[test]
    fn test_configuration_kinds() {
        assert!(ExErrorKind::ConnectionNotEstablished.is_configuration());
        assert!(ExErrorKind::InvalidFieldType.is_configuration());
        assert!(!ExErrorKind::Persistence.is_configuration());
    }
}
