use std::io;
use std::sync::Arc;

use thiserror::Error;

/// Convenience result type used across graph construction and execution.
pub type GraphResult<T> = Result<T, GraphError>;

/// Error type returned by graph construction, execution and the row readers.
///
/// The enum is `Clone` so that a stream shared by several consumers can hand the same
/// failure to each of them; wrapped I/O and codec errors are therefore held in an [`Arc`].
#[derive(Debug, Clone, Error)]
pub enum GraphError {
    /// A row lacks a field that an operator (or a user function) needs.
    #[error("missing field '{field}'{}", in_operator(.operator))]
    MissingField {
        field: String,
        operator: Option<String>,
    },

    /// A field holds a value of the wrong type for a typed accessor or a built-in operation.
    #[error("field '{field}' has type {found}, expected {expected}{}", in_operator(.operator))]
    TypeMismatch {
        field: String,
        expected: &'static str,
        found: &'static str,
        operator: Option<String>,
    },

    /// Two key values cannot be ordered against each other (e.g. a string and an integer).
    #[error("incomparable key values for field '{field}': {left} vs {right}")]
    IncomparableKey {
        field: String,
        left: &'static str,
        right: &'static str,
    },

    /// `run` was called without a binding for a source the graph reads.
    #[error("source '{name}' is not bound")]
    UnboundSource { name: String },

    /// A binding was supplied for a name the graph never reads.
    #[error("binding '{name}' does not match any source of the graph")]
    UnexpectedSource { name: String },

    /// A named-table definition depends on itself.
    #[error("cyclic graph: {}", .path.join(" -> "))]
    CyclicGraph { path: Vec<String> },

    /// A named-table definition references a table that was never defined.
    #[error("table '{name}' referenced by '{referenced_by}' is not defined")]
    UnknownTable { name: String, referenced_by: String },

    /// The same table name was defined twice.
    #[error("table '{name}' is defined more than once")]
    DuplicateTable { name: String },

    /// A named reduce, sort or join table was defined with no key fields.
    #[error("table '{table}' has an empty key list")]
    EmptyKeys { table: String },

    /// A reducer produced a row whose group-key fields do not match its input group.
    #[error("reducer contract violation on field '{field}': {message}")]
    ReducerContractViolation { field: String, message: String },

    /// A join would emit two columns with the same name after applying its suffixes.
    #[error("join output would contain column '{column}' twice")]
    ColumnCollision { column: String },

    /// A grouping operator saw keys go backwards.
    #[error("{operator} input is not sorted by {keys:?}")]
    UnsortedInput { operator: String, keys: Vec<String> },

    /// A group or join buffer would exceed `ExecutionOptions::max_buffered_rows`.
    #[error("{operator} would buffer more than {limit} rows")]
    MemoryLimitExceeded { operator: String, limit: usize },

    /// Writing or reading an external-sort spill run failed.
    #[error("spill i/o error: {0}")]
    SpillIo(Arc<io::Error>),

    /// Underlying I/O error while reading a source (e.g. file not found).
    #[error("io error: {0}")]
    Io(Arc<io::Error>),

    /// A JSON source line could not be decoded into a row.
    #[error("json error at line {line}: {message}")]
    Json { line: usize, message: String },

    /// CSV source error.
    #[error("csv error: {0}")]
    Csv(Arc<csv::Error>),

    /// `ExecutionOptions` hold a value the engine cannot run with.
    #[error("invalid execution options: {0}")]
    InvalidOptions(String),

    /// The engine's worker pool could not be created.
    #[error("thread pool error: {0}")]
    ThreadPool(String),

    /// Free-form failure raised by a user function.
    #[error("{message}")]
    Function { message: String },
}

impl GraphError {
    /// Build a [`GraphError::MissingField`] that is not yet attributed to an operator.
    pub fn missing_field(field: impl Into<String>) -> Self {
        Self::MissingField {
            field: field.into(),
            operator: None,
        }
    }

    /// Build a [`GraphError::Function`] from any message.
    pub fn function(message: impl Into<String>) -> Self {
        Self::Function {
            message: message.into(),
        }
    }

    pub(crate) fn spill(err: impl Into<io::Error>) -> Self {
        Self::SpillIo(Arc::new(err.into()))
    }

    /// Attribute a field error to `operator` unless it already names one.
    pub(crate) fn in_operator(self, label: &str) -> Self {
        match self {
            Self::MissingField {
                field,
                operator: None,
            } => Self::MissingField {
                field,
                operator: Some(label.to_string()),
            },
            Self::TypeMismatch {
                field,
                expected,
                found,
                operator: None,
            } => Self::TypeMismatch {
                field,
                expected,
                found,
                operator: Some(label.to_string()),
            },
            other => other,
        }
    }
}

impl From<io::Error> for GraphError {
    fn from(err: io::Error) -> Self {
        Self::Io(Arc::new(err))
    }
}

impl From<csv::Error> for GraphError {
    fn from(err: csv::Error) -> Self {
        Self::Csv(Arc::new(err))
    }
}

fn in_operator(operator: &Option<String>) -> String {
    match operator {
        Some(op) => format!(" in {op}"),
        None => String::new(),
    }
}
