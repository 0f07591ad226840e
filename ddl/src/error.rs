//! Error types and result definitions for DDL coordination.
//!
//! Every condition that the coordinator cannot safely recover from is surfaced as a [`DdlError`]
//! instead of terminating the process in place. The supervisor that embeds the coordinator decides
//! how to stop, and tests can assert on the returned [`ErrorKind`].

use std::backtrace::Backtrace;
use std::borrow::Cow;
use std::error;
use std::fmt;
use std::panic::Location;
use std::sync::Arc;

/// Convenient result type for coordinator operations using [`DdlError`] as the error type.
pub type DdlResult<T> = Result<T, DdlError>;

/// Detailed payload stored for single [`DdlError`] instances.
#[derive(Debug, Clone)]
struct ErrorPayload {
    kind: ErrorKind,
    description: Cow<'static, str>,
    detail: Option<Cow<'static, str>>,
    source: Option<Arc<dyn error::Error + Send + Sync>>,
    location: &'static Location<'static>,
    backtrace: Arc<Backtrace>,
}

/// Main error type for DDL coordination.
///
/// A [`DdlError`] is either a single error carrying a kind, a static description, optional
/// detail and source, or an aggregation of several errors collected by a supervisor.
#[derive(Debug, Clone)]
pub struct DdlError {
    repr: ErrorRepr,
}

#[derive(Debug, Clone)]
enum ErrorRepr {
    Single(ErrorPayload),
    Many {
        errors: Vec<DdlError>,
        location: &'static Location<'static>,
    },
}

/// Categories of errors raised by the coordinator.
#[derive(PartialEq, Eq, Copy, Clone, Debug, Hash)]
#[non_exhaustive]
pub enum ErrorKind {
    // Data & Serialization Errors
    SerializationError,
    DeserializationError,
    InvalidData,

    // State & Invariant Errors
    InvalidState,
    RegistryInvariantViolated,

    // Schema Change Errors
    IllegalDdl,
    UnsupportedDdl,

    // Source Metadata Errors
    ShardMetadataQueryFailed,

    // Configuration & IO Errors
    ConfigError,
    IoError,

    // Worker Errors
    EliminationWorkerPanic,

    // Unknown / Uncategorized
    Unknown,
}

impl DdlError {
    /// Returns the [`ErrorKind`] of this error.
    ///
    /// For aggregated errors, returns the kind of the first error or [`ErrorKind::Unknown`]
    /// if there is none.
    pub fn kind(&self) -> ErrorKind {
        match self.repr {
            ErrorRepr::Single(ref payload) => payload.kind,
            ErrorRepr::Many { ref errors, .. } => errors
                .first()
                .map(|err| err.kind())
                .unwrap_or(ErrorKind::Unknown),
        }
    }

    /// Returns all [`ErrorKind`]s present in this error.
    pub fn kinds(&self) -> Vec<ErrorKind> {
        match self.repr {
            ErrorRepr::Single(ref payload) => vec![payload.kind],
            ErrorRepr::Many { ref errors, .. } => {
                errors.iter().flat_map(|err| err.kinds()).collect()
            }
        }
    }

    /// Returns the static description of this error.
    pub fn description(&self) -> &str {
        match self.repr {
            ErrorRepr::Single(ref payload) => &payload.description,
            ErrorRepr::Many { .. } => "multiple errors",
        }
    }

    /// Returns the dynamic detail, if any.
    ///
    /// For aggregated errors, returns the detail of the first error that has one.
    pub fn detail(&self) -> Option<&str> {
        match self.repr {
            ErrorRepr::Single(ref payload) => payload.detail.as_deref(),
            ErrorRepr::Many { ref errors, .. } => errors.iter().find_map(|e| e.detail()),
        }
    }

    /// Returns the captured backtrace for single errors.
    pub fn backtrace(&self) -> Option<&Backtrace> {
        match self.repr {
            ErrorRepr::Single(ref payload) => Some(payload.backtrace.as_ref()),
            ErrorRepr::Many { .. } => None,
        }
    }

    /// Returns the callsite where this error was created.
    pub fn location(&self) -> &'static Location<'static> {
        match self.repr {
            ErrorRepr::Single(ref payload) => payload.location,
            ErrorRepr::Many { location, .. } => location,
        }
    }

    /// Attaches an originating error and returns the modified instance.
    ///
    /// Has no effect on aggregated errors, which forward their first error as the source.
    pub fn with_source<E>(mut self, source: E) -> Self
    where
        E: error::Error + Send + Sync + 'static,
    {
        if let ErrorRepr::Single(ref mut payload) = self.repr {
            payload.source = Some(Arc::new(source));
        }
        self
    }

    #[track_caller]
    fn from_components(
        kind: ErrorKind,
        description: Cow<'static, str>,
        detail: Option<Cow<'static, str>>,
        source: Option<Arc<dyn error::Error + Send + Sync>>,
    ) -> Self {
        DdlError {
            repr: ErrorRepr::Single(ErrorPayload {
                kind,
                description,
                detail,
                source,
                location: Location::caller(),
                backtrace: Arc::new(Backtrace::capture()),
            }),
        }
    }
}

impl PartialEq for DdlError {
    fn eq(&self, other: &DdlError) -> bool {
        match (&self.repr, &other.repr) {
            (ErrorRepr::Single(a), ErrorRepr::Single(b)) => a.kind == b.kind,
            (ErrorRepr::Many { errors: a, .. }, ErrorRepr::Many { errors: b, .. }) => a == b,
            _ => false,
        }
    }
}

impl fmt::Display for DdlError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.repr {
            ErrorRepr::Single(payload) => {
                let location = payload.location;
                write!(
                    f,
                    "[{:?}] {} @ {}:{}:{}",
                    payload.kind,
                    payload.description,
                    location.file(),
                    location.line(),
                    location.column()
                )?;

                if let Some(detail) = payload.detail.as_deref() {
                    write!(f, "\n  Detail:")?;
                    for line in detail.lines() {
                        write!(f, "\n    {line}")?;
                    }
                }

                let backtrace = payload.backtrace.to_string();
                if !backtrace.trim().is_empty() {
                    write!(f, "\n  Backtrace:")?;
                    for line in backtrace.lines() {
                        write!(f, "\n    {line}")?;
                    }
                }

                Ok(())
            }
            ErrorRepr::Many { errors, location } => {
                write!(
                    f,
                    "[Many] {} error{} aggregated @ {}:{}:{}",
                    errors.len(),
                    if errors.len() == 1 { "" } else { "s" },
                    location.file(),
                    location.line(),
                    location.column()
                )?;

                for (index, error) in errors.iter().enumerate() {
                    let rendered = error.to_string();
                    let mut lines = rendered.lines();
                    write!(f, "\n  {}. {}", index + 1, lines.next().unwrap_or_default())?;
                    for line in lines {
                        write!(f, "\n     {line}")?;
                    }
                }

                Ok(())
            }
        }
    }
}

impl error::Error for DdlError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match &self.repr {
            ErrorRepr::Single(payload) => payload
                .source
                .as_ref()
                .map(|source| source.as_ref() as &(dyn error::Error + 'static)),
            ErrorRepr::Many { errors, .. } => errors
                .first()
                .map(|error| error as &(dyn error::Error + 'static)),
        }
    }
}

/// Creates a [`DdlError`] from an error kind and static description.
impl From<(ErrorKind, &'static str)> for DdlError {
    #[track_caller]
    fn from((kind, desc): (ErrorKind, &'static str)) -> DdlError {
        DdlError::from_components(kind, Cow::Borrowed(desc), None, None)
    }
}

/// Creates a [`DdlError`] from an error kind, static description, and dynamic detail.
impl<D> From<(ErrorKind, &'static str, D)> for DdlError
where
    D: Into<Cow<'static, str>>,
{
    #[track_caller]
    fn from((kind, desc, detail): (ErrorKind, &'static str, D)) -> DdlError {
        DdlError::from_components(kind, Cow::Borrowed(desc), Some(detail.into()), None)
    }
}

/// Aggregates several errors.
///
/// A vector with exactly one error yields that error unchanged.
impl<E> From<Vec<E>> for DdlError
where
    E: Into<DdlError>,
{
    #[track_caller]
    fn from(errors: Vec<E>) -> DdlError {
        let location = Location::caller();
        let mut errors: Vec<DdlError> = errors.into_iter().map(Into::into).collect();

        if errors.len() == 1 {
            if let Some(error) = errors.pop() {
                return error;
            }
        }

        DdlError {
            repr: ErrorRepr::Many { errors, location },
        }
    }
}

/// Converts [`std::io::Error`] to [`DdlError`] with [`ErrorKind::IoError`].
impl From<std::io::Error> for DdlError {
    #[track_caller]
    fn from(err: std::io::Error) -> DdlError {
        let detail = err.to_string();
        DdlError::from_components(
            ErrorKind::IoError,
            Cow::Borrowed("I/O operation failed"),
            Some(Cow::Owned(detail)),
            Some(Arc::new(err)),
        )
    }
}

/// Converts [`serde_json::Error`] to [`DdlError`].
///
/// I/O failures map to [`ErrorKind::IoError`]. Syntax, data and EOF failures only happen when
/// reading, so they map to [`ErrorKind::DeserializationError`]. Errors raised while writing a
/// value are classified as [`ErrorKind::SerializationError`] by the caller through [`ddl_error!`].
impl From<serde_json::Error> for DdlError {
    #[track_caller]
    fn from(err: serde_json::Error) -> DdlError {
        let (kind, description) = match err.classify() {
            serde_json::error::Category::Io => (ErrorKind::IoError, "JSON I/O operation failed"),
            serde_json::error::Category::Syntax
            | serde_json::error::Category::Data
            | serde_json::error::Category::Eof => (
                ErrorKind::DeserializationError,
                "JSON deserialization failed",
            ),
        };

        let detail = err.to_string();
        DdlError::from_components(
            kind,
            Cow::Borrowed(description),
            Some(Cow::Owned(detail)),
            Some(Arc::new(err)),
        )
    }
}

/// Converts [`ddl_config::shared::ValidationError`] to [`DdlError`] with [`ErrorKind::ConfigError`].
impl From<ddl_config::shared::ValidationError> for DdlError {
    #[track_caller]
    fn from(err: ddl_config::shared::ValidationError) -> DdlError {
        let detail = err.to_string();
        DdlError::from_components(
            ErrorKind::ConfigError,
            Cow::Borrowed("Invalid DDL configuration"),
            Some(Cow::Owned(detail)),
            Some(Arc::new(err)),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{bail, ddl_error};

    fn fails_with_detail() -> DdlResult<()> {
        bail!(
            ErrorKind::IllegalDdl,
            "Illegal DDL",
            format!("namespace {}", "db.$cmd")
        );
    }

    #[test]
    fn test_single_error_accessors() {
        let err = ddl_error!(ErrorKind::InvalidState, "Source is not registered", "rs1");
        assert_eq!(err.kind(), ErrorKind::InvalidState);
        assert_eq!(err.description(), "Source is not registered");
        assert_eq!(err.detail(), Some("rs1"));
        assert!(err.to_string().contains("[InvalidState] Source is not registered"));
    }

    #[test]
    fn test_bail_returns_error() {
        let err = fails_with_detail().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::IllegalDdl);
        assert_eq!(err.detail(), Some("namespace db.$cmd"));
    }

    #[test]
    fn test_many_errors() {
        let err = DdlError::from(vec![
            ddl_error!(ErrorKind::IllegalDdl, "Illegal DDL"),
            ddl_error!(ErrorKind::UnsupportedDdl, "Unsupported DDL"),
        ]);
        assert_eq!(err.kind(), ErrorKind::IllegalDdl);
        assert_eq!(
            err.kinds(),
            vec![ErrorKind::IllegalDdl, ErrorKind::UnsupportedDdl]
        );
        assert!(err.to_string().starts_with("[Many] 2 errors aggregated"));
    }

    #[test]
    fn test_single_element_vector_is_unwrapped() {
        let err = DdlError::from(vec![ddl_error!(ErrorKind::InvalidData, "Invalid data")]);
        assert_eq!(err.kinds(), vec![ErrorKind::InvalidData]);
        assert!(err.backtrace().is_some());
    }

    #[test]
    fn test_json_error_classification() {
        let json_err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err = DdlError::from(json_err);
        assert_eq!(err.kind(), ErrorKind::DeserializationError);
        assert!(error::Error::source(&err).is_some());
    }
}
