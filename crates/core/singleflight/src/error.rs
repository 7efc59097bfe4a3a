use std::{fmt, sync::Arc};

/// Result type with the single-flight [`Error`]
pub type Result<T, E> = std::result::Result<T, Error<E>>;

#[derive(Debug)]
/// Single-flight error.
pub enum Error<E> {
    /// The unit of work failed, every caller of the same flight shares this error
    Failed(Arc<E>),
    /// This caller stopped waiting for the in-flight call before it finished
    Cancelled,
    /// The executor went away without recording an outcome, either because the
    /// work panicked or because its future was dropped
    Abandoned,
}

impl<E> Error<E> {
    /// Error raised by the unit of work, if that is what failed
    pub fn failure(&self) -> Option<&Arc<E>> {
        match self {
            Error::Failed(error) => Some(error),
            _ => None,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Error::Cancelled)
    }

    pub fn is_abandoned(&self) -> bool {
        matches!(self, Error::Abandoned)
    }
}

impl<E> Clone for Error<E> {
    fn clone(&self) -> Self {
        match self {
            Error::Failed(error) => Error::Failed(error.clone()),
            Error::Cancelled => Error::Cancelled,
            Error::Abandoned => Error::Abandoned,
        }
    }
}

impl<E: fmt::Display> fmt::Display for Error<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Failed(error) => write!(f, "In-flight call failed: {error}"),
            Error::Cancelled => write!(f, "Stopped waiting for the in-flight call"),
            Error::Abandoned => write!(f, "In-flight call finished without producing a result"),
        }
    }
}

impl<E: std::error::Error + 'static> std::error::Error for Error<E> {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Failed(error) => Some(&**error),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{error::Error as _, io, sync::Arc};

    use super::Error;

    #[test]
    fn failure_exposes_source() {
        let error = Error::Failed(Arc::new(io::Error::new(io::ErrorKind::Other, "boom")));

        assert_eq!(error.to_string(), "In-flight call failed: boom");
        assert_eq!(error.source().map(|e| e.to_string()), Some("boom".into()));
        assert!(error.failure().is_some());
    }

    #[test]
    fn clones_share_the_failure() {
        let error = Error::Failed(Arc::new(io::Error::new(io::ErrorKind::Other, "boom")));
        let clone = error.clone();

        assert!(Arc::ptr_eq(
            error.failure().unwrap(),
            clone.failure().unwrap()
        ));
    }

    #[test]
    fn local_errors_have_no_source() {
        let cancelled: Error<io::Error> = Error::Cancelled;
        let abandoned: Error<io::Error> = Error::Abandoned;

        assert!(cancelled.is_cancelled());
        assert!(abandoned.is_abandoned());
        assert!(cancelled.source().is_none());
        assert!(abandoned.failure().is_none());
    }
}
