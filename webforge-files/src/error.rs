use derive_more::Display;

/// Errors which can occur while resolving a request path against a mount's
/// source list.
#[derive(Display, Debug, Clone, PartialEq, Eq)]
pub enum FilesError {
    /// Every source in the mount either has no entry at the resolved path or
    /// SPA fallback did not apply.
    #[display("no source had an entry for the resolved path")]
    NotFound,

    /// A source had an entry but it was a directory with no `index.html`.
    #[display("unable to serve directory without an index file")]
    IsDirectory,

    /// The requested path failed sanitization.
    #[display("{_0}")]
    BadPath(UriSegmentError),

    /// Opening or reading the resolved file failed.
    #[display("{_0}")]
    Io(IoErrorKind),
}

impl std::error::Error for FilesError {}

impl From<UriSegmentError> for FilesError {
    fn from(err: UriSegmentError) -> Self {
        FilesError::BadPath(err)
    }
}

impl From<std::io::Error> for FilesError {
    fn from(err: std::io::Error) -> Self {
        FilesError::Io(IoErrorKind(err.kind()))
    }
}

/// A cloneable, comparable stand-in for [`std::io::Error`], which implements
/// neither `Clone` nor `PartialEq`.
#[derive(Display, Debug, Clone, Copy, PartialEq, Eq)]
#[display("{_0:?}")]
pub struct IoErrorKind(pub std::io::ErrorKind);

/// A request path segment violated the traversal-safety grammar.
#[derive(Display, Debug, Clone, Copy, PartialEq, Eq)]
pub enum UriSegmentError {
    /// The segment started with the wrapped invalid character.
    #[display("path segment started with invalid character {_0:?}")]
    BadStart(char),
    /// The segment contained the wrapped invalid character.
    #[display("path segment contained invalid character {_0:?}")]
    BadChar(char),
    /// The segment ended with the wrapped invalid character.
    #[display("path segment ended with invalid character {_0:?}")]
    BadEnd(char),
}

impl std::error::Error for UriSegmentError {}
