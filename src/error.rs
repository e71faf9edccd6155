use thiserror::Error;

/// Errors from the archive / XML parsing layer.
#[derive(Error, Debug)]
pub enum ArchiveError {
    #[error("member not found: {0}")]
    MemberNotFound(String),
    #[error("malformed xml in {path}: {source}")]
    Xml {
        path: String,
        #[source]
        source: quick_xml::Error,
    },
    #[error("malformed xml attribute in {path}: {source}")]
    Attr {
        path: String,
        #[source]
        source: quick_xml::events::attributes::AttrError,
    },
    #[error("unexpected end tag without matching start in {0}")]
    UnbalancedTags(String),
    #[error("invalid utf-8 in {path}: {source}")]
    Utf8 {
        path: String,
        #[source]
        source: std::str::Utf8Error,
    },
    #[error("zip error: {0}")]
    Zip(#[from] zip::result::ZipError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Crate-level error type returned by every public [`crate::package::IdmlPackage`] operation.
#[derive(Error, Debug)]
pub enum IdmlError {
    #[error(transparent)]
    Archive(#[from] ArchiveError),

    #[error("package is missing or has a malformed required part: {0}")]
    MalformedPackage(String),

    #[error("reference to `{0}` does not resolve to any part in the package")]
    BrokenReference(String),

    #[error("token `{0}` is used by both the donor and recipient packages")]
    TokenCollision(String),

    #[error("cannot graft into non-empty slot `{0}`")]
    IncompatibleSlot(String),

    #[error("no part at path `{0}`")]
    UnknownPath(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, IdmlError>;
