use thiserror::Error;

pub type DeckResult<T> = std::result::Result<T, DeckError>;

/// Failure of a session or content operation.
///
/// Every variant is raised before the document is touched, so a failed call
/// leaves the session exactly as it was.
#[derive(Debug, Error)]
pub enum DeckError {
    #[error("no presentation is open; create or open one first")]
    NoOpenDocument,
    #[error("a presentation is already open ({path}); close it first")]
    AlreadyOpen { path: String },
    #[error("the presentation has unsaved changes; save it or close with discard_unsaved")]
    UnsavedChanges,
    #[error("slide {number} is out of range (presentation has {count} slides)")]
    SlideIndex { number: usize, count: usize },
    #[error("shape {reference} not found on slide {slide}")]
    ShapeNotFound { slide: usize, reference: String },
    #[error("cell ({row}, {column}) is outside the {rows}x{columns} table")]
    CellIndex {
        row: usize,
        column: usize,
        rows: usize,
        columns: usize,
    },
    #[error("table data does not fit a {rows}x{columns} grid: {detail}")]
    TableShapeMismatch {
        rows: usize,
        columns: usize,
        detail: String,
    },
    #[error("icon '{name}' not found{hint}")]
    IconNotFound { name: String, hint: String },
    #[error("icon rendering is unavailable: {0}")]
    RenderingUnavailable(String),
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Package(#[from] anyhow::Error),
}

impl DeckError {
    pub fn invalid(message: impl Into<String>) -> Self {
        DeckError::InvalidInput(message.into())
    }

    pub fn icon_not_found(name: &str, suggestions: &[String]) -> Self {
        let hint = if suggestions.is_empty() {
            String::new()
        } else {
            format!("; similar icons: {}", suggestions.join(", "))
        };
        DeckError::IconNotFound {
            name: name.to_string(),
            hint,
        }
    }

    /// Stable name reported to callers alongside the message.
    pub fn kind(&self) -> &'static str {
        match self {
            DeckError::NoOpenDocument => "NoOpenDocumentError",
            DeckError::AlreadyOpen { .. } => "AlreadyOpenError",
            DeckError::UnsavedChanges => "UnsavedChangesError",
            DeckError::SlideIndex { .. } => "SlideIndexError",
            DeckError::ShapeNotFound { .. } => "ShapeNotFoundError",
            DeckError::CellIndex { .. } => "CellIndexError",
            DeckError::TableShapeMismatch { .. } => "TableShapeMismatchError",
            DeckError::IconNotFound { .. } => "IconNotFoundError",
            DeckError::RenderingUnavailable(_) => "RenderingUnavailableError",
            DeckError::InvalidInput(_) => "InvalidInputError",
            DeckError::Io(_) => "IoError",
            DeckError::Package(_) => "PackageError",
        }
    }
}
