use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum JournalError {
    #[error(
        "The file '{}' is currently open in another application (e.g., Excel).\nPlease close the file and try again.",
        .0.display()
    )]
    Locked(PathBuf),
    #[error("Please fill all fields ({}).", .0.join(", "))]
    EmptyFields(Vec<&'static str>),
    #[error("No image found in clipboard.\nPlease take a screenshot first.")]
    NoClipboardImage,
    #[error("Could not read the clipboard: {0}")]
    Clipboard(String),
    #[error("No screenshot pasted.\nPress 'Paste Screenshot' to add an image.")]
    MissingScreenshot,
    #[error("Image file not found: {}", .0.display())]
    ImageNotFound(PathBuf),
    #[error("Failed to attach screenshot: {0}")]
    Image(#[from] image::ImageError),
    #[error("Workbook error in '{}': {message}", .path.display())]
    Workbook { path: PathBuf, message: String },
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, JournalError>;

impl JournalError {
    /// Título del diálogo con que se muestra el error
    pub fn title(&self) -> &'static str {
        match self {
            JournalError::Locked(_) => "File Access Error",
            _ => "Error",
        }
    }

    pub(crate) fn workbook(path: impl Into<PathBuf>, err: impl std::fmt::Display) -> Self {
        JournalError::Workbook { path: path.into(), message: err.to_string() }
    }

    /// Traduce un error de I/O sobre el libro: permiso denegado = abierto en otra app
    pub(crate) fn from_io(path: impl Into<PathBuf>, err: std::io::Error) -> Self {
        if err.kind() == std::io::ErrorKind::PermissionDenied {
            JournalError::Locked(path.into())
        } else {
            JournalError::Io(err)
        }
    }
}
