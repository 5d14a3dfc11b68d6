use thiserror::Error;

#[derive(Error, Debug)]
pub enum StampError {
    #[error("Failed to parse PDF: {0}")]
    ParseError(String),

    #[error("PDF has no pages")]
    EmptyDocument,

    #[error("Invalid order table: {0}")]
    InvalidOrder(String),

    #[error("Starting exhibit number must be at least 1, got {0}")]
    InvalidStart(u32),

    #[error("Sticker image error: {0}")]
    ImageError(String),

    #[error("PDF operation failed: {0}")]
    OperationError(String),

    #[error("Scratch file error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<image::ImageError> for StampError {
    fn from(err: image::ImageError) -> Self {
        StampError::ImageError(err.to_string())
    }
}
