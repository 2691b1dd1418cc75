//! Error types for the Majel-1 storage stack.

use thiserror::Error;

/// Driver error codes returned by MajelFS operations.
///
/// The discriminants are the bytes the firmware hands back to callers, so a
/// value can travel through a register unchanged.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MfsError {
    #[error("I/O target not found")]
    NotFound = 0xFF,

    #[error("No card responding")]
    NoCard = 0xFE,

    #[error("Medium is not MajelFS formatted")]
    NoFormat = 0xFD,

    #[error("Unsupported MajelFS version")]
    BadVersion = 0xFC,

    #[error("Already connected or a handle is open")]
    Connected = 0xFB,
}

impl MfsError {
    /// Error code byte.
    pub const fn code(self) -> u8 {
        self as u8
    }

    /// Map an error code byte back to its error.
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0xFF => Some(Self::NotFound),
            0xFE => Some(Self::NoCard),
            0xFD => Some(Self::NoFormat),
            0xFC => Some(Self::BadVersion),
            0xFB => Some(Self::Connected),
            _ => None,
        }
    }
}

/// Result type for driver operations.
pub type MfsResult<T> = Result<T, MfsError>;

/// Errors outside the driver: configuration, images, packages.
#[derive(Error, Debug)]
pub enum MajelError {
    #[error("MFS error: {0}")]
    Mfs(#[from] MfsError),

    #[error("{name} needs {size} bytes below {top:#06X}")]
    Window {
        name: &'static str,
        size: usize,
        top: u32,
    },

    #[error("Memory windows overlap: {0}")]
    Overlap(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Image error: {0}")]
    Image(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("ZIP error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type for everything outside the driver.
pub type MajelResult<T> = Result<T, MajelError>;
