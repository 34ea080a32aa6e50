use thiserror::Error;

pub type Result<T> = std::result::Result<T, CameraError>;

#[derive(Debug, Error)]
pub enum CameraError {
    /// No adapter could be opened, or the opened one has since closed
    #[error("Camera not available")]
    DeviceUnavailable,

    #[error("Invalid mode '{0}'. Use \"black\", \"white\" or \"other\".")]
    InvalidMode(String),

    /// The exclusive grab inside a capture returned nothing
    #[error("Failed to capture frame")]
    CaptureFailed,

    #[error("JPEG encoding failed: {0}")]
    Encode(#[from] image::ImageError),

    #[error("Frame buffer does not match {width}x{height}")]
    FrameLayout { width: u32, height: u32 },

    #[error("Vendor SDK error: {0}")]
    Sdk(String),

    #[error("Another instance is already serving on port {port}")]
    AlreadyRunning { port: u16 },

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
