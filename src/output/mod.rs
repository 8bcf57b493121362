//! Still-image encoding and output file naming.

pub mod encoder;
pub mod naming;

pub use encoder::{ImageEncoder, ImageFormat, JpegEncoder, PngEncoder};
pub use naming::{BaseName, OutputName, TimeSource};
