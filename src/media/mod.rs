/// Image handling module
///
/// This module handles:
/// - File handles with declared media types (file.rs)
/// - Downsampling to bounded, embeddable JPEG thumbnails (thumbnail.rs)
/// - Inlining raw files as `data:` URLs for the upload fallback

pub mod file;
pub mod thumbnail;

pub use file::ImageFile;
pub use thumbnail::{thumbnail, thumbnail_async, ThumbnailOptions};
