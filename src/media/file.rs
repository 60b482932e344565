/// Image file handles coming from the presentation layer
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use std::path::Path;

/// A binary file with its declared media type
#[derive(Debug, Clone, PartialEq)]
pub struct ImageFile {
    /// Original filename, if the collaborator knows it
    pub name: Option<String>,
    /// Declared media type (e.g. "image/jpeg")
    pub media_type: String,
    pub bytes: Vec<u8>,
}

impl ImageFile {
    pub fn new(name: Option<String>, media_type: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            name,
            media_type: media_type.into(),
            bytes,
        }
    }

    /// Read a file from disk, guessing the media type from its extension
    pub fn from_path(path: &Path) -> std::io::Result<Self> {
        let bytes = std::fs::read(path)?;
        let name = path
            .file_name()
            .map(|name| name.to_string_lossy().to_string());
        let media_type = media_type_for(path).to_string();
        Ok(Self {
            name,
            media_type,
            bytes,
        })
    }

    pub fn is_image(&self) -> bool {
        self.media_type.starts_with("image/")
    }

    /// Encode the untouched bytes as a self-contained `data:` URL
    pub fn to_data_url(&self) -> String {
        let media_type = if self.media_type.is_empty() {
            "application/octet-stream"
        } else {
            &self.media_type
        };
        format!("data:{};base64,{}", media_type, STANDARD.encode(&self.bytes))
    }
}

/// Media type from a file extension; unknown extensions are octet streams
pub fn media_type_for(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .map(|ext| ext.to_string_lossy().to_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "bmp" => "image/bmp",
        "tif" | "tiff" => "image/tiff",
        _ => "application/octet-stream",
    }
}
