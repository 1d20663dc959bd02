use std::path::Path;
use tokio::io::AsyncReadExt;

/// Extensions a sniffed image may carry on disk.
pub const ALLOWED_EXTENSIONS: [&str; 7] = ["jpg", "jpeg", "png", "webp", "gif", "heic", "heif"];

const DECLARED_IMAGE_TYPES: [&str; 6] = [
    "image/jpeg",
    "image/png",
    "image/webp",
    "image/gif",
    "image/heic",
    "image/heif",
];

const DEFAULT_EXTENSION: &str = "jpg";

// Enough for every signature `infer` knows about, including ISO-BMFF brands.
const SNIFF_BYTES: u64 = 8192;

/// The declared `Content-Type` check. Clients control this header, so it
/// only filters out the obvious cases before anything is written.
pub fn declared_type_allowed(content_type: Option<&str>) -> bool {
    let Some(content_type) = content_type else {
        return false;
    };
    let lower = content_type.to_ascii_lowercase();
    DECLARED_IMAGE_TYPES.iter().any(|t| lower.contains(t))
}

/// Extension used for the staged copy of an upload: the client's own, or
/// `jpg` when it has none usable.
pub fn staged_extension(original_name: &str) -> String {
    Path::new(original_name)
        .extension()
        .and_then(|ext| ext.to_str())
        .filter(|ext| !ext.is_empty() && ext.len() <= 10)
        .filter(|ext| ext.chars().all(|c| c.is_ascii_alphanumeric()))
        .map(|ext| ext.to_ascii_lowercase())
        .unwrap_or_else(|| DEFAULT_EXTENSION.to_string())
}

pub fn extension_of(path: &Path) -> String {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase())
        .unwrap_or_default()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SniffedImage {
    pub mime: &'static str,
    pub extension: &'static str,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SniffRejection {
    /// Nothing recognisable, or a recognised type outside `image/*`.
    NotImage,
    /// An image, but not one of [`ALLOWED_EXTENSIONS`].
    Unsupported { mime: String },
}

/// Determines the real type of `bytes` from their header.
pub fn classify(bytes: &[u8]) -> Result<SniffedImage, SniffRejection> {
    let kind = infer::get(bytes).ok_or(SniffRejection::NotImage)?;

    let mime = kind.mime_type();
    if !mime.starts_with("image/") {
        return Err(SniffRejection::NotImage);
    }

    let extension = kind.extension();
    if !ALLOWED_EXTENSIONS.contains(&extension) {
        return Err(SniffRejection::Unsupported {
            mime: mime.to_string(),
        });
    }

    if extension == "heif" {
        return Ok(heif_family(bytes));
    }

    Ok(SniffedImage { mime, extension })
}

/// `infer` reports every HEVC-coded HEIF as `heif`. HEIF files are stored as
/// `.heic`, with the MIME type following the ftyp major brand.
fn heif_family(bytes: &[u8]) -> SniffedImage {
    let mime = match bytes.get(8..12) {
        Some(b"heic") | Some(b"heix") => "image/heic",
        _ => "image/heif",
    };
    SniffedImage {
        mime,
        extension: "heic",
    }
}

/// Reads the head of a staged file and classifies it. A file that cannot be
/// read counts as not being an image.
pub async fn sniff_file(path: &Path) -> Result<SniffedImage, SniffRejection> {
    let mut head = Vec::with_capacity(SNIFF_BYTES as usize);
    let read = async {
        let file = tokio::fs::File::open(path).await?;
        file.take(SNIFF_BYTES).read_to_end(&mut head).await
    };

    match read.await {
        Ok(_) => classify(&head),
        Err(e) => {
            tracing::debug!("Could not read {:?} for sniffing: {}", path, e);
            Err(SniffRejection::NotImage)
        }
    }
}

/// Formats a byte count for log lines, e.g. `1.50 MB`.
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];
    if bytes == 0 {
        return "0 B".to_string();
    }

    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }

    format!("{:.2} {}", value, UNITS[unit])
}
