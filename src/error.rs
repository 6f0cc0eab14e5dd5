use std::error;
use std::fmt;
use std::io;
use std::path::PathBuf;

/// Error type for map parsing, payload decoding and resource loading.
#[derive(Debug)]
pub enum MapError {
    /// File I/O error.
    Io {
        /// The file being read.
        path: PathBuf,
        /// Underlying error.
        source: io::Error,
    },
    /// XML parse error.
    Xml {
        /// The file being parsed.
        path: PathBuf,
        /// Underlying error.
        source: quick_xml::Error,
    },
    /// Malformed document structure: a required node or attribute is
    /// missing, or a value does not convert.
    Format(String),
    /// The map declares a format version this parser does not handle.
    UnsupportedVersion {
        /// The version string found in the map file.
        found: String,
    },
    /// A layer payload declares an encoding that is not supported.
    UnsupportedEncoding {
        /// Name of the offending layer.
        layer: String,
        /// The declared encoding.
        encoding: String,
    },
    /// A layer payload declares a compression that is not supported.
    UnsupportedCompression {
        /// Name of the offending layer.
        layer: String,
        /// The declared compression.
        compression: String,
    },
    /// A decoded layer payload does not contain width*height tiles.
    LayerSizeMismatch {
        /// Name of the offending layer.
        layer: String,
        /// Number of tiles the layer dimensions require.
        expected: usize,
        /// Number of tiles actually decoded.
        actual: usize,
    },
    /// A referenced image could not be loaded.
    Image {
        /// Path of the image (empty for embedded image data).
        path: PathBuf,
        /// Underlying error.
        source: image::ImageError,
    },
    /// A grid layer references a gid no tileset provides.
    UnknownGid {
        /// Name of the offending layer.
        layer: String,
        /// The unresolvable gid (flip flags stripped).
        gid: u32,
    },
}

impl fmt::Display for MapError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MapError::Io { path, source } => {
                write!(f, "I/O error reading {}: {}", path.display(), source)
            }
            MapError::Xml { path, source } => {
                write!(f, "XML parse error in {}: {}", path.display(), source)
            }
            MapError::Format(msg) => write!(f, "malformed map: {}", msg),
            MapError::UnsupportedVersion { found } => {
                write!(f, "unsupported map format version '{}', expected 1.0", found)
            }
            MapError::UnsupportedEncoding { layer, encoding } => {
                write!(f, "layer '{}' uses unknown data encoding '{}'", layer, encoding)
            }
            MapError::UnsupportedCompression { layer, compression } => write!(
                f,
                "layer '{}' uses unknown data compression '{}'",
                layer, compression
            ),
            MapError::LayerSizeMismatch {
                layer,
                expected,
                actual,
            } => write!(
                f,
                "layer '{}' decoded to {} tiles, dimensions require {}",
                layer, actual, expected
            ),
            MapError::Image { path, source } => {
                write!(f, "failed to load image {}: {}", path.display(), source)
            }
            MapError::UnknownGid { layer, gid } => {
                write!(f, "layer '{}' references unknown gid {}", layer, gid)
            }
        }
    }
}

impl error::Error for MapError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match self {
            MapError::Io { source, .. } => Some(source),
            MapError::Xml { source, .. } => Some(source),
            MapError::Image { source, .. } => Some(source),
            _ => None,
        }
    }
}
