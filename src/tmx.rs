//! Typed map document.
//!
//! A [`TileMap`] is the decoded form of one TMX file: tile sets, grid
//! layers and object groups in file order, plus free-form properties.
//! Grid layer payloads stay raw until [`TileMap::decode`] turns them
//! into flat gid sequences.

use std::collections::HashMap;
use std::io::Read;
use std::path::PathBuf;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use flate2::read::{GzDecoder, ZlibDecoder};

use crate::error::MapError;
use crate::raster::ColorKey;

/// Gid bit flagging a horizontal flip.
pub const FLIP_X: u32 = 1 << 31;
/// Gid bit flagging a vertical flip.
pub const FLIP_Y: u32 = 1 << 30;
/// Mask keeping the tile-identity part of a gid.
pub const GID_MASK: u32 = !(FLIP_X | FLIP_Y);

/// A global tile id as stored in layer data: the low 30 bits select the
/// tile image, the top two bits flag horizontal/vertical flips.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Gid(pub u32);

impl Gid {
    /// The raw value including flip flags.
    #[inline]
    pub fn raw(self) -> u32 {
        self.0
    }

    /// The tile identity with flip flags stripped.
    #[inline]
    pub fn clean(self) -> u32 {
        self.0 & GID_MASK
    }

    /// True if the horizontal flip flag is set.
    #[inline]
    pub fn flip_x(self) -> bool {
        self.0 & FLIP_X != 0
    }

    /// True if the vertical flip flag is set.
    #[inline]
    pub fn flip_y(self) -> bool {
        self.0 & FLIP_Y != 0
    }

    /// True if either flip flag is set.
    #[inline]
    pub fn has_flips(self) -> bool {
        self.0 & (FLIP_X | FLIP_Y) != 0
    }
}

/// Free-form name/value properties attached to maps, layers, tile sets,
/// tiles and objects. Values are transported as strings; the typed
/// getters parse on demand for game logic that knows what to expect.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Properties(HashMap<String, String>);

impl Properties {
    /// Creates an empty property set.
    pub fn new() -> Self {
        Properties(HashMap::new())
    }

    /// Inserts or replaces a property.
    pub fn insert(&mut self, name: String, value: String) {
        self.0.insert(name, value);
    }

    /// Raw string value.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }

    /// Value parsed as an integer.
    pub fn get_int(&self, name: &str) -> Option<i64> {
        self.get(name)?.trim().parse().ok()
    }

    /// Value parsed as a float.
    pub fn get_float(&self, name: &str) -> Option<f64> {
        self.get(name)?.trim().parse().ok()
    }

    /// Value parsed as a boolean ("true"/"false" or 0/1).
    pub fn get_bool(&self, name: &str) -> Option<bool> {
        match self.get(name)?.trim() {
            "true" | "1" => Some(true),
            "false" | "0" => Some(false),
            _ => None,
        }
    }

    /// Number of properties.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True if there are no properties.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterates over name/value pairs in arbitrary order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

/// An image referenced by a tile set: either an on-disk file (path
/// already resolved relative to the referencing map/tileset file) or
/// inline encoded content.
#[derive(Debug, Clone)]
pub struct TileImage {
    /// Image id, referenced by per-tile overrides without own data.
    pub id: u32,
    /// Resolved path of the image file, if file-backed.
    pub source: Option<PathBuf>,
    /// Colorkey; matching pixels are treated as transparent.
    pub trans: Option<ColorKey>,
    /// Encoding of `content` ("base64" is the only supported value).
    pub encoding: Option<String>,
    /// Inline encoded image content.
    pub content: Option<String>,
}

/// Per-tile metadata inside a tile set: an override image and/or
/// properties for the tile at `first_gid + id`.
#[derive(Debug, Clone)]
pub struct Tile {
    /// Local tile id; the global id is `TileSet::first_gid + id`.
    pub id: u32,
    /// Override images. An entry without source or content references a
    /// tileset-level embedded image by `id` instead.
    pub images: Vec<TileImage>,
    /// Tile properties.
    pub properties: Properties,
}

/// A named collection of tile images sharing a first-gid offset.
#[derive(Debug, Clone)]
pub struct TileSet {
    /// First global tile id of this set; gids are contiguous from here.
    pub first_gid: u32,
    /// Tile set name.
    pub name: String,
    /// Tile width in pixels; 0 means "use the map's tile width".
    pub tile_width: u32,
    /// Tile height in pixels; 0 means "use the map's tile height".
    pub tile_height: u32,
    /// Outer margin in pixels when slicing a sheet.
    pub margin: u32,
    /// Spacing between tiles in pixels when slicing a sheet.
    pub spacing: u32,
    /// Source images (usually one sprite sheet).
    pub images: Vec<TileImage>,
    /// Per-tile overrides.
    pub tiles: Vec<Tile>,
    /// Tile set properties.
    pub properties: Properties,
}

/// The raw payload of a grid layer as found in the file.
#[derive(Debug, Clone)]
pub enum LayerPayload {
    /// One `<tile gid="..."/>` child per cell, already integer-valued.
    TileList(Vec<u32>),
    /// Text content with a declared encoding and optional compression,
    /// decoded by [`TileLayer::decode`].
    Encoded {
        /// Declared encoding ("csv" or "base64").
        encoding: String,
        /// Declared compression ("zlib" or "gzip"), base64 only.
        compression: Option<String>,
        /// The raw text content.
        text: String,
    },
    /// No data node was present.
    Missing,
}

/// One grid layer: dimensions, raw payload and (after [`decode`]) the
/// flat row-major gid sequence.
///
/// [`decode`]: TileLayer::decode
#[derive(Debug, Clone)]
pub struct TileLayer {
    /// Layer name.
    pub name: String,
    /// World offset in tiles, x.
    pub x: i32,
    /// World offset in tiles, y.
    pub y: i32,
    /// Width in tiles.
    pub width: u32,
    /// Height in tiles.
    pub height: u32,
    /// Tile width in pixels, copied from the map.
    pub tile_width: u32,
    /// Tile height in pixels, copied from the map.
    pub tile_height: u32,
    /// Opacity in [0, 1].
    pub opacity: f32,
    /// Visibility flag.
    pub visible: bool,
    /// Layer properties.
    pub properties: Properties,
    /// Raw payload as parsed from the file.
    pub payload: LayerPayload,
    /// Flat gid sequence, row-major, filled by [`TileLayer::decode`].
    pub decoded_content: Vec<u32>,
}

impl TileLayer {
    /// Pixel width, always derived from the tile grid.
    pub fn pixel_width(&self) -> u32 {
        self.width * self.tile_width
    }

    /// Pixel height, always derived from the tile grid.
    pub fn pixel_height(&self) -> u32 {
        self.height * self.tile_height
    }

    /// True once `decoded_content` holds one gid per cell.
    pub fn is_decoded(&self) -> bool {
        self.decoded_content.len() == (self.width as usize) * (self.height as usize)
    }

    /// The gid at `(x, y)`, or `None` outside the grid or before
    /// decoding. Gid 0 means "no tile".
    pub fn gid_at(&self, x: u32, y: u32) -> Option<u32> {
        if x >= self.width || y >= self.height {
            return None;
        }
        self.decoded_content
            .get(x as usize + y as usize * self.width as usize)
            .copied()
    }

    /// Decodes the raw payload into the flat gid sequence. Re-invoking
    /// recomputes from the raw payload and yields the same result.
    pub fn decode(&mut self) -> Result<(), MapError> {
        let expected = self.width as usize * self.height as usize;
        let decoded: Vec<u32> = match &self.payload {
            LayerPayload::TileList(gids) => gids.clone(),
            LayerPayload::Encoded {
                encoding,
                compression,
                text,
            } => match encoding.as_str() {
                "csv" => {
                    let mut out = Vec::with_capacity(expected);
                    for token in text.split(',') {
                        let token = token.trim();
                        if token.is_empty() {
                            continue;
                        }
                        let gid = token.parse::<u32>().map_err(|_| {
                            MapError::Format(format!(
                                "layer '{}': bad csv tile value '{}'",
                                self.name, token
                            ))
                        })?;
                        out.push(gid);
                    }
                    out
                }
                "base64" => {
                    let compact: String =
                        text.chars().filter(|c| !c.is_whitespace()).collect();
                    let raw = BASE64.decode(compact.as_bytes()).map_err(|e| {
                        MapError::Format(format!(
                            "layer '{}': bad base64 payload: {}",
                            self.name, e
                        ))
                    })?;
                    let bytes = match compression.as_deref() {
                        None => raw,
                        Some("zlib") => inflate(&self.name, ZlibDecoder::new(raw.as_slice()))?,
                        Some("gzip") => inflate(&self.name, GzDecoder::new(raw.as_slice()))?,
                        Some(other) => {
                            return Err(MapError::UnsupportedCompression {
                                layer: self.name.clone(),
                                compression: other.to_owned(),
                            })
                        }
                    };
                    if bytes.len() % 4 != 0 || bytes.len() / 4 != expected {
                        return Err(MapError::LayerSizeMismatch {
                            layer: self.name.clone(),
                            expected,
                            actual: bytes.len() / 4,
                        });
                    }
                    bytes
                        .chunks_exact(4)
                        .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]))
                        .collect()
                }
                other => {
                    return Err(MapError::UnsupportedEncoding {
                        layer: self.name.clone(),
                        encoding: other.to_owned(),
                    })
                }
            },
            LayerPayload::Missing => {
                return Err(MapError::Format(format!(
                    "layer '{}' has no data node",
                    self.name
                )))
            }
        };

        if decoded.len() != expected {
            return Err(MapError::LayerSizeMismatch {
                layer: self.name.clone(),
                expected,
                actual: decoded.len(),
            });
        }
        self.decoded_content = decoded;
        Ok(())
    }
}

fn inflate<R: Read>(layer: &str, mut decoder: R) -> Result<Vec<u8>, MapError> {
    let mut out = Vec::new();
    decoder.read_to_end(&mut out).map_err(|e| {
        MapError::Format(format!("layer '{}': decompression failed: {}", layer, e))
    })?;
    Ok(out)
}

/// Role a map object plays for collision/game logic. The core only
/// classifies; dispatch happens in the game code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectKind {
    /// Blocks movement (platforms, walls).
    Solid,
    /// Kills on contact (spikes, lava).
    Lethal,
    /// Teleports on contact; destination in the object properties.
    Teleport,
    /// Level goal.
    Goal,
    /// Moving platform that carries entities.
    Carrier,
}

/// A single positioned object inside an object group.
#[derive(Debug, Clone)]
pub struct MapObject {
    /// Object name.
    pub name: String,
    /// Free-form type string from the editor.
    pub object_type: String,
    /// X position relative to the group, pixels.
    pub x: i32,
    /// Y position relative to the group, pixels.
    pub y: i32,
    /// Width in pixels.
    pub width: i32,
    /// Height in pixels.
    pub height: i32,
    /// Object properties, transported opaquely.
    pub properties: Properties,
}

impl MapObject {
    /// Classifies the object by its type string.
    pub fn kind(&self) -> Option<ObjectKind> {
        match self.object_type.to_ascii_lowercase().as_str() {
            "platform" | "solid" | "wall" => Some(ObjectKind::Solid),
            "die" | "spike" | "lava" => Some(ObjectKind::Lethal),
            "teleport" | "portal" => Some(ObjectKind::Teleport),
            "princess" | "goal" | "exit" => Some(ObjectKind::Goal),
            "carrier" | "elevator" => Some(ObjectKind::Carrier),
            _ => None,
        }
    }
}

/// A non-grid layer holding free-form positioned objects.
#[derive(Debug, Clone)]
pub struct ObjectGroup {
    /// Group name.
    pub name: String,
    /// X position in pixels.
    pub x: i32,
    /// Y position in pixels.
    pub y: i32,
    /// Bounding width in pixels (often 0).
    pub width: u32,
    /// Bounding height in pixels (often 0).
    pub height: u32,
    /// Visibility flag.
    pub visible: bool,
    /// Group properties.
    pub properties: Properties,
    /// The objects, in file order.
    pub objects: Vec<MapObject>,
}

/// A record of one object that failed to parse and was skipped.
#[derive(Debug, Clone)]
pub struct ObjectIssue {
    /// Object group the object belongs to.
    pub layer: String,
    /// Object name, possibly empty.
    pub object: String,
    /// What went wrong.
    pub message: String,
}

/// One layer of the map, in file order.
#[derive(Debug, Clone)]
pub enum MapLayer {
    /// A tile grid layer.
    Grid(TileLayer),
    /// An object group.
    Objects(ObjectGroup),
}

impl MapLayer {
    /// True for object groups.
    pub fn is_object_group(&self) -> bool {
        matches!(self, MapLayer::Objects(_))
    }

    /// The grid layer, if this is one.
    pub fn as_grid(&self) -> Option<&TileLayer> {
        match self {
            MapLayer::Grid(l) => Some(l),
            MapLayer::Objects(_) => None,
        }
    }

    /// Mutable access to the grid layer, if this is one.
    pub fn as_grid_mut(&mut self) -> Option<&mut TileLayer> {
        match self {
            MapLayer::Grid(l) => Some(l),
            MapLayer::Objects(_) => None,
        }
    }

    /// The object group, if this is one.
    pub fn as_objects(&self) -> Option<&ObjectGroup> {
        match self {
            MapLayer::Grid(_) => None,
            MapLayer::Objects(g) => Some(g),
        }
    }
}

/// The whole map document, immutable source of truth after decode.
#[derive(Debug, Clone)]
pub struct TileMap {
    /// Map orientation; only "orthogonal" is meaningful here.
    pub orientation: String,
    /// Format version as declared in the file.
    pub version: String,
    /// Base tile width in pixels.
    pub tile_width: u32,
    /// Base tile height in pixels.
    pub tile_height: u32,
    /// Grid width in tiles.
    pub width: u32,
    /// Grid height in tiles.
    pub height: u32,
    /// Tile sets, sorted by first gid.
    pub tile_sets: Vec<TileSet>,
    /// Grid layers and object groups, interleaved in file order.
    pub layers: Vec<MapLayer>,
    /// Map properties.
    pub properties: Properties,
    /// Objects that failed to parse and were skipped.
    pub object_issues: Vec<ObjectIssue>,
    /// Path of the file the map was parsed from.
    pub map_file_name: PathBuf,
}

impl TileMap {
    /// Map width in pixels, always derived from the grid.
    pub fn pixel_width(&self) -> u32 {
        self.width * self.tile_width
    }

    /// Map height in pixels, always derived from the grid.
    pub fn pixel_height(&self) -> u32 {
        self.height * self.tile_height
    }

    /// Decodes every grid layer's payload. Idempotent; layer order does
    /// not matter.
    pub fn decode(&mut self) -> Result<(), MapError> {
        for layer in &mut self.layers {
            if let MapLayer::Grid(l) = layer {
                l.decode()?;
            }
        }
        Ok(())
    }

    /// Finds a grid layer by name.
    pub fn layer_by_name(&self, name: &str) -> Option<&TileLayer> {
        self.layers
            .iter()
            .filter_map(MapLayer::as_grid)
            .find(|l| l.name == name)
    }

    /// Finds a tile set by name.
    pub fn tile_set_by_name(&self, name: &str) -> Option<&TileSet> {
        self.tile_sets.iter().find(|t| t.name == name)
    }

    /// Iterates over the object groups in file order.
    pub fn object_groups(&self) -> impl Iterator<Item = &ObjectGroup> {
        self.layers.iter().filter_map(MapLayer::as_objects)
    }
}
