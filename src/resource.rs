//! Resource loading.
//!
//! Resolves every gid a map uses to a drawable image plus a per-tile
//! draw offset, building one flat index. Sheets are sliced into tile
//! images, per-tile overrides and embedded images are honoured, and
//! flip-flagged gids get their own pre-flipped cache entries so lookups
//! during rendering never do pixel work.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use image::RgbaImage;

use crate::error::MapError;
use crate::raster::{self, ColorKey, ImageHandle};
use crate::tmx::{Gid, MapLayer, TileImage, TileMap, TileSet};

/// One resolved tile: its image and the offset applied when placing it
/// on the grid. `offset_y` is negative for tiles taller than the map's
/// base tile size, so images align at their visual base rather than
/// their top-left corner.
#[derive(Clone)]
pub struct IndexedTile {
    /// Horizontal draw offset in pixels.
    pub offset_x: i32,
    /// Vertical draw offset in pixels (zero or negative).
    pub offset_y: i32,
    /// The tile image.
    pub image: ImageHandle,
}

/// Builds and owns the gid -> [`IndexedTile`] index for one map.
///
/// The raw-image cache used while slicing sheets lives inside the
/// loader and is dropped at the end of [`load`]; sprite construction
/// only ever needs the resolved index.
///
/// [`load`]: ResourceLoader::load
#[derive(Default)]
pub struct ResourceLoader {
    indexed_tiles: HashMap<u32, IndexedTile>,
    img_cache: HashMap<PathBuf, ImageHandle>,
}

impl ResourceLoader {
    /// Creates an empty loader.
    pub fn new() -> Self {
        ResourceLoader::default()
    }

    /// Looks up a resolved tile by raw gid (flip flags included).
    pub fn tile(&self, raw_gid: u32) -> Option<&IndexedTile> {
        self.indexed_tiles.get(&raw_gid)
    }

    /// Number of resolved index entries.
    pub fn len(&self) -> usize {
        self.indexed_tiles.len()
    }

    /// True if nothing has been resolved yet.
    pub fn is_empty(&self) -> bool {
        self.indexed_tiles.is_empty()
    }

    /// Resolves all tile images for the given map. Grid layers must be
    /// decoded first so flip variants can be materialised. Re-invoking
    /// re-slices sheets but never re-flips: existing flip entries are
    /// reused as-is.
    pub fn load(&mut self, map: &TileMap) -> Result<(), MapError> {
        for ts in &map.tile_sets {
            self.load_tile_set(map, ts)?;
        }
        // the raw sheet cache only matters while slicing
        self.img_cache.clear();
        self.materialise_flips(map)?;
        Ok(())
    }

    fn load_tile_set(&mut self, map: &TileMap, ts: &TileSet) -> Result<(), MapError> {
        // tileset-level embedded images, referenced by id from tiles
        let mut embedded: HashMap<u32, ImageHandle> = HashMap::new();

        // sheets first, tiles may reference them
        for img in &ts.images {
            if let Some(path) = &img.source {
                self.load_sheet(map, ts, path, img.trans)?;
            } else {
                embedded.insert(img.id, Rc::new(decode_embedded(img)?));
            }
        }

        for tile in &ts.tiles {
            for img in &tile.images {
                let gid = ts.first_gid + tile.id;
                let image = if let Some(path) = &img.source {
                    self.load_cached(path, img.trans)?
                } else if img.content.is_some() {
                    Rc::new(decode_embedded(img)?)
                } else {
                    // only an id: reference to a tileset-level image
                    Rc::clone(embedded.get(&img.id).ok_or_else(|| {
                        MapError::Format(format!(
                            "tileset '{}': tile {} references unknown image id {}",
                            ts.name, tile.id, img.id
                        ))
                    })?)
                };
                self.indexed_tiles.insert(
                    gid,
                    IndexedTile {
                        offset_x: 0,
                        offset_y: 0,
                        image,
                    },
                );
            }
        }
        Ok(())
    }

    fn load_sheet(
        &mut self,
        map: &TileMap,
        ts: &TileSet,
        path: &Path,
        trans: Option<ColorKey>,
    ) -> Result<(), MapError> {
        let tile_width = if ts.tile_width != 0 {
            ts.tile_width
        } else {
            map.tile_width
        };
        let tile_height = if ts.tile_height != 0 {
            ts.tile_height
        } else {
            map.tile_height
        };
        if tile_width == 0 || tile_height == 0 {
            return Err(MapError::Format(format!(
                "tileset '{}' has zero tile size",
                ts.name
            )));
        }

        // tiles taller than the map's base tile anchor at their bottom
        let offset_y = if tile_height > map.tile_height {
            -((tile_height - map.tile_height) as i32)
        } else {
            0
        };

        let sheet = self.load_cached(path, trans)?;
        let (sheet_w, sheet_h) = sheet.dimensions();
        // truncate to whole tiles; partial trailing rows/columns are
        // dropped, matching how maps are authored against these sheets
        let sheet_w = (sheet_w / tile_width) * tile_width;
        let sheet_h = (sheet_h / tile_height) * tile_height;

        let mut idx = 0u32;
        let mut y = ts.margin;
        while y + tile_height <= sheet_h {
            let mut x = ts.margin;
            while x + tile_width <= sheet_w {
                let part = raster::crop(&sheet, x, y, tile_width, tile_height);
                self.indexed_tiles.insert(
                    ts.first_gid + idx,
                    IndexedTile {
                        offset_x: 0,
                        offset_y,
                        image: Rc::new(part),
                    },
                );
                idx += 1;
                x += tile_width + ts.spacing;
            }
            y += tile_height + ts.spacing;
        }
        log::debug!(
            "tileset '{}': sliced {} tiles from {}",
            ts.name,
            idx,
            path.display()
        );
        Ok(())
    }

    fn load_cached(
        &mut self,
        path: &Path,
        colorkey: Option<ColorKey>,
    ) -> Result<ImageHandle, MapError> {
        if let Some(img) = self.img_cache.get(path) {
            return Ok(Rc::clone(img));
        }
        let img = Rc::new(raster::load_image(path, colorkey)?);
        self.img_cache.insert(path.to_path_buf(), Rc::clone(&img));
        Ok(img)
    }

    /// Gives every flip-flagged gid used by a grid layer its own index
    /// entry, flipping the unflipped base image once. Also validates
    /// that every referenced gid resolves at all.
    fn materialise_flips(&mut self, map: &TileMap) -> Result<(), MapError> {
        for layer in &map.layers {
            let l = match layer {
                MapLayer::Grid(l) => l,
                MapLayer::Objects(_) => continue,
            };
            if !l.is_decoded() {
                return Err(MapError::Format(format!(
                    "layer '{}' must be decoded before resources are resolved",
                    l.name
                )));
            }
            for &raw in &l.decoded_content {
                let gid = Gid(raw);
                if gid.clean() == 0 || self.indexed_tiles.contains_key(&raw) {
                    continue;
                }
                if !gid.has_flips() {
                    return Err(MapError::UnknownGid {
                        layer: l.name.clone(),
                        gid: gid.clean(),
                    });
                }
                let base = self.indexed_tiles.get(&gid.clean()).ok_or_else(|| {
                    MapError::UnknownGid {
                        layer: l.name.clone(),
                        gid: gid.clean(),
                    }
                })?;
                let flipped =
                    raster::flip_image(&base.image, gid.flip_x(), gid.flip_y());
                let entry = IndexedTile {
                    offset_x: base.offset_x,
                    offset_y: base.offset_y,
                    image: Rc::new(flipped),
                };
                self.indexed_tiles.insert(raw, entry);
            }
        }
        Ok(())
    }
}

fn decode_embedded(img: &TileImage) -> Result<RgbaImage, MapError> {
    let content = img.content.as_deref().ok_or_else(|| {
        MapError::Format(format!("embedded image {} has no content", img.id))
    })?;
    match img.encoding.as_deref() {
        Some("base64") => {
            let compact: String = content.chars().filter(|c| !c.is_whitespace()).collect();
            let bytes = BASE64.decode(compact.as_bytes()).map_err(|e| {
                MapError::Format(format!("embedded image {}: bad base64: {}", img.id, e))
            })?;
            raster::load_image_bytes(&bytes, img.trans)
        }
        other => Err(MapError::Format(format!(
            "embedded image {} has unknown encoding '{}'",
            img.id,
            other.unwrap_or("")
        ))),
    }
}
