#![warn(missing_docs)]

//! Tiled TMX map loader and CPU sprite-layer renderer.
//!
//! Parses maps produced by the Tiled editor (<http://mapeditor.org/>),
//! resolves their tile images, composes per-layer sprite grids and
//! renders them against a scrollable, parallaxed camera, all on the
//! CPU with [`image::RgbaImage`] as the surface type.
//!
//! ```no_run
//! # fn main() -> anyhow::Result<()> {
//! let level = tileblit::load_level("assets/level1.tmx")?;
//!
//! let mut renderer = tileblit::Renderer::new();
//! renderer.set_camera_position_and_size(400, 300, 800, 600);
//!
//! let mut frame = tileblit::new_surface(800, 600);
//! for layer in &level.layers {
//!     renderer.render_layer(&mut frame, layer);
//! }
//! # Ok(()) }
//! ```

mod error;
mod geom;
mod loader {
    pub mod xml_loader;
}
mod raster;
mod render;
mod resource;
mod sprite;
mod tmx;

pub use error::MapError;
pub use geom::Rect;
pub use loader::xml_loader::{parse_map_file, parse_map_str};
pub use raster::{
    blit, flip_image, load_image, load_image_bytes, new_surface, scale_image, ColorKey,
    ImageHandle, BLIT_ADD, BLIT_ALPHA,
};
pub use render::Renderer;
pub use resource::{IndexedTile, ResourceLoader};
pub use sprite::{LayerIncompatibleError, Sprite, SpriteLayer};
pub use tmx::{
    Gid, LayerPayload, MapLayer, MapObject, ObjectGroup, ObjectIssue, ObjectKind, Properties,
    Tile, TileImage, TileLayer, TileMap, TileSet, FLIP_X, FLIP_Y, GID_MASK,
};

use std::collections::HashMap;
use std::path::Path;

use anyhow::Context;

/// A fully loaded level: the decoded map document, one sprite layer per
/// map layer (object groups become invisible markers so draw order is
/// preserved), and the object groups by name for the game logic.
pub struct Level {
    /// The decoded map document, read-only source of truth.
    pub map: TileMap,
    /// One sprite layer per map layer, in file (draw) order.
    pub layers: Vec<SpriteLayer>,
    /// Object groups by name, for spawn points, triggers and the like.
    pub object_groups: HashMap<String, ObjectGroup>,
}

impl Level {
    /// The sprite layer built from the grid layer with this name.
    pub fn sprite_layer(&self, name: &str) -> Option<&SpriteLayer> {
        let idx = self.grid_layer_index(name)?;
        self.layers.get(idx)
    }

    /// Mutable variant of [`sprite_layer`], for adding dynamic sprites.
    ///
    /// [`sprite_layer`]: Level::sprite_layer
    pub fn sprite_layer_mut(&mut self, name: &str) -> Option<&mut SpriteLayer> {
        let idx = self.grid_layer_index(name)?;
        self.layers.get_mut(idx)
    }

    fn grid_layer_index(&self, name: &str) -> Option<usize> {
        self.map
            .layers
            .iter()
            .position(|l| matches!(l, MapLayer::Grid(g) if g.name == name))
    }
}

/// Parses, decodes and composes a level in one blocking call.
pub fn load_level(path: impl AsRef<Path>) -> anyhow::Result<Level> {
    let path = path.as_ref();
    let mut map = parse_map_file(path)
        .with_context(|| format!("parsing map file {}", path.display()))?;
    map.decode()
        .with_context(|| format!("decoding layer data of {}", path.display()))?;

    let mut resources = ResourceLoader::new();
    resources
        .load(&map)
        .with_context(|| format!("loading resources of {}", path.display()))?;

    let layers = (0..map.layers.len())
        .map(|idx| SpriteLayer::build(idx, &map, &resources))
        .collect();
    let object_groups = map
        .object_groups()
        .map(|g| (g.name.clone(), g.clone()))
        .collect();

    Ok(Level {
        map,
        layers,
        object_groups,
    })
}
