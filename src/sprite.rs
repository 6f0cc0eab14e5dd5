//! Sprite layers.
//!
//! A [`SpriteLayer`] is the drawable form of one grid layer: a 2D array
//! of optional composed sprites built once from the decoded grid and
//! the resolved tile index, plus an unordered collection of dynamic
//! sprites the game adds and removes at runtime.
//!
//! Static cells are immutable after construction; the transforms
//! ([`scale`], [`merge`], [`collapse`]) always build new layers.
//! Composition runs through a cache keyed by the ordered tuple of
//! fragment identities, so a wall arrangement repeated a thousand times
//! costs one composed surface, not a thousand.
//!
//! [`scale`]: SpriteLayer::scale
//! [`merge`]: SpriteLayer::merge
//! [`collapse`]: SpriteLayer::collapse

use std::collections::HashMap;
use std::error;
use std::fmt;
use std::rc::Rc;

use crate::geom::Rect;
use crate::raster::{self, ImageHandle};
use crate::resource::ResourceLoader;
use crate::tmx::{MapLayer, TileLayer, TileMap};

/// Identity of a composed cell, used as the composition cache key.
/// Out-of-grid coordinates and empty cells contribute the `Empty`
/// sentinel; collapsed cells nest the keys of the sprites they union.
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
enum CellKey {
    Empty,
    Tile(u32),
    Union(Vec<CellKey>),
}

/// Composition cache, scoped to one construction or transform call.
struct SpriteCache {
    images: HashMap<Vec<CellKey>, ImageHandle>,
    hits: usize,
}

impl SpriteCache {
    fn new() -> Self {
        SpriteCache {
            images: HashMap::new(),
            hits: 0,
        }
    }
}

/// A drawable unit: an image, where to draw it in world coordinates,
/// and how.
#[derive(Clone, Debug)]
pub struct Sprite {
    /// The image to draw.
    pub image: ImageHandle,
    /// Destination rectangle in world coordinates.
    pub rect: Rect,
    /// Optional source sub-rectangle into `image`.
    pub source_rect: Option<Rect>,
    /// Blit flags, see [`crate::raster`].
    pub flags: u32,
    /// Floor-flat sprites (shadows, decals) order by depth instead of
    /// by their bottom edge.
    pub is_flat: bool,
    /// Depth offset applied to flat sprites' draw order.
    pub z: i32,
    key: Option<CellKey>,
}

impl Sprite {
    /// Creates a plain upright sprite.
    pub fn new(image: ImageHandle, rect: Rect) -> Self {
        Sprite {
            image,
            rect,
            source_rect: None,
            flags: 0,
            is_flat: false,
            z: 0,
            key: None,
        }
    }

    /// The draw-order key: the bottom edge in world y for upright
    /// sprites, the top edge plus the z offset for flat ones. Tall
    /// standing sprites occlude correctly against a floor while flat
    /// sprites order purely by depth.
    pub fn draw_order(&self) -> i32 {
        if self.is_flat {
            self.rect.top() + self.z
        } else {
            self.rect.bottom()
        }
    }
}

impl PartialEq for Sprite {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.image, &other.image)
            && self.rect == other.rect
            && self.source_rect == other.source_rect
            && self.flags == other.flags
            && self.is_flat == other.is_flat
            && self.z == other.z
    }
}

/// Raised by [`SpriteLayer::merge`] when the input layers do not line
/// up. Recoverable: the caller may simply keep the layers separate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LayerIncompatibleError {
    /// Two layers differ in the named dimension.
    Mismatch {
        /// Which dimension failed first.
        dimension: &'static str,
    },
    /// The input contained no grid layers at all.
    NoGridLayers,
}

impl fmt::Display for LayerIncompatibleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LayerIncompatibleError::Mismatch { dimension } => {
                write!(f, "layers do not have the same {}", dimension)
            }
            LayerIncompatibleError::NoGridLayers => {
                write!(f, "no grid layers to merge")
            }
        }
    }
}

impl error::Error for LayerIncompatibleError {}

/// The drawable form of one map layer.
#[derive(Clone, Debug)]
pub struct SpriteLayer {
    /// Index of the source layer in the map's layer list.
    pub layer_index: usize,
    /// Tile width in pixels; fractional after scaling.
    pub tile_width: f32,
    /// Tile height in pixels; fractional after scaling.
    pub tile_height: f32,
    /// Grid width in tiles.
    pub num_tiles_x: u32,
    /// Grid height in tiles.
    pub num_tiles_y: u32,
    /// World offset in pixels, x.
    pub position_x: f32,
    /// World offset in pixels, y.
    pub position_y: f32,
    /// Visibility flag, copied from the source layer.
    pub visible: bool,
    /// True for object-group markers, which render as nothing but keep
    /// the layer ordering intact.
    pub is_object_group: bool,
    /// Layer opacity in [0, 1], multiplied into every blit.
    pub opacity: f32,
    collapse_level: u32,
    parallax_x: f32,
    parallax_y: f32,
    cells: Vec<Option<Sprite>>,
    sprites: Vec<Sprite>,
    bottom_margin: i32,
    static_margin: i32,
}

impl SpriteLayer {
    /// Builds the sprite layer for `map.layers[layer_index]` from the
    /// decoded grid and the resolved tile index. Object groups produce
    /// an empty marker layer so file ordering is preserved.
    pub fn build(layer_index: usize, map: &TileMap, resources: &ResourceLoader) -> SpriteLayer {
        let grid = match &map.layers[layer_index] {
            MapLayer::Objects(group) => {
                return SpriteLayer {
                    layer_index,
                    tile_width: map.tile_width as f32,
                    tile_height: map.tile_height as f32,
                    num_tiles_x: 0,
                    num_tiles_y: 0,
                    position_x: group.x as f32,
                    position_y: group.y as f32,
                    visible: group.visible,
                    is_object_group: true,
                    opacity: 1.0,
                    collapse_level: 1,
                    parallax_x: 1.0,
                    parallax_y: 1.0,
                    cells: Vec::new(),
                    sprites: Vec::new(),
                    bottom_margin: 0,
                    static_margin: 0,
                }
            }
            MapLayer::Grid(grid) => grid,
        };

        let mut cells: Vec<Option<Sprite>> =
            vec![None; grid.width as usize * grid.height as usize];
        let mut cache = SpriteCache::new();
        let mut static_margin = 0i32;

        for y in 0..grid.height {
            for x in 0..grid.width {
                let (key, frags) = tile_fragments(grid, resources, x, y, 1);
                if frags.is_empty() {
                    continue;
                }
                let sprite = union_sprites(frags, key, &mut cache);
                static_margin = static_margin.max(sprite.rect.h);
                cells[(x + y * grid.width) as usize] = Some(sprite);
            }
        }
        log::debug!("layer '{}': sprite cache hits: {}", grid.name, cache.hits);

        SpriteLayer {
            layer_index,
            tile_width: grid.tile_width as f32,
            tile_height: grid.tile_height as f32,
            num_tiles_x: grid.width,
            num_tiles_y: grid.height,
            position_x: (grid.x * grid.tile_width as i32) as f32,
            position_y: (grid.y * grid.tile_height as i32) as f32,
            visible: grid.visible,
            is_object_group: false,
            opacity: grid.opacity,
            collapse_level: 1,
            parallax_x: 1.0,
            parallax_y: 1.0,
            cells,
            sprites: Vec::new(),
            bottom_margin: static_margin,
            static_margin,
        }
    }

    /// The static sprite at grid cell `(x, y)`, if any.
    pub fn cell(&self, x: u32, y: u32) -> Option<&Sprite> {
        if x >= self.num_tiles_x || y >= self.num_tiles_y {
            return None;
        }
        self.cells[(x + y * self.num_tiles_x) as usize].as_ref()
    }

    /// Number of populated static cells.
    pub fn populated_cells(&self) -> usize {
        self.cells.iter().filter(|c| c.is_some()).count()
    }

    /// How many source tiles one cell aggregates per axis.
    pub fn collapse_level(&self) -> u32 {
        self.collapse_level
    }

    /// The drawing margin: height of the tallest drawable seen, used by
    /// the renderer to widen its look-ahead window.
    pub fn bottom_margin(&self) -> i32 {
        self.bottom_margin
    }

    /// Per-axis scroll-speed multipliers relative to camera movement.
    pub fn parallax_factor(&self) -> (f32, f32) {
        (self.parallax_x, self.parallax_y)
    }

    /// Sets the parallax factors. 1.0 scrolls with the camera, 0.0
    /// pins the layer to the screen, values in between scroll slower,
    /// negative values scroll the opposite way.
    pub fn set_parallax_factor(&mut self, factor_x: f32, factor_y: f32) {
        self.parallax_x = factor_x;
        self.parallax_y = factor_y;
    }

    /// The dynamic sprites in insertion order.
    pub fn sprites(&self) -> &[Sprite] {
        &self.sprites
    }

    /// Mutable access for moving dynamic sprites between frames. Adding
    /// and removing go through [`add_sprite`]/[`remove_sprite`] so the
    /// drawing margin stays correct.
    ///
    /// [`add_sprite`]: SpriteLayer::add_sprite
    /// [`remove_sprite`]: SpriteLayer::remove_sprite
    pub fn sprites_mut(&mut self) -> &mut [Sprite] {
        &mut self.sprites
    }

    /// Adds a dynamic sprite on top of the static grid.
    pub fn add_sprite(&mut self, sprite: Sprite) {
        self.bottom_margin = self.bottom_margin.max(sprite.rect.h);
        self.sprites.push(sprite);
    }

    /// Adds several dynamic sprites.
    pub fn add_sprites(&mut self, sprites: impl IntoIterator<Item = Sprite>) {
        for sprite in sprites {
            self.add_sprite(sprite);
        }
    }

    /// Removes the first dynamic sprite equal to `sprite`. Returns
    /// whether one was removed; the margin is recomputed either way.
    pub fn remove_sprite(&mut self, sprite: &Sprite) -> bool {
        let removed = match self.sprites.iter().position(|s| s == sprite) {
            Some(idx) => {
                self.sprites.remove(idx);
                true
            }
            None => false,
        };
        self.bottom_margin = self
            .sprites
            .iter()
            .map(|s| s.rect.h)
            .fold(self.static_margin, i32::max);
        removed
    }

    /// Removes several dynamic sprites.
    pub fn remove_sprites<'a>(&mut self, sprites: impl IntoIterator<Item = &'a Sprite>) {
        for sprite in sprites {
            self.remove_sprite(sprite);
        }
    }

    /// True if an equal dynamic sprite is present.
    pub fn contains_sprite(&self, sprite: &Sprite) -> bool {
        self.sprites.iter().any(|s| s == sprite)
    }

    /// True if the layer has any dynamic sprites.
    pub fn has_sprites(&self) -> bool {
        !self.sprites.is_empty()
    }

    /// Returns a new layer with every cell image and destination rect
    /// scaled by `(scale_x, scale_y)`. Integral target sizes scale
    /// exactly; fractional ones round up and resample with a smoothing
    /// filter to avoid seams. Object-group layers come back unchanged.
    pub fn scale(&self, scale_x: f32, scale_y: f32) -> SpriteLayer {
        if self.is_object_group {
            return self.clone();
        }
        let mut layer = self.clone();
        layer.tile_width = self.tile_width * scale_x;
        layer.tile_height = self.tile_height * scale_y;
        layer.cells = self
            .cells
            .iter()
            .map(|c| c.as_ref().map(|s| scale_sprite(s, scale_x, scale_y)))
            .collect();
        let (static_margin, bottom_margin) = margins_of(&layer.cells, &layer.sprites);
        layer.static_margin = static_margin;
        layer.bottom_margin = bottom_margin;
        layer
    }

    /// Composites several layers into one. Every grid layer must share
    /// tile size, grid dimensions and world position; object-group
    /// layers are skipped. Later layers paint over earlier ones. The
    /// inputs are never touched.
    pub fn merge(layers: &[&SpriteLayer]) -> Result<SpriteLayer, LayerIncompatibleError> {
        let grids: Vec<&SpriteLayer> = layers
            .iter()
            .copied()
            .filter(|l| !l.is_object_group)
            .collect();
        let first = *grids.first().ok_or(LayerIncompatibleError::NoGridLayers)?;
        for l in &grids[1..] {
            let mismatch = if l.tile_width != first.tile_width {
                Some("tile_width")
            } else if l.tile_height != first.tile_height {
                Some("tile_height")
            } else if l.num_tiles_x != first.num_tiles_x {
                Some("num_tiles_x")
            } else if l.num_tiles_y != first.num_tiles_y {
                Some("num_tiles_y")
            } else if l.position_x != first.position_x {
                Some("position_x")
            } else if l.position_y != first.position_y {
                Some("position_y")
            } else {
                None
            };
            if let Some(dimension) = mismatch {
                return Err(LayerIncompatibleError::Mismatch { dimension });
            }
        }

        let mut cache = SpriteCache::new();
        let mut cells: Vec<Option<Sprite>> =
            vec![None; first.num_tiles_x as usize * first.num_tiles_y as usize];
        for idx in 0..cells.len() {
            let mut key = KeyBuilder::new();
            let mut frags: Vec<Sprite> = Vec::new();
            for l in &grids {
                match &l.cells[idx] {
                    Some(sprite) => {
                        key.push(sprite.key.clone());
                        frags.push(sprite.clone());
                    }
                    None => key.push_empty(),
                }
            }
            if frags.is_empty() {
                continue;
            }
            cells[idx] = Some(union_sprites(frags, key.finish(), &mut cache));
        }
        log::debug!("merge: sprite cache hits: {}", cache.hits);

        let (static_margin, bottom_margin) = margins_of(&cells, &[]);
        Ok(SpriteLayer {
            layer_index: first.layer_index,
            tile_width: first.tile_width,
            tile_height: first.tile_height,
            num_tiles_x: first.num_tiles_x,
            num_tiles_y: first.num_tiles_y,
            position_x: first.position_x,
            position_y: first.position_y,
            visible: first.visible,
            is_object_group: false,
            opacity: first.opacity,
            collapse_level: first.collapse_level,
            parallax_x: first.parallax_x,
            parallax_y: first.parallax_y,
            cells,
            sprites: Vec::new(),
            bottom_margin,
            static_margin,
        })
    }

    /// Aggregates each `level`×`level` block of cells into one larger
    /// cell, trading bandwidth for fewer blits. Grid dimensions shrink
    /// by `level`, rounding up for a partial trailing block. Only for
    /// layers without dynamic sprites; they are not carried over.
    /// Object-group layers (and levels below 2) come back unchanged.
    pub fn collapse(&self, level: u32) -> SpriteLayer {
        if self.is_object_group || level < 2 {
            return self.clone();
        }
        if self.has_sprites() {
            log::warn!("collapsing a layer with dynamic sprites; they are dropped");
        }

        let num_x = self.num_tiles_x.div_ceil(level);
        let num_y = self.num_tiles_y.div_ceil(level);
        let mut cache = SpriteCache::new();
        let mut cells: Vec<Option<Sprite>> = vec![None; num_x as usize * num_y as usize];

        for cy in 0..num_y {
            for cx in 0..num_x {
                let mut key = KeyBuilder::new();
                let mut frags: Vec<Sprite> = Vec::new();
                for y in cy * level..(cy + 1) * level {
                    for x in cx * level..(cx + 1) * level {
                        // out-of-grid coordinates are empty, not an error
                        match self.cell(x, y) {
                            Some(sprite) => {
                                key.push(sprite.key.clone());
                                frags.push(sprite.clone());
                            }
                            None => key.push_empty(),
                        }
                    }
                }
                if frags.is_empty() {
                    continue;
                }
                cells[(cx + cy * num_x) as usize] =
                    Some(union_sprites(frags, key.finish(), &mut cache));
            }
        }
        log::debug!("collapse: sprite cache hits: {}", cache.hits);

        let (static_margin, bottom_margin) = margins_of(&cells, &[]);
        SpriteLayer {
            layer_index: self.layer_index,
            tile_width: self.tile_width * level as f32,
            tile_height: self.tile_height * level as f32,
            num_tiles_x: num_x,
            num_tiles_y: num_y,
            position_x: self.position_x,
            position_y: self.position_y,
            visible: self.visible,
            is_object_group: false,
            opacity: self.opacity,
            collapse_level: self.collapse_level * level,
            parallax_x: self.parallax_x,
            parallax_y: self.parallax_y,
            cells,
            sprites: Vec::new(),
            bottom_margin,
            static_margin,
        }
    }
}

/// Accumulates a cell's cache key. A fragment without an identity (e.g.
/// from a scaled layer) poisons the key, disabling caching for that
/// cell rather than risking a collision.
struct KeyBuilder(Option<Vec<CellKey>>);

impl KeyBuilder {
    fn new() -> Self {
        KeyBuilder(Some(Vec::new()))
    }

    fn push(&mut self, key: Option<CellKey>) {
        match (&mut self.0, key) {
            (Some(v), Some(k)) => v.push(k),
            (slot, None) => *slot = None,
            (None, _) => {}
        }
    }

    fn push_empty(&mut self) {
        if let Some(v) = &mut self.0 {
            v.push(CellKey::Empty);
        }
    }

    fn finish(self) -> Option<Vec<CellKey>> {
        self.0
    }
}

/// Collects the 1..k² tile fragments for the block anchored at grid
/// cell `(x, y)` with edge `level`, straight from the decoded grid.
fn tile_fragments(
    layer: &TileLayer,
    resources: &ResourceLoader,
    x: u32,
    y: u32,
    level: u32,
) -> (Option<Vec<CellKey>>, Vec<Sprite>) {
    let mut key = KeyBuilder::new();
    let mut frags = Vec::new();
    for ty in y * level..(y + 1) * level {
        for tx in x * level..(x + 1) * level {
            match layer.gid_at(tx, ty) {
                Some(raw) if raw != 0 => {
                    if let Some(tile) = resources.tile(raw) {
                        let wx = tx as i32 * layer.tile_width as i32 + tile.offset_x;
                        let wy = ty as i32 * layer.tile_height as i32 + tile.offset_y;
                        let (w, h) = tile.image.dimensions();
                        let mut sprite = Sprite::new(
                            Rc::clone(&tile.image),
                            Rect::new(wx, wy, w as i32, h as i32),
                        );
                        sprite.key = Some(CellKey::Tile(raw));
                        key.push(sprite.key.clone());
                        frags.push(sprite);
                    } else {
                        key.push_empty();
                    }
                }
                _ => key.push_empty(),
            }
        }
    }
    (key.finish(), frags)
}

/// Unions fragments into one drawable unit: the bounding rect of all
/// destination rects, with every fragment blitted at its offset. A
/// single fragment is reused as-is; composed images are cached by the
/// full fragment key.
fn union_sprites(
    mut frags: Vec<Sprite>,
    key: Option<Vec<CellKey>>,
    cache: &mut SpriteCache,
) -> Sprite {
    let union_key = key.clone().map(CellKey::Union);

    if frags.len() == 1 {
        let mut sprite = frags.remove(0);
        sprite.key = union_key;
        return sprite;
    }

    let mut rect = frags[0].rect;
    for s in &frags[1..] {
        rect = rect.union(&s.rect);
    }

    let cached = key.as_ref().and_then(|k| cache.images.get(k)).cloned();
    let image = match cached {
        Some(img) => {
            cache.hits += 1;
            img
        }
        None => {
            let mut surface = raster::new_surface(rect.w as u32, rect.h as u32);
            for s in &frags {
                raster::blit(
                    &mut surface,
                    &s.image,
                    s.rect.x - rect.x,
                    s.rect.y - rect.y,
                    s.source_rect,
                    s.flags,
                    255,
                );
            }
            let img = Rc::new(surface);
            if let Some(k) = key {
                cache.images.insert(k, Rc::clone(&img));
            }
            img
        }
    };

    Sprite {
        image,
        rect,
        source_rect: None,
        flags: 0,
        is_flat: false,
        z: 0,
        key: union_key,
    }
}

fn scale_sprite(sprite: &Sprite, scale_x: f32, scale_y: f32) -> Sprite {
    let (w, h) = sprite.image.dimensions();
    let new_w = w as f32 * scale_x;
    let new_h = h as f32 * scale_y;
    let exact = new_w.fract() == 0.0 && new_h.fract() == 0.0;
    let (tw, th) = if exact {
        (new_w as u32, new_h as u32)
    } else {
        (new_w.ceil() as u32, new_h.ceil() as u32)
    };
    let image = if tw == w && th == h {
        Rc::clone(&sprite.image)
    } else {
        Rc::new(raster::scale_image(&sprite.image, tw, th, !exact))
    };
    let rect = Rect::new(
        (sprite.rect.x as f32 * scale_x) as i32,
        (sprite.rect.y as f32 * scale_y) as i32,
        tw as i32,
        th as i32,
    );
    Sprite::new(image, rect)
}

fn margins_of(cells: &[Option<Sprite>], sprites: &[Sprite]) -> (i32, i32) {
    let static_margin = cells
        .iter()
        .flatten()
        .map(|s| s.rect.h)
        .fold(0, i32::max);
    let bottom_margin = sprites
        .iter()
        .map(|s| s.rect.h)
        .fold(static_margin, i32::max);
    (static_margin, bottom_margin)
}
