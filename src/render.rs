//! Per-frame rendering against a scrollable, parallaxed camera.
//!
//! The renderer keeps a camera rectangle in world coordinates plus a
//! four-side margin; the margin-expanded "render rect" is what actually
//! determines visibility, so sprites taller than a tile are drawn
//! before their top edge scrolls into view. Dynamic sprites interleave
//! with static tile rows by draw-order key, which makes standing
//! sprites occlude correctly against the floor without re-sorting the
//! whole scene per frame.

use image::RgbaImage;

use crate::geom::Rect;
use crate::raster;
use crate::sprite::{Sprite, SpriteLayer};

/// Renders sprite layers onto a surface, tracking camera state.
pub struct Renderer {
    cam_rect: Rect,
    /// left, right, top, bottom margin in pixels.
    margin: (i32, i32, i32, i32),
    render_rect: Rect,
}

impl Renderer {
    /// Creates a renderer with a tiny placeholder camera; set the real
    /// one with [`set_camera_position_and_size`] or [`set_camera_rect`].
    ///
    /// [`set_camera_position_and_size`]: Renderer::set_camera_position_and_size
    /// [`set_camera_rect`]: Renderer::set_camera_rect
    pub fn new() -> Self {
        Renderer {
            cam_rect: Rect::new(0, 0, 10, 10),
            margin: (0, 0, 0, 0),
            render_rect: Rect::new(0, 0, 10, 10),
        }
    }

    /// The unexpanded camera rectangle in world coordinates.
    pub fn camera_rect(&self) -> Rect {
        self.cam_rect
    }

    /// The margin-expanded rectangle visibility is computed against.
    pub fn render_rect(&self) -> Rect {
        self.render_rect
    }

    /// Centers the camera on a world position.
    pub fn set_camera_position(&mut self, world_x: i32, world_y: i32) {
        self.cam_rect.x = world_x - self.cam_rect.w / 2;
        self.cam_rect.y = world_y - self.cam_rect.h / 2;
        self.apply_margin();
    }

    /// Centers the camera on a world position and resizes it.
    pub fn set_camera_position_and_size(
        &mut self,
        world_x: i32,
        world_y: i32,
        width: i32,
        height: i32,
    ) {
        self.cam_rect.w = width;
        self.cam_rect.h = height;
        self.set_camera_position(world_x, world_y);
    }

    /// Sets the camera rectangle directly (top-left anchored).
    pub fn set_camera_rect(&mut self, rect: Rect) {
        self.cam_rect = rect;
        self.apply_margin();
    }

    /// Sets the margin around the camera in pixels. The render rect is
    /// always recomputed from the unexpanded camera rect, so margins
    /// never accumulate across frames.
    pub fn set_camera_margin(&mut self, left: i32, right: i32, top: i32, bottom: i32) {
        self.margin = (left, right, top, bottom);
        self.apply_margin();
    }

    fn apply_margin(&mut self) {
        let (left, right, top, bottom) = self.margin;
        self.render_rect = Rect::new(
            self.cam_rect.x - left,
            self.cam_rect.y - top,
            self.cam_rect.w + left + right,
            self.cam_rect.h + top + bottom,
        );
    }

    /// The half-open tile range `(left, right, top, bottom)` of the
    /// layer visible through the render rect, clamped to the grid.
    pub fn visible_tile_range(&self, layer: &SpriteLayer) -> (u32, u32, u32, u32) {
        if layer.tile_width <= 0.0 || layer.tile_height <= 0.0 {
            return (0, 0, 0, 0);
        }
        let cam = self.render_rect;
        let (px, py) = layer.parallax_factor();
        let cam_x = cam.x as f32 * px + layer.position_x;
        let cam_y = cam.y as f32 * py + layer.position_y;

        let left = (cam_x / layer.tile_width).floor() as i64;
        let right = ((cam_x + cam.w as f32) / layer.tile_width).floor() as i64 + 1;
        let top = (cam_y / layer.tile_height).floor() as i64;
        let bottom = ((cam_y + cam.h as f32) / layer.tile_height).floor() as i64 + 1;

        let clamp = |v: i64, hi: u32| v.clamp(0, hi as i64) as u32;
        (
            clamp(left, layer.num_tiles_x),
            clamp(right, layer.num_tiles_x),
            clamp(top, layer.num_tiles_y),
            clamp(bottom, layer.num_tiles_y),
        )
    }

    /// Renders a layer onto the surface with sprite clipping and the
    /// default draw order.
    pub fn render_layer(&mut self, surface: &mut RgbaImage, layer: &SpriteLayer) {
        self.render_layer_sorted(surface, layer, true, Sprite::draw_order)
    }

    /// Renders a layer. `clip_sprites` restricts dynamic sprites to the
    /// ones intersecting the render rect; `sort_key` overrides the
    /// draw-order sort. Invisible layers and object-group markers
    /// render nothing.
    pub fn render_layer_sorted<F>(
        &mut self,
        surface: &mut RgbaImage,
        layer: &SpriteLayer,
        clip_sprites: bool,
        sort_key: F,
    ) where
        F: Fn(&Sprite) -> i32,
    {
        if !layer.visible || layer.is_object_group {
            return;
        }

        // a layer with tall sprites needs a larger look-ahead window
        if layer.bottom_margin() > self.margin.3 {
            let (left, right, top, _) = self.margin;
            self.set_camera_margin(left, right, top, layer.bottom_margin());
        }

        let cam = self.render_rect;
        let (px, py) = layer.parallax_factor();
        let cam_x = cam.x as f32 * px + layer.position_x;
        let cam_y = cam.y as f32 * py + layer.position_y;
        let ox = cam_x.floor() as i32;
        let oy = cam_y.floor() as i32;
        let opacity = (layer.opacity.clamp(0.0, 1.0) * 255.0) as u8;

        let (left, right, top, bottom) = self.visible_tile_range(layer);

        let mut sorted: Vec<&Sprite> = layer
            .sprites()
            .iter()
            .filter(|s| !clip_sprites || cam.intersects(&s.rect))
            .collect();
        sorted.sort_by_key(|&s| sort_key(s));

        // one cursor over the sorted sprites, advanced row by row: an
        // interleaved merge rather than a sort per row
        let mut spr_idx = 0usize;
        for ty in top..bottom {
            let row_limit = ((ty + 1) as f32 * layer.tile_height).floor() as i32;
            while spr_idx < sorted.len() && sorted[spr_idx].draw_order() <= row_limit {
                let s = sorted[spr_idx];
                raster::blit(
                    surface,
                    &s.image,
                    s.rect.x - ox,
                    s.rect.y - oy - s.z,
                    s.source_rect,
                    s.flags,
                    opacity,
                );
                spr_idx += 1;
            }
            for tx in left..right {
                if let Some(s) = layer.cell(tx, ty) {
                    raster::blit(
                        surface,
                        &s.image,
                        s.rect.x - ox,
                        s.rect.y - oy,
                        s.source_rect,
                        s.flags,
                        opacity,
                    );
                }
            }
        }
    }

    /// Maps a screen position to world coordinates for a layer, taking
    /// the render rect and the layer's parallax factor into account.
    pub fn get_world_pos(&self, layer: &SpriteLayer, screen_x: i32, screen_y: i32) -> (f32, f32) {
        let (px, py) = layer.parallax_factor();
        (
            screen_x as f32 + self.render_rect.x as f32 * px,
            screen_y as f32 + self.render_rect.y as f32 * py,
        )
    }

    /// The static sprite under a screen position, or `None` out of
    /// range. Object-group markers never yield anything.
    pub fn pick_layer<'a>(
        &self,
        layer: &'a SpriteLayer,
        screen_x: i32,
        screen_y: i32,
    ) -> Option<&'a Sprite> {
        if layer.is_object_group || layer.tile_width <= 0.0 || layer.tile_height <= 0.0 {
            return None;
        }
        let (wx, wy) = self.get_world_pos(layer, screen_x, screen_y);
        let tile_x = (wx / layer.tile_width).floor();
        let tile_y = (wy / layer.tile_height).floor();
        if tile_x < 0.0
            || tile_y < 0.0
            || tile_x >= layer.num_tiles_x as f32
            || tile_y >= layer.num_tiles_y as f32
        {
            return None;
        }
        layer.cell(tile_x as u32, tile_y as u32)
    }

    /// All dynamic sprites whose rect contains the world point under a
    /// screen position, in the layer's insertion order.
    pub fn pick_layer_sprites<'a>(
        &self,
        layer: &'a SpriteLayer,
        screen_x: i32,
        screen_y: i32,
    ) -> Vec<&'a Sprite> {
        if layer.is_object_group {
            return Vec::new();
        }
        let (wx, wy) = self.get_world_pos(layer, screen_x, screen_y);
        let point = Rect::new(wx.floor() as i32, wy.floor() as i32, 1, 1);
        layer
            .sprites()
            .iter()
            .filter(|s| s.rect.intersects(&point))
            .collect()
    }
}

impl Default for Renderer {
    fn default() -> Self {
        Renderer::new()
    }
}
