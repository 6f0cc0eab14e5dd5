//! CPU blit primitives over [`image::RgbaImage`].
//!
//! Everything the loader and renderer need from a graphics backend lives
//! here: loading (with optional colorkey), sheet cropping, flipping,
//! resampling and an alpha-aware `blit`. Keeping the pixel work behind
//! this seam keeps the rest of the crate renderer-agnostic.

use std::path::Path;
use std::rc::Rc;

use image::{imageops, imageops::FilterType, Rgba, RgbaImage};

use crate::error::MapError;
use crate::geom::Rect;

/// Shared, immutable image. The crate is single-threaded, so plain `Rc`.
pub type ImageHandle = Rc<RgbaImage>;

/// A colorkey as three byte channels; matching pixels become transparent.
pub type ColorKey = [u8; 3];

/// Default blit: alpha-composite the source over the destination.
pub const BLIT_ALPHA: u32 = 0;
/// Additive blit: source channels are added to the destination.
pub const BLIT_ADD: u32 = 1;

/// Loads an image from disk as RGBA, applying the colorkey if given.
pub fn load_image(path: &Path, colorkey: Option<ColorKey>) -> Result<RgbaImage, MapError> {
    let img = image::open(path)
        .map_err(|source| MapError::Image {
            path: path.to_path_buf(),
            source,
        })?
        .to_rgba8();
    Ok(keyed(img, colorkey))
}

/// Loads an image from raw encoded bytes (e.g. inline base64 content).
pub fn load_image_bytes(bytes: &[u8], colorkey: Option<ColorKey>) -> Result<RgbaImage, MapError> {
    let img = image::load_from_memory(bytes)
        .map_err(|source| MapError::Image {
            path: Path::new("<embedded>").to_path_buf(),
            source,
        })?
        .to_rgba8();
    Ok(keyed(img, colorkey))
}

fn keyed(mut img: RgbaImage, colorkey: Option<ColorKey>) -> RgbaImage {
    if let Some([r, g, b]) = colorkey {
        for px in img.pixels_mut() {
            if px.0[0] == r && px.0[1] == g && px.0[2] == b {
                *px = Rgba([0, 0, 0, 0]);
            }
        }
    }
    img
}

/// Allocates a fully transparent surface.
pub fn new_surface(w: u32, h: u32) -> RgbaImage {
    RgbaImage::new(w, h)
}

/// Cuts a sub-image out of a sheet.
pub fn crop(sheet: &RgbaImage, x: u32, y: u32, w: u32, h: u32) -> RgbaImage {
    imageops::crop_imm(sheet, x, y, w, h).to_image()
}

/// Returns a flipped copy. With both flags false this is a plain copy.
pub fn flip_image(img: &RgbaImage, flip_x: bool, flip_y: bool) -> RgbaImage {
    let mut out = img.clone();
    if flip_x {
        out = imageops::flip_horizontal(&out);
    }
    if flip_y {
        out = imageops::flip_vertical(&out);
    }
    out
}

/// Resamples to the given size. `smooth` selects a triangle filter for
/// fractional scales; exact integral scales use nearest-neighbour so
/// pixels stay crisp.
pub fn scale_image(img: &RgbaImage, w: u32, h: u32, smooth: bool) -> RgbaImage {
    let filter = if smooth {
        FilterType::Triangle
    } else {
        FilterType::Nearest
    };
    imageops::resize(img, w.max(1), h.max(1), filter)
}

/// Blits `src` (or the `src_rect` part of it) onto `dst` at
/// `(dst_x, dst_y)`, clipped to both images. `opacity` scales the source
/// alpha, 255 meaning fully opaque.
pub fn blit(
    dst: &mut RgbaImage,
    src: &RgbaImage,
    dst_x: i32,
    dst_y: i32,
    src_rect: Option<Rect>,
    flags: u32,
    opacity: u8,
) {
    let full = Rect::new(0, 0, src.width() as i32, src.height() as i32);
    let sr = src_rect.unwrap_or(full);

    // clip the source rect to the source image
    let mut sx0 = sr.x.max(0);
    let mut sy0 = sr.y.max(0);
    let sx1 = sr.right().min(full.w);
    let sy1 = sr.bottom().min(full.h);

    // destination start shifts along with any source clipping
    let mut dx0 = dst_x + (sx0 - sr.x);
    let mut dy0 = dst_y + (sy0 - sr.y);

    // clip against the destination
    if dx0 < 0 {
        sx0 -= dx0;
        dx0 = 0;
    }
    if dy0 < 0 {
        sy0 -= dy0;
        dy0 = 0;
    }
    let w = (sx1 - sx0).min(dst.width() as i32 - dx0);
    let h = (sy1 - sy0).min(dst.height() as i32 - dy0);
    if w <= 0 || h <= 0 {
        return;
    }

    let opacity = opacity as u32;
    for row in 0..h as u32 {
        for col in 0..w as u32 {
            let sp = src.get_pixel(sx0 as u32 + col, sy0 as u32 + row).0;
            let dp = dst.get_pixel_mut(dx0 as u32 + col, dy0 as u32 + row);
            let sa = sp[3] as u32 * opacity / 255;
            if flags & BLIT_ADD != 0 {
                for c in 0..3 {
                    let added = dp.0[c] as u32 + sp[c] as u32 * sa / 255;
                    dp.0[c] = added.min(255) as u8;
                }
            } else {
                if sa == 0 {
                    continue;
                }
                let da = dp.0[3] as u32;
                for c in 0..3 {
                    dp.0[c] =
                        ((sp[c] as u32 * sa + dp.0[c] as u32 * (255 - sa)) / 255) as u8;
                }
                dp.0[3] = (sa + da * (255 - sa) / 255) as u8;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn solid(w: u32, h: u32, px: [u8; 4]) -> RgbaImage {
        RgbaImage::from_pixel(w, h, Rgba(px))
    }

    #[test]
    fn opaque_blit_replaces_pixels() {
        let mut dst = solid(4, 4, [0, 0, 0, 255]);
        let src = solid(2, 2, [255, 0, 0, 255]);
        blit(&mut dst, &src, 1, 1, None, BLIT_ALPHA, 255);
        assert_eq!(dst.get_pixel(1, 1).0, [255, 0, 0, 255]);
        assert_eq!(dst.get_pixel(0, 0).0, [0, 0, 0, 255]);
    }

    #[test]
    fn blit_clips_outside_destination() {
        let mut dst = solid(4, 4, [0, 0, 0, 255]);
        let src = solid(8, 8, [0, 255, 0, 255]);
        blit(&mut dst, &src, -6, -6, None, BLIT_ALPHA, 255);
        assert_eq!(dst.get_pixel(1, 1).0, [0, 255, 0, 255]);
        assert_eq!(dst.get_pixel(2, 2).0, [0, 0, 0, 255]);
    }

    #[test]
    fn source_rect_selects_region() {
        let mut src = solid(4, 4, [0, 0, 255, 255]);
        src.put_pixel(3, 3, Rgba([255, 255, 0, 255]));
        let mut dst = solid(2, 2, [0, 0, 0, 255]);
        blit(&mut dst, &src, 0, 0, Some(Rect::new(3, 3, 1, 1)), BLIT_ALPHA, 255);
        assert_eq!(dst.get_pixel(0, 0).0, [255, 255, 0, 255]);
        assert_eq!(dst.get_pixel(1, 1).0, [0, 0, 0, 255]);
    }

    #[test]
    fn transparent_source_leaves_destination() {
        let mut dst = solid(2, 2, [9, 9, 9, 255]);
        let src = solid(2, 2, [255, 255, 255, 0]);
        blit(&mut dst, &src, 0, 0, None, BLIT_ALPHA, 255);
        assert_eq!(dst.get_pixel(0, 0).0, [9, 9, 9, 255]);
    }

    #[test]
    fn colorkey_pixels_become_transparent() {
        let img = keyed(solid(2, 1, [255, 0, 255, 255]), Some([255, 0, 255]));
        assert_eq!(img.get_pixel(0, 0).0[3], 0);
    }

    #[test]
    fn flip_mirrors_horizontally() {
        let mut img = solid(2, 1, [0, 0, 0, 255]);
        img.put_pixel(0, 0, Rgba([255, 0, 0, 255]));
        let flipped = flip_image(&img, true, false);
        assert_eq!(flipped.get_pixel(1, 0).0, [255, 0, 0, 255]);
        assert_eq!(flipped.get_pixel(0, 0).0, [0, 0, 0, 255]);
    }
}
