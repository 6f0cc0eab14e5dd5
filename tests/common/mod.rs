//! Shared fixture helpers: per-test temp dirs, generated tile sheets
//! and minimal TMX documents.
#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use image::{Rgba, RgbaImage};

pub fn init_logs() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub fn temp_dir(tag: &str) -> PathBuf {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("clock went backwards")
        .as_nanos();
    let dir = std::env::temp_dir().join(format!("tileblit_{tag}_{nanos}"));
    fs::create_dir_all(&dir).expect("failed to create temp dir");
    dir
}

/// A distinct opaque color per tile index.
pub fn color_of(idx: u32) -> [u8; 4] {
    [
        (10 + idx * 37 % 240) as u8,
        (60 + idx * 53 % 190) as u8,
        (90 + idx * 71 % 160) as u8,
        255,
    ]
}

/// Writes a sheet of solid-colored tiles; tile i is color_of(i).
pub fn write_sheet(path: &Path, cols: u32, rows: u32, tile: u32) {
    let img = RgbaImage::from_fn(cols * tile, rows * tile, |x, y| {
        Rgba(color_of(x / tile + y / tile * cols))
    });
    img.save(path).expect("failed to write sheet");
}

/// Writes `tiles.png` (a 1-row sheet of `tile_count` 16x16 tiles) and a
/// `map.tmx` with one csv layer, returning the map path.
pub fn write_basic_map(dir: &Path, width: u32, height: u32, csv: &str, tile_count: u32) -> PathBuf {
    write_sheet(&dir.join("tiles.png"), tile_count, 1, 16);
    let tmx = format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<map version="1.0" orientation="orthogonal" width="{width}" height="{height}" tilewidth="16" tileheight="16">
 <tileset firstgid="1" name="ground" tilewidth="16" tileheight="16">
  <image source="tiles.png"/>
 </tileset>
 <layer name="floor" width="{width}" height="{height}">
  <data encoding="csv">{csv}</data>
 </layer>
</map>"#
    );
    let path = dir.join("map.tmx");
    fs::write(&path, tmx).expect("failed to write map");
    path
}
