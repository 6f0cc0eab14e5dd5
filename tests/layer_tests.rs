// tests/layer_tests.rs

mod common;

use std::fs;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use tileblit::{
    blit, load_level, new_surface, parse_map_file, LayerIncompatibleError, Rect, ResourceLoader,
    SpriteLayer, BLIT_ALPHA,
};

fn write_two_layer_map(dir: &Path) -> PathBuf {
    common::write_sheet(&dir.join("tiles.png"), 2, 1, 16);
    let tmx = r#"<?xml version="1.0" encoding="UTF-8"?>
<map version="1.0" orientation="orthogonal" width="2" height="2" tilewidth="16" tileheight="16">
 <tileset firstgid="1" name="ground" tilewidth="16" tileheight="16">
  <image source="tiles.png"/>
 </tileset>
 <layer name="back" width="2" height="2">
  <data encoding="csv">1,1,0,0</data>
 </layer>
 <layer name="front" width="2" height="2">
  <data encoding="csv">0,2,0,2</data>
 </layer>
 <objectgroup name="triggers"/>
</map>"#;
    let path = dir.join("map.tmx");
    fs::write(&path, tmx).expect("write map");
    path
}

#[test]
fn construction_composes_cells_from_the_grid() {
    common::init_logs();
    let dir = common::temp_dir("build");
    let path = common::write_basic_map(&dir, 2, 2, "1,2,1,0", 2);
    let level = load_level(&path).expect("load");

    let layer = level.sprite_layer("floor").expect("layer");
    assert!(!layer.is_object_group);
    assert_eq!((layer.num_tiles_x, layer.num_tiles_y), (2, 2));
    assert_eq!(layer.populated_cells(), 3);
    assert!(layer.cell(1, 1).is_none());

    let cell = layer.cell(1, 0).expect("cell (1,0)");
    assert_eq!(cell.rect, Rect::new(16, 0, 16, 16));
    assert_eq!(cell.image.get_pixel(0, 0).0, common::color_of(1));
    assert_eq!(layer.bottom_margin(), 16);
}

#[test]
fn collapse_shrinks_the_grid_rounding_up() {
    let dir = common::temp_dir("collapsedims");
    let path = common::write_basic_map(&dir, 3, 3, "1,1,1,1,1,1,1,1,1", 2);
    let level = load_level(&path).expect("load");
    let layer = level.sprite_layer("floor").expect("layer");

    let collapsed = layer.collapse(2);
    assert_eq!((collapsed.num_tiles_x, collapsed.num_tiles_y), (2, 2));
    assert_eq!(collapsed.tile_width, 32.0);
    assert_eq!(collapsed.tile_height, 32.0);
    assert_eq!(collapsed.collapse_level(), 2);

    // the original is never mutated
    assert_eq!((layer.num_tiles_x, layer.num_tiles_y), (3, 3));
    assert_eq!(layer.collapse_level(), 1);

    // trailing block unions a single source cell
    assert!(collapsed.cell(1, 1).is_some());
}

#[test]
fn collapse_reuses_composed_images_for_identical_blocks() {
    let dir = common::temp_dir("collapsecache");
    let path = common::write_basic_map(&dir, 4, 1, "1,2,1,2", 2);
    let level = load_level(&path).expect("load");
    let layer = level.sprite_layer("floor").expect("layer");

    let collapsed = layer.collapse(2);
    let a = collapsed.cell(0, 0).expect("block 0");
    let b = collapsed.cell(1, 0).expect("block 1");
    // identical arrangements at different positions share one surface
    assert!(Rc::ptr_eq(&a.image, &b.image));
    assert_eq!(a.rect, Rect::new(0, 0, 32, 16));
    assert_eq!(b.rect, Rect::new(32, 0, 32, 16));
}

#[test]
fn collapsed_cells_match_a_manual_composite() {
    let dir = common::temp_dir("collapsepixels");
    let path = common::write_basic_map(&dir, 4, 1, "1,2,1,2", 2);
    let mut map = parse_map_file(&path).expect("parse");
    map.decode().expect("decode");
    let mut resources = ResourceLoader::new();
    resources.load(&map).expect("resources");
    let layer = SpriteLayer::build(0, &map, &resources);

    let collapsed = layer.collapse(2);
    let cell = collapsed.cell(0, 0).expect("block 0");

    let mut manual = new_surface(32, 16);
    blit(&mut manual, &resources.tile(1).expect("gid 1").image, 0, 0, None, BLIT_ALPHA, 255);
    blit(&mut manual, &resources.tile(2).expect("gid 2").image, 16, 0, None, BLIT_ALPHA, 255);
    assert!(*cell.image == manual);
}

#[test]
fn merge_requires_identical_geometry() {
    let dir_a = common::temp_dir("mergea");
    let a = load_level(&common::write_basic_map(&dir_a, 2, 2, "1,2,1,0", 2)).expect("load a");
    let layer_a = a.sprite_layer("floor").expect("layer a");

    // same grid, different tile size
    let dir_b = common::temp_dir("mergeb");
    common::write_sheet(&dir_b.join("tiles.png"), 2, 1, 8);
    let tmx = r#"<?xml version="1.0" encoding="UTF-8"?>
<map version="1.0" orientation="orthogonal" width="2" height="2" tilewidth="8" tileheight="8">
 <tileset firstgid="1" name="ground" tilewidth="8" tileheight="8">
  <image source="tiles.png"/>
 </tileset>
 <layer name="floor" width="2" height="2">
  <data encoding="csv">1,2,1,0</data>
 </layer>
</map>"#;
    let path_b = dir_b.join("map.tmx");
    fs::write(&path_b, tmx).expect("write map");
    let b = load_level(&path_b).expect("load b");
    let layer_b = b.sprite_layer("floor").expect("layer b");

    let err = SpriteLayer::merge(&[layer_a, layer_b]).unwrap_err();
    assert_eq!(
        err,
        LayerIncompatibleError::Mismatch {
            dimension: "tile_width"
        }
    );

    // same tile size, different grid
    let dir_c = common::temp_dir("mergec");
    let c = load_level(&common::write_basic_map(&dir_c, 3, 2, "1,2,1,0,1,2", 2)).expect("load c");
    let layer_c = c.sprite_layer("floor").expect("layer c");
    let err = SpriteLayer::merge(&[layer_a, layer_c]).unwrap_err();
    assert_eq!(
        err,
        LayerIncompatibleError::Mismatch {
            dimension: "num_tiles_x"
        }
    );
}

#[test]
fn merge_composites_later_layers_over_earlier_ones() {
    let dir = common::temp_dir("merge");
    let path = write_two_layer_map(&dir);
    let level = load_level(&path).expect("load");
    let back = level.sprite_layer("back").expect("back");
    let front = level.sprite_layer("front").expect("front");

    let merged = SpriteLayer::merge(&[back, front]).expect("merge");
    // union of populated cells: (0,0), (1,0), (1,1)
    assert_eq!(merged.populated_cells(), 3);

    // where both layers paint, the later layer wins
    let overlap = merged.cell(1, 0).expect("cell (1,0)");
    assert_eq!(overlap.image.get_pixel(0, 0).0, common::color_of(1));
    // where only the back layer paints, it shows through
    let back_only = merged.cell(0, 0).expect("cell (0,0)");
    assert_eq!(back_only.image.get_pixel(0, 0).0, common::color_of(0));

    // the inputs are untouched
    assert_eq!(
        back.cell(1, 0).expect("input cell").image.get_pixel(0, 0).0,
        common::color_of(0)
    );
}

#[test]
fn merge_skips_object_groups() {
    let dir = common::temp_dir("mergeobj");
    let path = write_two_layer_map(&dir);
    let level = load_level(&path).expect("load");
    let back = level.sprite_layer("back").expect("back");
    let marker = level
        .layers
        .iter()
        .find(|l| l.is_object_group)
        .expect("object marker");

    let err = SpriteLayer::merge(&[marker]).unwrap_err();
    assert_eq!(err, LayerIncompatibleError::NoGridLayers);

    let merged = SpriteLayer::merge(&[marker, back]).expect("merge");
    assert_eq!(merged.populated_cells(), back.populated_cells());
}

#[test]
fn scale_doubles_exactly() {
    let dir = common::temp_dir("scale2");
    let path = common::write_basic_map(&dir, 2, 2, "1,2,1,0", 2);
    let level = load_level(&path).expect("load");
    let layer = level.sprite_layer("floor").expect("layer");

    let scaled = layer.scale(2.0, 2.0);
    assert_eq!(scaled.tile_width, 32.0);
    let cell = scaled.cell(1, 0).expect("cell (1,0)");
    assert_eq!(cell.rect, Rect::new(32, 0, 32, 32));
    assert_eq!(cell.image.dimensions(), (32, 32));
    // exact scale keeps pixels crisp
    assert_eq!(cell.image.get_pixel(0, 0).0, common::color_of(1));

    // the original keeps its geometry
    assert_eq!(layer.tile_width, 16.0);
}

#[test]
fn fractional_scale_rounds_up_and_resamples() {
    let dir = common::temp_dir("scalefrac");
    let path = common::write_basic_map(&dir, 2, 1, "1,2", 2);
    let level = load_level(&path).expect("load");
    let layer = level.sprite_layer("floor").expect("layer");

    let scaled = layer.scale(1.3, 1.0);
    let cell = scaled.cell(1, 0).expect("cell (1,0)");
    // 16 * 1.3 = 20.8, rounded up to 21
    assert_eq!(cell.image.dimensions(), (21, 16));
    assert_eq!(cell.rect.w, 21);
    assert_eq!(cell.rect.x, 20);
}

#[test]
fn transforms_pass_object_group_markers_through() {
    let dir = common::temp_dir("objpass");
    let path = write_two_layer_map(&dir);
    let level = load_level(&path).expect("load");
    let marker = level
        .layers
        .iter()
        .find(|l| l.is_object_group)
        .expect("object marker");

    assert!(marker.scale(2.0, 2.0).is_object_group);
    assert!(marker.collapse(2).is_object_group);
}
