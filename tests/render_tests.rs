// tests/render_tests.rs

mod common;

use std::fs;
use std::rc::Rc;

use image::{Rgba, RgbaImage};

use tileblit::{load_level, new_surface, Rect, Renderer, Sprite};

fn csv_of(n: usize, value: &str) -> String {
    vec![value; n].join(",")
}

fn solid(w: u32, h: u32, px: [u8; 4]) -> tileblit::ImageHandle {
    Rc::new(RgbaImage::from_pixel(w, h, Rgba(px)))
}

#[test]
fn upright_sprites_draw_before_flat_ones() {
    common::init_logs();
    let dir = common::temp_dir("draworder");
    let path = common::write_basic_map(&dir, 10, 10, &csv_of(100, "0"), 2);
    let mut level = load_level(&path).expect("load");

    let upright = Sprite::new(solid(8, 30, [0, 255, 0, 255]), Rect::new(0, 60, 8, 30));
    let mut flat = Sprite::new(solid(8, 20, [255, 0, 0, 255]), Rect::new(0, 85, 8, 20));
    flat.is_flat = true;
    flat.z = 15;
    assert_eq!(upright.draw_order(), 90);
    assert_eq!(flat.draw_order(), 100);

    {
        let layer = level.sprite_layer_mut("floor").expect("layer");
        layer.add_sprite(upright.clone());
        layer.add_sprite(flat.clone());
    }

    let mut renderer = Renderer::new();
    renderer.set_camera_rect(Rect::new(0, 0, 160, 160));
    let mut frame = new_surface(160, 160);
    renderer.render_layer(&mut frame, level.sprite_layer("floor").expect("layer"));

    // the flat sprite (key 100) paints after the upright one (key 90);
    // its z shifts the draw position up, so both cover y 70..90 at x 0..8
    assert_eq!(frame.get_pixel(4, 80).0, [255, 0, 0, 255]);
    // above the flat sprite's shifted extent only the upright shows
    assert_eq!(frame.get_pixel(4, 65).0, [0, 255, 0, 255]);
}

#[test]
fn visible_range_clamps_to_the_grid() {
    let dir = common::temp_dir("clamp");
    let path = common::write_basic_map(&dir, 10, 10, &csv_of(100, "1"), 2);
    let level = load_level(&path).expect("load");
    let layer = level.sprite_layer("floor").expect("layer");

    let mut renderer = Renderer::new();
    renderer.set_camera_rect(Rect::new(-500, 10, 100, 100));
    assert_eq!(renderer.visible_tile_range(layer), (0, 0, 0, 7));

    // rendering with the camera fully left of the world draws nothing
    let mut frame = new_surface(100, 100);
    renderer.render_layer(&mut frame, layer);
    assert!(frame == new_surface(100, 100));

    // a camera straddling the origin clamps, no negative columns
    renderer.set_camera_margin(0, 0, 0, 0);
    renderer.set_camera_rect(Rect::new(-8, 0, 32, 32));
    assert_eq!(renderer.visible_tile_range(layer), (0, 2, 0, 3));
}

#[test]
fn tall_sprites_grow_the_bottom_margin() {
    let dir = common::temp_dir("margingrow");
    let path = common::write_basic_map(&dir, 10, 10, &csv_of(100, "0"), 2);
    let mut level = load_level(&path).expect("load");
    {
        let layer = level.sprite_layer_mut("floor").expect("layer");
        layer.add_sprite(Sprite::new(
            solid(8, 48, [9, 9, 9, 255]),
            Rect::new(0, 0, 8, 48),
        ));
    }

    let mut renderer = Renderer::new();
    renderer.set_camera_rect(Rect::new(0, 0, 64, 64));
    let mut frame = new_surface(64, 64);
    renderer.render_layer(&mut frame, level.sprite_layer("floor").expect("layer"));

    assert_eq!(renderer.camera_rect(), Rect::new(0, 0, 64, 64));
    assert_eq!(renderer.render_rect(), Rect::new(0, 0, 64, 112));
}

#[test]
fn parallax_factor_zero_pins_a_layer_to_the_screen() {
    let dir = common::temp_dir("parallax");
    let path = common::write_basic_map(&dir, 1, 1, "1", 2);
    let mut level = load_level(&path).expect("load");
    level
        .sprite_layer_mut("floor")
        .expect("layer")
        .set_parallax_factor(0.0, 0.0);
    let layer = level.sprite_layer("floor").expect("layer");

    let mut renderer = Renderer::new();
    renderer.set_camera_rect(Rect::new(0, 0, 32, 32));
    let mut near = new_surface(32, 32);
    renderer.render_layer(&mut near, layer);

    renderer.set_camera_rect(Rect::new(100, 77, 32, 32));
    let mut far = new_surface(32, 32);
    renderer.render_layer(&mut far, layer);

    assert_eq!(near.get_pixel(0, 0).0, common::color_of(0));
    assert!(near == far);
}

#[test]
fn pick_layer_maps_screen_to_grid_cells() {
    let dir = common::temp_dir("pick");
    let path = common::write_basic_map(&dir, 2, 2, "1,2,1,0", 2);
    let level = load_level(&path).expect("load");
    let layer = level.sprite_layer("floor").expect("layer");

    let mut renderer = Renderer::new();
    renderer.set_camera_rect(Rect::new(0, 0, 64, 64));

    let picked = renderer.pick_layer(layer, 8, 8).expect("sprite at (8,8)");
    assert!(picked == layer.cell(0, 0).expect("cell (0,0)"));

    // empty cell and out-of-grid positions yield nothing
    assert!(renderer.pick_layer(layer, 24, 24).is_none());
    assert!(renderer.pick_layer(layer, 60, 60).is_none());

    // a scrolled camera shifts the mapping
    renderer.set_camera_rect(Rect::new(16, 0, 64, 64));
    let picked = renderer.pick_layer(layer, 0, 0).expect("sprite at (0,0)");
    assert!(picked == layer.cell(1, 0).expect("cell (1,0)"));

    // left of the world origin there is nothing to pick
    renderer.set_camera_rect(Rect::new(-20, 0, 64, 64));
    assert!(renderer.pick_layer(layer, 0, 0).is_none());
}

#[test]
fn pick_layer_sprites_keeps_insertion_order() {
    let dir = common::temp_dir("picksprites");
    let path = common::write_basic_map(&dir, 4, 4, &csv_of(16, "0"), 2);
    let mut level = load_level(&path).expect("load");

    let first = Sprite::new(solid(16, 16, [1, 0, 0, 255]), Rect::new(0, 0, 16, 16));
    let second = Sprite::new(solid(16, 16, [0, 1, 0, 255]), Rect::new(8, 8, 16, 16));
    {
        let layer = level.sprite_layer_mut("floor").expect("layer");
        layer.add_sprite(first.clone());
        layer.add_sprite(second.clone());
    }
    let layer = level.sprite_layer("floor").expect("layer");

    let mut renderer = Renderer::new();
    renderer.set_camera_rect(Rect::new(0, 0, 64, 64));

    let picked = renderer.pick_layer_sprites(layer, 12, 12);
    assert_eq!(picked.len(), 2);
    assert!(*picked[0] == first);
    assert!(*picked[1] == second);

    assert!(renderer.pick_layer_sprites(layer, 60, 60).is_empty());
}

#[test]
fn invisible_layers_render_nothing() {
    let dir = common::temp_dir("invisible");
    common::write_sheet(&dir.join("tiles.png"), 2, 1, 16);
    let tmx = r#"<?xml version="1.0" encoding="UTF-8"?>
<map version="1.0" orientation="orthogonal" width="2" height="2" tilewidth="16" tileheight="16">
 <tileset firstgid="1" name="ground" tilewidth="16" tileheight="16">
  <image source="tiles.png"/>
 </tileset>
 <layer name="floor" width="2" height="2" visible="0">
  <data encoding="csv">1,2,1,0</data>
 </layer>
</map>"#;
    let path = dir.join("map.tmx");
    fs::write(&path, tmx).expect("write map");
    let level = load_level(&path).expect("load");

    let mut renderer = Renderer::new();
    renderer.set_camera_rect(Rect::new(0, 0, 32, 32));
    let mut frame = new_surface(32, 32);
    renderer.render_layer(&mut frame, level.sprite_layer("floor").expect("layer"));
    assert!(frame == new_surface(32, 32));
}

#[test]
fn layer_opacity_scales_the_blit_alpha() {
    let dir = common::temp_dir("opacity");
    common::write_sheet(&dir.join("tiles.png"), 2, 1, 16);
    let tmx = r#"<?xml version="1.0" encoding="UTF-8"?>
<map version="1.0" orientation="orthogonal" width="1" height="1" tilewidth="16" tileheight="16">
 <tileset firstgid="1" name="ground" tilewidth="16" tileheight="16">
  <image source="tiles.png"/>
 </tileset>
 <layer name="floor" width="1" height="1" opacity="0.5">
  <data encoding="csv">1</data>
 </layer>
</map>"#;
    let path = dir.join("map.tmx");
    fs::write(&path, tmx).expect("write map");
    let level = load_level(&path).expect("load");

    let mut renderer = Renderer::new();
    renderer.set_camera_rect(Rect::new(0, 0, 16, 16));
    let mut frame = new_surface(16, 16);
    renderer.render_layer(&mut frame, level.sprite_layer("floor").expect("layer"));

    // mirror of the blit arithmetic at alpha 127 over a transparent surface
    let c = common::color_of(0);
    let alpha = (0.5f32 * 255.0) as u32;
    let expected = [
        (c[0] as u32 * alpha / 255) as u8,
        (c[1] as u32 * alpha / 255) as u8,
        (c[2] as u32 * alpha / 255) as u8,
        alpha as u8,
    ];
    assert_eq!(frame.get_pixel(0, 0).0, expected);
}
