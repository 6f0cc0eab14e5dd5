//! TMX file parser.
//!
//! Event-driven `quick-xml` parsing into the typed document model.
//! Attribute values are collected as raw strings per element and
//! converted afterwards: dimensions, ids and offsets as integers,
//! opacity as a float clamped to [0, 1], visibility as a 0/1 integer,
//! colorkeys as 6 hex digits. Conversion failures are fatal except
//! inside `<object>` elements, which are skipped and reported
//! individually so one bad object cannot take down the whole group.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use crate::error::MapError;
use crate::raster::ColorKey;
use crate::tmx::{
    LayerPayload, MapLayer, MapObject, ObjectGroup, ObjectIssue, Properties, Tile, TileImage,
    TileLayer, TileMap, TileSet,
};

/// Parses a map file. Payloads stay raw; call [`TileMap::decode`] next.
pub fn parse_map_file(path: &Path) -> Result<TileMap, MapError> {
    let text = fs::read_to_string(path).map_err(|source| MapError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_map_str(&text, path)
}

/// Parses map XML from a string. `file_name` is used for error messages
/// and for resolving relative tileset/image references.
pub fn parse_map_str(text: &str, file_name: &Path) -> Result<TileMap, MapError> {
    let mut parser = XmlParser::new(text, file_name);
    loop {
        let ev = parser.next()?;
        match ev {
            Event::Start(e) if e.name().as_ref() == b"map" => {
                let attrs = parser.attrs_of(&e)?;
                return parser.parse_map(&attrs, false);
            }
            Event::Empty(e) if e.name().as_ref() == b"map" => {
                let attrs = parser.attrs_of(&e)?;
                return parser.parse_map(&attrs, true);
            }
            Event::Eof => {
                return Err(MapError::Format(format!(
                    "{}: no <map> root element",
                    file_name.display()
                )))
            }
            _ => {}
        }
    }
}

struct XmlParser<'s> {
    reader: Reader<&'s [u8]>,
    path: PathBuf,
    dir: PathBuf,
}

impl<'s> XmlParser<'s> {
    fn new(text: &'s str, file_name: &Path) -> Self {
        let mut reader = Reader::from_str(text);
        reader.trim_text(true);
        XmlParser {
            reader,
            path: file_name.to_path_buf(),
            dir: file_name
                .parent()
                .map(Path::to_path_buf)
                .unwrap_or_else(|| PathBuf::from(".")),
        }
    }

    fn next(&mut self) -> Result<Event<'s>, MapError> {
        self.reader.read_event().map_err(|source| MapError::Xml {
            path: self.path.clone(),
            source,
        })
    }

    fn attrs_of(&self, e: &BytesStart<'_>) -> Result<HashMap<String, String>, MapError> {
        let mut out = HashMap::new();
        for attr in e.attributes() {
            let attr = attr.map_err(|e| MapError::Xml {
                path: self.path.clone(),
                source: e.into(),
            })?;
            let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
            let value = attr
                .unescape_value()
                .map_err(|source| MapError::Xml {
                    path: self.path.clone(),
                    source,
                })?
                .into_owned();
            out.insert(key, value);
        }
        Ok(out)
    }

    fn eof_err(&self) -> MapError {
        MapError::Format(format!("{}: unexpected end of file", self.path.display()))
    }

    /// Consumes the rest of the subtree whose Start event was just read.
    fn skip_subtree(&mut self) -> Result<(), MapError> {
        let mut depth = 1usize;
        loop {
            match self.next()? {
                Event::Start(_) => depth += 1,
                Event::End(_) => {
                    depth -= 1;
                    if depth == 0 {
                        return Ok(());
                    }
                }
                Event::Eof => return Err(self.eof_err()),
                _ => {}
            }
        }
    }

    fn resolve(&self, relative: &str) -> PathBuf {
        let p = Path::new(relative);
        if p.is_absolute() {
            p.to_path_buf()
        } else {
            self.dir.join(p)
        }
    }

    fn parse_map(
        &mut self,
        attrs: &HashMap<String, String>,
        empty: bool,
    ) -> Result<TileMap, MapError> {
        let version = req(attrs, "map", "version")?.to_owned();
        if version != "1.0" {
            return Err(MapError::UnsupportedVersion { found: version });
        }

        let mut map = TileMap {
            orientation: attrs
                .get("orientation")
                .cloned()
                .unwrap_or_else(|| "orthogonal".to_owned()),
            version,
            width: parse_u32("map", "width", req(attrs, "map", "width")?)?,
            height: parse_u32("map", "height", req(attrs, "map", "height")?)?,
            tile_width: parse_u32("map", "tilewidth", req(attrs, "map", "tilewidth")?)?,
            tile_height: parse_u32("map", "tileheight", req(attrs, "map", "tileheight")?)?,
            tile_sets: Vec::new(),
            layers: Vec::new(),
            properties: Properties::new(),
            object_issues: Vec::new(),
            map_file_name: self.path.clone(),
        };

        if !empty {
            let (mw, mh) = (map.width, map.height);
            let (mtw, mth) = (map.tile_width, map.tile_height);
            loop {
                let ev = self.next()?;
                match ev {
                    Event::Start(e) => {
                        let attrs = self.attrs_of(&e)?;
                        match e.name().as_ref() {
                            b"tileset" => {
                                let ts = self.parse_tileset(&attrs, false)?;
                                map.tile_sets.push(ts);
                            }
                            b"layer" => {
                                let layer =
                                    self.parse_layer(mw, mh, mtw, mth, &attrs, false)?;
                                map.layers.push(MapLayer::Grid(layer));
                            }
                            b"objectgroup" => {
                                let group = self.parse_object_group(
                                    &attrs,
                                    false,
                                    &mut map.object_issues,
                                )?;
                                map.layers.push(MapLayer::Objects(group));
                            }
                            b"properties" => self.parse_properties(&mut map.properties)?,
                            _ => self.skip_subtree()?,
                        }
                    }
                    Event::Empty(e) => {
                        let attrs = self.attrs_of(&e)?;
                        match e.name().as_ref() {
                            b"tileset" => {
                                let ts = self.parse_tileset(&attrs, true)?;
                                map.tile_sets.push(ts);
                            }
                            b"layer" => {
                                let layer = self.parse_layer(mw, mh, mtw, mth, &attrs, true)?;
                                map.layers.push(MapLayer::Grid(layer));
                            }
                            b"objectgroup" => {
                                let group = self.parse_object_group(
                                    &attrs,
                                    true,
                                    &mut map.object_issues,
                                )?;
                                map.layers.push(MapLayer::Objects(group));
                            }
                            _ => {}
                        }
                    }
                    Event::End(e) if e.name().as_ref() == b"map" => break,
                    Event::Eof => return Err(self.eof_err()),
                    _ => {}
                }
            }
        }

        // contiguous-gid bookkeeping is simplest on a sorted list
        map.tile_sets.sort_by_key(|t| t.first_gid);
        Ok(map)
    }

    fn parse_tileset(
        &mut self,
        attrs: &HashMap<String, String>,
        empty: bool,
    ) -> Result<TileSet, MapError> {
        let first_gid = parse_u32("tileset", "firstgid", req(attrs, "tileset", "firstgid")?)?;

        // external tilesets live in their own file, relative to this one
        if let Some(source) = attrs.get("source") {
            let tsx_path = self.resolve(source);
            if !empty {
                self.skip_subtree()?;
            }
            return parse_tsx(&tsx_path, first_gid);
        }

        let mut ts = TileSet {
            first_gid,
            name: attrs.get("name").cloned().unwrap_or_default(),
            tile_width: opt_u32(attrs, "tileset", "tilewidth", 0)?,
            tile_height: opt_u32(attrs, "tileset", "tileheight", 0)?,
            margin: opt_u32(attrs, "tileset", "margin", 0)?,
            spacing: opt_u32(attrs, "tileset", "spacing", 0)?,
            images: Vec::new(),
            tiles: Vec::new(),
            properties: Properties::new(),
        };
        if empty {
            return Ok(ts);
        }

        loop {
            let ev = self.next()?;
            match ev {
                Event::Start(e) => {
                    let attrs = self.attrs_of(&e)?;
                    match e.name().as_ref() {
                        b"image" => ts.images.push(self.parse_image(&attrs, false)?),
                        b"tile" => ts.tiles.push(self.parse_tile(&attrs, false)?),
                        b"properties" => self.parse_properties(&mut ts.properties)?,
                        _ => self.skip_subtree()?,
                    }
                }
                Event::Empty(e) => {
                    let attrs = self.attrs_of(&e)?;
                    match e.name().as_ref() {
                        b"image" => ts.images.push(self.parse_image(&attrs, true)?),
                        b"tile" => ts.tiles.push(self.parse_tile(&attrs, true)?),
                        _ => {}
                    }
                }
                Event::End(e) if e.name().as_ref() == b"tileset" => break,
                Event::Eof => return Err(self.eof_err()),
                _ => {}
            }
        }
        Ok(ts)
    }

    fn parse_image(
        &mut self,
        attrs: &HashMap<String, String>,
        empty: bool,
    ) -> Result<TileImage, MapError> {
        let mut img = TileImage {
            id: opt_u32(attrs, "image", "id", 0)?,
            source: attrs.get("source").map(|s| self.resolve(s)),
            trans: match attrs.get("trans") {
                Some(t) => Some(parse_trans(t)?),
                None => None,
            },
            encoding: None,
            content: None,
        };
        if empty {
            return Ok(img);
        }

        loop {
            let ev = self.next()?;
            match ev {
                Event::Start(e) if e.name().as_ref() == b"data" => {
                    let data_attrs = self.attrs_of(&e)?;
                    img.encoding = data_attrs.get("encoding").cloned();
                    let mut content = String::new();
                    loop {
                        match self.next()? {
                            Event::Text(t) => {
                                content.push_str(&t.unescape().map_err(|source| {
                                    MapError::Xml {
                                        path: self.path.clone(),
                                        source,
                                    }
                                })?)
                            }
                            Event::CData(t) => {
                                content.push_str(&String::from_utf8_lossy(&t.into_inner()))
                            }
                            Event::End(e) if e.name().as_ref() == b"data" => break,
                            Event::Eof => return Err(self.eof_err()),
                            _ => {}
                        }
                    }
                    img.content = Some(content);
                }
                Event::Start(_) => self.skip_subtree()?,
                Event::End(e) if e.name().as_ref() == b"image" => break,
                Event::Eof => return Err(self.eof_err()),
                _ => {}
            }
        }
        Ok(img)
    }

    fn parse_tile(
        &mut self,
        attrs: &HashMap<String, String>,
        empty: bool,
    ) -> Result<Tile, MapError> {
        let mut tile = Tile {
            id: parse_u32("tile", "id", req(attrs, "tile", "id")?)?,
            images: Vec::new(),
            properties: Properties::new(),
        };
        if empty {
            return Ok(tile);
        }

        loop {
            let ev = self.next()?;
            match ev {
                Event::Start(e) => {
                    let attrs = self.attrs_of(&e)?;
                    match e.name().as_ref() {
                        b"image" => tile.images.push(self.parse_image(&attrs, false)?),
                        b"properties" => self.parse_properties(&mut tile.properties)?,
                        _ => self.skip_subtree()?,
                    }
                }
                Event::Empty(e) => {
                    if e.name().as_ref() == b"image" {
                        let attrs = self.attrs_of(&e)?;
                        tile.images.push(self.parse_image(&attrs, true)?);
                    }
                }
                Event::End(e) if e.name().as_ref() == b"tile" => break,
                Event::Eof => return Err(self.eof_err()),
                _ => {}
            }
        }
        Ok(tile)
    }

    fn parse_layer(
        &mut self,
        map_width: u32,
        map_height: u32,
        map_tile_width: u32,
        map_tile_height: u32,
        attrs: &HashMap<String, String>,
        empty: bool,
    ) -> Result<TileLayer, MapError> {
        let mut layer = TileLayer {
            name: attrs.get("name").cloned().unwrap_or_default(),
            x: opt_i32(attrs, "layer", "x", 0)?,
            y: opt_i32(attrs, "layer", "y", 0)?,
            width: opt_u32(attrs, "layer", "width", map_width)?,
            height: opt_u32(attrs, "layer", "height", map_height)?,
            tile_width: map_tile_width,
            tile_height: map_tile_height,
            opacity: opt_f32(attrs, "layer", "opacity", 1.0)?.clamp(0.0, 1.0),
            visible: opt_bool01(attrs, "layer", "visible", true)?,
            properties: Properties::new(),
            payload: LayerPayload::Missing,
            decoded_content: Vec::new(),
        };
        if empty {
            return Ok(layer);
        }

        loop {
            let ev = self.next()?;
            match ev {
                Event::Start(e) => {
                    let attrs = self.attrs_of(&e)?;
                    match e.name().as_ref() {
                        b"data" => layer.payload = self.parse_data(&attrs, false)?,
                        b"properties" => self.parse_properties(&mut layer.properties)?,
                        _ => self.skip_subtree()?,
                    }
                }
                Event::Empty(e) => {
                    if e.name().as_ref() == b"data" {
                        let attrs = self.attrs_of(&e)?;
                        layer.payload = self.parse_data(&attrs, true)?;
                    }
                }
                Event::End(e) if e.name().as_ref() == b"layer" => break,
                Event::Eof => return Err(self.eof_err()),
                _ => {}
            }
        }
        Ok(layer)
    }

    fn parse_data(
        &mut self,
        attrs: &HashMap<String, String>,
        empty: bool,
    ) -> Result<LayerPayload, MapError> {
        let encoding = attrs.get("encoding").cloned();
        let compression = attrs.get("compression").cloned();
        let mut text = String::new();
        let mut gids: Vec<u32> = Vec::new();

        if !empty {
            loop {
                let ev = self.next()?;
                match ev {
                    Event::Text(t) => text.push_str(&t.unescape().map_err(|source| {
                        MapError::Xml {
                            path: self.path.clone(),
                            source,
                        }
                    })?),
                    Event::CData(t) => {
                        text.push_str(&String::from_utf8_lossy(&t.into_inner()))
                    }
                    Event::Empty(e) if e.name().as_ref() == b"tile" => {
                        let attrs = self.attrs_of(&e)?;
                        gids.push(opt_u32(&attrs, "tile", "gid", 0)?);
                    }
                    Event::Start(e) if e.name().as_ref() == b"tile" => {
                        let attrs = self.attrs_of(&e)?;
                        gids.push(opt_u32(&attrs, "tile", "gid", 0)?);
                        self.skip_subtree()?;
                    }
                    Event::Start(_) => self.skip_subtree()?,
                    Event::End(e) if e.name().as_ref() == b"data" => break,
                    Event::Eof => return Err(self.eof_err()),
                    _ => {}
                }
            }
        }

        Ok(match encoding {
            Some(encoding) => LayerPayload::Encoded {
                encoding,
                compression,
                text,
            },
            None => LayerPayload::TileList(gids),
        })
    }

    fn parse_object_group(
        &mut self,
        attrs: &HashMap<String, String>,
        empty: bool,
        issues: &mut Vec<ObjectIssue>,
    ) -> Result<ObjectGroup, MapError> {
        let mut group = ObjectGroup {
            name: attrs.get("name").cloned().unwrap_or_default(),
            x: opt_i32(attrs, "objectgroup", "x", 0)?,
            y: opt_i32(attrs, "objectgroup", "y", 0)?,
            width: opt_u32(attrs, "objectgroup", "width", 0)?,
            height: opt_u32(attrs, "objectgroup", "height", 0)?,
            visible: opt_bool01(attrs, "objectgroup", "visible", true)?,
            properties: Properties::new(),
            objects: Vec::new(),
        };
        if empty {
            return Ok(group);
        }

        loop {
            let ev = self.next()?;
            match &ev {
                Event::Start(e) | Event::Empty(e) if e.name().as_ref() == b"object" => {
                    let is_empty = matches!(&ev, Event::Empty(_));
                    let attrs = self.attrs_of(e)?;
                    match self.parse_object(&attrs, is_empty) {
                        Ok(obj) => group.objects.push(obj),
                        // an isolated bad object must not abort its siblings
                        Err(MapError::Format(message)) => {
                            let object = attrs.get("name").cloned().unwrap_or_default();
                            log::warn!(
                                "skipping object '{}' in group '{}': {}",
                                object,
                                group.name,
                                message
                            );
                            issues.push(ObjectIssue {
                                layer: group.name.clone(),
                                object,
                                message,
                            });
                        }
                        Err(other) => return Err(other),
                    }
                }
                Event::Start(e) => match e.name().as_ref() {
                    b"properties" => self.parse_properties(&mut group.properties)?,
                    _ => self.skip_subtree()?,
                },
                Event::End(e) if e.name().as_ref() == b"objectgroup" => break,
                Event::Eof => return Err(self.eof_err()),
                _ => {}
            }
        }
        Ok(group)
    }

    fn parse_object(
        &mut self,
        attrs: &HashMap<String, String>,
        empty: bool,
    ) -> Result<MapObject, MapError> {
        // consume the whole subtree first so a conversion failure leaves
        // the event stream positioned after </object>
        let mut properties = Properties::new();
        if !empty {
            loop {
                let ev = self.next()?;
                match ev {
                    Event::Start(e) => {
                        if e.name().as_ref() == b"properties" {
                            self.parse_properties(&mut properties)?;
                        } else {
                            self.skip_subtree()?;
                        }
                    }
                    Event::End(e) if e.name().as_ref() == b"object" => break,
                    Event::Eof => return Err(self.eof_err()),
                    _ => {}
                }
            }
        }

        Ok(MapObject {
            name: attrs.get("name").cloned().unwrap_or_default(),
            object_type: attrs.get("type").cloned().unwrap_or_default(),
            x: opt_i32(attrs, "object", "x", 0)?,
            y: opt_i32(attrs, "object", "y", 0)?,
            width: opt_i32(attrs, "object", "width", 0)?,
            height: opt_i32(attrs, "object", "height", 0)?,
            properties,
        })
    }

    fn parse_properties(&mut self, props: &mut Properties) -> Result<(), MapError> {
        loop {
            let ev = self.next()?;
            match ev {
                Event::Empty(e) if e.name().as_ref() == b"property" => {
                    let attrs = self.attrs_of(&e)?;
                    let name = req(&attrs, "property", "name")?.to_owned();
                    let value = attrs.get("value").cloned().unwrap_or_default();
                    props.insert(name, value);
                }
                Event::Start(e) if e.name().as_ref() == b"property" => {
                    let attrs = self.attrs_of(&e)?;
                    let name = req(&attrs, "property", "name")?.to_owned();
                    // value may live in the text content instead of an attribute
                    let mut value = attrs.get("value").cloned().unwrap_or_default();
                    loop {
                        match self.next()? {
                            Event::Text(t) => {
                                value = t
                                    .unescape()
                                    .map_err(|source| MapError::Xml {
                                        path: self.path.clone(),
                                        source,
                                    })?
                                    .into_owned()
                            }
                            Event::End(e) if e.name().as_ref() == b"property" => break,
                            Event::Eof => return Err(self.eof_err()),
                            _ => {}
                        }
                    }
                    props.insert(name, value);
                }
                Event::End(e) if e.name().as_ref() == b"properties" => break,
                Event::Eof => return Err(self.eof_err()),
                _ => {}
            }
        }
        Ok(())
    }
}

fn parse_tsx(tsx_path: &Path, first_gid: u32) -> Result<TileSet, MapError> {
    let text = fs::read_to_string(tsx_path).map_err(|source| MapError::Io {
        path: tsx_path.to_path_buf(),
        source,
    })?;
    let mut parser = XmlParser::new(&text, tsx_path);
    loop {
        let ev = parser.next()?;
        match &ev {
            Event::Start(e) | Event::Empty(e) if e.name().as_ref() == b"tileset" => {
                let is_empty = matches!(&ev, Event::Empty(_));
                let mut attrs = parser.attrs_of(e)?;
                // the firstgid belongs to the referencing map, not the tsx
                attrs.insert("firstgid".to_owned(), first_gid.to_string());
                return parser.parse_tileset(&attrs, is_empty);
            }
            Event::Eof => {
                return Err(MapError::Format(format!(
                    "{}: no <tileset> root element",
                    tsx_path.display()
                )))
            }
            _ => {}
        }
    }
}

// -- numeric conversion policy helpers -- //

fn req<'a>(
    attrs: &'a HashMap<String, String>,
    element: &str,
    name: &str,
) -> Result<&'a str, MapError> {
    attrs
        .get(name)
        .map(String::as_str)
        .ok_or_else(|| MapError::Format(format!("<{}> is missing attribute '{}'", element, name)))
}

fn parse_u32(element: &str, name: &str, value: &str) -> Result<u32, MapError> {
    value.trim().parse().map_err(|_| {
        MapError::Format(format!(
            "<{}> attribute '{}' is not an integer: '{}'",
            element, name, value
        ))
    })
}

fn parse_i32(element: &str, name: &str, value: &str) -> Result<i32, MapError> {
    // object coordinates sometimes carry a fractional part; they are
    // integers in this model, so truncate like the original loader did
    let trimmed = value.trim();
    if let Ok(v) = trimmed.parse::<i32>() {
        return Ok(v);
    }
    trimmed
        .parse::<f32>()
        .map(|v| v as i32)
        .map_err(|_| {
            MapError::Format(format!(
                "<{}> attribute '{}' is not a number: '{}'",
                element, name, value
            ))
        })
}

fn opt_u32(
    attrs: &HashMap<String, String>,
    element: &str,
    name: &str,
    default: u32,
) -> Result<u32, MapError> {
    match attrs.get(name) {
        Some(v) => parse_u32(element, name, v),
        None => Ok(default),
    }
}

fn opt_i32(
    attrs: &HashMap<String, String>,
    element: &str,
    name: &str,
    default: i32,
) -> Result<i32, MapError> {
    match attrs.get(name) {
        Some(v) => parse_i32(element, name, v),
        None => Ok(default),
    }
}

fn opt_f32(
    attrs: &HashMap<String, String>,
    element: &str,
    name: &str,
    default: f32,
) -> Result<f32, MapError> {
    match attrs.get(name) {
        Some(v) => v.trim().parse().map_err(|_| {
            MapError::Format(format!(
                "<{}> attribute '{}' is not a number: '{}'",
                element, name, v
            ))
        }),
        None => Ok(default),
    }
}

fn opt_bool01(
    attrs: &HashMap<String, String>,
    element: &str,
    name: &str,
    default: bool,
) -> Result<bool, MapError> {
    match attrs.get(name) {
        Some(v) => {
            let n: i32 = v.trim().parse().map_err(|_| {
                MapError::Format(format!(
                    "<{}> attribute '{}' is not a 0/1 integer: '{}'",
                    element, name, v
                ))
            })?;
            Ok(n != 0)
        }
        None => Ok(default),
    }
}

/// Six hex digits to three byte channels; a leading '#' is tolerated.
fn parse_trans(value: &str) -> Result<ColorKey, MapError> {
    let hex = value.trim().trim_start_matches('#');
    if hex.len() != 6 {
        return Err(MapError::Format(format!(
            "colorkey is not 6 hex digits: '{}'",
            value
        )));
    }
    let byte = |i: usize| {
        u8::from_str_radix(&hex[i..i + 2], 16).map_err(|_| {
            MapError::Format(format!("colorkey is not valid hex: '{}'", value))
        })
    };
    Ok([byte(0)?, byte(2)?, byte(4)?])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tmx::MapLayer;

    const MINIMAL: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<map version="1.0" orientation="orthogonal" width="2" height="2" tilewidth="16" tileheight="16">
 <tileset firstgid="1" name="ground" tilewidth="16" tileheight="16">
  <image source="tiles.png"/>
 </tileset>
 <layer name="floor" width="2" height="2">
  <data encoding="csv">1,2,1,0</data>
 </layer>
 <objectgroup name="triggers">
  <object name="spawn" type="goal" x="3" y="4" width="16" height="16">
   <properties>
    <property name="facing" value="left"/>
   </properties>
  </object>
 </objectgroup>
</map>"#;

    #[test]
    fn parses_map_layers_and_objects() {
        let map = parse_map_str(MINIMAL, Path::new("mem.tmx")).expect("parse");
        assert_eq!(map.width, 2);
        assert_eq!(map.tile_sets.len(), 1);
        assert_eq!(map.tile_sets[0].first_gid, 1);
        assert_eq!(map.layers.len(), 2);
        let layer = map.layer_by_name("floor").expect("layer");
        assert!(matches!(layer.payload, LayerPayload::Encoded { .. }));
        let group = map.object_groups().next().expect("group");
        assert_eq!(group.objects.len(), 1);
        assert_eq!(group.objects[0].properties.get("facing"), Some("left"));
    }

    #[test]
    fn rejects_other_format_versions() {
        let xml = MINIMAL.replace("version=\"1.0\"", "version=\"1.1\"");
        let err = parse_map_str(&xml, Path::new("mem.tmx")).unwrap_err();
        assert!(matches!(err, MapError::UnsupportedVersion { found } if found == "1.1"));
    }

    #[test]
    fn missing_tile_size_is_a_format_error() {
        let xml = MINIMAL.replace(
            "width=\"2\" height=\"2\" tilewidth=\"16\" tileheight=\"16\"",
            "width=\"2\" height=\"2\"",
        );
        let err = parse_map_str(&xml, Path::new("mem.tmx")).unwrap_err();
        assert!(matches!(err, MapError::Format(_)));
    }

    #[test]
    fn bad_object_is_skipped_and_reported() {
        let xml = MINIMAL.replace("x=\"3\"", "x=\"wat\"");
        let map = parse_map_str(&xml, Path::new("mem.tmx")).expect("parse");
        let group = map.object_groups().next().expect("group");
        assert!(group.objects.is_empty());
        assert_eq!(map.object_issues.len(), 1);
        assert_eq!(map.object_issues[0].object, "spawn");
    }

    #[test]
    fn tile_list_payload_collects_gid_children() {
        let xml = MINIMAL.replace(
            r#"<data encoding="csv">1,2,1,0</data>"#,
            r#"<data><tile gid="1"/><tile gid="2"/><tile gid="1"/><tile/></data>"#,
        );
        let map = parse_map_str(&xml, Path::new("mem.tmx")).expect("parse");
        let layer = map.layer_by_name("floor").expect("layer");
        match &layer.payload {
            LayerPayload::TileList(gids) => assert_eq!(gids, &vec![1, 2, 1, 0]),
            other => panic!("expected tile list payload, got {:?}", other),
        }
    }

    #[test]
    fn layer_dimensions_default_to_map_dimensions() {
        let xml = MINIMAL.replace(" width=\"2\" height=\"2\">\n  <data", ">\n  <data");
        let map = parse_map_str(&xml, Path::new("mem.tmx")).expect("parse");
        match &map.layers[0] {
            MapLayer::Grid(l) => {
                assert_eq!((l.width, l.height), (2, 2));
            }
            _ => panic!("expected grid layer"),
        }
    }
}
