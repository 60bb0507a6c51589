//! The shipped map style drawn over a rendered field.

use std::io::Read;
use std::path::{Path, PathBuf};

use chrono::{TimeZone, Utc};
use flate2::read::ZlibDecoder;
use forecast_common::{Field, ForecastHour, GridSpec, ScanMode};
use pipeline::ModelConfig;
use renderer::{ColorScaleTable, MapRenderer, MapStyle};

fn repo_root() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("../..")
}

/// The shipped configuration with its relative paths anchored at the repo root.
fn shipped_config() -> ModelConfig {
    let root = repo_root();
    let mut config = ModelConfig::load(&root.join("config/aigfs.yaml")).unwrap();
    config.map.basemap = config.map.basemap.map(|p| root.join(p));
    config.map.color_scales = config.map.color_scales.map(|p| root.join(p));
    config
}

fn mild_temperature() -> Field {
    let grid = GridSpec::new(36, 19, 90.0, 0.0, 10.0, 10.0, ScanMode::standard()).unwrap();
    Field::new(
        "t2m",
        "°C",
        "Temperature (2m)",
        Utc.with_ymd_and_hms(2026, 1, 3, 0, 0, 0).unwrap(),
        ForecastHour::new(0),
        grid,
        vec![15.0; 36 * 19],
    )
    .unwrap()
}

/// RGBA of every pixel of a PNG written by the renderer (indexed or RGBA,
/// 8-bit, filter 0 on every scanline).
fn decode(png: &[u8]) -> (u32, Vec<[u8; 4]>) {
    let mut pos = 8;
    let (mut width, mut color_type) = (0, 0);
    let (mut palette, mut alpha, mut idat) = (Vec::new(), Vec::new(), Vec::new());
    while pos < png.len() {
        let len = u32::from_be_bytes(png[pos..pos + 4].try_into().unwrap()) as usize;
        let data = &png[pos + 8..pos + 8 + len];
        match &png[pos + 4..pos + 8] {
            b"IHDR" => {
                width = u32::from_be_bytes(data[..4].try_into().unwrap());
                color_type = data[9];
            }
            b"PLTE" => palette = data.chunks(3).map(|c| [c[0], c[1], c[2]]).collect(),
            b"tRNS" => alpha = data.to_vec(),
            b"IDAT" => idat.extend_from_slice(data),
            _ => {}
        }
        pos += 12 + len;
    }

    let mut raw = Vec::new();
    ZlibDecoder::new(idat.as_slice()).read_to_end(&mut raw).unwrap();
    let bytes_per_pixel = if color_type == 3 { 1 } else { 4 };
    let rows: Vec<u8> = raw
        .chunks(width as usize * bytes_per_pixel + 1)
        .flat_map(|row| row[1..].to_vec())
        .collect();
    let pixels = match color_type {
        3 => rows
            .iter()
            .map(|&i| {
                let [r, g, b] = palette[i as usize];
                [r, g, b, alpha.get(i as usize).copied().unwrap_or(255)]
            })
            .collect(),
        6 => rows.chunks(4).map(|c| [c[0], c[1], c[2], c[3]]).collect(),
        other => panic!("unexpected color type {}", other),
    };
    (width, pixels)
}

/// Basemap-colored pixels inside the map area, above the legend strip.
fn basemap_pixels(png: &[u8], style: &MapStyle, map_height: u32) -> Vec<(u32, u32)> {
    let (width, pixels) = decode(png);
    pixels
        .iter()
        .enumerate()
        .map(|(i, px)| ((i as u32) % width, (i as u32) / width, px))
        .filter(|&(_, y, px)| y < map_height && *px == style.basemap_color)
        .map(|(x, y, _)| (x, y))
        .collect()
}

#[test]
fn test_shipped_basemap_is_drawn() {
    let config = shipped_config();
    assert!(config.map.basemap.is_some(), "shipped config has no basemap");

    let style = config.map_style().unwrap();
    let basemap = style.basemap.as_ref().expect("basemap loaded");
    assert!(basemap.lines().len() > 30);

    let projection = config.map_projection().unwrap();
    let scales = config.color_scales().unwrap();
    let scale = scales.scale_for("t2m").unwrap();
    let field = mild_temperature();

    let (png, _, _) = MapRenderer::new(style.clone())
        .encode(&field, scale, &projection)
        .unwrap();
    let drawn = basemap_pixels(&png, &style, projection.height);

    let bare = MapStyle {
        basemap: None,
        ..style.clone()
    };
    let (plain, _, _) = MapRenderer::new(bare).encode(&field, scale, &projection).unwrap();
    assert!(basemap_pixels(&plain, &style, projection.height).is_empty());

    assert!(drawn.len() > 2000, "only {} basemap pixels", drawn.len());
    // Antarctic coast runs along 70°S between the meridian and 15°E
    let (x, y) = projection.to_pixel(7.5, -70.0);
    let (x, y) = (x as u32, y as u32);
    assert!(
        drawn
            .iter()
            .any(|&(px, py)| px == x && py + 2 >= y && py <= y + 2),
        "no coastline near ({}, {})",
        x,
        y
    );
}
