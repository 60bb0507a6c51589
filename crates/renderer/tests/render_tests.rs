//! Rendering decoded and synthetic fields to PNG artifacts.

use chrono::{TimeZone, Utc};
use forecast_common::{BoundingBox, Field, ForecastHour, GridSpec, ScanMode};
use grib2_parser::{decode, FieldCatalog};
use renderer::{
    render, Basemap, ColorScaleTable, Interpolation, MapProjection, MapRenderer, MapStyle,
    PALETTE_LEVELS,
};
use test_utils::fixtures::bbox;
use test_utils::{scratch_dir, surface_file};

fn constant_field(value: f32, hour: u16) -> Field {
    let grid = GridSpec::new(36, 19, 90.0, 0.0, 10.0, 10.0, ScanMode::standard()).unwrap();
    Field::new(
        "t2m",
        "°C",
        "Temperature (2m)",
        Utc.with_ymd_and_hms(2026, 1, 3, 0, 0, 0).unwrap(),
        ForecastHour::new(hour),
        grid,
        vec![value; 36 * 19],
    )
    .unwrap()
}

/// (type, data) of every chunk after the signature.
fn chunks(png: &[u8]) -> Vec<([u8; 4], Vec<u8>)> {
    assert_eq!(&png[..8], &[137, 80, 78, 71, 13, 10, 26, 10]);
    let mut out = Vec::new();
    let mut pos = 8;
    while pos < png.len() {
        let len = u32::from_be_bytes(png[pos..pos + 4].try_into().unwrap()) as usize;
        let kind: [u8; 4] = png[pos + 4..pos + 8].try_into().unwrap();
        out.push((kind, png[pos + 8..pos + 8 + len].to_vec()));
        pos += 12 + len;
    }
    out
}

fn chunk<'a>(chunks: &'a [([u8; 4], Vec<u8>)], kind: &[u8; 4]) -> Option<&'a [u8]> {
    chunks
        .iter()
        .find(|(k, _)| k == kind)
        .map(|(_, data)| data.as_slice())
}

#[test]
fn test_above_max_renders_as_max_color() {
    let scales = ColorScaleTable::builtin().unwrap();
    let t2m = scales.scale_for("t2m").unwrap();
    let projection = MapProjection::global(72, 36).unwrap();
    let renderer = MapRenderer::default();

    let (hot, _, _) = renderer
        .encode(&constant_field(55.0, 6), t2m, &projection)
        .unwrap();
    let (max, _, _) = renderer
        .encode(&constant_field(50.0, 12), t2m, &projection)
        .unwrap();
    assert_eq!(hot, max);

    // Single-color image: the palette holds exactly the max color
    let chunks = chunks(&hot);
    let ihdr = chunk(&chunks, b"IHDR").unwrap();
    assert_eq!(ihdr[9], 3, "expected indexed color type");
    let top = t2m.lut()[PALETTE_LEVELS - 1];
    assert_eq!(chunk(&chunks, b"PLTE").unwrap(), &top[..3]);
}

#[test]
fn test_below_min_renders_as_min_color() {
    let scales = ColorScaleTable::builtin().unwrap();
    let t2m = scales.scale_for("t2m").unwrap();
    let projection = MapProjection::global(36, 18).unwrap();
    let renderer = MapRenderer::default();

    let (cold, _, _) = renderer
        .encode(&constant_field(-75.0, 0), t2m, &projection)
        .unwrap();
    let chunks = chunks(&cold);
    assert_eq!(chunk(&chunks, b"PLTE").unwrap(), &t2m.lut()[0][..3]);
}

#[test]
fn test_render_is_byte_identical() {
    let dir = scratch_dir();
    let file = surface_file((2026, 1, 3, 0), 6);
    let grid_path = dir.path().join("aigfs.t00z.sfc.f006.grib2");
    std::fs::write(&grid_path, &file.bytes).unwrap();
    let decoded = decode(&grid_path, &["t2m"], &FieldCatalog::aigfs()).unwrap();
    let field = decoded.field("t2m").unwrap();

    let scales = ColorScaleTable::builtin().unwrap();
    let projection = MapProjection::global(180, 90).unwrap();
    let renderer = MapRenderer::new(MapStyle {
        graticule_spacing: Some(30.0),
        legend_height: 24,
        ..MapStyle::default()
    });

    let first_path = dir.path().join("a/2026010300/f006/t2m.png");
    let second_path = dir.path().join("b/2026010300/f006/t2m.png");
    let first = renderer
        .render(field, scales.scale_for("t2m").unwrap(), &projection, &first_path)
        .unwrap();
    let second = renderer
        .render(field, scales.scale_for("t2m").unwrap(), &projection, &second_path)
        .unwrap();

    let a = std::fs::read(&first_path).unwrap();
    let b = std::fs::read(&second_path).unwrap();
    assert_eq!(a, b);
    assert_eq!(first.crc32, second.crc32);
    assert_eq!(first.bytes, a.len() as u64);
    assert_eq!(first.crc32, crc32fast::hash(&a));
    assert_eq!((first.width, first.height), (180, 90 + 24));
}

#[test]
fn test_missing_data_is_transparent() {
    let scales = ColorScaleTable::builtin().unwrap();
    let projection = MapProjection::global(36, 18).unwrap();
    let dir = scratch_dir();
    let path = dir.path().join("nan.png");

    let artifact = render(
        &constant_field(f32::NAN, 0),
        scales.scale_for("t2m").unwrap(),
        &projection,
        &path,
    )
    .unwrap();
    let png = std::fs::read(&artifact.path).unwrap();
    let chunks = chunks(&png);
    assert_eq!(chunk(&chunks, b"PLTE").unwrap(), &[0, 0, 0]);
    assert_eq!(chunk(&chunks, b"tRNS").unwrap(), &[0]);
}

#[test]
fn test_regional_map_with_basemap_and_bilinear() {
    let dir = scratch_dir();
    let file = surface_file((2026, 1, 3, 0), 0);
    let grid_path = dir.path().join("f000.grib2");
    std::fs::write(&grid_path, &file.bytes).unwrap();
    let decoded = decode(&grid_path, &["prmsl", "wind10"], &FieldCatalog::aigfs()).unwrap();

    let (min_x, min_y, max_x, max_y) = bbox::PACIFIC;
    let projection = MapProjection::new(
        BoundingBox::new(min_x, min_y, max_x, max_y),
        120,
        200,
        Interpolation::Bilinear,
    )
    .unwrap();
    let basemap = Basemap::from_geojson(
        r#"{"type": "LineString", "coordinates": [[170, -10], [179, 0], [-170, 10]]}"#,
    )
    .unwrap();
    let renderer = MapRenderer::new(MapStyle {
        basemap: Some(basemap),
        legend_height: 20,
        ..MapStyle::default()
    });
    let scales = ColorScaleTable::builtin().unwrap();

    for name in ["prmsl", "wind10"] {
        let path = dir.path().join(format!("{}.png", name));
        let artifact = renderer
            .render(
                decoded.field(name).unwrap(),
                scales.scale_for(name).unwrap(),
                &projection,
                &path,
            )
            .unwrap();
        assert!(path.exists());
        assert_eq!(artifact.height, 220);
        let chunks = chunks(&std::fs::read(&path).unwrap());
        assert!(chunk(&chunks, b"IDAT").is_some());
        assert!(chunk(&chunks, b"tIME").is_none());
    }
}
