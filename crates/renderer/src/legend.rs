//! Legend strip drawn below the map: the palette bar with min/max labels.

use tiny_skia::{Pixmap, PremultipliedColorU8};

use crate::basemap::{hairline, line_paint, stroke_segment};
use crate::color_scale::{ColorScale, Rgba, PALETTE_LEVELS};

const BACKGROUND: Rgba = [32, 32, 32, 255];
const TEXT: Rgba = [240, 240, 240, 255];

/// Minimum strip height for which tick labels are drawn.
const MIN_LABEL_HEIGHT: u32 = 14;

/// Draw the legend into rows `top..top + height` of `pixmap`.
pub fn draw_legend(pixmap: &mut Pixmap, top: u32, height: u32, scale: &ColorScale) {
    let width = pixmap.width();
    if height == 0 || top + height > pixmap.height() {
        return;
    }

    fill_rows(pixmap, top, height, BACKGROUND);

    let margin = (width / 50).max(4);
    if width <= 2 * margin {
        return;
    }
    let pad = (height / 8).max(1);
    let bar_top = top + pad;
    let bar_height = if height >= MIN_LABEL_HEIGHT {
        (height * 2 / 5).max(1)
    } else {
        height.saturating_sub(2 * pad).max(1)
    };
    let bar_left = margin;
    let bar_width = width - 2 * margin;

    let lut = scale.lut();
    let stride = width as usize;
    let pixels = pixmap.pixels_mut();
    for dx in 0..bar_width {
        let level = (dx as usize * PALETTE_LEVELS / bar_width as usize).min(PALETTE_LEVELS - 1);
        let color = premultiplied(lut[level]);
        for y in bar_top..(bar_top + bar_height).min(top + height) {
            pixels[y as usize * stride + (bar_left + dx) as usize] = color;
        }
    }

    if height < MIN_LABEL_HEIGHT {
        return;
    }

    let label_top = bar_top + bar_height + pad;
    let glyph_height = (top + height).saturating_sub(label_top + pad) as f32;
    if glyph_height < 5.0 {
        return;
    }
    let min_label = format_tick(scale.min);
    let max_label = format_tick(scale.max);
    let label_width = text_width(&max_label, glyph_height);

    draw_text(pixmap, bar_left as f32, label_top as f32, &min_label, glyph_height, TEXT);
    draw_text(
        pixmap,
        (bar_left + bar_width) as f32 - label_width,
        label_top as f32,
        &max_label,
        glyph_height,
        TEXT,
    );
}

fn fill_rows(pixmap: &mut Pixmap, top: u32, height: u32, color: Rgba) {
    let stride = pixmap.width() as usize;
    let color = premultiplied(color);
    let start = top as usize * stride;
    let end = (top + height) as usize * stride;
    for px in &mut pixmap.pixels_mut()[start..end] {
        *px = color;
    }
}

pub(crate) fn premultiplied(color: Rgba) -> PremultipliedColorU8 {
    tiny_skia::ColorU8::from_rgba(color[0], color[1], color[2], color[3]).premultiply()
}

/// Tick label text: integers without decimals, otherwise one decimal.
pub fn format_tick(value: f32) -> String {
    let rounded = (value * 10.0).round() / 10.0;
    if rounded.fract() == 0.0 {
        format!("{:.0}", rounded)
    } else {
        format!("{:.1}", rounded)
    }
}

fn glyph_metrics(height: f32) -> (f32, f32) {
    let width = (height * 0.6).floor().max(3.0);
    let spacing = (height * 0.25).ceil().max(1.0);
    (width, spacing)
}

fn text_width(text: &str, height: f32) -> f32 {
    let (w, s) = glyph_metrics(height);
    let n = text.chars().count() as f32;
    (n * (w + s) - s).max(0.0)
}

/// Seven-segment style text with its top-left corner at `(x, y)`.
fn draw_text(pixmap: &mut Pixmap, x: f32, y: f32, text: &str, height: f32, color: Rgba) {
    let (w, s) = glyph_metrics(height);
    let paint = line_paint(color);
    let stroke = hairline();
    let h = height.floor() - 1.0;

    for (i, ch) in text.chars().enumerate() {
        let left = (x + i as f32 * (w + s)).floor() + 0.5;
        let top = y.floor() + 0.5;
        let right = left + w - 1.0;
        let mid = top + (h / 2.0).floor();
        let bottom = top + h;

        for ((x0, y0), (x1, y1)) in glyph_segments(ch, left, right, top, mid, bottom) {
            stroke_segment(pixmap, (x0, y0), (x1, y1), &paint, &stroke);
        }
    }
}

type Segment = ((f32, f32), (f32, f32));

fn glyph_segments(ch: char, l: f32, r: f32, t: f32, m: f32, b: f32) -> Vec<Segment> {
    let cx = ((l + r) / 2.0).floor() + 0.5;
    let top = ((l, t), (r, t));
    let middle = ((l, m), (r, m));
    let bottom = ((l, b), (r, b));
    let upper_left = ((l, t), (l, m));
    let upper_right = ((r, t), (r, m));
    let lower_left = ((l, m), (l, b));
    let lower_right = ((r, m), (r, b));

    match ch {
        '0' => vec![top, bottom, upper_left, lower_left, upper_right, lower_right],
        '1' => vec![((cx, t), (cx, b))],
        '2' => vec![top, upper_right, middle, lower_left, bottom],
        '3' => vec![top, upper_right, middle, lower_right, bottom],
        '4' => vec![upper_left, middle, upper_right, lower_right],
        '5' => vec![top, upper_left, middle, lower_right, bottom],
        '6' => vec![top, upper_left, middle, lower_left, lower_right, bottom],
        '7' => vec![top, upper_right, lower_right],
        '8' => vec![top, middle, bottom, upper_left, lower_left, upper_right, lower_right],
        '9' => vec![top, upper_left, upper_right, middle, lower_right, bottom],
        '-' => vec![middle],
        '.' => vec![((cx, b - 1.0), (cx, b))],
        _ => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scale() -> ColorScale {
        ColorScale::new(-40.0, 50.0, "°C", None, &["#0000ff", "#ff0000"]).unwrap()
    }

    #[test]
    fn test_format_tick() {
        assert_eq!(format_tick(-40.0), "-40");
        assert_eq!(format_tick(1013.25), "1013.3");
        assert_eq!(format_tick(0.04), "0");
    }

    #[test]
    fn test_text_width() {
        assert_eq!(text_width("", 10.0), 0.0);
        // 6 px glyphs, 3 px spacing
        assert_eq!(text_width("50", 10.0), 15.0);
    }

    #[test]
    fn test_legend_bar_spans_palette() {
        let scale = scale();
        let mut pixmap = Pixmap::new(200, 60).unwrap();
        draw_legend(&mut pixmap, 30, 30, &scale);

        let px = |x: u32, y: u32| pixmap.pixel(x, y).unwrap().demultiply();
        // Map area untouched
        assert_eq!(pixmap.pixel(100, 10).unwrap().alpha(), 0);
        // Bar ends use the first and last palette colors
        let bar_y = 30 + 30 / 8 + 1;
        let first = px(4, bar_y);
        let last = px(195, bar_y);
        assert_eq!([first.red(), first.green(), first.blue()], [0, 0, 255]);
        assert_eq!([last.red(), last.green(), last.blue()], [255, 0, 0]);
    }

    #[test]
    fn test_legend_labels_are_drawn() {
        let scale = scale();
        let mut pixmap = Pixmap::new(200, 60).unwrap();
        draw_legend(&mut pixmap, 30, 30, &scale);

        let text_pixels = pixmap
            .pixels()
            .iter()
            .filter(|p| {
                let c = p.demultiply();
                [c.red(), c.green(), c.blue(), c.alpha()] == TEXT
            })
            .count();
        assert!(text_pixels > 20, "only {} label pixels", text_pixels);
    }

    #[test]
    fn test_short_strip_has_no_labels() {
        let scale = scale();
        let mut pixmap = Pixmap::new(100, 20).unwrap();
        draw_legend(&mut pixmap, 10, 10, &scale);
        assert!(pixmap.pixels().iter().all(|p| {
            let c = p.demultiply();
            [c.red(), c.green(), c.blue(), c.alpha()] != TEXT
        }));
    }
}
