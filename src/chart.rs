//! Bar chart rendering for poll results.
//!
//! Handlers only depend on [`ChartRenderer`]; [`BarChart`] is the default
//! raster implementation on top of the `image` crate, with text set in an
//! embedded DejaVu Sans so labels in any script the font covers come out
//! as written.

use ab_glyph::{Font, FontRef, PxScale, ScaleFont};
use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use image::{ImageFormat, Rgb, RgbImage};
use imageproc::drawing::draw_text_mut;
use std::io::Cursor;
use thiserror::Error;

pub const TITLE_PREFIX_CHARS: usize = 50;

static FONT_DATA: &[u8] = include_bytes!("../assets/fonts/DejaVuSans.ttf");

const PALETTE: [Rgb<u8>; 4] = [
    Rgb([0x4C, 0xAF, 0x50]),
    Rgb([0x21, 0x96, 0xF3]),
    Rgb([0xFF, 0x98, 0x00]),
    Rgb([0xF4, 0x43, 0x36]),
];
const BACKGROUND: Rgb<u8> = Rgb([0xFF, 0xFF, 0xFF]);
const INK: Rgb<u8> = Rgb([0x21, 0x21, 0x21]);
const GRID: Rgb<u8> = Rgb([0xE0, 0xE0, 0xE0]);

const MARGIN_LEFT: u32 = 70;
const MARGIN_RIGHT: u32 = 30;
const MARGIN_TOP: u32 = 70;
const MARGIN_BOTTOM: u32 = 100;
/// Space kept above the tallest bar for its value annotation.
const HEADROOM: u32 = 30;
const Y_TICKS: i64 = 5;

const TITLE_SIZE: f32 = 24.0;
const CAPTION_SIZE: f32 = 18.0;
const VALUE_SIZE: f32 = 18.0;
const LABEL_SIZE: f32 = 14.0;
const TICK_SIZE: f32 = 13.0;
/// Narrower slots skip the per-bar annotations.
const MIN_ANNOTATED_SLOT: f64 = 12.0;

#[derive(Error, Debug)]
pub enum ChartError {
    #[error("chart is too small to draw: {width}x{height}")]
    TooSmall { width: u32, height: u32 },
    #[error("failed to load chart font: {0}")]
    Font(#[from] ab_glyph::InvalidFont),
    #[error("failed to encode PNG: {0}")]
    Encode(#[from] image::ImageError),
}

/// Turns ranked `(label, value)` pairs into PNG bytes.
pub trait ChartRenderer: Send + Sync {
    fn render(&self, title: &str, bars: &[(String, i64)]) -> Result<Vec<u8>, ChartError>;
}

/// `"Poll results: "` plus the first 50 characters of the question and an
/// ellipsis.
pub fn chart_title(question_text: &str) -> String {
    let prefix: String = question_text.chars().take(TITLE_PREFIX_CHARS).collect();
    format!("Poll results: {prefix}...")
}

pub fn png_data_uri(png: &[u8]) -> String {
    format!("data:image/png;base64,{}", BASE64.encode(png))
}

fn load_font() -> Result<FontRef<'static>, ChartError> {
    Ok(FontRef::try_from_slice(FONT_DATA)?)
}

#[derive(Debug, Clone, Copy)]
pub struct BarChart {
    width: u32,
    height: u32,
}

impl Default for BarChart {
    fn default() -> Self {
        Self::new(1000, 600)
    }
}

impl BarChart {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    fn plot_width(&self) -> u32 {
        self.width - MARGIN_LEFT - MARGIN_RIGHT
    }

    fn axis_y(&self) -> u32 {
        self.height - MARGIN_BOTTOM
    }

    fn plot_height(&self) -> u32 {
        self.axis_y() - MARGIN_TOP - HEADROOM
    }

    /// Horizontal room per bar, fractional once bars outnumber pixels.
    fn slot(&self, count: usize) -> f64 {
        f64::from(self.plot_width()) / count.max(1) as f64
    }

    /// Left edge and width of bar `index` out of `count`.
    fn bar_span(&self, index: usize, count: usize) -> (u32, u32) {
        let slot = self.slot(count);
        let bar_width = ((slot * 0.8) as u32).max(1);
        let offset = (slot - f64::from(bar_width)).max(0.0) / 2.0;
        let left = MARGIN_LEFT + (slot * index as f64 + offset) as u32;
        (left, bar_width)
    }

    fn bar_height(&self, value: i64, max: i64) -> u32 {
        if max <= 0 || value <= 0 {
            return 0;
        }
        (value as f64 / max as f64 * f64::from(self.plot_height())).round() as u32
    }
}

impl ChartRenderer for BarChart {
    fn render(&self, title: &str, bars: &[(String, i64)]) -> Result<Vec<u8>, ChartError> {
        if self.width <= MARGIN_LEFT + MARGIN_RIGHT + 10
            || self.height <= MARGIN_TOP + MARGIN_BOTTOM + HEADROOM + 10
        {
            return Err(ChartError::TooSmall {
                width: self.width,
                height: self.height,
            });
        }

        let mut canvas = Canvas::new(self.width, self.height, load_font()?);
        let axis_y = self.axis_y();
        let max = bars.iter().map(|(_, v)| *v).max().unwrap_or(0).max(1);

        let title = canvas.fit(title, TITLE_SIZE, self.width.saturating_sub(20));
        canvas.text_centered(self.width / 2, 20, &title, TITLE_SIZE, INK);

        // Gridlines and y tick labels.
        let step = ((max + Y_TICKS - 1) / Y_TICKS).max(1);
        let mut tick = 0;
        while tick <= max {
            let y = axis_y - self.bar_height(tick, max);
            canvas.fill_rect(MARGIN_LEFT, y, self.plot_width(), 1, GRID);
            let label = tick.to_string();
            let x = MARGIN_LEFT.saturating_sub(canvas.text_width(&label, TICK_SIZE) + 8);
            canvas.text(x, y.saturating_sub(TICK_SIZE as u32 / 2), &label, TICK_SIZE, INK);
            tick = tick.saturating_add(step);
        }

        let annotate = self.slot(bars.len()) >= MIN_ANNOTATED_SLOT;
        for (index, (label, value)) in bars.iter().enumerate() {
            let (left, bar_width) = self.bar_span(index, bars.len());
            let bar_height = self.bar_height(*value, max);
            let color = PALETTE[index % PALETTE.len()];
            canvas.fill_rect(left, axis_y - bar_height, bar_width, bar_height, color);

            if !annotate {
                continue;
            }
            let center = left + bar_width / 2;
            let value_text = value.to_string();
            canvas.text_centered(center, axis_y - bar_height - 24, &value_text, VALUE_SIZE, INK);

            let fitted = canvas.fit(label, LABEL_SIZE, bar_width + bar_width / 4);
            canvas.text_centered(center, axis_y + 10, &fitted, LABEL_SIZE, INK);
        }

        // Axes drawn last so bars never cover them.
        canvas.fill_rect(MARGIN_LEFT, MARGIN_TOP, 2, axis_y - MARGIN_TOP, INK);
        canvas.fill_rect(MARGIN_LEFT, axis_y, self.plot_width(), 2, INK);

        canvas.text_centered(
            MARGIN_LEFT + self.plot_width() / 2,
            self.height - 40,
            "Choices",
            CAPTION_SIZE,
            INK,
        );
        canvas.text(10, MARGIN_TOP - 30, "Votes", CAPTION_SIZE, INK);

        canvas.encode_png()
    }
}

fn to_coord(value: u32) -> i32 {
    i32::try_from(value).unwrap_or(i32::MAX)
}

struct Canvas {
    image: RgbImage,
    font: FontRef<'static>,
}

impl Canvas {
    fn new(width: u32, height: u32, font: FontRef<'static>) -> Self {
        Self {
            image: RgbImage::from_pixel(width, height, BACKGROUND),
            font,
        }
    }

    fn fill_rect(&mut self, x: u32, y: u32, width: u32, height: u32, color: Rgb<u8>) {
        let x_end = x.saturating_add(width).min(self.image.width());
        let y_end = y.saturating_add(height).min(self.image.height());
        for py in y.min(y_end)..y_end {
            for px in x.min(x_end)..x_end {
                self.image.put_pixel(px, py, color);
            }
        }
    }

    /// Advance width of `text` in pixels, kerning included.
    fn text_width(&self, text: &str, size: f32) -> u32 {
        let font = self.font.as_scaled(PxScale::from(size));
        let mut width = 0.0;
        let mut previous = None;
        for c in text.chars() {
            let id = font.glyph_id(c);
            if let Some(previous) = previous {
                width += font.kern(previous, id);
            }
            width += font.h_advance(id);
            previous = Some(id);
        }
        width.ceil() as u32
    }

    /// Shortens `text` with `..` until it fits `max_width` pixels. Empty when
    /// not even the dots fit.
    fn fit(&self, text: &str, size: f32, max_width: u32) -> String {
        if self.text_width(text, size) <= max_width {
            return text.to_string();
        }
        let chars: Vec<char> = text.chars().collect();
        for keep in (0..chars.len()).rev() {
            let mut fitted: String = chars[..keep].iter().collect();
            fitted.push_str("..");
            if self.text_width(&fitted, size) <= max_width {
                return fitted;
            }
        }
        String::new()
    }

    fn text(&mut self, x: u32, y: u32, text: &str, size: f32, color: Rgb<u8>) {
        if text.is_empty() {
            return;
        }
        draw_text_mut(
            &mut self.image,
            color,
            to_coord(x),
            to_coord(y),
            PxScale::from(size),
            &self.font,
            text,
        );
    }

    fn text_centered(&mut self, center_x: u32, y: u32, text: &str, size: f32, color: Rgb<u8>) {
        let x = center_x.saturating_sub(self.text_width(text, size) / 2);
        self.text(x, y, text, size, color);
    }

    fn encode_png(self) -> Result<Vec<u8>, ChartError> {
        let mut buffer = Cursor::new(Vec::new());
        self.image.write_to(&mut buffer, ImageFormat::Png)?;
        Ok(buffer.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bars(values: &[(&str, i64)]) -> Vec<(String, i64)> {
        values.iter().map(|(l, v)| (l.to_string(), *v)).collect()
    }

    fn canvas() -> Canvas {
        Canvas::new(240, 40, load_font().unwrap())
    }

    fn draw(text: &str) -> RgbImage {
        let mut canvas = canvas();
        canvas.text(5, 5, text, LABEL_SIZE, INK);
        canvas.image
    }

    #[test]
    fn title_truncates_to_fifty_chars_with_ellipsis() {
        assert_eq!(chart_title("Color?"), "Poll results: Color?...");

        let long = "x".repeat(80);
        let title = chart_title(&long);
        assert_eq!(title, format!("Poll results: {}...", "x".repeat(50)));
    }

    #[test]
    fn title_truncation_counts_characters_not_bytes() {
        let text = "Ж".repeat(60);
        assert_eq!(chart_title(&text).chars().filter(|c| *c == 'Ж').count(), 50);
    }

    #[test]
    fn data_uri_has_png_prefix() {
        assert_eq!(png_data_uri(b"abc"), "data:image/png;base64,YWJj");
    }

    #[test]
    fn renders_decodable_png_with_bars_in_palette_order() {
        let chart = BarChart::default();
        let png = chart
            .render(&chart_title("Color?"), &bars(&[("Red", 3), ("Blue", 1)]))
            .unwrap();

        assert_eq!(&png[..4], &[0x89, b'P', b'N', b'G']);
        let decoded = image::load_from_memory(&png).unwrap().to_rgb8();
        assert_eq!(decoded.dimensions(), (1000, 600));

        let bar_pixel = |index: usize| {
            let (left, width) = chart.bar_span(index, 2);
            *decoded.get_pixel(left + width / 2, chart.axis_y() - 5)
        };
        assert_eq!(bar_pixel(0), PALETTE[0]);
        assert_eq!(bar_pixel(1), PALETTE[1]);
    }

    #[test]
    fn tallest_bar_fills_plot_height() {
        let chart = BarChart::default();
        assert_eq!(chart.bar_height(3, 3), chart.plot_height());
        assert_eq!(chart.bar_height(0, 3), 0);
        assert!(chart.bar_height(1, 3) < chart.bar_height(2, 3));
    }

    #[test]
    fn renders_without_bars() {
        let png = BarChart::default().render("Poll results: Empty?...", &[]).unwrap();
        assert!(image::load_from_memory(&png).is_ok());
    }

    #[test]
    fn renders_more_bars_than_pixels() {
        let chart = BarChart::default();
        let many: Vec<(String, i64)> = (0..1000).map(|i| (format!("choice {i}"), i % 7)).collect();

        let png = chart.render("Poll results: Many?...", &many).unwrap();
        assert!(image::load_from_memory(&png).is_ok());

        let (first, _) = chart.bar_span(0, many.len());
        let (last, width) = chart.bar_span(many.len() - 1, many.len());
        assert!(first < last);
        assert!(last + width <= MARGIN_LEFT + chart.plot_width());
    }

    #[test]
    fn too_small_canvas_is_an_error() {
        let err = BarChart::new(50, 50).render("tiny", &bars(&[("a", 1)])).unwrap_err();
        assert!(matches!(err, ChartError::TooSmall { .. }));
    }

    #[test]
    fn cyrillic_text_is_drawn_with_real_glyphs() {
        let font = load_font().unwrap();
        assert!("Какой цвет?".chars().all(|c| font.glyph_id(c).0 != 0));

        let cyrillic = draw("Цвет");
        assert!(cyrillic.pixels().any(|p| *p != BACKGROUND));
        assert_ne!(cyrillic, draw("????"));
        assert_ne!(cyrillic, draw("Свет"));
    }

    #[test]
    fn long_labels_are_shortened() {
        let canvas = canvas();
        let fitted = canvas.fit(&"a".repeat(100), LABEL_SIZE, 60);
        assert!(fitted.ends_with(".."));
        assert!(canvas.text_width(&fitted, LABEL_SIZE) <= 60);
        assert_eq!(canvas.fit("Red", LABEL_SIZE, 60), "Red");
        assert_eq!(canvas.fit("Red", LABEL_SIZE, 1), "");
    }
}
