use std::io::Cursor;
use std::path::Path;

use ab_glyph::{FontArc, PxScale};
use anyhow::{Context, Result};
use async_trait::async_trait;
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_hollow_rect_mut, draw_text_mut, text_size};
use imageproc::rect::Rect;
use tracing::debug;

use crate::config::SnapshotConfig;
use crate::sheets::Records;

pub const PLACEHOLDER_HEADER: &str = "Status";
pub const PLACEHOLDER_VALUE: &str = "No data";

const MARGIN: u32 = 10;
const CELL_PADDING: u32 = 6;
const ELLIPSIS: char = '…';

const BACKGROUND: Rgb<u8> = Rgb([255, 255, 255]);
const HEADER_FILL: Rgb<u8> = Rgb([225, 229, 235]);
const GRID: Rgb<u8> = Rgb([120, 120, 120]);
const TEXT: Rgb<u8> = Rgb([20, 20, 20]);

/// DejaVu Sans, shipped with the binary so rendering does not depend on host fonts
const EMBEDDED_FONT: &[u8] = include_bytes!("../assets/fonts/DejaVuSans.ttf");

/// The rows that end up in the snapshot image
#[derive(Debug, Clone, PartialEq)]
pub struct StatusTable {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl StatusTable {
    /// An empty status tab becomes a single placeholder row; anything longer
    /// than `max_rows` keeps only its first `max_rows` rows.
    pub fn from_records(records: Records, max_rows: usize) -> Self {
        if records.is_empty() {
            return Self::placeholder();
        }
        let mut rows = records.rows;
        rows.truncate(max_rows);
        Self {
            headers: records.headers,
            rows,
        }
    }

    pub fn placeholder() -> Self {
        Self {
            headers: vec![PLACEHOLDER_HEADER.to_string()],
            rows: vec![vec![PLACEHOLDER_VALUE.to_string()]],
        }
    }

    fn column_count(&self) -> usize {
        self.rows
            .iter()
            .map(Vec::len)
            .chain(std::iter::once(self.headers.len()))
            .max()
            .unwrap_or(0)
            .max(1)
    }
}

/// Turns a status table into an encoded image
#[async_trait]
pub trait SnapshotRenderer: Send + Sync {
    async fn render(&self, table: &StatusTable) -> Result<Vec<u8>>;
}

#[derive(Debug, Clone, Copy)]
struct Layout {
    width: u32,
    row_height: u32,
}

/// Fixed width, one row height per line plus the header, no axes.
fn canvas_size(layout: Layout, row_count: usize) -> (u32, u32) {
    let lines = row_count as u32 + 1;
    (layout.width, lines * layout.row_height + 2 * MARGIN)
}

/// Renders the table to PNG. The font is loaded once at construction.
pub struct PngRenderer {
    font: FontArc,
    layout: Layout,
}

impl PngRenderer {
    /// Uses `font_path` when configured, the embedded DejaVu Sans otherwise.
    pub fn new(config: &SnapshotConfig) -> Result<Self> {
        let font = match &config.font_path {
            Some(path) => load_font_file(path)?,
            None => FontArc::try_from_slice(EMBEDDED_FONT)
                .map_err(|e| anyhow::anyhow!("Invalid embedded font: {}", e))?,
        };
        Ok(Self {
            font,
            layout: Layout {
                width: config.width,
                row_height: config.row_height,
            },
        })
    }
}

fn load_font_file(path: &Path) -> Result<FontArc> {
    let bytes = std::fs::read(path)
        .with_context(|| format!("Failed to read font: {}", path.display()))?;
    FontArc::try_from_vec(bytes).map_err(|e| anyhow::anyhow!("Invalid font {}: {}", path.display(), e))
}

#[async_trait]
impl SnapshotRenderer for PngRenderer {
    async fn render(&self, table: &StatusTable) -> Result<Vec<u8>> {
        let font = self.font.clone();
        let table = table.clone();
        let layout = self.layout;

        // CPU-bound, keep it off the async workers
        tokio::task::spawn_blocking(move || render_png(&font, &table, layout))
            .await
            .context("Snapshot render task failed")?
    }
}

fn render_png(font: &FontArc, table: &StatusTable, layout: Layout) -> Result<Vec<u8>> {
    let (width, height) = canvas_size(layout, table.rows.len());
    if width <= 2 * MARGIN || layout.row_height == 0 {
        anyhow::bail!("Snapshot layout too small: {}x{}", width, layout.row_height);
    }

    let columns = table.column_count() as u32;
    let col_width = (width - 2 * MARGIN) / columns;
    if col_width == 0 {
        anyhow::bail!("Too many columns for snapshot width: {}", columns);
    }
    let scale = PxScale::from(layout.row_height as f32 * 0.5);

    let mut img = RgbImage::from_pixel(width, height, BACKGROUND);

    draw_filled_rect_mut(
        &mut img,
        Rect::at(MARGIN as i32, MARGIN as i32).of_size(col_width * columns, layout.row_height),
        HEADER_FILL,
    );

    let lines = std::iter::once(&table.headers).chain(table.rows.iter());
    for (line_idx, line) in lines.enumerate() {
        let y = MARGIN + line_idx as u32 * layout.row_height;
        for col in 0..columns {
            let x = MARGIN + col * col_width;
            draw_hollow_rect_mut(
                &mut img,
                Rect::at(x as i32, y as i32).of_size(col_width, layout.row_height),
                GRID,
            );

            let cell = line.get(col as usize).map(String::as_str).unwrap_or("");
            let text = fit_text(font, scale, cell, col_width.saturating_sub(2 * CELL_PADDING));
            if text.is_empty() {
                continue;
            }
            let (_, text_height) = text_size(scale, font, &text);
            let text_y = y + layout.row_height.saturating_sub(text_height) / 2;
            draw_text_mut(
                &mut img,
                TEXT,
                (x + CELL_PADDING) as i32,
                text_y as i32,
                scale,
                font,
                &text,
            );
        }
    }

    let mut buf = Cursor::new(Vec::new());
    DynamicImage::ImageRgb8(img)
        .write_to(&mut buf, ImageFormat::Png)
        .context("Failed to encode snapshot PNG")?;

    debug!(
        "Rendered snapshot {}x{} ({} rows, {} bytes)",
        width,
        height,
        table.rows.len(),
        buf.get_ref().len()
    );
    Ok(buf.into_inner())
}

/// Shorten `text` with a trailing ellipsis until it fits in `max_width` pixels.
fn fit_text(font: &FontArc, scale: PxScale, text: &str, max_width: u32) -> String {
    let text = text.trim();
    if text_size(scale, font, text).0 <= max_width {
        return text.to_string();
    }
    let mut chars: Vec<char> = text.chars().collect();
    while !chars.is_empty() {
        chars.pop();
        let candidate: String = chars.iter().chain(std::iter::once(&ELLIPSIS)).collect();
        if text_size(scale, font, &candidate).0 <= max_width {
            return candidate;
        }
    }
    String::new()
}
