//! Word-cloud generation: token frequencies, spiral layout, PNG rasterization.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use base64::{engine::general_purpose::STANDARD, Engine as _};
use once_cell::sync::{Lazy, OnceCell};
use plotters::prelude::*;
use plotters::style::text_anchor::{HPos, Pos, VPos};
use plotters::style::FontStyle;
use regex::Regex;

use crate::error::{AppError, Result};

pub const WIDTH: u32 = 450;
pub const HEIGHT: u32 = 250;
pub const TOP10_FILE: &str = "top10.png";
pub const TOP100_FILE: &str = "top100.png";

const FONT_FAMILY: &str = "sans-serif";
// DejaVu Sans Mono advances 0.6 em per glyph, which the layout relies on.
static FONT: &[u8] = include_bytes!("../assets/DejaVuSansMono.ttf");
static FONT_REGISTRATION: OnceCell<std::result::Result<(), String>> = OnceCell::new();

const MIN_FONT_SIZE: f64 = 4.0;
const FONT_STEP: f64 = 1.0;
const RELATIVE_SCALING: f64 = 0.5;
// Average glyph advance as a fraction of the font size.
const GLYPH_ASPECT: f64 = 0.6;
const PADDING: usize = 1;
// Share of the canvas the estimated glyph boxes may claim at the start size.
const FILL_BUDGET: f64 = 0.5;

static TOKEN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\w[\w']+").expect("Failed to compile token pattern"));

static STOPWORDS: &[&str] = &[
    "a", "about", "above", "after", "again", "against", "all", "also", "am", "an", "and", "any", "are", "as",
    "at", "be", "because", "been", "before", "being", "below", "between", "both", "but", "by", "can", "could",
    "did", "do", "does", "doing", "down", "during", "each", "else", "ever", "few", "for", "from", "further",
    "get", "had", "has", "have", "having", "he", "her", "here", "hers", "herself", "him", "himself", "his",
    "how", "however", "i", "if", "in", "into", "is", "it", "its", "itself", "just", "me", "more", "most", "my",
    "myself", "no", "nor", "not", "of", "off", "on", "once", "only", "or", "other", "otherwise", "ought", "our",
    "ours", "ourselves", "out", "over", "own", "same", "shall", "she", "should", "since", "so", "some", "such",
    "than", "that", "the", "their", "theirs", "them", "themselves", "then", "there", "these", "they", "this",
    "those", "through", "to", "too", "under", "until", "up", "very", "was", "we", "were", "what", "when",
    "where", "which", "while", "who", "whom", "why", "with", "would", "you", "your", "yours", "yourself",
    "yourselves",
];

/// Colour ramps sampled from the matplotlib maps of the same name.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Palette {
    Plasma,
    Greens,
}

impl Palette {
    fn stops(self) -> &'static [(u8, u8, u8)] {
        match self {
            Palette::Plasma => &[(13, 8, 135), (126, 3, 168), (204, 71, 120), (248, 149, 64), (240, 249, 33)],
            Palette::Greens => &[(247, 252, 245), (199, 233, 192), (116, 196, 118), (35, 139, 69), (0, 68, 27)],
        }
    }

    // Portion of the ramp that stays readable on white.
    fn range(self) -> (f64, f64) {
        match self {
            Palette::Plasma => (0.0, 0.8),
            Palette::Greens => (1.0, 0.4),
        }
    }

    /// Colour for a word at position `t` in `[0, 1]` (0 = most frequent).
    pub fn color(self, t: f64) -> (u8, u8, u8) {
        let (start, end) = self.range();
        let t = start + (end - start) * t.clamp(0.0, 1.0);
        let stops = self.stops();
        let scaled = t * (stops.len() - 1) as f64;
        let idx = (scaled.floor() as usize).min(stops.len() - 2);
        let frac = scaled - idx as f64;
        let (a, b) = (stops[idx], stops[idx + 1]);
        let lerp = |x: u8, y: u8| (x as f64 + (y as f64 - x as f64) * frac).round() as u8;
        (lerp(a.0, b.0), lerp(a.1, b.1), lerp(a.2, b.2))
    }
}

#[derive(Clone, Copy, Debug)]
pub struct CloudSpec {
    pub max_words: usize,
    pub width: u32,
    pub height: u32,
    pub palette: Palette,
}

impl CloudSpec {
    pub fn top10() -> Self {
        CloudSpec {
            max_words: 10,
            width: WIDTH,
            height: HEIGHT,
            palette: Palette::Plasma,
        }
    }

    pub fn top100() -> Self {
        CloudSpec {
            max_words: 100,
            width: WIDTH,
            height: HEIGHT,
            palette: Palette::Greens,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct PlacedWord {
    pub text: String,
    pub frequency: usize,
    pub font_size: f64,
    pub x: i32,
    pub y: i32,
    pub width: f64,
    pub height: f64,
    pub color: (u8, u8, u8),
}

/// Counts tokens in the word list, most frequent first.
///
/// Each token is scored on its own (no collocations). Case variants are
/// merged and shown with their most common spelling; ties keep first-seen
/// order.
pub fn frequencies(words: &[String]) -> Vec<(String, usize)> {
    struct Entry {
        first_seen: usize,
        total: usize,
        spellings: HashMap<String, usize>,
    }

    let mut entries: HashMap<String, Entry> = HashMap::new();
    let mut seen = 0usize;

    for word in words {
        for token in TOKEN.find_iter(word) {
            let mut token = token.as_str();
            if let Some(stripped) = token.strip_suffix("'s").or_else(|| token.strip_suffix("'S")) {
                token = stripped;
            }
            let key = token.to_lowercase();
            if key.chars().count() < 2 || STOPWORDS.contains(&key.as_str()) {
                continue;
            }
            let entry = entries.entry(key).or_insert_with(|| {
                seen += 1;
                Entry {
                    first_seen: seen,
                    total: 0,
                    spellings: HashMap::new(),
                }
            });
            entry.total += 1;
            *entry.spellings.entry(token.to_string()).or_insert(0) += 1;
        }
    }

    let mut counted: Vec<(usize, String, usize)> = entries
        .into_values()
        .map(|entry| {
            let display = entry
                .spellings
                .iter()
                .max_by(|a, b| a.1.cmp(b.1).then_with(|| b.0.cmp(a.0)))
                .map(|(s, _)| s.clone())
                .unwrap_or_default();
            (entry.first_seen, display, entry.total)
        })
        .collect();

    counted.sort_by(|a, b| b.2.cmp(&a.2).then(a.0.cmp(&b.0)));
    counted.into_iter().map(|(_, word, n)| (word, n)).collect()
}

fn text_extent(text: &str, font_size: f64) -> (f64, f64) {
    (text.chars().count() as f64 * font_size * GLYPH_ASPECT, font_size)
}

/// Occupied pixels plus their summed-area table, so any rectangle can be
/// tested for overlap in constant time.
struct OccupancyMap {
    width: usize,
    height: usize,
    filled: Vec<bool>,
    integral: Vec<u32>,
}

impl OccupancyMap {
    fn new(width: usize, height: usize) -> Self {
        OccupancyMap {
            width,
            height,
            filled: vec![false; width * height],
            integral: vec![0; (width + 1) * (height + 1)],
        }
    }

    fn filled_in(&self, x: usize, y: usize, w: usize, h: usize) -> u32 {
        let stride = self.width + 1;
        let at = |x: usize, y: usize| self.integral[y * stride + x];
        at(x + w, y + h) + at(x, y) - at(x + w, y) - at(x, y + h)
    }

    /// Free top-left position closest to the canvas centre, if any.
    fn find_slot(&self, w: f64, h: f64) -> Option<(usize, usize)> {
        let (w, h) = (w.ceil() as usize, h.ceil() as usize);
        if w == 0 || h == 0 || w > self.width || h > self.height {
            return None;
        }
        let (cx, cy) = (self.width as f64 / 2.0, self.height as f64 / 2.0);
        let aspect = self.width as f64 / self.height as f64;

        let mut best: Option<((usize, usize), f64)> = None;
        for y in 0..=self.height - h {
            let dy = (y as f64 + h as f64 / 2.0 - cy) * aspect;
            if best.is_some_and(|(_, d)| dy * dy >= d) {
                continue;
            }
            for x in 0..=self.width - w {
                if self.filled_in(x, y, w, h) != 0 {
                    continue;
                }
                let dx = x as f64 + w as f64 / 2.0 - cx;
                let dist = dx * dx + dy * dy;
                if best.is_none_or(|(_, d)| dist < d) {
                    best = Some(((x, y), dist));
                }
            }
        }
        best.map(|(pos, _)| pos)
    }

    fn mark(&mut self, x: usize, y: usize, w: f64, h: f64) {
        let x0 = x.saturating_sub(PADDING);
        let y0 = y.saturating_sub(PADDING);
        let x1 = (x + w.ceil() as usize + PADDING).min(self.width);
        let y1 = (y + h.ceil() as usize + PADDING).min(self.height);
        for row in y0..y1 {
            self.filled[row * self.width + x0..row * self.width + x1].fill(true);
        }

        let stride = self.width + 1;
        for row in 0..self.height {
            let mut run = 0;
            for col in 0..self.width {
                run += self.filled[row * self.width + col] as u32;
                self.integral[(row + 1) * stride + col + 1] = self.integral[row * stride + col + 1] + run;
            }
        }
    }
}

/// Places words in order, carrying a running font size that only shrinks.
///
/// Each word starts from the previous word's size scaled by its relative
/// frequency; a word that does not fit steps the running size down. Once the
/// size falls below the minimum no further word is placed.
fn place_words(words: &[&(String, usize)], spec: &CloudSpec, start_size: f64) -> Vec<PlacedWord> {
    let denom = (words.len().saturating_sub(1)).max(1) as f64;
    let mut occupancy = OccupancyMap::new(spec.width as usize, spec.height as usize);
    let mut placed: Vec<PlacedWord> = Vec::with_capacity(words.len());
    let mut font_size = start_size.floor();
    let mut last_freq = words.first().map(|(_, n)| *n as f64).unwrap_or(1.0);

    for (rank, (text, freq)) in words.iter().enumerate() {
        let freq = *freq as f64;
        if rank > 0 {
            font_size = ((RELATIVE_SCALING * (freq / last_freq) + (1.0 - RELATIVE_SCALING)) * font_size).round();
        }

        let slot = loop {
            if font_size < MIN_FONT_SIZE {
                break None;
            }
            let (w, h) = text_extent(text, font_size);
            if let Some(pos) = occupancy.find_slot(w, h) {
                break Some((pos, w, h));
            }
            font_size -= FONT_STEP;
        };
        let Some(((x, y), w, h)) = slot else {
            break;
        };
        occupancy.mark(x, y, w, h);

        placed.push(PlacedWord {
            text: text.clone(),
            frequency: freq as usize,
            font_size,
            x: x as i32,
            y: y as i32,
            width: w,
            height: h,
            color: spec.palette.color(rank as f64 / denom),
        });
        last_freq = freq;
    }

    placed
}

/// Largest start size at which the words' estimated boxes, shrunk along the
/// same relative-scaling chain as `place_words`, cover `FILL_BUDGET` of the canvas.
fn budget_size(words: &[&(String, usize)], spec: &CloudSpec) -> f64 {
    let mut scale = 1.0;
    let mut last_freq = words.first().map(|(_, n)| *n as f64).unwrap_or(1.0);
    let mut area = 0.0;
    for (rank, (text, freq)) in words.iter().enumerate() {
        let freq = *freq as f64;
        if rank > 0 {
            scale *= RELATIVE_SCALING * (freq / last_freq) + (1.0 - RELATIVE_SCALING);
        }
        let (w, h) = text_extent(text, scale);
        area += w * h;
        last_freq = freq;
    }
    if area <= 0.0 {
        return spec.height as f64;
    }
    (FILL_BUDGET * spec.width as f64 * spec.height as f64 / area).sqrt()
}

/// Positions up to `spec.max_words` words without overlap.
///
/// The starting size comes from a trial run with the two most frequent
/// words at canvas height (harmonic mean of their fitted sizes), capped so
/// the whole vocabulary has room; glyph size then follows frequency with
/// relative scaling 0.5.
pub fn layout(freqs: &[(String, usize)], spec: &CloudSpec) -> Vec<PlacedWord> {
    let words: Vec<&(String, usize)> = freqs.iter().filter(|(_, n)| *n > 0).take(spec.max_words).collect();
    if words.is_empty() {
        return Vec::new();
    }

    let trial = place_words(&words[..words.len().min(2)], spec, spec.height as f64);
    let start_size = match trial.as_slice() {
        [a, b, ..] => 2.0 * a.font_size * b.font_size / (a.font_size + b.font_size),
        [a] => a.font_size,
        [] => return Vec::new(),
    };

    place_words(&words, spec, start_size.min(budget_size(&words, spec)))
}

fn image_error<E: std::fmt::Display>(err: E) -> AppError {
    AppError::ImageError(err.to_string())
}

/// Registers the bundled font with plotters; the first outcome sticks.
fn register_font() -> Result<()> {
    FONT_REGISTRATION
        .get_or_init(|| {
            plotters::style::register_font(FONT_FAMILY, FontStyle::Normal, FONT)
                .map_err(|_| "bundled font could not be loaded".to_string())
        })
        .clone()
        .map_err(AppError::ImageError)
}

/// Rasterizes a layout onto a white canvas and writes it as PNG.
pub fn render(placed: &[PlacedWord], spec: &CloudSpec, path: &Path) -> Result<()> {
    register_font()?;
    let root = BitMapBackend::new(path, (spec.width, spec.height)).into_drawing_area();
    root.fill(&WHITE).map_err(image_error)?;

    for word in placed {
        let (r, g, b) = word.color;
        let style = (FONT_FAMILY, word.font_size)
            .into_font()
            .color(&RGBColor(r, g, b))
            .pos(Pos::new(HPos::Left, VPos::Top));
        root.draw_text(&word.text, &style, (word.x, word.y)).map_err(image_error)?;
    }

    root.present().map_err(image_error)?;
    Ok(())
}

/// A PNG held in memory, ready to embed as a data URI.
#[derive(Clone, Debug, PartialEq)]
pub struct EncodedImage {
    pub mime: &'static str,
    pub base64: String,
}

impl EncodedImage {
    pub fn png(bytes: &[u8]) -> Self {
        EncodedImage {
            mime: "image/png",
            base64: STANDARD.encode(bytes),
        }
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path)
            .map_err(|e| AppError::ImageError(format!("cannot read {}: {}", path.display(), e)))?;
        Ok(Self::png(&bytes))
    }

    pub fn data_uri(&self) -> String {
        format!("data:{};base64,{}", self.mime, self.base64)
    }
}

/// Lays out, renders and writes one cloud, returning the encoded file.
pub fn generate(words: &[String], spec: &CloudSpec, path: &Path) -> Result<EncodedImage> {
    let freqs = frequencies(words);
    let placed = layout(&freqs, spec);
    render(&placed, spec, path)?;
    tracing::info!(
        path = %path.display(),
        words = placed.len(),
        vocabulary = freqs.len(),
        "Word cloud written"
    );
    EncodedImage::from_file(path)
}

#[derive(Clone, Debug)]
pub struct WordClouds {
    pub top10: EncodedImage,
    pub top100: EncodedImage,
}

/// Writes `top10.png` and `top100.png` into `dir`, which must already exist.
pub fn generate_all(words: &[String], dir: &Path) -> Result<WordClouds> {
    let top10_path: PathBuf = dir.join(TOP10_FILE);
    let top100_path: PathBuf = dir.join(TOP100_FILE);

    Ok(WordClouds {
        top10: generate(words, &CloudSpec::top10(), &top10_path)?,
        top100: generate(words, &CloudSpec::top100(), &top100_path)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn words(list: &[&str]) -> Vec<String> {
        list.iter().map(|w| w.to_string()).collect()
    }

    #[test]
    fn test_frequencies_count_each_word_independently() {
        let freqs = frequencies(&words(&["data", "science", "data", "ml"]));
        assert_eq!(
            freqs,
            vec![("data".to_string(), 2), ("science".to_string(), 1), ("ml".to_string(), 1)]
        );
    }

    #[test]
    fn test_frequencies_drop_stopwords_and_merge_case() {
        let freqs = frequencies(&words(&["The", "Python", "python", "python's", "a", "x", "of"]));
        assert_eq!(freqs, vec![("python".to_string(), 3)]);
    }

    #[test]
    fn test_most_frequent_word_gets_largest_glyph() {
        let freqs = frequencies(&words(&["data", "science", "data", "ml"]));
        let placed = layout(&freqs, &CloudSpec::top10());

        assert_eq!(placed.len(), 3);
        let size = |w: &str| placed.iter().find(|p| p.text == w).unwrap().font_size;
        assert!(size("data") > size("science"));
        assert!(size("data") > size("ml"));
        assert_eq!(size("science"), size("ml"));
    }

    #[test]
    fn test_layout_respects_cap_and_canvas() {
        let list: Vec<String> = (0..40).map(|i| format!("word{:02}", i)).collect();
        let spec = CloudSpec::top10();
        let placed = layout(&frequencies(&list), &spec);

        assert!(placed.len() <= 10);
        for (i, a) in placed.iter().enumerate() {
            assert!(a.x >= 0 && a.y >= 0);
            assert!(a.x as f64 + a.width <= spec.width as f64 + 1.0);
            assert!(a.y as f64 + a.height <= spec.height as f64 + 1.0);
            for b in &placed[i + 1..] {
                let apart_x = a.x as f64 + a.width <= b.x as f64 || b.x as f64 + b.width <= a.x as f64;
                let apart_y = a.y as f64 + a.height <= b.y as f64 || b.y as f64 + b.height <= a.y as f64;
                assert!(apart_x || apart_y, "{} overlaps {}", a.text, b.text);
            }
        }
    }

    #[test]
    fn test_flat_vocabulary_fills_the_hundred_word_cloud() {
        let list: Vec<String> = (0..100).map(|i| format!("term{:02}", i)).collect();
        let freqs = frequencies(&list);
        assert_eq!(freqs.len(), 100);

        let placed = layout(&freqs, &CloudSpec::top100());
        assert!(placed.len() > 90, "only {} of 100 words placed", placed.len());
        assert!(placed.windows(2).all(|w| w[0].font_size >= w[1].font_size));
        assert!(placed.iter().all(|p| p.font_size >= MIN_FONT_SIZE));

        let top10 = layout(&freqs, &CloudSpec::top10());
        assert!(placed.len() > top10.len() * 5);
    }

    #[test]
    fn test_skewed_vocabulary_keeps_rank_order_in_size() {
        let mut list = Vec::new();
        for i in 0..80 {
            for _ in 0..(80 - i) / 8 + 1 {
                list.push(format!("topic{:02}", i));
            }
        }
        let placed = layout(&frequencies(&list), &CloudSpec::top100());

        assert!(placed.len() > 60, "only {} of 80 words placed", placed.len());
        assert_eq!(placed[0].text, "topic00");
        assert!(placed.windows(2).all(|w| w[0].font_size >= w[1].font_size));
    }

    #[test]
    fn test_font_registration_is_repeatable() {
        register_font().unwrap();
        register_font().unwrap();
        assert!(FONT_REGISTRATION.get().is_some_and(|outcome| outcome.is_ok()));
    }

    #[test]
    fn test_empty_word_list_lays_out_nothing() {
        assert!(layout(&frequencies(&[]), &CloudSpec::top100()).is_empty());
    }

    #[test]
    fn test_empty_word_list_still_produces_png() {
        let dir = tempfile::tempdir().unwrap();
        let clouds = generate_all(&[], dir.path()).unwrap();

        assert!(dir.path().join(TOP10_FILE).exists());
        assert!(dir.path().join(TOP100_FILE).exists());
        assert!(clouds.top10.data_uri().starts_with("data:image/png;base64,"));
        assert_ne!(clouds.top10.base64, "");
    }

    #[test]
    fn test_missing_directory_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope");
        let err = generate_all(&[], &missing).unwrap_err();
        assert!(matches!(err, AppError::ImageError(_)));
    }

    #[test]
    fn test_palette_endpoints() {
        assert_eq!(Palette::Plasma.color(0.0), (13, 8, 135));
        assert_eq!(Palette::Greens.color(0.0), (0, 68, 27));
    }
}
