//! Adaptive image compression for uploaded documents
//!
//! Images are decoded, flattened onto a white background, and re-encoded as
//! JPEG at decreasing quality until the encoding fits the target ceiling or
//! the quality floor is reached. The floor encoding is returned even when it
//! is still above the ceiling; a readable image matters more than the budget.
//!
//! Every trial is a full encode, which is the expensive part, so the number
//! of trials is bounded by the quality grid: `(start - floor) / step + 1`
//! encodes for the linear search (18 with the defaults), or about
//! `log2` of that for the binary search.
//!
//! # Examples
//!
//! ```rust,no_run
//! use admissions_intake::storage::processing::ImageCompressor;
//!
//! # fn example(bytes: &[u8]) -> Result<(), Box<dyn std::error::Error>> {
//! let compressor = ImageCompressor::new(5 * 1024);
//! let outcome = compressor.compress(bytes)?;
//! println!(
//!     "{} -> {} bytes at quality {}",
//!     outcome.original_size, outcome.final_size, outcome.quality
//! );
//! # Ok(())
//! # }
//! ```

use image::{codecs::jpeg::JpegEncoder, DynamicImage, ImageReader, Rgb, RgbImage};
use serde::{Deserialize, Serialize};
use std::io::Cursor;
use thiserror::Error;

/// Default target ceiling (5 KiB)
pub const DEFAULT_TARGET_BYTES: u64 = 5 * 1024;

/// Quality of the first trial encode
pub const DEFAULT_START_QUALITY: u8 = 95;

/// Quality decrement between trials
pub const DEFAULT_QUALITY_STEP: u8 = 5;

/// Lowest quality ever tried
pub const DEFAULT_MIN_QUALITY: u8 = 10;

/// Why an image could not be compressed
///
/// None of these fail an upload: the caller stores the original bytes.
#[derive(Debug, Error)]
pub enum CompressionError {
    /// The bytes could not be decoded as an image
    #[error("Unsupported image: {0}")]
    UnsupportedImage(String),

    /// Decoding worked but re-encoding failed
    #[error("Failed to encode image at quality {quality}: {reason}")]
    EncodeFailed {
        /// Quality of the failing trial
        quality: u8,
        /// Encoder message
        reason: String,
    },

    /// The blocking compression task panicked or was cancelled
    #[error("Compression task failed: {0}")]
    TaskFailed(String),
}

/// Order in which qualities are tried
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QualitySearch {
    /// Walk down from the start quality one step at a time
    #[default]
    Linear,
    /// Bisect the quality grid for the highest quality that fits
    Binary,
}

/// One trial encode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Trial {
    /// JPEG quality used
    pub quality: u8,
    /// Encoded length in bytes
    pub size: usize,
    /// Length of the encoding kept after this trial
    pub kept_size: usize,
}

/// Result of a successful compression run
#[derive(Debug, Clone)]
pub struct CompressionOutcome {
    /// The encoded JPEG that was kept
    pub data: Vec<u8>,
    /// Length of the input in bytes
    pub original_size: u64,
    /// Length of `data` in bytes
    pub final_size: u64,
    /// Quality `data` was encoded at
    pub quality: u8,
    /// Every trial in the order it ran
    pub trials: Vec<Trial>,
    /// Whether `final_size` is within the target ceiling
    pub reached_target: bool,
}

/// Iterative JPEG re-encoder with a byte ceiling
#[derive(Debug, Clone)]
pub struct ImageCompressor {
    target_bytes: u64,
    start_quality: u8,
    quality_step: u8,
    min_quality: u8,
    search: QualitySearch,
}

impl Default for ImageCompressor {
    fn default() -> Self {
        Self::new(DEFAULT_TARGET_BYTES)
    }
}

impl ImageCompressor {
    /// Creates a compressor for the given ceiling with the default quality grid
    ///
    /// # Examples
    ///
    /// ```rust
    /// use admissions_intake::storage::processing::ImageCompressor;
    ///
    /// let compressor = ImageCompressor::new(5 * 1024);
    /// assert_eq!(compressor.max_trials(), 18);
    /// ```
    #[must_use]
    pub const fn new(target_bytes: u64) -> Self {
        Self {
            target_bytes,
            start_quality: DEFAULT_START_QUALITY,
            quality_step: DEFAULT_QUALITY_STEP,
            min_quality: DEFAULT_MIN_QUALITY,
            search: QualitySearch::Linear,
        }
    }

    /// Overrides the quality grid
    ///
    /// Qualities are clamped to `1..=100`, the step to at least 1, and the
    /// floor to at most the start.
    #[must_use]
    pub fn with_quality_range(mut self, start: u8, step: u8, min: u8) -> Self {
        self.start_quality = start.clamp(1, 100);
        self.min_quality = min.clamp(1, self.start_quality);
        self.quality_step = step.max(1);
        self
    }

    /// Selects the search strategy
    #[must_use]
    pub const fn with_search(mut self, search: QualitySearch) -> Self {
        self.search = search;
        self
    }

    /// The configured ceiling in bytes
    #[must_use]
    pub const fn target_bytes(&self) -> u64 {
        self.target_bytes
    }

    /// The qualities a run may try, highest first, always ending at the floor
    #[must_use]
    pub fn quality_grid(&self) -> Vec<u8> {
        let mut grid = Vec::new();
        let mut quality = self.start_quality;
        while quality > self.min_quality {
            grid.push(quality);
            quality = quality.saturating_sub(self.quality_step);
        }
        grid.push(self.min_quality);
        grid
    }

    /// Upper bound on the number of encodes a single run performs
    #[must_use]
    pub fn max_trials(&self) -> usize {
        let grid = self.quality_grid().len();
        match self.search {
            QualitySearch::Linear => grid,
            QualitySearch::Binary => (usize::BITS - grid.leading_zeros()) as usize,
        }
    }

    /// Compresses `data` towards the target ceiling
    ///
    /// # Errors
    ///
    /// Returns `CompressionError::UnsupportedImage` when `data` does not
    /// decode, and `CompressionError::EncodeFailed` when a trial encode fails.
    pub fn compress(&self, data: &[u8]) -> Result<CompressionOutcome, CompressionError> {
        let image = Self::load_image(data)?;
        let rgb = flatten_to_rgb(&image);
        let grid = self.quality_grid();

        let mut run = Run::new(self.target_bytes);
        match self.search {
            QualitySearch::Linear => {
                for &quality in &grid {
                    if run.encode(&rgb, quality)? {
                        break;
                    }
                }
            }
            QualitySearch::Binary => {
                // When nothing fits, the last trial is always the floor
                let (mut lo, mut hi) = (0_usize, grid.len() - 1);
                while lo <= hi {
                    let mid = lo + (hi - lo) / 2;
                    if run.encode(&rgb, grid[mid])? {
                        if mid == 0 {
                            break;
                        }
                        hi = mid - 1;
                    } else {
                        lo = mid + 1;
                    }
                }
            }
        }

        tracing::debug!(
            trials = run.trials.len(),
            quality = run.best_quality,
            final_size = run.best.len(),
            target = self.target_bytes,
            "image compression finished"
        );

        let final_size = run.best.len() as u64;
        Ok(CompressionOutcome {
            original_size: data.len() as u64,
            final_size,
            quality: run.best_quality,
            reached_target: final_size <= self.target_bytes,
            trials: run.trials,
            data: run.best,
        })
    }

    /// Decodes an image, guessing the format from its content
    fn load_image(data: &[u8]) -> Result<DynamicImage, CompressionError> {
        let reader = ImageReader::new(Cursor::new(data))
            .with_guessed_format()
            .map_err(|e| CompressionError::UnsupportedImage(format!("Failed to read image: {e}")))?;

        reader
            .decode()
            .map_err(|e| CompressionError::UnsupportedImage(format!("Failed to decode image: {e}")))
    }
}

/// Trial bookkeeping
///
/// A fitting encode beats a non-fitting one, a higher quality beats a lower
/// one among fitting encodes, and a smaller size wins among non-fitting ones.
/// On the linear walk this makes the kept size non-increasing.
struct Run {
    target: u64,
    best: Vec<u8>,
    best_quality: u8,
    best_fits: bool,
    trials: Vec<Trial>,
}

impl Run {
    const fn new(target: u64) -> Self {
        Self {
            target,
            best: Vec::new(),
            best_quality: 0,
            best_fits: false,
            trials: Vec::new(),
        }
    }

    /// Encodes at `quality`; returns whether the encoding fits the target
    fn encode(&mut self, image: &RgbImage, quality: u8) -> Result<bool, CompressionError> {
        let data = encode_jpeg(image, quality)?;
        let size = data.len();
        tracing::trace!(quality, size, "trial encode");

        let fits = size as u64 <= self.target;
        let keep = self.best.is_empty()
            || match (fits, self.best_fits) {
                (true, false) => true,
                (false, true) => false,
                (true, true) => quality > self.best_quality,
                (false, false) => size < self.best.len(),
            };
        if keep {
            self.best = data;
            self.best_quality = quality;
            self.best_fits = fits;
        }
        self.trials.push(Trial {
            quality,
            size,
            kept_size: self.best.len(),
        });
        Ok(fits)
    }
}

/// Encodes an RGB image as baseline JPEG
fn encode_jpeg(image: &RgbImage, quality: u8) -> Result<Vec<u8>, CompressionError> {
    let mut buffer = Vec::new();
    JpegEncoder::new_with_quality(&mut buffer, quality)
        .encode_image(image)
        .map_err(|e| CompressionError::EncodeFailed {
            quality,
            reason: e.to_string(),
        })?;
    Ok(buffer)
}

/// Converts any color model to 8-bit RGB, compositing alpha over white
fn flatten_to_rgb(image: &DynamicImage) -> RgbImage {
    if !image.color().has_alpha() {
        return image.to_rgb8();
    }

    let rgba = image.to_rgba8();
    RgbImage::from_fn(rgba.width(), rgba.height(), |x, y| {
        let [r, g, b, a] = rgba.get_pixel(x, y).0;
        let alpha = u16::from(a);
        let blend = |c: u8| -> u8 {
            let mixed = (u16::from(c) * alpha + 255 * (255 - alpha) + 127) / 255;
            u8::try_from(mixed).unwrap_or(u8::MAX)
        };
        Rgb([blend(r), blend(g), blend(b)])
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageBuffer, ImageFormat, Luma, LumaA, Rgba};

    /// High-frequency test pattern that JPEG cannot squeeze much
    fn noisy_rgb(width: u32, height: u32) -> RgbImage {
        ImageBuffer::from_fn(width, height, |x, y| {
            let v = x.wrapping_mul(7919) ^ y.wrapping_mul(104_729) ^ (x * y);
            Rgb([(v % 251) as u8, (v / 7 % 253) as u8, (v / 13 % 241) as u8])
        })
    }

    fn encode(image: DynamicImage, format: ImageFormat) -> Vec<u8> {
        let mut buffer = Vec::new();
        image.write_to(&mut Cursor::new(&mut buffer), format).unwrap();
        buffer
    }

    fn noisy_png(width: u32, height: u32) -> Vec<u8> {
        encode(DynamicImage::ImageRgb8(noisy_rgb(width, height)), ImageFormat::Png)
    }

    #[test]
    fn test_quality_grid_defaults() {
        let compressor = ImageCompressor::default();
        let grid = compressor.quality_grid();
        assert_eq!(grid.len(), 18);
        assert_eq!(grid.first(), Some(&95));
        assert_eq!(grid.last(), Some(&10));
        assert!(grid.windows(2).all(|w| w[0] - w[1] == 5));
    }

    #[test]
    fn test_quality_grid_ends_on_floor_when_step_overshoots() {
        let compressor = ImageCompressor::new(1).with_quality_range(90, 25, 20);
        assert_eq!(compressor.quality_grid(), vec![90, 65, 40, 20]);
    }

    #[test]
    fn test_max_trials() {
        assert_eq!(ImageCompressor::default().max_trials(), 18);
        assert_eq!(
            ImageCompressor::default()
                .with_search(QualitySearch::Binary)
                .max_trials(),
            5
        );
    }

    #[test]
    fn test_stops_at_first_fit() {
        let data = noisy_png(32, 32);
        let outcome = ImageCompressor::new(u64::MAX).compress(&data).unwrap();

        assert_eq!(outcome.trials.len(), 1);
        assert_eq!(outcome.quality, 95);
        assert!(outcome.reached_target);
        assert_eq!(outcome.original_size, data.len() as u64);
    }

    #[test]
    fn test_unreachable_target_returns_floor_encoding() {
        let data = noisy_png(96, 96);
        let outcome = ImageCompressor::new(1).compress(&data).unwrap();

        assert_eq!(outcome.trials.len(), 18);
        assert!(!outcome.reached_target);
        let smallest = outcome.trials.iter().map(|t| t.size).min().unwrap();
        assert_eq!(outcome.final_size, smallest as u64);
        assert_eq!(outcome.final_size, outcome.data.len() as u64);
        // The output is still a decodable image
        assert!(image::load_from_memory(&outcome.data).is_ok());
    }

    #[test]
    fn test_trials_walk_down_the_grid() {
        let data = noisy_png(64, 64);
        let outcome = ImageCompressor::new(1).compress(&data).unwrap();
        let qualities: Vec<u8> = outcome.trials.iter().map(|t| t.quality).collect();
        assert_eq!(qualities, ImageCompressor::default().quality_grid());
    }

    #[test]
    fn test_binary_search_is_bounded() {
        let data = noisy_png(64, 64);
        let compressor = ImageCompressor::new(1).with_search(QualitySearch::Binary);
        let outcome = compressor.compress(&data).unwrap();

        assert!(outcome.trials.len() <= compressor.max_trials());
        assert_eq!(outcome.quality, 10);
    }

    #[test]
    fn test_binary_search_takes_first_quality_when_everything_fits() {
        let data = noisy_png(16, 16);
        let outcome = ImageCompressor::new(u64::MAX)
            .with_search(QualitySearch::Binary)
            .compress(&data)
            .unwrap();

        assert_eq!(outcome.quality, 95);
        assert!(outcome.reached_target);
        assert!(outcome.trials.len() <= 5);
    }

    #[test]
    fn test_binary_and_linear_agree_on_fitting_quality() {
        let data = noisy_png(48, 48);
        // A ceiling equal to the quality-50 encoding is reachable by both searches
        let unbounded = ImageCompressor::new(1).compress(&data).unwrap();
        let ceiling = unbounded.trials[9].size as u64;

        let linear = ImageCompressor::new(ceiling).compress(&data).unwrap();
        let binary = ImageCompressor::new(ceiling)
            .with_search(QualitySearch::Binary)
            .compress(&data)
            .unwrap();

        assert!(linear.reached_target);
        assert!(binary.reached_target);
        assert!(linear.quality >= 50);
        assert!(linear.final_size <= ceiling);
        assert!(binary.final_size <= ceiling);
        assert!(binary.trials.len() <= 5);
    }

    #[test]
    fn test_kept_size_never_grows_during_linear_walk() {
        let data = noisy_png(80, 80);
        let outcome = ImageCompressor::new(1).compress(&data).unwrap();

        // Nothing fits a 1-byte ceiling, so every quality on the grid is tried
        assert_eq!(outcome.trials.len(), 18);
        assert!(outcome
            .trials
            .windows(2)
            .all(|w| w[1].kept_size <= w[0].kept_size));
        for trial in &outcome.trials {
            assert!(trial.kept_size <= trial.size);
        }

        let smallest = outcome.trials.iter().map(|t| t.size).min().unwrap();
        assert_eq!(outcome.trials.last().unwrap().kept_size as u64, outcome.final_size);
        assert_eq!(outcome.final_size, smallest as u64);
        assert_eq!(outcome.data.len() as u64, outcome.final_size);
    }

    #[test]
    fn test_alpha_is_flattened_onto_white() {
        let transparent: ImageBuffer<Rgba<u8>, Vec<u8>> =
            ImageBuffer::from_pixel(8, 8, Rgba([0, 0, 0, 0]));
        let rgb = flatten_to_rgb(&DynamicImage::ImageRgba8(transparent));
        assert!(rgb.pixels().all(|p| p.0 == [255, 255, 255]));

        let opaque: ImageBuffer<Rgba<u8>, Vec<u8>> =
            ImageBuffer::from_pixel(2, 2, Rgba([10, 20, 30, 255]));
        let rgb = flatten_to_rgb(&DynamicImage::ImageRgba8(opaque));
        assert!(rgb.pixels().all(|p| p.0 == [10, 20, 30]));
    }

    #[test]
    fn test_grey_and_grey_alpha_become_rgb() {
        let grey: ImageBuffer<Luma<u8>, Vec<u8>> = ImageBuffer::from_pixel(4, 4, Luma([100]));
        assert_eq!(flatten_to_rgb(&DynamicImage::ImageLuma8(grey)).get_pixel(0, 0).0, [100, 100, 100]);

        let grey_alpha: ImageBuffer<LumaA<u8>, Vec<u8>> =
            ImageBuffer::from_pixel(4, 4, LumaA([0, 0]));
        assert_eq!(
            flatten_to_rgb(&DynamicImage::ImageLumaA8(grey_alpha)).get_pixel(1, 1).0,
            [255, 255, 255]
        );
    }

    #[test]
    fn test_transparent_png_compresses_to_jpeg() {
        let rgba: ImageBuffer<Rgba<u8>, Vec<u8>> = ImageBuffer::from_fn(40, 40, |x, y| {
            Rgba([(x * 6) as u8, (y * 6) as u8, 128, if (x + y) % 2 == 0 { 0 } else { 255 }])
        });
        let data = encode(DynamicImage::ImageRgba8(rgba), ImageFormat::Png);

        let outcome = ImageCompressor::default().compress(&data).unwrap();
        assert_eq!(infer::get(&outcome.data).map(|k| k.mime_type()), Some("image/jpeg"));
    }

    #[test]
    fn test_invalid_image() {
        let result = ImageCompressor::default().compress(b"not an image");
        assert!(matches!(result, Err(CompressionError::UnsupportedImage(_))));
    }

    #[test]
    fn test_truncated_image() {
        let mut data = noisy_png(32, 32);
        data.truncate(data.len() / 2);
        let result = ImageCompressor::default().compress(&data);
        assert!(matches!(result, Err(CompressionError::UnsupportedImage(_))));
    }
}
