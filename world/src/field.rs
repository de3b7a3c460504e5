//! Walkable occupancy field derived from a static map image.

use std::{
    collections::VecDeque,
    sync::{Arc, Mutex, PoisonError},
};

use crowd_sim_core::{FieldDimensions, PixelCoord, Position};
use image::RgbImage;
use rand::{seq::index, Rng};
use thiserror::Error;
use tracing::{debug, info};

use crate::{color::Lab, morphology};

/// Parameters controlling how a map image becomes a walkable field.
#[derive(Clone, Debug, PartialEq)]
pub struct FieldConfig {
    /// Colour of the walkable path in the source image.
    pub target_rgb: [u8; 3],
    /// Maximum CIELAB distance from the target colour that still counts as walkable.
    pub tolerance: f32,
    /// Edge length of the square used for the closing pass.
    pub close_size: u32,
    /// Edge length of the square used for the opening pass.
    pub open_size: u32,
    /// Largest window radius searched when snapping onto the field.
    pub snap_radius: u32,
    /// Growth of the snap window radius between attempts.
    pub snap_step: u32,
    /// Number of walkable pixels averaged by [`WalkableField::cluster_origin`].
    pub cluster_sample: usize,
    /// Number of distinct margins whose filtered pixel sets stay cached.
    pub margin_cache_capacity: usize,
}

impl Default for FieldConfig {
    fn default() -> Self {
        Self {
            target_rgb: [0, 200, 0],
            tolerance: 35.0,
            close_size: 5,
            open_size: 3,
            snap_radius: 80,
            snap_step: 4,
            cluster_sample: 500,
            margin_cache_capacity: 8,
        }
    }
}

/// Reasons a walkable field cannot be constructed.
#[derive(Debug, Error)]
pub enum FieldError {
    /// The source bytes are not a decodable image.
    #[error("failed to decode map image")]
    Decode(#[from] image::ImageError),
    /// No pixel survived classification and filtering.
    #[error("map contains no walkable pixels")]
    NoWalkableArea,
    /// A precomputed mask does not match the declared dimensions.
    #[error("mask holds {actual} cells but a {width}x{height} field needs {expected}")]
    MaskSize {
        /// Declared field width.
        width: u32,
        /// Declared field height.
        height: u32,
        /// Number of cells required by the dimensions.
        expected: usize,
        /// Number of cells supplied.
        actual: usize,
    },
}

/// Immutable boolean grid marking the pixels agents may occupy.
#[derive(Debug)]
pub struct WalkableField {
    width: u32,
    height: u32,
    mask: Vec<bool>,
    walkable: Arc<[PixelCoord]>,
    snap_radius: u32,
    snap_step: u32,
    cluster_sample: usize,
    margins: Mutex<MarginCache>,
}

impl WalkableField {
    /// Decodes an encoded image and derives the walkable field from it.
    pub fn from_image_bytes(bytes: &[u8], config: &FieldConfig) -> Result<Self, FieldError> {
        let image = image::load_from_memory(bytes)?.to_rgb8();
        Self::from_rgb_image(&image, config)
    }

    /// Classifies every pixel by colour distance, then closes and opens the mask.
    pub fn from_rgb_image(image: &RgbImage, config: &FieldConfig) -> Result<Self, FieldError> {
        let (width, height) = image.dimensions();
        let target = Lab::from_srgb(config.target_rgb);
        let classified: Vec<bool> = image
            .pixels()
            .map(|pixel| Lab::from_srgb(pixel.0).distance(target) <= config.tolerance)
            .collect();

        let columns = usize::try_from(width).unwrap_or(0);
        let rows = usize::try_from(height).unwrap_or(0);
        let closed = morphology::close(&classified, columns, rows, config.close_size);
        let opened = morphology::open(&closed, columns, rows, config.open_size);

        debug!(
            raw = classified.iter().filter(|cell| **cell).count(),
            filtered = opened.iter().filter(|cell| **cell).count(),
            "classified map pixels"
        );
        Self::from_mask(width, height, opened, config)
    }

    /// Wraps a precomputed row-major mask without further filtering.
    pub fn from_mask(
        width: u32,
        height: u32,
        mask: Vec<bool>,
        config: &FieldConfig,
    ) -> Result<Self, FieldError> {
        let expected = usize::try_from(u64::from(width) * u64::from(height)).unwrap_or(usize::MAX);
        if mask.len() != expected {
            return Err(FieldError::MaskSize {
                width,
                height,
                expected,
                actual: mask.len(),
            });
        }

        let walkable: Arc<[PixelCoord]> = mask
            .iter()
            .enumerate()
            .filter(|(_, walkable)| **walkable)
            .map(|(index, _)| {
                let index = index as u64;
                let width = u64::from(width);
                PixelCoord::new((index % width) as u32, (index / width) as u32)
            })
            .collect();
        if walkable.is_empty() {
            return Err(FieldError::NoWalkableArea);
        }

        info!(width, height, walkable = walkable.len(), "walkable field ready");
        Ok(Self {
            width,
            height,
            mask,
            walkable,
            snap_radius: config.snap_radius,
            snap_step: config.snap_step.max(1),
            cluster_sample: config.cluster_sample.max(1),
            margins: Mutex::new(MarginCache::new(config.margin_cache_capacity)),
        })
    }

    /// Width and height of the field.
    #[must_use]
    pub fn dimensions(&self) -> FieldDimensions {
        FieldDimensions::new(self.width, self.height)
    }

    /// Number of walkable pixels.
    #[must_use]
    pub fn walkable_count(&self) -> usize {
        self.walkable.len()
    }

    /// Reports whether the pixel lies inside the grid and is walkable.
    #[must_use]
    pub fn is_walkable_pixel(&self, pixel: PixelCoord) -> bool {
        if pixel.x() >= self.width || pixel.y() >= self.height {
            return false;
        }
        let index = u64::from(pixel.y()) * u64::from(self.width) + u64::from(pixel.x());
        usize::try_from(index)
            .ok()
            .and_then(|index| self.mask.get(index).copied())
            .unwrap_or(false)
    }

    /// Reports whether the pixel containing the position is walkable.
    #[must_use]
    pub fn is_walkable(&self, position: Position) -> bool {
        if !(position.x >= 0.0 && position.y >= 0.0) {
            return false;
        }
        if position.x >= self.width as f32 || position.y >= self.height as f32 {
            return false;
        }
        self.is_walkable_pixel(PixelCoord::new(position.x as u32, position.y as u32))
    }

    /// Uniformly samples a walkable pixel at least `margin` pixels from every edge.
    ///
    /// Falls back to the whole walkable set when no pixel honours the margin.
    pub fn random_walkable_point<R>(&self, margin: u32, rng: &mut R) -> PixelCoord
    where
        R: Rng + ?Sized,
    {
        let filtered = self.with_margin(margin);
        let pool = if filtered.is_empty() {
            &self.walkable
        } else {
            &filtered
        };
        pool[rng.gen_range(0..pool.len())]
    }

    /// Mean position of a random sample of walkable pixels.
    ///
    /// A cheap anchor for "where the paths are", not a density mode.
    pub fn cluster_origin<R>(&self, rng: &mut R) -> Position
    where
        R: Rng + ?Sized,
    {
        let amount = self.cluster_sample.min(self.walkable.len());
        let (sum_x, sum_y) = index::sample(rng, self.walkable.len(), amount)
            .into_iter()
            .map(|index| self.walkable[index])
            .fold((0.0_f64, 0.0_f64), |(x, y), pixel| {
                (x + f64::from(pixel.x()), y + f64::from(pixel.y()))
            });
        let count = amount as f64;
        Position::new((sum_x / count) as f32, (sum_y / count) as f32)
    }

    /// Snaps the position onto the field using the configured search radius.
    pub fn snap_to_walkable<R>(&self, position: Position, rng: &mut R) -> Position
    where
        R: Rng + ?Sized,
    {
        self.snap_within(position, self.snap_radius, rng)
    }

    /// Returns the position unchanged when walkable, otherwise the walkable
    /// pixel nearest to it inside the first non-empty expanding window.
    ///
    /// Windows are squares centred on the rounded position whose radius grows
    /// by the configured step up to `max_radius`. When every window is empty
    /// a uniformly random walkable pixel is returned instead.
    pub fn snap_within<R>(&self, position: Position, max_radius: u32, rng: &mut R) -> Position
    where
        R: Rng + ?Sized,
    {
        if self.is_walkable(position) {
            return position;
        }

        let center = (
            f64::from(position.x).round() as i64,
            f64::from(position.y).round() as i64,
        );
        let mut radius = self.snap_step.min(max_radius);
        loop {
            if let Some(pixel) = self.nearest_in_window(center, i64::from(radius), position) {
                return pixel.into();
            }
            if radius >= max_radius {
                break;
            }
            radius = radius.saturating_add(self.snap_step).min(max_radius);
        }

        debug!(x = position.x, y = position.y, "snap window empty; relocating randomly");
        self.random_walkable_point(0, rng).into()
    }

    fn nearest_in_window(
        &self,
        (center_x, center_y): (i64, i64),
        radius: i64,
        origin: Position,
    ) -> Option<PixelCoord> {
        let max_x = i64::from(self.width) - 1;
        let max_y = i64::from(self.height) - 1;
        let (left, right) = ((center_x - radius).max(0), (center_x + radius).min(max_x));
        let (top, bottom) = ((center_y - radius).max(0), (center_y + radius).min(max_y));
        if left > right || top > bottom {
            return None;
        }

        let mut best: Option<(f64, PixelCoord)> = None;
        for y in top..=bottom {
            for x in left..=right {
                let pixel = PixelCoord::new(x as u32, y as u32);
                if !self.is_walkable_pixel(pixel) {
                    continue;
                }
                let dx = x as f64 - f64::from(origin.x);
                let dy = y as f64 - f64::from(origin.y);
                let distance = dx * dx + dy * dy;
                if best.map_or(true, |(current, _)| distance < current) {
                    best = Some((distance, pixel));
                }
            }
        }
        best.map(|(_, pixel)| pixel)
    }

    fn with_margin(&self, margin: u32) -> Arc<[PixelCoord]> {
        if margin == 0 {
            return Arc::clone(&self.walkable);
        }

        let mut cache = self.margins.lock().unwrap_or_else(PoisonError::into_inner);
        cache.get_or_insert_with(margin, || {
            let margin = u64::from(margin);
            let (width, height) = (u64::from(self.width), u64::from(self.height));
            self.walkable
                .iter()
                .copied()
                .filter(|pixel| {
                    let (x, y) = (u64::from(pixel.x()), u64::from(pixel.y()));
                    x >= margin && y >= margin && x + margin < width && y + margin < height
                })
                .collect()
        })
    }
}

/// Least-recently-used cache of margin-filtered walkable pixels.
#[derive(Debug)]
struct MarginCache {
    capacity: usize,
    entries: VecDeque<(u32, Arc<[PixelCoord]>)>,
}

impl MarginCache {
    fn new(capacity: usize) -> Self {
        Self {
            capacity,
            entries: VecDeque::with_capacity(capacity),
        }
    }

    fn get_or_insert_with(
        &mut self,
        margin: u32,
        compute: impl FnOnce() -> Arc<[PixelCoord]>,
    ) -> Arc<[PixelCoord]> {
        if let Some(position) = self.entries.iter().position(|(key, _)| *key == margin) {
            if let Some(entry) = self.entries.remove(position) {
                let pixels = Arc::clone(&entry.1);
                self.entries.push_back(entry);
                return pixels;
            }
        }

        let pixels = compute();
        if self.capacity == 0 {
            return pixels;
        }
        while self.entries.len() >= self.capacity {
            let _ = self.entries.pop_front();
        }
        self.entries.push_back((margin, Arc::clone(&pixels)));
        pixels
    }

    #[cfg(test)]
    fn margins(&self) -> Vec<u32> {
        self.entries.iter().map(|(margin, _)| *margin).collect()
    }
}
