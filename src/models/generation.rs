use image::RgbaImage;
use rand::Rng;

use crate::config::GenerationSettings;

/// Parameters for a single engine call. Built right before the call and
/// discarded once the result is on screen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationRequest {
    pub prompt: String,
    pub image_count: u32,
    pub step_count: u32,
    pub seed: u64,
    pub safety_enabled: bool,
}

impl GenerationRequest {
    /// Build a request from the configured settings with a freshly drawn seed.
    ///
    /// The prompt is passed through untouched; an empty prompt is valid.
    pub fn new<R: Rng + ?Sized>(prompt: &str, settings: &GenerationSettings, rng: &mut R) -> Self {
        Self {
            prompt: prompt.to_owned(),
            image_count: settings.image_count,
            step_count: settings.step_count,
            seed: settings.seed_range().sample(rng),
            safety_enabled: settings.safety_enabled,
        }
    }
}

/// Inclusive range the per-request seed is drawn from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeedRange {
    pub min: u64,
    pub max: u64,
}

impl SeedRange {
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> u64 {
        if self.min >= self.max {
            return self.min;
        }
        rng.random_range(self.min..=self.max)
    }

    #[cfg(test)]
    pub fn contains(&self, seed: u64) -> bool {
        (self.min..=self.max).contains(&seed)
    }
}

/// Decoded RGBA image produced by the engine.
#[derive(Debug, Clone, PartialEq)]
pub struct GeneratedImage {
    pixels: RgbaImage,
}

impl GeneratedImage {
    pub fn new(pixels: RgbaImage) -> Self {
        Self { pixels }
    }

    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    pub fn height(&self) -> u32 {
        self.pixels.height()
    }

    pub fn pixels(&self) -> &RgbaImage {
        &self.pixels
    }
}

/// Ordered engine output. Entries are `None` when the engine filtered or
/// failed to produce that image.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GenerationResult {
    pub entries: Vec<Option<GeneratedImage>>,
}

impl GenerationResult {
    pub fn new(entries: Vec<Option<GeneratedImage>>) -> Self {
        Self { entries }
    }

    /// Number of absent entries.
    pub fn absent_count(&self) -> usize {
        self.entries.iter().filter(|e| e.is_none()).count()
    }

    /// Keep the present images in their original relative order and report
    /// how many entries were absent.
    pub fn into_present(self) -> (Vec<GeneratedImage>, usize) {
        let total = self.entries.len();
        let images: Vec<GeneratedImage> = self.entries.into_iter().flatten().collect();
        let dropped = total - images.len();
        (images, dropped)
    }
}
