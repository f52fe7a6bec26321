use image::DynamicImage;
use img_hash::{HashAlg, Hasher, HasherConfig, ImageHash};

use super::{Descriptor, FeatureExtractor};

/// Gradient perceptual hash over a small thumbnail of the frame, compared by
/// Hamming distance.
pub struct PerceptualHashExtractor {
    hasher: Hasher,
}

impl PerceptualHashExtractor {
    /// `hash_size` is the side of the hash grid; the descriptor holds
    /// `hash_size * hash_size` bits.
    pub fn new(hash_size: u32) -> Self {
        let hasher = HasherConfig::new()
            .hash_alg(HashAlg::Gradient)
            .hash_size(hash_size, hash_size)
            .to_hasher();
        Self { hasher }
    }
}

impl Default for PerceptualHashExtractor {
    fn default() -> Self {
        Self::new(16)
    }
}

impl std::fmt::Debug for PerceptualHashExtractor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PerceptualHashExtractor").finish_non_exhaustive()
    }
}

impl FeatureExtractor for PerceptualHashExtractor {
    fn descriptor(&self, image: &DynamicImage) -> Option<Descriptor> {
        // img_hash links its own `image` version, so hand it raw RGBA.
        let thumbnail = image.thumbnail(64, 64);
        let rgba = thumbnail.to_rgba8();
        let (width, height) = rgba.dimensions();
        if width == 0 || height == 0 {
            return None;
        }

        let frame = img_hash::image::RgbaImage::from_raw(width, height, rgba.into_raw())?;
        let hash = self
            .hasher
            .hash_image(&img_hash::image::DynamicImage::ImageRgba8(frame));

        Some(Descriptor::from_bytes(hash.as_bytes()))
    }

    fn distance(&self, a: &Descriptor, b: &Descriptor) -> f32 {
        match hash_distance(a, b) {
            Some(d) => d as f32,
            None => f32::INFINITY,
        }
    }
}

/// Hamming distance between two hashes, `None` if they cannot be compared.
fn hash_distance(a: &Descriptor, b: &Descriptor) -> Option<u32> {
    // `dist` panics on hashes of different sizes
    if a.len() != b.len() {
        return None;
    }
    let ha = ImageHash::<Box<[u8]>>::from_bytes(a.as_bytes()).ok()?;
    let hb = ImageHash::<Box<[u8]>>::from_bytes(b.as_bytes()).ok()?;
    Some(ha.dist(&hb))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    fn stripes(width: u32, height: u32) -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_fn(width, height, |x, _| {
            if (x / 8) % 2 == 0 {
                Rgb([240, 240, 240])
            } else {
                Rgb([10, 10, 10])
            }
        }))
    }

    #[test]
    fn test_distance_counts_differing_bits() {
        let extractor = PerceptualHashExtractor::default();
        let a = Descriptor::from_bytes(vec![0b1111_0000, 0b1010_1010]);
        let b = Descriptor::from_bytes(vec![0b1111_0000, 0b1010_1010]);
        let c = Descriptor::from_bytes(vec![0b0000_1111, 0b1010_1010]);
        assert_eq!(extractor.distance(&a, &b), 0.0);
        assert_eq!(extractor.distance(&a, &c), 8.0);
        assert_eq!(extractor.distance(&c, &a), 8.0);
    }

    #[test]
    fn test_mirrored_frames_are_apart() {
        let half = |bright_left: bool| {
            DynamicImage::ImageRgb8(RgbImage::from_fn(320, 180, |x, _| {
                if (x < 160) == bright_left {
                    Rgb([250, 250, 250])
                } else {
                    Rgb([5, 5, 5])
                }
            }))
        };
        let extractor = PerceptualHashExtractor::new(16);
        let left = extractor.descriptor(&half(true)).unwrap();
        let right = extractor.descriptor(&half(false)).unwrap();
        assert!(extractor.distance(&left, &right) > 0.0);
    }

    #[test]
    fn test_descriptor_size_and_identity() {
        let extractor = PerceptualHashExtractor::new(16);
        let frame = stripes(320, 180);

        let a = extractor.descriptor(&frame).unwrap();
        let b = extractor.descriptor(&frame).unwrap();

        assert_eq!(a.len(), 32);
        assert_eq!(a, b);
        assert_eq!(extractor.distance(&a, &b), 0.0);
    }

    #[test]
    fn test_mismatched_descriptors_never_match() {
        let extractor = PerceptualHashExtractor::default();
        let a = Descriptor::from_bytes(vec![0u8; 32]);
        let b = Descriptor::from_bytes(vec![0u8; 8]);
        assert!(extractor.distance(&a, &b).is_infinite());
    }
}
