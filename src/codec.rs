//! The image codec boundary
// (c) 2024 Ross Younger
//!
//! Image decoding and thumbnail generation are not the simulator's business. It hands image bytes
//! to an [`ImageCodec`], which by default is [`StandardCodec`], built on the `image` crate.

use std::{fmt::Debug, io::Cursor};

use anyhow::Context as _;
use image::{DynamicImage, ImageFormat, ImageReader};

/// Basic facts about an image
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ImageMetadata {
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
    /// Short name of the encoding, e.g. `Jpeg`
    pub format: String,
}

/// Image operations the simulator needs from its environment.
///
/// Implementations are called from blocking worker threads, never from async tasks directly.
pub trait ImageCodec: Debug + Send + Sync {
    /// Reports the pixel dimensions of an encoded image without fully decoding it
    fn dimensions(&self, data: &[u8]) -> anyhow::Result<(u32, u32)>;

    /// Fully decodes an encoded image
    fn decode(&self, data: &[u8]) -> anyhow::Result<DynamicImage>;

    /// Produces a JPEG no larger than `max_dimension` on either side
    fn thumbnail(&self, data: &[u8], max_dimension: u32) -> anyhow::Result<Vec<u8>>;

    /// Reads basic metadata from an encoded image
    fn metadata(&self, data: &[u8]) -> anyhow::Result<ImageMetadata>;
}

/// The default [`ImageCodec`], built on the `image` crate
#[derive(Debug, Default, Clone, Copy)]
pub struct StandardCodec;

impl StandardCodec {
    fn reader(data: &[u8]) -> anyhow::Result<ImageReader<Cursor<&[u8]>>> {
        ImageReader::new(Cursor::new(data))
            .with_guessed_format()
            .context("reading image header")
    }
}

impl ImageCodec for StandardCodec {
    fn dimensions(&self, data: &[u8]) -> anyhow::Result<(u32, u32)> {
        Self::reader(data)?
            .into_dimensions()
            .context("reading image dimensions")
    }

    fn decode(&self, data: &[u8]) -> anyhow::Result<DynamicImage> {
        Self::reader(data)?.decode().context("decoding image")
    }

    fn thumbnail(&self, data: &[u8], max_dimension: u32) -> anyhow::Result<Vec<u8>> {
        let image = self.decode(data)?;
        let thumb = if image.width() > max_dimension || image.height() > max_dimension {
            image.thumbnail(max_dimension, max_dimension)
        } else {
            image
        };
        // JPEG has no alpha channel
        let thumb = DynamicImage::ImageRgb8(thumb.to_rgb8());
        let mut out = Vec::new();
        thumb
            .write_to(&mut Cursor::new(&mut out), ImageFormat::Jpeg)
            .context("encoding thumbnail")?;
        Ok(out)
    }

    fn metadata(&self, data: &[u8]) -> anyhow::Result<ImageMetadata> {
        let reader = Self::reader(data)?;
        let format = reader
            .format()
            .map(|f| format!("{f:?}"))
            .context("unrecognised image format")?;
        let (width, height) = reader.into_dimensions().context("reading image dimensions")?;
        Ok(ImageMetadata {
            width,
            height,
            format,
        })
    }
}

/// Test helpers for producing images
#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
pub(crate) mod fixtures {
    use std::{io::Cursor, path::Path};

    use image::{DynamicImage, ImageFormat, RgbImage};

    /// Encodes a solid-colour JPEG of the given size
    pub(crate) fn jpeg(width: u32, height: u32) -> Vec<u8> {
        let image = DynamicImage::ImageRgb8(RgbImage::from_pixel(
            width,
            height,
            image::Rgb([200, 100, 50]),
        ));
        let mut out = Vec::new();
        image
            .write_to(&mut Cursor::new(&mut out), ImageFormat::Jpeg)
            .unwrap();
        out
    }

    /// Writes a solid-colour JPEG to a file
    pub(crate) fn write_jpeg(path: &Path, width: u32, height: u32) {
        std::fs::write(path, jpeg(width, height)).unwrap();
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod test {
    use super::{ImageCodec as _, StandardCodec, fixtures::jpeg};
    use pretty_assertions::assert_eq;

    #[test]
    fn dimensions_and_metadata() {
        let data = jpeg(64, 48);
        assert_eq!(StandardCodec.dimensions(&data).unwrap(), (64, 48));
        let md = StandardCodec.metadata(&data).unwrap();
        assert_eq!((md.width, md.height), (64, 48));
        assert_eq!(md.format, "Jpeg");
    }

    #[test]
    fn thumbnail_is_bounded() {
        let data = jpeg(640, 320);
        let thumb = StandardCodec.thumbnail(&data, 100).unwrap();
        let (w, h) = StandardCodec.dimensions(&thumb).unwrap();
        assert_eq!(w, 100);
        assert!(h <= 100);
    }

    #[test]
    fn small_images_are_not_enlarged() {
        let data = jpeg(40, 30);
        let thumb = StandardCodec.thumbnail(&data, 300).unwrap();
        assert_eq!(StandardCodec.dimensions(&thumb).unwrap(), (40, 30));
    }

    #[test]
    fn garbage_is_an_error() {
        assert!(StandardCodec.dimensions(b"not an image").is_err());
        assert!(StandardCodec.metadata(b"not an image").is_err());
        assert!(StandardCodec.decode(b"").is_err());
    }
}
