//! On-the-fly image thumbnails.
//!
//! PNG, JPEG and GIF sources are decoded, shrunk to fit the requested box
//! with their aspect ratio intact and re-encoded in their own format. Images
//! that already fit are passed through at their original size.

use std::fs::File;
use std::io::{BufReader, Cursor};

use image::imageops::FilterType;
use image::{ImageFormat, ImageReader};
use tracing::debug;

use super::resolver::PathResolver;
use super::transfer::{sniff_content_type, DownloadablePayload, PayloadStream, TransferError};

/// Formats the renderer can decode and re-encode.
pub const THUMBNAIL_FORMATS: &[ImageFormat] =
    &[ImageFormat::Png, ImageFormat::Jpeg, ImageFormat::Gif];

/// Renders thumbnails of images in the virtual tree.
#[derive(Debug, Clone)]
pub struct ThumbnailRenderer {
    resolver: PathResolver,
}

impl ThumbnailRenderer {
    /// Create a thumbnail renderer.
    pub fn new(resolver: PathResolver) -> Self {
        Self { resolver }
    }

    /// Prepare a thumbnail of `path` fitting within `width` x `height`.
    ///
    /// The content type comes from the source header and is known before
    /// the payload is opened. Decoding happens on open; sources that are
    /// not PNG, JPEG or GIF fail there with
    /// [`TransferError::UnsupportedFormat`].
    pub fn thumbnail(
        &self,
        path: &str,
        width: u32,
        height: u32,
    ) -> Result<DownloadablePayload, TransferError> {
        let real = self.resolver.resolve(path)?;
        if width == 0 || height == 0 {
            return Err(TransferError::InvalidDimensions { width, height });
        }

        if !real.is_file() {
            return Err(TransferError::NotFound(path.to_string()));
        }

        let format = ImageReader::open(&real)?.with_guessed_format()?.format();
        let content_type = match format {
            Some(format) => format.to_mime_type().to_string(),
            None => sniff_content_type(&real)?,
        };

        let filename = real
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        debug!(path, content_type = %content_type, width, height, "Prepared thumbnail");

        Ok(DownloadablePayload::new(content_type, filename, move || {
            let format = match format {
                Some(format) if THUMBNAIL_FORMATS.contains(&format) => format,
                Some(other) => {
                    return Err(TransferError::UnsupportedFormat(format!("{other:?}")))
                }
                None => return Err(TransferError::UnsupportedFormat("unknown".to_string())),
            };

            let reader = BufReader::new(File::open(&real)?);
            let source = ImageReader::with_format(reader, format).decode()?;
            let (thumb_width, thumb_height) =
                fit_within(source.width(), source.height(), width, height);

            let image = if (thumb_width, thumb_height) == (source.width(), source.height()) {
                source
            } else {
                source.resize_exact(thumb_width, thumb_height, FilterType::Nearest)
            };

            let mut bytes = Vec::new();
            image.write_to(&mut Cursor::new(&mut bytes), format)?;
            Ok(PayloadStream::new(Cursor::new(bytes)))
        }))
    }
}

/// Size of a `width` x `height` image scaled down to fit the box.
///
/// One ratio, taken from the more constraining side, scales both
/// dimensions. Images that already fit keep their size; nothing is ever
/// scaled up.
pub fn fit_within(width: u32, height: u32, max_width: u32, max_height: u32) -> (u32, u32) {
    if width <= max_width && height <= max_height {
        return (width, height);
    }

    let ratio = f64::max(
        f64::from(width) / f64::from(max_width),
        f64::from(height) / f64::from(max_height),
    );

    let scale = |side: u32, max: u32| -> u32 {
        let scaled = (f64::from(side) / ratio + 1e-9).floor() as u32;
        scaled.clamp(1, max)
    };

    (scale(width, max_width), scale(height, max_height))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::files::resolver::{SecurityError, VirtualRoot};
    use std::fs;
    use std::io::Read;
    use std::path::Path;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn renderer(dir: &Path) -> ThumbnailRenderer {
        ThumbnailRenderer::new(PathResolver::new(Arc::new(VirtualRoot::new(dir, "/files"))))
    }

    fn render(payload: DownloadablePayload) -> Vec<u8> {
        let mut bytes = Vec::new();
        payload.open().unwrap().read_to_end(&mut bytes).unwrap();
        bytes
    }

    #[test]
    fn test_fit_within_examples() {
        assert_eq!(fit_within(400, 200, 100, 100), (100, 50));
        assert_eq!(fit_within(200, 400, 100, 100), (50, 100));
        assert_eq!(fit_within(300, 100, 100, 100), (100, 33));
        assert_eq!(fit_within(1000, 10, 50, 50), (50, 1));
        assert_eq!(fit_within(50, 40, 100, 100), (50, 40));
        assert_eq!(fit_within(100, 100, 100, 100), (100, 100));
    }

    #[test]
    fn test_fit_within_properties() {
        for (w, h) in [(640, 480), (1920, 1080), (333, 777), (101, 99), (5000, 3), (7, 7000)] {
            for (bw, bh) in [(100, 100), (64, 48), (300, 20), (1, 1)] {
                let (tw, th) = fit_within(w, h, bw, bh);
                if w > bw || h > bh {
                    assert!(tw <= bw && th <= bh, "{w}x{h} in {bw}x{bh} gave {tw}x{th}");
                    // Aspect ratio holds to within one pixel of rounding.
                    let drift = (f64::from(tw) * f64::from(h) - f64::from(th) * f64::from(w)).abs();
                    assert!(drift <= f64::from(w.max(h)), "{w}x{h} -> {tw}x{th}");
                } else {
                    assert_eq!((tw, th), (w, h));
                }
            }
        }
    }

    #[test]
    fn test_png_thumbnail_downscaled() {
        let temp_dir = TempDir::new().unwrap();
        image::RgbImage::new(400, 200).save(temp_dir.path().join("wide.png")).unwrap();

        let payload = renderer(temp_dir.path()).thumbnail("/files/wide.png", 100, 100).unwrap();
        assert_eq!(payload.content_type(), "image/png");
        assert_eq!(payload.filename(), "wide.png");

        let thumb = image::load_from_memory(&render(payload)).unwrap();
        assert_eq!((thumb.width(), thumb.height()), (100, 50));
    }

    #[test]
    fn test_small_image_not_upscaled() {
        let temp_dir = TempDir::new().unwrap();
        image::RgbImage::new(50, 40).save(temp_dir.path().join("small.png")).unwrap();

        let payload = renderer(temp_dir.path()).thumbnail("/files/small.png", 100, 100).unwrap();
        let thumb = image::load_from_memory(&render(payload)).unwrap();
        assert_eq!((thumb.width(), thumb.height()), (50, 40));
    }

    #[test]
    fn test_jpeg_and_gif_keep_their_format() {
        let temp_dir = TempDir::new().unwrap();
        image::RgbImage::new(300, 600).save(temp_dir.path().join("tall.jpg")).unwrap();
        image::RgbaImage::new(90, 30).save(temp_dir.path().join("anim.gif")).unwrap();
        let renderer = renderer(temp_dir.path());

        let jpeg = renderer.thumbnail("/files/tall.jpg", 60, 60).unwrap();
        assert_eq!(jpeg.content_type(), "image/jpeg");
        let bytes = render(jpeg);
        assert_eq!(image::guess_format(&bytes).unwrap(), ImageFormat::Jpeg);
        let thumb = image::load_from_memory(&bytes).unwrap();
        assert_eq!((thumb.width(), thumb.height()), (30, 60));

        let gif = renderer.thumbnail("/files/anim.gif", 45, 45).unwrap();
        assert_eq!(gif.content_type(), "image/gif");
        let bytes = render(gif);
        assert_eq!(image::guess_format(&bytes).unwrap(), ImageFormat::Gif);
        let thumb = image::load_from_memory(&bytes).unwrap();
        assert_eq!((thumb.width(), thumb.height()), (45, 15));
    }

    #[test]
    fn test_unsupported_format_rejected_on_open() {
        let temp_dir = TempDir::new().unwrap();
        image::RgbImage::new(20, 20).save(temp_dir.path().join("legacy.bmp")).unwrap();

        let payload = renderer(temp_dir.path()).thumbnail("/files/legacy.bmp", 10, 10).unwrap();
        // The content type is still known up front.
        assert_eq!(payload.content_type(), "image/bmp");
        assert!(matches!(payload.open(), Err(TransferError::UnsupportedFormat(_))));
    }

    #[test]
    fn test_non_image_rejected_on_open() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(temp_dir.path().join("notes"), "just text").unwrap();

        let payload = renderer(temp_dir.path()).thumbnail("/files/notes", 10, 10).unwrap();
        assert_eq!(payload.content_type(), "text/plain");
        assert!(matches!(payload.open(), Err(TransferError::UnsupportedFormat(_))));
    }

    #[test]
    fn test_thumbnail_errors() {
        let temp_dir = TempDir::new().unwrap();
        let renderer = renderer(temp_dir.path());

        assert!(matches!(
            renderer.thumbnail("/files/x.png", 0, 10),
            Err(TransferError::InvalidDimensions { width: 0, height: 10 })
        ));
        assert!(matches!(
            renderer.thumbnail("/files/missing.png", 10, 10),
            Err(TransferError::NotFound(_))
        ));
        assert!(matches!(
            renderer.thumbnail("/files/../x.png", 10, 10),
            Err(TransferError::Security(SecurityError::PathTraversal(_)))
        ));
    }

    #[test]
    fn test_traversal_checked_before_dimensions() {
        let temp_dir = TempDir::new().unwrap();
        let renderer = renderer(temp_dir.path());

        assert!(matches!(
            renderer.thumbnail("/files/../etc/x.png", 0, 10),
            Err(TransferError::Security(SecurityError::PathTraversal(_)))
        ));
        assert!(matches!(
            renderer.thumbnail("/files/../x.png", 10, 0),
            Err(TransferError::Security(_))
        ));
    }
}
