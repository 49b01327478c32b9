use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use image::{imageops::FilterType, DynamicImage, ImageFormat};
use tempfile::TempDir;

/// Down-scaled JPEG copies of a request's images.
///
/// The copies live in a private temp directory that is removed when this
/// value is dropped, which also happens when the owning future is cancelled.
pub struct ScaledImages {
    dir: Option<TempDir>,
    paths: Vec<PathBuf>,
}

impl ScaledImages {
    pub fn empty() -> Self {
        Self {
            dir: None,
            paths: Vec::new(),
        }
    }

    pub fn paths(&self) -> &[PathBuf] {
        &self.paths
    }

    pub fn dir(&self) -> Option<&Path> {
        self.dir.as_ref().map(TempDir::path)
    }
}

/// Write a copy of every source no taller than `max_height` pixels, JPEG encoded.
pub async fn prepare_images(sources: &[PathBuf], max_height: u32) -> Result<ScaledImages> {
    if sources.is_empty() {
        return Ok(ScaledImages::empty());
    }

    let sources = sources.to_vec();
    tokio::task::spawn_blocking(move || {
        let dir = tempfile::Builder::new()
            .prefix("cardflow-frames-")
            .tempdir()
            .context("failed to create temp dir for scaled images")?;

        let mut paths = Vec::with_capacity(sources.len());
        for (idx, source) in sources.iter().enumerate() {
            let dest = dir.path().join(format!("frame-{idx:03}.jpg"));
            scale_to_jpeg(source, &dest, max_height)?;
            paths.push(dest);
        }

        Ok(ScaledImages {
            dir: Some(dir),
            paths,
        })
    })
    .await
    .context("image scaling worker join failed")?
}

fn scale_to_jpeg(source: &Path, dest: &Path, max_height: u32) -> Result<()> {
    let img = image::open(source)
        .with_context(|| format!("failed to decode image {}", source.display()))?;

    let img = if img.height() > max_height {
        let width = (u64::from(img.width()) * u64::from(max_height) / u64::from(img.height())).max(1);
        img.resize_exact(width as u32, max_height, FilterType::Triangle)
    } else {
        img
    };

    // JPEG has no alpha channel.
    DynamicImage::ImageRgb8(img.to_rgb8())
        .save_with_format(dest, ImageFormat::Jpeg)
        .with_context(|| format!("failed to write scaled image {}", dest.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::RgbaImage;

    #[tokio::test]
    async fn scales_tall_images_and_cleans_up_on_drop() {
        let fixtures = tempfile::tempdir().unwrap();
        let tall = fixtures.path().join("tall.png");
        let small = fixtures.path().join("small.png");
        RgbaImage::new(200, 1440).save(&tall).unwrap();
        RgbaImage::new(64, 48).save(&small).unwrap();

        let scaled = prepare_images(&[tall, small], 720).await.unwrap();
        assert_eq!(scaled.paths().len(), 2);
        assert_eq!(image::image_dimensions(&scaled.paths()[0]).unwrap(), (100, 720));
        assert_eq!(image::image_dimensions(&scaled.paths()[1]).unwrap(), (64, 48));

        let dir = scaled.dir().unwrap().to_path_buf();
        assert!(dir.exists());
        drop(scaled);
        assert!(!dir.exists());
    }

    #[tokio::test]
    async fn unreadable_source_is_an_error() {
        let fixtures = tempfile::tempdir().unwrap();
        let bogus = fixtures.path().join("bogus.png");
        std::fs::write(&bogus, b"not an image").unwrap();
        assert!(prepare_images(&[bogus], 720).await.is_err());
    }

    #[tokio::test]
    async fn no_images_needs_no_directory() {
        let scaled = prepare_images(&[], 720).await.unwrap();
        assert!(scaled.paths().is_empty());
        assert!(scaled.dir().is_none());
    }
}
