// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Platform bitmaps with one or more scale-factor representations.

use bytes::Bytes;
use image::codecs::png::PngEncoder;
use image::{ExtendedColorType, ImageEncoder, ImageFormat};

use crate::error::{FarProxyError, Result};
use crate::wire::{EncodedRepresentation, ImageWire};

/// One bitmap of an image at a given scale factor. Pixels are RGBA8, row-major.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageRepresentation {
    pub scale_factor: f32,
    pub width: u32,
    pub height: u32,
    pub rgba: Bytes,
}

impl ImageRepresentation {
    pub fn new(scale_factor: f32, width: u32, height: u32, rgba: impl Into<Bytes>) -> Result<Self> {
        let rgba = rgba.into();
        if width == 0 || height == 0 {
            return Err(FarProxyError::InvalidImage(format!(
                "empty bitmap {}x{}",
                width, height
            )));
        }
        if !(scale_factor.is_finite() && scale_factor > 0.0) {
            return Err(FarProxyError::InvalidImage(format!(
                "invalid scale factor {}",
                scale_factor
            )));
        }
        let expected = (width as usize)
            .checked_mul(height as usize)
            .and_then(|pixels| pixels.checked_mul(4))
            .ok_or_else(|| {
                FarProxyError::InvalidImage(format!("bitmap {}x{} is too large", width, height))
            })?;
        if rgba.len() != expected {
            return Err(FarProxyError::InvalidImage(format!(
                "{}x{} RGBA bitmap needs {} bytes, got {}",
                width,
                height,
                expected,
                rgba.len()
            )));
        }
        Ok(Self {
            scale_factor,
            width,
            height,
            rgba,
        })
    }
}

/// An image made of bitmaps at distinct scale factors.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NativeImage {
    representations: Vec<ImageRepresentation>,
}

impl NativeImage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_rgba(scale_factor: f32, width: u32, height: u32, rgba: impl Into<Bytes>) -> Result<Self> {
        let mut image = Self::new();
        image.add_representation(ImageRepresentation::new(scale_factor, width, height, rgba)?)?;
        Ok(image)
    }

    /// Add a bitmap. Each scale factor may appear only once.
    pub fn add_representation(&mut self, representation: ImageRepresentation) -> Result<()> {
        if self.representation(representation.scale_factor).is_some() {
            return Err(FarProxyError::InvalidImage(format!(
                "duplicate representation for scale factor {}",
                representation.scale_factor
            )));
        }
        self.representations.push(representation);
        Ok(())
    }

    pub fn representations(&self) -> &[ImageRepresentation] {
        &self.representations
    }

    pub fn representation(&self, scale_factor: f32) -> Option<&ImageRepresentation> {
        self.representations
            .iter()
            .find(|r| r.scale_factor == scale_factor)
    }

    pub fn is_empty(&self) -> bool {
        self.representations.is_empty()
    }

    /// A single bitmap travels raw; several travel PNG-encoded so no scale
    /// variant is lost.
    pub(crate) fn to_wire(&self) -> Result<ImageWire> {
        if let [only] = self.representations.as_slice() {
            return Ok(ImageWire::Bitmap {
                scale_factor: only.scale_factor,
                width: only.width,
                height: only.height,
                data: only.rgba.clone(),
            });
        }

        let representations = self
            .representations
            .iter()
            .map(|r| -> Result<EncodedRepresentation> {
                Ok(EncodedRepresentation {
                    scale_factor: r.scale_factor,
                    width: r.width,
                    height: r.height,
                    png: encode_png(r)?,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(ImageWire::Encoded { representations })
    }

    pub(crate) fn from_wire(wire: ImageWire) -> Result<Self> {
        let malformed = |e: FarProxyError| FarProxyError::MalformedWire(format!("image: {}", e));
        match wire {
            ImageWire::Bitmap {
                scale_factor,
                width,
                height,
                data,
            } => Self::from_rgba(scale_factor, width, height, data).map_err(malformed),
            ImageWire::Encoded { representations } => {
                let mut image = Self::new();
                for encoded in representations {
                    let representation = decode_png(encoded).map_err(malformed)?;
                    image.add_representation(representation).map_err(malformed)?;
                }
                Ok(image)
            }
        }
    }
}

fn encode_png(representation: &ImageRepresentation) -> Result<Bytes> {
    let mut png = Vec::new();
    PngEncoder::new(&mut png).write_image(
        &representation.rgba,
        representation.width,
        representation.height,
        ExtendedColorType::Rgba8,
    )?;
    Ok(Bytes::from(png))
}

fn decode_png(encoded: EncodedRepresentation) -> Result<ImageRepresentation> {
    let decoded = image::load_from_memory_with_format(&encoded.png, ImageFormat::Png)?.to_rgba8();
    if decoded.width() != encoded.width || decoded.height() != encoded.height {
        return Err(FarProxyError::InvalidImage(format!(
            "declared {}x{} but PNG is {}x{}",
            encoded.width,
            encoded.height,
            decoded.width(),
            decoded.height()
        )));
    }
    ImageRepresentation::new(
        encoded.scale_factor,
        encoded.width,
        encoded.height,
        decoded.into_raw(),
    )
}
