//! In-memory image fixtures.

#![allow(dead_code)]

use std::io::Cursor;

use image::{DynamicImage, ImageFormat, Rgb, RgbImage};

/// Deterministic pattern; different `seed`s give different bytes.
pub fn pattern(width: u32, height: u32, seed: u8) -> DynamicImage {
    DynamicImage::ImageRgb8(RgbImage::from_fn(width, height, |x, y| {
        Rgb([
            seed,
            ((x * 255) / width.max(1)) as u8,
            ((y * 255) / height.max(1)) as u8,
        ])
    }))
}

pub fn encode(image: &DynamicImage, format: ImageFormat) -> Vec<u8> {
    let mut buf = Cursor::new(Vec::new());
    image
        .write_to(&mut buf, format)
        .expect("Failed to encode fixture");
    buf.into_inner()
}

pub fn png(width: u32, height: u32, seed: u8) -> Vec<u8> {
    encode(&pattern(width, height, seed), ImageFormat::Png)
}

pub fn jpeg(width: u32, height: u32, seed: u8) -> Vec<u8> {
    encode(&pattern(width, height, seed), ImageFormat::Jpeg)
}

pub fn corrupt() -> Vec<u8> {
    let mut bytes = png(16, 16, 1);
    bytes.truncate(24);
    bytes
}
