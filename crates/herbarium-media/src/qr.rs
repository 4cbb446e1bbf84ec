//! QR Artifact Generator.
//!
//! The artifact is a PNG data URL of a QR symbol whose content is the JSON
//! form of [`QrPayload`]. It is always rebuilt from the whole record.

use std::io::Cursor;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use herbarium_shared::constants::{QR_DARK_RGB, QR_LIGHT_RGB, QR_MARGIN_MODULES, QR_SIZE_PX};
use herbarium_shared::SpecimenRecord;
use image::{ImageFormat, Rgb, RgbImage};
use qrcode::{Color, EcLevel, QrCode};
use serde::{Deserialize, Serialize};

use crate::error::MediaError;

/// Public-facing content embedded in the QR symbol.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QrPayload {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub catalog_number: Option<String>,
    pub scientific_name: String,
    pub family: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub locality: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recorded_by: Option<String>,
    pub image: Option<String>,
}

impl QrPayload {
    pub fn from_record(record: &SpecimenRecord) -> Self {
        Self {
            url: record.public_url.clone(),
            catalog_number: record.catalog_number.clone(),
            scientific_name: record.taxonomy.scientific_name.clone(),
            family: record.taxonomy.family.clone(),
            locality: record.location.locality.clone(),
            recorded_by: record.event.recorded_by.clone(),
            image: record.representative_image().map(String::from),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct QrGenerator {
    size: u32,
    margin: u32,
    dark: [u8; 3],
    light: [u8; 3],
}

impl Default for QrGenerator {
    fn default() -> Self {
        Self {
            size: QR_SIZE_PX,
            margin: QR_MARGIN_MODULES,
            dark: QR_DARK_RGB,
            light: QR_LIGHT_RGB,
        }
    }
}

impl QrGenerator {
    /// Render the artifact for the record's current state.
    pub fn generate(&self, record: &SpecimenRecord) -> Result<String, MediaError> {
        self.encode(&QrPayload::from_record(record))
    }

    pub fn encode(&self, payload: &QrPayload) -> Result<String, MediaError> {
        let text = serde_json::to_string(payload)
            .map_err(|e| MediaError::QrEncodingFailed(e.to_string()))?;
        let code = QrCode::with_error_correction_level(text.as_bytes(), EcLevel::M)
            .map_err(|e| MediaError::QrEncodingFailed(e.to_string()))?;

        let png = self.render_png(&code)?;
        Ok(format!("data:image/png;base64,{}", STANDARD.encode(png)))
    }

    fn render_png(&self, code: &QrCode) -> Result<Vec<u8>, MediaError> {
        let modules = code.width() as u32;
        let colors = code.to_colors();
        let span = modules + 2 * self.margin;
        let scale = self.size as f64 / span as f64;

        let img = RgbImage::from_fn(self.size, self.size, |x, y| {
            let mx = (x as f64 / scale) as u32;
            let my = (y as f64 / scale) as u32;
            let inside = mx >= self.margin
                && my >= self.margin
                && mx < self.margin + modules
                && my < self.margin + modules;
            let dark = inside && {
                let idx = (my - self.margin) * modules + (mx - self.margin);
                colors[idx as usize] == Color::Dark
            };
            Rgb(if dark { self.dark } else { self.light })
        });

        let mut out = Cursor::new(Vec::new());
        img.write_to(&mut out, ImageFormat::Png)
            .map_err(|e| MediaError::QrEncodingFailed(e.to_string()))?;
        Ok(out.into_inner())
    }
}
