//! QR decoding
//!
//! The scan loop only needs `decode(frame) -> payload | none`. The shipped
//! decoder runs `rqrr` over the luma of the RGBA frame.

use crate::camera::RasterFrame;
use tracing::trace;

/// Which polarities the decoder should try
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InversionAttempts {
    /// Dark modules on light background only
    DontInvert,
    /// Light modules on dark background only
    OnlyInvert,
    /// Try both; tolerates inverted prints and phone screens
    #[default]
    AttemptBoth,
}

impl InversionAttempts {
    fn tries_normal(self) -> bool {
        !matches!(self, InversionAttempts::OnlyInvert)
    }

    fn tries_inverted(self) -> bool {
        !matches!(self, InversionAttempts::DontInvert)
    }
}

/// QR decoder capability
pub trait QrDecoder: Send {
    /// Decode a payload from the frame, `None` when no code is readable
    fn decode(&self, frame: &RasterFrame, inversion: InversionAttempts) -> Option<String>;
}

/// `rqrr`-backed decoder
#[derive(Debug, Default, Clone, Copy)]
pub struct RqrrDecoder;

impl RqrrDecoder {
    pub fn new() -> Self {
        Self
    }
}

impl QrDecoder for RqrrDecoder {
    fn decode(&self, frame: &RasterFrame, inversion: InversionAttempts) -> Option<String> {
        let luma = luma_plane(frame)?;
        let width = frame.width as usize;
        let height = frame.height as usize;

        if inversion.tries_normal() {
            if let Some(payload) = decode_luma(&luma, width, height) {
                return Some(payload);
            }
        }
        if inversion.tries_inverted() {
            let inverted: Vec<u8> = luma.iter().map(|v| 255 - v).collect();
            if let Some(payload) = decode_luma(&inverted, width, height) {
                return Some(payload);
            }
        }
        None
    }
}

/// Rec. 601 luma per pixel; `None` for a truncated buffer
fn luma_plane(frame: &RasterFrame) -> Option<Vec<u8>> {
    let pixels = (frame.width as usize).checked_mul(frame.height as usize)?;
    if pixels == 0 || frame.rgba.len() < pixels * 4 {
        trace!(
            width = frame.width,
            height = frame.height,
            len = frame.rgba.len(),
            "Frame buffer too short to decode"
        );
        return None;
    }
    Some(
        frame.rgba[..pixels * 4]
            .chunks_exact(4)
            .map(|px| {
                let (r, g, b) = (px[0] as u32, px[1] as u32, px[2] as u32);
                ((299 * r + 587 * g + 114 * b) / 1000) as u8
            })
            .collect(),
    )
}

fn decode_luma(luma: &[u8], width: usize, height: usize) -> Option<String> {
    let mut image =
        rqrr::PreparedImage::prepare_from_greyscale(width, height, |x, y| luma[y * width + x]);
    image.detect_grids().into_iter().find_map(|grid| match grid.decode() {
        Ok((_, content)) => Some(content),
        Err(e) => {
            trace!(error = ?e, "QR grid found but not decodable");
            None
        }
    })
}
