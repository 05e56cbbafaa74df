//! Pixel layout and the per-pixel luma kernel.
//!
//! # Memory Layout
//!
//! [`Pixel`] is `#[repr(C)]` with four `u8` fields (`r`, `g`, `b`, `gray`),
//! so a pixel buffer can be handed to a device or across FFI without
//! conversion. Device kernels address it as one 32-bit word per pixel.
//!
//! # Rounding
//!
//! The luma sum is computed in exact fixed-point thousandths:
//!
//! ```text
//! w    = 299*r + 587*g + 114*b
//! gray = min((w + 500) / 1000, 255)
//! ```
//!
//! which is `round(0.299*r + 0.587*g + 0.114*b)` with ties rounded away from
//! zero. Every backend uses the same integer formula, so outputs are
//! bit-identical across CPU and GPU.

use bytemuck::{Pod, Zeroable};

// ============================================================================
// BT.601 Luma Constants
// ============================================================================

/// BT.601 luma coefficient for red.
///
/// Used in the luma formula: `Y = 0.299*R + 0.587*G + 0.114*B`
pub const BT601_LUMA_R: f32 = 0.299;

/// BT.601 luma coefficient for green.
pub const BT601_LUMA_G: f32 = 0.587;

/// BT.601 luma coefficient for blue.
pub const BT601_LUMA_B: f32 = 0.114;

/// Fixed-point luma weights in thousandths `[r, g, b]`; they sum to 1000.
pub const BT601_LUMA_MILLI: [u32; 3] = [299, 587, 114];

/// A single RGB pixel plus its derived gray channel.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Pod, Zeroable)]
pub struct Pixel {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub gray: u8,
}

impl Pixel {
    /// Size in bytes of one pixel on host and device.
    pub const SIZE: usize = std::mem::size_of::<Self>();

    /// Create a pixel with every field set.
    #[inline]
    pub const fn new(r: u8, g: u8, b: u8, gray: u8) -> Self {
        Self { r, g, b, gray }
    }

    /// Create a pixel with `gray` zeroed.
    #[inline]
    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self::new(r, g, b, 0)
    }

    /// Neutral pixel with `r = g = b = v`.
    #[inline]
    pub const fn splat(v: u8) -> Self {
        Self::new(v, v, v, 0)
    }

    /// Luma of this pixel's color channels.
    #[inline]
    pub fn luma(&self) -> u8 {
        luma_bt601(self.r, self.g, self.b)
    }
}

/// BT.601 luma, rounded half away from zero and clamped to `0..=255`.
#[inline]
pub fn luma_bt601(r: u8, g: u8, b: u8) -> u8 {
    let [wr, wg, wb] = BT601_LUMA_MILLI;
    let weighted = wr * r as u32 + wg * g as u32 + wb * b as u32;
    ((weighted + 500) / 1000).min(255) as u8
}

/// Device kernel body for one invocation.
///
/// `index` is the global invocation index; invocations past `pixels.len()`
/// belong to the padding of the last group and do nothing.
#[inline]
pub fn grayscale_kernel(index: usize, pixels: &mut [Pixel]) {
    if let Some(px) = pixels.get_mut(index) {
        px.gray = px.luma();
    }
}
