//! WGSL shader sources for GPU compute pipelines.

#![cfg_attr(not(feature = "wgpu"), allow(dead_code))]

/// Placeholder replaced by the group size when a pipeline is built.
pub const GROUP_SIZE_TOKEN: &str = "{{GROUP_SIZE}}";

/// Per-pixel BT.601 luma.
///
/// Each pixel is one `u32` word, bytes `r, g, b, gray` from low to high.
/// Only the top byte is written; every invocation touches its own word.
pub const GRAYSCALE: &str = r#"
struct Params {
    count: u32,
    grid_x: u32,
    _pad0: u32,
    _pad1: u32,
}

@group(0) @binding(0) var<storage, read_write> pixels: array<u32>;
@group(0) @binding(1) var<uniform> params: Params;

const GROUP_SIZE: u32 = {{GROUP_SIZE}}u;

@compute @workgroup_size({{GROUP_SIZE}})
fn main(
    @builtin(workgroup_id) wg: vec3<u32>,
    @builtin(local_invocation_index) lane: u32,
) {
    let group = wg.y * params.grid_x + wg.x;
    let i = group * GROUP_SIZE + lane;
    if i >= params.count { return; }

    let px = pixels[i];
    let r = px & 0xffu;
    let g = (px >> 8u) & 0xffu;
    let b = (px >> 16u) & 0xffu;

    // round(0.299r + 0.587g + 0.114b), ties away from zero
    let weighted = 299u * r + 587u * g + 114u * b;
    let gray = min((weighted + 500u) / 1000u, 255u);

    pixels[i] = (px & 0x00ffffffu) | (gray << 24u);
}
"#;

/// Grayscale shader specialised for `group_size` invocations per workgroup.
pub fn grayscale(group_size: u32) -> String {
    GRAYSCALE.replace(GROUP_SIZE_TOKEN, &group_size.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_specialise() {
        let src = grayscale(64);
        assert!(src.contains("@workgroup_size(64)"));
        assert!(src.contains("const GROUP_SIZE: u32 = 64u;"));
        assert!(!src.contains(GROUP_SIZE_TOKEN));
    }
}
