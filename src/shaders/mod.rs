// SPDX-License-Identifier: GPL-3.0-only

//! GPU side of the pipeline
//!
//! The two compute programs, the bridge that turns frames into textures and
//! the renderer that runs the programs and presents the result.

pub mod bridge;
mod gpu_processor;
pub mod renderer;

pub use bridge::{GpuImage, TextureBridge, TextureCache};
pub use gpu_processor::{
    CachedDimensions, compute_dispatch_size, padded_bytes_per_row, read_buffer_async, unpad_rows,
};
pub use renderer::{ComputeRenderer, SurfaceRing};

/// Log-chromaticity program
pub const INVARIANT_SHADER: &str = include_str!("invariant.wgsl");

/// Copy program sharing the invariant program's bind group layout
pub const PASSTHROUGH_SHADER: &str = include_str!("passthrough.wgsl");

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::gpu::TILE_SIZE;

    /// Validate that a WGSL shader compiles successfully using naga
    fn validate_shader(name: &str, source: &str) -> naga::Module {
        let module = match naga::front::wgsl::parse_str(source) {
            Ok(module) => module,
            Err(e) => panic!("Shader '{}' parse failed: {:?}", name, e),
        };

        let info = naga::valid::Validator::new(
            naga::valid::ValidationFlags::all(),
            naga::valid::Capabilities::all(),
        )
        .validate(&module);

        if let Err(e) = info {
            panic!("Shader '{}' validation failed: {:?}", name, e);
        }
        module
    }

    fn workgroup_size(module: &naga::Module) -> [u32; 3] {
        module
            .entry_points
            .iter()
            .find(|ep| ep.name == "main")
            .map(|ep| ep.workgroup_size)
            .expect("main entry point")
    }

    #[test]
    fn test_invariant_shader_validates() {
        let module = validate_shader("invariant", INVARIANT_SHADER);
        assert_eq!(workgroup_size(&module), [TILE_SIZE, TILE_SIZE, 1]);
    }

    #[test]
    fn test_passthrough_shader_validates() {
        let module = validate_shader("passthrough", PASSTHROUGH_SHADER);
        assert_eq!(workgroup_size(&module), [TILE_SIZE, TILE_SIZE, 1]);
    }
}
