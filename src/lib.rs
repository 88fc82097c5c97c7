//! Differentiable soft rasterizer.
//!
//! Renders a triangle mesh with per-vertex image coordinates, depths, shade
//! values and colors (or a shared texture) into a caller-owned image, and
//! accumulates the reverse-mode gradient of that image with respect to every
//! differentiable input. Silhouette edges flagged by the caller are
//! overdrawn with an invertible soft falloff of half-width `σ`, which makes
//! the gradient well-defined at occlusion boundaries.

// Public API - exposed to library consumers
pub mod math;
pub mod render;
pub mod scene;
pub mod texture;

// Internal modules - used within the crate only
pub(crate) mod framebuffer;

// Re-export commonly needed types at crate root for convenience
pub use render::{render_forward, render_reverse, ErrorAdjoints, ErrorBuffers};
pub use scene::{Adjoints, RenderError, Scene};
pub use texture::{write_image_png, Texture};
