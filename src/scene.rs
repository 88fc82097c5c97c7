//! Flat-array scene description and input validation.
//!
//! All geometry lives in caller-owned flat arrays indexed by integer IDs;
//! the renderer borrows them for the duration of a call and never allocates
//! per-pixel state. Adjoint arrays mirror their primals and are accumulated
//! into with `+=`.

use std::fmt;

use crate::texture::Texture;

/// Fatal validation failures. The renderer never recovers, retries, or
/// produces partial results.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenderError {
    /// A required array is absent or has the wrong length for the declared
    /// dimensions.
    MissingBuffer(&'static str),
    /// The reverse pass was invoked with a missing or wrongly-sized adjoint
    /// array.
    MissingAdjoint(&'static str),
    /// A face index points past the end of the vertex (or UV vertex) array.
    IndexOutOfRange {
        name: &'static str,
        triangle: usize,
        value: u32,
        bound: usize,
    },
}

impl fmt::Display for RenderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RenderError::MissingBuffer(name) => {
                write!(f, "missing or wrongly sized buffer: {}", name)
            }
            RenderError::MissingAdjoint(name) => {
                write!(f, "missing or wrongly sized adjoint buffer: {}", name)
            }
            RenderError::IndexOutOfRange { name, triangle, value, bound } => write!(
                f,
                "{} index {} of triangle {} is out of range (bound {})",
                name, value, triangle, bound
            ),
        }
    }
}

impl std::error::Error for RenderError {}

/// A scene of `T` triangles over `V` vertices and `U` UV vertices, rendered
/// into an `(height x width x nb_colors)` image.
///
/// Per-vertex arrays: `ij` stores `(x, y)` image coordinates (`V x 2`),
/// `depths` and `shade` one scalar each, `colors` a `nb_colors` vector.
/// Per-triangle arrays: `faces` / `faces_uv` hold three indices, `edgeflags`
/// three silhouette flags, `textured` / `shaded` one flag each. UV
/// coordinates are one-based on input and shifted internally.
pub struct Scene<'a> {
    pub ij: &'a [f64],
    pub depths: &'a [f64],
    pub shade: &'a [f64],
    pub colors: &'a [f64],
    pub uv: &'a [f64],
    pub faces: &'a [u32],
    pub faces_uv: &'a [u32],
    pub edgeflags: &'a [bool],
    pub textured: &'a [bool],
    pub shaded: &'a [bool],
    pub texture: Option<&'a Texture>,
    pub background: &'a [f64],
    pub height: usize,
    pub width: usize,
    pub nb_colors: usize,
    /// Polarity of the signed-area test and of the outward edge normal.
    pub clockwise: bool,
    /// When false, back-facing triangles still rasterize their interior;
    /// their edges stay culled either way.
    pub backface_culling: bool,
}

impl<'a> Scene<'a> {
    pub fn nb_vertices(&self) -> usize {
        self.depths.len()
    }

    pub fn nb_uvs(&self) -> usize {
        self.uv.len() / 2
    }

    pub fn nb_triangles(&self) -> usize {
        self.faces.len() / 3
    }

    /// Checks array shapes and face index bounds.
    pub(crate) fn validate(&self) -> Result<(), RenderError> {
        let v = self.nb_vertices();
        let t = self.nb_triangles();
        let u = self.nb_uvs();

        if self.ij.len() != 2 * v {
            return Err(RenderError::MissingBuffer("ij"));
        }
        if self.shade.len() != v {
            return Err(RenderError::MissingBuffer("shade"));
        }
        if self.colors.len() != v * self.nb_colors {
            return Err(RenderError::MissingBuffer("colors"));
        }
        if self.uv.len() % 2 != 0 {
            return Err(RenderError::MissingBuffer("uv"));
        }
        if self.faces.len() % 3 != 0 {
            return Err(RenderError::MissingBuffer("faces"));
        }
        if self.faces_uv.len() != 3 * t {
            return Err(RenderError::MissingBuffer("faces_uv"));
        }
        if self.edgeflags.len() != 3 * t {
            return Err(RenderError::MissingBuffer("edgeflags"));
        }
        if self.textured.len() != t || self.shaded.len() != t {
            return Err(RenderError::MissingBuffer("textured"));
        }
        if self.background.len() != self.height * self.width * self.nb_colors {
            return Err(RenderError::MissingBuffer("background"));
        }

        let needs_texture = (0..t).any(|i| self.textured[i] && self.shaded[i]);
        match self.texture {
            Some(tex) => {
                if tex.channels() != self.nb_colors {
                    return Err(RenderError::MissingBuffer("texture"));
                }
            }
            None => {
                if needs_texture {
                    return Err(RenderError::MissingBuffer("texture"));
                }
            }
        }

        for tri in 0..t {
            for i in 0..3 {
                let fv = self.faces[3 * tri + i];
                if fv as usize >= v {
                    return Err(RenderError::IndexOutOfRange {
                        name: "faces",
                        triangle: tri,
                        value: fv,
                        bound: v,
                    });
                }
                let fu = self.faces_uv[3 * tri + i];
                if fu as usize >= u {
                    return Err(RenderError::IndexOutOfRange {
                        name: "faces_uv",
                        triangle: tri,
                        value: fu,
                        bound: u,
                    });
                }
            }
        }
        Ok(())
    }

    /// Checks the caller-owned output buffers against the scene dimensions.
    pub(crate) fn validate_outputs(
        &self,
        image: &[f64],
        z_buffer: &[f64],
    ) -> Result<(), RenderError> {
        if image.len() != self.height * self.width * self.nb_colors {
            return Err(RenderError::MissingBuffer("image"));
        }
        if z_buffer.len() != self.height * self.width {
            return Err(RenderError::MissingBuffer("z_buffer"));
        }
        Ok(())
    }
}

/// Mutable gradient mirrors of every differentiable scene input. Depth only
/// drives visibility and has no adjoint. `texture_b` may be empty when the
/// scene carries no texture.
pub struct Adjoints<'a> {
    pub ij_b: &'a mut [f64],
    pub uv_b: &'a mut [f64],
    pub shade_b: &'a mut [f64],
    pub colors_b: &'a mut [f64],
    pub texture_b: &'a mut [f64],
}

impl<'a> Adjoints<'a> {
    pub(crate) fn validate(&self, scene: &Scene) -> Result<(), RenderError> {
        let v = scene.nb_vertices();
        if self.ij_b.len() != 2 * v {
            return Err(RenderError::MissingAdjoint("ij_b"));
        }
        if self.uv_b.len() != scene.uv.len() {
            return Err(RenderError::MissingAdjoint("uv_b"));
        }
        if self.shade_b.len() != v {
            return Err(RenderError::MissingAdjoint("shade_b"));
        }
        if self.colors_b.len() != scene.colors.len() {
            return Err(RenderError::MissingAdjoint("colors_b"));
        }
        let tex_len = scene
            .texture
            .map(|t| t.height() * t.width() * t.channels())
            .unwrap_or(0);
        if self.texture_b.len() != tex_len {
            return Err(RenderError::MissingAdjoint("texture_b"));
        }
        Ok(())
    }
}
