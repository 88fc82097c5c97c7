//! Scene driver: validation, culling, painter ordering, and the public
//! forward/reverse entry points.
//!
//! The forward pass fills triangle interiors through the depth buffer (order
//! irrelevant), then overdraws flagged silhouette edges back-to-front by
//! descending summed vertex depth. The reverse pass mirrors this exactly:
//! edges in reverse sorted order with the edge index reversed, then
//! interiors in reverse index order. Edge overdraw is invertible, so each
//! reverse step first restores the image state that existed before the
//! corresponding forward step.

pub(crate) mod edge;
pub(crate) mod interior;
pub(crate) mod triangle;

use tracing::{debug, trace};

use crate::framebuffer::FrameBuffer;
use crate::scene::{Adjoints, RenderError, Scene};

/// Observation and error buffers for the error-compositing forward mode.
pub struct ErrorBuffers<'a> {
    /// Observed image, `(height x width x nb_colors)`.
    pub obs: &'a [f64],
    /// Per-pixel squared error output, `(height x width)`.
    pub err: &'a mut [f64],
}

/// Buffers for the error-compositing reverse mode.
pub struct ErrorAdjoints<'a> {
    pub obs: &'a [f64],
    /// Error buffer as produced by the forward pass; restored to its
    /// post-interior state during the reverse pass.
    pub err: &'a mut [f64],
    /// Seed gradient on the error buffer, scaled by the edge transparencies
    /// as the pass unwinds.
    pub err_b: &'a mut [f64],
}

/// Per-call scratch, sized by the channel count and reused across
/// triangles so the pixel loops never allocate.
pub(crate) struct Scratch {
    /// Per-vertex attribute matrix, `nb_colors x 3`.
    pub attr: Vec<f64>,
    pub attr_b: Vec<f64>,
    /// Affine attribute rows, `nb_colors x 3`.
    pub rows: Vec<f64>,
    pub rows_b: Vec<f64>,
    /// Per-scanline hoisted row constants.
    pub row0y: Vec<f64>,
    /// Per-pixel channel values and adjoints.
    pub vals: Vec<f64>,
    pub vals_b: Vec<f64>,
    /// Raw texture sample, kept separate from the shaded value.
    pub samples: Vec<f64>,
    /// Recovered pre-composite pixel values.
    pub pre: Vec<f64>,
}

impl Scratch {
    fn new(nb_colors: usize) -> Self {
        Self {
            attr: vec![0.0; nb_colors * 3],
            attr_b: vec![0.0; nb_colors * 3],
            rows: vec![0.0; nb_colors * 3],
            rows_b: vec![0.0; nb_colors * 3],
            row0y: vec![0.0; nb_colors],
            vals: vec![0.0; nb_colors],
            vals_b: vec![0.0; nb_colors],
            samples: vec![0.0; nb_colors],
            pre: vec![0.0; nb_colors],
        }
    }
}

/// Per-triangle signed areas (zero for behind-camera triangles) and the
/// painter order: descending summed vertex depth, stable by index.
fn prepare(scene: &Scene) -> (Vec<f64>, Vec<usize>) {
    let t = scene.nb_triangles();
    let mut areas = vec![0.0; t];
    let mut sum_depth = vec![0.0; t];
    for tri in 0..t {
        let (_, v, z) = interior::corners(scene, tri);
        sum_depth[tri] = z[0] + z[1] + z[2];
        let all_front = z[0] >= 0.0 && z[1] >= 0.0 && z[2] >= 0.0;
        areas[tri] = if all_front {
            triangle::signed_area(&v, scene.clockwise)
        } else {
            0.0
        };
    }
    let mut sorted: Vec<usize> = (0..t).collect();
    sorted.sort_by(|&a, &b| {
        sum_depth[b]
            .partial_cmp(&sum_depth[a])
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    let culled = areas.iter().filter(|a| **a <= 0.0).count();
    trace!(triangles = t, culled, "prepared triangle order");
    (areas, sorted)
}

fn validate_error_forward(scene: &Scene, error: &Option<ErrorBuffers>) -> Result<(), RenderError> {
    if let Some(e) = error {
        if e.obs.len() != scene.height * scene.width * scene.nb_colors {
            return Err(RenderError::MissingBuffer("obs"));
        }
        if e.err.len() != scene.height * scene.width {
            return Err(RenderError::MissingBuffer("err_buffer"));
        }
    }
    Ok(())
}

fn validate_error_reverse(scene: &Scene, error: &Option<ErrorAdjoints>) -> Result<(), RenderError> {
    if let Some(e) = error {
        if e.obs.len() != scene.height * scene.width * scene.nb_colors {
            return Err(RenderError::MissingBuffer("obs"));
        }
        if e.err.len() != scene.height * scene.width {
            return Err(RenderError::MissingBuffer("err_buffer"));
        }
        if e.err_b.len() != scene.height * scene.width {
            return Err(RenderError::MissingAdjoint("err_b"));
        }
    }
    Ok(())
}

/// Renders the scene into `image` and `z_buffer`.
///
/// `image` is initialized from the scene background and `z_buffer` to
/// `+inf`; both are caller-owned and fully overwritten. With `error`
/// supplied, the squared error against `obs` is computed after the interior
/// pass and the edge pass composites error contributions instead of colors,
/// leaving `image` in its post-interior state.
pub fn render_forward(
    scene: &Scene,
    image: &mut [f64],
    z_buffer: &mut [f64],
    sigma: f64,
    error: Option<ErrorBuffers>,
) -> Result<(), RenderError> {
    scene.validate()?;
    scene.validate_outputs(image, z_buffer)?;
    validate_error_forward(scene, &error)?;
    debug!(
        triangles = scene.nb_triangles(),
        height = scene.height,
        width = scene.width,
        sigma,
        error_mode = error.is_some(),
        "forward render"
    );

    image.copy_from_slice(scene.background);
    z_buffer.fill(f64::INFINITY);
    let (areas, sorted) = prepare(scene);
    let mut scratch = Scratch::new(scene.nb_colors);

    {
        let mut fb = FrameBuffer::new(image, z_buffer, scene.height, scene.width, scene.nb_colors);
        for tri in 0..scene.nb_triangles() {
            if areas[tri] > 0.0 || !scene.backface_culling {
                interior::forward(scene, tri, &mut fb, &mut scratch);
            }
        }
    }

    if let Some(ErrorBuffers { obs, err }) = error {
        let nb = scene.nb_colors;
        for idx in 0..scene.height * scene.width {
            let base = idx * nb;
            let mut e = 0.0;
            for ch in 0..nb {
                let d = image[base + ch] - obs[base + ch];
                e += d * d;
            }
            err[idx] = e;
        }
        if sigma > 0.0 {
            let fb = FrameBuffer::new(image, z_buffer, scene.height, scene.width, scene.nb_colors);
            for &tri in &sorted {
                if areas[tri] <= 0.0 {
                    continue;
                }
                for n in 0..3 {
                    if scene.edgeflags[3 * tri + n] {
                        edge::forward_error(scene, tri, n, sigma, &fb, obs, err, &mut scratch);
                    }
                }
            }
        }
    } else if sigma > 0.0 {
        let mut fb = FrameBuffer::new(image, z_buffer, scene.height, scene.width, scene.nb_colors);
        for &tri in &sorted {
            if areas[tri] <= 0.0 {
                continue;
            }
            for n in 0..3 {
                if scene.edgeflags[3 * tri + n] {
                    edge::forward_image(scene, tri, n, sigma, &mut fb, &mut scratch);
                }
            }
        }
    }
    Ok(())
}

/// Accumulates gradients of the rendered output into the scene adjoints.
///
/// `image` and `z_buffer` must be exactly what [`render_forward`] produced
/// for this scene; `image` is restored to its pre-edge (post-interior) state
/// as the edge compositing unwinds, and `image_b` is consumed (scaled by the
/// edge transparencies) as the seed flows toward the interior pass. In error
/// mode the seed comes from `err_b` instead and `image_b` is overwritten
/// with the synthesized interior seed. Adjoint arrays are accumulated into,
/// never cleared; zero them beforehand for a fresh gradient.
pub fn render_reverse(
    scene: &Scene,
    adj: &mut Adjoints,
    image: &mut [f64],
    z_buffer: &[f64],
    image_b: &mut [f64],
    sigma: f64,
    error: Option<ErrorAdjoints>,
) -> Result<(), RenderError> {
    scene.validate()?;
    scene.validate_outputs(image, z_buffer)?;
    adj.validate(scene)?;
    if image_b.len() != scene.height * scene.width * scene.nb_colors {
        return Err(RenderError::MissingAdjoint("image_b"));
    }
    validate_error_reverse(scene, &error)?;
    debug!(
        triangles = scene.nb_triangles(),
        sigma,
        error_mode = error.is_some(),
        "reverse render"
    );

    let (areas, sorted) = prepare(scene);
    let mut scratch = Scratch::new(scene.nb_colors);

    match error {
        Some(ErrorAdjoints { obs, err, err_b }) => {
            if sigma > 0.0 {
                for &tri in sorted.iter().rev() {
                    if areas[tri] <= 0.0 {
                        continue;
                    }
                    for n in (0..3).rev() {
                        if scene.edgeflags[3 * tri + n] {
                            edge::reverse_error(
                                scene, adj, tri, n, sigma, z_buffer, obs, err, err_b,
                                &mut scratch,
                            );
                        }
                    }
                }
            }
            // Synthesize the interior seed from the unwound error gradient.
            let nb = scene.nb_colors;
            for idx in 0..scene.height * scene.width {
                let base = idx * nb;
                for ch in 0..nb {
                    image_b[base + ch] = 2.0 * (image[base + ch] - obs[base + ch]) * err_b[idx];
                }
            }
        }
        None => {
            if sigma > 0.0 {
                for &tri in sorted.iter().rev() {
                    if areas[tri] <= 0.0 {
                        continue;
                    }
                    for n in (0..3).rev() {
                        if scene.edgeflags[3 * tri + n] {
                            edge::reverse_image(
                                scene, adj, tri, n, sigma, image, z_buffer, image_b,
                                &mut scratch,
                            );
                        }
                    }
                }
            }
        }
    }

    for tri in (0..scene.nb_triangles()).rev() {
        if areas[tri] > 0.0 || !scene.backface_culling {
            interior::reverse(scene, adj, tri, z_buffer, image_b, &mut scratch);
        }
    }
    Ok(())
}
