//! Depth-buffered triangle interior rasterization, forward and reverse.
//!
//! Per triangle, every interpolated quantity is an affine function of the
//! pixel: a row of three coefficients obtained by multiplying the per-vertex
//! values with `xy1_to_bary`. The forward scan depth-tests each pixel and
//! writes the shaded channels; the reverse scan replays the identical
//! arithmetic and back-propagates only through pixels whose final depth
//! equals this triangle's `Z` (the pixels it still owns after the full
//! forward pass).

use crate::framebuffer::FrameBuffer;
use crate::math::linalg::{
    affine_at_y, affine_value_b, row_times_mat3, row_times_mat3_b, rows_times_mat3,
    rows_times_mat3_b,
};
use crate::math::mat3::Mat3;
use crate::math::vec2::Vec2;
use crate::scene::{Adjoints, Scene};

use super::triangle::TriangleStencil;
use super::Scratch;

/// Corner vertex ids, positions and depths of one triangle.
pub(crate) fn corners(scene: &Scene, tri: usize) -> ([usize; 3], [Vec2; 3], [f64; 3]) {
    let vids = [
        scene.faces[3 * tri] as usize,
        scene.faces[3 * tri + 1] as usize,
        scene.faces[3 * tri + 2] as usize,
    ];
    let v = [
        Vec2::new(scene.ij[2 * vids[0]], scene.ij[2 * vids[0] + 1]),
        Vec2::new(scene.ij[2 * vids[1]], scene.ij[2 * vids[1] + 1]),
        Vec2::new(scene.ij[2 * vids[2]], scene.ij[2 * vids[2] + 1]),
    ];
    let z = [
        scene.depths[vids[0]],
        scene.depths[vids[1]],
        scene.depths[vids[2]],
    ];
    (vids, v, z)
}

fn uv_corners(scene: &Scene, tri: usize) -> ([usize; 3], [f64; 3], [f64; 3]) {
    let uvids = [
        scene.faces_uv[3 * tri] as usize,
        scene.faces_uv[3 * tri + 1] as usize,
        scene.faces_uv[3 * tri + 2] as usize,
    ];
    // One-based input coordinates, shifted here once.
    let u_vert = [
        scene.uv[2 * uvids[0]] - 1.0,
        scene.uv[2 * uvids[1]] - 1.0,
        scene.uv[2 * uvids[2]] - 1.0,
    ];
    let v_vert = [
        scene.uv[2 * uvids[0] + 1] - 1.0,
        scene.uv[2 * uvids[1] + 1] - 1.0,
        scene.uv[2 * uvids[2] + 1] - 1.0,
    ];
    (uvids, u_vert, v_vert)
}

pub(crate) fn forward(scene: &Scene, tri: usize, fb: &mut FrameBuffer, scratch: &mut Scratch) {
    if scene.textured[tri] && scene.shaded[tri] {
        forward_textured(scene, tri, fb, scratch);
    } else {
        forward_interp(scene, tri, fb, scratch);
    }
}

pub(crate) fn reverse(
    scene: &Scene,
    adj: &mut Adjoints,
    tri: usize,
    depth: &[f64],
    image_b: &[f64],
    scratch: &mut Scratch,
) {
    if scene.textured[tri] && scene.shaded[tri] {
        reverse_textured(scene, adj, tri, depth, image_b, scratch);
    } else {
        reverse_interp(scene, adj, tri, depth, image_b, scratch);
    }
}

fn forward_interp(scene: &Scene, tri: usize, fb: &mut FrameBuffer, scratch: &mut Scratch) {
    let nb = scene.nb_colors;
    let (vids, v, z) = corners(scene, tri);
    let st = match TriangleStencil::build(&v) {
        Some(st) => st,
        None => return,
    };
    let z_row = row_times_mat3(z, &st.xy1_to_bary);
    for k in 0..3 {
        for ch in 0..nb {
            scratch.attr[ch * 3 + k] = scene.colors[vids[k] * nb + ch];
        }
    }
    rows_times_mat3(&scratch.attr[..nb * 3], nb, &st.xy1_to_bary, &mut scratch.rows[..nb * 3]);

    for span in &st.spans {
        let y_lo = span.y_begin.max(0);
        let y_hi = span.y_end.min(scene.height as i64 - 1);
        for y in y_lo..=y_hi {
            let yf = y as f64;
            let (x_begin, x_end) = span.x_bounds(yf, scene.width);
            let (z0y, dz_dx) = affine_at_y(&z_row, yf);
            for ch in 0..nb {
                let (v0y, _) = affine_at_y(&scratch.rows[ch * 3..ch * 3 + 3], yf);
                scratch.row0y[ch] = v0y;
            }
            for x in x_begin..=x_end {
                let xf = x as f64;
                let z = z0y + dz_dx * xf;
                if fb.test_and_set_depth(x as usize, y as usize, z) {
                    let px = fb.pixel_mut(x as usize, y as usize);
                    for ch in 0..nb {
                        px[ch] = scratch.row0y[ch] + scratch.rows[ch * 3] * xf;
                    }
                }
            }
        }
    }
}

fn reverse_interp(
    scene: &Scene,
    adj: &mut Adjoints,
    tri: usize,
    depth: &[f64],
    image_b: &[f64],
    scratch: &mut Scratch,
) {
    let nb = scene.nb_colors;
    let (vids, v, z) = corners(scene, tri);
    let st = match TriangleStencil::build(&v) {
        Some(st) => st,
        None => return,
    };
    let z_row = row_times_mat3(z, &st.xy1_to_bary);
    for k in 0..3 {
        for ch in 0..nb {
            scratch.attr[ch * 3 + k] = scene.colors[vids[k] * nb + ch];
        }
    }
    scratch.rows_b[..nb * 3].fill(0.0);

    for span in &st.spans {
        let y_lo = span.y_begin.max(0);
        let y_hi = span.y_end.min(scene.height as i64 - 1);
        for y in y_lo..=y_hi {
            let yf = y as f64;
            let (x_begin, x_end) = span.x_bounds(yf, scene.width);
            let (z0y, dz_dx) = affine_at_y(&z_row, yf);
            for x in x_begin..=x_end {
                let xf = x as f64;
                let z = z0y + dz_dx * xf;
                if z == depth[y as usize * scene.width + x as usize] {
                    let base = (y as usize * scene.width + x as usize) * nb;
                    for ch in 0..nb {
                        affine_value_b(
                            &mut scratch.rows_b[ch * 3..ch * 3 + 3],
                            xf,
                            yf,
                            image_b[base + ch],
                        );
                    }
                }
            }
        }
    }

    scratch.attr_b[..nb * 3].fill(0.0);
    let mut m_b = Mat3::zero();
    rows_times_mat3_b(
        &scratch.attr[..nb * 3],
        nb,
        &st.xy1_to_bary,
        &mut scratch.attr_b[..nb * 3],
        &mut m_b,
        &scratch.rows_b[..nb * 3],
    );
    for k in 0..3 {
        for ch in 0..nb {
            adj.colors_b[vids[k] * nb + ch] += scratch.attr_b[ch * 3 + k];
        }
    }
    accumulate_geometry(&st, &m_b, &vids, adj);
}

fn forward_textured(scene: &Scene, tri: usize, fb: &mut FrameBuffer, scratch: &mut Scratch) {
    let nb = scene.nb_colors;
    let tex = match scene.texture {
        Some(tex) => tex,
        None => return,
    };
    let (vids, v, z) = corners(scene, tri);
    let st = match TriangleStencil::build(&v) {
        Some(st) => st,
        None => return,
    };
    let (_, u_vert, v_vert) = uv_corners(scene, tri);
    let l_vert = [
        scene.shade[vids[0]],
        scene.shade[vids[1]],
        scene.shade[vids[2]],
    ];
    let z_row = row_times_mat3(z, &st.xy1_to_bary);
    let u_row = row_times_mat3(u_vert, &st.xy1_to_bary);
    let v_row = row_times_mat3(v_vert, &st.xy1_to_bary);
    let l_row = row_times_mat3(l_vert, &st.xy1_to_bary);

    for span in &st.spans {
        let y_lo = span.y_begin.max(0);
        let y_hi = span.y_end.min(scene.height as i64 - 1);
        for y in y_lo..=y_hi {
            let yf = y as f64;
            let (x_begin, x_end) = span.x_bounds(yf, scene.width);
            let (z0y, dz_dx) = affine_at_y(&z_row, yf);
            let (u0y, du_dx) = affine_at_y(&u_row, yf);
            let (v0y, dv_dx) = affine_at_y(&v_row, yf);
            let (l0y, dl_dx) = affine_at_y(&l_row, yf);
            for x in x_begin..=x_end {
                let xf = x as f64;
                let z = z0y + dz_dx * xf;
                if fb.test_and_set_depth(x as usize, y as usize, z) {
                    let u = u0y + du_dx * xf;
                    let uv = v0y + dv_dx * xf;
                    let l = l0y + dl_dx * xf;
                    tex.sample_bilinear(u, uv, &mut scratch.vals[..nb]);
                    let px = fb.pixel_mut(x as usize, y as usize);
                    for ch in 0..nb {
                        px[ch] = scratch.vals[ch] * l;
                    }
                }
            }
        }
    }
}

fn reverse_textured(
    scene: &Scene,
    adj: &mut Adjoints,
    tri: usize,
    depth: &[f64],
    image_b: &[f64],
    scratch: &mut Scratch,
) {
    let nb = scene.nb_colors;
    let tex = match scene.texture {
        Some(tex) => tex,
        None => return,
    };
    let (vids, v, z) = corners(scene, tri);
    let st = match TriangleStencil::build(&v) {
        Some(st) => st,
        None => return,
    };
    let (uvids, u_vert, v_vert) = uv_corners(scene, tri);
    let l_vert = [
        scene.shade[vids[0]],
        scene.shade[vids[1]],
        scene.shade[vids[2]],
    ];
    let z_row = row_times_mat3(z, &st.xy1_to_bary);
    let u_row = row_times_mat3(u_vert, &st.xy1_to_bary);
    let v_row = row_times_mat3(v_vert, &st.xy1_to_bary);
    let l_row = row_times_mat3(l_vert, &st.xy1_to_bary);
    let mut u_row_b = [0.0; 3];
    let mut v_row_b = [0.0; 3];
    let mut l_row_b = [0.0; 3];

    for span in &st.spans {
        let y_lo = span.y_begin.max(0);
        let y_hi = span.y_end.min(scene.height as i64 - 1);
        for y in y_lo..=y_hi {
            let yf = y as f64;
            let (x_begin, x_end) = span.x_bounds(yf, scene.width);
            let (z0y, dz_dx) = affine_at_y(&z_row, yf);
            let (u0y, du_dx) = affine_at_y(&u_row, yf);
            let (v0y, dv_dx) = affine_at_y(&v_row, yf);
            let (l0y, dl_dx) = affine_at_y(&l_row, yf);
            for x in x_begin..=x_end {
                let xf = x as f64;
                let z = z0y + dz_dx * xf;
                if z == depth[y as usize * scene.width + x as usize] {
                    let u = u0y + du_dx * xf;
                    let uv = v0y + dv_dx * xf;
                    let l = l0y + dl_dx * xf;
                    tex.sample_bilinear(u, uv, &mut scratch.vals[..nb]);

                    let base = (y as usize * scene.width + x as usize) * nb;
                    let mut l_b = 0.0;
                    for ch in 0..nb {
                        let seed = image_b[base + ch];
                        l_b += scratch.vals[ch] * seed;
                        scratch.vals_b[ch] = l * seed;
                    }
                    let mut uvpt_b = [0.0; 2];
                    tex.sample_bilinear_b(
                        u,
                        uv,
                        adj.texture_b,
                        &mut uvpt_b,
                        &scratch.vals_b[..nb],
                    );
                    affine_value_b(&mut u_row_b, xf, yf, uvpt_b[0]);
                    affine_value_b(&mut v_row_b, xf, yf, uvpt_b[1]);
                    affine_value_b(&mut l_row_b, xf, yf, l_b);
                }
            }
        }
    }

    let mut m_b = Mat3::zero();
    let mut u_vert_b = [0.0; 3];
    let mut v_vert_b = [0.0; 3];
    let mut l_vert_b = [0.0; 3];
    row_times_mat3_b(u_vert, &st.xy1_to_bary, &mut u_vert_b, &mut m_b, u_row_b);
    row_times_mat3_b(v_vert, &st.xy1_to_bary, &mut v_vert_b, &mut m_b, v_row_b);
    row_times_mat3_b(l_vert, &st.xy1_to_bary, &mut l_vert_b, &mut m_b, l_row_b);
    for k in 0..3 {
        adj.uv_b[2 * uvids[k]] += u_vert_b[k];
        adj.uv_b[2 * uvids[k] + 1] += v_vert_b[k];
        adj.shade_b[vids[k]] += l_vert_b[k];
    }
    accumulate_geometry(&st, &m_b, &vids, adj);
}

/// Routes the adjoint of `xy1_to_bary` through the matrix inverse into the
/// vertex positions (the constant `[1 1 1]` row of `bary_to_xy1` drops out).
fn accumulate_geometry(st: &TriangleStencil, m_b: &Mat3, vids: &[usize; 3], adj: &mut Adjoints) {
    let mut n_b = Mat3::zero();
    st.xy1_to_bary.inverse_b(m_b, &mut n_b);
    for k in 0..3 {
        adj.ij_b[2 * vids[k]] += n_b.data[0][k];
        adj.ij_b[2 * vids[k] + 1] += n_b.data[1][k];
    }
}
