//! Multi-channel f64 texture with bilinear sampling and its adjoint.
//!
//! Coordinates are in texel units: `u` indexes columns, `v` indexes rows.
//! Sampling clamps the base cell to `[0, size-2]` and the fractional weight
//! to `[0, 1]`, so out-of-range coordinates saturate onto the border texels
//! and the `+1` taps never read outside the array.

use std::path::Path;

/// A `(height x width x channels)` texture, row-major, channel-minor.
pub struct Texture {
    data: Vec<f64>,
    height: usize,
    width: usize,
    channels: usize,
}

impl Texture {
    /// Wrap a flat texel array.
    ///
    /// # Panics
    /// Panics if `data.len() != height * width * channels` or either
    /// dimension is smaller than 2 (bilinear taps need a 2x2 neighborhood).
    pub fn new(data: Vec<f64>, height: usize, width: usize, channels: usize) -> Self {
        assert_eq!(
            data.len(),
            height * width * channels,
            "texture data length doesn't match dimensions"
        );
        assert!(height >= 2 && width >= 2, "texture must be at least 2x2");
        Self { data, height, width, channels }
    }

    /// Load an 8-bit image file as a 3-channel texture with values in [0, 1].
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, image::ImageError> {
        let img = image::open(path)?.to_rgb8();
        let (width, height) = img.dimensions();
        let data: Vec<f64> = img
            .pixels()
            .flat_map(|p| p.0.into_iter().map(|v| v as f64 / 255.0))
            .collect();
        Ok(Self::new(data, height as usize, width as usize, 3))
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    #[inline]
    fn texel(&self, y: usize, x: usize) -> &[f64] {
        let base = (y * self.width + x) * self.channels;
        &self.data[base..base + self.channels]
    }

    /// Base cell and fractional weights for a sample point, shared by the
    /// forward sample and its adjoint. Returns `(x0, y0, fx, fy, sat_x,
    /// sat_y)`; a saturated axis contributes no positional gradient.
    #[inline]
    fn taps(&self, u: f64, v: f64) -> (usize, usize, f64, f64, bool, bool) {
        let x0 = (u.floor() as i64).clamp(0, self.width as i64 - 2) as usize;
        let y0 = (v.floor() as i64).clamp(0, self.height as i64 - 2) as usize;
        let fx_raw = u - x0 as f64;
        let fy_raw = v - y0 as f64;
        let fx = fx_raw.clamp(0.0, 1.0);
        let fy = fy_raw.clamp(0.0, 1.0);
        (x0, y0, fx, fy, fx != fx_raw, fy != fy_raw)
    }

    /// Bilinear sample at `(u, v)` into `out` (one value per channel).
    pub fn sample_bilinear(&self, u: f64, v: f64, out: &mut [f64]) {
        debug_assert_eq!(out.len(), self.channels);
        let (x0, y0, fx, fy, _, _) = self.taps(u, v);
        let t00 = self.texel(y0, x0);
        let t10 = self.texel(y0, x0 + 1);
        let t01 = self.texel(y0 + 1, x0);
        let t11 = self.texel(y0 + 1, x0 + 1);
        for c in 0..self.channels {
            out[c] = (1.0 - fy) * ((1.0 - fx) * t00[c] + fx * t10[c])
                + fy * ((1.0 - fx) * t01[c] + fx * t11[c]);
        }
    }

    /// Adjoint of [`sample_bilinear`](Self::sample_bilinear): given the
    /// sample adjoint `out_b`, accumulates into the texture adjoint at the
    /// four taps and into the sample-point adjoint `uv_b = (u_b, v_b)`.
    pub fn sample_bilinear_b(
        &self,
        u: f64,
        v: f64,
        texture_b: &mut [f64],
        uv_b: &mut [f64; 2],
        out_b: &[f64],
    ) {
        debug_assert_eq!(texture_b.len(), self.data.len());
        debug_assert_eq!(out_b.len(), self.channels);
        let (x0, y0, fx, fy, sat_x, sat_y) = self.taps(u, v);
        let base00 = (y0 * self.width + x0) * self.channels;
        let base10 = base00 + self.channels;
        let base01 = ((y0 + 1) * self.width + x0) * self.channels;
        let base11 = base01 + self.channels;

        let mut u_b = 0.0;
        let mut v_b = 0.0;
        for c in 0..self.channels {
            let b = out_b[c];
            texture_b[base00 + c] += (1.0 - fy) * (1.0 - fx) * b;
            texture_b[base10 + c] += (1.0 - fy) * fx * b;
            texture_b[base01 + c] += fy * (1.0 - fx) * b;
            texture_b[base11 + c] += fy * fx * b;

            let t00 = self.data[base00 + c];
            let t10 = self.data[base10 + c];
            let t01 = self.data[base01 + c];
            let t11 = self.data[base11 + c];
            u_b += b * ((1.0 - fy) * (t10 - t00) + fy * (t11 - t01));
            v_b += b * ((1.0 - fx) * (t01 - t00) + fx * (t11 - t10));
        }
        if !sat_x {
            uv_b[0] += u_b;
        }
        if !sat_y {
            uv_b[1] += v_b;
        }
    }
}

/// Write a rendered f64 image (1 or 3 channels, values clamped to [0, 1])
/// as an 8-bit PNG.
///
/// # Panics
/// Panics if `channels` is not 1 or 3 or the buffer length doesn't match.
pub fn write_image_png<P: AsRef<Path>>(
    path: P,
    image: &[f64],
    height: usize,
    width: usize,
    channels: usize,
) -> Result<(), image::ImageError> {
    assert!(channels == 1 || channels == 3, "png export supports 1 or 3 channels");
    assert_eq!(image.len(), height * width * channels);
    let bytes: Vec<u8> = image
        .iter()
        .map(|v| (v.clamp(0.0, 1.0) * 255.0).round() as u8)
        .collect();
    match channels {
        1 => {
            let buf =
                image::GrayImage::from_raw(width as u32, height as u32, bytes).expect("sized above");
            buf.save(path)
        }
        _ => {
            let buf =
                image::RgbImage::from_raw(width as u32, height as u32, bytes).expect("sized above");
            buf.save(path)
        }
    }
}
