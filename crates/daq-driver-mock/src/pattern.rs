//! Synthetic specimen rendering for mock camera frames.
//!
//! The specimen is a field of bright blobs on a dim background. Brightness
//! depends on stage position and focus, so neighbouring tiles and slices look
//! different and overlapping tiles agree where they overlap.

/// Simple pseudo-random number generator (LCG) for reproducible noise.
#[inline]
fn prng(seed: u64) -> u64 {
    seed.wrapping_mul(1103515245).wrapping_add(12345) & 0x7fffffff
}

/// Where the camera is looking.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FieldOfView {
    /// Stage X of the image center in µm
    pub x: f64,
    /// Stage Y of the image center in µm
    pub y: f64,
    /// Focus position in µm
    pub z: f64,
    /// Pixel size in µm
    pub pixel_size_um: f64,
}

/// Render one 16-bit frame of the specimen.
///
/// `frame_num` only varies the noise.
pub fn render_specimen(width: u32, height: u32, fov: FieldOfView, frame_num: u64) -> Vec<u16> {
    let w = width as usize;
    let h = height as usize;
    let mut buffer = vec![0u16; w * h];

    // Blobs sit on a 40 µm lattice; focus blurs them away from z = 0.
    const LATTICE_UM: f64 = 40.0;
    let defocus = 1.0 + (fov.z / 10.0).powi(2);
    let sigma = 6.0 * defocus.sqrt();
    let peak = 40_000.0 / defocus;
    let frame_seed = frame_num.wrapping_mul(2654435761);

    for py in 0..h {
        let sy = fov.y + (py as f64 - h as f64 / 2.0) * fov.pixel_size_um;
        for px in 0..w {
            let sx = fov.x + (px as f64 - w as f64 / 2.0) * fov.pixel_size_um;

            let cx = (sx / LATTICE_UM).round() * LATTICE_UM;
            let cy = (sy / LATTICE_UM).round() * LATTICE_UM;
            let d2 = (sx - cx).powi(2) + (sy - cy).powi(2);
            let blob = peak * (-d2 / (2.0 * sigma * sigma)).exp();

            let idx = py * w + px;
            let noise = (prng(frame_seed ^ idx as u64) & 0x3FF) as f64;
            buffer[idx] = (2_000.0 + blob + noise).clamp(0.0, 65_535.0) as u16;
        }
    }
    buffer
}
