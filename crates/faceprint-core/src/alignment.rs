//! Face alignment via 4-DOF similarity transform.
//!
//! Warps a detected face onto the canonical ArcFace 112×112 template using
//! the five InsightFace reference landmarks and least-squares estimation.

use image::{Rgb, RgbImage};

/// ArcFace reference landmarks for a 112×112 output.
pub(crate) const REFERENCE_LANDMARKS_112: [(f32, f32); 5] = [
    (38.2946, 51.6963), // left eye
    (73.5318, 51.5014), // right eye
    (56.0252, 71.7366), // nose
    (41.5493, 92.3655), // left mouth
    (70.7299, 92.2041), // right mouth
];

pub const ALIGNED_SIZE: u32 = 112;

/// Estimate a 2×3 similarity transform (scale, rotation, translation) mapping
/// `src` landmarks onto `dst`.
///
/// Returns [a, -b, tx, b, a, ty]:
/// ```text
/// | a  -b  tx |
/// | b   a  ty |
/// ```
fn estimate_similarity_transform(src: &[(f32, f32); 5], dst: &[(f32, f32); 5]) -> [f32; 6] {
    // Normal equations for A * [a, b, tx, ty]^T = B, two rows per point:
    //   sx * a - sy * b + tx = dx
    //   sy * a + sx * b + ty = dy
    let mut ata = [[0.0f32; 4]; 4];
    let mut atb = [0.0f32; 4];

    for (&(sx, sy), &(dx, dy)) in src.iter().zip(dst.iter()) {
        let rows = [([sx, -sy, 1.0, 0.0], dx), ([sy, sx, 0.0, 1.0], dy)];
        for (row, target) in rows {
            for j in 0..4 {
                for k in 0..4 {
                    ata[j][k] += row[j] * row[k];
                }
                atb[j] += row[j] * target;
            }
        }
    }

    let [a, b, tx, ty] = solve_4x4(ata, atb);
    [a, -b, tx, b, a, ty]
}

/// Gaussian elimination with partial pivoting. Singular systems fall back to
/// the identity scale with no translation.
#[allow(clippy::needless_range_loop)]
fn solve_4x4(ata: [[f32; 4]; 4], atb: [f32; 4]) -> [f32; 4] {
    let mut m = [[0.0f32; 5]; 4];
    for i in 0..4 {
        m[i][..4].copy_from_slice(&ata[i]);
        m[i][4] = atb[i];
    }

    for col in 0..4 {
        let pivot_row = (col..4)
            .max_by(|&r1, &r2| m[r1][col].abs().total_cmp(&m[r2][col].abs()))
            .unwrap_or(col);
        m.swap(col, pivot_row);

        let pivot = m[col][col];
        if pivot.abs() < 1e-12 {
            return [1.0, 0.0, 0.0, 0.0];
        }

        for row in (col + 1)..4 {
            let factor = m[row][col] / pivot;
            for j in col..5 {
                m[row][j] -= factor * m[col][j];
            }
        }
    }

    let mut x = [0.0f32; 4];
    for i in (0..4).rev() {
        x[i] = m[i][4];
        for j in (i + 1)..4 {
            x[i] -= m[i][j] * x[j];
        }
        x[i] /= m[i][i];
    }
    x
}

/// Apply the similarity transform with bilinear sampling. Pixels mapping
/// outside the source are black.
fn warp_affine(image: &RgbImage, matrix: &[f32; 6], out_size: u32) -> RgbImage {
    let (a, tx) = (matrix[0], matrix[2]);
    let (b, ty) = (matrix[3], matrix[5]);

    let mut output = RgbImage::new(out_size, out_size);

    let det = a * a + b * b;
    if det.abs() < 1e-12 {
        return output;
    }
    let ia = a / det;
    let ib = b / det;

    let (w, h) = (image.width() as i64, image.height() as i64);
    let sample = |x: i64, y: i64| -> [f32; 3] {
        if x >= 0 && x < w && y >= 0 && y < h {
            let p = image.get_pixel(x as u32, y as u32).0;
            [p[0] as f32, p[1] as f32, p[2] as f32]
        } else {
            [0.0; 3]
        }
    };

    for (ox, oy, pixel) in output.enumerate_pixels_mut() {
        // src = M^-1 * (dst - t)
        let dx = ox as f32 - tx;
        let dy = oy as f32 - ty;
        let sx = ia * dx + ib * dy;
        let sy = -ib * dx + ia * dy;

        let x0 = sx.floor() as i64;
        let y0 = sy.floor() as i64;
        let fx = sx - x0 as f32;
        let fy = sy - y0 as f32;

        let tl = sample(x0, y0);
        let tr = sample(x0 + 1, y0);
        let bl = sample(x0, y0 + 1);
        let br = sample(x0 + 1, y0 + 1);

        let mut out = [0u8; 3];
        for c in 0..3 {
            let v = tl[c] * (1.0 - fx) * (1.0 - fy)
                + tr[c] * fx * (1.0 - fy)
                + bl[c] * (1.0 - fx) * fy
                + br[c] * fx * fy;
            out[c] = v.round().clamp(0.0, 255.0) as u8;
        }
        *pixel = Rgb(out);
    }

    output
}

/// Align a detected face to a canonical 112×112 RGB crop for ArcFace.
pub fn align_face(image: &RgbImage, landmarks: &[(f32, f32); 5]) -> RgbImage {
    let matrix = estimate_similarity_transform(landmarks, &REFERENCE_LANDMARKS_112);
    warp_affine(image, &matrix, ALIGNED_SIZE)
}
