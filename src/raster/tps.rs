//! Control-point transforms: thin-plate spline and first-order polynomial.
//!
//! ```text
//! f(x,y) = a₀ + a₁x + a₂y + Σᵢ wᵢ U(||(x,y) - (xᵢ,yᵢ)||),  U(r) = r² log(r)
//! ```
//!
//! Both models are fitted in normalised coordinates (centred on the mean,
//! scaled by the largest offset) so pixel and degree magnitudes do not
//! wreck the conditioning of the system.

use glam::DVec2;

/// Maps points between two planes
pub trait PointTransform: Send + Sync {
    fn transform(&self, p: DVec2) -> DVec2;
}

/// Centre/scale normalisation for a point cloud
#[derive(Debug, Clone, Copy)]
struct Normalization {
    center: DVec2,
    scale: f64,
}

impl Normalization {
    fn fit(points: &[DVec2]) -> Self {
        let center = points.iter().copied().sum::<DVec2>() / points.len() as f64;
        let extent = points
            .iter()
            .map(|p| (*p - center).abs().max_element())
            .fold(0.0f64, f64::max);

        Self {
            center,
            scale: if extent > 0.0 { extent } else { 1.0 },
        }
    }

    #[inline]
    fn apply(&self, p: DVec2) -> DVec2 {
        (p - self.center) / self.scale
    }

    #[inline]
    fn undo(&self, p: DVec2) -> DVec2 {
        p * self.scale + self.center
    }
}

/// Thin-plate spline interpolating exactly through its control points
#[derive(Debug, Clone)]
pub struct ThinPlateSpline {
    /// Control points in normalised source space
    control_points: Vec<DVec2>,
    weights_x: Vec<f64>,
    weights_y: Vec<f64>,
    /// Affine coefficients for x: a0 + a1*x + a2*y
    affine_x: [f64; 3],
    affine_y: [f64; 3],
    source_norm: Normalization,
    target_norm: Normalization,
}

impl ThinPlateSpline {
    /// Fits a spline mapping `source_points[i]` onto `target_points[i]`.
    ///
    /// Returns None when there are fewer than 3 points, the slices differ
    /// in length, or the system is singular (coincident or collinear points).
    pub fn fit(source_points: &[DVec2], target_points: &[DVec2]) -> Option<Self> {
        let n = source_points.len();
        if n < 3 || n != target_points.len() {
            return None;
        }

        let source_norm = Normalization::fit(source_points);
        let target_norm = Normalization::fit(target_points);
        let src: Vec<DVec2> = source_points.iter().map(|&p| source_norm.apply(p)).collect();
        let dst: Vec<DVec2> = target_points.iter().map(|&p| target_norm.apply(p)).collect();

        // [K  P] [w]   [v]
        // [Pᵀ 0] [a] = [0]
        let size = n + 3;
        let mut matrix = vec![vec![0.0; size]; size];

        for i in 0..n {
            for j in 0..n {
                if i != j {
                    matrix[i][j] = tps_kernel(src[i].distance(src[j]));
                }
            }

            let p = src[i];
            matrix[i][n] = 1.0;
            matrix[i][n + 1] = p.x;
            matrix[i][n + 2] = p.y;

            matrix[n][i] = 1.0;
            matrix[n + 1][i] = p.x;
            matrix[n + 2][i] = p.y;
        }

        let mut rhs_x = vec![0.0; size];
        let mut rhs_y = vec![0.0; size];
        for (i, p) in dst.iter().enumerate() {
            rhs_x[i] = p.x;
            rhs_y[i] = p.y;
        }

        let solution_x = solve_linear_system(&matrix, &rhs_x)?;
        let solution_y = solve_linear_system(&matrix, &rhs_y)?;

        Some(Self {
            weights_x: solution_x[..n].to_vec(),
            weights_y: solution_y[..n].to_vec(),
            affine_x: [solution_x[n], solution_x[n + 1], solution_x[n + 2]],
            affine_y: [solution_y[n], solution_y[n + 1], solution_y[n + 2]],
            control_points: src,
            source_norm,
            target_norm,
        })
    }
}

impl PointTransform for ThinPlateSpline {
    fn transform(&self, p: DVec2) -> DVec2 {
        let p = self.source_norm.apply(p);

        let mut tx = self.affine_x[0] + self.affine_x[1] * p.x + self.affine_x[2] * p.y;
        let mut ty = self.affine_y[0] + self.affine_y[1] * p.x + self.affine_y[2] * p.y;

        for (i, &cp) in self.control_points.iter().enumerate() {
            let u = tps_kernel(p.distance(cp));
            tx += self.weights_x[i] * u;
            ty += self.weights_y[i] * u;
        }

        self.target_norm.undo(DVec2::new(tx, ty))
    }
}

/// Least-squares first-order polynomial (affine) fit
#[derive(Debug, Clone)]
pub struct AffineModel {
    coeffs_x: [f64; 3],
    coeffs_y: [f64; 3],
    source_norm: Normalization,
    target_norm: Normalization,
}

impl AffineModel {
    /// Fits `target ≈ c0 + c1*x + c2*y` per axis; None if the normal
    /// equations are singular.
    pub fn fit(source_points: &[DVec2], target_points: &[DVec2]) -> Option<Self> {
        let n = source_points.len();
        if n < 3 || n != target_points.len() {
            return None;
        }

        let source_norm = Normalization::fit(source_points);
        let target_norm = Normalization::fit(target_points);

        let mut ata = vec![vec![0.0; 3]; 3];
        let mut atb_x = vec![0.0; 3];
        let mut atb_y = vec![0.0; 3];

        for (s, t) in source_points.iter().zip(target_points) {
            let s = source_norm.apply(*s);
            let t = target_norm.apply(*t);
            let row = [1.0, s.x, s.y];
            for i in 0..3 {
                for j in 0..3 {
                    ata[i][j] += row[i] * row[j];
                }
                atb_x[i] += row[i] * t.x;
                atb_y[i] += row[i] * t.y;
            }
        }

        let cx = solve_linear_system(&ata, &atb_x)?;
        let cy = solve_linear_system(&ata, &atb_y)?;

        Some(Self {
            coeffs_x: [cx[0], cx[1], cx[2]],
            coeffs_y: [cy[0], cy[1], cy[2]],
            source_norm,
            target_norm,
        })
    }
}

impl PointTransform for AffineModel {
    fn transform(&self, p: DVec2) -> DVec2 {
        let p = self.source_norm.apply(p);
        let x = self.coeffs_x[0] + self.coeffs_x[1] * p.x + self.coeffs_x[2] * p.y;
        let y = self.coeffs_y[0] + self.coeffs_y[1] * p.x + self.coeffs_y[2] * p.y;
        self.target_norm.undo(DVec2::new(x, y))
    }
}

/// TPS radial basis function: U(r) = r² log(r), U(0) = 0
#[inline]
pub(crate) fn tps_kernel(r: f64) -> f64 {
    if r < 1e-10 { 0.0 } else { r * r * r.ln() }
}

/// Solve Ax = b by Gaussian elimination with partial pivoting.
#[allow(clippy::needless_range_loop)]
fn solve_linear_system(a: &[Vec<f64>], b: &[f64]) -> Option<Vec<f64>> {
    let n = b.len();
    if a.len() != n || a.iter().any(|row| row.len() != n) {
        return None;
    }

    let mut aug: Vec<Vec<f64>> = a
        .iter()
        .zip(b.iter())
        .map(|(row, &bi)| {
            let mut new_row = row.clone();
            new_row.push(bi);
            new_row
        })
        .collect();

    for col in 0..n {
        let mut max_row = col;
        let mut max_val = aug[col][col].abs();
        for row in (col + 1)..n {
            let val = aug[row][col].abs();
            if val > max_val {
                max_val = val;
                max_row = row;
            }
        }

        if max_val < 1e-10 {
            return None;
        }

        if max_row != col {
            aug.swap(col, max_row);
        }

        for row in (col + 1)..n {
            let factor = aug[row][col] / aug[col][col];
            for j in col..=n {
                aug[row][j] -= factor * aug[col][j];
            }
        }
    }

    let mut x = vec![0.0; n];
    for i in (0..n).rev() {
        x[i] = aug[i][n];
        for j in (i + 1)..n {
            x[i] -= aug[i][j] * x[j];
        }
        x[i] /= aug[i][i];
    }

    if x.iter().all(|v| v.is_finite()) {
        Some(x)
    } else {
        None
    }
}
