//! Immutable real-space lattice and minimum-image distances.
//!
//! A [`Grid`] bundles the Bravais lattice of the simulation cell (row-major
//! basis vectors, in bohr), the number of grid points along each axis, and
//! the derived quantities every consumer needs: cell volume, per-point
//! volume element, reciprocal lattice, and the corner shifts used to refine
//! minimum-image searches in non-orthogonal cells.
//!
//! Distances support dimensional reduction: `dim = 0` measures the full 3-D
//! displacement, `dim = 1` removes the component along `axis` (distance from
//! a line), `dim = 2` keeps only the component along `axis` (distance from a
//! plane).

use std::sync::Arc;

use ndarray::Array3;
use thiserror::Error;

use crate::field::{ScalarField, VectorField};

/// Errors raised while constructing a grid or reducing distances on it.
#[derive(Debug, Error)]
pub enum GridError {
    #[error("grid must have at least one point along each axis, got {0:?}")]
    EmptyAxis([usize; 3]),

    #[error("cell volume must be positive, got {0:.3e}")]
    DegenerateCell(f64),

    #[error("system dimensionality must be 0, 1, or 2, got {0}")]
    InvalidDim(usize),

    #[error("axis must be 0, 1, or 2, got {0}")]
    InvalidAxis(usize),
}

/// An immutable real-space lattice plus its reciprocal-space counterpart.
#[derive(Debug)]
pub struct Grid {
    label: String,
    /// Basis vectors as rows: `lattice[i]` is the i-th cell vector (bohr).
    lattice: [[f64; 3]; 3],
    /// Reciprocal basis vectors as rows, `a_i · b_j = 2π δ_ij`.
    reciprocal: [[f64; 3]; 3],
    nr: [usize; 3],
    nnr: usize,
    volume: f64,
    dv: f64,
    /// The eight corner shifts `-(c1 a1 + c2 a2 + c3 a3)`, `c ∈ {0, 1}³`.
    corners: [[f64; 3]; 8],
}

impl Grid {
    /// Build a grid from cell vectors (rows, bohr) and per-axis point counts.
    pub fn new(
        lattice: [[f64; 3]; 3],
        nr: [usize; 3],
        label: impl Into<String>,
    ) -> Result<Arc<Self>, GridError> {
        if nr.iter().any(|&n| n == 0) {
            return Err(GridError::EmptyAxis(nr));
        }

        let volume = det3(&lattice);
        if volume <= 0.0 {
            return Err(GridError::DegenerateCell(volume));
        }

        let inv = inv3(&lattice, volume);

        // b_i rows of 2π A⁻ᵀ
        let mut reciprocal = [[0.0; 3]; 3];
        for i in 0..3 {
            for j in 0..3 {
                reciprocal[i][j] = 2.0 * std::f64::consts::PI * inv[j][i];
            }
        }

        let mut corners = [[0.0; 3]; 8];
        for (c, corner) in corners.iter_mut().enumerate() {
            for k in 0..3 {
                if c >> k & 1 == 1 {
                    for (x, a) in corner.iter_mut().zip(lattice[k]) {
                        *x -= a;
                    }
                }
            }
        }

        let nnr = nr[0] * nr[1] * nr[2];

        Ok(Arc::new(Self {
            label: label.into(),
            lattice,
            reciprocal,
            nr,
            nnr,
            volume,
            dv: volume / nnr as f64,
            corners,
        }))
    }

    /// Convenience constructor for a cubic cell of side `side` with `n`
    /// points per axis.
    pub fn cubic(side: f64, n: usize, label: impl Into<String>) -> Result<Arc<Self>, GridError> {
        Self::new(
            [[side, 0.0, 0.0], [0.0, side, 0.0], [0.0, 0.0, side]],
            [n, n, n],
            label,
        )
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn lattice(&self) -> &[[f64; 3]; 3] {
        &self.lattice
    }

    pub fn reciprocal(&self) -> &[[f64; 3]; 3] {
        &self.reciprocal
    }

    pub fn nr(&self) -> [usize; 3] {
        self.nr
    }

    /// Total number of grid points.
    pub fn nnr(&self) -> usize {
        self.nnr
    }

    /// Cell volume (bohr³).
    pub fn volume(&self) -> f64 {
        self.volume
    }

    /// Per-point volume element (bohr³).
    pub fn dv(&self) -> f64 {
        self.dv
    }

    /// Diagonal cell extent along `axis` (bohr). Meaningful for cells whose
    /// `axis` vector is aligned with the Cartesian axis, which is the only
    /// case the reduced-dimensionality formulas support.
    pub fn length(&self, axis: usize) -> f64 {
        self.lattice[axis][axis].abs()
    }

    /// Cartesian position of the grid point `(i, j, k)`.
    pub fn position(&self, i: usize, j: usize, k: usize) -> [f64; 3] {
        let f = [
            i as f64 / self.nr[0] as f64,
            j as f64 / self.nr[1] as f64,
            k as f64 / self.nr[2] as f64,
        ];
        let mut r = [0.0; 3];
        for (m, fm) in f.iter().enumerate() {
            for n in 0..3 {
                r[n] += fm * self.lattice[m][n];
            }
        }
        r
    }

    /// Minimum-image displacement of every grid point from `origin`, with
    /// optional dimensional reduction, together with its squared modulus.
    pub fn min_distance(
        self: &Arc<Self>,
        origin: [f64; 3],
        dim: usize,
        axis: usize,
    ) -> Result<(VectorField, ScalarField), GridError> {
        if dim > 2 {
            return Err(GridError::InvalidDim(dim));
        }
        if axis > 2 {
            return Err(GridError::InvalidAxis(axis));
        }

        let [n0, n1, n2] = self.nr;
        let mut comps = [
            Array3::<f64>::zeros((n0, n1, n2)),
            Array3::<f64>::zeros((n0, n1, n2)),
            Array3::<f64>::zeros((n0, n1, n2)),
        ];
        let mut r2 = Array3::<f64>::zeros((n0, n1, n2));

        for i in 0..n0 {
            for j in 0..n1 {
                for k in 0..n2 {
                    let mut dr = self.position(i, j, k);
                    for (x, o) in dr.iter_mut().zip(origin) {
                        *x -= o;
                    }
                    reduce(&mut dr, dim, axis);

                    let (rmin, r2min) = self.minimum_image(dr);
                    for (c, x) in comps.iter_mut().zip(rmin) {
                        c[[i, j, k]] = x;
                    }
                    r2[[i, j, k]] = r2min;
                }
            }
        }

        let label = format!("{}_distance", self.label);
        Ok((
            VectorField::from_components(self.clone(), comps, label.clone()),
            ScalarField::from_data(self.clone(), r2, format!("{label}_sq")),
        ))
    }

    /// Fold `dr` into the home cell and refine against the corner shifts.
    fn minimum_image(&self, dr: [f64; 3]) -> ([f64; 3], f64) {
        // fractional coordinates, wrapped to [0, 1)
        let mut s = [0.0; 3];
        for m in 0..3 {
            for n in 0..3 {
                s[m] += dr[n] * self.reciprocal[m][n];
            }
            s[m] /= 2.0 * std::f64::consts::PI;
            s[m] -= s[m].floor();
        }

        let mut r = [0.0; 3];
        for m in 0..3 {
            for n in 0..3 {
                r[n] += s[m] * self.lattice[m][n];
            }
        }

        let mut rmin = r;
        let mut r2min = norm_sq(&r);

        for corner in &self.corners {
            let shifted = [r[0] + corner[0], r[1] + corner[1], r[2] + corner[2]];
            let s2 = norm_sq(&shifted);
            if s2 < r2min {
                rmin = shifted;
                r2min = s2;
            }
        }

        (rmin, r2min)
    }
}

/// Zero the displacement components excluded by the system dimensionality.
fn reduce(dr: &mut [f64; 3], dim: usize, axis: usize) {
    match dim {
        0 => {}
        1 => dr[axis] = 0.0,
        2 => {
            for (n, x) in dr.iter_mut().enumerate() {
                if n != axis {
                    *x = 0.0;
                }
            }
        }
        _ => unreachable!("dim validated by caller"),
    }
}

fn norm_sq(v: &[f64; 3]) -> f64 {
    v[0] * v[0] + v[1] * v[1] + v[2] * v[2]
}

fn det3(a: &[[f64; 3]; 3]) -> f64 {
    a[0][0] * (a[1][1] * a[2][2] - a[1][2] * a[2][1])
        - a[0][1] * (a[1][0] * a[2][2] - a[1][2] * a[2][0])
        + a[0][2] * (a[1][0] * a[2][1] - a[1][1] * a[2][0])
}

fn inv3(a: &[[f64; 3]; 3], det: f64) -> [[f64; 3]; 3] {
    let mut inv = [[0.0; 3]; 3];
    for i in 0..3 {
        let (i1, i2) = ((i + 1) % 3, (i + 2) % 3);
        for j in 0..3 {
            let (j1, j2) = ((j + 1) % 3, (j + 2) % 3);
            // cofactor transpose
            inv[j][i] = (a[i1][j1] * a[i2][j2] - a[i1][j2] * a[i2][j1]) / det;
        }
    }
    inv
}
