//! System-shape descriptor: centre and extent of the embedded region.

use crate::physical::{Ions, PhysicalError};

/// Geometric descriptor of the embedded system, optionally reduced to a
/// slab (`dim = 2`) or wire (`dim = 1`) geometry about `axis`.
#[derive(Debug)]
pub struct System {
    dim: usize,
    axis: usize,
    /// Number of leading ion types that define the system; 0 means all.
    ntypes: usize,
    com: [f64; 3],
    width: f64,
    pub updating: bool,
}

impl System {
    pub fn new(ntypes: usize, dim: usize, axis: usize) -> Self {
        Self {
            dim,
            axis,
            ntypes,
            com: [0.0; 3],
            width: 0.0,
            updating: false,
        }
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn axis(&self) -> usize {
        self.axis
    }

    pub fn com(&self) -> [f64; 3] {
        self.com
    }

    pub fn width(&self) -> f64 {
        self.width
    }

    /// Refresh the centre and width from the current ion positions.
    /// `center` overrides the mass-weighted centre.
    pub fn update(&mut self, ions: &Ions, center: Option<[f64; 3]>) -> Result<(), PhysicalError> {
        let ntypes = if self.ntypes == 0 {
            ions.iontypes().len()
        } else {
            self.ntypes
        };

        self.com = match center {
            Some(c) => c,
            None => {
                let mut com = [0.0; 3];
                let mut total_weight = 0.0;
                for i in 0..ions.count() {
                    let iontype = ions.iontype_of(i);
                    if iontype.index >= ntypes {
                        continue;
                    }
                    for (c, x) in com.iter_mut().zip(ions.coords()[i]) {
                        *c += x * iontype.weight;
                    }
                    total_weight += iontype.weight;
                }
                com.map(|c| c / total_weight)
            }
        };

        self.width = 0.0;
        for i in 0..ions.count() {
            if ions.iontype_of(i).index >= ntypes {
                continue;
            }

            let mut dist = 0.0;
            for j in 0..3 {
                let excluded = (self.dim == 1 && j == self.axis)
                    || (self.dim == 2 && j != self.axis);
                if excluded {
                    continue;
                }
                let d = ions.coords()[i][j] - self.com[j];
                dist += d * d;
            }
            self.width = self.width.max(dist);
        }
        self.width = self.width.sqrt();

        Ok(())
    }
}
