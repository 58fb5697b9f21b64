//! Sting balance calibration: raw bridge voltages to forces.
//!
//! Each orientation has a matrix pair `(Cinv, CinvC2)`. The force vector is a
//! linear inverse-response term minus a second-order correction driven by the
//! magnitudes of the linear contributions:
//!
//! ```text
//! F = Cinv·R − CinvC2·(|Cinv|·R)
//! ```

use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU8, Ordering};

use crate::error::AcqError;

pub type Matrix3 = [[f64; 3]; 3];

/// Which balance preset applies to force computation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Orientation {
    #[default]
    Normal,
    Side,
}

impl Orientation {
    pub fn name(self) -> &'static str {
        match self {
            Self::Normal => "Normal",
            Self::Side => "Side",
        }
    }

    fn to_u8(self) -> u8 {
        match self {
            Self::Normal => 0,
            Self::Side => 1,
        }
    }

    fn from_u8(v: u8) -> Self {
        if v == 1 { Self::Side } else { Self::Normal }
    }
}

impl fmt::Display for Orientation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Orientation {
    type Err = AcqError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "normal" => Ok(Self::Normal),
            "side" => Ok(Self::Side),
            other => Err(AcqError::Config(format!(
                "unknown orientation {other:?} (expected normal or side)"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MatrixPair {
    pub cinv: Matrix3,
    pub cinv_c2: Matrix3,
}

pub const NORMAL: MatrixPair = MatrixPair {
    cinv: [
        [34685.0, -6.0667, -34.774],
        [804.64, 21210.0, 225.29],
        [-1387.3, 73.623, 38938.0],
    ],
    cinv_c2: [
        [0.00090131, 0.00071979, -0.00059586],
        [-0.0085693, -0.00072414, -0.00050641],
        [-0.00079632, 0.028777, -9.6631e-06],
    ],
};

pub const SIDE: MatrixPair = MatrixPair {
    cinv: [
        [-34668.0, 49.226, 41.308],
        [-837.96, 21224.0, -15.823],
        [1395.9, -399.31, -38930.0],
    ],
    cinv_c2: [
        [-0.0016532, 0.00094694, 0.00058309],
        [-0.0025937, 0.00027556, -0.0010782],
        [0.0014352, -0.001701, 2.3735e-05],
    ],
};

/// Read-only lookup of matrix pairs keyed by orientation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CalibrationMatrixSet {
    normal: MatrixPair,
    side: MatrixPair,
}

impl Default for CalibrationMatrixSet {
    fn default() -> Self {
        Self {
            normal: NORMAL,
            side: SIDE,
        }
    }
}

impl CalibrationMatrixSet {
    /// Built-in balance constants with optional per-orientation replacements.
    pub fn with_overrides(normal: Option<MatrixPair>, side: Option<MatrixPair>) -> Self {
        Self {
            normal: normal.unwrap_or(NORMAL),
            side: side.unwrap_or(SIDE),
        }
    }

    pub fn get(&self, orientation: Orientation) -> &MatrixPair {
        match orientation {
            Orientation::Normal => &self.normal,
            Orientation::Side => &self.side,
        }
    }
}

#[inline]
fn mat_vec(m: &Matrix3, v: &[f64; 3]) -> [f64; 3] {
    m.map(|row| row[0] * v[0] + row[1] * v[1] + row[2] * v[2])
}

#[inline]
fn abs3(m: &Matrix3) -> Matrix3 {
    m.map(|row| row.map(f64::abs))
}

/// Apply one matrix pair to a raw voltage triplet.
pub fn apply(pair: &MatrixPair, raw: [f64; 3]) -> [f64; 3] {
    let term1 = mat_vec(&pair.cinv, &raw);
    let magnitude = mat_vec(&abs3(&pair.cinv), &raw);
    let term2 = mat_vec(&pair.cinv_c2, &magnitude);
    [term1[0] - term2[0], term1[1] - term2[1], term1[2] - term2[2]]
}

/// Calibration transform with a switchable orientation.
///
/// The orientation is stored atomically so the GUI side can switch it while
/// the sampling thread keeps calibrating; the change applies from the next
/// `calibrate` call.
#[derive(Debug)]
pub struct CalibrationModel {
    matrices: CalibrationMatrixSet,
    orientation: AtomicU8,
}

impl Default for CalibrationModel {
    fn default() -> Self {
        Self::new(CalibrationMatrixSet::default(), Orientation::Normal)
    }
}

impl CalibrationModel {
    pub fn new(matrices: CalibrationMatrixSet, orientation: Orientation) -> Self {
        Self {
            matrices,
            orientation: AtomicU8::new(orientation.to_u8()),
        }
    }

    pub fn orientation(&self) -> Orientation {
        Orientation::from_u8(self.orientation.load(Ordering::Acquire))
    }

    pub fn set_orientation(&self, orientation: Orientation) {
        let prev = self.orientation.swap(orientation.to_u8(), Ordering::AcqRel);
        if prev != orientation.to_u8() {
            tracing::info!(orientation = %orientation, "calibration orientation changed");
        }
    }

    pub fn matrices(&self) -> &CalibrationMatrixSet {
        &self.matrices
    }

    pub fn calibrate(&self, raw: [f64; 3]) -> [f64; 3] {
        apply(self.matrices.get(self.orientation()), raw)
    }
}
