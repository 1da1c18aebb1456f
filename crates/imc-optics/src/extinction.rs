//! Tabulated molar extinction spectra of tissue chromophores.
//!
//! Haemoglobin data follow S. Prahl, *Tabulated molar extinction coefficient
//! for hemoglobin in water* (Oregon Medical Laser Center, 1998), resampled to
//! 10 nm. Bilirubin and β-carotene follow the PhotochemCAD spectra compiled by
//! the same source, scaled to their published peak molar extinction.
//!
//! Tables are stored as published, (λ/nm, ε/(cm⁻¹ M⁻¹)), and converted once on
//! load to (λ/m, ε/(m⁻¹ M⁻¹)).
//!
//! ## Available chromophores
//!
//! | Chromophore | Range | Molar mass (g/mol) |
//! |-------------|-------|--------------------|
//! | HbO₂, Hb | 400–1000 nm | 64 500 |
//! | Bilirubin | 400–1000 nm | 584.66 |
//! | β-carotene | 400–1000 nm | 536.87 |

use std::sync::{Arc, OnceLock};

use crate::interp::LinearInterpolant;
use crate::provider::OpticsError;
use crate::NM;

/// Molar mass of haemoglobin (g/mol).
pub const HB_MOLAR_MASS: f64 = 64_500.0;
/// Molar mass of bilirubin (g/mol).
pub const BILIRUBIN_MOLAR_MASS: f64 = 584.66;
/// Molar mass of β-carotene (g/mol).
pub const BETA_CAROTENE_MOLAR_MASS: f64 = 536.87;

/// Per-centimetre to per-metre.
const PER_CM_TO_PER_M: f64 = 100.0;

/// (λ/nm, HbO₂, Hb) molar extinction in cm⁻¹/M.
const HAEMOGLOBIN: &[(f64, f64, f64)] = &[
    (400.0, 266232.0, 223296.0),
    (410.0, 466816.0, 303956.0),
    (420.0, 480360.0, 407560.0),
    (430.0, 246072.0, 528600.0),
    (440.0, 102580.0, 413280.0),
    (450.0, 62816.0, 103292.0),
    (460.0, 44480.0, 23388.8),
    (470.0, 33209.2, 16156.4),
    (480.0, 26629.2, 14550.0),
    (490.0, 23684.4, 16684.0),
    (500.0, 20932.8, 20035.2),
    (510.0, 20035.2, 25773.6),
    (520.0, 24202.4, 31589.6),
    (530.0, 39956.8, 39036.4),
    (540.0, 53236.0, 46592.0),
    (550.0, 43016.0, 53412.0),
    (560.0, 32613.2, 53788.0),
    (570.0, 44496.0, 45072.0),
    (580.0, 50104.0, 37020.0),
    (590.0, 14400.8, 28324.4),
    (600.0, 3200.0, 14677.2),
    (610.0, 1506.0, 9443.6),
    (620.0, 942.0, 6509.6),
    (630.0, 610.0, 5148.8),
    (640.0, 442.0, 4345.2),
    (650.0, 368.0, 3750.12),
    (660.0, 319.6, 3226.56),
    (670.0, 294.0, 2795.12),
    (680.0, 277.6, 2407.92),
    (690.0, 276.0, 2051.96),
    (700.0, 290.0, 1794.28),
    (710.0, 314.0, 1540.48),
    (720.0, 348.0, 1325.88),
    (730.0, 390.0, 1102.2),
    (740.0, 446.0, 1115.88),
    (750.0, 518.0, 1405.24),
    (760.0, 586.0, 1548.52),
    (770.0, 650.0, 1311.88),
    (780.0, 710.0, 1075.44),
    (790.0, 756.0, 890.8),
    (800.0, 816.0, 761.72),
    (810.0, 864.0, 717.08),
    (820.0, 916.0, 693.76),
    (830.0, 952.0, 693.04),
    (840.0, 1016.0, 692.36),
    (850.0, 1058.0, 691.32),
    (860.0, 1092.0, 694.32),
    (870.0, 1146.0, 714.4),
    (880.0, 1178.0, 735.8),
    (890.0, 1206.0, 781.56),
    (900.0, 1198.0, 795.36),
    (910.0, 1208.0, 837.6),
    (920.0, 1218.0, 869.4),
    (930.0, 1216.0, 876.0),
    (940.0, 1204.0, 864.4),
    (950.0, 1174.0, 844.0),
    (960.0, 1126.0, 816.0),
    (970.0, 1078.0, 772.0),
    (980.0, 1030.0, 716.0),
    (990.0, 968.0, 656.0),
    (1000.0, 914.0, 600.0),
];

/// (λ/nm, ε) bilirubin molar extinction in cm⁻¹/M. Zero above 560 nm.
const BILIRUBIN: &[(f64, f64)] = &[
    (400.0, 22000.0),
    (410.0, 26500.0),
    (420.0, 33000.0),
    (430.0, 40500.0),
    (440.0, 48500.0),
    (450.0, 54500.0),
    (460.0, 54600.0),
    (470.0, 48000.0),
    (480.0, 38000.0),
    (490.0, 25000.0),
    (500.0, 12500.0),
    (510.0, 4500.0),
    (520.0, 1500.0),
    (530.0, 500.0),
    (540.0, 120.0),
    (550.0, 20.0),
    (560.0, 0.0),
    (1000.0, 0.0),
];

/// (λ/nm, ε) β-carotene molar extinction in cm⁻¹/M. Zero above 540 nm.
const BETA_CAROTENE: &[(f64, f64)] = &[
    (400.0, 40000.0),
    (410.0, 58000.0),
    (420.0, 85000.0),
    (430.0, 105000.0),
    (440.0, 124000.0),
    (450.0, 139500.0),
    (460.0, 126000.0),
    (470.0, 131000.0),
    (480.0, 136000.0),
    (490.0, 90000.0),
    (500.0, 40000.0),
    (510.0, 8000.0),
    (520.0, 1000.0),
    (530.0, 100.0),
    (540.0, 0.0),
    (1000.0, 0.0),
];

/// Interpolated extinction spectra in SI-consistent units.
///
/// Wavelengths are in metres, extinction in m⁻¹ M⁻¹.
#[derive(Debug, Clone)]
pub struct ChromophoreTables {
    hbo2: LinearInterpolant,
    hb: LinearInterpolant,
    bilirubin: LinearInterpolant,
    beta_carotene: LinearInterpolant,
}

impl ChromophoreTables {
    /// Build the interpolants from the embedded tables.
    pub fn load() -> Result<Self, OpticsError> {
        let wl: Vec<f64> = HAEMOGLOBIN.iter().map(|&(lam, _, _)| lam * NM).collect();
        let hbo2 = HAEMOGLOBIN
            .iter()
            .map(|&(_, e, _)| e * PER_CM_TO_PER_M)
            .collect();
        let hb = HAEMOGLOBIN
            .iter()
            .map(|&(_, _, e)| e * PER_CM_TO_PER_M)
            .collect();

        Ok(Self {
            hbo2: LinearInterpolant::new(wl.clone(), hbo2)?,
            hb: LinearInterpolant::new(wl, hb)?,
            bilirubin: single_table(BILIRUBIN)?,
            beta_carotene: single_table(BETA_CAROTENE)?,
        })
    }

    /// Process-wide instance, built on first use.
    pub fn shared() -> Result<Arc<Self>, OpticsError> {
        static TABLES: OnceLock<Arc<ChromophoreTables>> = OnceLock::new();
        if let Some(tables) = TABLES.get() {
            return Ok(Arc::clone(tables));
        }
        let tables = Arc::new(Self::load()?);
        Ok(Arc::clone(TABLES.get_or_init(|| tables)))
    }

    /// Wavelength range (m) covered by every table.
    pub fn wavelength_range(&self) -> (f64, f64) {
        let ranges = [
            self.hbo2.range(),
            self.hb.range(),
            self.bilirubin.range(),
            self.beta_carotene.range(),
        ];
        ranges
            .iter()
            .fold((f64::NEG_INFINITY, f64::INFINITY), |(lo, hi), r| {
                (lo.max(r.0), hi.min(r.1))
            })
    }

    /// Oxy- and deoxy-haemoglobin extinction (m⁻¹/M) at `wavelength_m`.
    pub fn haemoglobin(&self, wavelength_m: f64) -> Result<(f64, f64), OpticsError> {
        Ok((
            self.hbo2.evaluate(wavelength_m)?,
            self.hb.evaluate(wavelength_m)?,
        ))
    }

    /// Bilirubin extinction (m⁻¹/M) at `wavelength_m`.
    pub fn bilirubin(&self, wavelength_m: f64) -> Result<f64, OpticsError> {
        self.bilirubin.evaluate(wavelength_m)
    }

    /// β-carotene extinction (m⁻¹/M) at `wavelength_m`.
    pub fn beta_carotene(&self, wavelength_m: f64) -> Result<f64, OpticsError> {
        self.beta_carotene.evaluate(wavelength_m)
    }
}

fn single_table(data: &[(f64, f64)]) -> Result<LinearInterpolant, OpticsError> {
    let (wl, eps) = data
        .iter()
        .map(|&(lam, e)| (lam * NM, e * PER_CM_TO_PER_M))
        .unzip();
    LinearInterpolant::new(wl, eps)
}
