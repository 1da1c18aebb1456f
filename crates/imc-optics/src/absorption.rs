//! Absorption coefficient models.
//!
//! The general model sums the contributions of blood, bilirubin and
//! β-carotene:
//!
//! $$\mu_a(\lambda) = \ln 10 \left[ \frac{c_{Hb}}{M_{Hb}} \bigl(s\,\varepsilon_{HbO_2}(\lambda)
//!   + (1-s)\,\varepsilon_{Hb}(\lambda)\bigr) f_{blood}
//!   + \frac{c_{bili}}{M_{bili}} \varepsilon_{bili}(\lambda)
//!   + \frac{c_{\beta C}}{M_{\beta C}} \varepsilon_{\beta C}(\lambda) \right]$$
//!
//! with concentrations in g/l, molar masses in g/mol and ε in m⁻¹/M, giving
//! $\mu_a$ in 1/m.

use std::f64::consts::LN_10;
use std::sync::Arc;

use crate::extinction::{
    ChromophoreTables, BETA_CAROTENE_MOLAR_MASS, BILIRUBIN_MOLAR_MASS, HB_MOLAR_MASS,
};
use crate::provider::{AbsorptionModel, LayerParameters, OpticsError};

/// Haemoglobin concentration in whole blood (g/l).
pub const DEFAULT_C_HB: f64 = 120.0;

/// Blood, bilirubin and β-carotene absorption.
#[derive(Debug, Clone)]
pub struct Ua {
    /// Blood volume fraction.
    pub bvf: f64,
    /// Oxygen saturation.
    pub sao2: f64,
    /// Haemoglobin concentration in blood (g/l).
    pub c_hb: f64,
    /// Bilirubin concentration (g/l).
    pub c_bili: f64,
    /// β-carotene concentration (g/l).
    pub c_beta_carotene: f64,
    tables: Arc<ChromophoreTables>,
}

impl Ua {
    /// Absorption model with default physiology: 2 % blood at 70 % saturation.
    pub fn new() -> Result<Self, OpticsError> {
        Ok(Self {
            bvf: 0.02,
            sao2: 0.7,
            c_hb: DEFAULT_C_HB,
            c_bili: 0.0,
            c_beta_carotene: 0.0,
            tables: ChromophoreTables::shared()?,
        })
    }

    /// Absorption coefficient (1/m) at `wavelength_m` for the current state.
    pub fn evaluate(&self, wavelength_m: f64) -> Result<f64, OpticsError> {
        let (e_hbo2, e_hb) = self.tables.haemoglobin(wavelength_m)?;
        let ua_blood = LN_10 * self.c_hb / HB_MOLAR_MASS
            * (self.sao2 * e_hbo2 + (1.0 - self.sao2) * e_hb)
            * self.bvf;

        let ua_bilirubin = if self.c_bili > 0.0 {
            LN_10 * self.c_bili / BILIRUBIN_MOLAR_MASS * self.tables.bilirubin(wavelength_m)?
        } else {
            0.0
        };

        let ua_carotene = if self.c_beta_carotene > 0.0 {
            LN_10 * self.c_beta_carotene / BETA_CAROTENE_MOLAR_MASS
                * self.tables.beta_carotene(wavelength_m)?
        } else {
            0.0
        };

        Ok(ua_blood + ua_bilirubin + ua_carotene)
    }
}

impl AbsorptionModel for Ua {
    fn name(&self) -> &str {
        "Ua"
    }

    fn absorption(&self, params: &LayerParameters, wavelength_m: f64) -> Result<f64, OpticsError> {
        let layer = Ua {
            bvf: params.bvf,
            sao2: params.sao2,
            c_bili: params.c_bili,
            ..self.clone()
        };
        layer.evaluate(wavelength_m)
    }
}

/// Muscle absorption with a fixed, empirically chosen blood content.
///
/// Layer parameters are ignored.
#[derive(Debug, Clone)]
pub struct UaMuscle {
    ua: Ua,
}

impl UaMuscle {
    /// Blood volume fraction of muscle.
    pub const BVF: f64 = 0.1;
    /// Oxygen saturation of muscle blood.
    pub const SAO2: f64 = 0.7;

    pub fn new() -> Result<Self, OpticsError> {
        let ua = Ua {
            bvf: Self::BVF,
            sao2: Self::SAO2,
            ..Ua::new()?
        };
        Ok(Self { ua })
    }
}

impl AbsorptionModel for UaMuscle {
    fn name(&self) -> &str {
        "UaMuscle"
    }

    fn absorption(&self, _params: &LayerParameters, wavelength_m: f64) -> Result<f64, OpticsError> {
        self.ua.evaluate(wavelength_m)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::NM;

    #[test]
    fn test_reference_range_at_532nm() {
        let ua = Ua::new().unwrap();
        let per_cm = ua.evaluate(532.0 * NM).unwrap() / 100.0;
        assert!(per_cm > 3.0 && per_cm < 4.0, "ua(532 nm) = {} 1/cm", per_cm);
    }

    #[test]
    fn test_reference_range_at_800nm() {
        let ua = Ua::new().unwrap();
        let per_cm = ua.evaluate(800.0 * NM).unwrap() / 100.0;
        assert!(per_cm > 0.05 && per_cm < 0.15, "ua(800 nm) = {} 1/cm", per_cm);
    }

    #[test]
    fn test_saturation_changes_absorption_at_532nm() {
        let mut ua = Ua::new().unwrap();
        ua.sao2 = 0.0;
        let deoxy = ua.evaluate(532.0 * NM).unwrap();
        ua.sao2 = 1.0;
        let oxy = ua.evaluate(532.0 * NM).unwrap();
        assert_ne!(deoxy, oxy);
    }

    #[test]
    fn test_repeated_evaluation_is_bit_identical() {
        let ua = Ua::new().unwrap();
        let params = LayerParameters { bvf: 0.05, sao2: 0.3, ..Default::default() };
        let a = ua.absorption(&params, 560.0 * NM).unwrap();
        let b = ua.absorption(&params, 560.0 * NM).unwrap();
        assert_eq!(a.to_bits(), b.to_bits());
    }

    #[test]
    fn test_absorption_is_linear_in_blood_volume() {
        let ua = Ua::new().unwrap();
        let low = LayerParameters { bvf: 0.01, ..Default::default() };
        let high = LayerParameters { bvf: 0.04, ..Default::default() };
        let ratio = ua.absorption(&high, 600.0 * NM).unwrap() / ua.absorption(&low, 600.0 * NM).unwrap();
        approx::assert_relative_eq!(ratio, 4.0, max_relative = 1e-12);
    }

    #[test]
    fn test_bilirubin_adds_blue_absorption() {
        let ua = Ua::new().unwrap();
        let plain = LayerParameters::default();
        let jaundiced = LayerParameters { c_bili: 0.2, ..Default::default() };
        let blue = 460.0 * NM;
        let red = 650.0 * NM;
        assert!(ua.absorption(&jaundiced, blue).unwrap() > ua.absorption(&plain, blue).unwrap());
        assert_eq!(
            ua.absorption(&jaundiced, red).unwrap(),
            ua.absorption(&plain, red).unwrap()
        );
    }

    #[test]
    fn test_out_of_table_wavelength_fails() {
        let ua = Ua::new().unwrap();
        assert!(ua.evaluate(300.0 * NM).is_err());
    }

    #[test]
    fn test_muscle_ignores_layer_parameters() {
        let muscle = UaMuscle::new().unwrap();
        let a = muscle.absorption(&LayerParameters::default(), 600.0 * NM).unwrap();
        let b = muscle
            .absorption(&LayerParameters { bvf: 0.0, ..Default::default() }, 600.0 * NM)
            .unwrap();
        assert_eq!(a, b);
        assert!(a > 0.0);
    }
}
