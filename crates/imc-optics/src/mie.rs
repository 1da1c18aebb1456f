//! Lorenz–Mie theory for homogeneous spheres.
//!
//! Provides the scattering and extinction efficiencies and the asymmetry
//! parameter of a single sphere in a non-absorbing medium. The series is
//! evaluated with the downward-recurrence logarithmic derivative of
//! Bohren & Huffman's `BHMIE`.
//!
//! # Reference
//! Bohren & Huffman, *Absorption and Scattering of Light by Small Particles* (1983).

use num_complex::Complex64;

/// Result of a Mie series evaluation for one sphere.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MieEfficiencies {
    /// Extinction efficiency $Q_{ext}$.
    pub q_ext: f64,
    /// Scattering efficiency $Q_{sca}$.
    pub q_sca: f64,
    /// Asymmetry parameter $g = \langle\cos\theta\rangle$.
    pub g: f64,
}

/// Evaluate the Mie series.
///
/// # Arguments
/// * `size_parameter` - $x = 2\pi r n_{medium} / \lambda$.
/// * `relative_index` - $m = n_{particle} / n_{medium}$ (may be complex).
pub fn mie_efficiencies(size_parameter: f64, relative_index: Complex64) -> MieEfficiencies {
    let x = size_parameter;
    let m = relative_index;
    let y = m * x;

    let n_stop = (x + 4.0 * x.cbrt() + 2.0).round() as usize;
    let n_mx = (n_stop as f64).max(y.norm()).round() as usize + 15;

    // Logarithmic derivative D_n(mx) by downward recurrence
    let mut d = vec![Complex64::new(0.0, 0.0); n_mx + 1];
    for n in (2..=n_mx).rev() {
        let en = n as f64;
        d[n - 1] = en / y - 1.0 / (d[n] + en / y);
    }

    let mut psi0 = x.cos();
    let mut psi1 = x.sin();
    let mut chi0 = -x.sin();
    let mut chi1 = x.cos();
    let mut xi1 = Complex64::new(psi1, -chi1);

    let mut q_sum = 0.0;
    let mut q_ext_sum = 0.0;
    let mut g_sum = 0.0;
    let mut an_prev = Complex64::new(0.0, 0.0);
    let mut bn_prev = Complex64::new(0.0, 0.0);

    for n in 1..=n_stop {
        let en = n as f64;
        let psi = (2.0 * en - 1.0) * psi1 / x - psi0;
        let chi = (2.0 * en - 1.0) * chi1 / x - chi0;
        let xi = Complex64::new(psi, -chi);

        let da = d[n] / m + en / x;
        let db = m * d[n] + en / x;
        let an = (da * psi - psi1) / (da * xi - xi1);
        let bn = (db * psi - psi1) / (db * xi - xi1);

        q_sum += (2.0 * en + 1.0) * (an.norm_sqr() + bn.norm_sqr());
        q_ext_sum += (2.0 * en + 1.0) * (an + bn).re;
        g_sum += (2.0 * en + 1.0) / (en * (en + 1.0)) * (an * bn.conj()).re;
        if n > 1 {
            g_sum += (en - 1.0) * (en + 1.0) / en
                * ((an_prev * an.conj()).re + (bn_prev * bn.conj()).re);
        }

        psi0 = psi1;
        psi1 = psi;
        chi0 = chi1;
        chi1 = chi;
        xi1 = Complex64::new(psi1, -chi1);
        an_prev = an;
        bn_prev = bn;
    }

    let g = if q_sum > 0.0 { 2.0 * g_sum / q_sum } else { 0.0 };
    MieEfficiencies {
        q_ext: 2.0 * q_ext_sum / (x * x),
        q_sca: 2.0 * q_sum / (x * x),
        g,
    }
}

/// Scattering cross-section (m²) and asymmetry of a sphere.
///
/// # Arguments
/// * `radius_m` - Sphere radius in metres.
/// * `wavelength_m` - Vacuum wavelength in metres.
/// * `n_particle` - Refractive index of the sphere.
/// * `n_medium` - Refractive index of the surrounding medium.
pub fn mie_cross_section(
    radius_m: f64,
    wavelength_m: f64,
    n_particle: f64,
    n_medium: f64,
) -> (f64, f64) {
    let x = 2.0 * std::f64::consts::PI * radius_m * n_medium / wavelength_m;
    let eff = mie_efficiencies(x, Complex64::new(n_particle / n_medium, 0.0));
    let area = std::f64::consts::PI * radius_m * radius_m;
    (eff.q_sca * area, eff.g)
}
