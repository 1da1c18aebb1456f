//! Writer and reader for the MCML input (`.mci`) format.
//!
//! The layout is fixed, including comment text, because the engine and the
//! reference files it was validated against depend on it:
//!
//! ```text
//! 1.0 # file version
//! 1 # number of runs
//!
//! <output file> A # output filename, ASCII/Binary
//! 1000000 # No. of photons
//! 0.002 2.0 # dz, dr
//! 500 1 1 # No. of dz, dr & da.
//!
//! 3 # No. of layers
//! # n mua mus g d # One line for each layer
//! 1.0 # n for medium above.
//! <n> <mua> <mus> <g> <d>
//! ...
//! 1.0 # n for medium below.
//! ```
//!
//! Layer lines are fixed point: `n` and `g` with 3 decimals, `mua`, `mus`
//! and `d` with 5 decimals. `mua`/`mus` are written in 1/cm and `d` in cm;
//! internally everything is 1/m and m.

use std::path::Path;

use super::{McmlSettings, SimError};
use crate::types::OpticalLayer;

/// Per-metre to per-centimetre.
const PER_M_TO_PER_CM: f64 = 1.0 / 100.0;
/// Metres to centimetres.
const M_TO_CM: f64 = 100.0;

const LAYER_COUNT_MARKER: &str = "# No. of layers";

/// Render the input file text.
pub fn format_mci(settings: &McmlSettings, mco_filename: &str, layers: &[OpticalLayer]) -> String {
    let mut out = format!(
        "{:?} # file version\n\
         {} # number of runs\n\
         \n\
         {} A # output filename, ASCII/Binary\n\
         {} # No. of photons\n\
         {:?} {:?} # dz, dr\n\
         {} {} {} # No. of dz, dr & da.\n\
         \n\
         {} {}\n\
         # n mua mus g d # One line for each layer\n\
         {:?} # n for medium above.\n",
        settings.file_version,
        settings.nr_runs,
        mco_filename,
        settings.nr_photons,
        settings.dz,
        settings.dr,
        settings.nr_dz,
        settings.nr_dr,
        settings.nr_da,
        layers.len(),
        LAYER_COUNT_MARKER,
        settings.n_above,
    );
    for layer in layers {
        out.push_str(&format_layer(layer));
        out.push('\n');
    }
    out.push_str(&format!("{:?} # n for medium below.\n", settings.n_below));
    out
}

/// Render one layer line in engine units.
pub fn format_layer(layer: &OpticalLayer) -> String {
    format!(
        "{:.3} {:.5} {:.5} {:.3} {:.5}",
        layer.n,
        layer.ua * PER_M_TO_PER_CM,
        layer.us * PER_M_TO_PER_CM,
        layer.g,
        layer.d * M_TO_CM,
    )
}

/// Write the input file and verify that it exists afterwards.
///
/// # Errors
/// [`SimError::InputFileMissing`] if the file is absent after writing.
pub fn write_mci(
    path: &Path,
    settings: &McmlSettings,
    mco_filename: &str,
    layers: &[OpticalLayer],
) -> Result<(), SimError> {
    settings.validate()?;
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    std::fs::write(path, format_mci(settings, mco_filename, layers))?;
    if !path.is_file() {
        return Err(SimError::InputFileMissing(path.to_path_buf()));
    }
    log::debug!("Wrote engine input {}", path.display());
    Ok(())
}

/// Parse one layer line back into SI units.
pub fn parse_layer(line: &str, line_nr: usize) -> Result<OpticalLayer, SimError> {
    let parts: Vec<&str> = line.split_whitespace().collect();
    if parts.len() != 5 {
        return Err(SimError::Parse {
            line: line_nr,
            message: format!("Expected 'n mua mus g d', got '{}'", line),
        });
    }
    let mut values = [0.0; 5];
    for (v, p) in values.iter_mut().zip(&parts) {
        *v = p.parse().map_err(|_| SimError::Parse {
            line: line_nr,
            message: format!("Invalid number: {}", p),
        })?;
    }
    Ok(OpticalLayer {
        n: values[0],
        ua: values[1] / PER_M_TO_PER_CM,
        us: values[2] / PER_M_TO_PER_CM,
        g: values[3],
        d: values[4] / M_TO_CM,
    })
}

/// Recover the layer stack from input file text.
pub fn parse_mci_layers(content: &str) -> Result<Vec<OpticalLayer>, SimError> {
    let lines: Vec<&str> = content.lines().collect();
    let (idx, count_line) = lines
        .iter()
        .enumerate()
        .find(|(_, l)| l.contains(LAYER_COUNT_MARKER))
        .ok_or_else(|| SimError::Parse {
            line: 0,
            message: "No layer count line".into(),
        })?;

    let nr_layers: usize = count_line
        .split_whitespace()
        .next()
        .and_then(|t| t.parse().ok())
        .ok_or_else(|| SimError::Parse {
            line: idx + 1,
            message: format!("Invalid layer count line '{}'", count_line),
        })?;

    // Layer count, column comment, medium above, then the layers.
    let first = idx + 3;
    if lines.len() < first + nr_layers {
        return Err(SimError::Parse {
            line: lines.len(),
            message: format!("Header says {} layers but file ends early", nr_layers),
        });
    }

    (0..nr_layers)
        .map(|i| parse_layer(lines[first + i], first + i + 1))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn reference_layers() -> Vec<OpticalLayer> {
        vec![
            OpticalLayer { n: 1.38, ua: 347.5, us: 15000.0, g: 0.9, d: 500e-6 },
            OpticalLayer { n: 1.36, ua: 12.5, us: 8125.0, g: 0.85, d: 1e-3 },
            OpticalLayer { n: 1.36, ua: 2.0, us: 32500.0, g: 0.96, d: 1.5e-3 },
        ]
    }

    #[test]
    fn test_reference_file_is_byte_identical() {
        let expected = "\
1.0 # file version
1 # number of runs

/tmp/job.mco A # output filename, ASCII/Binary
1000000 # No. of photons
0.002 2.0 # dz, dr
500 1 1 # No. of dz, dr & da.

3 # No. of layers
# n mua mus g d # One line for each layer
1.0 # n for medium above.
1.380 3.47500 150.00000 0.900 0.05000
1.360 0.12500 81.25000 0.850 0.10000
1.360 0.02000 325.00000 0.960 0.15000
1.0 # n for medium below.
";
        let text = format_mci(&McmlSettings::default(), "/tmp/job.mco", &reference_layers());
        assert_eq!(text, expected);
    }

    #[test]
    fn test_line_layout_per_layer_count() {
        for layers in [Vec::new(), reference_layers()] {
            let text = format_mci(&McmlSettings::default(), "out.mco", &layers);
            assert!(text.ends_with("1.0 # n for medium below.\n"));
            assert_eq!(text.lines().count(), 12 + layers.len());
            let count_line = text.lines().find(|l| l.contains(LAYER_COUNT_MARKER)).unwrap();
            assert_eq!(count_line, format!("{} {}", layers.len(), LAYER_COUNT_MARKER));
        }
    }

    #[test]
    fn test_layer_line_round_trip() {
        let layer = OpticalLayer { n: 1.3712, ua: 123.456789, us: 9876.54321, g: 0.8764, d: 123.4e-6 };
        let back = parse_layer(&format_layer(&layer), 1).unwrap();
        assert_abs_diff_eq!(back.n, layer.n, epsilon = 5e-4);
        assert_abs_diff_eq!(back.g, layer.g, epsilon = 5e-4);
        // 5 decimals in 1/cm and cm
        assert_abs_diff_eq!(back.ua, layer.ua, epsilon = 1e-3);
        assert_abs_diff_eq!(back.us, layer.us, epsilon = 1e-3);
        assert_abs_diff_eq!(back.d, layer.d, epsilon = 1e-7);
    }

    #[test]
    fn test_parse_file_recovers_stack() {
        let layers = reference_layers();
        let text = format_mci(&McmlSettings::default(), "out.mco", &layers);
        let parsed = parse_mci_layers(&text).unwrap();
        assert_eq!(parsed.len(), 3);
        for (a, b) in parsed.iter().zip(&layers) {
            assert_abs_diff_eq!(a.ua, b.ua, epsilon = 1e-3);
            assert_abs_diff_eq!(a.us, b.us, epsilon = 1e-3);
            assert_abs_diff_eq!(a.d, b.d, epsilon = 1e-7);
        }
    }

    #[test]
    fn test_truncated_file_is_rejected() {
        let text = format_mci(&McmlSettings::default(), "out.mco", &reference_layers());
        let truncated: String = text.lines().take(13).collect::<Vec<_>>().join("\n");
        assert!(matches!(parse_mci_layers(&truncated), Err(SimError::Parse { .. })));
    }

    #[test]
    fn test_write_refuses_invalid_settings() {
        let settings = McmlSettings { nr_runs: 0, ..Default::default() };
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("invalid.mci");
        assert!(write_mci(&path, &settings, "x.mco", &reference_layers()).is_err());
        assert!(!path.exists());
    }
}
