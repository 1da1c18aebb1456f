//! Integration test: parameters to camera-band training table, with an
//! analytic engine in place of MCML.

use approx::assert_abs_diff_eq;
use imc_core::batch::{Batch, LayerColumn};
use imc_core::generators::BatchKind;
use imc_core::postprocess::{camera_batch, CameraSettings};
use imc_core::sim::mci::{format_mci, parse_mci_layers};
use imc_core::sim::{McmlSettings, ReflectanceEngine, SimError};
use imc_core::spectrum::simulate_batch;
use imc_core::tissue::TissueModel;
use imc_core::types::{Reflectance, SimulationJob};
use imc_optics::{LayerParameters, NM, UM};

/// Diffusion-style reflectance from the optics of the top layer.
struct TopLayerEngine;

impl ReflectanceEngine for TopLayerEngine {
    fn run(&self, job: &SimulationJob) -> Result<Option<Reflectance>, SimError> {
        let top = job.layers[0];
        let us_reduced = top.us * (1.0 - top.g);
        let albedo = us_reduced / (us_reduced + top.ua);
        Ok(Some(Reflectance::new(0.5 * albedo * albedo, 0.02)))
    }

    fn engine_name(&self) -> &str {
        "top-layer"
    }
}

#[test]
fn test_input_file_is_deterministic_and_recoverable() {
    let mut model = TissueModel::colon_jacques().unwrap();
    model
        .set_mucosa(LayerParameters { bvf: 0.04, sao2: 0.6, d: 420.0 * UM, n: 1.38, ..Default::default() })
        .unwrap();
    model.set_wavelength(560.0 * NM).unwrap();

    let settings = McmlSettings::default();
    let layers = model.optical_layers().unwrap();
    let first = format_mci(&settings, "out.mco", &layers);
    let second = format_mci(&settings, "out.mco", &model.optical_layers().unwrap());
    assert_eq!(first, second);

    let parsed = parse_mci_layers(&first).unwrap();
    assert_eq!(parsed.len(), 3);
    for (p, l) in parsed.iter().zip(&layers) {
        assert_abs_diff_eq!(p.n, l.n, epsilon = 5e-4);
        assert_abs_diff_eq!(p.g, l.g, epsilon = 5e-4);
        assert_abs_diff_eq!(p.ua, l.ua, epsilon = 1e-3);
        assert_abs_diff_eq!(p.us, l.us, epsilon = 1e-3);
        assert_abs_diff_eq!(p.d, l.d, epsilon = 1e-7);
    }

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("colon.mci");
    model.create_mci_file(&path, &settings, "out.mco").unwrap();
    assert_eq!(std::fs::read_to_string(&path).unwrap(), first);
}

#[test]
fn test_batch_to_camera_table() {
    let model = TissueModel::colon_jacques().unwrap();
    let mut batch = BatchKind::ColonMuscle.create_parameters(40, 21);
    let wavelengths: Vec<f64> = (0..31).map(|i| (450.0 + 10.0 * i as f64) * NM).collect();

    let summary = simulate_batch(&mut batch, &model, &TopLayerEngine, &wavelengths).unwrap();
    assert_eq!(summary.simulated, 40);
    assert_eq!(batch.nr_elements(), 40);
    assert_eq!(batch.reflectances().dim(), (40, 31));
    assert!(batch.reflectances().iter().all(|r| *r > 0.0 && *r < 0.5));

    let settings = CameraSettings {
        wavelengths: vec![470.0 * NM, 500.0 * NM, 550.0 * NM, 600.0 * NM, 650.0 * NM, 700.0 * NM],
        fold_window: 3,
        bands_to_sortout: vec![0],
        band_order: None,
    };
    let camera = camera_batch(&batch, &settings).unwrap();
    assert_eq!(camera.nr_elements(), 40);
    assert_eq!(camera.nr_wavelengths(), 5);
    assert_eq!(camera.layers(), batch.layers());

    // Parameter and reflectance rows stay paired through persistence.
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("camera.json");
    camera.save_json(&path).unwrap();
    let loaded = Batch::load_json(&path).unwrap();
    assert_eq!(loaded.nr_elements(), loaded.reflectances().nrows());
    assert_eq!(loaded.layers()[0].nrows(), loaded.nr_elements());
    let col = loaded.column(0, LayerColumn::SaO2).unwrap();
    assert!(col.iter().all(|s| (0.0..=1.0).contains(s)));
}
