//! Integration test: the MCML driver against a shell-script stand-in.
//!
//! The script reads the output file name from line 4 of the input file,
//! writes a minimal `.mco` next to itself and records its working
//! directory. Everything runs in one test because the working directory is
//! process-wide.

#![cfg(unix)]

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use imc_core::sim::mcml::McmlEngine;
use imc_core::sim::{McmlSettings, ReflectanceEngine, SimError};
use imc_core::spectrum::collect_spectrum;
use imc_core::tissue::TissueModel;
use imc_optics::NM;

const FAKE_MCML: &str = r#"#!/bin/sh
pwd -P > last_cwd
out=$(sed -n '4p' "$2" | cut -d' ' -f1)
cat > "$out" <<EOT
RAT #Reflectance, absorption, transmission.
0.0277778 	#Specular reflectance [-]
0.35 	#Diffuse reflectance [-]
EOT
"#;

fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, body).unwrap();
    let mut perms = std::fs::metadata(&path).unwrap().permissions();
    perms.set_mode(0o755);
    std::fs::set_permissions(&path, perms).unwrap();
    path
}


#[test]
fn test_engine_lifecycle() {
    let scratch = tempfile::tempdir().unwrap();
    let root = scratch.path().canonicalize().unwrap();
    let bin_dir = root.join("bin");
    let work_dir = root.join("work");
    std::fs::create_dir_all(&bin_dir).unwrap();

    let cwd_before = std::env::current_dir().unwrap();

    let model = TissueModel::colon_jacques().unwrap();
    let job = model.job("lifecycle").unwrap();

    // Success: result parsed, cwd restored, scratch files gone.
    let exe = write_script(&bin_dir, "fake_mcml.sh", FAKE_MCML);
    let engine = McmlEngine::new(&exe, McmlSettings::default())
        .unwrap()
        .with_scratch_dir(&work_dir)
        .unwrap();
    let r = engine.run(&job).unwrap().expect("engine result");
    assert_eq!(r.diffuse, 0.35);
    assert_eq!(r.specular, 0.0277778);
    assert_eq!(std::env::current_dir().unwrap(), cwd_before);
    let recorded = std::fs::read_to_string(bin_dir.join("last_cwd")).unwrap();
    assert_eq!(Path::new(recorded.trim()), bin_dir.as_path());
    assert!(!work_dir.join("lifecycle.mci").exists());
    assert!(!bin_dir.join("lifecycle.mco").exists());

    // Scratch files can be kept for inspection.
    let keeping = engine.clone().with_keep_files(true);
    assert!(keeping.run(&job).unwrap().is_some());
    assert!(work_dir.join("lifecycle.mci").is_file());
    assert!(bin_dir.join("lifecycle.mco").is_file());

    // A whole spectrum through the real driver.
    let wavelengths = [450.0 * NM, 550.0 * NM, 650.0 * NM];
    let spectrum = collect_spectrum(&model, &engine, &wavelengths)
        .unwrap()
        .expect("complete spectrum");
    assert_eq!(spectrum.diffuse(), vec![0.35; 3]);

    // Non-zero exit: logged, no result, cwd restored.
    let failing = write_script(&bin_dir, "failing.sh", "#!/bin/sh\nexit 3\n");
    let engine = McmlEngine::new(&failing, McmlSettings::default())
        .unwrap()
        .with_scratch_dir(&work_dir)
        .unwrap();
    assert!(engine.run(&job).unwrap().is_none());
    assert_eq!(std::env::current_dir().unwrap(), cwd_before);

    // Exit 0 without an output file: no result.
    let silent = write_script(&bin_dir, "silent.sh", "#!/bin/sh\nexit 0\n");
    let engine = McmlEngine::new(&silent, McmlSettings::default())
        .unwrap()
        .with_scratch_dir(&work_dir)
        .unwrap();
    assert!(engine.run(&job).unwrap().is_none());

    // Timeout: killed well before the script would finish.
    let slow = write_script(&bin_dir, "slow.sh", "#!/bin/sh\nsleep 5\n");
    let engine = McmlEngine::new(&slow, McmlSettings::default())
        .unwrap()
        .with_scratch_dir(&work_dir)
        .unwrap()
        .with_timeout(Duration::from_millis(200));
    let start = Instant::now();
    assert!(engine.run(&job).unwrap().is_none());
    assert!(start.elapsed() < Duration::from_secs(4));
    assert_eq!(std::env::current_dir().unwrap(), cwd_before);

    // Input file cannot be written: hard error.
    let engine = McmlEngine::new(&exe, McmlSettings::default())
        .unwrap()
        .with_scratch_dir(exe.join("not_a_dir"))
        .unwrap();
    assert!(matches!(engine.run(&job), Err(SimError::Io(_))));
}
