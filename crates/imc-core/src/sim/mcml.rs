//! Driver for the external MCML (or GPU-MCML) executable.
//!
//! One [`SimulationJob`] maps to one engine invocation:
//!
//! 1. write `<scratch>/<job id>.mci` (fatal if the file does not appear),
//! 2. change into the executable's directory under a [`WorkingDirGuard`],
//! 3. run `<executable> -A <absolute .mci path>` with a timeout,
//! 4. read `<executable dir>/<job id>.mco`,
//! 5. delete both scratch files unless asked to keep them.
//!
//! Failures in steps 3 and 4 are logged and reported as `Ok(None)`.

use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use super::mci::write_mci;
use super::mco::parse_mco;
use super::{McmlSettings, ReflectanceEngine, SimError};
use crate::types::{Reflectance, SimulationJob};

/// Default wall-clock limit for one engine run.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(600);

const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Serialises working-directory changes within the process.
static CWD_LOCK: Mutex<()> = Mutex::new(());

/// Scoped change of the process working directory.
///
/// The previous directory is restored when the guard is dropped, including
/// during unwinding. Guards are mutually exclusive across threads.
pub struct WorkingDirGuard {
    previous: PathBuf,
    _lock: MutexGuard<'static, ()>,
}

impl WorkingDirGuard {
    pub fn enter(dir: &Path) -> std::io::Result<Self> {
        // A poisoned lock only means another guard panicked; its Drop
        // already restored the directory.
        let lock = CWD_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        let previous = std::env::current_dir()?;
        std::env::set_current_dir(dir)?;
        log::debug!("Entered {} (was {})", dir.display(), previous.display());
        Ok(Self {
            previous,
            _lock: lock,
        })
    }

    /// Directory that will be restored on drop.
    pub fn previous(&self) -> &Path {
        &self.previous
    }
}

impl Drop for WorkingDirGuard {
    fn drop(&mut self) {
        if let Err(e) = std::env::set_current_dir(&self.previous) {
            log::error!(
                "Failed to restore working directory {}: {}",
                self.previous.display(),
                e
            );
        }
    }
}

/// [`ReflectanceEngine`] backed by the MCML command-line program.
#[derive(Debug, Clone)]
pub struct McmlEngine {
    executable: PathBuf,
    settings: McmlSettings,
    timeout: Duration,
    scratch_dir: PathBuf,
    keep_files: bool,
}

impl McmlEngine {
    /// Create a driver for the executable at `executable`.
    ///
    /// The path is canonicalised; a missing executable yields
    /// [`SimError::EngineUnavailable`].
    pub fn new(executable: impl AsRef<Path>, settings: McmlSettings) -> Result<Self, SimError> {
        let executable = executable.as_ref();
        let executable = executable.canonicalize().map_err(|e| {
            SimError::EngineUnavailable(format!("{}: {}", executable.display(), e))
        })?;
        if !executable.is_file() {
            return Err(SimError::EngineUnavailable(format!(
                "{} is not a file",
                executable.display()
            )));
        }
        settings.validate()?;
        Ok(Self {
            executable,
            settings,
            timeout: DEFAULT_TIMEOUT,
            scratch_dir: std::env::temp_dir().join("imc-mcml"),
            keep_files: false,
        })
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Directory for the generated input files. Relative paths are resolved
    /// against the current working directory now, not at run time.
    pub fn with_scratch_dir(mut self, dir: impl Into<PathBuf>) -> Result<Self, SimError> {
        let dir = dir.into();
        self.scratch_dir = if dir.is_absolute() {
            dir
        } else {
            std::env::current_dir()?.join(dir)
        };
        Ok(self)
    }

    pub fn with_keep_files(mut self, keep: bool) -> Self {
        self.keep_files = keep;
        self
    }

    pub fn executable(&self) -> &Path {
        &self.executable
    }

    pub fn settings(&self) -> &McmlSettings {
        &self.settings
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    fn executable_dir(&self) -> &Path {
        self.executable.parent().unwrap_or_else(|| Path::new("/"))
    }

    /// Spawn the engine and wait for it, killing it on timeout.
    fn invoke(&self, mci_path: &Path) -> Result<(), SimError> {
        let _cwd = WorkingDirGuard::enter(self.executable_dir())?;
        let child = Command::new(&self.executable)
            .arg("-A")
            .arg(mci_path)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| SimError::EngineFailed(format!("spawn: {}", e)))?;
        self.wait(child)
    }

    fn wait(&self, mut child: Child) -> Result<(), SimError> {
        let start = Instant::now();
        loop {
            match child.try_wait()? {
                Some(status) if status.success() => return Ok(()),
                Some(status) => {
                    return Err(SimError::EngineFailed(format!("exited with {}", status)));
                }
                None if start.elapsed() >= self.timeout => {
                    let _ = child.kill();
                    let _ = child.wait();
                    return Err(SimError::Timeout(self.timeout.as_secs_f64()));
                }
                None => std::thread::sleep(POLL_INTERVAL),
            }
        }
    }

    fn cleanup(&self, paths: &[&Path]) {
        if self.keep_files {
            return;
        }
        for path in paths {
            if path.exists() {
                if let Err(e) = std::fs::remove_file(path) {
                    log::warn!("Could not remove {}: {}", path.display(), e);
                }
            }
        }
    }
}

impl ReflectanceEngine for McmlEngine {
    fn run(&self, job: &SimulationJob) -> Result<Option<Reflectance>, SimError> {
        let mci_path = self.scratch_dir.join(format!("{}.mci", job.id));
        let mco_name = format!("{}.mco", job.id);
        let mco_path = self.executable_dir().join(&mco_name);

        write_mci(&mci_path, &self.settings, &mco_name, &job.layers)?;

        log::debug!(
            "Running {} for job {} at {:.1} nm",
            self.executable.display(),
            job.id,
            job.wavelength * 1e9
        );

        let result = self
            .invoke(&mci_path)
            .and_then(|()| parse_mco(&mco_path));
        self.cleanup(&[&mci_path, &mco_path]);

        match result {
            Ok(r) => Ok(Some(r)),
            Err(e) => {
                log::error!("Job {} produced no result: {}", job.id, e);
                Ok(None)
            }
        }
    }

    fn engine_name(&self) -> &str {
        "mcml"
    }
}
