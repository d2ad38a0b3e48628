//! Installation of staged user code.

use crate::dispatch::Invocation;
use crate::error::{TrainingError, TrainingResult};
use harbor_core::VarSource;
use harbor_core::params::PYTHON_ENV;
use std::path::Path;

/// Package build descriptor.
pub const SETUP_PY: &str = "setup.py";
/// Plain dependency list.
pub const REQUIREMENTS_FILE: &str = "requirements.txt";
pub const DEFAULT_PYTHON: &str = "python3";

/// How staged code is installed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum InstallPolicy {
    /// Package install if a build descriptor exists, requirements only if a
    /// dependency list exists, nothing otherwise.
    #[default]
    Auto,
    /// Always install as a package, generating a minimal descriptor if needed.
    Package,
}

/// Runs package installs with the container's interpreter.
#[derive(Debug, Clone)]
pub struct Installer {
    python: String,
}

impl Installer {
    pub fn new(python: impl Into<String>) -> Self {
        Self { python: python.into() }
    }

    /// Interpreter from `HARBOR_PYTHON`, falling back to `python3`.
    pub fn from_vars(vars: &dyn VarSource) -> Self {
        Self::new(vars.var(PYTHON_ENV).unwrap_or_else(|| DEFAULT_PYTHON.to_string()))
    }

    pub fn python(&self) -> &str {
        &self.python
    }

    /// The install command for `code_dir`, if one is needed.
    pub fn plan(&self, code_dir: &Path) -> Option<Invocation> {
        let has_setup = code_dir.join(SETUP_PY).is_file();
        let has_requirements = code_dir.join(REQUIREMENTS_FILE).is_file();

        let pip = Invocation::new(self.python.clone(), code_dir).args(["-m", "pip", "install"]);
        match (has_setup, has_requirements) {
            (true, true) => Some(pip.args(["-U", ".", "-r", REQUIREMENTS_FILE])),
            (true, false) => Some(pip.args(["-U", "."])),
            (false, true) => Some(pip.args(["-r", REQUIREMENTS_FILE])),
            (false, false) => None,
        }
    }

    /// Installs the code in `code_dir` according to `policy`.
    pub async fn install(
        &self,
        name: &str,
        code_dir: &Path,
        policy: InstallPolicy,
    ) -> TrainingResult<()> {
        if policy == InstallPolicy::Package && write_minimal_setup(name, code_dir)? {
            tracing::info!(module = name, "generated minimal {SETUP_PY}");
        }

        let Some(invocation) = self.plan(code_dir) else {
            tracing::debug!(code_dir = %code_dir.display(), "nothing to install");
            return Ok(());
        };

        let cmd = invocation.command_line();
        tracing::info!(%cmd, "installing user module");
        let status = tokio::process::Command::new(&invocation.program)
            .args(&invocation.args)
            .current_dir(&invocation.cwd)
            .status()
            .await
            .map_err(|source| TrainingError::Spawn { cmd: cmd.clone(), source })?;

        if status.success() {
            Ok(())
        } else {
            Err(TrainingError::InstallModule { cmd, code: status.code().unwrap_or(1) })
        }
    }
}

impl Default for Installer {
    fn default() -> Self {
        Self::new(DEFAULT_PYTHON)
    }
}

/// Writes a `setup.py` declaring the single module `name`, unless one exists.
///
/// Returns whether a file was written.
pub fn write_minimal_setup(name: &str, code_dir: &Path) -> std::io::Result<bool> {
    let path = code_dir.join(SETUP_PY);
    if path.exists() {
        return Ok(false);
    }
    let module = name.strip_suffix(".py").unwrap_or(name);
    let contents = format!(
        "from setuptools import setup\n\n\
         setup(packages=[], name={module:?}, version='1.0.0', py_modules=[{module:?}])\n"
    );
    std::fs::create_dir_all(code_dir)?;
    std::fs::write(&path, contents)?;
    Ok(true)
}
