//! Inference through a staged command.
//!
//! The command receives the decoded request on stdin (JSON text, or the raw
//! bytes of an `application/octet-stream` body) and prints the prediction as
//! JSON on stdout. `SAGEMAKER_MODEL_DIR` tells it where the model lives.

use crate::content::Payload;
use crate::module::ServingModule;
use harbor_core::ServingEnvironment;
use harbor_training::dispatch::{EntryPoint, EntryPointKind, Invocation};
use harbor_training::install::{InstallPolicy, Installer};
use harbor_training::storage::{HttpObjectStore, ObjectStore};
use harbor_training::{Model, TrainingResult, fetch_and_install};
use serde_json::{Value, json};
use std::collections::BTreeMap;
use std::io::{Read, Write};
use std::path::Path;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

pub const MODEL_DIR_ENV: &str = "SAGEMAKER_MODEL_DIR";

const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// A [`ServingModule`] whose `predict_fn` runs a child process per request.
#[derive(Debug, Clone)]
pub struct ProcessServingModule {
    invocation: Invocation,
    timeout: Option<Duration>,
}

impl ProcessServingModule {
    pub fn new(invocation: Invocation) -> Self {
        Self { invocation, timeout: None }
    }

    /// Kills the command when a prediction runs longer than `timeout`.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Fetches and installs the user code named by `env`, then wraps its entry
    /// point.
    ///
    /// Python entry points are installed as a package, generating a minimal
    /// descriptor when the code has none.
    pub async fn load(env: &ServingEnvironment, installer: &Installer) -> TrainingResult<Self> {
        Self::load_with_store(env, installer, &object_store(env)).await
    }

    pub async fn load_with_store(
        env: &ServingEnvironment,
        installer: &Installer,
        store: &dyn ObjectStore,
    ) -> TrainingResult<Self> {
        let code_dir = env.code_dir();
        let staged = EntryPoint::classify(&code_dir, env.user_entry_point());
        let policy = if staged.kind() == EntryPointKind::Script {
            InstallPolicy::Package
        } else {
            InstallPolicy::Auto
        };
        fetch_and_install(
            env.user_entry_point(),
            env.module_locator(),
            &code_dir,
            store,
            installer,
            policy,
        )
        .await?;

        let entry = EntryPoint::classify(&code_dir, env.user_entry_point());
        entry.ensure_present()?;
        entry.prepare()?;

        let vars =
            BTreeMap::from([(MODEL_DIR_ENV.to_string(), env.model_dir().display().to_string())]);
        let invocation = entry.invocation(installer.python(), Vec::new(), vars);
        Ok(Self::new(invocation).with_timeout(env.model_server_timeout()))
    }

    pub fn invocation(&self) -> &Invocation {
        &self.invocation
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Waits for `child`, killing it once the deadline passes.
    fn wait(&self, child: &mut Child) -> anyhow::Result<ExitStatus> {
        let deadline = self.timeout.map(|t| Instant::now() + t);
        loop {
            if let Some(status) = child.try_wait()? {
                return Ok(status);
            }
            if deadline.is_some_and(|d| Instant::now() >= d) {
                // The child may exit on its own between the check and the kill.
                let _ = child.kill();
                let _ = child.wait();
                anyhow::bail!(
                    "`{}` did not finish within {:?} and was killed",
                    self.invocation.command_line(),
                    self.timeout.unwrap_or_default()
                );
            }
            std::thread::sleep(POLL_INTERVAL);
        }
    }
}

/// Object storage client addressing the region the environment resolves.
pub fn object_store(env: &ServingEnvironment) -> HttpObjectStore {
    HttpObjectStore::new(env.region().map(str::to_string))
}

fn drain(pipe: Option<impl Read + Send + 'static>) -> JoinHandle<Vec<u8>> {
    std::thread::spawn(move || {
        let mut buf = Vec::new();
        if let Some(mut pipe) = pipe {
            let _ = pipe.read_to_end(&mut buf);
        }
        buf
    })
}

impl ServingModule for ProcessServingModule {
    /// The command loads its own model; this only checks the directory exists.
    fn model_fn(&self, model_dir: &Path) -> anyhow::Result<Model> {
        if !model_dir.is_dir() {
            anyhow::bail!("model directory {} does not exist", model_dir.display());
        }
        Ok(Model::Json(json!({ "model_dir": model_dir })))
    }

    fn predict_fn(&self, input: Payload, _model: &Model) -> anyhow::Result<Value> {
        let stdin_bytes = match input {
            Payload::Json(value) => serde_json::to_vec(&value)?,
            Payload::Bytes(bytes) => bytes,
        };

        let mut child = Command::new(&self.invocation.program)
            .args(&self.invocation.args)
            .envs(&self.invocation.env)
            .current_dir(&self.invocation.cwd)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| {
                anyhow::anyhow!("failed to start `{}`: {e}", self.invocation.command_line())
            })?;

        // Pipes are serviced on their own threads so a command that never
        // reads stdin, or fills stdout, cannot outlive the deadline.
        let stdin = child.stdin.take();
        let writer = std::thread::spawn(move || match stdin {
            Some(mut stdin) => match stdin.write_all(&stdin_bytes) {
                Err(e) if e.kind() != std::io::ErrorKind::BrokenPipe => Err(e),
                _ => Ok(()),
            },
            None => Ok(()),
        });
        let stdout = drain(child.stdout.take());
        let stderr = drain(child.stderr.take());

        let status = self.wait(&mut child)?;
        let join_err =
            |_| anyhow::anyhow!("pipe thread for `{}` panicked", self.invocation.command_line());
        writer.join().map_err(join_err)??;
        let stdout = stdout.join().map_err(join_err)?;
        let stderr = stderr.join().map_err(join_err)?;

        if !status.success() {
            anyhow::bail!(
                "`{}` exited with {status}: {}",
                self.invocation.command_line(),
                String::from_utf8_lossy(&stderr).trim()
            );
        }
        serde_json::from_slice(&stdout)
            .map_err(|e| anyhow::anyhow!("prediction on stdout is not JSON: {e}"))
    }
}
