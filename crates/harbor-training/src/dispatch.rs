//! Entry-point classification and subprocess dispatch.

use crate::error::{TrainingError, TrainingResult};
use crate::install::SETUP_PY;
use std::collections::{BTreeMap, VecDeque};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};

/// Script extension recognized as an interpreter script.
pub const SCRIPT_EXTENSION: &str = ".py";

/// Lines of stderr kept for the failure record.
const STDERR_TAIL_LINES: usize = 40;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryPointKind {
    /// Staged code carries a build descriptor; run as `python -m <module>`.
    Package,
    /// A `.py` file; run as `python <file>`.
    Script,
    /// Anything else; executed directly.
    Command,
}

/// A classified user entry point inside the code directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryPoint {
    kind: EntryPointKind,
    name: String,
    code_dir: PathBuf,
}

impl EntryPoint {
    pub fn classify(code_dir: impl Into<PathBuf>, name: impl Into<String>) -> Self {
        let code_dir = code_dir.into();
        let name = name.into();
        let kind = if code_dir.join(SETUP_PY).exists() {
            EntryPointKind::Package
        } else if name.ends_with(SCRIPT_EXTENSION) {
            EntryPointKind::Script
        } else {
            EntryPointKind::Command
        };
        Self { kind, name, code_dir }
    }

    pub fn kind(&self) -> EntryPointKind {
        self.kind
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn code_dir(&self) -> &Path {
        &self.code_dir
    }

    /// The file the entry point runs, for script and command kinds.
    pub fn path(&self) -> PathBuf {
        self.code_dir.join(&self.name)
    }

    pub fn module_name(&self) -> &str {
        self.name.strip_suffix(SCRIPT_EXTENSION).unwrap_or(&self.name)
    }

    /// Fails when a script or command entry point is not in the code directory.
    pub fn ensure_present(&self) -> TrainingResult<()> {
        if self.kind != EntryPointKind::Package && !self.path().is_file() {
            return Err(TrainingError::ImportModule(format!(
                "entry point '{}' not found in {}",
                self.name,
                self.code_dir.display()
            )));
        }
        Ok(())
    }

    /// Builds the invocation for this entry point.
    pub fn invocation(
        &self,
        python: &str,
        args: Vec<String>,
        env: BTreeMap<String, String>,
    ) -> Invocation {
        let (program, mut argv) = match self.kind {
            EntryPointKind::Package => {
                (python.to_string(), vec!["-m".to_string(), self.module_name().to_string()])
            }
            EntryPointKind::Script => (python.to_string(), vec![self.name.clone()]),
            EntryPointKind::Command => (self.path().display().to_string(), Vec::new()),
        };
        argv.extend(args);
        Invocation { program, args: argv, env, cwd: self.code_dir.clone() }
            .with_search_path(&self.code_dir)
    }

    /// Makes a command entry point executable.
    pub fn prepare(&self) -> std::io::Result<()> {
        if self.kind == EntryPointKind::Command {
            make_executable(&self.path())?;
        }
        Ok(())
    }
}

#[cfg(unix)]
fn make_executable(path: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755))
}

#[cfg(not(unix))]
fn make_executable(_path: &Path) -> std::io::Result<()> {
    Ok(())
}

/// Whether to wait for the child.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchMode {
    Wait,
    Detach,
}

#[derive(Debug)]
pub enum Dispatched {
    /// The child exited with status zero.
    Exited,
    /// The child was started and left running.
    Running(Child),
}

/// A fully resolved child process.
///
/// The working directory applies to the child only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub program: String,
    pub args: Vec<String>,
    pub env: BTreeMap<String, String>,
    pub cwd: PathBuf,
}

impl Invocation {
    pub fn new(program: impl Into<String>, cwd: impl Into<PathBuf>) -> Self {
        Self { program: program.into(), args: Vec::new(), env: BTreeMap::new(), cwd: cwd.into() }
    }

    #[must_use]
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    #[must_use]
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    #[must_use]
    pub fn envs(mut self, env: impl IntoIterator<Item = (String, String)>) -> Self {
        self.env.extend(env);
        self
    }

    /// Prepends `dir` to the child's `PYTHONPATH`.
    #[must_use]
    fn with_search_path(mut self, dir: &Path) -> Self {
        let existing =
            self.env.get("PYTHONPATH").cloned().or_else(|| std::env::var("PYTHONPATH").ok());
        let value = match existing {
            Some(rest) if !rest.is_empty() => format!("{}:{rest}", dir.display()),
            _ => dir.display().to_string(),
        };
        self.env.insert("PYTHONPATH".to_string(), value);
        self
    }

    /// The command line as a shell would show it.
    pub fn command_line(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args).envs(&self.env).current_dir(&self.cwd);
        cmd
    }

    /// Runs the child.
    ///
    /// `Wait` streams stdout through, mirrors stderr while keeping its tail,
    /// and turns a non-zero exit into [`TrainingError::ExecuteUserScript`].
    pub async fn run(&self, mode: DispatchMode) -> TrainingResult<Dispatched> {
        log_script_invocation(self);
        let cmd_line = self.command_line();

        match mode {
            DispatchMode::Detach => {
                let child = self
                    .command()
                    .spawn()
                    .map_err(|source| TrainingError::Spawn { cmd: cmd_line, source })?;
                Ok(Dispatched::Running(child))
            }
            DispatchMode::Wait => {
                let mut child = self
                    .command()
                    .stderr(Stdio::piped())
                    .spawn()
                    .map_err(|source| TrainingError::Spawn { cmd: cmd_line.clone(), source })?;

                let stderr = child.stderr.take();
                let collector = tokio::spawn(async move {
                    let mut tail = VecDeque::with_capacity(STDERR_TAIL_LINES);
                    if let Some(stderr) = stderr {
                        let mut lines = BufReader::new(stderr).lines();
                        while let Ok(Some(line)) = lines.next_line().await {
                            eprintln!("{line}");
                            if tail.len() == STDERR_TAIL_LINES {
                                tail.pop_front();
                            }
                            tail.push_back(line);
                        }
                    }
                    tail.into_iter().collect::<Vec<_>>().join("\n")
                });

                let status = child
                    .wait()
                    .await
                    .map_err(|source| TrainingError::Spawn { cmd: cmd_line.clone(), source })?;
                let stderr_tail = collector.await.unwrap_or_default();

                if status.success() {
                    Ok(Dispatched::Exited)
                } else {
                    Err(TrainingError::ExecuteUserScript {
                        cmd: cmd_line,
                        code: status.code().unwrap_or(1),
                        stderr_tail,
                    })
                }
            }
        }
    }
}

fn log_script_invocation(invocation: &Invocation) {
    let env = invocation.env.iter().map(|(k, v)| format!("{k}={v}")).collect::<Vec<_>>().join("\n");
    tracing::info!(
        cwd = %invocation.cwd.display(),
        "Invoking user script\n\nCommand:\n\n{}\n\nEnvironment:\n\n{}\n",
        invocation.command_line(),
        env
    );
}
