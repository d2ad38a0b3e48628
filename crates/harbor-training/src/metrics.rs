use tokio::process::{Child, Command};

pub const METRICS_AGENT_PROGRAM: &str = "telegraf";
pub const METRICS_AGENT_CONFIG: &str = "/usr/local/etc/telegraf.conf";

/// Command line of the metrics agent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricsAgent {
    pub program: String,
    pub args: Vec<String>,
}

impl MetricsAgent {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self { program: program.into(), args }
    }

    /// Starts the agent in the background.
    ///
    /// Best effort: a spawn failure is logged and yields `None`.
    pub fn start(&self) -> Option<Child> {
        match Command::new(&self.program).args(&self.args).spawn() {
            Ok(child) => {
                tracing::info!(program = %self.program, pid = child.id(), "started metrics agent");
                Some(child)
            }
            Err(e) => {
                let program = &self.program;
                tracing::warn!(program = %program, error = %e, "could not start metrics agent");
                None
            }
        }
    }
}

impl Default for MetricsAgent {
    fn default() -> Self {
        Self::new(
            METRICS_AGENT_PROGRAM,
            vec!["--config".to_string(), METRICS_AGENT_CONFIG.to_string()],
        )
    }
}
