//! Best-effort hardware probes.

use std::process::Command;

/// GPU inventory tool and arguments.
pub const GPU_INVENTORY_COMMAND: (&str, &[&str]) = ("nvidia-smi", &["--list-gpus"]);

/// Number of CPUs available to this process. Always at least 1.
pub fn cpu_count() -> usize {
    std::thread::available_parallelism().map(std::num::NonZeroUsize::get).unwrap_or(1)
}

/// Number of GPUs reported by `nvidia-smi --list-gpus`.
///
/// Never fails: a missing tool, a non-zero exit or unreadable output all count
/// as zero GPUs and are logged at warning level.
pub fn gpu_count() -> usize {
    let (program, args) = GPU_INVENTORY_COMMAND;
    gpu_count_with(program, args)
}

/// [`gpu_count`] against an arbitrary inventory command.
pub fn gpu_count_with(program: &str, args: &[&str]) -> usize {
    match Command::new(program).args(args).output() {
        Ok(output) if output.status.success() => {
            count_gpu_lines(&String::from_utf8_lossy(&output.stdout))
        }
        Ok(output) => {
            tracing::warn!(
                program,
                status = %output.status,
                "GPU inventory tool failed, assuming no GPUs"
            );
            0
        }
        Err(e) => {
            tracing::warn!(
                program,
                error = %e,
                "No GPUs detected (normal if no GPUs are installed)"
            );
            0
        }
    }
}

fn count_gpu_lines(output: &str) -> usize {
    output.lines().filter(|line| line.starts_with("GPU ")).count()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cpu_count_positive() {
        assert!(cpu_count() >= 1);
    }

    #[test]
    fn test_missing_tool_yields_zero() {
        assert_eq!(gpu_count_with("harbor-no-such-gpu-tool", &["--list-gpus"]), 0);
    }

    #[cfg(unix)]
    #[test]
    fn test_failing_tool_yields_zero() {
        assert_eq!(gpu_count_with("false", &[]), 0);
    }

    #[test]
    fn test_count_gpu_lines() {
        let output =
            "GPU 0: Tesla V100 (UUID: GPU-1)\nGPU 1: Tesla V100 (UUID: GPU-2)\n\nNo devices\n";
        assert_eq!(count_gpu_lines(output), 2);
    }
}
