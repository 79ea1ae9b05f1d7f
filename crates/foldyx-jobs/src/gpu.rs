//! GPU device count, used as the upper bound of the `gpu_count` option.

use tokio::process::Command;
use tracing::{debug, info};

/// Count reported when the probe is missing or its output is unusable.
pub const FALLBACK_GPU_COUNT: u32 = 1;

/// Run `<probe> --list-gpus` and count the listed devices.
/// Any failure falls back to a single device.
pub async fn detect_gpu_count(probe: &str) -> u32 {
    let output = match Command::new(probe).arg("--list-gpus").output().await {
        Ok(output) => output,
        Err(e) => {
            debug!("GPU probe {} unavailable: {}", probe, e);
            return FALLBACK_GPU_COUNT;
        }
    };

    if !output.status.success() {
        debug!("GPU probe {} exited with {}", probe, output.status);
        return FALLBACK_GPU_COUNT;
    }

    let count = parse_gpu_list(&String::from_utf8_lossy(&output.stdout));
    if count == 0 {
        return FALLBACK_GPU_COUNT;
    }
    info!("Detected {} GPU(s)", count);
    count
}

/// Count `GPU <n>: ...` lines in `--list-gpus` output.
pub fn parse_gpu_list(stdout: &str) -> u32 {
    stdout
        .lines()
        .filter(|line| {
            line.trim_start()
                .strip_prefix("GPU ")
                .and_then(|rest| rest.split(':').next())
                .map(|idx| !idx.is_empty() && idx.chars().all(|c| c.is_ascii_digit()))
                .unwrap_or(false)
        })
        .count() as u32
}
