use crate::error::Error;
use std::path::Path;
use std::process::Command;
use tracing::trace;

/// Ask `ffprobe` for the container duration of `path`, in seconds.
pub fn ffprobe_duration(ffprobe: &str, path: &Path) -> Result<Option<f64>, Error> {
    let output = Command::new(ffprobe)
        .args([
            "-v",
            "error",
            "-show_entries",
            "format=duration",
            "-of",
            "default=noprint_wrappers=1:nokey=1",
        ])
        .arg(path)
        .output()
        .map_err(|e| Error::Probe {
            path: path.to_path_buf(),
            reason: format!("could not run {}: {}", ffprobe, e),
        })?;

    if !output.status.success() {
        return Err(Error::Probe {
            path: path.to_path_buf(),
            reason: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    trace!("ffprobe {} -> {:?}", path.display(), stdout.trim());
    parse_duration_output(&stdout).map_err(|reason| Error::Probe {
        path: path.to_path_buf(),
        reason,
    })
}

/// `N/A` or empty output means the container does not declare a duration.
pub fn parse_duration_output(stdout: &str) -> Result<Option<f64>, String> {
    let text = stdout.lines().next().unwrap_or("").trim();
    if text.is_empty() || text.eq_ignore_ascii_case("n/a") {
        return Ok(None);
    }
    match text.parse::<f64>() {
        Ok(secs) if secs.is_finite() && secs >= 0.0 => Ok(Some(secs)),
        Ok(secs) => Err(format!("implausible duration {}", secs)),
        Err(e) => Err(format!("unparseable duration '{}': {}", text, e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_duration_output() {
        assert_eq!(parse_duration_output("120.033000\n"), Ok(Some(120.033)));
        assert_eq!(parse_duration_output("N/A\n"), Ok(None));
        assert_eq!(parse_duration_output(""), Ok(None));
        assert!(parse_duration_output("garbage").is_err());
        assert!(parse_duration_output("-3").is_err());
    }

    #[test]
    fn test_missing_binary_is_probe_error() {
        let err = ffprobe_duration(
            "definitely-not-a-real-ffprobe-binary",
            Path::new("/tmp/clip.mp4"),
        )
        .unwrap_err();
        assert!(matches!(err, Error::Probe { .. }));
    }
}
