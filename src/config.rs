use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{MsmError, Result};
use crate::processing::invoke::MsmBinaries;

/// Environment variable holding the FSL install root.
pub const FSL_PATH_VAR: &str = "FSL_PATH";

/// Tool-level configuration shared by every fit / transform call.
///
/// ```toml
/// fsl_path = "/usr/local/fsl"
/// scratch_dir = "/tmp/msm"
/// config_template = "/usr/local/fsl/config/basic_configs/config_standard_MSM_strain"
/// lambda_levels = 4
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MsmConfig {
    /// Install root; binaries live at `<fsl_path>/bin/msm` and `<fsl_path>/bin/msmresample`.
    pub fsl_path: PathBuf,
    /// Parent of the per-call scoped directories used by `transform`.
    /// Falls back to the system temp dir.
    pub scratch_dir: Option<PathBuf>,
    /// MSM config file whose `--lambda=` line is rewritten per epsilon.
    pub config_template: Option<PathBuf>,
    /// Number of resolution levels in the template's `--lambda=` line.
    pub lambda_levels: usize,
}

impl Default for MsmConfig {
    fn default() -> Self {
        Self {
            fsl_path: PathBuf::from("/usr/local/fsl"),
            scratch_dir: None,
            config_template: None,
            lambda_levels: 4,
        }
    }
}

impl MsmConfig {
    pub fn with_fsl_path(fsl_path: impl Into<PathBuf>) -> Self {
        Self {
            fsl_path: fsl_path.into(),
            ..Self::default()
        }
    }

    /// Reads the already-resolved `FSL_PATH` from the process environment.
    pub fn from_env() -> Result<Self> {
        let fsl_path = std::env::var_os(FSL_PATH_VAR)
            .ok_or_else(|| MsmError::config(format!("{FSL_PATH_VAR} is not set")))?;
        Ok(Self::with_fsl_path(fsl_path))
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self =
            toml::from_str(content).map_err(|e| MsmError::config(format!("bad TOML: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
            .map_err(|e| MsmError::config(format!("{}: {e}", path.display())))
    }

    pub fn validate(&self) -> Result<()> {
        if self.fsl_path.as_os_str().is_empty() {
            return Err(MsmError::config("fsl_path is empty"));
        }
        if self.lambda_levels == 0 {
            return Err(MsmError::config("lambda_levels must be at least 1"));
        }
        Ok(())
    }

    pub fn binaries(&self) -> MsmBinaries {
        MsmBinaries::from_fsl_path(&self.fsl_path)
    }

    pub fn scratch_dir(&self) -> PathBuf {
        self.scratch_dir.clone().unwrap_or_else(std::env::temp_dir)
    }
}

/// Writes a copy of `template` into `dest_dir` with its `--lambda=` line set
/// to `epsilon` at every level, and returns the copy's path.
///
/// The shared template itself is never modified.
pub fn write_lambda_config(
    template: &Path,
    epsilon: f64,
    levels: usize,
    dest_dir: &Path,
) -> Result<PathBuf> {
    let content = std::fs::read_to_string(template)?;
    let lambda = format!(
        "--lambda={}",
        vec![epsilon.to_string(); levels].join(",")
    );

    let mut replaced = false;
    let lines: Vec<String> = content
        .lines()
        .map(|line| {
            if line.trim_start().starts_with("--lambda=") {
                replaced = true;
                lambda.clone()
            } else {
                line.to_string()
            }
        })
        .collect();
    if !replaced {
        return Err(MsmError::config(format!(
            "{} has no --lambda= line",
            template.display()
        )));
    }

    let file_name = template
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "msm_config".to_string());
    let dest = dest_dir.join(format!("{file_name}_lambda{epsilon}"));
    std::fs::write(&dest, lines.join("\n") + "\n")?;
    log::debug!("wrote MSM config {} (epsilon={epsilon})", dest.display());
    Ok(dest)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn toml_fills_defaults() {
        let config = MsmConfig::from_toml_str(r#"fsl_path = "/opt/fsl""#).unwrap();
        assert_eq!(config.fsl_path, PathBuf::from("/opt/fsl"));
        assert_eq!(config.lambda_levels, 4);
        assert!(config.config_template.is_none());
        assert_eq!(config.binaries().msm, PathBuf::from("/opt/fsl/bin/msm"));
    }

    #[test]
    fn toml_rejects_zero_levels() {
        let err = MsmConfig::from_toml_str("fsl_path = \"/opt/fsl\"\nlambda_levels = 0").unwrap_err();
        assert!(matches!(err, MsmError::Config(_)));
    }

    #[test]
    fn lambda_line_is_rewritten_in_a_copy() {
        let dir = tempfile::tempdir().unwrap();
        let template = dir.path().join("config_standard_MSM_strain");
        let original = "--simval=1,2,2,2\n--sigma_in=2,2,1,1\n--sigma_ref=2,2,1,1\n--lambda=0.1,0.1,0.1,0.1\n--it=50,50,20,20\n";
        std::fs::write(&template, original).unwrap();

        let out_dir = tempfile::tempdir().unwrap();
        let written = write_lambda_config(&template, 0.025, 4, out_dir.path()).unwrap();

        let content = std::fs::read_to_string(&written).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines[3], "--lambda=0.025,0.025,0.025,0.025");
        assert_eq!(lines[4], "--it=50,50,20,20");
        assert_eq!(std::fs::read_to_string(&template).unwrap(), original);
    }

    #[test]
    fn template_without_lambda_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let template = dir.path().join("conf");
        std::fs::write(&template, "--it=50\n").unwrap();
        assert!(write_lambda_config(&template, 1.0, 4, dir.path()).is_err());
    }
}
