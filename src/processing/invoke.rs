//! Command construction and execution for the external `msm` and
//! `msmresample` binaries.
//!
//! Commands are built as discrete argument lists (never through a shell) and
//! run as blocking subprocesses. There is no retry and no timeout: a non-zero
//! exit is reported with the full command line, and a zero exit that leaves
//! a declared output missing or unloadable is reported separately as
//! [`MsmError::OutputNotFound`].

use std::ffi::{OsStr, OsString};
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use crate::error::{MsmError, Result};
use crate::io::{load_gifti, read_darrays, save_gifti, GiftiImage};

/// Deformed input mesh written by `msm` into the output directory.
pub const TRANSFORMED_MESH_FILE: &str = "transformed_in_mesh.surf.gii";
/// Source data resampled onto the reference mesh, written by `msm`.
pub const TRANSFORMED_FUNC_FILE: &str = "transformed_and_reprojected.func.gii";

/// Lines of captured stderr kept in a failure reason.
const STDERR_TAIL_LINES: usize = 20;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MsmBinaries {
    pub msm: PathBuf,
    pub msmresample: PathBuf,
}

impl MsmBinaries {
    pub fn from_fsl_path(fsl_path: &Path) -> Self {
        let bin = fsl_path.join("bin");
        Self {
            msm: bin.join("msm"),
            msmresample: bin.join("msmresample"),
        }
    }
}

/// An external command as a program plus discrete arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolCommand {
    program: PathBuf,
    args: Vec<OsString>,
}

impl ToolCommand {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl AsRef<OsStr>) -> Self {
        self.args.push(arg.as_ref().to_os_string());
        self
    }

    /// `--flag=value` as a single argument.
    pub fn flag_value(self, flag: &str, value: impl AsRef<OsStr>) -> Self {
        let mut arg = OsString::from(flag);
        arg.push("=");
        arg.push(value.as_ref());
        self.arg(arg)
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    pub fn args(&self) -> &[OsString] {
        &self.args
    }

    /// Runs to completion. With `verbose` the tool's output goes straight to
    /// this process' stdout/stderr; otherwise it is captured and the tail of
    /// stderr is attached to a failure.
    pub fn run(&self, verbose: bool) -> Result<()> {
        let command = self.to_string();
        log::info!("running {command}");

        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args).stdin(Stdio::null());

        let (status, stderr) = if verbose {
            let status = cmd.status().map_err(|e| MsmError::ExternalToolFailure {
                command: command.clone(),
                reason: format!("could not start {}: {e}", self.program.display()),
            })?;
            (status, String::new())
        } else {
            let output = cmd.output().map_err(|e| MsmError::ExternalToolFailure {
                command: command.clone(),
                reason: format!("could not start {}: {e}", self.program.display()),
            })?;
            let stdout = String::from_utf8_lossy(&output.stdout);
            if !stdout.trim().is_empty() {
                log::debug!("{} stdout:\n{}", self.program.display(), stdout.trim_end());
            }
            (output.status, String::from_utf8_lossy(&output.stderr).into_owned())
        };

        if status.success() {
            return Ok(());
        }

        let mut reason = format!("{status}");
        let tail = stderr_tail(&stderr);
        if !tail.is_empty() {
            reason.push_str("\nstderr:\n");
            reason.push_str(&tail);
        }
        Err(MsmError::ExternalToolFailure { command, reason })
    }
}

impl fmt::Display for ToolCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program.display())?;
        for arg in &self.args {
            write!(f, " {}", arg.to_string_lossy())?;
        }
        Ok(())
    }
}

fn stderr_tail(stderr: &str) -> String {
    let lines: Vec<&str> = stderr.lines().collect();
    let start = lines.len().saturating_sub(STDERR_TAIL_LINES);
    lines[start..].join("\n")
}

/// Loads a file the tool declared as output after a successful run.
///
/// A missing file and one that does not parse as GIFTI are both
/// `OutputNotFound`, so a broken tool never reads as a plain format error.
pub fn load_output(path: &Path, command: &ToolCommand) -> Result<GiftiImage> {
    let not_found = |reason: String| MsmError::OutputNotFound {
        path: path.to_path_buf(),
        command: command.to_string(),
        reason,
    };
    if !path.is_file() {
        return Err(not_found("file does not exist".to_string()));
    }
    load_gifti(path).map_err(|e| not_found(e.to_string()))
}

/// Inputs of one registration run.
#[derive(Debug, Clone)]
pub struct MsmRequest<'a> {
    pub in_data_list: &'a [PathBuf],
    pub in_mesh: &'a Path,
    pub ref_data_list: &'a [PathBuf],
    pub output_dir: &'a Path,
    pub config_file: Option<&'a Path>,
    pub debug: bool,
    pub verbose: bool,
}

/// Durable outputs of a registration run, inside `output_dir`.
#[derive(Debug, Clone, PartialEq)]
pub struct MsmOutputs {
    pub transformed_mesh: PathBuf,
    pub transformed_func: PathBuf,
    /// Contents of `transformed_func`, loaded once both outputs checked out.
    pub reprojected: GiftiImage,
}

/// Builds the `msm` command line for already-merged input files.
pub fn msm_command(
    binaries: &MsmBinaries,
    in_data: &Path,
    ref_data: &Path,
    request: &MsmRequest<'_>,
) -> ToolCommand {
    let mut out = request.output_dir.as_os_str().to_os_string();
    out.push(std::path::MAIN_SEPARATOR_STR);

    let mut cmd = ToolCommand::new(&binaries.msm)
        .flag_value("--inmesh", request.in_mesh)
        .flag_value("--refmesh", request.in_mesh)
        .flag_value("--indata", in_data)
        .flag_value("--refdata", ref_data)
        .flag_value("--out", out);
    if let Some(config_file) = request.config_file {
        cmd = cmd.flag_value("--conf", config_file);
    }
    if request.verbose {
        cmd = cmd.arg("--verbose");
    }
    if request.debug {
        cmd = cmd.arg("--debug");
    }
    cmd
}

/// Runs `msm` on lists of per-feature files.
///
/// msm reads one multi-feature file per side, so each list is first merged
/// (in order) into `in_data.func.gii` / `ref_data.func.gii` inside
/// `work_dir`, which the caller owns and scopes. Outputs land in
/// `output_dir` and are left in place; both must load as GIFTI.
pub fn run_msm(binaries: &MsmBinaries, request: &MsmRequest<'_>, work_dir: &Path) -> Result<MsmOutputs> {
    if request.in_data_list.is_empty() {
        return Err(MsmError::EmptyInput("source"));
    }
    if request.in_data_list.len() != request.ref_data_list.len() {
        return Err(MsmError::LengthMismatch {
            n_source: request.in_data_list.len(),
            n_reference: request.ref_data_list.len(),
        });
    }

    let in_data = work_dir.join("in_data.func.gii");
    save_gifti(&GiftiImage::from_darrays(read_darrays(request.in_data_list)?), &in_data)?;
    let ref_data = work_dir.join("ref_data.func.gii");
    save_gifti(&GiftiImage::from_darrays(read_darrays(request.ref_data_list)?), &ref_data)?;

    std::fs::create_dir_all(request.output_dir)?;
    let cmd = msm_command(binaries, &in_data, &ref_data, request);
    cmd.run(request.verbose)?;

    let transformed_mesh = request.output_dir.join(TRANSFORMED_MESH_FILE);
    load_output(&transformed_mesh, &cmd)?;
    let transformed_func = request.output_dir.join(TRANSFORMED_FUNC_FILE);
    let reprojected = load_output(&transformed_func, &cmd)?;
    let outputs = MsmOutputs {
        transformed_mesh,
        transformed_func,
        reprojected,
    };
    log::info!(
        "msm wrote {} and {}",
        outputs.transformed_mesh.display(),
        outputs.transformed_func.display()
    );
    Ok(outputs)
}

/// Inputs of one resampling run.
#[derive(Debug, Clone)]
pub struct ResampleRequest<'a> {
    /// Deformed sphere produced by a registration run.
    pub deformed_mesh: &'a Path,
    /// Output path without the `.func.gii` suffix.
    pub output_prefix: &'a Path,
    pub labels: &'a Path,
    /// Mesh the data is projected onto.
    pub project_mesh: &'a Path,
    pub verbose: bool,
}

/// `msmresample <deformed_mesh> <output_prefix> -labels <input> -project <target_mesh>`
pub fn msmresample_command(binaries: &MsmBinaries, request: &ResampleRequest<'_>) -> ToolCommand {
    ToolCommand::new(&binaries.msmresample)
        .arg(request.deformed_mesh)
        .arg(request.output_prefix)
        .arg("-labels")
        .arg(request.labels)
        .arg("-project")
        .arg(request.project_mesh)
}

/// Runs `msmresample` and loads its `<prefix>.func.gii` output.
pub fn run_msmresample(binaries: &MsmBinaries, request: &ResampleRequest<'_>) -> Result<GiftiImage> {
    let cmd = msmresample_command(binaries, request);
    cmd.run(request.verbose)?;

    let mut output = request.output_prefix.as_os_str().to_os_string();
    output.push(".func.gii");
    load_output(Path::new(&output), &cmd)
}
