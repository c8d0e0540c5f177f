use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

use crate::config::MsmConfig;
use crate::io::{load_gifti, read_darrays, save_gifti, GiftiImage, Intent, SurfaceDataArray};
use crate::model::{FitOptions, FittedAlignment, MsmModel, MANIFEST_FILE};
use crate::sweep::{run_sweep, write_sweep_csv, SweepConfig, SweepRecord};

/// Tool config from a TOML file when given, otherwise from `FSL_PATH`.
pub fn load_config(path: Option<&Path>) -> Result<MsmConfig> {
    match path {
        Some(path) => MsmConfig::from_toml_file(path)
            .with_context(|| format!("loading config {}", path.display())),
        None => MsmConfig::from_env().context("resolving FSL install path"),
    }
}

/// Fits on per-feature files and writes the model manifest next to the msm
/// outputs. Returns the fitted alignment and the manifest path.
pub fn run_fit(
    config: &MsmConfig,
    epsilon: f64,
    source_files: &[PathBuf],
    target_files: &[PathBuf],
    options: &FitOptions,
) -> Result<(FittedAlignment, PathBuf)> {
    let source = read_darrays(source_files).context("reading source maps")?;
    let target = read_darrays(target_files).context("reading target maps")?;

    let fitted = MsmModel::new(epsilon, config.clone())
        .fit_arrays(source, target, options)
        .with_context(|| format!("fit on mesh {} failed", options.mesh_file.display()))?;

    let manifest = options.output_dir.join(MANIFEST_FILE);
    fitted
        .save_manifest(&manifest)
        .with_context(|| format!("writing {}", manifest.display()))?;
    Ok((fitted, manifest))
}

/// Resamples the first map of `input` and writes it as a single-darray file.
pub fn run_transform(config: &MsmConfig, manifest: &Path, input: &Path, output: &Path) -> Result<()> {
    let fitted = FittedAlignment::load_manifest(manifest, config.clone())
        .with_context(|| format!("loading model {}", manifest.display()))?;
    let map = fitted
        .transform_file(input)
        .with_context(|| format!("transform({}) failed", input.display()))?;

    let darray = SurfaceDataArray::from_f32(map)
        .with_intent(Intent::PointSet)
        .with_coordsys(fitted.coordsys.clone());
    save_gifti(&GiftiImage::from_darrays(vec![darray]), output)
        .with_context(|| format!("writing {}", output.display()))?;
    Ok(())
}

pub fn run_score(config: &MsmConfig, manifest: &Path, source: &Path, target: &Path) -> Result<f64> {
    let fitted = FittedAlignment::load_manifest(manifest, config.clone())
        .with_context(|| format!("loading model {}", manifest.display()))?;
    let maps = |path: &Path| -> Result<Vec<Vec<f32>>> {
        Ok(load_gifti(path)
            .with_context(|| format!("reading {}", path.display()))?
            .darrays
            .iter()
            .map(|d| d.data.to_f32_vec())
            .collect())
    };
    let score = fitted
        .score(&maps(source)?, &maps(target)?)
        .context("score failed")?;
    Ok(score)
}

pub fn run_sweep_file(config: &MsmConfig, sweep_file: &Path, csv: Option<&Path>) -> Result<Vec<SweepRecord>> {
    let sweep = SweepConfig::from_toml_file(sweep_file)
        .with_context(|| format!("loading sweep {}", sweep_file.display()))?;
    let records = run_sweep(&sweep, config).context("sweep failed")?;
    if let Some(csv) = csv {
        write_sweep_csv(&records, csv).with_context(|| format!("writing {}", csv.display()))?;
    }
    Ok(records)
}
