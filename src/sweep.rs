//! Regularization sweep: fit one alignment per epsilon on training pairs and
//! compare test-pair correlations before and after resampling.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::config::MsmConfig;
use crate::error::{MsmError, Result};
use crate::io::{load_gifti, read_darrays, GiftiError, SurfaceDataArray};
use crate::model::{FitOptions, FittedAlignment, MsmModel, DEFAULT_MESH};
use crate::processing::invoke::TRANSFORMED_MESH_FILE;
use crate::processing::normalize::prepare_darrays;
use crate::processing::scoring::pearson_r;

/// An input file and the reference file it should be registered onto.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataPair {
    pub input: PathBuf,
    pub reference: PathBuf,
}

/// ```toml
/// epsilons = [0.01, 0.1, 1, 10]
/// mesh = "data/lh.sphere.gii"
/// output_root = "."
/// train_mode = true
///
/// [[train]]
/// input = "data/sub-07_ses-00_lh.gii"
/// reference = "data/sub-04_ses-00_lh.gii"
///
/// [[test]]
/// input = "data/sub-07_ses-04_lh.gii"
/// reference = "data/sub-04_ses-04_lh.gii"
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SweepConfig {
    pub epsilons: Vec<f64>,
    #[serde(default = "default_mesh")]
    pub mesh: PathBuf,
    #[serde(default = "default_output_root")]
    pub output_root: PathBuf,
    #[serde(default)]
    pub train: Vec<DataPair>,
    pub test: Vec<DataPair>,
    /// Run msm for every epsilon; when false (the default), reuse outputs of
    /// an earlier run.
    #[serde(default)]
    pub train_mode: bool,
    #[serde(default)]
    pub verbose: bool,
}

fn default_mesh() -> PathBuf {
    PathBuf::from(DEFAULT_MESH)
}

fn default_output_root() -> PathBuf {
    PathBuf::from(".")
}

impl SweepConfig {
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let sweep: Self =
            toml::from_str(content).map_err(|e| MsmError::config(format!("bad sweep TOML: {e}")))?;
        sweep.validate()?;
        Ok(sweep)
    }

    pub fn from_toml_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&content)
    }

    pub fn validate(&self) -> Result<()> {
        if self.epsilons.is_empty() {
            return Err(MsmError::config("epsilons is empty"));
        }
        if self.test.is_empty() {
            return Err(MsmError::config("no test pairs"));
        }
        if self.train_mode && self.train.is_empty() {
            return Err(MsmError::config("train_mode is set but there are no train pairs"));
        }
        Ok(())
    }
}

/// Mean correlations over the test pairs for one epsilon.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SweepRecord {
    pub epsilon: f64,
    /// Resampled input vs. reference.
    pub correlation: f64,
    /// Raw input vs. reference.
    pub baseline_correlation: f64,
}

pub fn output_dir_for(root: &Path, epsilon: f64) -> PathBuf {
    root.join(format!("test_outputs_lambda{epsilon}"))
}

pub fn run_sweep(sweep: &SweepConfig, config: &MsmConfig) -> Result<Vec<SweepRecord>> {
    sweep.validate()?;
    let mut records = Vec::with_capacity(sweep.epsilons.len());

    for &epsilon in &sweep.epsilons {
        let output_dir = output_dir_for(&sweep.output_root, epsilon);
        let fitted = if sweep.train_mode {
            let inputs: Vec<PathBuf> = sweep.train.iter().map(|p| p.input.clone()).collect();
            let references: Vec<PathBuf> = sweep.train.iter().map(|p| p.reference.clone()).collect();
            let options = FitOptions {
                mesh_file: sweep.mesh.clone(),
                output_dir,
                verbose: sweep.verbose,
                debug: false,
            };
            MsmModel::new(epsilon, config.clone()).fit_arrays(
                read_darrays(&inputs)?,
                read_darrays(&references)?,
                &options,
            )?
        } else {
            FittedAlignment::load(
                output_dir.join(TRANSFORMED_MESH_FILE),
                &sweep.mesh,
                config.clone(),
            )?
        };

        let record = evaluate(&fitted, epsilon, &sweep.test)?;
        log::info!(
            "epsilon={}: correlation {:.4} (baseline {:.4})",
            record.epsilon,
            record.correlation,
            record.baseline_correlation
        );
        records.push(record);
    }
    Ok(records)
}

fn evaluate(fitted: &FittedAlignment, epsilon: f64, test: &[DataPair]) -> Result<SweepRecord> {
    let n = test.len() as f64;
    let mut correlation = 0.0;
    let mut baseline_correlation = 0.0;

    for pair in test {
        let input = load_gifti(&pair.input)?;
        let baseline = first_map(&input.darrays, &pair.input)?;
        let transformed = fitted.transform_image(input)?;

        let mut reference = load_gifti(&pair.reference)?.darrays;
        prepare_darrays(&mut reference, &fitted.coordsys)?;
        let reference = first_map(&reference, &pair.reference)?;

        correlation += pearson_r(&transformed[0], &reference)? / n;
        baseline_correlation += pearson_r(&baseline, &reference)? / n;
    }

    Ok(SweepRecord {
        epsilon,
        correlation,
        baseline_correlation,
    })
}

fn first_map(darrays: &[SurfaceDataArray], path: &Path) -> Result<Vec<f32>> {
    darrays
        .first()
        .map(|d| d.data.to_f32_vec())
        .ok_or_else(|| {
            GiftiError::invalid_content(format!("{} has no darrays", path.display())).into()
        })
}

/// Writes `epsilon,correlation,baseline_correlation` rows.
pub fn write_sweep_csv<P: AsRef<Path>>(records: &[SweepRecord], path: P) -> Result<()> {
    let mut wtr = csv::Writer::from_path(path)?;
    for record in records {
        wtr.serialize(record)?;
    }
    wtr.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::GiftiImage;
    use crate::utils::test_utils::{coordsys_c, ramp_map, write_mesh};

    fn write_map(dir: &Path, name: &str, values: Vec<f32>) -> PathBuf {
        let path = dir.join(name);
        GiftiImage::from_darrays(vec![SurfaceDataArray::from_f32(values)])
            .save(&path)
            .unwrap();
        path
    }

    #[test]
    fn toml_defaults_and_validation() {
        let sweep = SweepConfig::from_toml_str(
            r#"
epsilons = [0.01, 1]

[[train]]
input = "a.gii"
reference = "b.gii"

[[test]]
input = "c.gii"
reference = "d.gii"
"#,
        )
        .unwrap();
        assert_eq!(sweep.mesh, PathBuf::from(DEFAULT_MESH));
        assert!(!sweep.train_mode);
        assert_eq!(sweep.test[0].reference, PathBuf::from("d.gii"));

        let reuse = SweepConfig::from_toml_str(
            "epsilons = [0.1]\n[[test]]\ninput = \"c.gii\"\nreference = \"d.gii\"\n",
        )
        .unwrap();
        assert!(!reuse.train_mode);
        assert!(reuse.train.is_empty());

        let err = SweepConfig::from_toml_str(
            "epsilons = [0.1]\ntrain_mode = true\n[[test]]\ninput = \"c.gii\"\nreference = \"d.gii\"\n",
        )
        .unwrap_err();
        assert!(matches!(err, MsmError::Config(_)));

        let err = SweepConfig::from_toml_str("epsilons = []\ntest = []").unwrap_err();
        assert!(matches!(err, MsmError::Config(_)));
    }

    #[test]
    fn output_dirs_follow_epsilon_text() {
        let root = Path::new("runs");
        assert_eq!(output_dir_for(root, 0.025), root.join("test_outputs_lambda0.025"));
        assert_eq!(output_dir_for(root, 10.0), root.join("test_outputs_lambda10"));
    }

    #[test]
    fn csv_has_expected_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sweep.csv");
        let records = vec![
            SweepRecord { epsilon: 0.1, correlation: 0.5, baseline_correlation: 0.25 },
            SweepRecord { epsilon: 1.0, correlation: 0.75, baseline_correlation: 0.25 },
        ];
        write_sweep_csv(&records, &path).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines[0], "epsilon,correlation,baseline_correlation");
        assert_eq!(lines[1], "0.1,0.5,0.25");
        assert_eq!(lines.len(), 3);
    }

    #[test]
    fn reuse_mode_needs_previous_outputs() {
        let dir = tempfile::tempdir().unwrap();
        let mesh = write_mesh(dir.path(), "lh.sphere.gii", 10, &coordsys_c());
        let sweep = SweepConfig {
            epsilons: vec![0.1],
            mesh,
            output_root: dir.path().to_path_buf(),
            train: Vec::new(),
            test: vec![DataPair {
                input: write_map(dir.path(), "in.func.gii", ramp_map(10, 0.0)),
                reference: write_map(dir.path(), "ref.func.gii", ramp_map(10, 1.0)),
            }],
            train_mode: false,
            verbose: false,
        };

        let err = run_sweep(&sweep, &MsmConfig::with_fsl_path(dir.path())).unwrap_err();
        assert!(matches!(err, MsmError::Gifti(GiftiError::FileNotFound { .. })));
    }

    #[cfg(unix)]
    #[test]
    fn sweep_fits_each_epsilon_and_scores_test_pairs() {
        use crate::utils::test_utils::{FakeFsl, ToolBehavior};
        use approx::assert_relative_eq;

        let fsl = FakeFsl::new(ToolBehavior::Ok);
        let dir = tempfile::tempdir().unwrap();
        let mesh = write_mesh(dir.path(), "lh.sphere.gii", 100, &coordsys_c());
        let pair = |name: &str, offset: f32| DataPair {
            input: write_map(dir.path(), &format!("{name}_in.func.gii"), ramp_map(100, offset)),
            reference: write_map(dir.path(), &format!("{name}_ref.func.gii"), ramp_map(100, offset + 1.0)),
        };
        let sweep = SweepConfig {
            epsilons: vec![0.1, 1.0],
            mesh,
            output_root: dir.path().join("runs"),
            train: vec![pair("a", 0.0), pair("b", 2.0)],
            test: vec![pair("c", 5.0)],
            train_mode: true,
            verbose: false,
        };

        let records = run_sweep(&sweep, &fsl.config(dir.path())).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].epsilon, 1.0);
        for record in &records {
            // ramp maps with a constant offset correlate perfectly
            assert_relative_eq!(record.correlation, 1.0, epsilon = 1e-6);
            assert_relative_eq!(record.baseline_correlation, 1.0, epsilon = 1e-6);
        }
        assert!(output_dir_for(&sweep.output_root, 0.1)
            .join(TRANSFORMED_MESH_FILE)
            .is_file());
        assert_eq!(fsl.calls().len(), 4);
    }
}
