use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};

use crate::config::{write_lambda_config, MsmConfig};
use crate::error::{MsmError, Result};
use crate::io::coordsys::CoordSys;
use crate::io::{load_gifti, GiftiError, GiftiImage, SurfaceDataArray, SurfaceMesh};
use crate::processing::invoke::{run_msm, run_msmresample, MsmRequest, ResampleRequest};
use crate::processing::materialize::{materialize, materialize_each, FileRole, ScopedDir};
use crate::processing::normalize::{check_vertex_counts, duplicate_single_feature, prepare_darrays};
use crate::processing::scoring::r2_score;

/// Spherical mesh used when the caller does not name one.
pub const DEFAULT_MESH: &str = "data/lh.sphere.gii";
pub const DEFAULT_EPSILON: f64 = 0.1;
/// File name `save_manifest` uses inside an output directory by convention.
pub const MANIFEST_FILE: &str = "msm_model.json";

#[derive(Debug, Clone, PartialEq)]
pub struct FitOptions {
    pub mesh_file: PathBuf,
    /// Durable outputs land here; the scoped input directory is created inside it.
    pub output_dir: PathBuf,
    pub verbose: bool,
    pub debug: bool,
}

impl Default for FitOptions {
    fn default() -> Self {
        Self {
            mesh_file: PathBuf::from(DEFAULT_MESH),
            output_dir: PathBuf::from("."),
            verbose: false,
            debug: false,
        }
    }
}

/// Unfitted registration model: a regularization strength plus tool config.
#[derive(Debug, Clone)]
pub struct MsmModel {
    /// Regularization strength, called lambda in the MSM docs.
    pub epsilon: f64,
    pub config: MsmConfig,
}

impl MsmModel {
    pub fn new(epsilon: f64, config: MsmConfig) -> Self {
        Self { epsilon, config }
    }

    /// Registers `source` onto `target`, one contrast map per entry.
    pub fn fit(
        &self,
        source: &[Vec<f32>],
        target: &[Vec<f32>],
        options: &FitOptions,
    ) -> Result<FittedAlignment> {
        let wrap = |maps: &[Vec<f32>]| -> Vec<SurfaceDataArray> {
            maps.iter()
                .map(|m| SurfaceDataArray::from_f32(m.clone()))
                .collect()
        };
        self.fit_arrays(wrap(source), wrap(target), options)
    }

    /// Same as [`MsmModel::fit`] for darrays that may already carry a coordsys.
    ///
    /// Every array is validated against the mesh before anything is written or
    /// spawned. The scoped input directory is removed on every exit path; the
    /// msm outputs in `output_dir` are kept.
    pub fn fit_arrays(
        &self,
        mut source: Vec<SurfaceDataArray>,
        mut target: Vec<SurfaceDataArray>,
        options: &FitOptions,
    ) -> Result<FittedAlignment> {
        if source.is_empty() {
            return Err(MsmError::EmptyInput("source"));
        }
        if source.len() != target.len() {
            return Err(MsmError::LengthMismatch {
                n_source: source.len(),
                n_reference: target.len(),
            });
        }

        let mesh = SurfaceMesh::load(&options.mesh_file)?;
        prepare_darrays(&mut source, &mesh.coordsys)?;
        prepare_darrays(&mut target, &mesh.coordsys)?;
        check_vertex_counts(&source, mesh.n_vertices())?;
        check_vertex_counts(&target, mesh.n_vertices())?;

        if duplicate_single_feature(&mut source) {
            duplicate_single_feature(&mut target);
            log::debug!("single contrast map duplicated for msm");
        }

        log::info!(
            "fitting msm on {} contrast maps, {} vertices, epsilon={}",
            source.len(),
            mesh.n_vertices(),
            self.epsilon
        );

        let scoped = ScopedDir::new_in(&options.output_dir)?;
        let source_files = materialize_each(&scoped, &source, FileRole::Source)?;
        let target_files = materialize_each(&scoped, &target, FileRole::Target)?;

        let config_file = match &self.config.config_template {
            Some(template) => Some(write_lambda_config(
                template,
                self.epsilon,
                self.config.lambda_levels,
                scoped.path(),
            )?),
            None => {
                log::warn!(
                    "no config template set, epsilon={} is not forwarded to msm",
                    self.epsilon
                );
                None
            }
        };

        let request = MsmRequest {
            in_data_list: &source_files,
            in_mesh: &options.mesh_file,
            ref_data_list: &target_files,
            output_dir: &options.output_dir,
            config_file: config_file.as_deref(),
            debug: options.debug,
            verbose: options.verbose,
        };
        let outputs = run_msm(&self.config.binaries(), &request, scoped.path())?;
        let transformed_func = outputs
            .reprojected
            .darrays
            .iter()
            .map(|d| d.data.to_f32_vec())
            .collect();
        scoped.close()?;

        Ok(FittedAlignment {
            transformed_mesh_path: outputs.transformed_mesh,
            mesh_path: options.mesh_file.clone(),
            coordsys: mesh.coordsys,
            transformed_func,
            epsilon: Some(self.epsilon),
            verbose: options.verbose,
            config: self.config.clone(),
        })
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct ModelManifest {
    transformed_mesh_path: PathBuf,
    mesh_path: PathBuf,
    epsilon: Option<f64>,
}

/// Result of a fit: the deformed mesh plus what is needed to resample new
/// data with it.
#[derive(Debug, Clone)]
pub struct FittedAlignment {
    pub transformed_mesh_path: PathBuf,
    pub mesh_path: PathBuf,
    /// Captured from the mesh at fit (or load) time.
    pub coordsys: CoordSys,
    /// Source data resampled onto the reference mesh by the fit. Empty for a
    /// loaded alignment.
    pub transformed_func: Vec<Vec<f32>>,
    pub epsilon: Option<f64>,
    pub verbose: bool,
    pub config: MsmConfig,
}

impl FittedAlignment {
    /// Rebuilds an alignment from a deformed mesh left by an earlier fit,
    /// usually `<output_dir>/transformed_in_mesh.surf.gii`.
    pub fn load(
        transformed_mesh_path: impl Into<PathBuf>,
        mesh_path: impl Into<PathBuf>,
        config: MsmConfig,
    ) -> Result<Self> {
        let transformed_mesh_path = transformed_mesh_path.into();
        let mesh_path = mesh_path.into();
        if !transformed_mesh_path.is_file() {
            return Err(GiftiError::FileNotFound {
                path: transformed_mesh_path,
            }
            .into());
        }
        let mesh = SurfaceMesh::load(&mesh_path)?;

        Ok(Self {
            transformed_mesh_path,
            mesh_path,
            coordsys: mesh.coordsys,
            transformed_func: Vec::new(),
            epsilon: None,
            verbose: false,
            config,
        })
    }

    pub fn save_manifest<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let manifest = ModelManifest {
            transformed_mesh_path: self.transformed_mesh_path.clone(),
            mesh_path: self.mesh_path.clone(),
            epsilon: self.epsilon,
        };
        let writer = BufWriter::new(File::create(path.as_ref())?);
        serde_json::to_writer_pretty(writer, &manifest)?;
        log::debug!("saved model manifest {}", path.as_ref().display());
        Ok(())
    }

    pub fn load_manifest<P: AsRef<Path>>(path: P, config: MsmConfig) -> Result<Self> {
        let reader = BufReader::new(File::open(path.as_ref())?);
        let manifest: ModelManifest = serde_json::from_reader(reader)?;
        let mut fitted = Self::load(manifest.transformed_mesh_path, manifest.mesh_path, config)?;
        fitted.epsilon = manifest.epsilon;
        Ok(fitted)
    }

    /// Resamples `darrays` through the deformed mesh onto the original mesh.
    ///
    /// Returns one map per input darray. Each call works in its own scoped
    /// directory under the configured scratch dir, so concurrent calls on one
    /// alignment do not share files.
    pub fn transform(&self, mut darrays: Vec<SurfaceDataArray>) -> Result<Vec<Vec<f32>>> {
        if darrays.is_empty() {
            return Err(MsmError::EmptyInput("source"));
        }
        let n_features = darrays.len();
        prepare_darrays(&mut darrays, &self.coordsys)?;
        duplicate_single_feature(&mut darrays);

        let scoped = ScopedDir::new_in(&self.config.scratch_dir())?;
        let input = materialize(&scoped, FileRole::TestInput, &GiftiImage::from_darrays(darrays))?;
        let prefix = scoped.path().join("transformed_contrast");
        let request = ResampleRequest {
            deformed_mesh: &self.transformed_mesh_path,
            output_prefix: &prefix,
            labels: &input,
            project_mesh: &self.mesh_path,
            verbose: self.verbose,
        };
        let resampled = run_msmresample(&self.config.binaries(), &request)?;
        scoped.close()?;

        if resampled.darrays.len() < n_features {
            return Err(GiftiError::invalid_content(format!(
                "msmresample returned {} darrays for {} inputs",
                resampled.darrays.len(),
                n_features
            ))
            .into());
        }
        Ok(resampled
            .darrays
            .iter()
            .take(n_features)
            .map(|d| d.data.to_f32_vec())
            .collect())
    }

    pub fn transform_image(&self, image: GiftiImage) -> Result<Vec<Vec<f32>>> {
        self.transform(image.darrays)
    }

    /// Transforms the first contrast map stored in a `.func.gii` file.
    pub fn transform_file<P: AsRef<Path>>(&self, path: P) -> Result<Vec<f32>> {
        let image = load_gifti(path)?;
        self.transform_image(image)?
            .into_iter()
            .next()
            .ok_or(MsmError::EmptyInput("source"))
    }

    pub fn transform_maps(&self, maps: &[Vec<f32>]) -> Result<Vec<Vec<f32>>> {
        self.transform(
            maps.iter()
                .map(|m| SurfaceDataArray::from_f32(m.clone()))
                .collect(),
        )
    }

    /// R² between `transform(source)` and `target`, per map across vertices,
    /// averaged over maps.
    pub fn score(&self, source: &[Vec<f32>], target: &[Vec<f32>]) -> Result<f64> {
        let transformed = self.transform_maps(source)?;
        r2_score(&transformed, target)
    }
}
