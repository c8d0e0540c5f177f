// File: src/python_bind.rs
use pyo3::exceptions::{PyRuntimeError, PyValueError};
use pyo3::prelude::*;
use std::path::PathBuf;

use crate::config::MsmConfig;
use crate::error::MsmError;
use crate::model::{FitOptions, FittedAlignment, MsmModel, DEFAULT_EPSILON};
use crate::sweep::{run_sweep, write_sweep_csv, SweepConfig};

pub fn to_py_err(err: MsmError) -> PyErr {
    match err {
        MsmError::CoordinateSystemMismatch { .. } => PyValueError::new_err(err.to_string()),
        other => PyRuntimeError::new_err(other.to_string()),
    }
}

fn resolve_config(fsl_path: Option<PathBuf>) -> PyResult<MsmConfig> {
    match fsl_path {
        Some(path) => Ok(MsmConfig::with_fsl_path(path)),
        None => MsmConfig::from_env().map_err(to_py_err),
    }
}

/// Python-facing model: `MSMModel(epsilon).fit(source, target).transform(path)`.
#[pyclass(name = "MSMModel")]
#[derive(Debug, Clone)]
pub struct PyMsmModel {
    epsilon: f64,
    config: MsmConfig,
    fitted: Option<FittedAlignment>,
}

impl PyMsmModel {
    fn fitted(&self) -> PyResult<&FittedAlignment> {
        self.fitted
            .as_ref()
            .ok_or_else(|| PyRuntimeError::new_err("model is not fitted; call fit() or load_model() first"))
    }
}

#[pymethods]
impl PyMsmModel {
    #[new]
    #[pyo3(signature = (epsilon = DEFAULT_EPSILON, fsl_path = None, config_template = None))]
    fn new(epsilon: f64, fsl_path: Option<PathBuf>, config_template: Option<PathBuf>) -> PyResult<Self> {
        let mut config = resolve_config(fsl_path)?;
        config.config_template = config_template;
        Ok(Self {
            epsilon,
            config,
            fitted: None,
        })
    }

    #[pyo3(signature = (
        source_data,
        target_data,
        mesh_file = None,
        output_dir = None,
        verbose = false,
        debug = false
    ))]
    fn fit<'py>(
        mut slf: PyRefMut<'py, Self>,
        source_data: Vec<Vec<f32>>,
        target_data: Vec<Vec<f32>>,
        mesh_file: Option<PathBuf>,
        output_dir: Option<PathBuf>,
        verbose: bool,
        debug: bool,
    ) -> PyResult<PyRefMut<'py, Self>> {
        let defaults = FitOptions::default();
        let options = FitOptions {
            mesh_file: mesh_file.unwrap_or(defaults.mesh_file),
            output_dir: output_dir.unwrap_or(defaults.output_dir),
            verbose,
            debug,
        };
        let model = MsmModel::new(slf.epsilon, slf.config.clone());
        let fitted = slf
            .py()
            .allow_threads(|| model.fit(&source_data, &target_data, &options))
            .map_err(to_py_err)?;
        slf.fitted = Some(fitted);
        Ok(slf)
    }

    /// Resamples the first map of a `.func.gii` file onto the fitted mesh.
    fn transform(&self, py: Python<'_>, source_data: PathBuf) -> PyResult<Vec<f32>> {
        let fitted = self.fitted()?;
        py.allow_threads(|| fitted.transform_file(&source_data))
            .map_err(to_py_err)
    }

    fn transform_maps(&self, py: Python<'_>, source_data: Vec<Vec<f32>>) -> PyResult<Vec<Vec<f32>>> {
        let fitted = self.fitted()?;
        py.allow_threads(|| fitted.transform_maps(&source_data))
            .map_err(to_py_err)
    }

    fn score(&self, py: Python<'_>, source_data: Vec<Vec<f32>>, target_data: Vec<Vec<f32>>) -> PyResult<f64> {
        let fitted = self.fitted()?;
        py.allow_threads(|| fitted.score(&source_data, &target_data))
            .map_err(to_py_err)
    }

    fn load_model<'py>(
        mut slf: PyRefMut<'py, Self>,
        model_filename: PathBuf,
        mesh: PathBuf,
    ) -> PyResult<PyRefMut<'py, Self>> {
        let fitted = FittedAlignment::load(model_filename, mesh, slf.config.clone()).map_err(to_py_err)?;
        slf.fitted = Some(fitted);
        Ok(slf)
    }

    #[getter]
    fn epsilon(&self) -> f64 {
        self.epsilon
    }

    #[getter]
    fn transformed_mesh_path(&self) -> Option<PathBuf> {
        self.fitted.as_ref().map(|f| f.transformed_mesh_path.clone())
    }

    #[getter]
    fn mesh_path(&self) -> Option<PathBuf> {
        self.fitted.as_ref().map(|f| f.mesh_path.clone())
    }

    #[getter]
    fn transformed_func(&self) -> Option<Vec<Vec<f32>>> {
        self.fitted.as_ref().map(|f| f.transformed_func.clone())
    }

    fn __repr__(&self) -> String {
        match &self.fitted {
            Some(f) => format!(
                "MSMModel(epsilon={}, transformed_mesh={})",
                self.epsilon,
                f.transformed_mesh_path.display()
            ),
            None => format!("MSMModel(epsilon={}, unfitted)", self.epsilon),
        }
    }
}

/// Runs a sweep from a TOML file and returns `(epsilon, correlation, baseline)` rows.
#[pyfunction]
#[pyo3(signature = (sweep_file, csv = None, fsl_path = None))]
pub fn lambda_sweep(
    py: Python<'_>,
    sweep_file: PathBuf,
    csv: Option<PathBuf>,
    fsl_path: Option<PathBuf>,
) -> PyResult<Vec<(f64, f64, f64)>> {
    let config = resolve_config(fsl_path)?;
    let sweep = SweepConfig::from_toml_file(&sweep_file).map_err(to_py_err)?;
    let records = py
        .allow_threads(|| run_sweep(&sweep, &config))
        .map_err(to_py_err)?;
    if let Some(csv) = csv {
        write_sweep_csv(&records, csv).map_err(to_py_err)?;
    }
    Ok(records
        .iter()
        .map(|r| (r.epsilon, r.correlation, r.baseline_correlation))
        .collect())
}
