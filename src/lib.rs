pub mod cli;
pub mod config;
pub mod entry;
pub mod error;
pub mod io;
pub mod model;
pub mod processing;
pub mod sweep;
mod utils;

#[cfg(feature = "python")]
mod python_bind;

pub use config::MsmConfig;
pub use error::{MsmError, Result};
pub use model::{FitOptions, FittedAlignment, MsmModel};

#[cfg(feature = "python")]
use pyo3::prelude::*;

/// This is the module importable from Python:
///
/// ```python
/// import msmrs
/// model = msmrs.MSMModel(epsilon=0.1).fit(source, target, mesh_file="lh.sphere.gii")
/// resampled = model.transform("contrast.func.gii")
/// ```
#[cfg(feature = "python")]
#[pymodule]
fn msmrs(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add("__version__", env!("CARGO_PKG_VERSION"))?;
    m.add_class::<python_bind::PyMsmModel>()?;
    m.add_function(wrap_pyfunction!(python_bind::lambda_sweep, m)?)?;
    Ok(())
}
