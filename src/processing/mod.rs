pub mod invoke;
pub mod materialize;
pub mod normalize;
pub mod scoring;

pub use invoke::{run_msm, run_msmresample, MsmBinaries, MsmOutputs, MsmRequest, ResampleRequest};
pub use materialize::{materialize, materialize_each, FileRole, ScopedDir};
pub use normalize::{check_vertex_counts, duplicate_single_feature, prepare_darrays};
pub use scoring::{pearson_r, r2_score};
