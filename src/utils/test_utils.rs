use nalgebra::Matrix4;
use std::f32::consts::PI;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

use crate::config::MsmConfig;
use crate::io::coordsys::{CoordSys, XformSpace};
use crate::io::{save_gifti, SurfaceMesh};
use crate::processing::invoke::MsmBinaries;

/// Talairach-to-Talairach space with a small translation.
pub fn coordsys_c() -> CoordSys {
    let mut xform = Matrix4::identity();
    xform[(0, 3)] = 1.5;
    xform[(1, 3)] = -2.0;
    CoordSys::new(XformSpace::Talairach, XformSpace::Talairach, xform)
}

/// Same spaces as [`coordsys_c`], different transform matrix.
pub fn coordsys_c_prime() -> CoordSys {
    let mut coordsys = coordsys_c();
    coordsys.xform[(2, 3)] = 0.25;
    coordsys
}

/// Distinct, non-constant values for `n` vertices.
pub fn ramp_map(n: usize, offset: f32) -> Vec<f32> {
    (0..n).map(|i| offset + (i as f32) * 0.01 + ((i % 7) as f32) * 0.1).collect()
}

/// Writes an `n`-vertex sphere-ish mesh (triangle fan) and returns its path.
pub fn write_mesh(dir: &Path, name: &str, n_vertices: usize, coordsys: &CoordSys) -> PathBuf {
    let vertices = (0..n_vertices)
        .map(|i| {
            let t = i as f32 / n_vertices.max(1) as f32;
            let theta = PI * t;
            let phi = 2.0 * PI * 7.0 * t;
            [
                100.0 * theta.sin() * phi.cos(),
                100.0 * theta.sin() * phi.sin(),
                100.0 * theta.cos(),
            ]
        })
        .collect();
    let triangles = (1..n_vertices.saturating_sub(1))
        .map(|i| [0, i as i32, i as i32 + 1])
        .collect();
    let path = dir.join(name);
    let mesh = SurfaceMesh {
        path: path.clone(),
        vertices,
        triangles,
        coordsys: coordsys.clone(),
    };
    save_gifti(&mesh.to_image(), &path).unwrap();
    path
}

/// How the fake `msm` / `msmresample` scripts behave.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolBehavior {
    /// Write the declared outputs (copies of the inputs) and exit 0.
    Ok,
    /// Print to stderr and exit 3.
    Fail,
    /// Exit 0 without writing anything.
    Silent,
    /// Write non-GIFTI text to the declared outputs and exit 0.
    Garbage,
}

const MSM_OK: &str = r#"
for arg in "$@"; do
  case "$arg" in
    --inmesh=*) inmesh="${arg#--inmesh=}" ;;
    --indata=*) indata="${arg#--indata=}" ;;
    --out=*) out="${arg#--out=}" ;;
  esac
done
cp "$inmesh" "${out}transformed_in_mesh.surf.gii" || exit 1
cp "$indata" "${out}transformed_and_reprojected.func.gii" || exit 1
"#;

const MSMRESAMPLE_OK: &str = r#"
cp "$4" "$2.func.gii" || exit 1
"#;

const MSM_GARBAGE: &str = r#"
for arg in "$@"; do
  case "$arg" in
    --out=*) out="${arg#--out=}" ;;
  esac
done
mkdir -p "$out"
echo garbage > "${out}transformed_in_mesh.surf.gii"
echo garbage > "${out}transformed_and_reprojected.func.gii"
"#;

const MSMRESAMPLE_GARBAGE: &str = r#"
echo garbage > "$2.func.gii"
"#;

const FAIL: &str = r#"
echo "simulated failure" >&2
exit 3
"#;

/// FSL install tree whose binaries are shell scripts. Every invocation is
/// appended to `<root>/calls.log`.
pub struct FakeFsl {
    root: TempDir,
}

impl FakeFsl {
    #[cfg(unix)]
    pub fn new(behavior: ToolBehavior) -> Self {
        use std::os::unix::fs::PermissionsExt;

        let root = tempfile::tempdir().unwrap();
        let bin = root.path().join("bin");
        std::fs::create_dir_all(&bin).unwrap();

        let tools = [
            ("msm", MSM_OK, MSM_GARBAGE),
            ("msmresample", MSMRESAMPLE_OK, MSMRESAMPLE_GARBAGE),
        ];
        for (tool, ok_body, garbage_body) in tools {
            let body = match behavior {
                ToolBehavior::Ok => ok_body,
                ToolBehavior::Fail => FAIL,
                ToolBehavior::Silent => "",
                ToolBehavior::Garbage => garbage_body,
            };
            let script = format!(
                "#!/bin/sh\necho \"{tool} $*\" >> \"$(dirname \"$0\")/../calls.log\"\n{body}exit 0\n"
            );
            let path = bin.join(tool);
            std::fs::write(&path, script).unwrap();
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        }
        Self { root }
    }

    pub fn path(&self) -> &Path {
        self.root.path()
    }

    pub fn binaries(&self) -> MsmBinaries {
        MsmBinaries::from_fsl_path(self.path())
    }

    /// Config pointing at this tree, with scratch space under `work/scratch`.
    pub fn config(&self, work: &Path) -> MsmConfig {
        MsmConfig {
            scratch_dir: Some(work.join("scratch")),
            ..MsmConfig::with_fsl_path(self.path())
        }
    }

    /// Logged invocations, one line each, oldest first.
    pub fn calls(&self) -> Vec<String> {
        std::fs::read_to_string(self.path().join("calls.log"))
            .map(|log| log.lines().map(str::to_string).collect())
            .unwrap_or_default()
    }
}
