use std::path::{Path, PathBuf};

use crate::error::{MsmError, Result};
use crate::io::coordsys::CoordSys;
use crate::io::{
    load_gifti, ArrayData, ArrayOrder, GiftiError, GiftiImage, Intent, SurfaceDataArray,
};

/// Surface mesh loaded from a `.surf.gii` file.
///
/// The coordsys of the first darray is authoritative for all data associated
/// with the mesh. A mesh whose first darray carries no coordsys is treated as
/// living in the default space (unknown/unknown/identity).
#[derive(Debug, Clone, PartialEq)]
pub struct SurfaceMesh {
    pub path: PathBuf,
    pub vertices: Vec<[f32; 3]>,
    pub triangles: Vec<[i32; 3]>,
    pub coordsys: CoordSys,
}

impl SurfaceMesh {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let image = load_gifti(path)?;
        Self::from_image(&image, path)
    }

    pub fn from_image(image: &GiftiImage, path: &Path) -> Result<Self> {
        let first = image
            .darrays
            .first()
            .ok_or_else(|| MsmError::EmptyMesh(path.to_path_buf()))?;
        let coordsys = first.coordsys.clone().unwrap_or_default();

        let pointset = image
            .darrays
            .iter()
            .find(|d| d.intent == Intent::PointSet)
            .ok_or_else(|| {
                GiftiError::invalid_content(format!("{} has no pointset darray", path.display()))
            })?;
        let coords = pointset.data.to_f32_vec();
        let vertices = triples(&coords, pointset)?;

        let triangles = match image.darrays.iter().find(|d| d.intent == Intent::Triangle) {
            Some(darray) => {
                let indices: Vec<i32> = match &darray.data {
                    ArrayData::Int32(v) => v.clone(),
                    other => other.to_f32_vec().iter().map(|&x| x as i32).collect(),
                };
                triples(&indices, darray)?
            }
            None => Vec::new(),
        };

        Ok(Self {
            path: path.to_path_buf(),
            vertices,
            triangles,
            coordsys,
        })
    }

    pub fn n_vertices(&self) -> usize {
        self.vertices.len()
    }

    /// Pointset + triangle image of this mesh, pointset carrying the coordsys.
    pub fn to_image(&self) -> GiftiImage {
        let coords: Vec<f32> = self.vertices.iter().flatten().copied().collect();
        let pointset = SurfaceDataArray::from_f32(coords)
            .with_intent(Intent::PointSet)
            .with_dims(vec![self.vertices.len(), 3])
            .with_coordsys(self.coordsys.clone());

        let indices: Vec<i32> = self.triangles.iter().flatten().copied().collect();
        let mut triangles = SurfaceDataArray::from_f32(Vec::new())
            .with_intent(Intent::Triangle)
            .with_dims(vec![self.triangles.len(), 3]);
        triangles.data = ArrayData::Int32(indices);

        GiftiImage::from_darrays(vec![pointset, triangles])
    }
}

/// Splits an (n, 3) array into rows, honouring its indexing order.
fn triples<T: Copy>(values: &[T], darray: &SurfaceDataArray) -> Result<Vec<[T; 3]>> {
    let rows = darray.n_rows();
    if darray.dims.len() != 2 || darray.dims[1] != 3 || values.len() != rows * 3 {
        return Err(GiftiError::invalid_content(format!(
            "expected an (n, 3) {} darray, got dims {:?}",
            darray.intent.name(),
            darray.dims
        ))
        .into());
    }
    let out = match darray.ordering {
        ArrayOrder::RowMajor => values
            .chunks_exact(3)
            .map(|c| [c[0], c[1], c[2]])
            .collect(),
        ArrayOrder::ColumnMajor => (0..rows)
            .map(|i| [values[i], values[rows + i], values[2 * rows + i]])
            .collect(),
    };
    Ok(out)
}
