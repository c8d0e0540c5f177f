pub mod coordsys;
pub mod input;
pub mod mesh;
pub mod output;

use std::path::{Path, PathBuf};
use thiserror::Error;

use coordsys::CoordSys;

pub use input::{load_gifti, parse_gifti};
pub use mesh::SurfaceMesh;
pub use output::{save_gifti, to_xml_string};

pub type GiftiResult<T> = Result<T, GiftiError>;

/// Errors reading or writing GIFTI containers.
#[derive(Debug, Error)]
pub enum GiftiError {
    #[error("file not found: {}", path.display())]
    FileNotFound { path: PathBuf },

    #[error("invalid GIFTI content: {message}")]
    InvalidContent { message: String },

    #[error("unsupported {what}: {value}")]
    Unsupported { what: &'static str, value: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl GiftiError {
    pub fn invalid_content(message: impl Into<String>) -> Self {
        Self::InvalidContent {
            message: message.into(),
        }
    }
}

/// NIfTI intent codes that show up on surface files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Intent {
    None,
    Label,
    Vector,
    PointSet,
    Triangle,
    TimeSeries,
    NodeIndex,
    Shape,
    /// Any other intent name, preserved verbatim.
    Other(String),
}

impl Intent {
    pub fn code(&self) -> Option<i32> {
        match self {
            Intent::None => Some(0),
            Intent::Label => Some(1002),
            Intent::Vector => Some(1007),
            Intent::PointSet => Some(1008),
            Intent::Triangle => Some(1009),
            Intent::TimeSeries => Some(2001),
            Intent::NodeIndex => Some(2002),
            Intent::Shape => Some(2005),
            Intent::Other(_) => None,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Intent::None => "NIFTI_INTENT_NONE",
            Intent::Label => "NIFTI_INTENT_LABEL",
            Intent::Vector => "NIFTI_INTENT_VECTOR",
            Intent::PointSet => "NIFTI_INTENT_POINTSET",
            Intent::Triangle => "NIFTI_INTENT_TRIANGLE",
            Intent::TimeSeries => "NIFTI_INTENT_TIME_SERIES",
            Intent::NodeIndex => "NIFTI_INTENT_NODE_INDEX",
            Intent::Shape => "NIFTI_INTENT_SHAPE",
            Intent::Other(name) => name,
        }
    }

    pub fn from_name(name: &str) -> Self {
        match name.trim() {
            "NIFTI_INTENT_NONE" => Intent::None,
            "NIFTI_INTENT_LABEL" => Intent::Label,
            "NIFTI_INTENT_VECTOR" => Intent::Vector,
            "NIFTI_INTENT_POINTSET" => Intent::PointSet,
            "NIFTI_INTENT_TRIANGLE" => Intent::Triangle,
            "NIFTI_INTENT_TIME_SERIES" => Intent::TimeSeries,
            "NIFTI_INTENT_NODE_INDEX" => Intent::NodeIndex,
            "NIFTI_INTENT_SHAPE" => Intent::Shape,
            other => Intent::Other(other.to_string()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataType {
    UInt8,
    Int32,
    Float32,
    Float64,
}

impl DataType {
    pub fn code(self) -> i32 {
        match self {
            DataType::UInt8 => 2,
            DataType::Int32 => 8,
            DataType::Float32 => 16,
            DataType::Float64 => 64,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            DataType::UInt8 => "NIFTI_TYPE_UINT8",
            DataType::Int32 => "NIFTI_TYPE_INT32",
            DataType::Float32 => "NIFTI_TYPE_FLOAT32",
            DataType::Float64 => "NIFTI_TYPE_FLOAT64",
        }
    }

    pub fn from_name(name: &str) -> GiftiResult<Self> {
        match name.trim() {
            "NIFTI_TYPE_UINT8" => Ok(DataType::UInt8),
            "NIFTI_TYPE_INT32" => Ok(DataType::Int32),
            "NIFTI_TYPE_FLOAT32" => Ok(DataType::Float32),
            "NIFTI_TYPE_FLOAT64" => Ok(DataType::Float64),
            other => Err(GiftiError::Unsupported {
                what: "data type",
                value: other.to_string(),
            }),
        }
    }

    pub fn byte_size(self) -> usize {
        match self {
            DataType::UInt8 => 1,
            DataType::Int32 | DataType::Float32 => 4,
            DataType::Float64 => 8,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoding {
    Ascii,
    Base64Binary,
    GZipBase64Binary,
    ExternalFileBinary,
}

impl Encoding {
    pub fn name(self) -> &'static str {
        match self {
            Encoding::Ascii => "ASCII",
            Encoding::Base64Binary => "Base64Binary",
            Encoding::GZipBase64Binary => "GZipBase64Binary",
            Encoding::ExternalFileBinary => "ExternalFileBinary",
        }
    }

    pub fn from_name(name: &str) -> GiftiResult<Self> {
        match name.trim() {
            "ASCII" => Ok(Encoding::Ascii),
            "Base64Binary" => Ok(Encoding::Base64Binary),
            "GZipBase64Binary" => Ok(Encoding::GZipBase64Binary),
            "ExternalFileBinary" => Ok(Encoding::ExternalFileBinary),
            other => Err(GiftiError::Unsupported {
                what: "encoding",
                value: other.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endian {
    Little,
    Big,
}

impl Endian {
    pub fn name(self) -> &'static str {
        match self {
            Endian::Little => "LittleEndian",
            Endian::Big => "BigEndian",
        }
    }

    pub fn from_name(name: &str) -> GiftiResult<Self> {
        match name.trim() {
            "LittleEndian" => Ok(Endian::Little),
            "BigEndian" => Ok(Endian::Big),
            other => Err(GiftiError::Unsupported {
                what: "endianness",
                value: other.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArrayOrder {
    RowMajor,
    ColumnMajor,
}

impl ArrayOrder {
    pub fn name(self) -> &'static str {
        match self {
            ArrayOrder::RowMajor => "RowMajorOrder",
            ArrayOrder::ColumnMajor => "ColumnMajorOrder",
        }
    }

    pub fn from_name(name: &str) -> GiftiResult<Self> {
        match name.trim() {
            "RowMajorOrder" => Ok(ArrayOrder::RowMajor),
            "ColumnMajorOrder" => Ok(ArrayOrder::ColumnMajor),
            other => Err(GiftiError::Unsupported {
                what: "array indexing order",
                value: other.to_string(),
            }),
        }
    }
}

/// Typed payload of a data array, flattened in the array's indexing order.
#[derive(Debug, Clone, PartialEq)]
pub enum ArrayData {
    UInt8(Vec<u8>),
    Int32(Vec<i32>),
    Float32(Vec<f32>),
    Float64(Vec<f64>),
}

impl ArrayData {
    pub fn datatype(&self) -> DataType {
        match self {
            ArrayData::UInt8(_) => DataType::UInt8,
            ArrayData::Int32(_) => DataType::Int32,
            ArrayData::Float32(_) => DataType::Float32,
            ArrayData::Float64(_) => DataType::Float64,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            ArrayData::UInt8(v) => v.len(),
            ArrayData::Int32(v) => v.len(),
            ArrayData::Float32(v) => v.len(),
            ArrayData::Float64(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn to_f32_vec(&self) -> Vec<f32> {
        match self {
            ArrayData::UInt8(v) => v.iter().map(|&x| x as f32).collect(),
            ArrayData::Int32(v) => v.iter().map(|&x| x as f32).collect(),
            ArrayData::Float32(v) => v.clone(),
            ArrayData::Float64(v) => v.iter().map(|&x| x as f32).collect(),
        }
    }

    /// Coerces the payload to float32 in place.
    pub fn make_f32(&mut self) {
        if !matches!(self, ArrayData::Float32(_)) {
            *self = ArrayData::Float32(self.to_f32_vec());
        }
    }

    pub fn as_f32(&self) -> Option<&[f32]> {
        match self {
            ArrayData::Float32(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_i32(&self) -> Option<&[i32]> {
        match self {
            ArrayData::Int32(v) => Some(v),
            _ => None,
        }
    }

    /// Little-endian byte image of the payload.
    pub fn to_le_bytes(&self) -> Vec<u8> {
        match self {
            ArrayData::UInt8(v) => v.clone(),
            ArrayData::Int32(v) => v.iter().flat_map(|x| x.to_le_bytes()).collect(),
            ArrayData::Float32(v) => v.iter().flat_map(|x| x.to_le_bytes()).collect(),
            ArrayData::Float64(v) => v.iter().flat_map(|x| x.to_le_bytes()).collect(),
        }
    }
}

/// Ordered name/value pairs from a `MetaData` element.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetaData {
    pub entries: Vec<(String, String)>,
}

impl MetaData {
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(n, _)| *n == name) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((name, value)),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Label {
    pub key: i32,
    pub rgba: Option<[f32; 4]>,
    pub name: String,
}

/// One data array of a GIFTI file: a scalar field (or pointset/triangle list)
/// over mesh vertices, plus the tags the on-disk format requires.
#[derive(Debug, Clone, PartialEq)]
pub struct SurfaceDataArray {
    pub data: ArrayData,
    pub intent: Intent,
    pub dims: Vec<usize>,
    pub encoding: Encoding,
    pub endian: Endian,
    pub ordering: ArrayOrder,
    pub coordsys: Option<CoordSys>,
    pub meta: MetaData,
}

impl SurfaceDataArray {
    /// A one-dimensional float32 array with no coordsys, ready for
    /// normalization against a mesh.
    pub fn from_f32(values: Vec<f32>) -> Self {
        let dims = vec![values.len()];
        Self {
            data: ArrayData::Float32(values),
            intent: Intent::None,
            dims,
            encoding: Encoding::GZipBase64Binary,
            endian: Endian::Little,
            ordering: ArrayOrder::RowMajor,
            coordsys: None,
            meta: MetaData::default(),
        }
    }

    pub fn with_intent(mut self, intent: Intent) -> Self {
        self.intent = intent;
        self
    }

    pub fn with_coordsys(mut self, coordsys: CoordSys) -> Self {
        self.coordsys = Some(coordsys);
        self
    }

    pub fn with_dims(mut self, dims: Vec<usize>) -> Self {
        self.dims = dims;
        self
    }

    pub fn datatype(&self) -> DataType {
        self.data.datatype()
    }

    /// Number of rows (vertices for per-vertex data).
    pub fn n_rows(&self) -> usize {
        self.dims.first().copied().unwrap_or(0)
    }
}

/// In-memory GIFTI container.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GiftiImage {
    pub meta: MetaData,
    pub labels: Vec<Label>,
    pub darrays: Vec<SurfaceDataArray>,
}

impl GiftiImage {
    pub fn from_darrays(darrays: Vec<SurfaceDataArray>) -> Self {
        Self {
            darrays,
            ..Self::default()
        }
    }

    pub fn load<P: AsRef<Path>>(path: P) -> GiftiResult<Self> {
        load_gifti(path)
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> GiftiResult<()> {
        save_gifti(self, path)
    }
}

/// Loads every listed file and concatenates their darrays in order.
pub fn read_darrays(paths: &[PathBuf]) -> GiftiResult<Vec<SurfaceDataArray>> {
    let mut darrays = Vec::new();
    for path in paths {
        darrays.extend(load_gifti(path)?.darrays);
    }
    Ok(darrays)
}
