use nalgebra::Matrix4;
use std::fmt;

use crate::io::{GiftiError, GiftiResult};

/// NIfTI transform space codes, as used by GIFTI `DataSpace` and
/// `TransformedSpace` elements.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum XformSpace {
    Unknown,
    ScannerAnat,
    AlignedAnat,
    Talairach,
    Mni152,
    TemplateOther,
    /// Any other space name, preserved verbatim so it still compares exactly.
    Other(String),
}

impl XformSpace {
    pub fn code(&self) -> Option<i32> {
        match self {
            XformSpace::Unknown => Some(0),
            XformSpace::ScannerAnat => Some(1),
            XformSpace::AlignedAnat => Some(2),
            XformSpace::Talairach => Some(3),
            XformSpace::Mni152 => Some(4),
            XformSpace::TemplateOther => Some(5),
            XformSpace::Other(_) => None,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            XformSpace::Unknown => "NIFTI_XFORM_UNKNOWN",
            XformSpace::ScannerAnat => "NIFTI_XFORM_SCANNER_ANAT",
            XformSpace::AlignedAnat => "NIFTI_XFORM_ALIGNED_ANAT",
            XformSpace::Talairach => "NIFTI_XFORM_TALAIRACH",
            XformSpace::Mni152 => "NIFTI_XFORM_MNI_152",
            XformSpace::TemplateOther => "NIFTI_XFORM_TEMPLATE_OTHER",
            XformSpace::Other(name) => name,
        }
    }

    /// Accepts either the symbolic name or the integer code, since both
    /// appear in files written by different tools.
    pub fn parse(value: &str) -> GiftiResult<Self> {
        let value = value.trim();
        let space = match value {
            "" => return Err(GiftiError::invalid_content("empty transform space")),
            "NIFTI_XFORM_UNKNOWN" | "0" => XformSpace::Unknown,
            "NIFTI_XFORM_SCANNER_ANAT" | "1" => XformSpace::ScannerAnat,
            "NIFTI_XFORM_ALIGNED_ANAT" | "2" => XformSpace::AlignedAnat,
            "NIFTI_XFORM_TALAIRACH" | "3" => XformSpace::Talairach,
            "NIFTI_XFORM_MNI_152" | "4" => XformSpace::Mni152,
            "NIFTI_XFORM_TEMPLATE_OTHER" | "5" => XformSpace::TemplateOther,
            other => XformSpace::Other(other.to_string()),
        };
        Ok(space)
    }
}

impl fmt::Display for XformSpace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Coordinate-system descriptor attached to a data array.
///
/// Two descriptors are the same space only if `dataspace`, `xformspace` and
/// every entry of `xform` are exactly equal. No tolerance is applied.
#[derive(Debug, Clone, PartialEq)]
pub struct CoordSys {
    pub dataspace: XformSpace,
    pub xformspace: XformSpace,
    pub xform: Matrix4<f64>,
}

impl Default for CoordSys {
    fn default() -> Self {
        Self {
            dataspace: XformSpace::Unknown,
            xformspace: XformSpace::Unknown,
            xform: Matrix4::identity(),
        }
    }
}

impl CoordSys {
    pub fn new(dataspace: XformSpace, xformspace: XformSpace, xform: Matrix4<f64>) -> Self {
        Self {
            dataspace,
            xformspace,
            xform,
        }
    }

    pub fn is_same(&self, other: &CoordSys) -> bool {
        self.dataspace == other.dataspace
            && self.xformspace == other.xformspace
            && self.xform == other.xform
    }

    /// Parses the 16 whitespace-separated values of a `MatrixData` element
    /// (row-major).
    pub fn parse_matrix(text: &str) -> GiftiResult<Matrix4<f64>> {
        let values = text
            .split_whitespace()
            .map(|v| {
                v.parse::<f64>()
                    .map_err(|e| GiftiError::invalid_content(format!("bad MatrixData value '{v}': {e}")))
            })
            .collect::<GiftiResult<Vec<f64>>>()?;
        if values.len() != 16 {
            return Err(GiftiError::invalid_content(format!(
                "MatrixData holds {} values, expected 16",
                values.len()
            )));
        }
        Ok(Matrix4::from_row_slice(&values))
    }

    /// Row-major text form of the transform; `{}` keeps f64 values
    /// round-trippable so equality survives a write/read cycle.
    pub fn matrix_text(&self) -> String {
        (0..4)
            .map(|r| {
                (0..4)
                    .map(|c| format!("{}", self.xform[(r, c)]))
                    .collect::<Vec<_>>()
                    .join(" ")
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

impl fmt::Display for CoordSys {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} -> {} [{}]",
            self.dataspace,
            self.xformspace,
            self.matrix_text().replace('\n', "; ")
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_accepts_names_and_codes() {
        assert_eq!(XformSpace::parse("NIFTI_XFORM_TALAIRACH").unwrap(), XformSpace::Talairach);
        assert_eq!(XformSpace::parse(" 4 ").unwrap(), XformSpace::Mni152);
        assert_eq!(
            XformSpace::parse("NIFTI_XFORM_TEMPLATE_OTHER").unwrap(),
            XformSpace::TemplateOther
        );
        assert_eq!(XformSpace::parse("5").unwrap().code(), Some(5));
        assert!(XformSpace::parse("  ").is_err());
    }

    #[test]
    fn unknown_space_names_are_kept_verbatim() {
        let custom = XformSpace::parse("NIFTI_XFORM_VENDOR_SPACE").unwrap();
        assert_eq!(custom, XformSpace::Other("NIFTI_XFORM_VENDOR_SPACE".to_string()));
        assert_eq!(custom.name(), "NIFTI_XFORM_VENDOR_SPACE");
        assert_eq!(custom.code(), None);
        assert_ne!(custom, XformSpace::Other("NIFTI_XFORM_OTHER_VENDOR".to_string()));
    }

    #[test]
    fn matrix_text_round_trips_exactly() {
        let mut xform = Matrix4::identity();
        xform[(0, 3)] = 0.1 + 0.2;
        xform[(2, 1)] = -1.0 / 3.0;
        let coordsys = CoordSys::new(XformSpace::Talairach, XformSpace::Talairach, xform);

        let parsed = CoordSys::parse_matrix(&coordsys.matrix_text()).unwrap();
        assert_eq!(parsed, coordsys.xform);
    }

    #[test]
    fn is_same_is_exact() {
        let a = CoordSys::default();
        let mut b = CoordSys::default();
        assert!(a.is_same(&b));

        b.xform[(1, 1)] = 1.0 + f64::EPSILON;
        assert!(!a.is_same(&b));

        let c = CoordSys {
            xformspace: XformSpace::ScannerAnat,
            ..CoordSys::default()
        };
        assert!(!a.is_same(&c));
    }

    #[test]
    fn parse_matrix_rejects_wrong_count() {
        assert!(CoordSys::parse_matrix("1 0 0 0 1").is_err());
    }
}
