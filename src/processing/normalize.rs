use crate::error::{MsmError, Result};
use crate::io::coordsys::CoordSys;
use crate::io::{Intent, SurfaceDataArray};

/// Brings darrays into the shape msm expects: float32 payload, pointset
/// intent, and `coordsys` as coordinate system.
///
/// A darray that already carries a different coordsys is a hard error; it is
/// never reconciled. Arrays without a coordsys inherit the target.
pub fn prepare_darrays(darrays: &mut [SurfaceDataArray], coordsys: &CoordSys) -> Result<()> {
    for (index, darray) in darrays.iter_mut().enumerate() {
        darray.data.make_f32();
        darray.intent = Intent::PointSet;
        if let Some(found) = &darray.coordsys {
            if !found.is_same(coordsys) {
                return Err(MsmError::CoordinateSystemMismatch {
                    index,
                    expected: coordsys.clone(),
                    found: found.clone(),
                });
            }
        }
        darray.coordsys = Some(coordsys.clone());
    }
    Ok(())
}

/// msm rejects single-feature inputs, so a lone contrast map is sent as two
/// identical darrays. The duplicate is appended, the original is not reshaped.
///
/// Returns whether a duplicate was added.
pub fn duplicate_single_feature(darrays: &mut Vec<SurfaceDataArray>) -> bool {
    if darrays.len() != 1 {
        return false;
    }
    let duplicate = darrays.clone();
    darrays.extend(duplicate);
    true
}

/// Checks every darray holds one value per mesh vertex.
pub fn check_vertex_counts(darrays: &[SurfaceDataArray], n_vertices: usize) -> Result<()> {
    for (index, darray) in darrays.iter().enumerate() {
        if darray.data.len() != n_vertices {
            return Err(MsmError::VertexCountMismatch {
                index,
                expected: n_vertices,
                got: darray.data.len(),
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::coordsys::XformSpace;
    use crate::io::ArrayData;
    use crate::utils::test_utils::{coordsys_c, coordsys_c_prime};

    fn f64_array(values: Vec<f64>) -> SurfaceDataArray {
        let mut darray = SurfaceDataArray::from_f32(Vec::new()).with_dims(vec![values.len()]);
        darray.data = ArrayData::Float64(values);
        darray
    }

    #[test]
    fn unset_coordsys_inherits_target_and_is_idempotent() {
        let target = coordsys_c();
        let mut darrays = vec![f64_array(vec![1.0, 2.0, 3.0]), SurfaceDataArray::from_f32(vec![4.0; 3])];

        prepare_darrays(&mut darrays, &target).unwrap();
        let once = darrays.clone();
        prepare_darrays(&mut darrays, &target).unwrap();

        assert_eq!(darrays, once);
        for darray in &darrays {
            assert_eq!(darray.coordsys.as_ref(), Some(&target));
            assert_eq!(darray.intent, Intent::PointSet);
            assert_eq!(darray.datatype().code(), 16);
        }
        assert_eq!(darrays[0].data.as_f32(), Some(&[1.0f32, 2.0, 3.0][..]));
    }

    #[test]
    fn differing_coordsys_fails_on_each_component() {
        let target = coordsys_c();

        let mut other_dataspace = target.clone();
        other_dataspace.dataspace = XformSpace::Mni152;
        let mut other_xformspace = target.clone();
        other_xformspace.xformspace = XformSpace::Unknown;
        let other_matrix = coordsys_c_prime();

        for found in [other_dataspace, other_xformspace, other_matrix] {
            let mut darrays = vec![
                SurfaceDataArray::from_f32(vec![0.0; 4]),
                SurfaceDataArray::from_f32(vec![0.0; 4]).with_coordsys(found.clone()),
            ];
            let err = prepare_darrays(&mut darrays, &target).unwrap_err();
            match err {
                MsmError::CoordinateSystemMismatch { index, expected, found: got } => {
                    assert_eq!(index, 1);
                    assert_eq!(expected, target);
                    assert_eq!(got, found);
                }
                other => panic!("unexpected error {other:?}"),
            }
        }
    }

    #[test]
    fn equal_coordsys_is_accepted() {
        let target = coordsys_c();
        let mut darrays = vec![SurfaceDataArray::from_f32(vec![1.0]).with_coordsys(coordsys_c())];
        prepare_darrays(&mut darrays, &target).unwrap();
    }

    #[test]
    fn single_feature_is_duplicated_verbatim() {
        let mut darrays = vec![SurfaceDataArray::from_f32(vec![0.5, 1.5])];
        assert!(duplicate_single_feature(&mut darrays));
        assert_eq!(darrays.len(), 2);
        assert_eq!(darrays[0], darrays[1]);

        let mut pair = vec![
            SurfaceDataArray::from_f32(vec![1.0]),
            SurfaceDataArray::from_f32(vec![2.0]),
        ];
        assert!(!duplicate_single_feature(&mut pair));
        assert_eq!(pair.len(), 2);
    }

    #[test]
    fn vertex_count_is_checked() {
        let darrays = vec![SurfaceDataArray::from_f32(vec![0.0; 5])];
        assert!(check_vertex_counts(&darrays, 5).is_ok());
        assert!(matches!(
            check_vertex_counts(&darrays, 6),
            Err(MsmError::VertexCountMismatch { index: 0, expected: 6, got: 5 })
        ));
    }
}
