//! GIFTI writer.

use base64::Engine;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use quick_xml::events::{BytesCData, BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;
use std::io::Write;
use std::path::Path;

use crate::io::{
    ArrayData, Encoding, Endian, GiftiError, GiftiImage, GiftiResult, MetaData, SurfaceDataArray,
};

const DOCTYPE: &str = r#"GIFTI SYSTEM "http://www.nitrc.org/frs/download.php/115/gifti.dtd""#;

/// Save a GIFTI image to disk.
///
/// Each darray is written with its own encoding; binary payloads are always
/// little-endian regardless of the endianness recorded when it was read.
pub fn save_gifti<P: AsRef<Path>>(image: &GiftiImage, path: P) -> GiftiResult<()> {
    let xml = to_xml_string(image)?;
    std::fs::write(path, xml)?;
    Ok(())
}

/// Serialize a GIFTI image to XML.
pub fn to_xml_string(image: &GiftiImage) -> GiftiResult<String> {
    let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);

    emit(&mut writer, Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;
    emit(&mut writer, Event::DocType(BytesText::from_escaped(DOCTYPE)))?;

    let mut root = BytesStart::new("GIFTI");
    root.push_attribute(("Version", "1.0"));
    root.push_attribute(("NumberOfDataArrays", image.darrays.len().to_string().as_str()));
    emit(&mut writer, Event::Start(root))?;

    write_meta(&mut writer, &image.meta)?;
    write_labels(&mut writer, image)?;
    for darray in &image.darrays {
        write_darray(&mut writer, darray)?;
    }

    emit(&mut writer, Event::End(BytesEnd::new("GIFTI")))?;

    String::from_utf8(writer.into_inner())
        .map_err(|e| GiftiError::invalid_content(format!("generated XML is not UTF-8: {e}")))
}

fn emit<W: Write>(writer: &mut Writer<W>, event: Event<'_>) -> GiftiResult<()> {
    writer
        .write_event(event)
        .map_err(|e| GiftiError::invalid_content(format!("failed to write GIFTI XML: {e}")))
}

fn write_cdata_element<W: Write>(writer: &mut Writer<W>, name: &str, value: &str) -> GiftiResult<()> {
    emit(writer, Event::Start(BytesStart::new(name)))?;
    emit(writer, Event::CData(BytesCData::new(value)))?;
    emit(writer, Event::End(BytesEnd::new(name)))
}

fn write_meta<W: Write>(writer: &mut Writer<W>, meta: &MetaData) -> GiftiResult<()> {
    if meta.is_empty() {
        return emit(writer, Event::Empty(BytesStart::new("MetaData")));
    }
    emit(writer, Event::Start(BytesStart::new("MetaData")))?;
    for (name, value) in &meta.entries {
        emit(writer, Event::Start(BytesStart::new("MD")))?;
        write_cdata_element(writer, "Name", name)?;
        write_cdata_element(writer, "Value", value)?;
        emit(writer, Event::End(BytesEnd::new("MD")))?;
    }
    emit(writer, Event::End(BytesEnd::new("MetaData")))
}

fn write_labels<W: Write>(writer: &mut Writer<W>, image: &GiftiImage) -> GiftiResult<()> {
    if image.labels.is_empty() {
        return emit(writer, Event::Empty(BytesStart::new("LabelTable")));
    }
    emit(writer, Event::Start(BytesStart::new("LabelTable")))?;
    for label in &image.labels {
        let mut start = BytesStart::new("Label");
        start.push_attribute(("Key", label.key.to_string().as_str()));
        if let Some([r, g, b, a]) = label.rgba {
            start.push_attribute(("Red", r.to_string().as_str()));
            start.push_attribute(("Green", g.to_string().as_str()));
            start.push_attribute(("Blue", b.to_string().as_str()));
            start.push_attribute(("Alpha", a.to_string().as_str()));
        }
        emit(writer, Event::Start(start))?;
        emit(writer, Event::CData(BytesCData::new(label.name.as_str())))?;
        emit(writer, Event::End(BytesEnd::new("Label")))?;
    }
    emit(writer, Event::End(BytesEnd::new("LabelTable")))
}

fn write_darray<W: Write>(writer: &mut Writer<W>, darray: &SurfaceDataArray) -> GiftiResult<()> {
    let expected: usize = darray.dims.iter().product();
    if expected != darray.data.len() {
        return Err(GiftiError::invalid_content(format!(
            "darray dims {:?} do not match its {} values",
            darray.dims,
            darray.data.len()
        )));
    }

    let mut start = BytesStart::new("DataArray");
    start.push_attribute(("Intent", darray.intent.name()));
    start.push_attribute(("DataType", darray.datatype().name()));
    start.push_attribute(("ArrayIndexingOrder", darray.ordering.name()));
    start.push_attribute(("Dimensionality", darray.dims.len().to_string().as_str()));
    for (axis, n) in darray.dims.iter().enumerate() {
        start.push_attribute((format!("Dim{axis}").as_str(), n.to_string().as_str()));
    }
    start.push_attribute(("Encoding", darray.encoding.name()));
    start.push_attribute(("Endian", Endian::Little.name()));
    start.push_attribute(("ExternalFileName", ""));
    start.push_attribute(("ExternalFileOffset", ""));
    emit(writer, Event::Start(start))?;

    write_meta(writer, &darray.meta)?;

    if let Some(coordsys) = &darray.coordsys {
        emit(writer, Event::Start(BytesStart::new("CoordinateSystemTransformMatrix")))?;
        write_cdata_element(writer, "DataSpace", coordsys.dataspace.name())?;
        write_cdata_element(writer, "TransformedSpace", coordsys.xformspace.name())?;
        emit(writer, Event::Start(BytesStart::new("MatrixData")))?;
        emit(writer, Event::Text(BytesText::new(&coordsys.matrix_text())))?;
        emit(writer, Event::End(BytesEnd::new("MatrixData")))?;
        emit(writer, Event::End(BytesEnd::new("CoordinateSystemTransformMatrix")))?;
    }

    let payload = encode_data(&darray.data, darray.encoding)?;
    emit(writer, Event::Start(BytesStart::new("Data")))?;
    emit(writer, Event::Text(BytesText::new(&payload)))?;
    emit(writer, Event::End(BytesEnd::new("Data")))?;

    emit(writer, Event::End(BytesEnd::new("DataArray")))
}

fn encode_data(data: &ArrayData, encoding: Encoding) -> GiftiResult<String> {
    let engine = &base64::engine::general_purpose::STANDARD;
    match encoding {
        Encoding::Ascii => Ok(ascii_values(data)),
        Encoding::Base64Binary => Ok(engine.encode(data.to_le_bytes())),
        Encoding::GZipBase64Binary => {
            let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
            encoder.write_all(&data.to_le_bytes())?;
            Ok(engine.encode(encoder.finish()?))
        }
        Encoding::ExternalFileBinary => Err(GiftiError::Unsupported {
            what: "encoding",
            value: encoding.name().to_string(),
        }),
    }
}

fn ascii_values(data: &ArrayData) -> String {
    let values: Vec<String> = match data {
        ArrayData::UInt8(v) => v.iter().map(|x| x.to_string()).collect(),
        ArrayData::Int32(v) => v.iter().map(|x| x.to_string()).collect(),
        ArrayData::Float32(v) => v.iter().map(|x| x.to_string()).collect(),
        ArrayData::Float64(v) => v.iter().map(|x| x.to_string()).collect(),
    };
    values.join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::coordsys::{CoordSys, XformSpace};
    use crate::io::{load_gifti, parse_gifti, Intent, Label};
    use nalgebra::Matrix4;

    fn sample_image(encoding: Encoding) -> GiftiImage {
        let mut xform = Matrix4::identity();
        xform[(0, 3)] = -12.5;
        xform[(1, 1)] = 0.3;
        let coordsys = CoordSys::new(XformSpace::ScannerAnat, XformSpace::Talairach, xform);

        let mut darray = SurfaceDataArray::from_f32(vec![0.25, -1.0, 3.5e-7, 42.0])
            .with_intent(Intent::PointSet)
            .with_coordsys(coordsys);
        darray.encoding = encoding;
        darray.meta.insert("Name", "contrast & <effects>");

        let mut image = GiftiImage::from_darrays(vec![darray]);
        image.meta.insert("AnatomicalStructurePrimary", "CortexLeft");
        image.labels.push(Label {
            key: 1,
            rgba: Some([1.0, 0.0, 0.0, 1.0]),
            name: "V1".into(),
        });
        image
    }

    #[test]
    fn writes_and_reads_back_every_encoding() {
        for encoding in [Encoding::Ascii, Encoding::Base64Binary, Encoding::GZipBase64Binary] {
            let image = sample_image(encoding);
            let xml = to_xml_string(&image).unwrap();
            let parsed = parse_gifti(&xml).unwrap();
            assert_eq!(parsed, image, "mismatch for {}", encoding.name());
        }
    }

    #[test]
    fn save_writes_a_loadable_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("contrast.func.gii");
        let image = sample_image(Encoding::GZipBase64Binary);

        save_gifti(&image, &path).unwrap();
        let loaded = load_gifti(&path).unwrap();
        assert_eq!(loaded.darrays[0].coordsys, image.darrays[0].coordsys);
        assert_eq!(loaded.darrays[0].datatype().code(), 16);
        assert_eq!(loaded.darrays[0].intent.code(), Some(1008));
    }

    #[test]
    fn rejects_inconsistent_dims() {
        let darray = SurfaceDataArray::from_f32(vec![1.0, 2.0]).with_dims(vec![3]);
        let image = GiftiImage::from_darrays(vec![darray]);
        assert!(to_xml_string(&image).is_err());
    }
}
