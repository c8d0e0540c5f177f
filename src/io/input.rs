//! GIFTI reader.
//!
//! Parses the XML container with `quick-xml` and decodes each `Data` payload
//! (ASCII, Base64Binary or GZipBase64Binary) into a typed [`ArrayData`].

use base64::Engine;
use flate2::read::{GzDecoder, ZlibDecoder};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::io::Read;
use std::path::Path;

use crate::io::coordsys::{CoordSys, XformSpace};
use crate::io::{
    ArrayData, ArrayOrder, DataType, Encoding, Endian, GiftiError, GiftiImage, GiftiResult,
    Intent, Label, MetaData, SurfaceDataArray,
};

/// Load a GIFTI file from disk.
pub fn load_gifti<P: AsRef<Path>>(path: P) -> GiftiResult<GiftiImage> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            GiftiError::FileNotFound {
                path: path.to_path_buf(),
            }
        } else {
            GiftiError::Io(e)
        }
    })?;
    parse_gifti(&content)
}

/// Parse GIFTI XML content.
pub fn parse_gifti(content: &str) -> GiftiResult<GiftiImage> {
    let mut reader = Reader::from_str(content);
    reader.config_mut().trim_text(true);

    let mut state = ParseState::default();
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) => {
                let name = e.local_name().as_ref().to_vec();
                state.start(&name, e)?;
            }
            Ok(Event::Empty(ref e)) => {
                let name = e.local_name().as_ref().to_vec();
                state.start(&name, e)?;
                state.end(&name)?;
            }
            Ok(Event::End(ref e)) => {
                let name = e.local_name().as_ref().to_vec();
                state.end(&name)?;
            }
            Ok(Event::Text(ref e)) => {
                let raw = std::str::from_utf8(e.as_ref())
                    .map_err(|e| GiftiError::invalid_content(format!("invalid UTF-8 in text: {e}")))?;
                let text = quick_xml::escape::unescape(raw)
                    .map_err(|e| GiftiError::invalid_content(format!("bad escape in text: {e}")))?;
                state.text.push_str(&text);
            }
            Ok(Event::CData(ref e)) => {
                let text = std::str::from_utf8(e.as_ref())
                    .map_err(|e| GiftiError::invalid_content(format!("invalid UTF-8 in CDATA: {e}")))?;
                state.text.push_str(text);
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(GiftiError::invalid_content(format!(
                    "XML parse error at byte {}: {e}",
                    reader.buffer_position()
                )));
            }
            _ => {}
        }
        buf.clear();
    }

    state.finish()
}

/// Attributes of a `DataArray` start tag.
#[derive(Debug, Clone)]
struct ArrayAttrs {
    intent: Intent,
    datatype: DataType,
    ordering: ArrayOrder,
    dims: Vec<usize>,
    encoding: Encoding,
    endian: Endian,
}

#[derive(Debug)]
struct ArrayBuilder {
    attrs: ArrayAttrs,
    meta: MetaData,
    dataspace: Option<String>,
    xformspace: Option<String>,
    matrix: Option<String>,
    data: Option<String>,
}

#[derive(Debug, Default)]
struct ParseState {
    image: GiftiImage,
    seen_root: bool,
    declared_arrays: Option<usize>,
    current: Option<ArrayBuilder>,
    md_name: Option<String>,
    md_value: Option<String>,
    label: Option<(i32, Option<[f32; 4]>)>,
    text: String,
}

impl ParseState {
    fn start(&mut self, name: &[u8], e: &BytesStart<'_>) -> GiftiResult<()> {
        self.text.clear();
        match name {
            b"GIFTI" => {
                self.seen_root = true;
                for (key, value) in attributes(e)? {
                    if key == "NumberOfDataArrays" {
                        self.declared_arrays = Some(parse_number(&key, &value)?);
                    }
                }
            }
            b"DataArray" => {
                if self.current.is_some() {
                    return Err(GiftiError::invalid_content("nested DataArray elements"));
                }
                self.current = Some(ArrayBuilder {
                    attrs: parse_array_attrs(e)?,
                    meta: MetaData::default(),
                    dataspace: None,
                    xformspace: None,
                    matrix: None,
                    data: None,
                });
            }
            b"MD" => {
                self.md_name = None;
                self.md_value = None;
            }
            b"Label" => {
                let mut key = 0;
                let mut rgba = [0.0f32, 0.0, 0.0, 1.0];
                let mut has_color = false;
                for (attr, value) in attributes(e)? {
                    let channel = match attr.as_str() {
                        "Key" => {
                            key = parse_number(&attr, &value)?;
                            continue;
                        }
                        "Red" => 0,
                        "Green" => 1,
                        "Blue" => 2,
                        "Alpha" => 3,
                        _ => continue,
                    };
                    rgba[channel] = parse_number(&attr, &value)?;
                    has_color = true;
                }
                self.label = Some((key, has_color.then_some(rgba)));
            }
            _ => {}
        }
        Ok(())
    }

    fn end(&mut self, name: &[u8]) -> GiftiResult<()> {
        let text = std::mem::take(&mut self.text).trim().to_string();
        match name {
            b"Name" => self.md_name = Some(text),
            b"Value" => self.md_value = Some(text),
            b"MD" => {
                let name = self.md_name.take().unwrap_or_default();
                let value = self.md_value.take().unwrap_or_default();
                match self.current.as_mut() {
                    Some(builder) => builder.meta.insert(name, value),
                    None => self.image.meta.insert(name, value),
                }
            }
            b"Label" => {
                if let Some((key, rgba)) = self.label.take() {
                    self.image.labels.push(Label {
                        key,
                        rgba,
                        name: text,
                    });
                }
            }
            b"DataSpace" => self.builder("DataSpace")?.dataspace = Some(text),
            b"TransformedSpace" => self.builder("TransformedSpace")?.xformspace = Some(text),
            b"MatrixData" => self.builder("MatrixData")?.matrix = Some(text),
            b"Data" => self.builder("Data")?.data = Some(text),
            b"DataArray" => {
                let builder = self
                    .current
                    .take()
                    .ok_or_else(|| GiftiError::invalid_content("unbalanced DataArray end tag"))?;
                let darray = builder.build()?;
                self.image.darrays.push(darray);
            }
            _ => {}
        }
        Ok(())
    }

    fn builder(&mut self, element: &str) -> GiftiResult<&mut ArrayBuilder> {
        self.current
            .as_mut()
            .ok_or_else(|| GiftiError::invalid_content(format!("{element} outside of a DataArray")))
    }

    fn finish(self) -> GiftiResult<GiftiImage> {
        if !self.seen_root {
            return Err(GiftiError::invalid_content("missing GIFTI root element"));
        }
        if let Some(declared) = self.declared_arrays {
            if declared != self.image.darrays.len() {
                return Err(GiftiError::invalid_content(format!(
                    "NumberOfDataArrays is {declared} but {} DataArray elements were found",
                    self.image.darrays.len()
                )));
            }
        }
        Ok(self.image)
    }
}

impl ArrayBuilder {
    fn build(self) -> GiftiResult<SurfaceDataArray> {
        let coordsys = match (self.dataspace, self.xformspace, self.matrix) {
            (None, None, None) => None,
            (dataspace, xformspace, matrix) => Some(CoordSys {
                dataspace: dataspace
                    .as_deref()
                    .map(XformSpace::parse)
                    .transpose()?
                    .unwrap_or(XformSpace::Unknown),
                xformspace: xformspace
                    .as_deref()
                    .map(XformSpace::parse)
                    .transpose()?
                    .unwrap_or(XformSpace::Unknown),
                xform: match matrix {
                    Some(text) => CoordSys::parse_matrix(&text)?,
                    None => nalgebra::Matrix4::identity(),
                },
            }),
        };

        let data = decode_data(self.data.as_deref().unwrap_or(""), &self.attrs)?;

        Ok(SurfaceDataArray {
            data,
            intent: self.attrs.intent,
            dims: self.attrs.dims,
            encoding: self.attrs.encoding,
            endian: self.attrs.endian,
            ordering: self.attrs.ordering,
            coordsys,
            meta: self.meta,
        })
    }
}

fn attributes(e: &BytesStart<'_>) -> GiftiResult<Vec<(String, String)>> {
    let mut out = Vec::new();
    for attr in e.attributes() {
        let attr = attr
            .map_err(|err| GiftiError::invalid_content(format!("malformed attribute: {err}")))?;
        let key = std::str::from_utf8(attr.key.local_name().as_ref())
            .map_err(|err| GiftiError::invalid_content(format!("invalid UTF-8 in attribute: {err}")))?
            .to_string();
        let value = attr
            .unescape_value()
            .map_err(|err| GiftiError::invalid_content(format!("bad attribute value for {key}: {err}")))?
            .into_owned();
        out.push((key, value));
    }
    Ok(out)
}

fn parse_number<T>(key: &str, value: &str) -> GiftiResult<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e| GiftiError::invalid_content(format!("invalid {key} '{value}': {e}")))
}

fn parse_array_attrs(e: &BytesStart<'_>) -> GiftiResult<ArrayAttrs> {
    let mut intent = Intent::None;
    let mut datatype = None;
    let mut ordering = ArrayOrder::RowMajor;
    let mut dimensionality = None;
    let mut dims: Vec<(usize, usize)> = Vec::new();
    let mut encoding = Encoding::Ascii;
    let mut endian = Endian::Little;

    for (key, value) in attributes(e)? {
        match key.as_str() {
            "Intent" => intent = Intent::from_name(&value),
            "DataType" => datatype = Some(DataType::from_name(&value)?),
            "ArrayIndexingOrder" => ordering = ArrayOrder::from_name(&value)?,
            "Dimensionality" => dimensionality = Some(parse_number::<usize>(&key, &value)?),
            "Encoding" => encoding = Encoding::from_name(&value)?,
            "Endian" => endian = Endian::from_name(&value)?,
            k if k.starts_with("Dim") => {
                let axis = parse_number::<usize>(&key, &k[3..])?;
                dims.push((axis, parse_number(&key, &value)?));
            }
            _ => {}
        }
    }

    let datatype =
        datatype.ok_or_else(|| GiftiError::invalid_content("DataArray without DataType"))?;
    dims.sort_by_key(|(axis, _)| *axis);
    let dims: Vec<usize> = dims.into_iter().map(|(_, n)| n).collect();
    if let Some(expected) = dimensionality {
        if expected != dims.len() {
            return Err(GiftiError::invalid_content(format!(
                "Dimensionality is {expected} but {} Dim attributes were given",
                dims.len()
            )));
        }
    }

    Ok(ArrayAttrs {
        intent,
        datatype,
        ordering,
        dims,
        encoding,
        endian,
    })
}

fn decode_data(text: &str, attrs: &ArrayAttrs) -> GiftiResult<ArrayData> {
    let data = match attrs.encoding {
        Encoding::Ascii => parse_ascii(text, attrs.datatype)?,
        Encoding::Base64Binary => from_bytes(&decode_base64(text)?, attrs.datatype, attrs.endian)?,
        Encoding::GZipBase64Binary => {
            let bytes = inflate(&decode_base64(text)?)?;
            from_bytes(&bytes, attrs.datatype, attrs.endian)?
        }
        Encoding::ExternalFileBinary => {
            return Err(GiftiError::Unsupported {
                what: "encoding",
                value: Encoding::ExternalFileBinary.name().to_string(),
            })
        }
    };

    let expected: usize = attrs.dims.iter().product();
    if data.len() != expected {
        return Err(GiftiError::invalid_content(format!(
            "DataArray declares {expected} values ({:?}) but holds {}",
            attrs.dims,
            data.len()
        )));
    }
    Ok(data)
}

fn parse_ascii(text: &str, datatype: DataType) -> GiftiResult<ArrayData> {
    let tokens = text.split_whitespace();
    let data = match datatype {
        DataType::UInt8 => ArrayData::UInt8(
            tokens
                .map(|t| parse_number("ASCII value", t))
                .collect::<GiftiResult<_>>()?,
        ),
        DataType::Int32 => ArrayData::Int32(
            tokens
                .map(|t| parse_number("ASCII value", t))
                .collect::<GiftiResult<_>>()?,
        ),
        DataType::Float32 => ArrayData::Float32(
            tokens
                .map(|t| parse_number("ASCII value", t))
                .collect::<GiftiResult<_>>()?,
        ),
        DataType::Float64 => ArrayData::Float64(
            tokens
                .map(|t| parse_number("ASCII value", t))
                .collect::<GiftiResult<_>>()?,
        ),
    };
    Ok(data)
}

fn decode_base64(text: &str) -> GiftiResult<Vec<u8>> {
    let cleaned: String = text.split_whitespace().collect();
    base64::engine::general_purpose::STANDARD
        .decode(cleaned.as_bytes())
        .map_err(|e| GiftiError::invalid_content(format!("invalid base64 payload: {e}")))
}

/// GIFTI's "GZip" payloads are zlib streams in practice; real gzip members are
/// accepted as well.
fn inflate(compressed: &[u8]) -> GiftiResult<Vec<u8>> {
    let mut out = Vec::new();
    let is_gzip = compressed.len() >= 2 && compressed[0] == 0x1f && compressed[1] == 0x8b;
    let result = if is_gzip {
        GzDecoder::new(compressed).read_to_end(&mut out)
    } else {
        ZlibDecoder::new(compressed).read_to_end(&mut out)
    };
    result.map_err(|e| GiftiError::invalid_content(format!("failed to decompress payload: {e}")))?;
    Ok(out)
}

fn from_bytes(bytes: &[u8], datatype: DataType, endian: Endian) -> GiftiResult<ArrayData> {
    let size = datatype.byte_size();
    if bytes.len() % size != 0 {
        return Err(GiftiError::invalid_content(format!(
            "payload of {} bytes is not a multiple of {size} ({})",
            bytes.len(),
            datatype.name()
        )));
    }

    let big = endian == Endian::Big;
    let data = match datatype {
        DataType::UInt8 => ArrayData::UInt8(bytes.to_vec()),
        DataType::Int32 => ArrayData::Int32(
            bytes
                .chunks_exact(4)
                .map(|c| {
                    let b = [c[0], c[1], c[2], c[3]];
                    if big { i32::from_be_bytes(b) } else { i32::from_le_bytes(b) }
                })
                .collect(),
        ),
        DataType::Float32 => ArrayData::Float32(
            bytes
                .chunks_exact(4)
                .map(|c| {
                    let b = [c[0], c[1], c[2], c[3]];
                    if big { f32::from_be_bytes(b) } else { f32::from_le_bytes(b) }
                })
                .collect(),
        ),
        DataType::Float64 => ArrayData::Float64(
            bytes
                .chunks_exact(8)
                .map(|c| {
                    let mut b = [0u8; 8];
                    b.copy_from_slice(c);
                    if big { f64::from_be_bytes(b) } else { f64::from_le_bytes(b) }
                })
                .collect(),
        ),
    };
    Ok(data)
}
