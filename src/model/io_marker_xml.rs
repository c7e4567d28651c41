//! Cell Counter marker XML reader and writer.
//!
//! The layout follows the marker files written by the ImageJ Cell Counter:
//!
//! ```text
//! <CellCounter_Marker_File>
//!   <Image_Properties>
//!     <Image_Filename>sample.tif</Image_Filename>
//!   </Image_Properties>
//!   <Marker_Data>
//!     <Current_Type>0</Current_Type>
//!     <Marker_Type>
//!       <Type>1</Type>
//!       <Name>Type 1</Name>
//!       <Marker><MarkerX>10</MarkerX><MarkerY>12</MarkerY><MarkerZ>1</MarkerZ></Marker>
//!     </Marker_Type>
//!   </Marker_Data>
//!   <Subregion_Data>
//!     <Subregion><Vertex><VertexX>0</VertexX><VertexY>0</VertexY></Vertex>...</Subregion>
//!   </Subregion_Data>
//! </CellCounter_Marker_File>
//! ```
//!
//! `<Name>`, `<Calibration>` and `<Subregion_Data>` are optional so that
//! files from older writers still load. Unknown elements are ignored.
//! `Current_Type` is 0-based; `-1` means no type is selected.

use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

use roxmltree::{Document, Node};

use super::marker::{default_type_name, MarkerStore, DEFAULT_MAX_TYPES};
use super::{AnnotationSet, Calibration, MarkerFile, Point, Polygon, TypeIndex};
use crate::error::CellCountError;

const ROOT_TAG: &str = "CellCounter_Marker_File";
const MARKER_XML_EXTENSION: &str = "xml";
const NO_CURRENT_TYPE: i64 = -1;

/// Read a marker XML file.
pub fn read_marker_xml(path: &Path) -> Result<MarkerFile, CellCountError> {
    let xml = fs::read_to_string(path).map_err(CellCountError::Io)?;
    parse_marker_xml_str(&xml, path)
}

/// Write a marker file as XML.
///
/// Parent directories are created as needed.
pub fn write_marker_xml(path: &Path, file: &MarkerFile) -> Result<(), CellCountError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(CellCountError::Io)?;
    }
    fs::write(path, to_marker_xml_string(file)).map_err(CellCountError::Io)
}

/// Parse marker XML from a string.
pub fn from_marker_xml_str(xml: &str) -> Result<MarkerFile, CellCountError> {
    parse_marker_xml_str(xml, Path::new("<string>"))
}

/// Parse marker XML from bytes (must be valid UTF-8).
pub fn from_marker_xml_slice(bytes: &[u8]) -> Result<MarkerFile, CellCountError> {
    let xml = std::str::from_utf8(bytes).map_err(|source| CellCountError::MarkerXmlParse {
        path: PathBuf::from("<bytes>"),
        message: format!("input is not valid UTF-8: {source}"),
    })?;
    parse_marker_xml_str(xml, Path::new("<bytes>"))
}

/// Serialize a marker file to an XML string.
///
/// Types are written in declaration order and markers in insertion order.
pub fn to_marker_xml_string(file: &MarkerFile) -> String {
    let set = &file.annotations;
    let mut xml = String::new();

    writeln!(xml, "<?xml version=\"1.0\" encoding=\"UTF-8\"?>").expect("write to string");
    writeln!(xml, "<{ROOT_TAG}>").expect("write to string");
    writeln!(xml, " <Image_Properties>").expect("write to string");
    writeln!(
        xml,
        "  <Image_Filename>{}</Image_Filename>",
        xml_escape(&file.source_identity)
    )
    .expect("write to string");
    if let Some(cal) = &file.calibration {
        writeln!(xml, "  <Calibration>").expect("write to string");
        writeln!(xml, "   <PixelWidth>{}</PixelWidth>", cal.pixel_width).expect("write to string");
        writeln!(xml, "   <PixelHeight>{}</PixelHeight>", cal.pixel_height)
            .expect("write to string");
        writeln!(xml, "   <PixelDepth>{}</PixelDepth>", cal.pixel_depth).expect("write to string");
        writeln!(xml, "   <Unit>{}</Unit>", xml_escape(&cal.unit)).expect("write to string");
        writeln!(xml, "  </Calibration>").expect("write to string");
    }
    writeln!(xml, " </Image_Properties>").expect("write to string");

    writeln!(xml, " <Marker_Data>").expect("write to string");
    let current = set
        .current_type()
        .map_or(NO_CURRENT_TYPE, |index| index.as_usize() as i64);
    writeln!(xml, "  <Current_Type>{current}</Current_Type>").expect("write to string");

    for counter_type in set.markers().types() {
        writeln!(xml, "  <Marker_Type>").expect("write to string");
        writeln!(xml, "   <Type>{}</Type>", counter_type.index().number()).expect("write to string");
        writeln!(xml, "   <Name>{}</Name>", xml_escape(counter_type.name()))
            .expect("write to string");
        for marker in counter_type.markers() {
            writeln!(xml, "   <Marker>").expect("write to string");
            writeln!(xml, "    <MarkerX>{}</MarkerX>", marker.x).expect("write to string");
            writeln!(xml, "    <MarkerY>{}</MarkerY>", marker.y).expect("write to string");
            writeln!(xml, "    <MarkerZ>{}</MarkerZ>", marker.z).expect("write to string");
            writeln!(xml, "   </Marker>").expect("write to string");
        }
        writeln!(xml, "  </Marker_Type>").expect("write to string");
    }
    writeln!(xml, " </Marker_Data>").expect("write to string");

    if !set.subregions().is_empty() {
        writeln!(xml, " <Subregion_Data>").expect("write to string");
        for region in set.subregions().active_subregions() {
            writeln!(xml, "  <Subregion>").expect("write to string");
            for vertex in &region.vertices {
                writeln!(
                    xml,
                    "   <Vertex><VertexX>{}</VertexX><VertexY>{}</VertexY></Vertex>",
                    vertex.x, vertex.y
                )
                .expect("write to string");
            }
            writeln!(xml, "  </Subregion>").expect("write to string");
        }
        writeln!(xml, " </Subregion_Data>").expect("write to string");
    }

    writeln!(xml, "</{ROOT_TAG}>").expect("write to string");
    xml
}

/// File name the Cell Counter proposes when saving markers for `image_title`:
/// `CellCounter_<stem>.xml`.
pub fn default_marker_file_name(image_title: &str) -> String {
    let stem = Path::new(image_title)
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| image_title.to_string());
    format!("CellCounter_{stem}.{MARKER_XML_EXTENSION}")
}

/// Appends `.xml` unless the path already ends with it.
pub fn with_xml_extension(path: &Path) -> PathBuf {
    if has_xml_extension(path) {
        path.to_path_buf()
    } else {
        let mut raw = path.as_os_str().to_owned();
        raw.push(".");
        raw.push(MARKER_XML_EXTENSION);
        PathBuf::from(raw)
    }
}

pub(crate) fn has_xml_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.eq_ignore_ascii_case(MARKER_XML_EXTENSION))
        .unwrap_or(false)
}

fn parse_marker_xml_str(xml: &str, path: &Path) -> Result<MarkerFile, CellCountError> {
    let document = Document::parse(xml).map_err(|source| CellCountError::MarkerXmlParse {
        path: path.to_path_buf(),
        message: source.to_string(),
    })?;

    let root = document.root_element();
    if root.tag_name().name() != ROOT_TAG {
        return Err(parse_error(path, format!("missing <{ROOT_TAG}> root element")));
    }

    let properties = required_child_element(root, "Image_Properties", path, ROOT_TAG)?;
    let source_identity = child_text_verbatim(properties, "Image_Filename")
        .ok_or_else(|| parse_error(path, "missing <Image_Filename> in <Image_Properties>"))?;
    let calibration = child_element(properties, "Calibration")
        .map(|node| parse_calibration(node, path))
        .transpose()?;

    let marker_data = required_child_element(root, "Marker_Data", path, ROOT_TAG)?;
    let current_raw = required_child_text(marker_data, "Current_Type", path, "<Marker_Data>")?;
    let current = current_raw.parse::<i64>().map_err(|_| {
        parse_error(
            path,
            format!("invalid <Current_Type> value '{current_raw}'; expected integer"),
        )
    })?;

    let type_nodes: Vec<Node<'_, '_>> = child_elements(marker_data, "Marker_Type").collect();
    if type_nodes.is_empty() {
        return Err(parse_error(path, "no <Marker_Type> in <Marker_Data>"));
    }

    let mut store = MarkerStore::new(DEFAULT_MAX_TYPES.max(type_nodes.len()));
    for (position, type_node) in type_nodes.into_iter().enumerate() {
        let number = parse_required_usize(type_node, "Type", path, "<Marker_Type>")?;
        if number != position + 1 {
            return Err(parse_error(
                path,
                format!(
                    "<Marker_Type> number {} out of order; expected {}",
                    number,
                    position + 1
                ),
            ));
        }

        let name = child_text_verbatim(type_node, "Name")
            .map(layout_trimmed)
            .filter(|name| !name.trim().is_empty())
            .unwrap_or_else(|| default_type_name(TypeIndex::new(position)));
        let index = store
            .add_type(name)
            .map_err(|err| parse_error(path, format!("type {number}: {err}")))?;

        for marker_node in child_elements(type_node, "Marker") {
            let x = parse_required_f64(marker_node, "MarkerX", path, "<Marker>")?;
            let y = parse_required_f64(marker_node, "MarkerY", path, "<Marker>")?;
            let z = parse_required_usize(marker_node, "MarkerZ", path, "<Marker>")?;
            store
                .add_marker(index, x, y, z)
                .map_err(|err| parse_error(path, format!("type {number}: {err}")))?;
        }
    }

    let mut annotations = AnnotationSet::from_store(store);
    match current {
        NO_CURRENT_TYPE => {}
        value if value >= 0 && (value as usize) < annotations.markers().type_count() => {
            annotations.select_type(TypeIndex::new(value as usize))?;
        }
        value => {
            return Err(parse_error(
                path,
                format!(
                    "<Current_Type> {} out of range for {} type(s)",
                    value,
                    annotations.markers().type_count()
                ),
            ));
        }
    }

    if let Some(subregion_data) = child_element(root, "Subregion_Data") {
        for (position, region_node) in child_elements(subregion_data, "Subregion").enumerate() {
            let mut vertices = Vec::new();
            for vertex in child_elements(region_node, "Vertex") {
                let x = parse_required_f64(vertex, "VertexX", path, "<Vertex>")?;
                let y = parse_required_f64(vertex, "VertexY", path, "<Vertex>")?;
                vertices.push(Point::new(x, y));
            }
            annotations
                .add_subregion(Polygon::new(vertices))
                .map_err(|err| parse_error(path, format!("subregion {}: {err}", position + 1)))?;
        }
    }

    Ok(MarkerFile {
        source_identity,
        calibration,
        annotations,
    })
}

/// Fuzz-only entrypoint: whatever parses must come back unchanged from a
/// write/read cycle.
#[cfg(feature = "fuzzing")]
pub fn fuzz_roundtrip(bytes: &[u8]) -> Result<(), CellCountError> {
    let file = from_marker_xml_slice(bytes)?;
    let restored = from_marker_xml_str(&to_marker_xml_string(&file))?;
    if restored != file {
        return Err(CellCountError::InvalidState(format!(
            "marker file changed across a write/read cycle: {file:?} became {restored:?}"
        )));
    }
    Ok(())
}

fn parse_calibration(node: Node<'_, '_>, path: &Path) -> Result<Calibration, CellCountError> {
    let defaults = Calibration::default();
    let field = |tag: &str, default: f64| -> Result<f64, CellCountError> {
        let value = match optional_child_text(node, tag) {
            Some(_) => parse_required_f64(node, tag, path, "<Calibration>")?,
            None => default,
        };
        if !value.is_finite() {
            return Err(parse_error(path, format!("<{tag}> must be finite, got {value}")));
        }
        Ok(value)
    };
    Ok(Calibration {
        pixel_width: field("PixelWidth", defaults.pixel_width)?,
        pixel_height: field("PixelHeight", defaults.pixel_height)?,
        pixel_depth: field("PixelDepth", defaults.pixel_depth)?,
        unit: child_text_verbatim(node, "Unit").unwrap_or(defaults.unit),
    })
}

fn parse_error(path: &Path, message: impl Into<String>) -> CellCountError {
    CellCountError::MarkerXmlParse {
        path: path.to_path_buf(),
        message: message.into(),
    }
}

fn required_child_element<'a, 'input>(
    node: Node<'a, 'input>,
    tag: &str,
    path: &Path,
    context: &str,
) -> Result<Node<'a, 'input>, CellCountError> {
    child_element(node, tag).ok_or_else(|| parse_error(path, format!("missing <{tag}> in {context}")))
}

fn required_child_text(
    node: Node<'_, '_>,
    tag: &str,
    path: &Path,
    context: &str,
) -> Result<String, CellCountError> {
    optional_child_text(node, tag)
        .ok_or_else(|| parse_error(path, format!("missing <{tag}> in {context}")))
}

fn parse_required_usize(
    node: Node<'_, '_>,
    tag: &str,
    path: &Path,
    context: &str,
) -> Result<usize, CellCountError> {
    let raw = required_child_text(node, tag, path, context)?;
    raw.parse::<usize>().map_err(|_| {
        parse_error(
            path,
            format!("invalid <{tag}> value '{raw}' in {context}; expected non-negative integer"),
        )
    })
}

fn parse_required_f64(
    node: Node<'_, '_>,
    tag: &str,
    path: &Path,
    context: &str,
) -> Result<f64, CellCountError> {
    let raw = required_child_text(node, tag, path, context)?;
    raw.parse::<f64>().map_err(|_| {
        parse_error(
            path,
            format!("invalid <{tag}> value '{raw}' in {context}; expected floating-point number"),
        )
    })
}

fn child_element<'a, 'input>(node: Node<'a, 'input>, tag: &str) -> Option<Node<'a, 'input>> {
    node.children()
        .find(|child| child.is_element() && child.tag_name().name() == tag)
}

fn child_elements<'a, 'input: 'a>(
    node: Node<'a, 'input>,
    tag: &'a str,
) -> impl Iterator<Item = Node<'a, 'input>> + 'a {
    node.children()
        .filter(move |child| child.is_element() && child.tag_name().name() == tag)
}

fn optional_child_text(node: Node<'_, '_>, tag: &str) -> Option<String> {
    child_element(node, tag)
        .and_then(|child| child.text())
        .map(str::trim)
        .filter(|text| !text.is_empty())
        .map(ToOwned::to_owned)
}

/// Element text exactly as written; an empty element yields `""`.
fn child_text_verbatim(node: Node<'_, '_>, tag: &str) -> Option<String> {
    child_element(node, tag).map(|child| child.text().unwrap_or_default().to_owned())
}

/// Stored type names never hold control characters, so a line break or tab
/// in `<Name>` is hand-written indentation and gets trimmed with its spaces.
fn layout_trimmed(raw: String) -> String {
    if raw.contains(char::is_control) {
        raw.trim().to_owned()
    } else {
        raw
    }
}

fn xml_escape(raw: &str) -> String {
    raw.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
        .replace('\t', "&#9;")
        .replace('\n', "&#10;")
        .replace('\r', "&#13;")
}

#[cfg(test)]
mod tests {
    use super::*;

    const PLUGIN_FILE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<CellCounter_Marker_File>
 <Image_Properties>
  <Image_Filename>sample.tif</Image_Filename>
 </Image_Properties>
 <Marker_Data>
  <Current_Type>1</Current_Type>
  <Marker_Type>
   <Type>1</Type>
   <Marker>
    <MarkerX>10</MarkerX>
    <MarkerY>20</MarkerY>
    <MarkerZ>1</MarkerZ>
   </Marker>
   <Marker>
    <MarkerX>11</MarkerX>
    <MarkerY>21</MarkerY>
    <MarkerZ>3</MarkerZ>
   </Marker>
  </Marker_Type>
  <Marker_Type>
   <Type>2</Type>
  </Marker_Type>
 </Marker_Data>
</CellCounter_Marker_File>"#;

    #[test]
    fn parses_files_without_names_or_subregions() {
        let file = from_marker_xml_str(PLUGIN_FILE).expect("parse plugin file");
        assert_eq!(file.source_identity, "sample.tif");
        assert_eq!(file.calibration, None);

        let set = &file.annotations;
        assert_eq!(set.current_type(), Some(TypeIndex(1)));
        assert_eq!(set.type_names(), ["Type 1", "Type 2"]);
        let markers = set.markers().types()[0].markers();
        assert_eq!(markers.len(), 2);
        assert_eq!((markers[1].x, markers[1].y, markers[1].z), (11.0, 21.0, 3));
        assert!(set.subregions().is_empty());
    }

    #[test]
    fn ignores_unknown_elements() {
        let xml = PLUGIN_FILE.replace(
            "<Type>2</Type>",
            "<Type>2</Type><Colour>red</Colour><Extra><Nested/></Extra>",
        );
        let file = from_marker_xml_str(&xml).expect("parse with extras");
        assert_eq!(file.annotations.markers().type_count(), 2);
    }

    #[test]
    fn missing_required_fields_are_format_errors() {
        let cases = [
            (PLUGIN_FILE.replace("<MarkerZ>3</MarkerZ>", ""), "missing <MarkerZ>"),
            (
                PLUGIN_FILE.replace("<Current_Type>1</Current_Type>", ""),
                "missing <Current_Type>",
            ),
            (
                PLUGIN_FILE.replace("<Image_Filename>sample.tif</Image_Filename>", ""),
                "missing <Image_Filename>",
            ),
            (PLUGIN_FILE.replace("<MarkerX>10</MarkerX>", "<MarkerX>ten</MarkerX>"), "invalid <MarkerX>"),
            (PLUGIN_FILE.replace("<Type>2</Type>", "<Type>5</Type>"), "out of order"),
            (
                PLUGIN_FILE.replace("<Current_Type>1</Current_Type>", "<Current_Type>2</Current_Type>"),
                "out of range",
            ),
            (PLUGIN_FILE.replace("<MarkerZ>1</MarkerZ>", "<MarkerZ>0</MarkerZ>"), "1-based"),
        ];

        for (xml, expected) in cases {
            let err = from_marker_xml_str(&xml).unwrap_err();
            match err {
                CellCountError::MarkerXmlParse { message, .. } => {
                    assert!(message.contains(expected), "{message} !~ {expected}")
                }
                other => panic!("unexpected error: {other}"),
            }
        }
    }

    #[test]
    fn rejects_wrong_root_and_garbage() {
        assert!(from_marker_xml_str("<annotation/>").is_err());
        assert!(from_marker_xml_str("not xml at all").is_err());
        assert!(from_marker_xml_slice(&[0xff, 0xfe, 0x00]).is_err());
    }

    #[test]
    fn negative_one_means_no_selection() {
        let xml = PLUGIN_FILE.replace(
            "<Current_Type>1</Current_Type>",
            "<Current_Type>-1</Current_Type>",
        );
        let file = from_marker_xml_str(&xml).expect("parse");
        assert_eq!(file.annotations.current_type(), None);
        assert!(to_marker_xml_string(&file).contains("<Current_Type>-1</Current_Type>"));
    }

    #[test]
    fn writes_escaped_names_and_subregions() {
        let mut set = AnnotationSet::with_default_types(1, DEFAULT_MAX_TYPES).expect("set");
        set.rename_type(TypeIndex(0), "A & <B>").expect("rename");
        set.add_subregion(Polygon::from_xy(&[(0.0, 0.0), (4.5, 0.0), (0.0, 4.0)]))
            .expect("region");
        let file = MarkerFile::new("img.tif", set).with_calibration(Calibration {
            pixel_width: 0.25,
            pixel_height: 0.25,
            pixel_depth: 2.0,
            unit: "micron".into(),
        });

        let xml = to_marker_xml_string(&file);
        assert!(xml.contains("<Name>A &amp; &lt;B&gt;</Name>"));
        assert!(xml.contains("<VertexX>4.5</VertexX>"));

        let restored = from_marker_xml_str(&xml).expect("parse back");
        assert_eq!(restored, file);
    }

    #[test]
    fn names_and_titles_keep_edge_whitespace() {
        let mut set = AnnotationSet::with_default_types(2, DEFAULT_MAX_TYPES).expect("set");
        set.rename_type(TypeIndex(0), " Nuclei").expect("rename");
        set.rename_type(TypeIndex(1), "Mitotic  ").expect("rename");

        for title in ["sample.tif ", "", "two\nlines.tif"] {
            let file = MarkerFile::new(title, set.clone());
            let restored = from_marker_xml_str(&to_marker_xml_string(&file)).expect("parse back");
            assert_eq!(restored, file, "title {title:?}");
        }
    }

    #[test]
    fn indented_names_are_trimmed() {
        let xml = PLUGIN_FILE.replace(
            "<Type>1</Type>",
            "<Type>1</Type>\n   <Name>\n     Nuclei\n   </Name>",
        );
        let file = from_marker_xml_str(&xml).expect("parse");
        assert_eq!(file.annotations.type_names(), ["Nuclei", "Type 2"]);
    }

    #[test]
    fn default_file_name_uses_stem() {
        assert_eq!(default_marker_file_name("sample.tif"), "CellCounter_sample.xml");
        assert_eq!(default_marker_file_name("noext"), "CellCounter_noext.xml");
    }

    #[test]
    fn xml_extension_is_appended_once() {
        assert_eq!(with_xml_extension(Path::new("out/markers")), PathBuf::from("out/markers.xml"));
        assert_eq!(with_xml_extension(Path::new("markers.XML")), PathBuf::from("markers.XML"));
    }
}
