use std::path::{Path, PathBuf};
use std::sync::Arc;

use kml_validate::{Catalog, ConformanceLevel, Document, Suite};
use tempfile::TempDir;
use url::Url;

pub const KML22: &str = "http://www.opengis.net/kml/2.2";

/// Base URI used for documents parsed from strings
pub const BASE_URI: &str = "http://example.com/data/doc.kml";

/// Wrap `body` in a kml:kml root declaring the KML and Atom namespaces
pub fn kml(body: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<kml xmlns="{}" xmlns:atom="http://www.w3.org/2005/Atom">{}</kml>"#,
        KML22, body
    )
}

/// Parse a document as if it had been served from [`BASE_URI`]
pub fn parse(text: &str) -> Document {
    Document::parse(text, Some(Url::parse(BASE_URI).unwrap())).unwrap()
}

pub fn suite(level: ConformanceLevel) -> Suite {
    Suite::new(Arc::new(Catalog::kml22()), level)
}

/// A document that passes every rule at every level
pub fn clean_document() -> String {
    kml(r##"
  <Document id="root">
    <name>Clean</name>
    <Style id="track">
      <LineStyle><color>ff0000ff</color><width>2</width></LineStyle>
    </Style>
    <StyleMap id="pin">
      <Pair><key>normal</key><styleUrl>#track</styleUrl></Pair>
      <Pair><key>highlight</key><styleUrl>#track</styleUrl></Pair>
    </StyleMap>
    <Placemark id="p1">
      <name>Track</name>
      <styleUrl>#track</styleUrl>
      <LineString>
        <coordinates>-122.08,37.42 -122.09,37.43</coordinates>
      </LineString>
    </Placemark>
    <Placemark id="p2">
      <name>Pin</name>
      <styleUrl>#pin</styleUrl>
      <TimeSpan><begin>2020-01</begin><end>2021-06-30</end></TimeSpan>
      <Point><coordinates>10,20</coordinates></Point>
    </Placemark>
  </Document>
"##)
}

/// A document with problems at every level
pub fn flawed_document() -> String {
    kml(r##"
  <Document>
    <Folder/>
    <Placemark>
      <styleUrl>#nowhere</styleUrl>
      <Polygon>
        <outerBoundaryIs>
          <LinearRing><coordinates>0,0 10,0 10,10 0,0</coordinates></LinearRing>
        </outerBoundaryIs>
      </Polygon>
    </Placemark>
    <Placemark>
      <Point><coordinates>1,2 3,4</coordinates></Point>
      <snippet>old style</snippet>
    </Placemark>
  </Document>
"##)
}

/// Write `content` to `name` inside `dir`, creating parent directories
pub fn write_file(dir: &Path, name: &str, content: &str) -> PathBuf {
    let path = dir.join(name);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(&path, content).unwrap();
    path
}

/// A temporary tree with one clean, one flawed and one malformed document
pub fn create_temp_kml_files() -> TempDir {
    let dir = TempDir::new().unwrap();
    write_file(dir.path(), "clean.kml", &clean_document());
    write_file(dir.path(), "nested/flawed.kml", &flawed_document());
    write_file(dir.path(), "nested/broken.kml", "<kml><Document></kml>");
    write_file(dir.path(), "notes.txt", "not a document");
    dir
}
