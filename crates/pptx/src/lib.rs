//! PPTX (Office Open XML) backend for round-tripping slide text.
//!
//! Opens .pptx files (ZIP archives of XML parts), reads each slide's
//! paragraphs in reading order, writes edited line files back into the slide
//! XML and swaps embedded audio parts.

pub mod align;
pub mod media;
pub mod package;
pub mod pipeline;
pub mod slide;
pub mod xml;

pub use align::SlideWriter;
pub use media::MediaReplacer;
pub use package::Package;
pub use pipeline::{ApplyReport, Pipeline};
pub use slide::{SlideDocument, SlideReader};

#[cfg(test)]
pub(crate) mod tests {
    use crate::package::Package;
    use std::io::{Cursor, Write};
    use std::path::{Path, PathBuf};
    use zip::write::FileOptions;
    use zip::ZipWriter;

    pub(crate) const CONTENT_TYPES: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"><Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/><Default Extension="xml" ContentType="application/xml"/><Override PartName="/ppt/presentation.xml" ContentType="application/vnd.openxmlformats-officedocument.presentationml.presentation.main+xml"/></Types>"#;

    pub(crate) fn zip_bytes(entries: &[(&str, &[u8])]) -> Vec<u8> {
        let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
        for (name, data) in entries {
            zip.start_file(*name, FileOptions::default()).unwrap();
            zip.write_all(data).unwrap();
        }
        zip.finish().unwrap().into_inner()
    }

    pub(crate) fn package_from(entries: &[(&str, &[u8])]) -> Package {
        Package::from_bytes(zip_bytes(entries)).unwrap()
    }

    pub(crate) fn package_with_slides(slides: &[&str]) -> Package {
        let names: Vec<String> = (1..=slides.len()).map(Package::slide_part_name).collect();
        let mut entries: Vec<(&str, &[u8])> =
            vec![("[Content_Types].xml", CONTENT_TYPES.as_bytes())];
        for (name, xml) in names.iter().zip(slides) {
            entries.push((name.as_str(), xml.as_bytes()));
        }
        package_from(&entries)
    }

    pub(crate) fn write_container(dir: &Path, name: &str, entries: &[(&str, &[u8])]) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, zip_bytes(entries)).unwrap();
        path
    }
}
