//! Embedded audio extraction and replacement.
//!
//! Audio parts keep their basenames end to end: `ppt/media/media17.m4a` is
//! extracted as `media17.m4a` and a replacement file of that name overwrites
//! the same part.

use crate::package::{Package, CONTENT_TYPES_PART, MEDIA_PREFIX};
use crate::xml::{Element, Node, XmlDocument, NS_CT};
use slidetext_core::{Error, MediaReport, Result};
use std::fs;
use std::path::{Path, PathBuf};

/// Audio extensions recognized by default.
pub const AUDIO_EXTENSIONS: &[&str] = &["m4a", "mp3", "aac", "wav", "wma"];

/// Sub-directory of an extraction output folder that receives audio files.
pub const MEDIA_DIR: &str = "media";

/// Content type declared in the manifest for an audio extension.
pub fn content_type_for(extension: &str) -> Option<&'static str> {
    match extension.to_ascii_lowercase().as_str() {
        "m4a" => Some("audio/mp4"),
        "mp3" => Some("audio/mpeg"),
        "wav" => Some("audio/wav"),
        "aac" => Some("audio/aac"),
        "wma" => Some("audio/x-ms-wma"),
        _ => None,
    }
}

fn extension_of(name: &str) -> Option<&str> {
    Path::new(name).extension().and_then(|e| e.to_str())
}

fn basename(name: &str) -> &str {
    name.rsplit('/').next().unwrap_or(name)
}

/// Extracts and replaces embedded audio parts.
#[derive(Debug, Clone)]
pub struct MediaReplacer {
    extensions: Vec<String>,
}

impl MediaReplacer {
    /// Create a replacer for [`AUDIO_EXTENSIONS`].
    pub fn new() -> Self {
        Self {
            extensions: AUDIO_EXTENSIONS.iter().map(|e| e.to_string()).collect(),
        }
    }

    /// Replace the recognized extension list.
    pub fn with_extensions<I, S>(mut self, extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.extensions = extensions
            .into_iter()
            .map(|e| e.as_ref().trim_start_matches('.').to_ascii_lowercase())
            .collect();
        self
    }

    /// Whether a file or part name carries a recognized audio extension.
    pub fn is_audio(&self, name: &str) -> bool {
        extension_of(name)
            .map(|e| e.to_ascii_lowercase())
            .is_some_and(|e| self.extensions.contains(&e))
    }

    /// Audio part names under `ppt/media/`, in archive order.
    pub fn audio_parts<'a>(&self, package: &'a Package) -> Vec<&'a str> {
        package
            .list_prefix(MEDIA_PREFIX)
            .into_iter()
            .filter(|name| self.is_audio(name))
            .collect()
    }

    /// Write every audio part to `out_dir` under its original basename.
    ///
    /// Audio files already present in `out_dir` are removed first.
    pub fn extract(&self, package: &Package, out_dir: &Path) -> Result<Vec<PathBuf>> {
        fs::create_dir_all(out_dir)?;
        self.clear_stale(out_dir)?;

        let mut written = Vec::new();
        for name in self.audio_parts(package) {
            let Some(data) = package.part(name) else {
                continue;
            };
            let dest = out_dir.join(basename(name));
            fs::write(&dest, data)?;
            log::debug!("extracted {} -> {}", name, dest.display());
            written.push(dest);
        }

        log::info!("Extracted {} audio file(s) to {}", written.len(), out_dir.display());
        Ok(written)
    }

    fn clear_stale(&self, dir: &Path) -> Result<()> {
        for entry in fs::read_dir(dir)? {
            let path = entry?.path();
            let stale = path.is_file()
                && path
                    .file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| self.is_audio(n));
            if stale {
                fs::remove_file(&path)?;
                log::debug!("removed stale {}", path.display());
            }
        }
        Ok(())
    }

    /// Overwrite audio parts with same-named files from `audio_dir`.
    ///
    /// Files with no matching part are counted in [`MediaReport::missing`].
    /// A missing `audio_dir` replaces nothing.
    /// A manifest declaration that cannot be added is logged and recorded;
    /// the part is replaced regardless.
    pub fn replace(&self, package: &mut Package, audio_dir: &Path) -> Result<MediaReport> {
        let mut report = MediaReport::default();

        for path in self.replacement_files(audio_dir)? {
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            let target = format!("{}{}", MEDIA_PREFIX, name);
            if !package.contains(&target) {
                log::debug!("no media part matches {}", name);
                report.missing.push(name.to_string());
                continue;
            }

            let extension = extension_of(name).unwrap_or_default();
            if let Err(e) = ensure_default_content_type(package, extension) {
                log::warn!("{}", e);
                report.manifest_failures.push(e.to_string());
            }

            package.set_part(&target, fs::read(&path)?);
            log::debug!("replaced {}", target);
            report.replaced.push(name.to_string());
        }

        log::info!(
            "Replaced {} audio part(s), {} without a match",
            report.replaced.len(),
            report.missing.len()
        );
        Ok(report)
    }

    fn replacement_files(&self, dir: &Path) -> Result<Vec<PathBuf>> {
        let mut files = Vec::new();
        if !dir.is_dir() {
            log::warn!("audio directory {} not found, nothing to replace", dir.display());
            return Ok(files);
        }
        for entry in fs::read_dir(dir)? {
            let path = entry?.path();
            let is_audio = path
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| self.is_audio(n));
            if path.is_file() && is_audio {
                files.push(path);
            }
        }
        files.sort();
        Ok(files)
    }
}

impl Default for MediaReplacer {
    fn default() -> Self {
        Self::new()
    }
}

/// Make sure the manifest declares a default content type for `extension`.
///
/// Returns `Ok(true)` when a declaration was inserted and `Ok(false)` when one
/// already existed.
pub fn ensure_default_content_type(package: &mut Package, extension: &str) -> Result<bool> {
    let failed = |reason: String| {
        Error::ManifestPatchFailed(format!("cannot declare .{}: {}", extension, reason))
    };

    let content_type =
        content_type_for(extension).ok_or_else(|| failed("no known content type".to_string()))?;
    let bytes = package
        .part(CONTENT_TYPES_PART)
        .ok_or_else(|| failed(format!("{} is missing", CONTENT_TYPES_PART)))?;
    let mut manifest = XmlDocument::from_bytes(bytes).map_err(|e| failed(e.to_string()))?;

    let declared = manifest.root.elements().any(|e| {
        e.is(NS_CT, "Default")
            && e.attr("Extension")
                .is_some_and(|x| x.eq_ignore_ascii_case(extension))
    });
    if declared {
        return Ok(false);
    }

    let mut default = manifest.root.sibling("Default");
    default.set_attr("Extension", &extension.to_ascii_lowercase());
    default.set_attr("ContentType", content_type);

    let position = manifest
        .root
        .indexed_elements()
        .filter(|(_, e)| e.is(NS_CT, "Default"))
        .map(|(i, _)| i + 1)
        .last()
        .unwrap_or(0);
    manifest.root.children.insert(position, Node::Element(default));

    let bytes = manifest.to_bytes(false).map_err(|e| failed(e.to_string()))?;
    package.set_part(CONTENT_TYPES_PART, bytes);
    log::debug!("declared .{} as {}", extension, content_type);
    Ok(true)
}

/// `Default` declarations of a manifest as `(extension, content type)` pairs.
pub fn default_content_types(manifest: &Element) -> Vec<(String, String)> {
    manifest
        .elements()
        .filter(|e| e.is(NS_CT, "Default"))
        .filter_map(|e| Some((e.attr("Extension")?, e.attr("ContentType")?)))
        .collect()
}
