//! Container-level operations.
//!
//! Every operation opens the container once, works on the in-memory
//! [`Package`] and commits at most one atomic write.

use crate::align::SlideWriter;
use crate::media::{MediaReplacer, MEDIA_DIR};
use crate::package::Package;
use crate::slide::SlideReader;
use serde::{Deserialize, Serialize};
use slidetext_core::linefile;
use slidetext_core::{
    ExtractionReport, MediaReport, ReintegrationReport, Result, SlideFailure, SlideLines,
    SlideOutcome,
};
use std::fs;
use std::path::{Path, PathBuf};

/// Result of a combined text and audio apply.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ApplyReport {
    pub text: ReintegrationReport,
    pub audio: MediaReport,
}

/// Runs extraction and reintegration against containers on disk.
#[derive(Debug, Clone, Default)]
pub struct Pipeline {
    reader: SlideReader,
    writer: SlideWriter,
    media: MediaReplacer,
}

impl Pipeline {
    /// Create a pipeline with default writer and media settings.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_writer(mut self, writer: SlideWriter) -> Self {
        self.writer = writer;
        self
    }

    pub fn with_media(mut self, media: MediaReplacer) -> Self {
        self.media = media;
        self
    }

    /// Write `slide{N}.txt` for every slide into `out_dir`.
    ///
    /// Slides are probed from 1 until a slide part is missing. A slide whose
    /// XML cannot be parsed is reported and skipped.
    pub fn extract_text(&self, container: &Path, out_dir: &Path) -> Result<ExtractionReport> {
        let package = Package::open(container)?;
        fs::create_dir_all(out_dir)?;

        let mut report = ExtractionReport::default();
        for number in 1.. {
            let slide = match self.reader.read_slide(&package, number) {
                Ok(Some(slide)) => slide,
                Ok(None) => break,
                Err(e) if e.is_part_scoped() => {
                    log::warn!("Skipping slide {}: {}", number, e);
                    report.failed.push(SlideFailure {
                        slide: number,
                        reason: e.to_string(),
                    });
                    continue;
                }
                Err(e) => return Err(e),
            };

            let lines = slide.lines();
            let path = linefile::path_for(out_dir, number);
            linefile::write_lines(&path, &lines)?;
            log::info!("{}: {} paragraphs", linefile::file_name(number), lines.len());

            report.slides.push(SlideLines {
                slide: number,
                path,
                paragraphs: lines.len(),
            });
        }

        log::info!(
            "Extracted {} slide(s) to {}",
            report.slides.len(),
            out_dir.display()
        );
        Ok(report)
    }

    /// Extract embedded audio into `out_dir/media`.
    pub fn extract_audio(&self, container: &Path, out_dir: &Path) -> Result<Vec<PathBuf>> {
        let package = Package::open(container)?;
        self.media.extract(&package, &out_dir.join(MEDIA_DIR))
    }

    /// Write line files from `lines_dir` into a copy of `container` at `output`.
    pub fn reintegrate(
        &self,
        container: &Path,
        lines_dir: &Path,
        output: &Path,
    ) -> Result<ReintegrationReport> {
        let mut package = Package::open(container)?;
        let report = self.apply_lines(&mut package, lines_dir)?;
        package.save(output)?;
        log::info!("Patched {} slide(s) into {}", report.patched, output.display());
        Ok(report)
    }

    /// Replace audio parts of `container` in place.
    pub fn replace_audio(&self, container: &Path, audio_dir: &Path) -> Result<MediaReport> {
        let mut package = Package::open(container)?;
        let report = self.media.replace(&mut package, audio_dir)?;
        package.save(container)?;
        Ok(report)
    }

    /// Reintegrate text and replace audio, committing a single write to `output`.
    pub fn apply(
        &self,
        container: &Path,
        lines_dir: &Path,
        audio_dir: &Path,
        output: &Path,
    ) -> Result<ApplyReport> {
        let mut package = Package::open(container)?;
        let text = self.apply_lines(&mut package, lines_dir)?;
        let audio = self.media.replace(&mut package, audio_dir)?;
        package.save(output)?;
        log::info!(
            "Patched {} slide(s) and {} audio part(s) into {}",
            text.patched,
            audio.replaced.len(),
            output.display()
        );
        Ok(ApplyReport { text, audio })
    }

    /// Patch every slide part that has a non-empty line file.
    pub fn apply_lines(
        &self,
        package: &mut Package,
        lines_dir: &Path,
    ) -> Result<ReintegrationReport> {
        let mut report = ReintegrationReport::default();

        for number in package.slide_numbers() {
            let lines = match linefile::read_lines(&linefile::path_for(lines_dir, number)) {
                Ok(lines) => lines,
                Err(e) => {
                    log::warn!("Skipping slide {}: {}", number, e);
                    report.failed.push(SlideFailure {
                        slide: number,
                        reason: e.to_string(),
                    });
                    continue;
                }
            };
            if lines.is_empty() {
                log::info!("Slide {}: no lines, skipped", number);
                report.skipped.push(number);
                continue;
            }

            let part = Package::slide_part_name(number);
            let Some(bytes) = package.part(&part) else {
                continue;
            };

            match self.writer.patch_part(&part, bytes, &lines) {
                Ok((data, result)) => {
                    log::info!(
                        "Slide {}: method={}, runs={}, wrote={}",
                        number,
                        result.method,
                        result.run_count,
                        result.applied_count
                    );
                    if result.source_count > 0 {
                        package.set_part(&part, data);
                        report.patched += 1;
                    }
                    report.outcomes.push(SlideOutcome {
                        slide: number,
                        result,
                    });
                }
                Err(e) if e.is_part_scoped() => {
                    log::warn!("Skipping slide {}: {}", number, e);
                    report.failed.push(SlideFailure {
                        slide: number,
                        reason: e.to_string(),
                    });
                }
                Err(e) => return Err(e),
            }
        }
        Ok(report)
    }
}
