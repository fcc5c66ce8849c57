//! CLI tool for extracting slide text and audio from PowerPoint files and
//! writing edited versions back.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use slidetext_pptx::{MediaReplacer, Pipeline, SlideWriter};
use std::path::{Path, PathBuf};

/// Round-trip PowerPoint slide text and audio through external tools.
#[derive(Parser, Debug)]
#[command(name = "slidetext")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Print the operation report as JSON on stdout
    #[arg(long, global = true)]
    json: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Write one slideN.txt line file per slide
    Extract {
        /// Input .pptx file
        input: PathBuf,

        /// Output directory (default: <input stem>_slides next to the input)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Copy embedded audio into <output>/media
    ExtractAudio {
        /// Input .pptx file
        input: PathBuf,

        /// Output directory (default: <input stem>_slides next to the input)
        #[arg(short, long)]
        output: Option<PathBuf>,

        #[command(flatten)]
        audio: AudioArgs,
    },

    /// Write edited line files back into a copy of the presentation
    Reintegrate {
        /// Input .pptx file
        input: PathBuf,

        /// Directory holding slideN.txt files
        #[arg(short, long)]
        lines: PathBuf,

        /// Output .pptx file
        #[arg(short, long)]
        output: PathBuf,

        #[command(flatten)]
        xml: XmlArgs,
    },

    /// Overwrite embedded audio with same-named files, in place
    ReplaceAudio {
        /// .pptx file to update
        input: PathBuf,

        /// Directory holding replacement audio files
        #[arg(short, long)]
        audio_dir: PathBuf,

        #[command(flatten)]
        audio: AudioArgs,
    },

    /// Reintegrate text and replace audio in a single write
    Apply {
        /// Input .pptx file
        input: PathBuf,

        /// Directory holding slideN.txt files
        #[arg(short, long)]
        lines: PathBuf,

        /// Directory holding replacement audio files
        #[arg(short, long)]
        audio_dir: PathBuf,

        /// Output .pptx file
        #[arg(short, long)]
        output: PathBuf,

        #[command(flatten)]
        xml: XmlArgs,

        #[command(flatten)]
        audio: AudioArgs,
    },
}

#[derive(Args, Debug)]
struct AudioArgs {
    /// Audio extensions to handle (default: m4a,mp3,aac,wav,wma)
    #[arg(long, value_delimiter = ',')]
    extensions: Option<Vec<String>>,
}

impl AudioArgs {
    fn replacer(&self) -> MediaReplacer {
        match &self.extensions {
            Some(extensions) => MediaReplacer::new().with_extensions(extensions),
            None => MediaReplacer::new(),
        }
    }
}

#[derive(Args, Debug)]
struct XmlArgs {
    /// Pretty-print rewritten slide XML
    #[arg(long)]
    indent: bool,
}

impl XmlArgs {
    fn writer(&self) -> SlideWriter {
        SlideWriter::new().with_indent(self.indent)
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_filter = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .init();

    match &cli.command {
        Command::Extract { input, output } => {
            let out_dir = get_output_dir(input, output.as_ref());
            let report = Pipeline::new()
                .extract_text(input, &out_dir)
                .with_context(|| format!("Failed to extract {}", input.display()))?;
            if cli.json {
                print_json(&report)?;
            } else {
                println!(
                    "Wrote {} line file(s) to {}",
                    report.slides.len(),
                    out_dir.display()
                );
                for failure in &report.failed {
                    println!("  slide {} skipped: {}", failure.slide, failure.reason);
                }
            }
        }

        Command::ExtractAudio {
            input,
            output,
            audio,
        } => {
            let out_dir = get_output_dir(input, output.as_ref());
            let files = Pipeline::new()
                .with_media(audio.replacer())
                .extract_audio(input, &out_dir)
                .with_context(|| format!("Failed to extract audio from {}", input.display()))?;
            if cli.json {
                print_json(&files)?;
            } else {
                for file in &files {
                    println!("{}", file.display());
                }
            }
        }

        Command::Reintegrate {
            input,
            lines,
            output,
            xml,
        } => {
            let report = Pipeline::new()
                .with_writer(xml.writer())
                .reintegrate(input, lines, output)
                .with_context(|| format!("Failed to reintegrate {}", input.display()))?;
            if cli.json {
                print_json(&report)?;
            } else {
                println!("Patched {} slide(s) into {}", report.patched, output.display());
                if !report.skipped.is_empty() {
                    println!("  skipped (no lines): {:?}", report.skipped);
                }
                for failure in &report.failed {
                    println!("  slide {} failed: {}", failure.slide, failure.reason);
                }
            }
        }

        Command::ReplaceAudio {
            input,
            audio_dir,
            audio,
        } => {
            let report = Pipeline::new()
                .with_media(audio.replacer())
                .replace_audio(input, audio_dir)
                .with_context(|| format!("Failed to replace audio in {}", input.display()))?;
            if cli.json {
                print_json(&report)?;
            } else {
                println!(
                    "Replaced {} audio part(s), {} without a match",
                    report.replaced.len(),
                    report.missing.len()
                );
            }
        }

        Command::Apply {
            input,
            lines,
            audio_dir,
            output,
            xml,
            audio,
        } => {
            let report = Pipeline::new()
                .with_writer(xml.writer())
                .with_media(audio.replacer())
                .apply(input, lines, audio_dir, output)
                .with_context(|| format!("Failed to apply edits to {}", input.display()))?;
            if cli.json {
                print_json(&report)?;
            } else {
                println!(
                    "Patched {} slide(s) and {} audio part(s) into {}",
                    report.text.patched,
                    report.audio.replaced.len(),
                    output.display()
                );
            }
        }
    }

    Ok(())
}

/// Determine the output directory for an input container.
fn get_output_dir(input_path: &Path, output_dir: Option<&PathBuf>) -> PathBuf {
    if let Some(dir) = output_dir {
        return dir.clone();
    }

    let stem = input_path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("output");
    let dir_name = format!("{}_slides", stem);

    match input_path.parent() {
        Some(parent) => parent.join(dir_name),
        None => PathBuf::from(dir_name),
    }
}

fn print_json<T: Serialize>(report: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(report).context("Failed to serialize report")?;
    println!("{}", json);
    Ok(())
}
