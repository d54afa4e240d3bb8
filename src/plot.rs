//! Plot geometry, output formats and the per-run scratch directory.

use crate::log_debug;
use crate::marshal::quote_string;
use crate::profile::SessionProfile;
use anyhow::{Context, Result};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tempfile::TempDir;

/// Base name of the artifact written by the postamble.
const ARTIFACT_STEM: &str = "idlbridge_fig";

/// Elements that mean an SVG document actually contains a drawing.
const SVG_DRAWING_ELEMENTS: &[&str] = &[
    "<path", "<polyline", "<polygon", "<line", "<rect", "<circle", "<ellipse", "<text", "<image",
];

/// Pixel size of the off-screen canvas.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlotSize {
    pub width: u32,
    pub height: u32,
}

impl PlotSize {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

impl Default for PlotSize {
    fn default() -> Self {
        Self::new(400, 250)
    }
}

impl fmt::Display for PlotSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{}", self.width, self.height)
    }
}

impl FromStr for PlotSize {
    type Err = String;

    /// Parse `"WIDTH,HEIGHT"`; both parts must be positive integers.
    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let (width, height) = raw
            .split_once(',')
            .ok_or_else(|| format!("must look like WIDTH,HEIGHT, got '{raw}'"))?;
        let parse = |part: &str| -> Result<u32, String> {
            part.trim()
                .parse::<u32>()
                .ok()
                .filter(|value| *value > 0)
                .ok_or_else(|| format!("must use positive integers, got '{raw}'"))
        };
        Ok(Self::new(parse(width)?, parse(height)?))
    }
}

/// Output image format for published plots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlotFormat {
    #[default]
    Png,
    Svg,
    Jpeg,
}

impl PlotFormat {
    /// Map a user-supplied format name, falling back to png for anything unknown.
    pub fn parse_lossy(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "png" => PlotFormat::Png,
            "svg" => PlotFormat::Svg,
            "jpg" | "jpeg" => PlotFormat::Jpeg,
            other => {
                log_debug(&format!("unknown plot format '{other}', using png"));
                PlotFormat::Png
            }
        }
    }

    pub fn mime_type(self) -> &'static str {
        match self {
            PlotFormat::Png => "image/png",
            PlotFormat::Svg => "image/svg+xml",
            PlotFormat::Jpeg => "image/jpeg",
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            PlotFormat::Png => "png",
            PlotFormat::Svg => "svg",
            PlotFormat::Jpeg => "jpg",
        }
    }

    /// Statement that writes the colour-mapped Z-buffer for raster formats.
    fn raster_writer(self) -> &'static str {
        match self {
            PlotFormat::Jpeg => "write_jpeg, {outfile}, idlbridge_rgb, true=1, quality=95",
            PlotFormat::Png | PlotFormat::Svg => "write_png, {outfile}, idlbridge_rgb",
        }
    }
}

/// Preamble and postamble for one run, plus the format the artifact will actually have.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlotScript {
    pub preamble: String,
    pub postamble: String,
    pub format: PlotFormat,
}

impl PlotScript {
    /// Pick the rendering path for `requested` and fill in the templates.
    ///
    /// Profiles without a vector device render svg requests through the Z-buffer
    /// as png, and the payload is tagged accordingly.
    pub fn build(
        profile: &SessionProfile,
        requested: PlotFormat,
        size: PlotSize,
        scratch: &ScratchDir,
    ) -> Self {
        let (templates, format) = match (requested, profile.vector.as_ref()) {
            (PlotFormat::Svg, Some(vector)) => (vector, PlotFormat::Svg),
            (PlotFormat::Svg, None) => {
                log_debug(&format!(
                    "{} has no vector device; rendering svg request as png",
                    profile.display_name
                ));
                (&profile.raster, PlotFormat::Png)
            }
            (other, _) => (&profile.raster, other),
        };
        let outfile = quote_string(&scratch.idl_path(&scratch.artifact_path(format)));
        let writer = format.raster_writer();
        Self {
            preamble: SessionProfile::render(&templates.preamble, size, &outfile, writer),
            postamble: SessionProfile::render(&templates.postamble, size, &outfile, writer),
            format,
        }
    }
}

/// Per-invocation temporary directory holding rendered plot artifacts.
pub struct ScratchDir {
    dir: TempDir,
}

impl ScratchDir {
    pub fn new() -> Result<Self> {
        let dir = tempfile::Builder::new()
            .prefix("idlbridge-")
            .tempdir()
            .context("failed to create plot scratch directory")?;
        Ok(Self { dir })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn artifact_path(&self, format: PlotFormat) -> PathBuf {
        self.dir
            .path()
            .join(format!("{ARTIFACT_STEM}.{}", format.extension()))
    }

    /// Path as the interpreter should see it (forward slashes on every platform).
    pub fn idl_path(&self, path: &Path) -> String {
        path.to_string_lossy().replace('\\', "/")
    }

    /// Read back every artifact of `format`, in name order, skipping blank vector output.
    pub fn collect_artifacts(&self, format: PlotFormat) -> Result<Vec<Vec<u8>>> {
        let mut paths: Vec<PathBuf> = fs::read_dir(self.dir.path())
            .with_context(|| format!("failed to list {}", self.dir.path().display()))?
            .filter_map(|entry| entry.ok().map(|entry| entry.path()))
            .filter(|path| {
                path.extension()
                    .and_then(|ext| ext.to_str())
                    .is_some_and(|ext| ext.eq_ignore_ascii_case(format.extension()))
            })
            .collect();
        paths.sort();

        let mut artifacts = Vec::with_capacity(paths.len());
        for path in paths {
            let bytes =
                fs::read(&path).with_context(|| format!("failed to read {}", path.display()))?;
            if format == PlotFormat::Svg && !svg_has_drawing(&bytes) {
                log_debug(&format!("skipping blank svg artifact {}", path.display()));
                continue;
            }
            artifacts.push(bytes);
        }
        Ok(artifacts)
    }

    /// Remove the directory and its contents, reporting failures.
    pub fn close(self) -> Result<()> {
        let path = self.dir.path().to_path_buf();
        self.dir
            .close()
            .with_context(|| format!("failed to remove {}", path.display()))
    }
}

fn svg_has_drawing(bytes: &[u8]) -> bool {
    let text = String::from_utf8_lossy(bytes);
    SVG_DRAWING_ELEMENTS
        .iter()
        .any(|element| text.contains(element))
}
