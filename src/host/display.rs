use crate::log_debug;
use anyhow::{Context, Result};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Body of one display entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisplayPayload {
    Text(String),
    Binary(Vec<u8>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisplayEntry {
    pub mime: String,
    pub payload: DisplayPayload,
}

/// Ordered `(mime, payload)` entries published together.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DisplayData {
    pub entries: Vec<DisplayEntry>,
}

impl DisplayData {
    pub fn push_text(&mut self, text: impl Into<String>) {
        self.entries.push(DisplayEntry {
            mime: "text/plain".to_string(),
            payload: DisplayPayload::Text(text.into()),
        });
    }

    pub fn push_image(&mut self, mime: impl Into<String>, bytes: Vec<u8>) {
        self.entries.push(DisplayEntry {
            mime: mime.into(),
            payload: DisplayPayload::Binary(bytes),
        });
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Text entry, if any.
    pub fn text(&self) -> Option<&str> {
        self.entries.iter().find_map(|entry| match &entry.payload {
            DisplayPayload::Text(text) => Some(text.as_str()),
            DisplayPayload::Binary(_) => None,
        })
    }

    /// Image entries as `(mime, bytes)`, in publish order.
    pub fn images(&self) -> impl Iterator<Item = (&str, &[u8])> {
        self.entries.iter().filter_map(|entry| match &entry.payload {
            DisplayPayload::Binary(bytes) => Some((entry.mime.as_str(), bytes.as_slice())),
            DisplayPayload::Text(_) => None,
        })
    }
}

/// Receiver of published display payloads.
pub trait DisplaySink {
    fn publish(&mut self, source: &str, data: &DisplayData) -> Result<()>;
}

/// Writes images into a directory as `idlbridge_fig_NNN.<ext>`.
pub struct ImageStore {
    dir: PathBuf,
    next_index: usize,
}

impl ImageStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            next_index: 0,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Save one image and return its path. Existing files are never overwritten.
    pub fn save(&mut self, mime: &str, bytes: &[u8]) -> Result<PathBuf> {
        fs::create_dir_all(&self.dir)
            .with_context(|| format!("failed to create {}", self.dir.display()))?;
        let extension = extension_for_mime(mime);
        let path = loop {
            let candidate = self
                .dir
                .join(format!("idlbridge_fig_{:03}.{extension}", self.next_index));
            self.next_index += 1;
            if !candidate.exists() {
                break candidate;
            }
        };
        fs::write(&path, bytes).with_context(|| format!("failed to write {}", path.display()))?;
        log_debug(&format!("saved {mime} plot to {}", path.display()));
        Ok(path)
    }
}

fn extension_for_mime(mime: &str) -> &'static str {
    match mime {
        "image/svg+xml" => "svg",
        "image/jpeg" => "jpg",
        _ => "png",
    }
}

/// Script-mode sink: text goes to `out`, images are saved and their paths
/// reported on stderr.
pub struct FileDisplay<W: Write> {
    out: W,
    images: ImageStore,
    saved: Vec<PathBuf>,
}

impl<W: Write> FileDisplay<W> {
    pub fn new(out: W, image_dir: impl Into<PathBuf>) -> Self {
        Self {
            out,
            images: ImageStore::new(image_dir),
            saved: Vec::new(),
        }
    }

    pub fn saved_images(&self) -> &[PathBuf] {
        &self.saved
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> DisplaySink for FileDisplay<W> {
    fn publish(&mut self, _source: &str, data: &DisplayData) -> Result<()> {
        if let Some(text) = data.text() {
            writeln!(self.out, "{text}").context("failed to write output")?;
            self.out.flush().context("failed to flush output")?;
        }
        for (mime, bytes) in data.images() {
            let path = self.images.save(mime, bytes)?;
            eprintln!("plot saved: {}", path.display());
            self.saved.push(path);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_data_keeps_text_before_images() {
        let mut data = DisplayData::default();
        assert!(data.is_empty());
        data.push_text("2.00000");
        data.push_image("image/png", vec![1, 2, 3]);
        assert_eq!(data.text(), Some("2.00000"));
        assert_eq!(
            data.images().collect::<Vec<_>>(),
            vec![("image/png", [1u8, 2, 3].as_slice())]
        );
        assert_eq!(data.entries[0].mime, "text/plain");
    }

    #[test]
    fn image_store_numbers_files_and_skips_existing() {
        let dir = tempfile::tempdir().expect("tempdir");
        fs::write(dir.path().join("idlbridge_fig_000.png"), b"old").expect("seed");
        let mut store = ImageStore::new(dir.path());
        let first = store.save("image/png", b"new").expect("save");
        let second = store.save("image/svg+xml", b"<svg/>").expect("save");
        assert_eq!(first.file_name().unwrap(), "idlbridge_fig_001.png");
        assert_eq!(second.file_name().unwrap(), "idlbridge_fig_002.svg");
        assert_eq!(fs::read(dir.path().join("idlbridge_fig_000.png")).unwrap(), b"old");
    }

    #[test]
    fn file_display_prints_text_and_saves_images() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut display = FileDisplay::new(Vec::new(), dir.path());
        let mut data = DisplayData::default();
        data.push_text("hello");
        data.push_image("image/jpeg", vec![0xff, 0xd8]);
        display.publish("IDLMagic.IDL", &data).expect("publish");
        assert_eq!(display.saved_images().len(), 1);
        assert!(display.saved_images()[0].ends_with("idlbridge_fig_000.jpg"));
        assert_eq!(display.into_inner(), b"hello\n".to_vec());
    }
}
