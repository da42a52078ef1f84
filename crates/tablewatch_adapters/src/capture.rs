use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tablewatch_domain::browse::{BrowseError, PageHandle, PageSource, RawResponse, ReplaySource};
use tracing::{debug, instrument};

use crate::html::visible_text;

/// Serves a directory of previously captured payloads as if it were the
/// live page: `*.json` files become responses, `*.txt`/`*.html` files make
/// up the visible text. Files are read in name order on every page load.
#[derive(Debug, Clone)]
pub struct CaptureSource {
    dir: PathBuf,
    replay: ReplaySource,
}

impl CaptureSource {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
            replay: ReplaySource::default(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl PageSource for CaptureSource {
    #[instrument(skip(self, timeout), fields(dir = %self.dir.display()))]
    fn load_page(
        &mut self,
        url: &str,
        timeout: Duration,
    ) -> Result<Box<dyn PageHandle + '_>, BrowseError> {
        self.replay = read_capture(&self.dir)?;
        debug!(
            responses = self.replay.responses().len(),
            text_bytes = self.replay.visible_text().len(),
            "capture loaded"
        );
        self.replay.load_page(url, timeout)
    }
}

fn read_capture(dir: &Path) -> Result<ReplaySource, BrowseError> {
    let unreadable =
        |err: std::io::Error| BrowseError::Navigation(format!("{}: {err}", dir.display()));

    let mut files: Vec<PathBuf> = fs::read_dir(dir)
        .map_err(unreadable)?
        .filter_map(|entry| entry.ok().map(|entry| entry.path()))
        .filter(|path| path.is_file())
        .collect();
    files.sort();

    let mut responses = Vec::new();
    let mut text_parts = Vec::new();
    for path in files {
        let ext = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.to_ascii_lowercase())
            .unwrap_or_default();
        match ext.as_str() {
            "json" => responses.push(RawResponse {
                url: format!("file://{}", path.display()),
                content_type: "application/json".to_string(),
                body: fs::read_to_string(&path).map_err(unreadable)?,
            }),
            "txt" => text_parts.push(fs::read_to_string(&path).map_err(unreadable)?),
            "html" | "htm" => {
                text_parts.push(visible_text(&fs::read_to_string(&path).map_err(unreadable)?))
            }
            _ => debug!(path = %path.display(), "ignoring capture file"),
        }
    }
    Ok(ReplaySource::new(responses, text_parts.join("\n")))
}

#[cfg(test)]
mod tests {
    use std::time::Instant;

    use super::*;
    use tempfile::tempdir;

    #[test]
    fn reads_json_and_text_in_name_order() {
        let temp = tempdir().expect("tempdir");
        fs::write(temp.path().join("02-slots.json"), r#"{"time":"20:00"}"#).expect("write");
        fs::write(temp.path().join("01-day.json"), r#"{"date":"2024-03-15"}"#).expect("write");
        fs::write(temp.path().join("page.html"), "<p>Friday</p><b>7:30 PM</b>").expect("write");
        fs::write(temp.path().join("notes.md"), "ignored").expect("write");

        let mut source = CaptureSource::new(temp.path());
        let mut page = source
            .load_page("https://booking.example.test", Duration::from_secs(1))
            .expect("capture loads");
        let deadline = Instant::now() + Duration::from_secs(1);

        let first = page.next_response(deadline).unwrap().expect("first response");
        assert!(first.url.ends_with("01-day.json"));
        assert_eq!(first.content_type, "application/json");
        let second = page.next_response(deadline).unwrap().expect("second response");
        assert_eq!(second.body, r#"{"time":"20:00"}"#);
        assert!(page.next_response(deadline).unwrap().is_none());
        assert_eq!(page.read_visible_text().unwrap(), "Friday 7:30 PM");
    }

    #[test]
    fn missing_directory_is_a_navigation_error() {
        let temp = tempdir().expect("tempdir");
        let mut source = CaptureSource::new(temp.path().join("absent"));
        assert!(matches!(
            source.load_page("https://booking.example.test", Duration::from_secs(1)),
            Err(BrowseError::Navigation(_))
        ));
    }
}
