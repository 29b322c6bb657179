use std::path::{Path, PathBuf};

use regex::Regex;
use url::Url;

/// Sanitize filename to remove invalid characters
pub fn sanitize_filename(filename: &str) -> String {
    filename
        .chars()
        .map(|c| match c {
            '<' | '>' | ':' | '"' | '/' | '\\' | '|' | '?' | '*' => '_',
            _ => c,
        })
        .collect::<String>()
        .trim()
        .trim_matches('.')
        .to_string()
}

/// Derive a filename from the last path segment of a URL, falling back to
/// the host name and finally to `download`.
pub fn filename_from_url(url: &str) -> String {
    let parsed = match Url::parse(url) {
        Ok(u) => u,
        Err(_) => return "download".to_string(),
    };

    let segment = parsed
        .path_segments()
        .and_then(|mut segments| segments.next_back())
        .filter(|s| !s.is_empty())
        .map(str::to_string);

    let name = segment
        .or_else(|| parsed.host_str().map(str::to_string))
        .map(|s| sanitize_filename(&s))
        .unwrap_or_default();

    if name.is_empty() {
        "download".to_string()
    } else {
        name
    }
}

/// Pick `dir/filename`, or the first free `name (n).ext` when it is taken.
pub fn unique_path(dir: &Path, filename: &str) -> PathBuf {
    let candidate = dir.join(filename);
    if !candidate.exists() {
        return candidate;
    }

    let (stem, ext) = match filename.rfind('.') {
        Some(idx) if idx > 0 => (&filename[..idx], &filename[idx..]),
        _ => (filename, ""),
    };

    // Continue an existing counter instead of producing "a (1) (1).zip".
    let (base, mut n) = match Regex::new(r"^(.*) \((\d+)\)$")
        .ok()
        .and_then(|re| re.captures(stem).map(|c| (c[1].to_string(), c[2].parse().ok())))
    {
        Some((base, Some(n))) => (base, n),
        _ => (stem.to_string(), 0u32),
    };

    loop {
        n += 1;
        let candidate = dir.join(format!("{} ({}){}", base, n, ext));
        if !candidate.exists() {
            return candidate;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_filename() {
        assert_eq!(sanitize_filename("test/file.mp3"), "test_file.mp3");
        assert_eq!(sanitize_filename("normal-name.mp3"), "normal-name.mp3");
        assert_eq!(sanitize_filename(" ..hidden "), "hidden");
    }

    #[test]
    fn test_filename_from_url() {
        assert_eq!(
            filename_from_url("https://example.com/files/report.pdf?x=1"),
            "report.pdf"
        );
        assert_eq!(filename_from_url("https://example.com/"), "example.com");
        assert_eq!(filename_from_url("not a url"), "download");
    }

    #[test]
    fn test_unique_path() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(unique_path(dir.path(), "a.zip"), dir.path().join("a.zip"));

        std::fs::write(dir.path().join("a.zip"), b"x").unwrap();
        assert_eq!(unique_path(dir.path(), "a.zip"), dir.path().join("a (1).zip"));

        std::fs::write(dir.path().join("a (1).zip"), b"x").unwrap();
        assert_eq!(
            unique_path(dir.path(), "a (1).zip"),
            dir.path().join("a (2).zip")
        );

        std::fs::write(dir.path().join("README"), b"x").unwrap();
        assert_eq!(unique_path(dir.path(), "README"), dir.path().join("README (1)"));
    }
}
