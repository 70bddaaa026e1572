//! Static fallback: map a request path onto a file below the site root.

use std::ffi::OsString;
use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};

use tracing::debug;

use crate::error::ResolveError;

/// A file found for a request path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileArtifact {
    pub path: PathBuf,
    /// Inferred from the extension; a default only.
    pub content_type: &'static str,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone)]
pub struct StaticFiles {
    base_dir: PathBuf,
    index_files: Vec<String>,
}

impl StaticFiles {
    pub fn new<P: Into<PathBuf>>(base: P) -> Self {
        Self {
            base_dir: base.into(),
            index_files: vec!["index.html".to_string()],
        }
    }

    /// Documents tried, in order, when a path names a directory.
    #[must_use]
    pub fn with_index_files(mut self, names: Vec<String>) -> Self {
        self.index_files = names;
        self
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.base_dir
    }

    /// Decode a URL path and join it onto the root. `None` for malformed paths and for
    /// anything that would leave the root.
    fn map_path(&self, url_path: &str) -> Option<PathBuf> {
        let raw = url_path.split(['?', '#']).next().unwrap_or("");
        let decoded = urlencoding::decode(raw).ok()?;
        if decoded.contains('\0') {
            return None;
        }
        let mut pb = self.base_dir.clone();
        for comp in Path::new(decoded.trim_start_matches('/')).components() {
            match comp {
                Component::Normal(s) => pb.push(s),
                Component::CurDir => {}
                _ => return None,
            }
        }
        Some(pb)
    }

    #[must_use]
    pub fn content_type(path: &Path) -> &'static str {
        match path
            .extension()
            .and_then(|s| s.to_str())
            .unwrap_or("")
            .to_lowercase()
            .as_str()
        {
            "html" | "htm" => "text/html; charset=utf-8",
            "css" => "text/css; charset=utf-8",
            "js" | "mjs" => "application/javascript; charset=utf-8",
            "json" | "map" => "application/json",
            "txt" | "md" => "text/plain; charset=utf-8",
            "xml" => "application/xml",
            "svg" => "image/svg+xml",
            "png" => "image/png",
            "jpg" | "jpeg" => "image/jpeg",
            "gif" => "image/gif",
            "webp" => "image/webp",
            "avif" => "image/avif",
            "ico" => "image/x-icon",
            "woff" => "font/woff",
            "woff2" => "font/woff2",
            "wasm" => "application/wasm",
            "pdf" => "application/pdf",
            "mp4" => "video/mp4",
            "webm" => "video/webm",
            _ => "application/octet-stream",
        }
    }

    /// Find the file a URL path refers to.
    ///
    /// Tries, in order: the exact file; the index documents when it is a directory;
    /// `<path>.html` when the last segment has no extension.
    pub fn locate(&self, url_path: &str) -> Result<PathBuf, ResolveError> {
        let candidate = self.map_path(url_path).ok_or(ResolveError::NotFound)?;

        match probe(&candidate)? {
            Probe::File => return Ok(candidate),
            Probe::Dir => {
                for name in &self.index_files {
                    let index = candidate.join(name);
                    if let Probe::File = probe(&index)? {
                        return Ok(index);
                    }
                }
                return Err(ResolveError::NotFound);
            }
            Probe::Missing => {}
        }

        if candidate.extension().is_none() && candidate != self.base_dir {
            let mut with_html = OsString::from(candidate.as_os_str());
            with_html.push(".html");
            let with_html = PathBuf::from(with_html);
            if let Probe::File = probe(&with_html)? {
                return Ok(with_html);
            }
        }
        Err(ResolveError::NotFound)
    }

    /// Locate and read the file for a URL path.
    pub fn resolve(&self, url_path: &str) -> Result<FileArtifact, ResolveError> {
        let path = self.locate(url_path)?;
        let bytes = fs::read(&path).map_err(|source| match source.kind() {
            io::ErrorKind::NotFound => ResolveError::NotFound,
            _ => ResolveError::Read {
                path: path.clone(),
                source,
            },
        })?;
        debug!(url = url_path, file = %path.display(), size = bytes.len(), "static file resolved");
        Ok(FileArtifact {
            content_type: Self::content_type(&path),
            path,
            bytes,
        })
    }
}

enum Probe {
    File,
    Dir,
    Missing,
}

fn probe(path: &Path) -> Result<Probe, ResolveError> {
    match fs::metadata(path) {
        Ok(meta) if meta.is_file() => Ok(Probe::File),
        Ok(meta) if meta.is_dir() => Ok(Probe::Dir),
        Ok(_) => Ok(Probe::Missing),
        Err(e)
            if matches!(
                e.kind(),
                io::ErrorKind::NotFound | io::ErrorKind::NotADirectory
            ) =>
        {
            Ok(Probe::Missing)
        }
        Err(source) => Err(ResolveError::Read {
            path: path.to_path_buf(),
            source,
        }),
    }
}
