use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::util::sha256_file;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceDocument {
    pub path: PathBuf,
    pub filename: String,
    pub sha256: String,
}

/// PDFs under `roots`, sorted and de-duplicated by path.
///
/// With a filter, only files below a folder whose name contains it (case-insensitive)
/// are returned; the root folder itself counts.
pub fn discover_pdfs(roots: &[PathBuf], folder_filter: Option<&str>) -> Result<Vec<PathBuf>> {
    let filter = folder_filter.map(str::to_lowercase);
    let mut found = Vec::new();

    for root in roots {
        if !root.is_dir() {
            bail!("input directory does not exist: {}", root.display());
        }

        for entry in WalkDir::new(root).follow_links(true) {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    warn!(root = %root.display(), error = %err, "skipping unreadable entry");
                    continue;
                }
            };
            if !entry.file_type().is_file() || !is_pdf(entry.path()) {
                continue;
            }
            if let Some(filter) = &filter {
                if !under_matching_folder(root, entry.path(), filter) {
                    debug!(path = %entry.path().display(), "outside filtered folders");
                    continue;
                }
            }
            found.push(entry.into_path());
        }
    }

    found.sort();
    found.dedup();
    Ok(found)
}

pub fn describe(path: &Path) -> Result<SourceDocument> {
    let filename = path
        .file_name()
        .and_then(|value| value.to_str())
        .with_context(|| format!("file name is not valid UTF-8: {}", path.display()))?
        .to_string();
    Ok(SourceDocument {
        path: path.to_path_buf(),
        filename,
        sha256: sha256_file(path)?,
    })
}

fn is_pdf(path: &Path) -> bool {
    path.extension()
        .and_then(|value| value.to_str())
        .map(|value| value.eq_ignore_ascii_case("pdf"))
        .unwrap_or(false)
}

fn under_matching_folder(root: &Path, file: &Path, filter: &str) -> bool {
    let folder_matches = |folder: &Path| {
        folder
            .file_name()
            .and_then(|value| value.to_str())
            .map(|name| name.to_lowercase().contains(filter))
            .unwrap_or(false)
    };

    if folder_matches(root) {
        return true;
    }
    file.strip_prefix(root)
        .ok()
        .and_then(Path::parent)
        .map(|relative| {
            relative
                .ancestors()
                .filter(|ancestor| !ancestor.as_os_str().is_empty())
                .any(folder_matches)
        })
        .unwrap_or(false)
}
