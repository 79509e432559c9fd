use std::fs;
use std::path::{Path, PathBuf};

use super::story::StoryLoadError;

pub(crate) const STORY_FILE_NAME: &str = "story.json";
const TILESET_PREFIX: &str = "set_";
const MAP_PREFIX: &str = "map_";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum StoryFileKind {
    Story,
    Tileset,
    Map,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct DiscoveredFile {
    pub kind: StoryFileKind,
    pub normalized_rel: String,
    pub path: PathBuf,
}

/// Every story input under `root`, sorted by normalized relative path.
/// Only the top-level `story.json` counts as the story file.
pub(crate) fn discover_story_files(root: &Path) -> Result<Vec<DiscoveredFile>, StoryLoadError> {
    let mut files = Vec::new();
    collect_recursive(root, root, &mut files)?;
    files.sort_by(|a, b| a.normalized_rel.cmp(&b.normalized_rel));

    if !files.iter().any(|file| file.kind == StoryFileKind::Story) {
        return Err(StoryLoadError::MissingStoryFile {
            dir: root.to_path_buf(),
        });
    }
    Ok(files)
}

fn collect_recursive(
    root: &Path,
    current: &Path,
    files: &mut Vec<DiscoveredFile>,
) -> Result<(), StoryLoadError> {
    let entries = fs::read_dir(current).map_err(|source| StoryLoadError::ReadDir {
        path: current.to_path_buf(),
        source,
    })?;

    for entry in entries {
        let entry = entry.map_err(|source| StoryLoadError::ReadDirEntry {
            path: current.to_path_buf(),
            source,
        })?;
        let path = entry.path();
        if path.is_dir() {
            collect_recursive(root, &path, files)?;
            continue;
        }
        let Some(kind) = classify(root, &path) else {
            continue;
        };
        let rel = path.strip_prefix(root).unwrap_or(&path);
        files.push(DiscoveredFile {
            kind,
            normalized_rel: normalize_rel_path(rel),
            path: path.clone(),
        });
    }
    Ok(())
}

fn classify(root: &Path, path: &Path) -> Option<StoryFileKind> {
    let is_json = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
    if !is_json {
        return None;
    }
    let file_name = path.file_name()?.to_str()?;
    if file_name == STORY_FILE_NAME && path.parent() == Some(root) {
        Some(StoryFileKind::Story)
    } else if file_name.starts_with(TILESET_PREFIX) {
        Some(StoryFileKind::Tileset)
    } else if file_name.starts_with(MAP_PREFIX) {
        Some(StoryFileKind::Map)
    } else {
        None
    }
}

fn normalize_rel_path(path: &Path) -> String {
    path.components()
        .map(|component| component.as_os_str().to_string_lossy().to_string())
        .collect::<Vec<_>>()
        .join("/")
}
