use crate::core::error::LoadError;
use std::fs;
use std::path::{Component, Path, PathBuf};

/// `<models-root>/<model_name>/` directory convention.
#[derive(Debug, Clone)]
pub struct ModelLayout {
    root: PathBuf,
}

impl ModelLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn model_dir(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }

    /// Directory for `name`, or `NotFound` if it does not exist. Names that
    /// are not a single plain path component never resolve.
    pub fn resolve(&self, name: &str) -> Result<PathBuf, LoadError> {
        let dir = self.model_dir(name);

        if !is_plain_name(name) || !dir.exists() {
            return Err(LoadError::NotFound {
                name: name.to_string(),
                path: dir,
            });
        }

        if !dir.is_dir() {
            return Err(LoadError::Unsupported {
                name: name.to_string(),
                reason: format!("{} is not a directory", dir.display()),
            });
        }

        Ok(dir)
    }
}

fn is_plain_name(name: &str) -> bool {
    let mut components = Path::new(name).components();
    matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    ) && !name.contains(['/', '\\'])
}

/// First file in `dir` with the given extension, in lexical order.
pub fn find_with_extension(dir: &Path, extension: &str) -> std::io::Result<Option<PathBuf>> {
    let mut matches: Vec<PathBuf> = fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.is_file())
        .filter(|p| p.extension().and_then(|e| e.to_str()) == Some(extension))
        .collect();
    matches.sort();
    Ok(matches.into_iter().next())
}
