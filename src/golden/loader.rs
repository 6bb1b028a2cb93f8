use std::{
    fs,
    path::{Path, PathBuf},
};

use crate::{
    error::{DatagenError, Result},
    logging::{events::GoldenLoaded, log_event_cb},
};

/// Reads the `.bin` tensors dumped by the golden simulator.
#[derive(Clone, Debug)]
pub struct GoldenLoader {
    dir: PathBuf,
}

impl GoldenLoader {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of tensor `name` of mode `mode_id`.
    pub fn mode_path(&self, mode_id: u32, name: &str) -> PathBuf {
        self.dir.join(format!("M{mode_id}_{name}.bin"))
    }

    pub fn load_mode(&self, mode_id: u32, name: &str) -> Result<Vec<i64>> {
        self.load_path(&self.mode_path(mode_id, name))
    }

    /// Loads `<dir>/<name>.bin`.
    pub fn load(&self, name: &str) -> Result<Vec<i64>> {
        self.load_path(&self.dir.join(format!("{name}.bin")))
    }

    fn load_path(&self, path: &Path) -> Result<Vec<i64>> {
        let contents =
            fs::read_to_string(path).map_err(|source| DatagenError::MissingGoldenData {
                path: path.to_path_buf(),
                source,
            })?;
        let values = parse_golden(path, &contents)?;
        log_event_cb(|| GoldenLoaded {
            tensor: path
                .file_stem()
                .map(|stem| stem.to_string_lossy().into_owned())
                .unwrap_or_default(),
            path: path.display().to_string(),
            elements: values.len(),
        })?;
        Ok(values)
    }
}

/// One integer per line. Lines starting with `#` are comments, blank lines are skipped.
pub fn parse_golden(path: &Path, contents: &str) -> Result<Vec<i64>> {
    contents
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.starts_with('#') && !line.trim().is_empty())
        .map(|(idx, line)| {
            line.trim()
                .parse::<i64>()
                .map_err(|_| DatagenError::GoldenParse {
                    path: path.to_path_buf(),
                    line: idx + 1,
                    content: line.to_string(),
                })
        })
        .collect()
}
