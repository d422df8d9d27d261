//! Tokenizer asset handling.
//!
//! The converted checkpoint is only usable if vocabulary/merge data ships
//! alongside the weights, so a checkpoint directory with no tokenizer
//! artifact at all fails the run instead of silently producing a
//! weights-only output.

use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, info};

/// Tokenizer files a Hugging Face-style checkpoint may carry.
pub const TOKENIZER_FILES: &[&str] = &[
    "tokenizer.json",
    "tokenizer_config.json",
    "special_tokens_map.json",
    "vocab.json",
    "merges.txt",
    "tokenizer.model",
    "added_tokens.json",
];

#[derive(Error, Debug)]
pub enum TokenizerError {
    #[error("no tokenizer assets found in {0:?}")]
    NotFound(PathBuf),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// The tokenizer files found in the input checkpoint.
#[derive(Debug)]
pub struct TokenizerAssets {
    files: Vec<PathBuf>,
}

impl TokenizerAssets {
    /// Collect whichever known tokenizer files exist in `dir`.
    pub fn load(dir: &Path) -> Result<Self, TokenizerError> {
        let files: Vec<PathBuf> = TOKENIZER_FILES
            .iter()
            .map(|name| dir.join(name))
            .filter(|path| path.is_file())
            .collect();

        if files.is_empty() {
            return Err(TokenizerError::NotFound(dir.to_path_buf()));
        }

        info!(files = files.len(), dir = %dir.display(), "tokenizer assets found");
        Ok(Self { files })
    }

    /// Copy the collected files into `out_dir`.
    pub fn save(&self, out_dir: &Path) -> Result<(), TokenizerError> {
        fs::create_dir_all(out_dir)?;
        for src in &self.files {
            let Some(name) = src.file_name() else {
                continue;
            };
            let dst = out_dir.join(name);
            fs::copy(src, &dst)?;
            debug!(from = %src.display(), to = %dst.display(), "copied tokenizer asset");
        }
        Ok(())
    }

    /// Paths of the collected assets.
    pub fn files(&self) -> &[PathBuf] {
        &self.files
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_tokenizer_is_an_error() {
        let tmp = TempDir::new().unwrap();
        assert!(matches!(
            TokenizerAssets::load(tmp.path()),
            Err(TokenizerError::NotFound(_))
        ));
    }

    #[test]
    fn test_load_and_copy_assets() {
        let tmp = TempDir::new().unwrap();
        let input = tmp.path().join("in");
        let output = tmp.path().join("out");
        fs::create_dir_all(&input).unwrap();

        fs::write(input.join("tokenizer.json"), b"{\"version\":\"1.0\"}").unwrap();
        fs::write(input.join("merges.txt"), b"a b\n").unwrap();
        fs::write(input.join("pytorch_model.bin"), b"not a tokenizer file").unwrap();

        let assets = TokenizerAssets::load(&input).unwrap();
        assert_eq!(assets.files().len(), 2);

        assets.save(&output).unwrap();
        assert!(output.join("tokenizer.json").exists());
        assert!(output.join("merges.txt").exists());
        assert!(!output.join("pytorch_model.bin").exists());
    }
}
