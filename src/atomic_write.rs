// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::io;
use std::path::{Path, PathBuf};

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".tmp");
    path.with_file_name(name)
}

/// Contents written next to their destination, waiting to replace it
///
/// Dropping an uncommitted write removes the temp file and leaves the destination as it was.
#[derive(Debug)]
pub(crate) struct StagedWrite {
    temp: PathBuf,
    path: PathBuf,
    committed: bool,
}

impl StagedWrite {
    /// Write `contents` to a sibling temp file of `path`
    pub(crate) fn stage(path: &Path, contents: &[u8]) -> io::Result<Self> {
        let staged = Self {
            temp: temp_path(path),
            path: path.to_path_buf(),
            committed: false,
        };
        std::fs::write(&staged.temp, contents)?;
        Ok(staged)
    }

    pub(crate) fn path(&self) -> &Path {
        &self.path
    }

    /// Rename the temp file over the destination
    pub(crate) fn commit(mut self) -> io::Result<()> {
        std::fs::rename(&self.temp, &self.path)?;
        self.committed = true;
        Ok(())
    }
}

impl Drop for StagedWrite {
    fn drop(&mut self) {
        if !self.committed {
            let _ = std::fs::remove_file(&self.temp);
        }
    }
}

/// Write `contents` to a sibling temp file, then rename it over `path`
///
/// Readers see either the old file or the complete new one.
pub(crate) fn write_atomic(path: &Path, contents: &[u8]) -> io::Result<()> {
    StagedWrite::stage(path, contents)?.commit()
}
