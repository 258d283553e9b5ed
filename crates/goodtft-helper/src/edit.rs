//! Line-oriented config file edits.
//!
//! A file is loaded into a line list, a set of [`Edit`]s is applied in memory
//! and the result is written back through a temp file and a rename.

use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use regex::Regex;
use tracing::debug;

use crate::error::{HelperError, Result};

const DEFAULT_MODE: u32 = 0o644;

/// One mutation of a line list. Patterns are regexes matched per line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Edit {
    /// Replace every matching line with `line`, or append `line` if nothing
    /// matched. An empty `line` deletes the matches and appends nothing.
    Reconfig { pattern: String, line: String },
    /// Replace every matching line with `line`. No-op if nothing matches.
    ReplaceLine { pattern: String, line: String },
    /// Prefix matching, not yet commented lines with `#`.
    CommentOut { pattern: String },
    DeleteLine { pattern: String },
    /// Delete every matching line except the first.
    KeepFirst { pattern: String },
    /// Insert `line` before the last matching line, or append it.
    InsertBefore { pattern: String, line: String },
    /// Delete every block from a line starting with `begin` up to the next
    /// line starting with `end`, plus the blank separator line before it.
    DeleteBlock { begin: String, end: String },
    /// Append `lines` after a blank separator line.
    AppendBlock { lines: Vec<String> },
}

impl Edit {
    pub fn reconfig(pattern: impl Into<String>, line: impl Into<String>) -> Self {
        Self::Reconfig {
            pattern: pattern.into(),
            line: line.into(),
        }
    }

    pub fn replace_line(pattern: impl Into<String>, line: impl Into<String>) -> Self {
        Self::ReplaceLine {
            pattern: pattern.into(),
            line: line.into(),
        }
    }

    pub fn comment_out(pattern: impl Into<String>) -> Self {
        Self::CommentOut {
            pattern: pattern.into(),
        }
    }

    pub fn delete_line(pattern: impl Into<String>) -> Self {
        Self::DeleteLine {
            pattern: pattern.into(),
        }
    }

    pub fn keep_first(pattern: impl Into<String>) -> Self {
        Self::KeepFirst {
            pattern: pattern.into(),
        }
    }

    pub fn insert_before(pattern: impl Into<String>, line: impl Into<String>) -> Self {
        Self::InsertBefore {
            pattern: pattern.into(),
            line: line.into(),
        }
    }

    pub fn delete_block(begin: impl Into<String>, end: impl Into<String>) -> Self {
        Self::DeleteBlock {
            begin: begin.into(),
            end: end.into(),
        }
    }

    pub fn append_block<I, S>(lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::AppendBlock {
            lines: lines.into_iter().map(Into::into).collect(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ConfigFile {
    path: PathBuf,
    lines: Vec<String>,
}

impl ConfigFile {
    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path).map_err(|e| HelperError::read(path, e))?;
        Ok(Self::parse(path, &contents))
    }

    /// Like [`ConfigFile::load`], but a missing file loads as empty.
    pub fn load_or_empty(path: &Path) -> Result<Self> {
        match fs::read_to_string(path) {
            Ok(contents) => Ok(Self::parse(path, &contents)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(Self::parse(path, "")),
            Err(e) => Err(HelperError::read(path, e)),
        }
    }

    pub fn parse(path: &Path, contents: &str) -> Self {
        Self {
            path: path.to_path_buf(),
            lines: contents.lines().map(str::to_string).collect(),
        }
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    pub fn contents(&self) -> String {
        let mut out = self.lines.join("\n");
        if !self.lines.is_empty() {
            out.push('\n');
        }
        out
    }

    pub fn contains(&self, pattern: &str) -> Result<bool> {
        let re = Regex::new(pattern)?;
        Ok(self.lines.iter().any(|l| re.is_match(l)))
    }

    /// Apply one edit, returning how many lines or blocks it touched.
    pub fn apply(&mut self, edit: &Edit) -> Result<usize> {
        let touched = match edit {
            Edit::Reconfig { pattern, line } => {
                let re = Regex::new(pattern)?;
                let hits = self.replace_matching(&re, line);
                if hits == 0 && !line.is_empty() {
                    self.lines.push(line.clone());
                    1
                } else {
                    hits
                }
            }
            Edit::ReplaceLine { pattern, line } => {
                let re = Regex::new(pattern)?;
                self.replace_matching(&re, line)
            }
            Edit::CommentOut { pattern } => {
                let re = Regex::new(pattern)?;
                let mut hits = 0;
                for l in self.lines.iter_mut() {
                    if re.is_match(l) && !l.trim_start().starts_with('#') {
                        *l = format!("#{}", l.trim_start());
                        hits += 1;
                    }
                }
                hits
            }
            Edit::DeleteLine { pattern } => {
                let re = Regex::new(pattern)?;
                let before = self.lines.len();
                self.lines.retain(|l| !re.is_match(l));
                before - self.lines.len()
            }
            Edit::KeepFirst { pattern } => {
                let re = Regex::new(pattern)?;
                let mut seen = false;
                let before = self.lines.len();
                self.lines.retain(|l| {
                    if !re.is_match(l) {
                        return true;
                    }
                    !std::mem::replace(&mut seen, true)
                });
                before - self.lines.len()
            }
            Edit::InsertBefore { pattern, line } => {
                let re = Regex::new(pattern)?;
                match self.lines.iter().rposition(|l| re.is_match(l)) {
                    Some(i) => self.lines.insert(i, line.clone()),
                    None => self.lines.push(line.clone()),
                }
                1
            }
            Edit::DeleteBlock { begin, end } => self.delete_blocks(begin, end),
            Edit::AppendBlock { lines } => {
                if !self.lines.is_empty() {
                    self.lines.push(String::new());
                }
                self.lines.extend(lines.iter().cloned());
                1
            }
        };
        debug!(path = %self.path.display(), ?edit, touched, "edit applied");
        Ok(touched)
    }

    pub fn apply_all(&mut self, edits: &[Edit]) -> Result<()> {
        for edit in edits {
            self.apply(edit)?;
        }
        Ok(())
    }

    /// Matching lines become `line`; an empty `line` removes them.
    fn replace_matching(&mut self, re: &Regex, line: &str) -> usize {
        let hits = self.lines.iter().filter(|l| re.is_match(l)).count();
        if line.is_empty() {
            self.lines.retain(|l| !re.is_match(l));
        } else {
            for l in self.lines.iter_mut() {
                if re.is_match(l) {
                    *l = line.to_string();
                }
            }
        }
        hits
    }

    fn delete_blocks(&mut self, begin: &str, end: &str) -> usize {
        let mut removed = 0;
        let mut from = 0;
        while let Some(start) = self.lines[from..]
            .iter()
            .position(|l| l.starts_with(begin))
            .map(|i| i + from)
        {
            let Some(stop) = self.lines[start + 1..]
                .iter()
                .position(|l| l.starts_with(end))
                .map(|i| i + start + 1)
            else {
                break;
            };
            let first = if start > 0 && self.lines[start - 1].trim().is_empty() {
                start - 1
            } else {
                start
            };
            self.lines.drain(first..=stop);
            removed += 1;
            from = first;
        }
        removed
    }

    /// Write back via temp file and rename, keeping the existing file mode.
    pub fn save(&self) -> Result<()> {
        let mode = fs::metadata(&self.path)
            .map(|m| m.permissions().mode() & 0o7777)
            .unwrap_or(DEFAULT_MODE);
        atomic_write(&self.path, self.contents().as_bytes(), mode)
    }
}

/// Copy `path` to `backup` before an edit.
pub fn backup(path: &Path, backup: &Path) -> Result<()> {
    fs::copy(path, backup).map_err(|e| HelperError::write(backup, e))?;
    debug!(from = %path.display(), to = %backup.display(), "backup written");
    Ok(())
}

/// Full overwrite of a generated file.
pub fn write_file(path: &Path, contents: &str) -> Result<()> {
    atomic_write(path, contents.as_bytes(), DEFAULT_MODE)
}

pub fn atomic_write(path: &Path, data: &[u8], mode: u32) -> Result<()> {
    let parent = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(parent).map_err(|e| HelperError::write(parent, e))?;

    let tmp = temp_path(path);
    if let Err(err) = write_then_rename(&tmp, path, data, mode) {
        let _ = fs::remove_file(&tmp);
        return Err(err);
    }
    // Not every filesystem (vfat /boot) supports syncing a directory handle.
    if let Ok(dir) = File::open(parent) {
        let _ = dir.sync_all();
    }
    Ok(())
}

fn write_then_rename(tmp: &Path, path: &Path, data: &[u8], mode: u32) -> Result<()> {
    let mut file = OpenOptions::new()
        .create(true)
        .truncate(true)
        .write(true)
        .open(tmp)
        .map_err(|e| HelperError::write(tmp, e))?;
    file.write_all(data).map_err(|e| HelperError::write(tmp, e))?;
    file.sync_all().map_err(|e| HelperError::write(tmp, e))?;
    fs::set_permissions(tmp, fs::Permissions::from_mode(mode))
        .map_err(|e| HelperError::write(tmp, e))?;
    fs::rename(tmp, path).map_err(|e| HelperError::write(path, e))
}

fn temp_path(dest: &Path) -> PathBuf {
    let name = dest
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("file");
    dest.with_file_name(format!(".{name}.goodtft-new"))
}
