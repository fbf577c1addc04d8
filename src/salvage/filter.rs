//! Path selection and re-framing of exported container filesystems.
//!
//! Paths are handled as raw bytes end to end, so names that are not valid
//! UTF-8 survive the repack unchanged.

use std::borrow::Cow;
use std::io::{self, Read, Write};
use std::path::Path;

use tar::{Archive, Builder, EntryType};

use crate::error::SalvageError;

/// PAX keys that describe the entry's name; these are rewritten, not copied.
const PAX_NAME_KEYS: [&str; 2] = ["path", "linkpath"];

/// Decides which exported paths are kept, and under which name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathFilter {
    /// Working-directory prefix as it appears in export paths (`__w/r/r/`).
    strip_prefix: String,
    build_dir: String,
    include_prefixes: Vec<String>,
}

fn normalize(path: &[u8]) -> &[u8] {
    let mut path = path;
    while let Some(rest) = path.strip_prefix(b"./") {
        path = rest;
    }
    while let Some(rest) = path.strip_prefix(b"/") {
        path = rest;
    }
    path
}

fn trim_trailing_slashes(mut path: &[u8]) -> &[u8] {
    while let Some(rest) = path.strip_suffix(b"/") {
        path = rest;
    }
    path
}

#[cfg(unix)]
fn bytes_to_path(bytes: &[u8]) -> Cow<'_, Path> {
    use std::ffi::OsStr;
    use std::os::unix::ffi::OsStrExt;
    Cow::Borrowed(Path::new(OsStr::from_bytes(bytes)))
}

#[cfg(not(unix))]
fn bytes_to_path(bytes: &[u8]) -> Cow<'_, Path> {
    match String::from_utf8_lossy(bytes) {
        Cow::Borrowed(s) => Cow::Borrowed(Path::new(s)),
        Cow::Owned(s) => Cow::Owned(s.into()),
    }
}

impl PathFilter {
    pub fn new(work_dir: &str, build_dir: &str, include_prefixes: Vec<String>) -> Self {
        let work_dir = work_dir.trim_matches('/');
        let strip_prefix = if work_dir.is_empty() {
            String::new()
        } else {
            format!("{work_dir}/")
        };
        Self {
            strip_prefix,
            build_dir: build_dir.trim_matches('/').to_string(),
            include_prefixes,
        }
    }

    /// Returns the rewritten path if `path` is kept.
    ///
    /// A path is kept iff, relative to the working directory, it is the build
    /// directory itself or starts with one of the include prefixes.
    pub fn select(&self, path: &str) -> Option<String> {
        self.select_bytes(path.as_bytes())
            .map(|p| String::from_utf8_lossy(p).into_owned())
    }

    /// Byte-level [`select`](Self::select); the returned slice borrows from
    /// `path`.
    pub fn select_bytes<'a>(&self, path: &'a [u8]) -> Option<&'a [u8]> {
        let relative = normalize(path).strip_prefix(self.strip_prefix.as_bytes())?;
        let is_build_root = trim_trailing_slashes(relative) == self.build_dir.as_bytes();
        if is_build_root
            || self
                .include_prefixes
                .iter()
                .any(|prefix| relative.starts_with(prefix.as_bytes()))
        {
            Some(relative)
        } else {
            None
        }
    }

    /// Rewrites a hard-link target under the working directory; other targets
    /// are returned unchanged.
    pub fn relink(&self, target: &str) -> String {
        String::from_utf8_lossy(self.relink_bytes(target.as_bytes())).into_owned()
    }

    pub fn relink_bytes<'a>(&self, target: &'a [u8]) -> &'a [u8] {
        normalize(target)
            .strip_prefix(self.strip_prefix.as_bytes())
            .unwrap_or(target)
    }
}

/// Counters for one repack.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RepackStats {
    pub kept: usize,
    pub dropped: usize,
    /// Content bytes of kept entries.
    pub bytes: u64,
}

/// Reads a tar stream entry by entry and appends the entries `filter` keeps
/// to `builder`.
///
/// Entries are read strictly in sequence. A dropped entry's body is drained
/// completely before the next header is requested, so the stream stays in
/// sync. Kept entries keep their header, content and PAX records (mtime,
/// xattrs and the like); only the path and link target are rewritten.
pub fn repack_entries<R, W>(
    source: R,
    filter: &PathFilter,
    builder: &mut Builder<W>,
) -> Result<RepackStats, SalvageError>
where
    R: Read,
    W: Write,
{
    let mut archive = Archive::new(source);
    let mut stats = RepackStats::default();

    for entry in archive.entries()? {
        let mut entry = entry?;
        let raw_path = entry.path_bytes().into_owned();

        let Some(path) = filter.select_bytes(&raw_path) else {
            io::copy(&mut entry, &mut io::sink())?;
            stats.dropped += 1;
            continue;
        };

        let pax = pax_records(&mut entry)?;
        if !pax.is_empty() {
            builder.append_pax_extensions(pax.iter().map(|(k, v)| (k.as_str(), v.as_slice())))?;
        }

        let mut header = entry.header().clone();
        let entry_type = header.entry_type();

        if matches!(entry_type, EntryType::Symlink | EntryType::Link) {
            let target = entry.link_name_bytes().map(Cow::into_owned).ok_or_else(|| {
                SalvageError::Archive(format!(
                    "link '{}' has no target",
                    String::from_utf8_lossy(&raw_path)
                ))
            })?;
            let link_target = if entry_type == EntryType::Link {
                filter.relink_bytes(&target)
            } else {
                target.as_slice()
            };
            builder.append_link(&mut header, bytes_to_path(path), bytes_to_path(link_target))?;
        } else {
            stats.bytes += header.size().unwrap_or(0);
            builder.append_data(&mut header, bytes_to_path(path), &mut entry)?;
        }
        stats.kept += 1;
    }

    Ok(stats)
}

/// PAX records of `entry`, minus the name keys.
fn pax_records<R: Read>(entry: &mut tar::Entry<'_, R>) -> io::Result<Vec<(String, Vec<u8>)>> {
    let Some(extensions) = entry.pax_extensions()? else {
        return Ok(Vec::new());
    };
    let mut records = Vec::new();
    for extension in extensions {
        let extension = extension?;
        let Ok(key) = extension.key() else {
            continue;
        };
        if PAX_NAME_KEYS.contains(&key) {
            continue;
        }
        records.push((key.to_string(), extension.value_bytes().to_vec()));
    }
    Ok(records)
}
