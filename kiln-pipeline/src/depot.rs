use std::hash::Hasher;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

/// The prefix under which a backing file system is attached into the depot's
/// unified path namespace. The root mount has an empty prefix; all other
/// prefixes end with a slash ("engine/").
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MountPoint {
    prefix: String,
}

impl MountPoint {
    pub fn new<T: Into<String>>(prefix: T) -> Self {
        let prefix = prefix.into();
        debug_assert!(prefix.is_empty() || prefix.ends_with('/'));
        MountPoint { prefix }
    }

    pub fn root() -> Self {
        MountPoint {
            prefix: String::default(),
        }
    }

    pub fn path(&self) -> &str {
        &self.prefix
    }

    /// Strips the mount prefix off a depot path.
    pub fn translate_to_relative<'a>(
        &self,
        path: &'a str,
    ) -> Option<&'a str> {
        path.strip_prefix(self.prefix.as_str())
    }

    /// Expands a path relative to this mount into a full depot path.
    pub fn expand_from_relative(
        &self,
        relative: &str,
    ) -> String {
        format!("{}{}", self.prefix, relative)
    }
}

/// Ground-truth state of a source file as reported by the depot.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct DepotFileInfo {
    pub size: u64,
    pub timestamp: u64,
}

/// The virtual source-asset filesystem the pipeline cooks from. Multiple
/// backing directories can be mounted under prefixes of one unified path
/// namespace. This is the only ground truth for "does this source file exist
/// and what is its current state".
pub trait Depot: Send + Sync {
    fn query_file_mount_point(
        &self,
        path: &str,
    ) -> Option<MountPoint>;

    fn query_file_info(
        &self,
        path: &str,
    ) -> Option<DepotFileInfo>;

    /// Hash of the file's contents. Separate from `query_file_info` because
    /// it reads the whole file; callers only pay for it on the up-to-date
    /// check's second chance.
    fn query_file_content_hash(
        &self,
        path: &str,
    ) -> Option<u64>;

    fn enum_files_at_path(
        &self,
        dir: &str,
        callback: &mut dyn FnMut(&str),
    );

    fn enum_directories_at_path(
        &self,
        dir: &str,
        callback: &mut dyn FnMut(&str),
    );

    fn create_file_reader(
        &self,
        path: &str,
    ) -> Option<Box<dyn Read + Send>>;

    fn store_file_content(
        &self,
        path: &str,
        data: &[u8],
    ) -> bool;
}

pub fn hash_file_contents(data: &[u8]) -> u64 {
    let mut hasher = siphasher::sip::SipHasher::default();
    hasher.write(data);
    hasher.finish()
}

//
// Deterministic directory enumeration. Shared by cook-time discovery and the
// up-to-date check so both sides compute identical listings.
//

pub struct DirectoryListing {
    pub files: Vec<String>,
    pub names_hash: u64,
    pub newest_timestamp: u64,
}

/// Enumerates files under `dir`, optionally recursing, keeping only files
/// whose extension case-insensitively matches one of `extensions` (empty =
/// keep everything). Files and directories are sorted before hashing so the
/// result never depends on filesystem iteration order.
pub fn enumerate_depot_files(
    depot: &dyn Depot,
    dir: &str,
    recurse: bool,
    extensions: &[&str],
) -> DirectoryListing {
    debug_assert!(dir.is_empty() || dir.ends_with('/'));

    let mut directories_to_check = vec![dir.to_string()];
    let mut name_hasher = siphasher::sip::SipHasher::default();
    let mut newest_timestamp = 0u64;
    let mut result_files = Vec::default();

    while let Some(dir_path) = directories_to_check.pop() {
        let mut files = Vec::default();
        depot.enum_files_at_path(&dir_path, &mut |name| {
            files.push(name.to_string());
        });
        files.sort();

        for file in files {
            if !extensions.is_empty() {
                let valid_ext = kiln_base::depot_path::extension(&file)
                    .map(|file_ext| {
                        extensions.iter().any(|ext| file_ext.eq_ignore_ascii_case(ext))
                    })
                    .unwrap_or(false);

                if !valid_ext {
                    continue;
                }
            }

            name_hasher.write(file.as_bytes());

            let full_path = kiln_base::depot_path::join(&dir_path, &file);
            if let Some(info) = depot.query_file_info(&full_path) {
                result_files.push(full_path);
                if info.timestamp > newest_timestamp {
                    newest_timestamp = info.timestamp;
                }
            }
        }

        if recurse {
            let mut dirs = Vec::default();
            depot.enum_directories_at_path(&dir_path, &mut |name| {
                dirs.push(name.to_string());
            });
            dirs.sort();

            for sub_dir in dirs {
                name_hasher.write(sub_dir.as_bytes());
                directories_to_check.push(format!("{}{}/", dir_path, sub_dir));
            }
        }
    }

    DirectoryListing {
        files: result_files,
        names_hash: name_hasher.finish(),
        newest_timestamp,
    }
}

/// Builds the synthetic dependency path recorded for a directory listing:
/// "textures/faces/*.png;tga" (non-recursive) or "textures/faces/**.png;tga"
/// (recursive), "textures/faces/*" when unfiltered.
pub fn directory_listing_path(
    dir: &str,
    recurse: bool,
    extension_filter: &str,
) -> String {
    let stars = if recurse { "**" } else { "*" };
    if extension_filter.is_empty() {
        format!("{}{}", dir, stars)
    } else {
        format!("{}{}.{}", dir, stars, extension_filter)
    }
}

/// Inverse of `directory_listing_path`. Returns (dir, recurse, extension
/// filter).
pub fn parse_directory_listing_path(path: &str) -> Option<(&str, bool, &str)> {
    let star_index = path.find('*')?;
    let (dir, pattern) = path.split_at(star_index);

    let (recurse, rest) = if let Some(rest) = pattern.strip_prefix("**") {
        (true, rest)
    } else {
        (false, &pattern[1..])
    };

    let filter = rest.strip_prefix('.').unwrap_or(rest);
    Some((dir, recurse, filter))
}

pub fn split_extension_filter(filter: &str) -> Vec<&str> {
    filter.split(';').filter(|ext| !ext.is_empty()).collect()
}

//
// Filesystem-backed depot
//

struct FilesystemMount {
    prefix: String,
    root: PathBuf,
}

/// Depot implementation over one or more local directories. Timestamps are
/// modification times in nanoseconds since the unix epoch; content hashes
/// are computed on demand.
pub struct FilesystemDepot {
    mounts: Vec<FilesystemMount>,
}

impl FilesystemDepot {
    pub fn new() -> Self {
        FilesystemDepot {
            mounts: Vec::default(),
        }
    }

    /// Attaches `root` under `prefix` ("" for the depot root, otherwise
    /// a path ending with '/'). Longest prefix wins on lookup.
    pub fn add_mount<T: Into<String>>(
        &mut self,
        prefix: T,
        root: &Path,
    ) {
        let prefix = prefix.into();
        assert!(prefix.is_empty() || prefix.ends_with('/'));
        self.mounts.push(FilesystemMount {
            prefix,
            root: root.to_path_buf(),
        });
        // Keep longest prefixes first so resolution finds the most specific
        // mount
        self.mounts
            .sort_by(|a, b| b.prefix.len().cmp(&a.prefix.len()));
    }

    fn resolve(
        &self,
        path: &str,
    ) -> Option<(&FilesystemMount, PathBuf)> {
        for mount in &self.mounts {
            if let Some(relative) = path.strip_prefix(mount.prefix.as_str()) {
                let mut resolved = mount.root.clone();
                for segment in relative.split('/').filter(|s| !s.is_empty()) {
                    resolved.push(segment);
                }
                return Some((mount, resolved));
            }
        }
        None
    }

    fn timestamp_of(metadata: &std::fs::Metadata) -> u64 {
        metadata
            .modified()
            .ok()
            .and_then(|time| time.duration_since(SystemTime::UNIX_EPOCH).ok())
            .map(|duration| duration.as_nanos() as u64)
            .unwrap_or(0)
    }
}

impl Depot for FilesystemDepot {
    fn query_file_mount_point(
        &self,
        path: &str,
    ) -> Option<MountPoint> {
        self.resolve(path)
            .map(|(mount, _)| MountPoint::new(mount.prefix.clone()))
    }

    fn query_file_info(
        &self,
        path: &str,
    ) -> Option<DepotFileInfo> {
        let (_, resolved) = self.resolve(path)?;
        let metadata = std::fs::metadata(resolved).ok()?;
        if !metadata.is_file() {
            return None;
        }

        Some(DepotFileInfo {
            size: metadata.len(),
            timestamp: Self::timestamp_of(&metadata),
        })
    }

    fn query_file_content_hash(
        &self,
        path: &str,
    ) -> Option<u64> {
        let (_, resolved) = self.resolve(path)?;
        let data = std::fs::read(resolved).ok()?;
        Some(hash_file_contents(&data))
    }

    fn enum_files_at_path(
        &self,
        dir: &str,
        callback: &mut dyn FnMut(&str),
    ) {
        debug_assert!(dir.is_empty() || dir.ends_with('/'));
        for mount in &self.mounts {
            if let Some(relative) = dir.strip_prefix(mount.prefix.as_str()) {
                let mut resolved = mount.root.clone();
                for segment in relative.split('/').filter(|s| !s.is_empty()) {
                    resolved.push(segment);
                }

                let Ok(entries) = std::fs::read_dir(resolved) else {
                    continue;
                };

                for entry in entries.flatten() {
                    if entry.file_type().map(|t| t.is_file()).unwrap_or(false) {
                        if let Some(name) = entry.file_name().to_str() {
                            callback(name);
                        }
                    }
                }
            }
        }
    }

    fn enum_directories_at_path(
        &self,
        dir: &str,
        callback: &mut dyn FnMut(&str),
    ) {
        debug_assert!(dir.is_empty() || dir.ends_with('/'));
        for mount in &self.mounts {
            if let Some(relative) = dir.strip_prefix(mount.prefix.as_str()) {
                let mut resolved = mount.root.clone();
                for segment in relative.split('/').filter(|s| !s.is_empty()) {
                    resolved.push(segment);
                }

                let Ok(entries) = std::fs::read_dir(resolved) else {
                    continue;
                };

                for entry in entries.flatten() {
                    if entry.file_type().map(|t| t.is_dir()).unwrap_or(false) {
                        if let Some(name) = entry.file_name().to_str() {
                            callback(name);
                        }
                    }
                }
            } else if let Some(rest) = mount.prefix.strip_prefix(dir) {
                // A mount deeper than this directory surfaces as a
                // subdirectory, so recursive scans descend into every mount
                if let Some(first_segment) = rest.split('/').find(|s| !s.is_empty()) {
                    callback(first_segment);
                }
            }
        }
    }

    fn create_file_reader(
        &self,
        path: &str,
    ) -> Option<Box<dyn Read + Send>> {
        let (_, resolved) = self.resolve(path)?;
        let file = std::fs::File::open(resolved).ok()?;
        Some(Box::new(file))
    }

    fn store_file_content(
        &self,
        path: &str,
        data: &[u8],
    ) -> bool {
        let Some((_, resolved)) = self.resolve(path) else {
            return false;
        };

        if let Some(parent) = resolved.parent() {
            if std::fs::create_dir_all(parent).is_err() {
                return false;
            }
        }

        std::fs::write(resolved, data).is_ok()
    }
}
