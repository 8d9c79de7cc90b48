use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::PathBuf;
use std::time::SystemTime;

use directories::UserDirs;
use filetime::FileTime;

/// File sink used to materialize downloaded files.
///
/// At most one file is open at a time. `close` keeps the finished file;
/// `remove` deletes a partial one and is a no-op once the file was closed.
pub trait FileStorageHandler {
    /// Creates a new file for the given sender-supplied pathname and returns
    /// the path actually used. Only the portion after the last `/` is kept;
    /// name collisions are resolved by appending `-<n>` before the extension.
    fn open_file(&mut self, file_name: &str) -> io::Result<PathBuf>;

    /// Creates a new file with a synthetic name, for protocols that don't
    /// transfer any file information.
    fn open_unnamed_file(&mut self) -> io::Result<PathBuf>;

    fn append(&mut self, data: &[u8]) -> io::Result<()>;

    /// Truncates the open file to `size` bytes.
    fn set_current_size_to(&mut self, size: u64) -> io::Result<()>;

    /// Closes the open file, keeping it on disk.
    fn close(&mut self) -> io::Result<()>;

    /// Sets the modification time of the current file. Valid until the next
    /// `open_*` call, also after `close`.
    fn set_modified(&mut self, time: SystemTime) -> io::Result<()>;

    /// Deletes the currently open (partial) file.
    fn remove(&mut self) -> io::Result<()>;
}

fn strip_path(name: &str) -> &str {
    let name = &name[name.rfind('/').map_or(0, |pos| pos + 1)..];
    if name.is_empty() {
        "new_file"
    } else {
        name
    }
}

fn dedup_name(name: &str, exists: impl Fn(&str) -> bool) -> String {
    if !exists(name) {
        return name.to_string();
    }
    let (stem, ext) = match name.rfind('.') {
        // a '.' at position 0 is a hidden file, not an extension
        Some(pos) if pos > 0 => (&name[..pos], Some(&name[pos + 1..])),
        _ => (name, None),
    };
    let mut i = 1;
    loop {
        let candidate = match ext {
            Some(ext) => format!("{stem}-{i}.{ext}"),
            None => format!("{stem}-{i}"),
        };
        if !exists(&candidate) {
            return candidate;
        }
        i += 1;
    }
}

const UNNAMED_FILE: &str = "x_modem_transferred_file";

/// Writes downloads into a target directory on disk.
pub struct DiskStorageHandler {
    output_path: PathBuf,
    file: Option<File>,
    cur_path: Option<PathBuf>,
}

impl DiskStorageHandler {
    /// Uses the user's download directory as the target.
    pub fn new() -> io::Result<Self> {
        let Some(user_dirs) = UserDirs::new() else {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                "failed to get user directories",
            ));
        };
        let Some(dir) = user_dirs.download_dir() else {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                "failed to get user download directory",
            ));
        };
        Ok(Self::with_output_path(dir))
    }

    pub fn with_output_path(path: impl Into<PathBuf>) -> Self {
        Self {
            output_path: path.into(),
            file: None,
            cur_path: None,
        }
    }

    fn create(&mut self, name: &str) -> io::Result<PathBuf> {
        let name = dedup_name(name, |candidate| self.output_path.join(candidate).exists());
        let path = self.output_path.join(name);
        self.file = Some(File::create(&path)?);
        self.cur_path = Some(path.clone());
        Ok(path)
    }

    fn open(&mut self) -> io::Result<&mut File> {
        self.file
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "no open download file"))
    }
}

impl FileStorageHandler for DiskStorageHandler {
    fn open_file(&mut self, file_name: &str) -> io::Result<PathBuf> {
        let name = strip_path(file_name).to_string();
        self.create(&name)
    }

    fn open_unnamed_file(&mut self) -> io::Result<PathBuf> {
        self.create(UNNAMED_FILE)
    }

    fn append(&mut self, data: &[u8]) -> io::Result<()> {
        self.open()?.write_all(data)
    }

    fn set_current_size_to(&mut self, size: u64) -> io::Result<()> {
        self.open()?.set_len(size)
    }

    fn close(&mut self) -> io::Result<()> {
        self.file = None;
        Ok(())
    }

    fn set_modified(&mut self, time: SystemTime) -> io::Result<()> {
        let Some(path) = &self.cur_path else {
            return Ok(());
        };
        filetime::set_file_mtime(path, FileTime::from_system_time(time))
    }

    fn remove(&mut self) -> io::Result<()> {
        if self.file.take().is_some() {
            if let Some(path) = self.cur_path.take() {
                fs::remove_file(path)?;
            }
        }
        Ok(())
    }
}

/// In-memory storage for tests and hosts that keep downloads off disk.
#[derive(Default)]
pub struct TestStorageHandler {
    pub files: HashMap<String, Vec<u8>>,
    pub modified: HashMap<String, SystemTime>,
    cur_name: Option<String>,
    open: bool,
}

impl TestStorageHandler {
    pub fn new() -> Self {
        Self::default()
    }

    fn create(&mut self, name: &str) -> io::Result<PathBuf> {
        let name = dedup_name(name, |candidate| self.files.contains_key(candidate));
        self.files.insert(name.clone(), Vec::new());
        self.cur_name = Some(name.clone());
        self.open = true;
        Ok(PathBuf::from(name))
    }

    fn cur_file(&mut self) -> io::Result<&mut Vec<u8>> {
        match &self.cur_name {
            Some(name) if self.open => Ok(self.files.get_mut(name).expect("file was created")),
            _ => Err(io::Error::new(
                io::ErrorKind::NotConnected,
                "no open download file",
            )),
        }
    }
}

impl FileStorageHandler for TestStorageHandler {
    fn open_file(&mut self, file_name: &str) -> io::Result<PathBuf> {
        let name = strip_path(file_name).to_string();
        self.create(&name)
    }

    fn open_unnamed_file(&mut self) -> io::Result<PathBuf> {
        self.create(UNNAMED_FILE)
    }

    fn append(&mut self, data: &[u8]) -> io::Result<()> {
        self.cur_file()?.extend_from_slice(data);
        Ok(())
    }

    fn set_current_size_to(&mut self, size: u64) -> io::Result<()> {
        self.cur_file()?.truncate(size as usize);
        Ok(())
    }

    fn close(&mut self) -> io::Result<()> {
        self.open = false;
        Ok(())
    }

    fn set_modified(&mut self, time: SystemTime) -> io::Result<()> {
        if let Some(name) = &self.cur_name {
            self.modified.insert(name.clone(), time);
        }
        Ok(())
    }

    fn remove(&mut self) -> io::Result<()> {
        if self.open {
            if let Some(name) = self.cur_name.take() {
                self.files.remove(&name);
            }
            self.open = false;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use super::*;

    #[test]
    fn test_strip_path() {
        assert_eq!("foo.txt", strip_path("foo.txt"));
        assert_eq!("foo.txt", strip_path("subdir/foo.txt"));
        assert_eq!("foo.txt", strip_path("/a/b/foo.txt"));
        assert_eq!("new_file", strip_path(""));
        assert_eq!("new_file", strip_path("subdir/"));
    }

    #[test]
    fn test_dedup_name() {
        let taken = ["a.txt", "a-1.txt", "b", "b-1", ".hidden"];
        let exists = |name: &str| taken.contains(&name);
        assert_eq!("c.txt", dedup_name("c.txt", exists));
        assert_eq!("a-2.txt", dedup_name("a.txt", exists));
        assert_eq!("b-2", dedup_name("b", exists));
        // leading dot is part of the name, not an extension
        assert_eq!(".hidden-1", dedup_name(".hidden", exists));
    }

    #[test]
    fn test_disk_storage_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let mut storage = DiskStorageHandler::with_output_path(dir.path());

        let path = storage.open_file("sub/report.txt").unwrap();
        assert_eq!(Path::new("report.txt"), path.file_name().map(Path::new).unwrap());
        storage.append(b"hello world").unwrap();
        storage.set_current_size_to(5).unwrap();
        storage.close().unwrap();
        assert_eq!(b"hello".to_vec(), std::fs::read(&path).unwrap());

        // closed files survive remove()
        storage.remove().unwrap();
        assert!(path.exists());

        // same name again picks a -1 suffix
        let path2 = storage.open_file("report.txt").unwrap();
        assert_eq!(
            Path::new("report-1.txt"),
            path2.file_name().map(Path::new).unwrap()
        );
        storage.remove().unwrap();
        assert!(!path2.exists());
    }

    #[test]
    fn test_disk_storage_set_modified() {
        let dir = tempfile::tempdir().unwrap();
        let mut storage = DiskStorageHandler::with_output_path(dir.path());

        let stamp = SystemTime::UNIX_EPOCH + std::time::Duration::from_secs(499_162_500);
        let path = storage.open_file("dated").unwrap();
        storage.append(b"x").unwrap();
        storage.close().unwrap();
        storage.set_modified(stamp).unwrap();
        assert_eq!(stamp, std::fs::metadata(&path).unwrap().modified().unwrap());
    }

    #[test]
    fn test_test_storage_remove_partial() {
        let mut storage = TestStorageHandler::new();
        storage.open_file("part").unwrap();
        storage.append(b"1234").unwrap();
        storage.remove().unwrap();
        assert!(storage.files.is_empty());
    }
}
