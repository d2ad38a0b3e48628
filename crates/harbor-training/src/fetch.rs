//! Staging of user code into the code directory.

use crate::error::{TrainingError, TrainingResult};
use crate::install::{InstallPolicy, Installer};
use crate::storage::{ObjectStore, is_object_url};
use flate2::read::GzDecoder;
use harbor_core::environment::dir_has_entries;
use std::fs::File;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

const ARCHIVE_FILE: &str = "code.tar.gz";

/// Where user code comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Locator {
    /// A `.tar.gz` archive in object storage.
    Object(String),
    /// A local directory tree.
    Directory(PathBuf),
    /// A single local file.
    File(PathBuf),
}

impl Locator {
    pub fn parse(locator: &str) -> TrainingResult<Self> {
        let locator = locator.trim();
        if locator.is_empty() {
            return Err(TrainingError::InvalidLocator("empty code locator".to_string()));
        }
        if is_object_url(locator) {
            return Ok(Self::Object(locator.to_string()));
        }
        let path = PathBuf::from(locator);
        if path.is_dir() {
            Ok(Self::Directory(path))
        } else if path.is_file() {
            Ok(Self::File(path))
        } else {
            Err(TrainingError::InvalidLocator(format!(
                "{locator} is neither an object URL nor an existing path"
            )))
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchOutcome {
    Fetched,
    /// The destination already had content; nothing was fetched.
    AlreadyPresent,
}

/// Stages the code at `locator` into `dst`.
///
/// A non-empty `dst` counts as already staged. Temporary download space is
/// removed on every path out of this function.
pub async fn fetch(
    name: &str,
    locator: &Locator,
    dst: &Path,
    store: &dyn ObjectStore,
) -> TrainingResult<FetchOutcome> {
    if dir_has_entries(dst) {
        tracing::info!(dst = %dst.display(), "code directory is not empty, skipping fetch");
        return Ok(FetchOutcome::AlreadyPresent);
    }

    match locator {
        Locator::Object(url) => {
            let tmp = tempfile::tempdir()?;
            let archive = tmp.path().join(ARCHIVE_FILE);
            store.download(url, &archive).await?;

            let dst = dst.to_path_buf();
            tokio::task::spawn_blocking(move || extract_tar_gz(&archive, &dst))
                .await
                .map_err(|e| TrainingError::Io(std::io::Error::other(e)))??;
        }
        Locator::Directory(src) => {
            if dst.exists() {
                std::fs::remove_dir_all(dst)?;
            }
            copy_dir_all(src, dst)?;
        }
        Locator::File(src) => {
            std::fs::create_dir_all(dst)?;
            std::fs::copy(src, dst.join(name))?;
        }
    }
    tracing::info!(?locator, dst = %dst.display(), "fetched user code");
    Ok(FetchOutcome::Fetched)
}

/// Stages and installs user code.
///
/// An empty `locator` means the code was baked into `dst` ahead of time; only
/// the install step runs.
pub async fn fetch_and_install(
    name: &str,
    locator: &str,
    dst: &Path,
    store: &dyn ObjectStore,
    installer: &Installer,
    policy: InstallPolicy,
) -> TrainingResult<FetchOutcome> {
    let outcome = if locator.trim().is_empty() {
        tracing::info!(dst = %dst.display(), "no code locator configured, using pre-staged code");
        std::fs::create_dir_all(dst)?;
        FetchOutcome::AlreadyPresent
    } else {
        fetch(name, &Locator::parse(locator)?, dst, store).await?
    };
    installer.install(name, dst, policy).await?;
    Ok(outcome)
}

/// Unpacks a gzip-compressed tarball into `dst`.
pub fn extract_tar_gz(archive: &Path, dst: &Path) -> TrainingResult<()> {
    let extract_err = |source| TrainingError::Extract { path: archive.to_path_buf(), source };
    std::fs::create_dir_all(dst)?;
    let file = File::open(archive).map_err(extract_err)?;
    tar::Archive::new(GzDecoder::new(file)).unpack(dst).map_err(extract_err)
}

/// Recursively copies `src` into `dst`.
pub fn copy_dir_all(src: &Path, dst: &Path) -> std::io::Result<()> {
    std::fs::create_dir_all(dst)?;
    for entry in WalkDir::new(src).min_depth(1) {
        let entry = entry.map_err(std::io::Error::other)?;
        let relative = entry.path().strip_prefix(src).map_err(std::io::Error::other)?;
        let target = dst.join(relative);
        if entry.file_type().is_dir() {
            std::fs::create_dir_all(&target)?;
        } else {
            std::fs::copy(entry.path(), &target)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use flate2::Compression;
    use flate2::write::GzEncoder;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Serves one tarball built from a directory.
    struct DirArchiveStore {
        source: PathBuf,
        downloads: AtomicUsize,
    }

    impl DirArchiveStore {
        fn new(source: &Path) -> Self {
            Self { source: source.to_path_buf(), downloads: AtomicUsize::new(0) }
        }
    }

    #[async_trait]
    impl ObjectStore for DirArchiveStore {
        async fn download(&self, _url: &str, dest: &Path) -> TrainingResult<()> {
            self.downloads.fetch_add(1, Ordering::SeqCst);
            let file = File::create(dest)?;
            let mut builder = tar::Builder::new(GzEncoder::new(file, Compression::default()));
            builder.append_dir_all(".", &self.source)?;
            builder.into_inner()?.finish()?;
            Ok(())
        }
    }

    fn source_tree() -> tempfile::TempDir {
        let src = tempfile::tempdir().unwrap();
        std::fs::write(src.path().join("train.py"), "print('hi')\n").unwrap();
        std::fs::create_dir_all(src.path().join("lib")).unwrap();
        std::fs::write(src.path().join("lib/util.py"), "X = 1\n").unwrap();
        src
    }

    #[tokio::test]
    async fn test_fetch_object_extracts_archive_once() {
        let src = source_tree();
        let dst = tempfile::tempdir().unwrap();
        let code = dst.path().join("code");
        let store = DirArchiveStore::new(src.path());
        let locator = Locator::parse("s3://bucket/sourcedir.tar.gz").unwrap();

        let first = fetch("train.py", &locator, &code, &store).await.unwrap();
        assert_eq!(first, FetchOutcome::Fetched);
        assert!(code.join("train.py").is_file());
        assert!(code.join("lib/util.py").is_file());

        let second = fetch("train.py", &locator, &code, &store).await.unwrap();
        assert_eq!(second, FetchOutcome::AlreadyPresent);
        assert_eq!(store.downloads.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_fetch_directory_and_file() {
        let src = source_tree();
        let dst = tempfile::tempdir().unwrap();
        let store = DirArchiveStore::new(src.path());

        let copied = dst.path().join("copied");
        std::fs::create_dir_all(&copied).unwrap();
        let locator = Locator::parse(src.path().to_str().unwrap()).unwrap();
        assert!(matches!(locator, Locator::Directory(_)));
        fetch("train.py", &locator, &copied, &store).await.unwrap();
        assert!(copied.join("lib/util.py").is_file());

        let single = dst.path().join("single");
        let locator = Locator::parse(src.path().join("train.py").to_str().unwrap()).unwrap();
        fetch("entry.py", &locator, &single, &store).await.unwrap();
        assert!(single.join("entry.py").is_file());
        assert_eq!(store.downloads.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_locator_errors() {
        for bad in ["", "/no/such/harbor/path"] {
            assert!(matches!(Locator::parse(bad), Err(TrainingError::InvalidLocator(_))));
        }
    }

    #[test]
    fn test_corrupt_archive_is_extract_error() {
        let temp = tempfile::tempdir().unwrap();
        let archive = temp.path().join("bad.tar.gz");
        std::fs::write(&archive, b"not a tarball").unwrap();
        let err = extract_tar_gz(&archive, &temp.path().join("out")).unwrap_err();
        assert!(matches!(err, TrainingError::Extract { .. }));
    }

    #[tokio::test]
    async fn test_fetch_and_install_with_pre_staged_code() {
        let temp = tempfile::tempdir().unwrap();
        let store = DirArchiveStore::new(temp.path());
        let code = temp.path().join("code");
        let installer = Installer::default();
        let outcome = fetch_and_install("train", "", &code, &store, &installer, InstallPolicy::Auto)
            .await
            .unwrap();
        assert_eq!(outcome, FetchOutcome::AlreadyPresent);
        assert!(temp.path().join("code").is_dir());
    }
}
