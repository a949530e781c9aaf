use crate::engine::fetcher::{FetchError, FetchedArtifact};
use crate::engine::EngineSettings;
use crate::Recipe;
use async_compression::tokio::bufread::{BzDecoder, GzipDecoder, XzDecoder};
use std::ffi::OsStr;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncBufRead, AsyncRead, ReadBuf};

#[derive(Debug)]
pub struct Extractor {
    settings: Arc<EngineSettings>,
}

#[derive(Debug, Eq, PartialEq, Copy, Clone)]
enum Archive {
    Zip,
    Tar,
}

#[derive(Debug, Eq, PartialEq, Copy, Clone)]
enum Compression {
    None,
    Gzip,
    Xz,
    Bz,
}

const GUESSES: &[(&str, Archive, Compression)] = &[
    (".tar.gz", Archive::Tar, Compression::Gzip),
    (".tar.xz", Archive::Tar, Compression::Xz),
    (".tar.bz", Archive::Tar, Compression::Bz),
    (".tar", Archive::Tar, Compression::None),
    (".zip", Archive::Zip, Compression::None),
];

enum Decompressor<R: AsyncBufRead> {
    PassThrough(R),
    Xz(XzDecoder<R>),
    Gzip(GzipDecoder<R>),
    Bz(BzDecoder<R>),
}

impl<R: AsyncBufRead + Unpin> AsyncRead for Decompressor<R> {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        match &mut *self {
            Decompressor::PassThrough(r) => AsyncRead::poll_read(Pin::new(r), cx, buf),
            Decompressor::Xz(r) => AsyncRead::poll_read(Pin::new(r), cx, buf),
            Decompressor::Gzip(r) => AsyncRead::poll_read(Pin::new(r), cx, buf),
            Decompressor::Bz(r) => AsyncRead::poll_read(Pin::new(r), cx, buf),
        }
    }
}

impl Extractor {
    pub fn new(settings: Arc<EngineSettings>) -> Self {
        Extractor { settings }
    }

    /// Unpacks an archive into the recipe's staging area.
    pub async fn extract<'a>(
        &self,
        artifact: &FetchedArtifact<'a>,
        recipe: &Recipe,
    ) -> Result<(), FetchError> {
        let path = self.settings.source_path_for_recipe(recipe);
        tokio::fs::create_dir_all(&path).await?;

        let found = GUESSES
            .iter()
            .filter_map(|(ext, arch, comp)| {
                if artifact
                    .path
                    .file_name()
                    .and_then(OsStr::to_str)
                    .map_or(false, |x| x.ends_with(*ext))
                {
                    Some((*arch, *comp))
                } else {
                    None
                }
            })
            .next();

        let (arch, compr) = match found {
            None => return Err(FetchError::UnknownArchive(artifact.path.clone())),
            Some(x) => x,
        };

        let read = OpenOptions::new()
            .read(true)
            .write(false)
            .create(false)
            .open(&artifact.path)
            .await?;

        let read = tokio::io::BufReader::new(read);
        let read = match compr {
            Compression::None => Decompressor::PassThrough(read),
            Compression::Gzip => Decompressor::Gzip(GzipDecoder::new(read)),
            Compression::Xz => Decompressor::Xz(XzDecoder::new(read)),
            Compression::Bz => Decompressor::Bz(BzDecoder::new(read)),
        };

        let broken = |e: String| FetchError::ExtractionFailed {
            path: artifact.path.clone(),
            message: e,
        };

        match arch {
            Archive::Zip => {
                let mut archive = async_zip::read::stream::ZipFileReader::new(read);
                while let Some(mut reader) = archive
                    .entry_reader()
                    .await
                    .map_err(|e| broken(e.to_string()))?
                {
                    let entry = reader.entry();
                    let child_path = path.join(entry.filename());

                    if let Some(p) = child_path.parent() {
                        tokio::fs::create_dir_all(p).await?;
                    }
                    let mut f = File::create(child_path).await?;
                    tokio::io::copy(&mut reader, &mut f).await?;
                    f.sync_all().await?;
                }
            }
            Archive::Tar => {
                let mut archive = tokio_tar::Archive::new(read);
                archive
                    .unpack(path)
                    .await
                    .map_err(|e| broken(e.to_string()))?;
            }
        }

        Ok(())
    }

    /// Renames the archive's top-level directory to the recipe's canonical
    /// source dir. A leftover tree from a previous run is removed first; a
    /// re-run never merges with stale state.
    pub async fn finalize(&self, recipe: &Recipe) -> Result<PathBuf, FetchError> {
        let staging = self.settings.source_path_for_recipe(recipe);
        let target = staging.join(&recipe.source_dir);

        let extracted = match &recipe.archive_root {
            Some(root) => staging.join(root),
            None => self.sole_extracted_dir(&staging, &recipe.source_dir).await?,
        };

        if extracted == target {
            return Ok(target);
        }

        match tokio::fs::remove_dir_all(&target).await {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => {
                return Err(FetchError::FilesystemConflict {
                    path: target,
                    source: e,
                })
            }
        }

        tokio::fs::rename(&extracted, &target)
            .await
            .map_err(|e| FetchError::FilesystemConflict {
                path: target.clone(),
                source: e,
            })?;

        Ok(target)
    }

    async fn sole_extracted_dir(
        &self,
        staging: &Path,
        canonical: &str,
    ) -> Result<PathBuf, FetchError> {
        let mut listing = tokio::fs::read_dir(staging).await?;
        let mut candidates = vec![];

        while let Some(entry) = listing.next_entry().await? {
            if entry.file_type().await?.is_dir() && entry.file_name() != canonical {
                candidates.push(entry.path());
            }
        }

        match candidates.len() {
            1 => Ok(candidates.remove(0)),
            n => Err(FetchError::ExtractionFailed {
                path: staging.to_path_buf(),
                message: format!("expected a single top-level directory, found {}", n),
            }),
        }
    }
}
