use crate::definition::{Artifact, ArtifactSource, Verification};
use crate::engine::EngineSettings;
use hex::ToHex;
use reqwest::Client;
use ring::digest::{Context, SHA256};
use std::fmt::{Display, Formatter};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncReadExt, AsyncWriteExt};

#[derive(Debug)]
pub struct Fetcher {
    settings: Arc<EngineSettings>,
    http_client: Client,
}

#[derive(Debug)]
pub struct FetchedArtifact<'a> {
    pub artifact: &'a Artifact,
    pub path: PathBuf,
}

/// Failures of the fetch/extract half of the pipeline. All of them abort the
/// run; nothing is retried.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("transfer failed for {url}")]
    Network {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("verification failed ({}) with {affected} file", format_hashes(.hashes))]
    Verification {
        hashes: Vec<FailedHash>,
        affected: FetchAffected,
    },

    #[error("couldn't guess archive type of {}", .0.display())]
    UnknownArchive(PathBuf),

    #[error("extraction failed for {}: {message}", .path.display())]
    ExtractionFailed { path: PathBuf, message: String },

    #[error("cannot clear {} for the canonical source tree", .path.display())]
    FilesystemConflict {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[derive(Debug)]
pub struct FailedHash {
    algo: &'static str,
    found: Box<[u8]>,
    expected: Box<[u8]>,
}

fn format_hashes(hashes: &[FailedHash]) -> String {
    let mut out = String::new();
    for (
        idx,
        FailedHash {
            algo,
            found,
            expected,
        },
    ) in hashes.iter().enumerate()
    {
        if idx > 0 {
            out.push_str(", ");
        }

        out.push_str(&format!(
            "{} expected {} but found {}",
            algo,
            hex::encode(expected),
            hex::encode(found)
        ));
    }
    out
}

#[derive(Debug)]
pub enum FetchAffected {
    Fetched,
    Cache(PathBuf),
}

impl Display for FetchAffected {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            FetchAffected::Fetched => write!(f, "fetched"),
            FetchAffected::Cache(p) => write!(f, "cached ({})", p.display()),
        }
    }
}

pub struct DigestPool<'a> {
    pool: Vec<(Context, &'a [u8], &'static str)>,
}

impl DigestPool<'_> {
    pub fn from_verification(verification: &Verification) -> DigestPool {
        let mut pool = vec![];

        if let Some(sha) = &verification.sha256 {
            pool.push((Context::new(&SHA256), &sha[..], "sha256"));
        }

        DigestPool { pool }
    }

    pub fn update(&mut self, data: &[u8]) {
        for (ctx, _, _) in &mut self.pool {
            ctx.update(data);
        }
    }

    pub fn finish(self) -> Result<(), Vec<FailedHash>> {
        let mut failed_hash = vec![];

        for (ctx, comp, algo) in self.pool {
            let dig = ctx.finish();
            if dig.as_ref() != comp {
                failed_hash.push(FailedHash {
                    algo,
                    found: Box::from(dig.as_ref()),
                    expected: Box::from(comp),
                });
            }
        }

        if failed_hash.is_empty() {
            Ok(())
        } else {
            Err(failed_hash)
        }
    }
}

impl Fetcher {
    pub fn new(settings: Arc<EngineSettings>) -> Self {
        Fetcher {
            settings,
            http_client: Client::new(),
        }
    }

    /// Downloads an artifact into the content-addressed cache, or reuses the
    /// cached file when it still verifies.
    pub async fn fetch<'a>(&self, artifact: &'a Artifact) -> Result<FetchedArtifact<'a>, FetchError> {
        let path = self.create_artifact_path(artifact);
        if tokio::fs::metadata(&path)
            .await
            .map(|_| true)
            .or_else(|e| {
                if e.kind() == ErrorKind::NotFound {
                    Ok(false)
                } else {
                    Err(e)
                }
            })?
        {
            return if let Err(hashes) = self
                .verify_file(path.as_path(), &artifact.verification)
                .await?
            {
                Err(FetchError::Verification {
                    hashes,
                    affected: FetchAffected::Cache(path),
                })
            } else {
                Ok(FetchedArtifact { artifact, path })
            };
        };

        match &artifact.source {
            ArtifactSource::Fetch(fetch) => {
                let network = |source| FetchError::Network {
                    url: fetch.url.clone(),
                    source,
                };

                let req = self.http_client.get(&fetch.url).build().map_err(network)?;
                let mut resp = self.http_client.execute(req).await.map_err(network)?;

                let mut f = File::create(&path).await?;
                let mut pool = DigestPool::from_verification(&artifact.verification);

                loop {
                    // a failed transfer must not leave a partial file in the cache
                    let chunk = match resp.chunk().await {
                        Ok(Some(chunk)) => chunk,
                        Ok(None) => break,
                        Err(source) => {
                            drop(f);
                            tokio::fs::remove_file(&path).await?;
                            return Err(network(source));
                        }
                    };

                    pool.update(&chunk);
                    f.write_all(&chunk).await?;
                }

                if let Err(hashes) = pool.finish() {
                    drop(f);
                    tokio::fs::remove_file(&path).await?;

                    return Err(FetchError::Verification {
                        hashes,
                        affected: FetchAffected::Fetched,
                    });
                }

                f.sync_all().await?;

                Ok(FetchedArtifact { artifact, path })
            }
        }
    }

    fn create_artifact_path(&self, artifact: &Artifact) -> PathBuf {
        let name = artifact.file_name();
        let hash = artifact.hash_id();
        let file_name = format!("{}-{}", hash.encode_hex::<String>(), name);

        self.settings.cache_path().join(file_name)
    }

    pub async fn verify_file(
        &self,
        path: &Path,
        verification: &Verification,
    ) -> Result<Result<(), Vec<FailedHash>>, FetchError> {
        let mut file = OpenOptions::new()
            .read(true)
            .create(false)
            .write(false)
            .open(path)
            .await?;

        let mut pool = DigestPool::from_verification(verification);
        let mut buffer = vec![0; 4096];

        loop {
            let r = file.read(&mut buffer).await?;
            if r == 0 {
                break;
            }

            pool.update(&buffer[..r]);
        }

        Ok(pool.finish())
    }
}
