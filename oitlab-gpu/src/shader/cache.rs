use crate::shader::{ShaderCompiler, ShaderError, ShaderRequest};
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use std::time::UNIX_EPOCH;

const INDEX_FILE: &str = "index.json";

#[derive(Debug, Default, Serialize, Deserialize)]
struct CacheIndex {
    entries: Vec<CacheEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct SourceStamp {
    path: PathBuf,
    modified_ns: u64,
}

#[derive(Debug, Serialize, Deserialize)]
struct CacheEntry {
    key: String,
    sources: Vec<SourceStamp>,
    blob: String,
}

/// On-disk cache in front of another compiler, keyed by (file, defines, stage). An entry is
/// only reused while the source file and everything it includes still have the modification
/// times they had when compiled.
/// Compilers that don't resolve their sources to files are passed through uncached.
pub struct CachedCompiler<C> {
    inner: C,
    dir: PathBuf,
    index: CacheIndex,
    hits: usize,
    misses: usize,
}

impl<C: ShaderCompiler> CachedCompiler<C> {
    pub fn open(inner: C, dir: impl Into<PathBuf>) -> Result<Self, ShaderError> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;

        let index_path = dir.join(INDEX_FILE);
        let index = if index_path.is_file() {
            match serde_json::from_slice(&fs::read(&index_path)?) {
                Ok(index) => index,
                Err(e) => {
                    warn!("Discarding shader cache at {}: {e}", dir.display());
                    CacheIndex::default()
                }
            }
        } else {
            CacheIndex::default()
        };

        Ok(Self {
            inner,
            dir,
            index,
            hits: 0,
            misses: 0,
        })
    }

    pub fn inner(&self) -> &C {
        &self.inner
    }

    pub fn hits(&self) -> usize {
        self.hits
    }

    pub fn misses(&self) -> usize {
        self.misses
    }

    fn save_index(&self) -> Result<(), ShaderError> {
        let json = serde_json::to_vec_pretty(&self.index)?;
        fs::write(self.dir.join(INDEX_FILE), json)?;
        Ok(())
    }

    fn lookup(&self, key: &str, sources: &[SourceStamp]) -> Option<Vec<u8>> {
        let entry = self.index.entries.iter().find(|entry| entry.key == key)?;
        if entry.sources != sources {
            debug!("Shader cache entry for {key} is stale");
            return None;
        }

        match fs::read(self.dir.join(&entry.blob)) {
            Ok(code) => Some(code),
            Err(e) => {
                warn!("Shader cache blob {} unreadable, recompiling: {e}", entry.blob);
                None
            }
        }
    }
}

fn stamp(path: PathBuf) -> Result<SourceStamp, ShaderError> {
    let modified = fs::metadata(&path)?.modified()?;
    let modified_ns = modified
        .duration_since(UNIX_EPOCH)
        .map(|duration| duration.as_nanos() as u64)
        .unwrap_or_default();
    Ok(SourceStamp { path, modified_ns })
}

impl<C: ShaderCompiler> ShaderCompiler for CachedCompiler<C> {
    fn compile(&mut self, request: &ShaderRequest) -> Result<Vec<u8>, ShaderError> {
        let Some(sources) = self.inner.sources(&request.file) else {
            return self.inner.compile(request);
        };

        let key = request.cache_key();
        let sources = sources.into_iter().map(stamp).collect::<Result<Vec<_>, _>>()?;
        if let Some(code) = self.lookup(&key, &sources) {
            self.hits += 1;
            return Ok(code);
        }

        let code = self.inner.compile(request)?;
        self.misses += 1;

        let next_blob = format!("{:08}.bin", self.index.entries.len());
        let blob = match self.index.entries.iter_mut().find(|entry| entry.key == key) {
            Some(entry) => {
                entry.sources = sources;
                entry.blob.clone()
            }
            None => {
                self.index.entries.push(CacheEntry {
                    key,
                    sources,
                    blob: next_blob.clone(),
                });
                next_blob
            }
        };

        fs::write(self.dir.join(blob), &code)?;
        self.save_index()?;
        Ok(code)
    }

    fn resolve(&self, file: &str) -> Option<PathBuf> {
        self.inner.resolve(file)
    }

    fn sources(&self, file: &str) -> Option<Vec<PathBuf>> {
        self.inner.sources(file)
    }
}
