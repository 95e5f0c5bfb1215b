use crate::model::Page;
use crate::token_index::TokenIndex;
use anyhow::{Context, Result};
use bincode;
use serde::{Deserialize, Serialize};
use std::fs::{create_dir_all, File};
use std::io::{BufReader, Read, Write};
use std::path::{Path, PathBuf};

pub const INDEX_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
pub struct MetaFile {
    pub page_count: usize,
    pub char_count: usize,
    pub missing_token_layers: Vec<usize>,
    pub created_at: String,
    pub version: u32,
}

impl MetaFile {
    pub fn describe(index: &TokenIndex, created_at: String) -> Self {
        Self {
            page_count: index.page_count(),
            char_count: index.char_len(),
            missing_token_layers: index.missing_token_layers().to_vec(),
            created_at,
            version: INDEX_VERSION,
        }
    }
}

pub struct IndexPaths {
    pub root: PathBuf,
}

impl IndexPaths {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self { root: root.as_ref().to_path_buf() }
    }
    fn token_index(&self) -> PathBuf { self.root.join("token_index.bin") }
    fn meta(&self) -> PathBuf { self.root.join("meta.json") }
}

/// Pages as delivered by the page/token supplier: a JSON array of `Page`.
pub fn load_pages<P: AsRef<Path>>(path: P) -> Result<Vec<Page>> {
    let path = path.as_ref();
    let f = File::open(path).with_context(|| format!("opening pages file {}", path.display()))?;
    let pages: Vec<Page> = serde_json::from_reader(BufReader::new(f))?;
    Ok(pages)
}

pub fn save_token_index(paths: &IndexPaths, index: &TokenIndex) -> Result<()> {
    create_dir_all(&paths.root)?;
    let mut f = File::create(paths.token_index())?;
    let bytes = bincode::serialize(index)?;
    f.write_all(&bytes)?;
    Ok(())
}

/// Refuses the index unless `meta.json` carries the current version.
pub fn load_token_index(paths: &IndexPaths) -> Result<TokenIndex> {
    load_meta(paths)?;
    let mut f = File::open(paths.token_index())?;
    let mut buf = Vec::new();
    f.read_to_end(&mut buf)?;
    let index = bincode::deserialize(&buf)?;
    Ok(index)
}

pub fn save_meta(paths: &IndexPaths, meta: &MetaFile) -> Result<()> {
    create_dir_all(&paths.root)?;
    let mut f = File::create(paths.meta())?;
    let json = serde_json::to_string_pretty(meta)?;
    f.write_all(json.as_bytes())?;
    Ok(())
}

pub fn load_meta(paths: &IndexPaths) -> Result<MetaFile> {
    let mut f = File::open(paths.meta())?;
    let mut buf = String::new();
    f.read_to_string(&mut buf)?;
    let meta: MetaFile = serde_json::from_str(&buf)?;
    if meta.version != INDEX_VERSION {
        anyhow::bail!("index version {} is not supported (expected {})", meta.version, INDEX_VERSION);
    }
    Ok(meta)
}
