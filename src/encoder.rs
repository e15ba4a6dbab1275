//! File-writing [`ProductEncoder`]: one pretty-printed JSON document per tile
//! under `<output_dir>/<dataset>/<tile id>.json`.

use crate::error::EncodeError;
use crate::scheduler::{ProductEncoder, TileProduct};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Clone, Debug)]
pub struct JsonProductEncoder {
    output_dir: PathBuf,
}

impl JsonProductEncoder {
    pub fn new<P: AsRef<Path>>(output_dir: P) -> Self {
        Self {
            output_dir: output_dir.as_ref().to_path_buf(),
        }
    }

    pub fn path_for(&self, product: &TileProduct) -> PathBuf {
        self.output_dir
            .join(&product.dataset)
            .join(format!("{}.json", product.tile))
    }
}

impl ProductEncoder for JsonProductEncoder {
    fn encode(&self, product: &TileProduct) -> Result<(), EncodeError> {
        let path = self.path_for(product);
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir).map_err(|source| EncodeError::Io {
                path: dir.to_path_buf(),
                source,
            })?;
        }
        let contents = serde_json::to_string_pretty(product)?;
        fs::write(&path, contents).map_err(|source| EncodeError::Io { path, source })
    }
}
