use std::path::PathBuf;

use rowforge_types::Result;

/// Server configuration, environment only. `ROWFORGE_DATA_DIR` holds the
/// `uploads/` and `outputs/` subdirectories; both are created at startup.
#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub data_dir: PathBuf,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let port = std::env::var("ROWFORGE_PORT")
            .ok()
            .map(|v| v.parse())
            .transpose()?
            .unwrap_or(5000);
        let data_dir = std::env::var("ROWFORGE_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("data"));
        Ok(Config { port, data_dir })
    }

    pub fn upload_dir(&self) -> PathBuf {
        self.data_dir.join("uploads")
    }

    pub fn output_dir(&self) -> PathBuf {
        self.data_dir.join("outputs")
    }
}
