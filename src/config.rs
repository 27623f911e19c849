//! JSON persistence shared by every agent configuration.

use std::fs;
use std::path::Path;

use log::info;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::Result;

/// A configuration that can be written to and read back from a JSON file.
pub trait JsonConfig: Serialize + DeserializeOwned {
    fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        info!("saved config to {}", path.display());
        Ok(())
    }

    fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let json = fs::read_to_string(path)?;
        let config = serde_json::from_str(&json)?;
        info!("loaded config from {}", path.display());
        Ok(config)
    }
}

/// RNG seeded from `seed`, or from entropy when unset.
pub(crate) fn seeded_rng(seed: Option<u64>) -> rand::rngs::StdRng {
    use rand::SeedableRng;
    match seed {
        Some(seed) => rand::rngs::StdRng::seed_from_u64(seed),
        None => rand::rngs::StdRng::from_entropy(),
    }
}
