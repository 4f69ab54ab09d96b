use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use once_cell::sync::Lazy;
use serde::de::DeserializeOwned;
use serde::Deserialize;

static MANIFEST: Lazy<Manifest> = Lazy::new(|| {
    let raw = include_str!("../../../../fixtures/manifest.json");
    serde_json::from_str(raw).expect("fixtures manifest should parse")
});

#[derive(Debug, Deserialize)]
struct Manifest {
    #[serde(rename = "state-graphs")]
    state_graphs: HashMap<String, StateGraphEntry>,
    #[serde(rename = "blend-specs")]
    blend_specs: HashMap<String, String>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum StateGraphEntry {
    Path(String),
    Detailed {
        path: String,
        #[serde(default)]
        clips: Option<String>,
    },
}

impl StateGraphEntry {
    fn as_path(&self) -> &str {
        match self {
            StateGraphEntry::Path(path) => path,
            StateGraphEntry::Detailed { path, .. } => path,
        }
    }

    fn clips(&self) -> Option<&str> {
        match self {
            StateGraphEntry::Path(_) => None,
            StateGraphEntry::Detailed { clips, .. } => clips.as_deref(),
        }
    }
}

fn fixtures_root() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("../../../fixtures")
}

fn resolve_path(rel: &str) -> PathBuf {
    fixtures_root().join(rel)
}

fn read_to_string(rel: &str) -> Result<String> {
    let path = resolve_path(rel);
    fs::read_to_string(&path)
        .with_context(|| format!("failed to read fixture at {}", path.display()))
}

fn load_json<T: DeserializeOwned>(rel: &str) -> Result<T> {
    let text = read_to_string(rel)?;
    serde_json::from_str(&text).with_context(|| format!("failed to parse JSON fixture {rel}"))
}

fn lookup<'a, T>(map: &'a HashMap<String, T>, kind: &str, name: &str) -> Result<&'a T> {
    map.get(name)
        .ok_or_else(|| anyhow!("unknown {kind} fixture '{name}'"))
}

pub mod state_graphs {
    use super::*;

    pub fn keys() -> Vec<String> {
        MANIFEST.state_graphs.keys().cloned().collect()
    }

    pub fn json(name: &str) -> Result<String> {
        let entry = lookup(&MANIFEST.state_graphs, "state graph", name)?;
        read_to_string(entry.as_path())
    }

    pub fn load<T: DeserializeOwned>(name: &str) -> Result<T> {
        let entry = lookup(&MANIFEST.state_graphs, "state graph", name)?;
        super::load_json(entry.as_path())
    }

    pub fn path(name: &str) -> Result<PathBuf> {
        let entry = lookup(&MANIFEST.state_graphs, "state graph", name)?;
        Ok(resolve_path(entry.as_path()))
    }

    /// Clip table (`{ "source": { "length": .., "looping": .. } }`) shipped
    /// alongside the graph, if any.
    pub fn clips<T: DeserializeOwned>(name: &str) -> Result<Option<T>> {
        let entry = lookup(&MANIFEST.state_graphs, "state graph", name)?;
        match entry.clips() {
            Some(rel) => super::load_json(rel).map(Some),
            None => Ok(None),
        }
    }
}

pub mod blend_specs {
    use super::*;

    pub fn keys() -> Vec<String> {
        MANIFEST.blend_specs.keys().cloned().collect()
    }

    pub fn json(name: &str) -> Result<String> {
        let rel = lookup(&MANIFEST.blend_specs, "blend spec", name)?;
        read_to_string(rel)
    }

    pub fn load<T: DeserializeOwned>(name: &str) -> Result<T> {
        let rel = lookup(&MANIFEST.blend_specs, "blend spec", name)?;
        super::load_json(rel)
    }

    pub fn path(name: &str) -> Result<PathBuf> {
        let rel = lookup(&MANIFEST.blend_specs, "blend spec", name)?;
        Ok(resolve_path(rel))
    }
}
