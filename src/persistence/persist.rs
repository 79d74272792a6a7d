use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use log::{info, warn};
use ron::ser::PrettyConfig;
use serde::{Deserialize, Serialize};
use time::macros::format_description;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::graph_utils::graph::{Edge, GraphSnapshot, Node};

/// On-disk form of one funnel project.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectFile {
    pub project_id: Uuid,
    pub name: String,
    pub graph: GraphSnapshot,
    // unix seconds, UTC
    #[serde(default)]
    pub saved_at: i64,
}

impl ProjectFile {
    pub fn new(project_id: Uuid, name: impl Into<String>, graph: GraphSnapshot) -> Self {
        Self { project_id, name: name.into(), graph, saved_at: 0 }
    }

    /// Build from what the editor hands to its save callback.
    pub fn from_parts(project_id: Uuid, name: &str, nodes: &[Node], edges: &[Edge]) -> Self {
        Self::new(project_id, name, GraphSnapshot { nodes: nodes.to_vec(), edges: edges.to_vec() })
    }
}

pub fn project_path(dir: &Path, project_id: Uuid) -> PathBuf {
    dir.join(format!("{}.ron", project_id))
}

pub fn versioned_path_now(dir: &Path, project_id: Uuid) -> PathBuf {
    let now = OffsetDateTime::now_utc();
    let fmt = format_description!("[year][month][day]_[hour][minute][second]");
    let stamp = now.format(fmt).unwrap_or_else(|_| "unknown".to_string());
    dir.join(format!("{}_{}.ron", project_id, stamp))
}

fn atomic_write(path: &Path, data: &[u8]) -> std::io::Result<()> {
    let tmp_path = path.with_extension("ron.tmp");
    {
        let mut f = File::create(&tmp_path)?;
        f.write_all(data)?;
        f.flush()?;
    }
    fs::rename(tmp_path, path)?;
    Ok(())
}

fn write_to(path: &Path, project: &ProjectFile) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut stamped = project.clone();
    stamped.saved_at = OffsetDateTime::now_utc().unix_timestamp();
    let pretty = PrettyConfig::new()
        .separate_tuple_members(true)
        .enumerate_arrays(true);
    let s = ron::ser::to_string_pretty(&stamped, pretty)?;
    atomic_write(path, s.as_bytes())?;
    Ok(())
}

pub fn save_project(dir: &Path, project: &ProjectFile) -> anyhow::Result<PathBuf> {
    let path = project_path(dir, project.project_id);
    write_to(&path, project)?;
    info!("saved project {} to {}", project.project_id, path.display());
    Ok(path)
}

/// Timestamped backup next to the main project file.
pub fn save_versioned(dir: &Path, project: &ProjectFile) -> anyhow::Result<PathBuf> {
    let path = versioned_path_now(dir, project.project_id);
    write_to(&path, project)?;
    Ok(path)
}

pub fn load_project(dir: &Path, project_id: Uuid) -> anyhow::Result<Option<ProjectFile>> {
    let path = project_path(dir, project_id);
    if !path.exists() {
        return Ok(None);
    }
    load_from_path(&path).map(Some)
}

pub fn load_from_path(path: &Path) -> anyhow::Result<ProjectFile> {
    let mut f = File::open(path)?;
    let mut buf = String::new();
    f.read_to_string(&mut buf)?;
    let project: ProjectFile = ron::from_str(&buf)?;
    Ok(project)
}

/// Main project files in `dir` (backups excluded), newest save first.
pub fn list_projects(dir: &Path) -> anyhow::Result<Vec<ProjectFile>> {
    let mut out: Vec<ProjectFile> = Vec::new();
    if dir.exists() {
        for e in fs::read_dir(dir)? {
            let p = e?.path();
            let is_project = p.extension().and_then(|s| s.to_str()) == Some("ron")
                && p.file_stem().and_then(|s| s.to_str()).is_some_and(|stem| Uuid::parse_str(stem).is_ok());
            if !is_project {
                continue;
            }
            match load_from_path(&p) {
                Ok(project) => out.push(project),
                Err(e) => warn!("skipping unreadable project {}: {}", p.display(), e),
            }
        }
    }
    out.sort_by(|a, b| b.saved_at.cmp(&a.saved_at));
    Ok(out)
}

/// Backups of one project, newest first.
pub fn list_versions(dir: &Path, project_id: Uuid) -> anyhow::Result<Vec<PathBuf>> {
    let prefix = format!("{}_", project_id);
    let mut entries: Vec<PathBuf> = Vec::new();
    if dir.exists() {
        for e in fs::read_dir(dir)? {
            let p = e?.path();
            if let Some(name) = p.file_name().and_then(|s| s.to_str())
                && name.starts_with(&prefix) && name.ends_with(".ron")
            {
                entries.push(p);
            }
        }
    }
    // sort descending by filename (timestamp)
    entries.sort();
    entries.reverse();
    Ok(entries)
}
