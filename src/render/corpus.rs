// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Template corpus loading and caching.

use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use tracing::{debug, info};
use walkdir::WalkDir;

use crate::error::{OperatorError, Result};

/// One logical component's set of templates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TemplateGroup {
    /// Core stack deployed on the hub
    Hub,
    /// Operator set shipped to every member cluster
    Addon,
}

impl TemplateGroup {
    fn dir_name(self) -> &'static str {
        match self {
            TemplateGroup::Hub => "hub",
            TemplateGroup::Addon => "addon",
        }
    }
}

impl fmt::Display for TemplateGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.dir_name())
    }
}

/// A single template document
#[derive(Debug, Clone)]
pub struct Template {
    /// Where the document came from, `file#index`
    pub source: String,
    pub body: Value,
}

/// Templates grouped by component, loaded on first use and kept for the
/// lifetime of the process.
#[derive(Debug)]
pub struct TemplateCorpus {
    root: PathBuf,
    cache: RwLock<HashMap<TemplateGroup, Arc<Vec<Template>>>>,
}

impl TemplateCorpus {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// A corpus whose groups are given up front and never read from disk
    pub fn from_documents(groups: impl IntoIterator<Item = (TemplateGroup, Vec<(&'static str, &'static str)>)>) -> Result<Self> {
        let mut cache = HashMap::new();
        for (group, files) in groups {
            let mut templates = Vec::new();
            for (name, text) in files {
                templates.extend(parse_documents(name, text)?);
            }
            cache.insert(group, Arc::new(templates));
        }
        Ok(Self {
            root: PathBuf::new(),
            cache: RwLock::new(cache),
        })
    }

    /// Templates of a group in stable path order
    pub fn group(&self, group: TemplateGroup) -> Result<Arc<Vec<Template>>> {
        if let Some(templates) = self.read_cache().get(&group) {
            return Ok(Arc::clone(templates));
        }

        let dir = self.root.join(group.dir_name());
        let templates = Arc::new(load_dir(&dir)?);
        info!("Loaded {} {} templates from {}", templates.len(), group, dir.display());

        let mut cache = self
            .cache
            .write()
            .map_err(|_| OperatorError::TemplateError("template cache poisoned".to_string()))?;
        Ok(Arc::clone(cache.entry(group).or_insert(templates)))
    }

    fn read_cache(&self) -> std::sync::RwLockReadGuard<'_, HashMap<TemplateGroup, Arc<Vec<Template>>>> {
        match self.cache.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

fn load_dir(dir: &Path) -> Result<Vec<Template>> {
    if !dir.is_dir() {
        return Err(OperatorError::TemplateError(format!(
            "template directory {} does not exist",
            dir.display()
        )));
    }

    let mut paths: Vec<PathBuf> = WalkDir::new(dir)
        .into_iter()
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| OperatorError::TemplateError(e.to_string()))?
        .into_iter()
        .map(|entry| entry.into_path())
        .filter(|p| p.is_file())
        .filter(|p| matches!(p.extension().and_then(|e| e.to_str()), Some("yaml" | "yml")))
        .collect();
    paths.sort();

    let mut templates = Vec::new();
    for path in paths {
        let text = std::fs::read_to_string(&path)
            .map_err(|e| OperatorError::TemplateError(format!("{}: {}", path.display(), e)))?;
        debug!("Parsing template {}", path.display());
        templates.extend(parse_documents(&path.display().to_string(), &text)?);
    }
    Ok(templates)
}

/// Split a multi-document YAML file into templates, skipping empty documents
fn parse_documents(source: &str, text: &str) -> Result<Vec<Template>> {
    let mut templates = Vec::new();
    for (index, document) in serde_yaml::Deserializer::from_str(text).enumerate() {
        let body = Value::deserialize(document)?;
        if body.is_null() {
            continue;
        }
        if !body.is_object() {
            return Err(OperatorError::TemplateError(format!(
                "{}#{} is not a mapping",
                source, index
            )));
        }
        templates.push(Template {
            source: format!("{}#{}", source, index),
            body,
        });
    }
    Ok(templates)
}
