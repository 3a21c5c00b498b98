//! Persona catalog
//!
//! Personas are loaded once at startup from a TOML or JSON file and are
//! read-only afterwards, so one catalog can be shared across sessions behind
//! an `Arc` without locking.

use serde::Deserialize;
use std::collections::HashSet;
use std::fs;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("invalid persona source: {0}")]
    Config(String),
    #[error("persona not found: {0}")]
    NotFound(String),
}

/// A named character definition
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Persona {
    name: String,
    style: String,
    avatar: Option<String>,
}

impl Persona {
    pub fn new(
        name: impl Into<String>,
        style: impl Into<String>,
        avatar: Option<String>,
    ) -> Result<Self, CatalogError> {
        Self::from_record(
            PersonaRecord {
                name: Some(name.into()),
                style: Some(style.into()),
                avatar,
            },
            0,
        )
    }

    fn from_record(record: PersonaRecord, index: usize) -> Result<Self, CatalogError> {
        Ok(Self {
            name: required(record.name, "name", index)?,
            style: required(record.style, "style", index)?,
            avatar: record.avatar.filter(|a| !a.trim().is_empty()),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Free-form character instructions, embedded verbatim in the system prompt.
    pub fn style(&self) -> &str {
        &self.style
    }

    pub fn avatar(&self) -> Option<&str> {
        self.avatar.as_deref()
    }
}

/// Raw record as it appears in a persona file, before validation.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PersonaRecord {
    pub name: Option<String>,
    pub style: Option<String>,
    pub avatar: Option<String>,
}

#[derive(Deserialize)]
struct TomlPersonaFile {
    #[serde(default)]
    persona: Vec<PersonaRecord>,
}

#[derive(Debug, Clone)]
pub struct PersonaCatalog {
    personas: Vec<Persona>,
}

impl PersonaCatalog {
    /// Load personas from a `.toml` (`[[persona]]` tables) or `.json`
    /// (top-level array) file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, CatalogError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .map_err(|e| CatalogError::Config(format!("cannot read {}: {}", path.display(), e)))?;

        let extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.to_ascii_lowercase());

        let records = match extension.as_deref() {
            Some("toml") => Self::parse_toml(&content)?,
            Some("json") => Self::parse_json(&content)?,
            _ => {
                return Err(CatalogError::Config(format!(
                    "unsupported persona file {} (expected .toml or .json)",
                    path.display()
                )))
            }
        };

        let catalog = Self::from_records(records)?;
        tracing::info!(
            path = %path.display(),
            count = catalog.len(),
            "loaded persona catalog"
        );
        Ok(catalog)
    }

    pub fn parse_toml(content: &str) -> Result<Vec<PersonaRecord>, CatalogError> {
        let file: TomlPersonaFile =
            toml::from_str(content).map_err(|e| CatalogError::Config(e.to_string()))?;
        Ok(file.persona)
    }

    pub fn parse_json(content: &str) -> Result<Vec<PersonaRecord>, CatalogError> {
        serde_json::from_str(content).map_err(|e| CatalogError::Config(e.to_string()))
    }

    /// Validate raw records into a catalog, keeping source order.
    pub fn from_records(records: Vec<PersonaRecord>) -> Result<Self, CatalogError> {
        if records.is_empty() {
            return Err(CatalogError::Config("no personas defined".to_string()));
        }

        let mut seen = HashSet::new();
        let mut personas = Vec::with_capacity(records.len());

        for (index, record) in records.into_iter().enumerate() {
            let persona = Persona::from_record(record, index)?;

            if !seen.insert(persona.name.clone()) {
                return Err(CatalogError::Config(format!(
                    "duplicate persona name '{}'",
                    persona.name
                )));
            }

            personas.push(persona);
        }

        Ok(Self { personas })
    }

    pub fn lookup(&self, name: &str) -> Result<&Persona, CatalogError> {
        self.personas
            .iter()
            .find(|p| p.name == name)
            .ok_or_else(|| CatalogError::NotFound(name.to_string()))
    }

    pub fn position(&self, name: &str) -> Option<usize> {
        self.personas.iter().position(|p| p.name == name)
    }

    /// Personas in source order.
    pub fn list(&self) -> &[Persona] {
        &self.personas
    }

    pub fn get(&self, index: usize) -> Option<&Persona> {
        self.personas.get(index)
    }

    pub fn first(&self) -> Option<&Persona> {
        self.personas.first()
    }

    pub fn len(&self) -> usize {
        self.personas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.personas.is_empty()
    }
}

fn required(value: Option<String>, field: &str, index: usize) -> Result<String, CatalogError> {
    match value {
        Some(v) if !v.trim().is_empty() => Ok(v),
        Some(_) => Err(CatalogError::Config(format!(
            "persona #{} has an empty '{}'",
            index + 1,
            field
        ))),
        None => Err(CatalogError::Config(format!(
            "persona #{} is missing '{}'",
            index + 1,
            field
        ))),
    }
}
