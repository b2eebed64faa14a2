//! Schema registration, validation, and retrieval.
//!
//! A **schema** is a named JSON-Schema descriptor governing one entity
//! type. Schemas are first-class records: each is persisted as an entity
//! of type `"schema"` (WAL'd and replicated like any record) and cached
//! here in compiled form. A schema must exist before any entity of its
//! type can be inserted.
//!
//! # Operations
//!
//! All registry operations are available on [`RemDb`](crate::RemDb):
//!
//! - [`register_schema(tenant, def)`](crate::RemDb::register_schema)
//! - [`get_schema(tenant, name)`](crate::RemDb::get_schema)
//! - [`list_schemas_by_category(tenant, category)`](crate::RemDb::list_schemas_by_category)
//!
//! # Validation
//!
//! Registration compiles the JSON-Schema document once (including any
//! `$defs` the document carries); the compiled validator is cached and
//! consulted on every insert/update of that type.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};

use crate::config::is_identifier;
use crate::error::{RemError, Result, ValidationError};
use crate::storage::keys::SCHEMA_TYPE;
use crate::vector::DistanceMetric;

/// Maximum embedding dimension a schema may declare.
pub const MAX_EMBEDDING_DIMENSION: usize = 4096;

/// Governance category of a schema.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SchemaCategory {
    /// Engine-internal types.
    System,
    /// Tenant-defined types.
    User,
    /// Shared, world-readable types.
    Public,
    /// Agent descriptors.
    Agents,
}

impl fmt::Display for SchemaCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::System => "system",
            Self::User => "user",
            Self::Public => "public",
            Self::Agents => "agents",
        };
        write!(f, "{}", s)
    }
}

/// A schema description, as supplied at registration and as persisted.
///
/// The `json_schema` document is the authoritative shape of the type's
/// properties; the remaining fields are engine extensions (what to index,
/// what to embed, how to compare vectors).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SchemaDefinition {
    /// Type name ("resources", "agents", ...). Identifier-safe.
    pub name: String,

    /// Governance category.
    pub category: SchemaCategory,

    /// Monotonic version. Re-registration must raise it.
    pub version: u32,

    /// Full JSON-Schema document, `$defs` included.
    pub json_schema: serde_json::Value,

    /// Human-readable description (also the text an agent planner sees).
    #[serde(default)]
    pub description: String,

    /// Dimension of the default `embedding` vector.
    pub embedding_dimension: usize,

    /// Dimension of the optional `embedding_alt` vector.
    #[serde(default)]
    pub embedding_alt_dimension: Option<usize>,

    /// Distance metric for this type's vectors.
    #[serde(default)]
    pub metric: DistanceMetric,

    /// Property names maintained in the secondary index.
    #[serde(default)]
    pub indexed_fields: Vec<String>,

    /// Property whose value feeds the fuzzy key index. Falls back to the
    /// entity's `name` when absent.
    #[serde(default)]
    pub key_field: Option<String>,

    /// Text properties fed to the embedder: the first fills `embedding`,
    /// the second (if any) fills `embedding_alt`.
    #[serde(default)]
    pub embedding_fields: Vec<String>,

    /// Optional tool references attached to the type.
    #[serde(default)]
    pub tools: Vec<String>,
}

impl SchemaDefinition {
    /// Dimension for the given vector slot, if the slot is configured.
    pub fn dimension_for_slot(&self, slot: crate::vector::VectorSlot) -> Option<usize> {
        match slot {
            crate::vector::VectorSlot::Default => Some(self.embedding_dimension),
            crate::vector::VectorSlot::Alt => self.embedding_alt_dimension,
        }
    }
}

/// A registered schema: the definition plus its compiled validator.
pub struct SchemaRecord {
    /// The definition as registered.
    pub def: SchemaDefinition,

    /// Compiled JSON-Schema validator, built once at registration.
    validator: jsonschema::Validator,
}

impl SchemaRecord {
    /// Compiles a definition into a cached record.
    ///
    /// Fails `SchemaInvalid` if the JSON-Schema document does not compile.
    pub fn compile(def: SchemaDefinition) -> Result<Self> {
        let validator = jsonschema::validator_for(&def.json_schema).map_err(|e| {
            ValidationError::schema_invalid(&def.name, format!("schema does not compile: {}", e))
        })?;
        Ok(Self { def, validator })
    }

    /// Validates an entity payload against the compiled schema.
    ///
    /// Fails `ValidationFailed` carrying the JSON pointer path of the
    /// first offending value.
    pub fn validate_payload(&self, payload: &serde_json::Value) -> Result<()> {
        if let Err(err) = self.validator.validate(payload) {
            return Err(ValidationError::payload_invalid(
                err.instance_path.to_string(),
                err.to_string(),
            )
            .into());
        }
        Ok(())
    }
}

impl fmt::Debug for SchemaRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SchemaRecord")
            .field("name", &self.def.name)
            .field("version", &self.def.version)
            .finish_non_exhaustive()
    }
}

/// In-memory schema cache for one tenant.
///
/// The persisted copy (schema entities) is the source of truth; the
/// registry is rebuilt from it on open.
#[derive(Debug, Default)]
pub struct SchemaRegistry {
    cache: RwLock<HashMap<String, Arc<SchemaRecord>>>,
}

impl SchemaRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Validates a definition's structure before compilation.
    ///
    /// Checks performed:
    /// - name is identifier-safe and not the reserved `"schema"` type
    /// - version is at least 1
    /// - embedding dimensions are positive and bounded
    /// - indexed fields and the key field appear in the document's
    ///   `properties`
    pub fn validate_definition(def: &SchemaDefinition) -> Result<()> {
        if !is_identifier(&def.name) {
            return Err(ValidationError::schema_invalid(
                &def.name,
                "name must be a valid identifier",
            )
            .into());
        }
        if def.name == SCHEMA_TYPE {
            return Err(ValidationError::schema_invalid(
                &def.name,
                "type name 'schema' is reserved",
            )
            .into());
        }
        if def.version == 0 {
            return Err(
                ValidationError::schema_invalid(&def.name, "version must be at least 1").into(),
            );
        }
        if def.embedding_dimension == 0 || def.embedding_dimension > MAX_EMBEDDING_DIMENSION {
            return Err(ValidationError::schema_invalid(
                &def.name,
                format!(
                    "embedding_dimension must be in 1..={}",
                    MAX_EMBEDDING_DIMENSION
                ),
            )
            .into());
        }
        if let Some(alt) = def.embedding_alt_dimension {
            if alt == 0 || alt > MAX_EMBEDDING_DIMENSION {
                return Err(ValidationError::schema_invalid(
                    &def.name,
                    format!(
                        "embedding_alt_dimension must be in 1..={}",
                        MAX_EMBEDDING_DIMENSION
                    ),
                )
                .into());
            }
        }
        if def.embedding_fields.len() > 2 {
            return Err(ValidationError::schema_invalid(
                &def.name,
                "at most two embedding fields (default and alternate) are supported",
            )
            .into());
        }

        let properties = def
            .json_schema
            .get("properties")
            .and_then(|p| p.as_object());
        for field in def.indexed_fields.iter().chain(def.key_field.iter()) {
            // Only the leading segment of a dotted path must be declared.
            let head = field.split('.').next().unwrap_or(field);
            let declared = properties.is_some_and(|props| props.contains_key(head));
            if !declared {
                return Err(ValidationError::schema_invalid(
                    &def.name,
                    format!("field '{}' is not declared in the schema's properties", field),
                )
                .into());
            }
        }

        Ok(())
    }

    /// Registers a definition, compiling and caching it.
    ///
    /// A definition with a strictly higher version replaces the cached
    /// one; an equal or lower version fails `SchemaExists`.
    pub fn register(&self, def: SchemaDefinition) -> Result<Arc<SchemaRecord>> {
        Self::validate_definition(&def)?;

        let mut cache = self.write_cache()?;
        if let Some(existing) = cache.get(&def.name) {
            if def.version <= existing.def.version {
                return Err(ValidationError::SchemaExists {
                    name: def.name,
                    version: existing.def.version,
                }
                .into());
            }
        }

        let record = Arc::new(SchemaRecord::compile(def)?);
        cache.insert(record.def.name.clone(), Arc::clone(&record));
        Ok(record)
    }

    /// Installs a definition loaded from storage or a replication stream.
    ///
    /// Skips the version-conflict check (the stored copy already won) but
    /// still refuses definitions that do not compile.
    pub fn install(&self, def: SchemaDefinition) -> Result<Arc<SchemaRecord>> {
        let record = Arc::new(SchemaRecord::compile(def)?);
        self.write_cache()?
            .insert(record.def.name.clone(), Arc::clone(&record));
        Ok(record)
    }

    /// Retrieves a schema by name.
    pub fn get(&self, name: &str) -> Result<Arc<SchemaRecord>> {
        self.try_get(name)?
            .ok_or_else(|| ValidationError::schema_not_found(name).into())
    }

    /// Retrieves a schema by name, `None` if unregistered.
    pub fn try_get(&self, name: &str) -> Result<Option<Arc<SchemaRecord>>> {
        Ok(self.read_cache()?.get(name).cloned())
    }

    /// Lists registered schemas in the given category, sorted by name.
    pub fn list_by_category(&self, category: SchemaCategory) -> Result<Vec<Arc<SchemaRecord>>> {
        let cache = self.read_cache()?;
        let mut records: Vec<_> = cache
            .values()
            .filter(|r| r.def.category == category)
            .cloned()
            .collect();
        records.sort_by(|a, b| a.def.name.cmp(&b.def.name));
        Ok(records)
    }

    /// Names of all registered types, sorted.
    pub fn type_names(&self) -> Result<Vec<String>> {
        let cache = self.read_cache()?;
        let mut names: Vec<_> = cache.keys().cloned().collect();
        names.sort();
        Ok(names)
    }

    fn read_cache(
        &self,
    ) -> Result<std::sync::RwLockReadGuard<'_, HashMap<String, Arc<SchemaRecord>>>> {
        self.cache
            .read()
            .map_err(|_| RemError::config("schema cache lock poisoned"))
    }

    fn write_cache(
        &self,
    ) -> Result<std::sync::RwLockWriteGuard<'_, HashMap<String, Arc<SchemaRecord>>>> {
        self.cache
            .write()
            .map_err(|_| RemError::config("schema cache lock poisoned"))
    }
}
