//! Resource descriptors: the validated input to the generation pipeline.
//!
//! A descriptor is constructed per generation request (HTTP or CLI), checked
//! against the identifier and reserved-word rules, and then compiled into
//! schema text and source modules. It is never persisted as-is.

use crate::errors::{PanelError, PanelResult};
use crate::naming;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

static IDENTIFIER_RE: Lazy<Regex> = Lazy::new(|| {
    #[allow(clippy::expect_used)]
    Regex::new("^[A-Za-z][A-Za-z0-9_]*$").expect("identifier regex")
});

/// Names that would collide with core routes or modules.
pub const RESERVED_WORDS: &[&str] = &["user", "auth", "config", "admin", "api", "public"];

/// Scalar types a declared field may carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FieldType {
    String,
    Int,
    Float,
    Boolean,
    DateTime,
    Json,
}

impl FieldType {
    pub const VALID_TYPES: &'static str = "String, Int, Float, Boolean, DateTime, Json";

    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "String" => Some(FieldType::String),
            "Int" => Some(FieldType::Int),
            "Float" => Some(FieldType::Float),
            "Boolean" => Some(FieldType::Boolean),
            "DateTime" => Some(FieldType::DateTime),
            "Json" => Some(FieldType::Json),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldType::String => "String",
            FieldType::Int => "Int",
            FieldType::Float => "Float",
            FieldType::Boolean => "Boolean",
            FieldType::DateTime => "DateTime",
            FieldType::Json => "Json",
        }
    }
}

/// A validated declared field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldSpec {
    pub name: String,
    pub ty: FieldType,
    pub required: bool,
}

impl FieldSpec {
    /// Physical (snake_case) name written into the schema model.
    #[must_use]
    pub fn physical_name(&self) -> String {
        naming::camel_to_snake(&self.name)
    }
}

/// The three CRUD contracts a generated resource can expose.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ResourceShape {
    /// Per-id update semantics (`PUT /api/x/{id}`).
    Collection,
    /// Whole-collection replacement (`PUT /api/x` with `{items}`).
    CollectionBulk,
    /// One implicit document holding a single Json field.
    Singleton,
}

impl ResourceShape {
    /// Resolve the shape: an explicit request value wins; otherwise a
    /// descriptor whose only field is Json-typed is a singleton.
    #[must_use]
    pub fn resolve(explicit: Option<&str>, fields: &[FieldSpec]) -> Self {
        match explicit {
            Some("singleton") => ResourceShape::Singleton,
            Some("collectionBulk") => ResourceShape::CollectionBulk,
            Some("collection") => ResourceShape::Collection,
            _ => {
                if fields.len() == 1 && fields[0].ty == FieldType::Json {
                    ResourceShape::Singleton
                } else {
                    ResourceShape::Collection
                }
            }
        }
    }
}

/// Admin menu placement requested alongside a resource.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MenuItem {
    pub label: Option<String>,
    pub url: Option<String>,
}

/// Wire shape of a generation request body.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateRequest {
    pub resource_name: Option<String>,
    pub fields: Option<Value>,
    pub resource_type: Option<String>,
    pub menu_item: Option<MenuItem>,
    pub structure: Option<Value>,
}

/// Validated input to the generation pipeline.
#[derive(Debug, Clone)]
pub struct ResourceDescriptor {
    pub name: String,
    pub fields: Vec<FieldSpec>,
    pub shape: ResourceShape,
    pub menu_item: Option<MenuItem>,
    /// Raw structure fields carried through to the structure singleton.
    pub structure_fields: Option<Vec<Value>>,
}

impl ResourceDescriptor {
    /// Validate a request body into a descriptor, accumulating every
    /// violation found rather than stopping at the first.
    pub fn from_request(req: GenerateRequest) -> PanelResult<Self> {
        let mut violations = Vec::new();

        let name = req.resource_name.unwrap_or_default();
        validate_resource_name(&name, &mut violations);

        let (raw_fields, fields_missing) = match req.fields {
            Some(Value::Array(items)) => (items, false),
            _ => {
                violations.push("resourceName and fields array are required".to_string());
                (Vec::new(), true)
            }
        };
        if raw_fields.is_empty() && !fields_missing {
            violations.push("At least one field is required".to_string());
        }

        let mut fields = Vec::with_capacity(raw_fields.len());
        for raw in &raw_fields {
            let field_name = raw.get("name").and_then(Value::as_str);
            let field_type = raw.get("type").and_then(Value::as_str);
            let (Some(field_name), Some(field_type)) = (field_name, field_type) else {
                violations.push("Each field must have 'name' and 'type' properties".to_string());
                continue;
            };
            if !IDENTIFIER_RE.is_match(field_name) {
                violations.push(format!("Invalid field name: {field_name}"));
            }
            match FieldType::parse(field_type) {
                Some(ty) => fields.push(FieldSpec {
                    name: field_name.to_string(),
                    ty,
                    required: raw.get("required").and_then(Value::as_bool).unwrap_or(false),
                }),
                None => violations.push(format!(
                    "Invalid field type: {field_type}. Valid types: {}",
                    FieldType::VALID_TYPES
                )),
            }
        }

        if !violations.is_empty() {
            return Err(PanelError::Validation(violations));
        }

        let shape = ResourceShape::resolve(req.resource_type.as_deref(), &fields);
        let structure_fields = req
            .structure
            .as_ref()
            .and_then(|s| s.get("fields"))
            .and_then(Value::as_array)
            .cloned();

        Ok(ResourceDescriptor {
            name,
            fields,
            shape,
            menu_item: req.menu_item,
            structure_fields,
        })
    }

    #[must_use]
    pub fn model_name(&self) -> String {
        naming::capitalize_first(&self.name)
    }

    #[must_use]
    pub fn route_name(&self) -> String {
        naming::route_name(&self.name)
    }

    #[must_use]
    pub fn collection(&self) -> String {
        naming::collection_name(&self.name)
    }

    /// Slug for the auto-created admin page: the menu URL when one is given,
    /// the kebab-cased resource name otherwise.
    #[must_use]
    pub fn page_slug(&self) -> String {
        let from_menu = self
            .menu_item
            .as_ref()
            .and_then(|m| m.url.as_deref())
            .map(naming::normalize_page_slug)
            .unwrap_or_default();
        if from_menu.is_empty() {
            naming::kebab_slug(&self.name)
        } else {
            from_menu
        }
    }

    #[must_use]
    pub fn page_title(&self) -> String {
        self.menu_item
            .as_ref()
            .and_then(|m| m.label.clone())
            .unwrap_or_else(|| self.name.clone())
    }

    /// Declared and physical names of the singleton payload field: the first
    /// Json-typed field, with a `data` fallback when none is declared.
    #[must_use]
    pub fn singleton_payload_field(&self) -> (String, String) {
        self.fields
            .iter()
            .find(|f| f.ty == FieldType::Json)
            .map(|f| (f.name.clone(), f.physical_name()))
            .unwrap_or_else(|| ("data".to_string(), "data".to_string()))
    }
}

/// Check a name against the identifier and reserved-word rules, pushing
/// violations onto `out`.
pub fn validate_resource_name(name: &str, out: &mut Vec<String>) {
    if name.is_empty() {
        out.push("Resource name is required".to_string());
        return;
    }
    if !IDENTIFIER_RE.is_match(name) {
        out.push(
            "Resource name must start with a letter and contain only letters, numbers, and underscores"
                .to_string(),
        );
    }
    if RESERVED_WORDS.contains(&name.to_lowercase().as_str()) {
        out.push(format!("Resource name \"{name}\" is reserved"));
    }
}

/// Synthesize model fields from structure-editor entries: key derived from
/// the label (transliterated + slugified), collisions suffixed numerically,
/// editor types mapped onto schema scalar types. Synthesized fields are
/// always optional.
#[must_use]
pub fn fields_from_structure(structure_fields: &[Value]) -> Vec<FieldSpec> {
    let mut used: Vec<String> = Vec::new();
    let mut out = Vec::new();

    for (index, field) in structure_fields.iter().enumerate() {
        if !field.is_object() {
            continue;
        }
        let ty_raw = field.get("type").and_then(Value::as_str).unwrap_or("");
        if ty_raw == "additionalBlocks" {
            continue;
        }
        let order = field
            .get("order")
            .and_then(Value::as_i64)
            .unwrap_or(index as i64);
        let fallback = format!(
            "{}_{order}",
            if ty_raw.is_empty() {
                "field".to_string()
            } else {
                ty_raw.to_lowercase()
            }
        );
        let label = field.get("label").and_then(Value::as_str).unwrap_or("");
        let base = naming::normalize_field_key(label, &fallback);

        let mut unique = base.clone();
        let mut suffix = 1;
        while used.contains(&unique) {
            unique = format!("{base}_{suffix}");
            suffix += 1;
        }
        used.push(unique.clone());

        let ty = match ty_raw.to_lowercase().as_str() {
            "number" => FieldType::Int,
            "boolean" => FieldType::Boolean,
            "date" => FieldType::DateTime,
            "json" => FieldType::Json,
            _ => FieldType::String,
        };
        out.push(FieldSpec {
            name: unique,
            ty,
            required: false,
        });
    }
    out
}
