use crate::{SYSTEM_COLUMNS, error::SchemaError};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;

///
/// FieldType
///
/// Declared type of a schema field. Any spelling other than the four
/// primitive tags names another type definition and makes the field a
/// foreign key to that table.
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum FieldType {
    Text,
    Number,
    Bool,
    Date,
    Ref(String),
}

impl FieldType {
    #[must_use]
    pub fn parse(tag: &str) -> Self {
        match tag.to_lowercase().as_str() {
            "string" => Self::Text,
            "number" => Self::Number,
            "boolean" => Self::Bool,
            "date" => Self::Date,
            other => Self::Ref(other.to_string()),
        }
    }

    #[must_use]
    pub fn display_name(&self) -> &str {
        match self {
            Self::Text => "string",
            Self::Number => "number",
            Self::Bool => "boolean",
            Self::Date => "date",
            Self::Ref(name) => name.as_str(),
        }
    }

    /// Target table name when this field is a foreign key.
    #[must_use]
    pub fn reference(&self) -> Option<&str> {
        if let Self::Ref(name) = self {
            Some(name.as_str())
        } else {
            None
        }
    }
}

impl Serialize for FieldType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.display_name())
    }
}

impl<'de> Deserialize<'de> for FieldType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let tag = String::deserialize(deserializer)?;
        Ok(Self::parse(&tag))
    }
}

///
/// OnDelete
///
/// Referential action applied when a referenced record is deleted.
///

#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum OnDelete {
    #[default]
    Restrict,
    Cascade,
    SetNull,
}

///
/// FieldDef
///

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldDef {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: FieldType,
    #[serde(default)]
    pub required: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub enum_options: Vec<String>,
    #[serde(default)]
    pub on_delete: OnDelete,
}

impl FieldDef {
    #[must_use]
    pub fn is_reference(&self) -> bool {
        self.ty.reference().is_some()
    }
}

///
/// TypeDef
///
/// One user-declared table shape. The implicit `id`/`created`/`updated`
/// columns exist on every record and must not be declared here.
///

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct TypeDef {
    pub name: String,
    pub fields: Vec<FieldDef>,
}

///
/// Schema
///
/// Case-insensitive registry of type definitions. All names are lowercased
/// on entry; lookups accept any casing.
///

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Schema {
    types: BTreeMap<String, TypeDef>,
}

impl Schema {
    pub fn new(defs: Vec<TypeDef>) -> Result<Self, SchemaError> {
        let mut types = BTreeMap::new();

        for def in defs {
            let type_name = def.name.to_lowercase();
            let mut fields = Vec::with_capacity(def.fields.len());
            let mut seen = BTreeMap::new();

            for field in def.fields {
                let column = field.name.to_lowercase();
                if SYSTEM_COLUMNS.contains(&column.as_str()) {
                    return Err(SchemaError::SystemColumn { type_name, column });
                }
                if seen.insert(column.clone(), ()).is_some() {
                    return Err(SchemaError::DuplicateField { type_name, column });
                }

                fields.push(FieldDef {
                    name: column,
                    ty: normalize_type(field.ty),
                    required: field.required,
                    enum_options: field.enum_options,
                    on_delete: field.on_delete,
                });
            }

            let def = TypeDef {
                name: type_name.clone(),
                fields,
            };
            if types.insert(type_name.clone(), def).is_some() {
                return Err(SchemaError::DuplicateType { type_name });
            }
        }

        Ok(Self { types })
    }

    #[must_use]
    pub fn get(&self, table: &str) -> Option<&TypeDef> {
        self.types.get(&table.to_lowercase())
    }

    #[must_use]
    pub fn contains(&self, table: &str) -> bool {
        self.get(table).is_some()
    }

    /// Look up a declared field; system columns are not fields.
    #[must_use]
    pub fn field(&self, table: &str, column: &str) -> Option<&FieldDef> {
        let column = column.to_lowercase();
        self.get(table)?.fields.iter().find(|f| f.name == column)
    }

    pub fn types(&self) -> impl Iterator<Item = &TypeDef> {
        self.types.values()
    }

    /// All `(source type, field)` pairs whose field references `target`.
    #[must_use]
    pub fn referencing_fields(&self, target: &str) -> Vec<(&TypeDef, &FieldDef)> {
        let target = target.to_lowercase();
        self.types
            .values()
            .flat_map(|def| {
                def.fields
                    .iter()
                    .filter(|field| field.ty.reference() == Some(target.as_str()))
                    .map(move |field| (def, field))
            })
            .collect()
    }
}

// Reference targets are table names and follow the same normalization.
fn normalize_type(ty: FieldType) -> FieldType {
    match ty {
        FieldType::Ref(name) => FieldType::Ref(name.to_lowercase()),
        other => other,
    }
}

///
/// TESTS
///

#[cfg(test)]
mod tests {
    use super::*;

    fn users() -> TypeDef {
        TypeDef {
            name: "Users".to_string(),
            fields: vec![FieldDef {
                name: "Name".to_string(),
                ty: FieldType::Text,
                required: true,
                enum_options: Vec::new(),
                on_delete: OnDelete::Restrict,
            }],
        }
    }

    #[test]
    fn lookups_are_case_insensitive() {
        let schema = Schema::new(vec![users()]).expect("schema");
        assert!(schema.contains("USERS"));
        assert!(schema.field("users", "NAME").is_some());
        assert!(schema.field("users", "missing").is_none());
    }

    #[test]
    fn system_columns_cannot_be_declared() {
        let def = TypeDef {
            name: "t".to_string(),
            fields: vec![FieldDef {
                name: "Id".to_string(),
                ty: FieldType::Text,
                required: false,
                enum_options: Vec::new(),
                on_delete: OnDelete::Restrict,
            }],
        };
        assert_eq!(
            Schema::new(vec![def]),
            Err(SchemaError::SystemColumn {
                type_name: "t".to_string(),
                column: "id".to_string(),
            })
        );
    }

    #[test]
    fn field_type_wire_spellings_round_trip() {
        assert_eq!(FieldType::parse("boolean"), FieldType::Bool);
        assert_eq!(FieldType::parse("Users"), FieldType::Ref("users".to_string()));
        assert_eq!(FieldType::Bool.display_name(), "boolean");
    }

    #[test]
    fn referencing_fields_finds_foreign_keys() {
        let posts = TypeDef {
            name: "posts".to_string(),
            fields: vec![FieldDef {
                name: "author".to_string(),
                ty: FieldType::Ref("users".to_string()),
                required: false,
                enum_options: Vec::new(),
                on_delete: OnDelete::Cascade,
            }],
        };
        let schema = Schema::new(vec![users(), posts]).expect("schema");

        let refs = schema.referencing_fields("USERS");
        assert_eq!(refs.len(), 1);
        assert_eq!(refs[0].0.name, "posts");
        assert_eq!(refs[0].1.name, "author");
    }
}
