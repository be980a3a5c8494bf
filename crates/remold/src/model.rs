//! Declared models and observed columns.
//!
//! [`AttributeSpec`] is the application-side description of a column,
//! declared statically per model. [`ColumnInfo`] is the database-side
//! snapshot of the same shape, produced by introspection. The diff in
//! [`crate::diff`] compares the two sets.

use indexmap::IndexMap;
use std::fmt;

/// Names of the implicit audit timestamp columns.
///
/// They are appended to every *create* migration (not-nullable) and ignored
/// when computing `removed` columns, unless the model declares them itself.
pub const AUDIT_COLUMNS: [&str; 2] = ["created_at", "updated_at"];

/// Returns true if `name` is one of the implicit audit timestamp columns.
pub fn is_audit_column(name: &str) -> bool {
    AUDIT_COLUMNS.contains(&name)
}

/// Semantic column type vocabulary.
///
/// Covers the types the reconciler understands natively; anything else an
/// introspected table reports is carried through as [`ColumnType::Other`]
/// with a lowercased token, so it still compares case-insensitively and
/// reverses faithfully.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ColumnType {
    /// SMALLINT (2 bytes)
    SmallInt,
    /// INTEGER (4 bytes)
    Integer,
    /// BIGINT (8 bytes)
    BigInt,
    /// REAL (4 bytes floating point)
    Real,
    /// DOUBLE PRECISION (8 bytes floating point)
    DoublePrecision,
    /// NUMERIC (arbitrary precision)
    Numeric,
    /// BOOLEAN
    Boolean,
    /// TEXT
    Text,
    /// VARCHAR(n) - string with a length bound
    VarChar(u32),
    /// BYTEA (binary)
    Bytea,
    /// TIMESTAMP (without time zone)
    Timestamp,
    /// TIMESTAMPTZ
    Timestamptz,
    /// DATE
    Date,
    /// UUID
    Uuid,
    /// JSONB
    Jsonb,
    /// Any type outside the vocabulary, lowercased.
    Other(String),
}

impl ColumnType {
    /// Parse a type token as reported by `information_schema` or written in
    /// DDL. Matching is case-insensitive; `max_length` supplies the bound
    /// for `character varying` when the token itself carries none.
    pub fn parse(token: &str, max_length: Option<u32>) -> Self {
        let lower = token.trim().to_lowercase();

        // VARCHAR(255)-style tokens carry their own length
        if let Some(rest) = lower
            .strip_prefix("varchar(")
            .or_else(|| lower.strip_prefix("character varying("))
            && let Some(n) = rest.strip_suffix(')')
            && let Ok(n) = n.trim().parse()
        {
            return ColumnType::VarChar(n);
        }

        match lower.as_str() {
            "smallint" | "int2" => ColumnType::SmallInt,
            "integer" | "int" | "int4" => ColumnType::Integer,
            "bigint" | "int8" => ColumnType::BigInt,
            "real" | "float4" => ColumnType::Real,
            "double precision" | "float8" => ColumnType::DoublePrecision,
            "numeric" | "decimal" => ColumnType::Numeric,
            "boolean" | "bool" => ColumnType::Boolean,
            "text" => ColumnType::Text,
            "varchar" | "character varying" => match max_length {
                Some(n) => ColumnType::VarChar(n),
                None => ColumnType::Text,
            },
            "bytea" => ColumnType::Bytea,
            "timestamp" | "timestamp without time zone" => ColumnType::Timestamp,
            "timestamptz" | "timestamp with time zone" => ColumnType::Timestamptz,
            "date" => ColumnType::Date,
            "uuid" => ColumnType::Uuid,
            "jsonb" => ColumnType::Jsonb,
            _ => ColumnType::Other(lower),
        }
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ColumnType::SmallInt => write!(f, "SMALLINT"),
            ColumnType::Integer => write!(f, "INTEGER"),
            ColumnType::BigInt => write!(f, "BIGINT"),
            ColumnType::Real => write!(f, "REAL"),
            ColumnType::DoublePrecision => write!(f, "DOUBLE PRECISION"),
            ColumnType::Numeric => write!(f, "NUMERIC"),
            ColumnType::Boolean => write!(f, "BOOLEAN"),
            ColumnType::Text => write!(f, "TEXT"),
            ColumnType::VarChar(n) => write!(f, "VARCHAR({n})"),
            ColumnType::Bytea => write!(f, "BYTEA"),
            ColumnType::Timestamp => write!(f, "TIMESTAMP"),
            ColumnType::Timestamptz => write!(f, "TIMESTAMPTZ"),
            ColumnType::Date => write!(f, "DATE"),
            ColumnType::Uuid => write!(f, "UUID"),
            ColumnType::Jsonb => write!(f, "JSONB"),
            ColumnType::Other(token) => write!(f, "{}", token.to_uppercase()),
        }
    }
}

/// Declared shape of one model field.
#[derive(Debug, Clone, PartialEq)]
pub struct AttributeSpec {
    /// Column name, unique within the model
    pub name: String,
    /// Semantic type
    pub column_type: ColumnType,
    /// Whether the column accepts NULL
    pub allow_null: bool,
    /// Whether this is the primary key
    pub primary_key: bool,
    /// Whether the key is auto-generated by the database
    pub auto_increment: bool,
    /// Whether the column carries a single-column unique constraint
    pub unique: bool,
    /// Default value expression, in SQL form
    pub default_value: Option<String>,
}

impl AttributeSpec {
    /// A nullable, unconstrained column of the given type.
    pub fn new(name: impl Into<String>, column_type: ColumnType) -> Self {
        Self {
            name: name.into(),
            column_type,
            allow_null: true,
            primary_key: false,
            auto_increment: false,
            unique: false,
            default_value: None,
        }
    }

    pub fn not_null(mut self) -> Self {
        self.allow_null = false;
        self
    }

    /// Marks the column as primary key. Implies NOT NULL.
    pub fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self.allow_null = false;
        self
    }

    pub fn auto_increment(mut self) -> Self {
        self.auto_increment = true;
        self
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    pub fn default_value(mut self, expr: impl Into<String>) -> Self {
        self.default_value = Some(expr.into());
        self
    }
}

impl fmt::Display for AttributeSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.name, self.column_type)?;
        if !self.allow_null {
            write!(f, " not null")?;
        }
        if self.unique {
            write!(f, " unique")?;
        }
        Ok(())
    }
}

/// Observed shape of one live database column.
///
/// Snapshot taken once per reconciliation run; immutable afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnInfo {
    pub name: String,
    pub column_type: ColumnType,
    pub allow_null: bool,
    pub primary_key: bool,
    pub auto_increment: bool,
    pub unique: bool,
    pub default_value: Option<String>,
}

impl ColumnInfo {
    /// Re-declare this observed column as an attribute spec, used when the
    /// reverse script must re-add a dropped column with its prior shape.
    pub fn to_spec(&self) -> AttributeSpec {
        AttributeSpec {
            name: self.name.clone(),
            column_type: self.column_type.clone(),
            allow_null: self.allow_null,
            primary_key: self.primary_key,
            auto_increment: self.auto_increment,
            unique: self.unique,
            default_value: self.default_value.clone(),
        }
    }
}

impl From<&AttributeSpec> for ColumnInfo {
    fn from(spec: &AttributeSpec) -> Self {
        Self {
            name: spec.name.clone(),
            column_type: spec.column_type.clone(),
            allow_null: spec.allow_null,
            primary_key: spec.primary_key,
            auto_increment: spec.auto_increment,
            unique: spec.unique,
            default_value: spec.default_value.clone(),
        }
    }
}

/// One registered model: a name, its target table, and its declared
/// attributes in declaration order.
#[derive(Debug, Clone)]
pub struct ModelDef {
    pub name: String,
    pub table: String,
    pub attributes: Vec<AttributeSpec>,
}

impl ModelDef {
    pub fn new(
        name: impl Into<String>,
        table: impl Into<String>,
        attributes: Vec<AttributeSpec>,
    ) -> Self {
        Self {
            name: name.into(),
            table: table.into(),
            attributes,
        }
    }
}

/// The set of models known to the reconciler, in registration order.
///
/// Replaces runtime reflection over live model metadata: the application
/// declares its attribute specs once and hands the registry to the
/// [`Reconciler`](crate::Reconciler) at construction.
#[derive(Debug, Clone, Default)]
pub struct ModelRegistry {
    models: IndexMap<String, ModelDef>,
}

impl ModelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a model. A model registered twice under the same name
    /// replaces the earlier definition.
    pub fn register(&mut self, model: ModelDef) {
        self.models.insert(model.name.clone(), model);
    }

    pub fn get(&self, name: &str) -> Option<&ModelDef> {
        self.models.get(name)
    }

    /// Iterate models in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &ModelDef> {
        self.models.values()
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_type_tokens_case_insensitive() {
        assert_eq!(ColumnType::parse("INTEGER", None), ColumnType::Integer);
        assert_eq!(ColumnType::parse("integer", None), ColumnType::Integer);
        assert_eq!(ColumnType::parse("int4", None), ColumnType::Integer);
        assert_eq!(ColumnType::parse("BigInt", None), ColumnType::BigInt);
        assert_eq!(
            ColumnType::parse("timestamp with time zone", None),
            ColumnType::Timestamptz
        );
        assert_eq!(
            ColumnType::parse("TIMESTAMP WITHOUT TIME ZONE", None),
            ColumnType::Timestamp
        );
        assert_eq!(ColumnType::parse("BOOL", None), ColumnType::Boolean);
    }

    #[test]
    fn parse_varchar_with_length() {
        assert_eq!(ColumnType::parse("VARCHAR(255)", None), ColumnType::VarChar(255));
        assert_eq!(
            ColumnType::parse("character varying", Some(64)),
            ColumnType::VarChar(64)
        );
        assert_eq!(
            ColumnType::parse("character varying(32)", None),
            ColumnType::VarChar(32)
        );
        // Unbounded varchar degrades to TEXT
        assert_eq!(ColumnType::parse("character varying", None), ColumnType::Text);
    }

    #[test]
    fn parse_unknown_token_lowercases() {
        let ty = ColumnType::parse("CITEXT", None);
        assert_eq!(ty, ColumnType::Other("citext".into()));
        // Round-trips through Display case-insensitively
        assert_eq!(ColumnType::parse(&ty.to_string(), None), ty);
    }

    #[test]
    fn display_round_trips() {
        for ty in [
            ColumnType::SmallInt,
            ColumnType::Integer,
            ColumnType::BigInt,
            ColumnType::VarChar(255),
            ColumnType::Boolean,
            ColumnType::Timestamptz,
            ColumnType::Jsonb,
        ] {
            assert_eq!(ColumnType::parse(&ty.to_string(), None), ty);
        }
    }

    #[test]
    fn primary_key_implies_not_null() {
        let spec = AttributeSpec::new("id", ColumnType::Integer)
            .primary_key()
            .auto_increment();
        assert!(!spec.allow_null);
        assert!(spec.primary_key);
        assert!(spec.auto_increment);
    }

    #[test]
    fn registry_preserves_insertion_order() {
        let mut registry = ModelRegistry::new();
        registry.register(ModelDef::new("User", "users", vec![]));
        registry.register(ModelDef::new("Post", "posts", vec![]));
        registry.register(ModelDef::new("Tag", "tags", vec![]));

        let names: Vec<&str> = registry.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, ["User", "Post", "Tag"]);
        assert_eq!(registry.get("Post").unwrap().table, "posts");
    }

    #[test]
    fn column_info_round_trips_through_spec() {
        let info = ColumnInfo {
            name: "legacy_flag".into(),
            column_type: ColumnType::Boolean,
            allow_null: false,
            primary_key: false,
            auto_increment: false,
            unique: true,
            default_value: Some("false".into()),
        };
        let spec = info.to_spec();
        assert_eq!(ColumnInfo::from(&spec), info);
    }
}
