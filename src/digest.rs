//! Canonical schema digests.
//!
//! ## Purpose
//!
//! A digest fingerprints the *shape* of a set of tables so that an
//! undocumented schema change can be detected by comparing it with the digest
//! recorded for a component version.
//!
//! ## Canonical Table Form
//!
//! Each table is rendered as
//!
//! ```text
//! <table>;<line>;<line>;...
//! ```
//!
//! with one line per column and per foreign key, sorted lexicographically:
//!
//! - `COL,<name>,<type>[,PK][,NULL]`, the type rendered by a [`Dialect`];
//!   `NULL` is set for nullable columns and for columns named in the
//!   forced-nullable override;
//! - `FK,<name>,<local column>,...`, local columns only.
//!
//! The table strings are sorted and fed in order into SHA-256, each preceded
//! by its byte length as a big-endian `u64` so that table boundaries are part
//! of the hashed input; the digest is the hex encoding of the hash.
//!
//! ## What Is NOT Included
//!
//! - Declaration order of columns, constraints and tables
//! - The referenced side of a foreign key, which may belong to a different
//!   component
//! - Defaults, indexes, unique and check constraints

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

/// Logical column type.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ColumnType {
    /// 32-bit integer.
    Integer,
    /// 64-bit integer.
    BigInteger,
    /// 16-bit integer.
    SmallInteger,
    /// Boolean.
    Boolean,
    /// Single-precision float.
    Float,
    /// Double-precision float.
    Double,
    /// Variable-length string with optional maximum length.
    String(Option<u32>),
    /// Unbounded text.
    Text,
    /// Date and time without time zone.
    DateTime,
    /// Binary blob.
    Binary,
    /// 128-bit UUID.
    Uuid,
    /// Type already rendered by the caller; passed through unchanged.
    Custom(String),
}

/// SQL dialect used to render column types.
pub trait Dialect: Send + Sync {
    /// Dialect name.
    fn name(&self) -> &'static str;

    /// Render a column type as this dialect spells it.
    fn render(&self, column_type: &ColumnType) -> String;
}

/// SQLite type rendering.
#[derive(Debug, Clone, Copy, Default)]
pub struct SqliteDialect;

impl Dialect for SqliteDialect {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    fn render(&self, column_type: &ColumnType) -> String {
        match column_type {
            ColumnType::Integer => "INTEGER".into(),
            ColumnType::BigInteger => "BIGINT".into(),
            ColumnType::SmallInteger => "SMALLINT".into(),
            ColumnType::Boolean => "BOOLEAN".into(),
            ColumnType::Float => "FLOAT".into(),
            ColumnType::Double => "DOUBLE".into(),
            ColumnType::String(Some(len)) => format!("VARCHAR({len})"),
            ColumnType::String(None) => "VARCHAR".into(),
            ColumnType::Text => "TEXT".into(),
            ColumnType::DateTime => "DATETIME".into(),
            ColumnType::Binary => "BLOB".into(),
            ColumnType::Uuid => "CHAR(32)".into(),
            ColumnType::Custom(rendered) => rendered.clone(),
        }
    }
}

/// PostgreSQL type rendering.
#[derive(Debug, Clone, Copy, Default)]
pub struct PostgresDialect;

impl Dialect for PostgresDialect {
    fn name(&self) -> &'static str {
        "postgresql"
    }

    fn render(&self, column_type: &ColumnType) -> String {
        match column_type {
            ColumnType::Integer => "INTEGER".into(),
            ColumnType::BigInteger => "BIGINT".into(),
            ColumnType::SmallInteger => "SMALLINT".into(),
            ColumnType::Boolean => "BOOLEAN".into(),
            ColumnType::Float => "FLOAT".into(),
            ColumnType::Double => "DOUBLE PRECISION".into(),
            ColumnType::String(Some(len)) => format!("VARCHAR({len})"),
            ColumnType::String(None) => "VARCHAR".into(),
            ColumnType::Text => "TEXT".into(),
            ColumnType::DateTime => "TIMESTAMP WITHOUT TIME ZONE".into(),
            ColumnType::Binary => "BYTEA".into(),
            ColumnType::Uuid => "UUID".into(),
            ColumnType::Custom(rendered) => rendered.clone(),
        }
    }
}

/// Shape of one column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnShape {
    /// Column name.
    pub name: String,
    /// Logical type.
    pub column_type: ColumnType,
    /// Member of the primary key.
    pub primary_key: bool,
    /// Accepts NULL.
    pub nullable: bool,
}

impl ColumnShape {
    /// A nullable, non-key column.
    pub fn new(name: impl Into<String>, column_type: ColumnType) -> Self {
        Self {
            name: name.into(),
            column_type,
            primary_key: false,
            nullable: true,
        }
    }

    /// Make this column part of the primary key; key columns are NOT NULL
    /// unless [`ColumnShape::nullable`] is applied afterwards.
    pub fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self.nullable = false;
        self
    }

    /// Mark the column NOT NULL.
    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    /// Mark the column nullable.
    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }
}

/// Shape of one foreign-key constraint, local side only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForeignKeyShape {
    /// Constraint name.
    pub name: String,
    /// Constrained columns of the owning table.
    pub columns: Vec<String>,
}

/// Shape of one table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableShape {
    /// Table name.
    pub name: String,
    /// Columns in declaration order.
    pub columns: Vec<ColumnShape>,
    /// Foreign keys in declaration order.
    #[serde(default)]
    pub foreign_keys: Vec<ForeignKeyShape>,
}

impl TableShape {
    /// An empty table.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            columns: Vec::new(),
            foreign_keys: Vec::new(),
        }
    }

    /// Add a column.
    pub fn column(mut self, column: ColumnShape) -> Self {
        self.columns.push(column);
        self
    }

    /// Add a foreign key over local `columns`.
    pub fn foreign_key<I, S>(mut self, name: impl Into<String>, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.foreign_keys.push(ForeignKeyShape {
            name: name.into(),
            columns: columns.into_iter().map(Into::into).collect(),
        });
        self
    }
}

/// Hex-encoded schema digest.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SchemaDigest(String);

impl SchemaDigest {
    /// Wrap a digest read from storage.
    pub fn new(digest: impl Into<String>) -> Self {
        Self(digest.into())
    }

    /// Get the digest as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SchemaDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Canonical string form of one table.
pub fn table_repr(table: &TableShape, dialect: &dyn Dialect, nullable_columns: &BTreeSet<String>) -> String {
    let mut lines: Vec<String> = Vec::with_capacity(table.columns.len() + table.foreign_keys.len());
    for column in &table.columns {
        let mut line = format!("COL,{},{}", column.name, dialect.render(&column.column_type));
        if column.primary_key {
            line.push_str(",PK");
        }
        if column.nullable || nullable_columns.contains(&column.name) {
            line.push_str(",NULL");
        }
        lines.push(line);
    }
    for fk in &table.foreign_keys {
        let mut parts = Vec::with_capacity(fk.columns.len() + 2);
        parts.push("FK");
        parts.push(fk.name.as_str());
        parts.extend(fk.columns.iter().map(String::as_str));
        lines.push(parts.join(","));
    }
    lines.sort();

    let mut repr = table.name.clone();
    for line in lines {
        repr.push(';');
        repr.push_str(&line);
    }
    repr
}

/// Digest of a set of tables.
///
/// Independent of the order of `tables` and of the declaration order inside
/// each table.
pub fn schema_digest<'t, I>(tables: I, dialect: &dyn Dialect, nullable_columns: &BTreeSet<String>) -> SchemaDigest
where
    I: IntoIterator<Item = &'t TableShape>,
{
    let mut reprs: Vec<String> = tables
        .into_iter()
        .map(|table| table_repr(table, dialect, nullable_columns))
        .collect();
    reprs.sort();

    let mut hasher = Sha256::new();
    for repr in &reprs {
        hasher.update((repr.len() as u64).to_be_bytes());
        hasher.update(repr.as_bytes());
    }
    SchemaDigest(hex::encode(hasher.finalize()))
}

/// Stored and computed digests differ.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("schema digest mismatch: expected {expected}, computed {actual}")]
pub struct DigestMismatch {
    /// Digest recorded for the component version.
    pub expected: SchemaDigest,
    /// Digest computed from the live schema.
    pub actual: SchemaDigest,
}

/// How a digest mismatch is treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DigestPolicy {
    /// Log a warning and carry on.
    #[default]
    Advisory,
    /// Fail with [`DigestMismatch`].
    Fatal,
}

/// Outcome of a digest comparison that did not fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DigestCheck {
    /// Digests agree.
    Match,
    /// Digests differ and the policy is advisory.
    Mismatch(DigestMismatch),
}

impl DigestCheck {
    /// Whether the digests agree.
    pub fn is_match(&self) -> bool {
        matches!(self, Self::Match)
    }
}

/// Compare a recorded digest with a computed one under `policy`.
pub fn verify_digest(
    expected: &SchemaDigest,
    actual: &SchemaDigest,
    policy: DigestPolicy,
) -> Result<DigestCheck, DigestMismatch> {
    if expected == actual {
        return Ok(DigestCheck::Match);
    }
    let mismatch = DigestMismatch {
        expected: expected.clone(),
        actual: actual.clone(),
    };
    match policy {
        DigestPolicy::Advisory => {
            tracing::warn!(
                expected = %mismatch.expected,
                actual = %mismatch.actual,
                "Schema digest mismatch"
            );
            Ok(DigestCheck::Mismatch(mismatch))
        }
        DigestPolicy::Fatal => Err(mismatch),
    }
}
