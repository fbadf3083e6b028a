//! Table schemas and the DDL they are created from.
//!
//! The database schema is a DDL string composed from one fragment per enabled
//! entity kind. Only the subset of `CREATE TABLE` the FIM tables need is
//! understood:
//!
//! ```text
//! CREATE TABLE [IF NOT EXISTS] name (
//!     column TYPE [NOT NULL] [PRIMARY KEY],
//!     ...
//!     [PRIMARY KEY (column, ...)]
//! );
//! ```

use crate::error::{CoreError, CoreResult};

/// DDL for the file table.
pub const CREATE_FILE_TABLE: &str = "CREATE TABLE IF NOT EXISTS file_entry (
    path TEXT NOT NULL,
    size INTEGER,
    perm TEXT,
    attributes TEXT,
    uid TEXT,
    gid TEXT,
    user_name TEXT,
    group_name TEXT,
    inode INTEGER,
    device INTEGER,
    mtime INTEGER,
    hash_md5 TEXT,
    hash_sha1 TEXT,
    hash_sha256 TEXT,
    PRIMARY KEY (path)
);";

/// DDL for the registry key table.
pub const CREATE_REGISTRY_KEY_TABLE: &str = "CREATE TABLE IF NOT EXISTS registry_key (
    arch TEXT NOT NULL,
    path TEXT NOT NULL,
    perm TEXT,
    uid TEXT,
    gid TEXT,
    user_name TEXT,
    group_name TEXT,
    mtime INTEGER,
    PRIMARY KEY (arch, path)
);";

/// DDL for the registry value table.
pub const CREATE_REGISTRY_VALUE_TABLE: &str = "CREATE TABLE IF NOT EXISTS registry_value (
    arch TEXT NOT NULL,
    key_path TEXT NOT NULL,
    name TEXT NOT NULL,
    value_type INTEGER,
    size INTEGER,
    hash_md5 TEXT,
    hash_sha1 TEXT,
    hash_sha256 TEXT,
    PRIMARY KEY (arch, key_path, name)
);";

/// Builds the combined schema for the enabled entity kinds.
#[must_use]
pub fn create_statement(registry: bool) -> String {
    let mut ddl = String::from(CREATE_FILE_TABLE);
    if registry {
        ddl.push_str(CREATE_REGISTRY_KEY_TABLE);
        ddl.push_str(CREATE_REGISTRY_VALUE_TABLE);
    }
    ddl
}

/// Declared column type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    /// UTF-8 text.
    Text,
    /// 64-bit integer (`INTEGER` or `BIGINT`).
    Integer,
    /// Raw bytes.
    Blob,
}

/// One column of a table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnDef {
    /// Column name.
    pub name: String,
    /// Declared type.
    pub ty: ColumnType,
    /// Whether `NOT NULL` was declared.
    pub not_null: bool,
}

/// Definition of one table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSchema {
    /// Table name.
    pub name: String,
    /// Columns in declaration order.
    pub columns: Vec<ColumnDef>,
    /// Primary key columns in key order.
    pub primary_key: Vec<String>,
}

impl TableSchema {
    /// Looks a column up by name.
    #[must_use]
    pub fn column(&self, name: &str) -> Option<&ColumnDef> {
        self.columns.iter().find(|c| c.name == name)
    }
}

/// Parses every `CREATE TABLE` statement in `ddl`.
///
/// # Errors
///
/// Returns a schema error for unsupported statements, unknown types or
/// constraints, duplicate tables or columns, and missing or dangling
/// primary keys.
pub fn parse_ddl(ddl: &str) -> CoreResult<Vec<TableSchema>> {
    let mut tables: Vec<TableSchema> = Vec::new();
    for statement in strip_comments(ddl).split(';') {
        let statement = statement.trim();
        if statement.is_empty() {
            continue;
        }
        let table = parse_create_table(statement)?;
        if tables.iter().any(|t| t.name == table.name) {
            return Err(CoreError::schema(format!(
                "table {} defined twice",
                table.name
            )));
        }
        tables.push(table);
    }
    Ok(tables)
}

fn strip_comments(ddl: &str) -> String {
    ddl.lines()
        .map(|line| line.split("--").next().unwrap_or_default())
        .collect::<Vec<_>>()
        .join("\n")
}

fn parse_create_table(statement: &str) -> CoreResult<TableSchema> {
    let (open, close) = match (statement.find('('), statement.rfind(')')) {
        (Some(open), Some(close)) if open < close => (open, close),
        _ => {
            return Err(CoreError::schema(format!(
                "expected a column list in {statement:?}"
            )))
        }
    };
    if !statement[close + 1..].trim().is_empty() {
        return Err(CoreError::schema("trailing text after column list"));
    }

    let name = parse_header(&statement[..open])?;
    let mut columns: Vec<ColumnDef> = Vec::new();
    let mut primary_key: Option<Vec<String>> = None;

    for definition in split_top_level(&statement[open + 1..close]) {
        let definition = definition.trim();
        if definition.is_empty() {
            return Err(CoreError::schema(format!("empty definition in table {name}")));
        }
        if let Some(keys) = parse_table_primary_key(definition)? {
            set_primary_key(&mut primary_key, keys, &name)?;
            continue;
        }
        let (column, inline_key) = parse_column(definition)?;
        if columns.iter().any(|c| c.name == column.name) {
            return Err(CoreError::schema(format!(
                "column {} declared twice in table {name}",
                column.name
            )));
        }
        if inline_key {
            set_primary_key(&mut primary_key, vec![column.name.clone()], &name)?;
        }
        columns.push(column);
    }

    let primary_key =
        primary_key.ok_or_else(|| CoreError::schema(format!("table {name} has no primary key")))?;
    for key in &primary_key {
        if !columns.iter().any(|c| &c.name == key) {
            return Err(CoreError::schema(format!(
                "primary key column {key} is not declared in table {name}"
            )));
        }
    }

    Ok(TableSchema {
        name,
        columns,
        primary_key,
    })
}

fn parse_header(header: &str) -> CoreResult<String> {
    let words: Vec<&str> = header.split_whitespace().collect();
    let upper: Vec<String> = words.iter().map(|w| w.to_ascii_uppercase()).collect();
    let name = match upper.iter().map(String::as_str).collect::<Vec<_>>().as_slice() {
        ["CREATE", "TABLE", "IF", "NOT", "EXISTS", _] => words[5],
        ["CREATE", "TABLE", _] => words[2],
        _ => {
            return Err(CoreError::schema(format!(
                "unsupported statement {:?}",
                header.trim()
            )))
        }
    };
    validate_identifier(name)?;
    Ok(name.to_string())
}

fn parse_table_primary_key(definition: &str) -> CoreResult<Option<Vec<String>>> {
    let upper = definition.to_ascii_uppercase();
    let Some(rest) = upper.strip_prefix("PRIMARY") else {
        return Ok(None);
    };
    if !rest.trim_start().starts_with("KEY") {
        return Ok(None);
    }
    let (open, close) = match (definition.find('('), definition.rfind(')')) {
        (Some(open), Some(close)) if open < close => (open, close),
        _ => return Err(CoreError::schema("PRIMARY KEY needs a column list")),
    };
    let keys = definition[open + 1..close]
        .split(',')
        .map(|key| {
            let key = key.trim();
            validate_identifier(key)?;
            Ok(key.to_string())
        })
        .collect::<CoreResult<Vec<_>>>()?;
    Ok(Some(keys))
}

fn parse_column(definition: &str) -> CoreResult<(ColumnDef, bool)> {
    let words: Vec<&str> = definition.split_whitespace().collect();
    let [name, ty, constraints @ ..] = words.as_slice() else {
        return Err(CoreError::schema(format!(
            "column definition {definition:?} needs a name and a type"
        )));
    };
    validate_identifier(name)?;
    let ty = match ty.to_ascii_uppercase().as_str() {
        "TEXT" => ColumnType::Text,
        "INTEGER" | "BIGINT" => ColumnType::Integer,
        "BLOB" => ColumnType::Blob,
        other => {
            return Err(CoreError::schema(format!(
                "unsupported type {other} for column {name}"
            )))
        }
    };

    let constraints: Vec<String> = constraints.iter().map(|c| c.to_ascii_uppercase()).collect();
    let mut not_null = false;
    let mut primary_key = false;
    let mut rest = constraints.iter().map(String::as_str);
    while let Some(word) = rest.next() {
        match (word, rest.next()) {
            ("NOT", Some("NULL")) => not_null = true,
            ("PRIMARY", Some("KEY")) => primary_key = true,
            _ => {
                return Err(CoreError::schema(format!(
                    "unsupported constraint {word} on column {name}"
                )))
            }
        }
    }

    Ok((
        ColumnDef {
            name: (*name).to_string(),
            ty,
            not_null,
        },
        primary_key,
    ))
}

fn set_primary_key(slot: &mut Option<Vec<String>>, keys: Vec<String>, table: &str) -> CoreResult<()> {
    if slot.is_some() {
        return Err(CoreError::schema(format!(
            "table {table} declares more than one primary key"
        )));
    }
    *slot = Some(keys);
    Ok(())
}

fn split_top_level(body: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;
    for (i, c) in body.char_indices() {
        match c {
            '(' => depth += 1,
            ')' => depth = depth.saturating_sub(1),
            ',' if depth == 0 => {
                parts.push(&body[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(&body[start..]);
    parts
}

fn validate_identifier(name: &str) -> CoreResult<()> {
    let mut chars = name.chars();
    let valid = chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_');
    if valid {
        Ok(())
    } else {
        Err(CoreError::schema(format!("invalid identifier {name:?}")))
    }
}
