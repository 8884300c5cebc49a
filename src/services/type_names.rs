//! Maps engine-specific type codes to the canonical type-name vocabulary.
//!
//! Every dialect adapter consults this when building result fields and
//! column listings, so callers only ever see one vocabulary: `bool, bytea,
//! int2, int4, int8, text, varchar, float4, float8, numeric, date, time,
//! timestamp, timestamptz, uuid, json, jsonb, unknown`.

use crate::models::ConnectionKind;

/// A raw type identifier as reported by an engine: a numeric code
/// (PostgreSQL OID, MySQL protocol column type) or a symbolic name
/// (information_schema data types, SQLite declared types).
#[derive(Debug, Clone, Copy)]
pub enum RawTypeCode<'a> {
    Code(u32),
    Name(&'a str),
}

/// Resolve an engine-specific type to a canonical name. An unmapped code
/// resolves to `unknown` so novel engine types never abort a query.
pub fn resolve(engine: ConnectionKind, raw: RawTypeCode<'_>) -> &'static str {
    match (engine, raw) {
        (ConnectionKind::Postgres, RawTypeCode::Code(oid)) => postgres_oid(oid),
        (ConnectionKind::Postgres, RawTypeCode::Name(name)) => postgres_name(name),
        (ConnectionKind::Mysql, RawTypeCode::Code(code)) => mysql_code(code),
        (ConnectionKind::Mysql, RawTypeCode::Name(name)) => mysql_name(name),
        (ConnectionKind::Sqlite, RawTypeCode::Name(name)) => sqlite_declared(name),
        _ => "unknown",
    }
}

fn postgres_oid(oid: u32) -> &'static str {
    match oid {
        16 => "bool",
        17 => "bytea",
        20 => "int8",
        21 => "int2",
        23 => "int4",
        25 => "text",
        114 => "json",
        700 => "float4",
        701 => "float8",
        1042 => "varchar", // bpchar
        1043 => "varchar",
        1082 => "date",
        1083 => "time",
        1114 => "timestamp",
        1184 => "timestamptz",
        1700 => "numeric",
        2950 => "uuid",
        3802 => "jsonb",
        _ => "unknown",
    }
}

/// information_schema.columns data_type values.
fn postgres_name(name: &str) -> &'static str {
    match name.to_ascii_lowercase().as_str() {
        "boolean" => "bool",
        "bytea" => "bytea",
        "smallint" => "int2",
        "integer" => "int4",
        "bigint" => "int8",
        "real" => "float4",
        "double precision" => "float8",
        "numeric" | "decimal" => "numeric",
        "text" => "text",
        "character varying" | "character" => "varchar",
        "date" => "date",
        "time without time zone" | "time with time zone" => "time",
        "timestamp without time zone" => "timestamp",
        "timestamp with time zone" => "timestamptz",
        "uuid" => "uuid",
        "json" => "json",
        "jsonb" => "jsonb",
        _ => "unknown",
    }
}

/// MySQL wire-protocol column type codes.
fn mysql_code(code: u32) -> &'static str {
    match code {
        0 | 246 => "numeric", // DECIMAL, NEWDECIMAL
        1 | 2 | 13 => "int2", // TINY, SHORT, YEAR
        3 | 9 => "int4",      // LONG, INT24
        4 => "float4",
        5 => "float8",
        7 => "timestamp",
        8 => "int8", // LONGLONG
        10 => "date",
        11 => "time",
        12 => "timestamp", // DATETIME
        15 | 253 => "varchar",
        16 => "bool", // BIT
        245 => "json",
        249..=252 => "bytea", // BLOB family
        254 => "text",        // STRING
        _ => "unknown",
    }
}

/// information_schema.COLUMNS DATA_TYPE values.
fn mysql_name(name: &str) -> &'static str {
    match name.to_ascii_lowercase().as_str() {
        "tinyint" | "smallint" | "year" => "int2",
        "mediumint" | "int" => "int4",
        "bigint" => "int8",
        "float" => "float4",
        "double" => "float8",
        "decimal" | "numeric" => "numeric",
        "bit" | "boolean" | "bool" => "bool",
        "varchar" | "char" => "varchar",
        "text" | "tinytext" | "mediumtext" | "longtext" | "enum" | "set" => "text",
        "blob" | "tinyblob" | "mediumblob" | "longblob" | "binary" | "varbinary" => "bytea",
        "date" => "date",
        "time" => "time",
        "datetime" | "timestamp" => "timestamp",
        "json" => "json",
        _ => "unknown",
    }
}

/// SQLite declared column types, matched loosely the way SQLite's own
/// type-affinity rules do.
fn sqlite_declared(decl: &str) -> &'static str {
    let upper = decl.to_ascii_uppercase();
    if upper.is_empty() {
        return "unknown";
    }
    if upper.contains("BOOL") {
        return "bool";
    }
    if upper.contains("INT") {
        return "int8";
    }
    if upper.contains("CHAR") || upper.contains("CLOB") {
        return "varchar";
    }
    if upper.contains("TEXT") {
        return "text";
    }
    if upper.contains("BLOB") {
        return "bytea";
    }
    if upper.contains("REAL") || upper.contains("FLOA") || upper.contains("DOUB") {
        return "float8";
    }
    if upper.contains("NUMERIC") || upper.contains("DECIMAL") {
        return "numeric";
    }
    if upper.contains("DATETIME") || upper.contains("TIMESTAMP") {
        return "timestamp";
    }
    if upper.contains("DATE") {
        return "date";
    }
    if upper.contains("TIME") {
        return "time";
    }
    "unknown"
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_postgres_oid_mapping() {
        assert_eq!(resolve(ConnectionKind::Postgres, RawTypeCode::Code(23)), "int4");
        assert_eq!(resolve(ConnectionKind::Postgres, RawTypeCode::Code(1184)), "timestamptz");
        assert_eq!(resolve(ConnectionKind::Postgres, RawTypeCode::Code(2950)), "uuid");
    }

    #[test]
    fn test_unmapped_code_resolves_to_unknown() {
        assert_eq!(resolve(ConnectionKind::Postgres, RawTypeCode::Code(999_999)), "unknown");
        assert_eq!(resolve(ConnectionKind::Mysql, RawTypeCode::Code(200)), "unknown");
        assert_eq!(resolve(ConnectionKind::Sqlite, RawTypeCode::Name("GEOMETRY")), "unknown");
    }

    #[test]
    fn test_postgres_information_schema_names() {
        assert_eq!(
            resolve(ConnectionKind::Postgres, RawTypeCode::Name("character varying")),
            "varchar"
        );
        assert_eq!(
            resolve(ConnectionKind::Postgres, RawTypeCode::Name("timestamp with time zone")),
            "timestamptz"
        );
    }

    #[test]
    fn test_mysql_protocol_codes() {
        assert_eq!(resolve(ConnectionKind::Mysql, RawTypeCode::Code(8)), "int8");
        assert_eq!(resolve(ConnectionKind::Mysql, RawTypeCode::Code(253)), "varchar");
        assert_eq!(resolve(ConnectionKind::Mysql, RawTypeCode::Code(245)), "json");
    }

    #[test]
    fn test_sqlite_declared_types() {
        assert_eq!(resolve(ConnectionKind::Sqlite, RawTypeCode::Name("INTEGER")), "int8");
        assert_eq!(resolve(ConnectionKind::Sqlite, RawTypeCode::Name("VARCHAR(40)")), "varchar");
        assert_eq!(resolve(ConnectionKind::Sqlite, RawTypeCode::Name("REAL")), "float8");
        assert_eq!(resolve(ConnectionKind::Sqlite, RawTypeCode::Name("")), "unknown");
    }

    #[test]
    fn test_non_sql_engine_resolves_to_unknown() {
        assert_eq!(resolve(ConnectionKind::HttpApi, RawTypeCode::Name("anything")), "unknown");
    }
}
