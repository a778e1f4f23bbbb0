//! Tests for descriptors and metadata trees.

use super::*;
use serde_json::json;

fn tree_with(tables: &[(&str, &str, bool)]) -> DatabaseMetadata {
    let mut metadata = DatabaseMetadata::new(SourceId::nil(), EngineFamily::PostgreSql, "app");
    for (schema, table, errored) in tables {
        let mut entry = TableMetadata::new(*table, TableKind::Table);
        if *errored {
            entry.error = Some(TableError {
                phase: TableErrorPhase::Count,
                message: "count failed".to_string(),
                timed_out: false,
            });
        }
        match metadata.schemas.iter_mut().find(|s| s.name == *schema) {
            Some(existing) => existing.tables.push(entry),
            None => metadata.schemas.push(SchemaMetadata {
                name: schema.to_string(),
                remarks: None,
                tables: vec![entry],
            }),
        }
    }
    metadata
}

#[test]
fn test_engine_family_parsing() {
    assert_eq!("pg".parse::<EngineFamily>().unwrap(), EngineFamily::PostgreSql);
    assert_eq!("MariaDB".parse::<EngineFamily>().unwrap(), EngineFamily::MySql);
    assert_eq!("mssql".parse::<EngineFamily>().unwrap(), EngineFamily::SqlServer);
    assert!("db2".parse::<EngineFamily>().is_err());

    let engine: EngineFamily = serde_json::from_value(json!("postgres")).unwrap();
    assert_eq!(engine, EngineFamily::PostgreSql);
    assert_eq!(serde_json::to_value(EngineFamily::SqlServer).unwrap(), json!("sqlserver"));
}

#[test]
fn test_extra_properties_keep_insertion_order() {
    let props: ExtraProperties = serde_json::from_str(r#"{"z": "1", "a": 2, "m": true}"#).unwrap();
    let keys: Vec<_> = props.iter().map(|(k, _)| k).collect();
    assert_eq!(keys, ["z", "a", "m"]);
    assert_eq!(props.get("a"), Some("2"));
    assert_eq!(props.get("m"), Some("true"));

    let serialized = serde_json::to_string(&props).unwrap();
    assert_eq!(serialized, r#"{"z":"1","a":"2","m":"true"}"#);
}

#[test]
fn test_extra_properties_replace_in_place() {
    let mut props = ExtraProperties::new();
    props.insert("a", "1");
    props.insert("b", "2");
    props.insert("a", "3");
    let pairs: Vec<_> = props.iter().collect();
    assert_eq!(pairs, [("a", "3"), ("b", "2")]);
}

#[test]
fn test_descriptor_debug_and_display_hide_credentials() {
    let source = DataSourceDescriptor::new("orders", EngineFamily::MySql, "db.local", Some(3306), "shop")
        .with_credentials(Credentials::new("svc".to_string(), Some("hunter2".to_string())));

    let debug = format!("{:?}", source);
    let display = source.to_string();
    assert!(!debug.contains("hunter2"));
    assert!(!display.contains("hunter2"));
    assert_eq!(display, "orders (MySQL db.local:3306/shop)");
}

#[test]
fn test_descriptor_serialization_drops_password() {
    let source = DataSourceDescriptor::new("orders", EngineFamily::MySql, "db.local", None, "shop")
        .with_credentials(Credentials::new("svc".to_string(), Some("hunter2".to_string())));
    let json = serde_json::to_string(&source).unwrap();
    assert!(!json.contains("hunter2"));
    assert!(json.contains("svc"));
}

#[test]
fn test_descriptor_defaults_from_json() {
    let source: DataSourceDescriptor = serde_json::from_value(json!({
        "name": "local",
        "engine": "postgresql",
        "database": "app",
        "credentials": {"username": "reader", "password": "pw"},
        "extra_properties": {"sslmode": "require", "connect_timeout": 5}
    }))
    .unwrap();

    assert_eq!(source.host, "localhost");
    assert_eq!(source.port, None);
    assert_ne!(source.id, SourceId::nil());
    let credentials = source.credentials.as_ref().unwrap();
    assert_eq!(credentials.username(), "reader");
    assert_eq!(credentials.password(), Some("pw"));
    assert_eq!(source.extra_properties.get("connect_timeout"), Some("5"));
}

#[test]
fn test_sort_orders_schemas_and_tables() {
    let mut metadata = tree_with(&[
        ("sales", "orders", false),
        ("audit", "log", false),
        ("sales", "customers", false),
    ]);
    metadata.sort();

    let schemas: Vec<_> = metadata.schemas.iter().map(|s| s.name.as_str()).collect();
    assert_eq!(schemas, ["audit", "sales"]);
    let tables: Vec<_> = metadata.schemas[1].tables.iter().map(|t| t.name.as_str()).collect();
    assert_eq!(tables, ["customers", "orders"]);
    assert_eq!(metadata.table_count(), 3);
}

#[test]
fn test_crawl_status_from_metadata() {
    let clean = tree_with(&[("public", "a", false), ("public", "b", false)]);
    assert_eq!(CrawlStatus::from_metadata(&clean), CrawlStatus::Full);

    let partial = tree_with(&[("public", "a", false), ("public", "b", true), ("public", "c", false)]);
    let status = CrawlStatus::from_metadata(&partial);
    assert_eq!(
        status,
        CrawlStatus::Partial {
            errored_tables: vec![TableRef {
                schema: "public".to_string(),
                table: "b".to_string(),
            }]
        }
    );
    assert_eq!(status.label(), "PARTIAL");
}

#[test]
fn test_crawl_status_serialization() {
    let failed = CrawlStatus::Failed {
        phase: crate::error::CrawlPhase::Connect,
        message: "refused".to_string(),
    };
    let value = serde_json::to_value(&failed).unwrap();
    assert_eq!(value["status"], json!("FAILED"));
    assert_eq!(value["phase"], json!("connect"));
}

#[test]
fn test_projection_constructors() {
    assert_eq!(Projection::all("p").columns, None);
    let projection = Projection::columns("p", ["b", "a"]);
    assert_eq!(projection.columns, Some(vec!["b".to_string(), "a".to_string()]));
}

#[test]
fn test_read_mode_display() {
    assert_eq!(ReadMode::FullScan.to_string(), "FULL_SCAN");
    assert_eq!(ReadMode::Sample.to_string(), "SAMPLE");
}
