mod common;

use common::{define_users, labeled};
use indoc::indoc;
use vessel::{
    Column, ColumnType, Dialect, Error, Feature, SchemaRegistry, Value, create_index,
    create_table, define_table, generate_schema, get_indexes,
};

#[test]
fn create_table_per_dialect_serial_spelling() {
    let mut registry = SchemaRegistry::new();
    let users = define_users(&mut registry);
    assert_eq!(
        create_table(&users, &Dialect::postgres(), true),
        indoc! {r#"
            CREATE TABLE IF NOT EXISTS "users" (
            "id" SERIAL PRIMARY KEY,
            "name" TEXT NOT NULL,
            "email" TEXT
            );"#}
    );
    assert_eq!(
        create_table(&users, &Dialect::mysql(), true),
        indoc! {"
            CREATE TABLE IF NOT EXISTS `users` (
            `id` INTEGER PRIMARY KEY AUTO_INCREMENT,
            `name` TEXT NOT NULL,
            `email` TEXT
            );"}
    );
    assert_eq!(
        create_table(&users, &Dialect::sqlite(), false),
        indoc! {r#"
            CREATE TABLE "users" (
            "id" INTEGER PRIMARY KEY AUTOINCREMENT,
            "name" TEXT NOT NULL,
            "email" TEXT
            );"#}
    );
}

#[test]
fn composite_keys_become_table_level_clauses() {
    let mut registry = SchemaRegistry::new();
    let shipments = registry
        .define(
            define_table("shipments")
                .column(Column::new("region", ColumnType::Text).primary_key())
                .column(Column::new("number", ColumnType::Integer).primary_key()),
        )
        .unwrap();
    assert_eq!(
        create_table(&shipments, &Dialect::postgres(), false),
        indoc! {r#"
            CREATE TABLE "shipments" (
            "region" TEXT NOT NULL,
            "number" INTEGER NOT NULL,
            PRIMARY KEY ("region", "number")
            );"#}
    );

    let items = registry
        .define(
            define_table("shipment_items")
                .column(Column::new("line", ColumnType::Integer).primary_key())
                .column(Column::new("region", ColumnType::Text))
                .column(Column::new("number", ColumnType::Integer))
                .foreign_key(["region", "number"], "shipments", ["region", "number"]),
        )
        .unwrap();
    assert_eq!(
        create_table(&items, &Dialect::postgres(), false),
        indoc! {r#"
            CREATE TABLE "shipment_items" (
            "line" INTEGER PRIMARY KEY,
            "region" TEXT,
            "number" INTEGER,
            FOREIGN KEY ("region", "number") REFERENCES "shipments" ("region", "number")
            );"#}
    );
}

#[test]
fn single_column_foreign_keys_render_inline() {
    let mut registry = SchemaRegistry::new();
    define_users(&mut registry);
    let posts = registry
        .define(
            define_table("posts")
                .column(Column::new("id", ColumnType::Serial).primary_key())
                .column(Column::new("author", ColumnType::Integer))
                .foreign_key(["author"], "users", ["id"]),
        )
        .unwrap();
    let sql = create_table(&posts, &Dialect::postgres(), false);
    assert!(sql.contains(r#""author" INTEGER REFERENCES "users"("id")"#));
}

#[test]
fn create_index_statement() {
    let mut registry = SchemaRegistry::new();
    let users = registry
        .define(
            define_table("users")
                .column(Column::new("id", ColumnType::Serial).primary_key())
                .column(Column::new("email", ColumnType::Text))
                .index("users_email_idx", ["email"], true),
        )
        .unwrap();
    assert_eq!(
        create_index(&users.indexes()[0], &Dialect::postgres(), true),
        r#"CREATE UNIQUE INDEX IF NOT EXISTS "users_email_idx" ON "users" ("email");"#
    );
}

#[test]
fn index_introspection_is_dialect_specific() {
    let compiled = get_indexes("users", &Dialect::postgres()).unwrap();
    assert_eq!(
        compiled.sql,
        "SELECT indexname, indexdef FROM pg_indexes WHERE tablename = $1;"
    );
    assert_eq!(compiled.params, vec![Value::from("users")]);

    let compiled = get_indexes("users", &Dialect::mysql()).unwrap();
    assert!(compiled.sql.contains("information_schema.statistics"));

    let compiled = get_indexes("users", &Dialect::sqlite()).unwrap();
    assert_eq!(compiled.sql, r#"PRAGMA index_list("users");"#);
    assert!(compiled.params.is_empty());

    let result = get_indexes("users", &Dialect::generic());
    assert!(matches!(
        result,
        Err(Error::UnsupportedFeature {
            feature: Feature::IndexIntrospection,
            ..
        })
    ));
}

#[test]
fn reflected_columns_round_trip_into_a_schema() {
    let rows = vec![
        labeled(&[
            ("column_name", Value::from("id")),
            ("data_type", Value::from("serial")),
            ("nullable", Value::from(false)),
            ("primary_key", Value::from(true)),
        ]),
        labeled(&[
            ("column_name", Value::from("name")),
            ("data_type", Value::from("text")),
            ("nullable", Value::from(false)),
            ("primary_key", Value::from(false)),
        ]),
        labeled(&[
            ("column_name", Value::from("email")),
            ("data_type", Value::from("character varying")),
            ("nullable", Value::from(true)),
            ("primary_key", Value::from(false)),
        ]),
    ];
    let builder = generate_schema("users", &rows).unwrap();
    let mut registry = SchemaRegistry::new();
    let schema = registry.define(builder).unwrap();
    assert_eq!(schema.primary_key().unwrap().columns, vec!["id"]);
    assert_eq!(schema.column("id").unwrap().ctype, ColumnType::Serial);
    assert!(!schema.column("name").unwrap().nullable);
    assert!(schema.column("email").unwrap().nullable);
    assert_eq!(schema.column("email").unwrap().ctype, ColumnType::Text);
}

#[test]
fn unknown_reflected_types_are_rejected() {
    let rows = vec![labeled(&[
        ("column_name", Value::from("shape")),
        ("data_type", Value::from("geometry")),
    ])];
    assert!(matches!(generate_schema("maps", &rows), Err(Error::Schema(_))));

    let rows = vec![labeled(&[("data_type", Value::from("text"))])];
    assert!(matches!(generate_schema("maps", &rows), Err(Error::Schema(_))));
}
