mod common;

use common::{define_org, define_users};
use indoc::indoc;
use vessel::{
    Column, ColumnType, Dialect, Error, Feature, JoinType, Order, Result, SchemaRegistry,
    Statement, Value, col, define_table, lit,
};

fn orders_registry() -> SchemaRegistry {
    let mut registry = SchemaRegistry::new();
    registry
        .define(
            define_table("customers")
                .column(Column::new("id", ColumnType::Serial).primary_key())
                .column(Column::new("name", ColumnType::Text).not_null()),
        )
        .unwrap();
    registry
        .define(
            define_table("orders")
                .column(Column::new("id", ColumnType::Serial).primary_key())
                .column(Column::new("customer", ColumnType::Integer))
                .column(Column::new("total", ColumnType::Decimal(10, 2)))
                .foreign_key(["customer"], "customers", ["id"]),
        )
        .unwrap();
    registry
}

#[test]
fn select_filter_binds_parameters() {
    let mut registry = SchemaRegistry::new();
    define_users(&mut registry);
    let compiled = Statement::select("users")
        .filter(col("", "name").eq(lit("ada")))
        .compile(&Dialect::postgres(), &registry)
        .unwrap();
    assert_eq!(
        compiled.sql,
        indoc! {r#"
            SELECT *
            FROM "users"
            WHERE "name" = $1;"#}
    );
    assert_eq!(compiled.params, vec![Value::from("ada")]);
}

#[test]
fn compilation_is_deterministic() {
    let mut registry = SchemaRegistry::new();
    define_users(&mut registry);
    let statement = Statement::select("users")
        .filter(col("", "name").like(lit("a%")).and(col("", "id").gt(lit(7))))
        .order_by(col("", "id"), Order::Asc)
        .limit(3);
    let first = statement.compile(&Dialect::postgres(), &registry).unwrap();
    let second = statement.compile(&Dialect::postgres(), &registry).unwrap();
    assert_eq!(first, second);
}

#[test]
fn placeholder_numbering_follows_parameter_order() {
    let registry = SchemaRegistry::new();
    let compiled = Statement::select("users")
        .filter(col("", "name").eq(lit("ada")))
        .filter(col("", "id").gt(lit(10)))
        .compile(&Dialect::postgres(), &registry)
        .unwrap();
    assert_eq!(
        compiled.sql,
        indoc! {r#"
            SELECT *
            FROM "users"
            WHERE "name" = $1 AND "id" > $2;"#}
    );
    assert_eq!(compiled.params, vec![Value::from("ada"), Value::from(10)]);

    let compiled = Statement::select("users")
        .filter(col("", "name").eq(lit("ada")).and(col("", "id").gt(lit(10))))
        .compile(&Dialect::sqlite(), &registry)
        .unwrap();
    assert_eq!(
        compiled.sql,
        indoc! {r#"
            SELECT *
            FROM "users"
            WHERE "name" = ? AND "id" > ?;"#}
    );
}

#[test]
fn projections_render_expressions() {
    let registry = SchemaRegistry::new();
    let compiled = Statement::select("users")
        .column(col("", "name"))
        .column(vessel::call("count", [vessel::Expr::Asterisk]))
        .compile(&Dialect::postgres(), &registry)
        .unwrap();
    assert_eq!(
        compiled.sql,
        indoc! {r#"
            SELECT "name", count(*)
            FROM "users";"#}
    );
}

#[test]
fn or_groups_are_parenthesized() {
    let registry = SchemaRegistry::new();
    let filter = col("", "a")
        .eq(lit(1))
        .or(col("", "b").eq(lit(2)))
        .and(col("", "c").eq(lit(3)));
    let compiled = Statement::select("t")
        .filter(filter)
        .compile(&Dialect::postgres(), &registry)
        .unwrap();
    assert_eq!(
        compiled.sql,
        indoc! {r#"
            SELECT *
            FROM "t"
            WHERE ("a" = $1 OR "b" = $2) AND "c" = $3;"#}
    );
}

#[test]
fn null_comparisons_render_inline() {
    let registry = SchemaRegistry::new();
    let compiled = Statement::select("users")
        .filter(col("", "email").is_null())
        .compile(&Dialect::postgres(), &registry)
        .unwrap();
    assert_eq!(
        compiled.sql,
        indoc! {r#"
            SELECT *
            FROM "users"
            WHERE "email" IS NULL;"#}
    );
    assert!(compiled.params.is_empty());
}

#[test]
fn join_condition_resolved_from_foreign_key() {
    let registry = orders_registry();
    let compiled = Statement::select("orders")
        .join(JoinType::Inner, "customers")
        .filter(col("customers", "name").eq(lit("ada")))
        .compile(&Dialect::postgres(), &registry)
        .unwrap();
    assert_eq!(
        compiled.sql,
        indoc! {r#"
            SELECT *
            FROM "orders" INNER JOIN "customers" ON "orders"."customer" = "customers"."id"
            WHERE "customers"."name" = $1;"#}
    );
}

#[test]
fn explicit_join_condition_wins() {
    let registry = orders_registry();
    let compiled = Statement::select("orders")
        .join_on(
            JoinType::Left,
            "customers",
            col("orders", "customer").eq(col("customers", "id")),
        )
        .compile(&Dialect::postgres(), &registry)
        .unwrap();
    assert!(compiled.sql.contains(
        r#"LEFT JOIN "customers" ON "orders"."customer" = "customers"."id""#
    ));
}

#[test]
fn join_without_relation_fails() {
    let mut registry = orders_registry();
    define_users(&mut registry);
    let result = Statement::select("orders")
        .join(JoinType::Inner, "users")
        .compile(&Dialect::postgres(), &registry);
    assert!(matches!(result, Err(Error::QueryBuild(_))));
}

#[test]
fn join_with_two_candidate_keys_is_ambiguous() {
    let mut registry = SchemaRegistry::new();
    define_org(&mut registry);
    let result = Statement::select("employees")
        .join(JoinType::Inner, "departments")
        .compile(&Dialect::postgres(), &registry);
    match result {
        Err(Error::AmbiguousJoin { candidates, .. }) => assert_eq!(candidates, 2),
        other => panic!("expected an ambiguous join, got {:?}", other),
    }
}

#[test]
fn order_by_and_limit() {
    let registry = SchemaRegistry::new();
    let compiled = Statement::select("users")
        .order_by(col("", "name"), Order::Asc)
        .order_by(col("", "id"), Order::Desc)
        .limit(10)
        .compile(&Dialect::postgres(), &registry)
        .unwrap();
    assert_eq!(
        compiled.sql,
        indoc! {r#"
            SELECT *
            FROM "users"
            ORDER BY "name" ASC, "id" DESC
            LIMIT 10;"#}
    );
}

#[test]
fn insert_lists_only_set_columns() {
    let registry = SchemaRegistry::new();
    let compiled = Statement::insert("users")
        .set("name", "ada")
        .compile(&Dialect::postgres(), &registry)
        .unwrap();
    assert_eq!(
        compiled.sql,
        indoc! {r#"
            INSERT INTO "users" ("name") VALUES
            ($1);"#}
    );
    assert_eq!(compiled.params, vec![Value::from("ada")]);
}

#[test]
fn insert_without_values_fails() {
    let registry = SchemaRegistry::new();
    let result = Statement::insert("users").compile(&Dialect::postgres(), &registry);
    assert!(matches!(result, Err(Error::QueryBuild(_))));
}

#[test]
fn update_with_filter() {
    let registry = SchemaRegistry::new();
    let compiled = Statement::update("users")
        .set("name", "grace")
        .set("email", "grace@example.com")
        .filter(col("", "id").eq(lit(1)))
        .compile(&Dialect::postgres(), &registry)
        .unwrap();
    assert_eq!(
        compiled.sql,
        indoc! {r#"
            UPDATE "users" SET "name" = $1, "email" = $2
            WHERE "id" = $3;"#}
    );
    assert_eq!(
        compiled.params,
        vec![
            Value::from("grace"),
            Value::from("grace@example.com"),
            Value::from(1),
        ]
    );
}

#[test]
fn update_without_assignments_fails() {
    let registry = SchemaRegistry::new();
    let result = Statement::update("users")
        .filter(col("", "id").eq(lit(1)))
        .compile(&Dialect::postgres(), &registry);
    assert!(matches!(result, Err(Error::QueryBuild(_))));
}

#[test]
fn delete_with_filter() {
    let registry = SchemaRegistry::new();
    let compiled = Statement::delete("users")
        .filter(col("", "id").eq(lit(1)))
        .compile(&Dialect::postgres(), &registry)
        .unwrap();
    assert_eq!(
        compiled.sql,
        indoc! {r#"
            DELETE FROM "users"
            WHERE "id" = $1;"#}
    );
}

#[test]
fn upsert_on_conflict_updates_non_key_columns() {
    let mut registry = SchemaRegistry::new();
    define_users(&mut registry);
    let compiled = Statement::insert("users")
        .set("id", 1)
        .set("name", "ada")
        .upsert()
        .compile(&Dialect::postgres(), &registry)
        .unwrap();
    assert_eq!(
        compiled.sql,
        indoc! {r#"
            INSERT INTO "users" ("id", "name") VALUES
            ($1, $2)
            ON CONFLICT ("id") DO UPDATE SET "name" = EXCLUDED."name";"#}
    );
}

#[test]
fn upsert_on_duplicate_key() {
    let mut registry = SchemaRegistry::new();
    define_users(&mut registry);
    let compiled = Statement::insert("users")
        .set("id", 1)
        .set("name", "ada")
        .upsert()
        .compile(&Dialect::mysql(), &registry)
        .unwrap();
    assert_eq!(
        compiled.sql,
        indoc! {r#"
            INSERT INTO `users` (`id`, `name`) VALUES
            (?, ?)
            ON DUPLICATE KEY UPDATE `name` = VALUES(`name`);"#}
    );
}

#[test]
fn upsert_with_chosen_columns() {
    let mut registry = SchemaRegistry::new();
    define_users(&mut registry);
    let compiled = Statement::insert("users")
        .set("id", 1)
        .set("name", "ada")
        .set("email", "ada@example.com")
        .upsert_columns(["email"])
        .compile(&Dialect::postgres(), &registry)
        .unwrap();
    assert!(compiled
        .sql
        .ends_with(r#"ON CONFLICT ("id") DO UPDATE SET "email" = EXCLUDED."email";"#));
}

#[test]
fn upsert_without_native_syntax_fails_fast() {
    let mut registry = SchemaRegistry::new();
    define_users(&mut registry);
    let result = Statement::insert("users")
        .set("id", 1)
        .set("name", "ada")
        .upsert()
        .compile(&Dialect::generic(), &registry);
    match result {
        Err(Error::UnsupportedFeature { feature, dialect }) => {
            assert_eq!(feature, Feature::Upsert);
            assert_eq!(dialect, "generic");
        }
        other => panic!("expected unsupported upsert, got {:?}", other),
    }
}

fn plain_insert(statement: &Statement) -> Result<Statement> {
    let mut replacement = Statement::insert(statement.table());
    for (column, value) in statement.insert_values().unwrap_or(&[]) {
        replacement = replacement.set(column.clone(), value.clone());
    }
    Ok(replacement)
}

#[test]
fn registered_emulation_substitutes_upsert() {
    let mut registry = SchemaRegistry::new();
    define_users(&mut registry);
    let mut dialect = Dialect::generic();
    dialect.register_emulation(Feature::Upsert, plain_insert);
    let compiled = Statement::insert("users")
        .set("id", 1)
        .set("name", "ada")
        .upsert()
        .compile(&dialect, &registry)
        .unwrap();
    assert_eq!(
        compiled.sql,
        indoc! {r#"
            INSERT INTO "users" ("id", "name") VALUES
            (?, ?);"#}
    );
}

#[test]
fn emulation_must_remove_the_missing_feature() {
    let mut registry = SchemaRegistry::new();
    define_users(&mut registry);
    let mut dialect = Dialect::generic();
    dialect.register_emulation(Feature::Upsert, |statement| Ok(statement.clone()));
    let result = Statement::insert("users")
        .set("id", 1)
        .set("name", "ada")
        .upsert()
        .compile(&dialect, &registry);
    assert!(matches!(result, Err(Error::UnsupportedFeature { .. })));
}

#[test]
fn registered_emulation_substitutes_returning() {
    let mut registry = SchemaRegistry::new();
    define_users(&mut registry);
    let mut dialect = Dialect::generic();
    dialect.register_emulation(Feature::Returning, plain_insert);
    let compiled = Statement::insert("users")
        .set("name", "ada")
        .returning(["id"])
        .compile(&dialect, &registry)
        .unwrap();
    assert_eq!(
        compiled.sql,
        indoc! {r#"
            INSERT INTO "users" ("name") VALUES
            (?);"#}
    );
}

#[test]
fn returning_emulation_must_remove_the_clause() {
    let mut registry = SchemaRegistry::new();
    define_users(&mut registry);
    let mut dialect = Dialect::generic();
    dialect.register_emulation(Feature::Returning, |statement| Ok(statement.clone()));
    let result = Statement::insert("users")
        .set("name", "ada")
        .returning(["id"])
        .compile(&dialect, &registry);
    assert!(matches!(
        result,
        Err(Error::UnsupportedFeature {
            feature: Feature::Returning,
            ..
        })
    ));
}

#[test]
fn returning_requires_dialect_support() {
    let registry = SchemaRegistry::new();
    let statement = Statement::insert("users").set("name", "ada").returning(["id"]);
    let compiled = statement.compile(&Dialect::postgres(), &registry).unwrap();
    assert_eq!(
        compiled.sql,
        indoc! {r#"
            INSERT INTO "users" ("name") VALUES
            ($1)
            RETURNING "id";"#}
    );
    let result = statement.compile(&Dialect::mysql(), &registry);
    assert!(matches!(
        result,
        Err(Error::UnsupportedFeature {
            feature: Feature::Returning,
            ..
        })
    ));
}

#[test]
fn truncate_falls_back_to_delete() {
    let registry = SchemaRegistry::new();
    let statement = Statement::truncate("users");
    let compiled = statement.compile(&Dialect::postgres(), &registry).unwrap();
    assert_eq!(compiled.sql, r#"TRUNCATE TABLE "users";"#);
    let compiled = statement.compile(&Dialect::sqlite(), &registry).unwrap();
    assert_eq!(compiled.sql, r#"DELETE FROM "users";"#);
    assert!(compiled.params.is_empty());
}
