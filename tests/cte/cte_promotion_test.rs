use quarry::builder::{ConversionContext, QueryBuilder, QueryError};
use quarry::config::Settings;
use quarry::cte::validate_cte_scopes;
use quarry::metadata::{EntityMetadata, InMemoryMetadata};
use quarry::sql::visit::referenced_ctes;
use quarry::sql::{col, AliasId, DataSource, DerivedTable, ExprExt, SqlExpr};
use quarry::translation::{
    build_unit, translate, CompareOp, HostExpr, HostLiteral, QueryExpr,
};

fn metadata() -> InMemoryMetadata {
    InMemoryMetadata::new().with_entity(
        EntityMetadata::new("Employee", "employees")
            .column("Id", "id")
            .column("Name", "name")
            .column("ManagerId", "manager_id"),
    )
}

fn employees() -> Box<QueryExpr> {
    Box::new(QueryExpr::Source {
        entity: "Employee".into(),
    })
}

fn cte_reference(unit: &DerivedTable) -> Option<AliasId> {
    match unit.from.source {
        DataSource::CteReference { cte, .. } => Some(cte),
        _ => None,
    }
}

/// Rows of the hierarchy that manage someone: the recursive member filters
/// the accumulated rows with an `Any` over employees reading the current row.
fn managers_query() -> QueryExpr {
    QueryExpr::RecursiveUnion {
        anchor: Box::new(QueryExpr::Filter {
            source: employees(),
            predicate: HostExpr::compare(
                CompareOp::Eq,
                HostExpr::member("ManagerId"),
                HostExpr::literal(HostLiteral::Null),
            ),
        }),
        recursive: Box::new(QueryExpr::Filter {
            source: Box::new(QueryExpr::RecursiveSelf),
            predicate: HostExpr::Any {
                source: employees(),
                predicate: Some(Box::new(HostExpr::compare(
                    CompareOp::Eq,
                    HostExpr::member("ManagerId"),
                    HostExpr::outer(1, "Id"),
                ))),
            },
        }),
    }
}

#[test]
fn test_subquery_reading_recursive_row_becomes_cte() {
    let mut ctx = ConversionContext::new();
    let unit = build_unit(&mut ctx, &managers_query(), &metadata()).unwrap();
    assert_eq!(ctx.cte_depth(), 0);

    let member = &unit.ctes[0].body.unions[0].query;
    let r = member.from.alias;
    let sub = match &member.filters[0].predicate {
        SqlExpr::Exists {
            query,
            negated: false,
        } => query,
        other => panic!("Expected EXISTS, got {:?}", other),
    };

    // The employees scan moved into a CTE of its own.
    assert_eq!(sub.ctes.len(), 1);
    let promoted = &sub.ctes[0];
    assert!(!promoted.recursive);
    assert!(promoted.body.is_cte);
    assert!(matches!(promoted.body.from.source, DataSource::Table(_)));
    assert!(promoted.body.filters.is_empty());
    assert_eq!(cte_reference(sub), Some(promoted.alias));

    // The correlation now reads the CTE reference.
    assert_eq!(
        sub.where_predicate(),
        Some(col(sub.from.alias, "manager_id").eq(col(r, "id")))
    );
}

#[test]
fn test_promoted_cte_hoisted_before_recursive_cte() {
    let statement = translate(&managers_query(), &metadata(), &Settings::default()).unwrap();
    let root = statement.query();

    assert_eq!(root.ctes.len(), 2);
    let promoted = &root.ctes[0];
    let recursive = &root.ctes[1];
    assert!(!promoted.recursive);
    assert!(recursive.recursive);
    assert_eq!(cte_reference(root), Some(recursive.alias));

    let member = &recursive.body.unions[0].query;
    assert!(referenced_ctes(member).contains(&promoted.alias));
    assert!(validate_cte_scopes(&statement).is_empty());
}

#[test]
fn test_clause_reading_scoped_source_promotes_unit() {
    let metadata = metadata();
    let mut ctx = ConversionContext::new();
    ctx.begin_cte_scope();

    let recursive = ctx.table_source(&metadata, "Employee").unwrap();
    let r = recursive.alias;
    ctx.register_cte_alias(r);
    let _reader = QueryBuilder::new(&mut ctx, recursive).unwrap();

    let mut query = QueryBuilder::from_table(&mut ctx, &metadata, "Employee").unwrap();
    let e = query.initial_alias();
    query
        .apply_where(&mut ctx, col(e, "manager_id").eq(col(r, "id")), false)
        .unwrap();
    ctx.end_cte_scope();

    let unit = query.unit();
    let reference = unit.from.alias;
    assert_ne!(reference, e);
    assert_eq!(unit.ctes.len(), 1);
    assert_eq!(unit.ctes[0].body.from.alias, e);
    assert_eq!(cte_reference(unit), Some(unit.ctes[0].alias));
    assert_eq!(
        unit.where_predicate(),
        Some(col(reference, "manager_id").eq(col(r, "id")))
    );
}

#[test]
fn test_cte_body_reading_scoped_source_fails() {
    let metadata = metadata();
    let mut ctx = ConversionContext::new();
    ctx.begin_cte_scope();

    let recursive = ctx.table_source(&metadata, "Employee").unwrap();
    let r = recursive.alias;
    ctx.register_cte_alias(r);
    let _reader = QueryBuilder::new(&mut ctx, recursive).unwrap();

    let mut body = QueryBuilder::from_table(&mut ctx, &metadata, "Employee").unwrap();
    body.mark_cte_body();
    let e = body.initial_alias();

    let result = body.apply_where(&mut ctx, col(e, "manager_id").eq(col(r, "id")), false);
    assert_eq!(result, Err(QueryError::IllegalCteReference { alias: r }));
    assert!(body.unit().filters.is_empty());
    assert!(body.unit().ctes.is_empty());
}

#[test]
fn test_scoped_source_outside_scope_is_plain() {
    let metadata = metadata();
    let mut ctx = ConversionContext::new();
    ctx.begin_cte_scope();
    let recursive = ctx.table_source(&metadata, "Employee").unwrap();
    let r = recursive.alias;
    ctx.register_cte_alias(r);
    let _reader = QueryBuilder::new(&mut ctx, recursive).unwrap();
    ctx.end_cte_scope();

    let mut query = QueryBuilder::from_table(&mut ctx, &metadata, "Employee").unwrap();
    let e = query.initial_alias();
    query
        .apply_where(&mut ctx, col(e, "manager_id").eq(col(r, "id")), false)
        .unwrap();

    assert!(query.unit().ctes.is_empty());
    assert_eq!(query.unit().from.alias, e);
}
