use quarry::config::Settings;
use quarry::cte::validate_cte_scopes;
use quarry::metadata::{EntityMetadata, InMemoryMetadata};
use quarry::sql::{col, DataSource, DerivedTable, ExprExt, JoinKind};
use quarry::translation::{
    translate, CompareOp, HostExpr, HostLiteral, ProjectField, QueryExpr, TranslationError,
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

/// Employees without a manager.
fn roots() -> Box<QueryExpr> {
    Box::new(QueryExpr::Filter {
        source: employees(),
        predicate: HostExpr::compare(
            CompareOp::Eq,
            HostExpr::member("ManagerId"),
            HostExpr::literal(HostLiteral::Null),
        ),
    })
}

/// Employees reporting to someone already in the result.
fn reports(fields: &[&str]) -> Box<QueryExpr> {
    Box::new(QueryExpr::Project {
        source: Box::new(QueryExpr::Join {
            outer: employees(),
            inner: Box::new(QueryExpr::RecursiveSelf),
            outer_key: HostExpr::member("ManagerId"),
            inner_key: HostExpr::member("Id"),
            outer_name: "e".into(),
            inner_name: "r".into(),
            left: false,
        }),
        fields: fields
            .iter()
            .map(|f| ProjectField::new(f, HostExpr::member(&format!("e.{}", f))))
            .collect(),
    })
}

fn cte_reference(unit: &DerivedTable) -> Option<quarry::sql::AliasId> {
    match unit.from.source {
        DataSource::CteReference { cte, .. } => Some(cte),
        _ => None,
    }
}

#[test]
fn test_hierarchy_becomes_recursive_cte() {
    let query = QueryExpr::RecursiveUnion {
        anchor: roots(),
        recursive: reports(&["Id", "Name", "ManagerId"]),
    };

    let statement = translate(&query, &metadata(), &Settings::default()).unwrap();
    let root = statement.query();

    assert_eq!(root.ctes.len(), 1);
    let cte = &root.ctes[0];
    assert!(cte.recursive);
    assert_eq!(cte_reference(root), Some(cte.alias));
    assert_eq!(root.output_columns().len(), 3);

    // Anchor: the root employees.
    let anchor = &cte.body;
    let e0 = anchor.from.alias;
    assert_eq!(anchor.where_predicate(), Some(col(e0, "manager_id").is_null()));
    assert_eq!(anchor.output_columns().len(), 3);

    // Recursive member: employees joined to the CTE on their manager.
    assert_eq!(anchor.unions.len(), 1);
    let member = &anchor.unions[0];
    assert!(member.all);
    assert!(member.query.is_cte);
    assert_eq!(member.query.joins.len(), 1);

    let join = &member.query.joins[0];
    let e = member.query.from.alias;
    let r = join.source.alias;
    assert_eq!(join.kind, JoinKind::Inner);
    assert!(matches!(
        join.source.source,
        DataSource::CteReference { cte: reference, .. } if reference == cte.alias
    ));
    assert_eq!(join.condition, Some(col(e, "manager_id").eq(col(r, "id"))));
    assert_eq!(member.query.output_columns().len(), 3);

    assert!(validate_cte_scopes(&statement).is_empty());
}

#[test]
fn test_member_column_count_mismatch() {
    let query = QueryExpr::RecursiveUnion {
        anchor: roots(),
        recursive: reports(&["Id", "Name"]),
    };

    assert_eq!(
        translate(&query, &metadata(), &Settings::default()),
        Err(TranslationError::Query(
            quarry::builder::QueryError::UnionShapeMismatch { left: 3, right: 2 }
        ))
    );
}

#[test]
fn test_recursive_self_outside_member() {
    let query = QueryExpr::Filter {
        source: Box::new(QueryExpr::RecursiveSelf),
        predicate: HostExpr::compare(
            CompareOp::Eq,
            HostExpr::member("Id"),
            HostExpr::literal(1i64),
        ),
    };

    assert_eq!(
        translate(&query, &metadata(), &Settings::default()),
        Err(TranslationError::RecursiveSelfOutsideRecursion)
    );
}

#[test]
fn test_recursive_cte_keeps_filters_outside() {
    let query = QueryExpr::Filter {
        source: Box::new(QueryExpr::RecursiveUnion {
            anchor: roots(),
            recursive: reports(&["Id", "Name", "ManagerId"]),
        }),
        predicate: HostExpr::compare(
            CompareOp::Ne,
            HostExpr::member("Name"),
            HostExpr::literal("Grace"),
        ),
    };

    let statement = translate(&query, &metadata(), &Settings::default()).unwrap();
    let root = statement.query();
    assert_eq!(root.ctes.len(), 1);
    assert_eq!(
        root.where_predicate(),
        Some(col(root.from.alias, "name").ne(quarry::sql::lit_str("Grace")))
    );
}
