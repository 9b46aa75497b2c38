use quarry::config::Settings;
use quarry::metadata::InMemoryMetadata;
use quarry::postprocess::{
    PostprocessError, PostprocessOrchestrator, PostprocessResult, Postprocessor,
};
use quarry::sql::{col, lit_int, lit_str, DataSource, ExprExt, JoinKind, SqlExpr, SqlStatement, Transformed};
use quarry::translation::{translate, CompareOp, HostExpr, QueryExpr};

const METADATA: &str = r#"
[[entities]]
name = "Customer"
table = "customers"
columns = [
    { property = "Id", column = "id" },
    { property = "Name", column = "name" },
]

[[entities]]
name = "Order"
table = "orders"
columns = [
    { property = "Id", column = "id" },
    { property = "CustomerId", column = "customer_id" },
    { property = "Total", column = "total" },
]
"#;

fn metadata() -> InMemoryMetadata {
    InMemoryMetadata::from_toml_str(METADATA).unwrap()
}

fn source(entity: &str) -> Box<QueryExpr> {
    Box::new(QueryExpr::Source {
        entity: entity.into(),
    })
}

/// `o.CustomerId == c.Id`, written from inside the subquery.
fn belongs_to_customer() -> HostExpr {
    HostExpr::compare(
        CompareOp::Eq,
        HostExpr::member("CustomerId"),
        HostExpr::outer(1, "Id"),
    )
}

fn customers_with_orders(predicate: HostExpr) -> QueryExpr {
    QueryExpr::Filter {
        source: source("Customer"),
        predicate: HostExpr::Any {
            source: source("Order"),
            predicate: Some(Box::new(predicate)),
        },
    }
}

#[test]
fn test_correlated_exists_becomes_inner_join() {
    let query = customers_with_orders(belongs_to_customer());

    let statement = translate(&query, &metadata(), &Settings::default()).unwrap();
    let root = statement.query();
    let c = root.from.alias;

    assert!(root.filters.is_empty());
    assert_eq!(root.joins.len(), 1);
    let join = &root.joins[0];
    assert_eq!(join.kind, JoinKind::Inner);
    assert!(matches!(join.source.source, DataSource::Table(_)));
    assert_eq!(
        join.condition,
        Some(col(join.source.alias, "customer_id").eq(col(c, "id")))
    );
}

#[test]
fn test_remaining_filters_move_into_derived_join() {
    let query = customers_with_orders(HostExpr::and(
        belongs_to_customer(),
        HostExpr::compare(CompareOp::Gt, HostExpr::member("Total"), HostExpr::literal(100i64)),
    ));

    let statement = translate(&query, &metadata(), &Settings::default()).unwrap();
    let root = statement.query();
    let c = root.from.alias;

    assert!(root.filters.is_empty());
    let join = &root.joins[0];
    let DataSource::Derived(orders) = &join.source.source else {
        panic!("Expected a derived join source, got {:?}", join.source.source);
    };
    let o = orders.from.alias;
    assert_eq!(orders.where_predicate(), Some(col(o, "total").gt(lit_int(100))));
    assert_eq!(
        join.condition,
        Some(col(join.source.alias, "customer_id").eq(col(c, "id")))
    );
}

#[test]
fn test_or_inside_subquery_keeps_exists() {
    let query = customers_with_orders(HostExpr::or(
        belongs_to_customer(),
        HostExpr::compare(CompareOp::Gt, HostExpr::member("Total"), HostExpr::literal(100i64)),
    ));

    let statement = translate(&query, &metadata(), &Settings::default()).unwrap();
    let root = statement.query();
    assert!(root.joins.is_empty());
    assert!(matches!(
        root.where_predicate(),
        Some(SqlExpr::Exists { negated: false, .. })
    ));
}

#[test]
fn test_exists_under_or_is_kept() {
    let query = QueryExpr::Filter {
        source: source("Customer"),
        predicate: HostExpr::or(
            HostExpr::compare(CompareOp::Eq, HostExpr::member("Name"), HostExpr::literal("Ada")),
            HostExpr::Any {
                source: source("Order"),
                predicate: Some(Box::new(belongs_to_customer())),
            },
        ),
    };

    let statement = translate(&query, &metadata(), &Settings::default()).unwrap();
    let root = statement.query();
    assert!(root.joins.is_empty());

    let Some(SqlExpr::Binary { left, right, .. }) = root.where_predicate() else {
        panic!("Expected an OR predicate");
    };
    assert_eq!(*left, col(root.from.alias, "name").eq(lit_str("Ada")));
    assert!(matches!(*right, SqlExpr::Exists { .. }));
}

#[test]
fn test_disabled_pass_keeps_exists() {
    let settings = Settings::from_toml_str(
        r#"
[postprocess]
subquery_join = false
"#,
    )
    .unwrap();

    let statement = translate(
        &customers_with_orders(belongs_to_customer()),
        &metadata(),
        &settings,
    )
    .unwrap();
    assert!(statement.query().joins.is_empty());
    assert_eq!(statement.query().filters.len(), 1);
}

#[test]
fn test_postprocessed_output_is_a_fixed_point() {
    let statement = translate(
        &customers_with_orders(belongs_to_customer()),
        &metadata(),
        &Settings::default(),
    )
    .unwrap();

    let outcome = PostprocessOrchestrator::default()
        .run(statement.clone())
        .unwrap();
    assert_eq!(outcome.iterations, 1);
    assert_eq!(outcome.changes, 0);
    assert_eq!(outcome.statement, statement);
}

/// Flips the DISTINCT flag on every call.
struct Toggle;

impl Postprocessor for Toggle {
    fn name(&self) -> &'static str {
        "toggle"
    }

    fn process(&mut self, mut statement: SqlStatement) -> PostprocessResult<Transformed<SqlStatement>> {
        let query = statement.query_mut();
        query.distinct = !query.distinct;
        Ok(Transformed::Yes(statement))
    }
}

#[test]
fn test_oscillating_pass_hits_threshold() {
    let statement = translate(&*source("Customer"), &metadata(), &Settings::default()).unwrap();

    let result = PostprocessOrchestrator::new(50).with_pass(Toggle).run(statement);
    assert_eq!(
        result,
        Err(PostprocessError::ThresholdExceeded { iterations: 50 })
    );
}
