use quarry::config::Settings;
use quarry::metadata::InMemoryMetadata;
use quarry::sql::visit::free_aliases_in_table;
use quarry::sql::{
    col, count_star, func, lit_int, lit_str, DataSource, DerivedTable, ExprExt, JoinKind,
    OrderByExpr,
};
use quarry::translation::{
    translate, AggregateFunction, CompareOp, HostExpr, ProjectField, QueryExpr,
};

const METADATA: &str = r#"
[[entities]]
name = "Customer"
table = "customers"
schema = "sales"
columns = [
    { property = "Id", column = "id" },
    { property = "Name", column = "name" },
]

[[entities]]
name = "Shipper"
table = "shippers"
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
    { property = "ShipperId", column = "shipper_id" },
    { property = "Total", column = "total" },
]

[[entities.navigations]]
member = "Customer"
target = "Customer"
kind = "to_parent"
keys = [{ from = "CustomerId", to = "Id" }]

[[entities.navigations]]
member = "Shipper"
target = "Shipper"
kind = "to_parent_optional"
keys = [{ from = "ShipperId", to = "Id" }]
"#;

fn metadata() -> InMemoryMetadata {
    InMemoryMetadata::from_toml_str(METADATA).unwrap()
}

fn source(entity: &str) -> Box<QueryExpr> {
    Box::new(QueryExpr::Source {
        entity: entity.into(),
    })
}

fn name_is(name: &str) -> HostExpr {
    HostExpr::compare(CompareOp::Eq, HostExpr::member("Name"), HostExpr::literal(name))
}

fn derived(unit: &DerivedTable) -> &DerivedTable {
    match &unit.from.source {
        DataSource::Derived(inner) => inner,
        other => panic!("Expected a derived table, got {:?}", other),
    }
}

#[test]
fn test_filter_project_filter_nests_two_levels() {
    let query = QueryExpr::Filter {
        source: Box::new(QueryExpr::Project {
            source: Box::new(QueryExpr::Filter {
                source: source("Customer"),
                predicate: name_is("Ada"),
            }),
            fields: vec![
                ProjectField::new("CustomerName", HostExpr::member("Name")),
                ProjectField::new("Id", HostExpr::member("Id")),
            ],
        }),
        predicate: HostExpr::compare(
            CompareOp::Ne,
            HostExpr::member("CustomerName"),
            HostExpr::literal("x"),
        ),
    };

    let statement = translate(&query, &metadata(), &Settings::default()).unwrap();
    let outer = statement.query();
    let inner = derived(outer);
    let c = inner.from.alias;

    assert!(matches!(inner.from.source, DataSource::Table(_)));
    assert_eq!(inner.where_predicate(), Some(col(c, "name").eq(lit_str("Ada"))));
    let names: Vec<&str> = inner.output_columns().iter().map(|c| c.alias.as_str()).collect();
    assert_eq!(names, vec!["CustomerName", "Id"]);

    assert_eq!(
        outer.where_predicate(),
        Some(col(outer.from.alias, "CustomerName").ne(lit_str("x")))
    );
}

#[test]
fn test_navigation_adds_inner_join_once() {
    let query = QueryExpr::Filter {
        source: source("Order"),
        predicate: HostExpr::and(
            HostExpr::compare(
                CompareOp::Eq,
                HostExpr::member("Customer.Name"),
                HostExpr::literal("Ada"),
            ),
            HostExpr::compare(
                CompareOp::Gt,
                HostExpr::member("Customer.Id"),
                HostExpr::literal(10i64),
            ),
        ),
    };

    let statement = translate(&query, &metadata(), &Settings::default()).unwrap();
    let unit = statement.query();
    let o = unit.from.alias;

    assert_eq!(unit.joins.len(), 1);
    let join = &unit.joins[0];
    let c = join.source.alias;
    assert_eq!(join.kind, JoinKind::Inner);
    assert!(join.navigation);
    assert_eq!(join.condition, Some(col(o, "customer_id").eq(col(c, "id"))));
    assert_eq!(join.source.table().map(|t| t.schema.as_deref()), Some(Some("sales")));

    assert_eq!(
        unit.where_predicate(),
        Some(
            col(c, "name")
                .eq(lit_str("Ada"))
                .and(col(c, "id").gt(lit_int(10)))
        )
    );
}

#[test]
fn test_optional_navigation_is_left_join() {
    let query = QueryExpr::Filter {
        source: source("Order"),
        predicate: HostExpr::compare(
            CompareOp::Eq,
            HostExpr::member("Shipper.Name"),
            HostExpr::literal("Speedy"),
        ),
    };

    let statement = translate(&query, &metadata(), &Settings::default()).unwrap();
    let join = &statement.query().joins[0];
    assert_eq!(join.kind, JoinKind::Left);
    assert!(join.source.default_if_empty);
}

#[test]
fn test_group_by_with_aggregates() {
    let query = QueryExpr::GroupBy {
        source: source("Order"),
        keys: vec![ProjectField::new("CustomerId", HostExpr::member("CustomerId"))],
        aggregates: vec![
            ProjectField::new(
                "Total",
                HostExpr::Aggregate {
                    function: AggregateFunction::Sum,
                    operand: Some(Box::new(HostExpr::member("Total"))),
                },
            ),
            ProjectField::new(
                "Orders",
                HostExpr::Aggregate {
                    function: AggregateFunction::Count,
                    operand: None,
                },
            ),
        ],
    };

    let statement = translate(&query, &metadata(), &Settings::default()).unwrap();
    let unit = statement.query();
    let o = unit.from.alias;

    assert_eq!(unit.group_by, Some(vec![col(o, "customer_id")]));
    let exprs: Vec<_> = unit.output_columns().iter().map(|c| c.expr.clone()).collect();
    assert_eq!(
        exprs,
        vec![
            col(o, "customer_id"),
            func("SUM", vec![col(o, "total")]),
            count_star(),
        ]
    );
}

#[test]
fn test_skip_take_becomes_a_page() {
    let query = QueryExpr::Take {
        source: Box::new(QueryExpr::Skip {
            source: Box::new(QueryExpr::OrderBy {
                source: source("Customer"),
                key: HostExpr::member("Name"),
                descending: true,
                then_by: false,
            }),
            count: HostExpr::literal(20i64),
        }),
        count: HostExpr::literal(10i64),
    };

    let statement = translate(&query, &metadata(), &Settings::default()).unwrap();
    let unit = statement.query();
    let c = unit.from.alias;

    assert!(matches!(unit.from.source, DataSource::Table(_)));
    assert_eq!(unit.order_by, vec![OrderByExpr::desc(col(c, "name"))]);
    assert_eq!(unit.row_offset, Some(lit_int(20)));
    assert_eq!(unit.rows_per_page, Some(lit_int(10)));
    assert!(unit.top.is_none());
}

#[test]
fn test_then_by_refines_order() {
    let by_name = QueryExpr::OrderBy {
        source: source("Customer"),
        key: HostExpr::member("Name"),
        descending: false,
        then_by: false,
    };
    let then_id = QueryExpr::OrderBy {
        source: Box::new(by_name.clone()),
        key: HostExpr::member("Id"),
        descending: false,
        then_by: true,
    };
    let replace = QueryExpr::OrderBy {
        source: Box::new(by_name),
        key: HostExpr::member("Id"),
        descending: false,
        then_by: false,
    };

    let refined = translate(&then_id, &metadata(), &Settings::default()).unwrap();
    let c = refined.query().from.alias;
    assert_eq!(
        refined.query().order_by,
        vec![OrderByExpr::asc(col(c, "name")), OrderByExpr::asc(col(c, "id"))]
    );

    let replaced = translate(&replace, &metadata(), &Settings::default()).unwrap();
    let c = replaced.query().from.alias;
    assert_eq!(replaced.query().order_by, vec![OrderByExpr::asc(col(c, "id"))]);
}

#[test]
fn test_union_of_filtered_customers() {
    let query = QueryExpr::Union {
        left: Box::new(QueryExpr::Filter {
            source: source("Customer"),
            predicate: name_is("Ada"),
        }),
        right: Box::new(QueryExpr::Filter {
            source: source("Customer"),
            predicate: name_is("Grace"),
        }),
        all: false,
    };

    let statement = translate(&query, &metadata(), &Settings::default()).unwrap();
    let unit = statement.query();
    assert_eq!(unit.unions.len(), 1);
    assert!(!unit.unions[0].all);

    let branch = &unit.unions[0].query;
    assert_ne!(branch.from.alias, unit.from.alias);
    assert_eq!(
        branch.where_predicate(),
        Some(col(branch.from.alias, "name").eq(lit_str("Grace")))
    );
    assert_eq!(branch.output_columns().len(), unit.output_columns().len());
}

fn customer_name_is(name: &str) -> HostExpr {
    HostExpr::compare(
        CompareOp::Eq,
        HostExpr::member("Customer.Name"),
        HostExpr::literal(name),
    )
}

#[test]
fn test_navigation_after_union_joins_the_wrapper() {
    let query = QueryExpr::Filter {
        source: Box::new(QueryExpr::Union {
            left: source("Order"),
            right: source("Order"),
            all: true,
        }),
        predicate: customer_name_is("Ada"),
    };

    let statement = translate(&query, &metadata(), &Settings::default()).unwrap();
    let outer = statement.query();
    let inner = derived(outer);

    assert_eq!(inner.unions.len(), 1);
    assert!(inner.joins.is_empty());
    assert!(inner.unions[0].query.joins.is_empty());

    assert_eq!(outer.joins.len(), 1);
    let join = &outer.joins[0];
    let customer = join.source.alias;
    assert!(join.navigation);
    assert_eq!(
        join.condition,
        Some(col(outer.from.alias, "customer_id").eq(col(customer, "id")))
    );
    assert_eq!(
        outer.where_predicate(),
        Some(col(customer, "name").eq(lit_str("Ada")))
    );
    assert!(free_aliases_in_table(outer).is_empty());
}

#[test]
fn test_navigation_after_top_joins_the_wrapper() {
    let query = QueryExpr::Filter {
        source: Box::new(QueryExpr::Take {
            source: source("Order"),
            count: HostExpr::literal(5i64),
        }),
        predicate: customer_name_is("Ada"),
    };

    let statement = translate(&query, &metadata(), &Settings::default()).unwrap();
    let outer = statement.query();
    let inner = derived(outer);

    assert_eq!(inner.top, Some(lit_int(5)));
    assert!(inner.joins.is_empty());
    assert_eq!(outer.joins.len(), 1);
    assert!(outer.joins[0].navigation);
    assert!(outer.top.is_none());
    assert!(free_aliases_in_table(outer).is_empty());
}

#[test]
fn test_query_from_json() {
    let json = r#"{
        "op": "take",
        "count": { "kind": "parameter", "name": "limit", "value": 5 },
        "source": {
            "op": "filter",
            "source": { "op": "source", "entity": "Order" },
            "predicate": {
                "kind": "compare", "op": "eq",
                "left":  { "kind": "member", "path": "Customer.Name" },
                "right": { "kind": "literal", "value": "Ada" }
            }
        }
    }"#;

    let query: QueryExpr = serde_json::from_str(json).unwrap();
    let statement = translate(&query, &metadata(), &Settings::default()).unwrap();
    let unit = statement.query();

    assert_eq!(unit.joins.len(), 1);
    assert!(matches!(unit.top, Some(quarry::sql::SqlExpr::Parameter { .. })));
}

#[test]
fn test_demo_queries_translate() {
    let dir = std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join("demos");
    let metadata = InMemoryMetadata::from_file(dir.join("shop.toml")).unwrap();

    for file in ["active_customers.json", "org_chart.json"] {
        let json = std::fs::read_to_string(dir.join(file)).unwrap();
        let query: QueryExpr = serde_json::from_str(&json).unwrap();
        let result = translate(&query, &metadata, &Settings::default());
        assert!(result.is_ok(), "{}: {:?}", file, result);
    }
}
