use quarry::builder::{auto_projection_columns, ConversionContext, QueryBuilder};
use quarry::config::Settings;
use quarry::metadata::InMemoryMetadata;
use quarry::sql::{col, DataSource, ExprExt, JoinKind, ModelPath};
use quarry::translation::{translate, CompareOp, HostExpr, ProjectField, QueryExpr};

const METADATA: &str = r#"
[[entities]]
name = "Customer"
table = "customers"
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

#[test]
fn test_colliding_field_names_get_suffix() {
    let query = QueryExpr::Project {
        source: Box::new(QueryExpr::Join {
            outer: source("Order"),
            inner: source("Customer"),
            outer_key: HostExpr::member("CustomerId"),
            inner_key: HostExpr::member("Id"),
            outer_name: "o".into(),
            inner_name: "c".into(),
            left: false,
        }),
        fields: vec![
            ProjectField::new("Customer.Name", HostExpr::member("c.Name")),
            ProjectField::new("Shipper.Name", HostExpr::member("o.Shipper.Name")),
        ],
    };

    let statement = translate(&query, &metadata(), &Settings::default()).unwrap();
    let unit = statement.query();

    let aliases: Vec<&str> = unit.output_columns().iter().map(|c| c.alias.as_str()).collect();
    assert_eq!(aliases, vec!["Name", "Name_1"]);
    assert_eq!(
        unit.output_columns()[1].model_path,
        ModelPath::parse("Shipper.Name")
    );

    // One explicit join, one navigation join for the optional shipper.
    assert_eq!(unit.joins.len(), 2);
    assert_eq!(unit.joins[0].kind, JoinKind::Inner);
    assert!(!unit.joins[0].navigation);
    assert_eq!(unit.joins[1].kind, JoinKind::Left);
    assert!(unit.joins[1].navigation);

    let customer = unit.joins[0].source.alias;
    let shipper = unit.joins[1].source.alias;
    assert_eq!(unit.output_columns()[0].expr, col(customer, "name"));
    assert_eq!(unit.output_columns()[1].expr, col(shipper, "name"));
}

#[test]
fn test_configured_separator_used_for_collisions() {
    let settings = Settings::from_toml_str(
        r#"
[projection]
collision_separator = "__"
"#,
    )
    .unwrap();

    let query = QueryExpr::Project {
        source: source("Order"),
        fields: vec![
            ProjectField::new("Customer.Name", HostExpr::member("Customer.Name")),
            ProjectField::new("Shipper.Name", HostExpr::member("Shipper.Name")),
        ],
    };

    let statement = translate(&query, &metadata(), &settings).unwrap();
    let aliases: Vec<&str> = statement
        .query()
        .output_columns()
        .iter()
        .map(|c| c.alias.as_str())
        .collect();
    assert_eq!(aliases, vec!["Name", "Name__1"]);
}

#[test]
fn test_auto_projection_covers_every_source() {
    let metadata = metadata();
    let mut ctx = ConversionContext::new();
    let mut builder = QueryBuilder::from_table(&mut ctx, &metadata, "Order").unwrap();
    let o = builder.initial_alias();
    let customer = ctx.table_source(&metadata, "Customer").unwrap();
    let c = builder.add_data_source(&mut ctx, customer).unwrap();
    builder
        .apply_join(
            c,
            JoinKind::Inner,
            Some(col(o, "customer_id").eq(col(c, "id"))),
        )
        .unwrap();

    let columns = auto_projection_columns(builder.unit(), false, "_");
    let aliases: Vec<&str> = columns.iter().map(|c| c.alias.as_str()).collect();
    assert_eq!(aliases, vec!["id", "customer_id", "shipper_id", "id_1", "name"]);
    assert_eq!(columns[3].expr, col(c, "id"));
    // Both sources sit at the empty path, so the second Id keeps its output name.
    assert_eq!(columns[0].model_path, ModelPath::parse("Id"));
    assert_eq!(columns[3].model_path, ModelPath::parse("id_1"));
}

#[test]
fn test_navigation_joins_left_out_of_closing_projection() {
    let query = QueryExpr::Filter {
        source: source("Order"),
        predicate: HostExpr::compare(
            CompareOp::Eq,
            HostExpr::member("Customer.Name"),
            HostExpr::literal("Ada"),
        ),
    };

    let statement = translate(&query, &metadata(), &Settings::default()).unwrap();
    let unit = statement.query();
    assert!(unit.auto_projection);
    assert_eq!(unit.joins.len(), 1);
    assert!(unit.joins[0].navigation);

    let o = unit.from.alias;
    assert!(matches!(unit.from.source, DataSource::Table(_)));
    assert!(unit.output_columns().iter().all(|c| c.expr.as_column().map(|r| r.source) == Some(o)));
    assert_eq!(unit.output_columns().len(), 3);
}
