use quarry::builder::{ConversionContext, Operation, QueryBuilder, QueryError};
use quarry::metadata::{EntityMetadata, InMemoryMetadata};
use quarry::sql::{
    col, lit_int, lit_str, DataSource, DerivedTable, ExprExt, ModelPath, OrderByExpr,
    SelectColumn, SqlExpr,
};

fn metadata() -> InMemoryMetadata {
    InMemoryMetadata::new().with_entity(
        EntityMetadata::new("Customer", "customers")
            .column("Id", "id")
            .column("Name", "name")
            .column("Country", "country"),
    )
}

fn field(expr: SqlExpr, path: &str) -> SelectColumn {
    SelectColumn {
        expr,
        alias: String::new(),
        model_path: ModelPath::parse(path),
    }
}

/// Number of derived tables stacked under `unit`'s FROM.
fn depth(unit: &DerivedTable) -> usize {
    match &unit.from.source {
        DataSource::Derived(inner) => 1 + depth(inner),
        _ => 0,
    }
}

fn inner(unit: &DerivedTable) -> &DerivedTable {
    match &unit.from.source {
        DataSource::Derived(inner) => inner,
        other => panic!("Expected a derived table, got {:?}", other),
    }
}

#[test]
fn test_filter_after_projection_nests_once() {
    let metadata = metadata();
    let mut ctx = ConversionContext::new();
    let mut builder = QueryBuilder::from_table(&mut ctx, &metadata, "Customer").unwrap();
    let c = builder.initial_alias();

    builder
        .apply_where(&mut ctx, col(c, "name").eq(lit_str("Ada")), false)
        .unwrap();
    builder
        .apply_projection(
            &mut ctx,
            vec![
                field(col(c, "name"), "CustomerName"),
                field(col(c, "id"), "Id"),
            ],
        )
        .unwrap();
    builder
        .apply_where(&mut ctx, col(c, "name").ne(lit_str("x")), false)
        .unwrap();

    let unit = builder.close(&mut ctx).unwrap();
    assert_eq!(depth(&unit), 1);

    let nested = inner(&unit);
    assert_eq!(nested.where_predicate(), Some(col(c, "name").eq(lit_str("Ada"))));
    assert_eq!(nested.output_columns().len(), 2);
    assert_eq!(nested.output_columns()[0].alias, "CustomerName");

    // The outer filter reads the inner projection through the wrapper alias.
    let d = unit.from.alias;
    assert_ne!(d, c);
    assert_eq!(
        unit.where_predicate(),
        Some(col(d, "CustomerName").ne(lit_str("x")))
    );
    assert!(unit.auto_projection);
    assert_eq!(unit.output_columns().len(), 2);
}

#[test]
fn test_filter_order_top_stays_flat() {
    let metadata = metadata();
    let mut ctx = ConversionContext::new();
    let mut builder = QueryBuilder::from_table(&mut ctx, &metadata, "Customer").unwrap();
    let c = builder.initial_alias();

    builder
        .apply_where(&mut ctx, col(c, "country").eq(lit_str("NZ")), false)
        .unwrap();
    builder
        .apply_order_by(&mut ctx, vec![OrderByExpr::asc(col(c, "name"))], false)
        .unwrap();
    builder.apply_top(&mut ctx, lit_int(10)).unwrap();
    assert_eq!(builder.last_operation(), Some(Operation::Top));

    let unit = builder.close(&mut ctx).unwrap();
    assert_eq!(depth(&unit), 0);
    assert_eq!(unit.top, Some(lit_int(10)));
    assert_eq!(unit.order_by.len(), 1);
}

#[test]
fn test_filter_after_top_wraps() {
    let metadata = metadata();
    let mut ctx = ConversionContext::new();
    let mut builder = QueryBuilder::from_table(&mut ctx, &metadata, "Customer").unwrap();
    let c = builder.initial_alias();

    builder.apply_top(&mut ctx, lit_int(5)).unwrap();
    builder
        .apply_where(&mut ctx, col(c, "name").eq(lit_str("Ada")), false)
        .unwrap();

    let unit = builder.close(&mut ctx).unwrap();
    assert_eq!(depth(&unit), 1);
    assert_eq!(inner(&unit).top, Some(lit_int(5)));
    assert!(unit.top.is_none());
    assert_eq!(
        unit.where_predicate(),
        Some(col(unit.from.alias, "name").eq(lit_str("Ada")))
    );
}

#[test]
fn test_every_wrap_adds_one_level() {
    let metadata = metadata();
    let mut ctx = ConversionContext::new();
    let mut builder = QueryBuilder::from_table(&mut ctx, &metadata, "Customer").unwrap();

    // Distinct -> Distinct wraps each time instead of failing.
    for _ in 0..3 {
        builder.apply_distinct(&mut ctx).unwrap();
    }

    let unit = builder.close(&mut ctx).unwrap();
    assert_eq!(depth(&unit), 2);
    assert!(unit.distinct);
    assert!(inner(&unit).distinct);
    assert!(inner(inner(&unit)).distinct);
}

#[test]
fn test_skip_then_page_shares_a_unit() {
    let metadata = metadata();
    let mut ctx = ConversionContext::new();
    let mut builder = QueryBuilder::from_table(&mut ctx, &metadata, "Customer").unwrap();

    builder.apply_row_offset(&mut ctx, lit_int(20)).unwrap();
    builder.apply_rows_per_page(&mut ctx, lit_int(10)).unwrap();

    let unit = builder.close(&mut ctx).unwrap();
    assert_eq!(depth(&unit), 0);
    assert_eq!(unit.row_offset, Some(lit_int(20)));
    assert_eq!(unit.rows_per_page, Some(lit_int(10)));
    // Paging without an order falls back to ORDER BY 1.
    assert_eq!(unit.order_by, vec![OrderByExpr::asc(lit_int(1))]);
}

#[test]
fn test_second_group_by_without_wrap_is_rejected() {
    let metadata = metadata();
    let mut ctx = ConversionContext::new();
    let mut builder = QueryBuilder::from_table(&mut ctx, &metadata, "Customer").unwrap();
    let c = builder.initial_alias();

    builder
        .apply_group_by(&mut ctx, vec![col(c, "country")])
        .unwrap();
    assert_eq!(
        builder.apply_group_by(&mut ctx, vec![col(c, "name")]),
        Err(QueryError::ClauseAlreadySet {
            clause: Operation::GroupBy
        })
    );
}
