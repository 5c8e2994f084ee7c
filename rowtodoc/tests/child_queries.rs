use rowtodoc::database::MemoryDatabase;
use rowtodoc::engine::{resolve_children, ExecutionStats};
use rowtodoc::query::{ChildQuery, TableQuery};
use rowtodoc::{row, Row, RowToDocError, RowToDocResult, Value};

const LINE_ITEMS: &str = "select * from line_items";
const SHIPMENTS: &str = "select * from shipments";
const SKUS: &str = "select * from skus";

fn orders() -> Vec<Row> {
    vec![
        row! { "id" => 1, "customer" => "A" },
        row! { "id" => 2, "customer" => "B" },
    ]
}

fn line_items() -> Vec<Row> {
    vec![
        row! { "order_id" => 1, "sku" => "X" },
        row! { "order_id" => 1, "sku" => "Y" },
        row! { "order_id" => 2, "sku" => "Z" },
    ]
}

fn items_query() -> ChildQuery {
    ChildQuery::one_to_many(LINE_ITEMS, "id", "order_id", "items")
}

fn list(rows: Vec<Row>) -> Value {
    Value::List(rows.into_iter().map(Value::Record).collect())
}

#[tokio::test]
async fn orders_with_line_items() -> RowToDocResult<()> {
    let mut db = MemoryDatabase::new().with_rows(LINE_ITEMS, line_items());
    let tree = TableQuery::new().with_child(items_query());
    let mut rows = orders();

    resolve_children(&mut db, &tree, &mut rows).await?;

    assert_eq!(
        rows,
        vec![
            row! {
                "id" => 1,
                "customer" => "A",
                "items" => list(vec![
                    row! { "order_id" => 1, "sku" => "X" },
                    row! { "order_id" => 1, "sku" => "Y" },
                ]),
            },
            row! {
                "id" => 2,
                "customer" => "B",
                "items" => list(vec![row! { "order_id" => 2, "sku" => "Z" }]),
            },
        ]
    );

    Ok(())
}

#[tokio::test]
async fn one_to_many_keeps_result_set_order() -> RowToDocResult<()> {
    let mut db = MemoryDatabase::new().with_rows(
        "select * from c",
        vec![
            row! { "C" => 1, "n" => "first" },
            row! { "C" => 3, "n" => "other" },
            row! { "C" => 1, "n" => "second" },
            row! { "C" => 1, "n" => "third" },
        ],
    );
    let tree = TableQuery::new().with_child(ChildQuery::one_to_many(
        "select * from c",
        "P",
        "C",
        "children",
    ));
    let mut rows = vec![row! { "P" => 1 }, row! { "P" => 2 }];

    resolve_children(&mut db, &tree, &mut rows).await?;

    let names: Vec<&Value> = rows[0]
        .get("children")
        .and_then(Value::as_list)
        .unwrap()
        .iter()
        .map(|child| child.as_record().unwrap().get("n").unwrap())
        .collect();
    assert_eq!(
        names,
        vec![
            &Value::from("first"),
            &Value::from("second"),
            &Value::from("third")
        ]
    );

    // no children is an empty list, never an error or a missing key
    assert_eq!(rows[1].get("children"), Some(&Value::List(vec![])));

    Ok(())
}

#[tokio::test]
async fn one_query_per_node_regardless_of_batch_size() -> RowToDocResult<()> {
    let parents: Vec<Row> = (0..250).map(|id| row! { "id" => id }).collect();
    let items: Vec<Row> = (0..250)
        .flat_map(|id| {
            (0..3).map(move |n| row! { "order_id" => id, "sku" => format!("sku-{}", n) })
        })
        .collect();
    let shipments: Vec<Row> = (0..250)
        .map(|id| row! { "order_id" => id, "carrier" => "post" })
        .collect();
    let skus: Vec<Row> = (0..3)
        .map(|n| row! { "sku" => format!("sku-{}", n), "price" => n * 10 })
        .collect();

    let mut db = MemoryDatabase::new()
        .with_rows(LINE_ITEMS, items)
        .with_rows(SHIPMENTS, shipments)
        .with_rows(SKUS, skus);
    let tree = TableQuery::new()
        .with_child(
            items_query().with_child(ChildQuery::one_to_one(SKUS, "sku", "sku", "product")),
        )
        .with_child(ChildQuery::one_to_many(SHIPMENTS, "id", "order_id", "shipments"));

    let mut rows = parents;
    let stats = resolve_children(&mut db, &tree, &mut rows).await?;

    assert_eq!(stats.queries, tree.node_count());
    assert_eq!(
        stats,
        ExecutionStats {
            queries: 3,
            rows_fetched: 750 + 250 + 3,
        }
    );
    assert_eq!(db.executed(), vec![LINE_ITEMS, SKUS, SHIPMENTS]);

    Ok(())
}

#[tokio::test]
async fn grandchildren_are_copied_into_every_group() -> RowToDocResult<()> {
    let mut db = MemoryDatabase::new()
        .with_rows(
            LINE_ITEMS,
            vec![
                row! { "order_id" => 1, "sku" => "X" },
                row! { "order_id" => 2, "sku" => "X" },
                row! { "order_id" => 2, "sku" => "Y" },
            ],
        )
        .with_rows(
            SKUS,
            vec![
                row! { "sku" => "X", "warehouse" => "north" },
                row! { "sku" => "X", "warehouse" => "south" },
            ],
        );
    let tree = TableQuery::new().with_child(
        items_query().with_child(ChildQuery::one_to_many(SKUS, "sku", "sku", "stock")),
    );
    let mut rows = orders();

    resolve_children(&mut db, &tree, &mut rows).await?;

    let stock_of = |order: &Row, index: usize| -> Value {
        let items = order.get("items").and_then(Value::as_list).unwrap();
        items[index]
            .as_record()
            .and_then(|item| item.get("stock"))
            .cloned()
            .unwrap()
    };

    let expected = list(vec![
        row! { "sku" => "X", "warehouse" => "north" },
        row! { "sku" => "X", "warehouse" => "south" },
    ]);
    assert_eq!(stock_of(&rows[0], 0), expected);
    assert_eq!(stock_of(&rows[1], 0), expected);
    assert_eq!(stock_of(&rows[1], 1), Value::List(vec![]));
    assert_eq!(db.execution_count(), 2);

    Ok(())
}

#[tokio::test]
async fn grandchild_failure_keeps_child_data() {
    let mut db = MemoryDatabase::new()
        .with_rows(LINE_ITEMS, line_items())
        .fail_on(SKUS, "relation \"skus\" does not exist");
    let tree = TableQuery::new().with_child(
        items_query().with_child(ChildQuery::one_to_one(SKUS, "sku", "sku", "product")),
    );
    let mut rows = orders();

    let err = resolve_children(&mut db, &tree, &mut rows)
        .await
        .unwrap_err();

    match err {
        RowToDocError::QueryExecution { node, .. } => assert_eq!(node, "items.product"),
        other => panic!("unexpected error: {:?}", other),
    }

    let items = rows[0].get("items").and_then(Value::as_list).unwrap();
    assert_eq!(items.len(), 2);
    assert!(!items[0].as_record().unwrap().contains("product"));
}

#[tokio::test]
async fn sibling_failure_stops_later_siblings() {
    let mut db = MemoryDatabase::new()
        .fail_on(LINE_ITEMS, "permission denied")
        .with_rows(SHIPMENTS, vec![]);
    let tree = TableQuery::new()
        .with_child(items_query())
        .with_child(ChildQuery::one_to_many(SHIPMENTS, "id", "order_id", "shipments"));
    let mut rows = orders();

    assert!(resolve_children(&mut db, &tree, &mut rows).await.is_err());
    assert_eq!(db.executed(), vec![LINE_ITEMS]);
    assert!(!rows[0].contains("shipments"));
}

#[tokio::test]
async fn tree_from_json() -> RowToDocResult<()> {
    let tree = TableQuery::from_json(
        r#"{
            "query": "select * from orders",
            "childQueries": [{
                "query": "select * from line_items",
                "primaryKeyColumnName": "id",
                "foreignKeyColumnName": "order_id",
                "propertyName": "items"
            }]
        }"#,
    )?;
    let mut db = MemoryDatabase::new().with_rows(LINE_ITEMS, line_items());
    let mut rows = orders();

    resolve_children(&mut db, &tree, &mut rows).await?;

    assert_eq!(
        rows[1].get("items"),
        Some(&list(vec![row! { "order_id" => 2, "sku" => "Z" }]))
    );
    Ok(())
}
