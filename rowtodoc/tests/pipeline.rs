use std::num::NonZeroUsize;

use async_trait::async_trait;
use rowtodoc::config::PipelineConfig;
use rowtodoc::database::MemoryDatabase;
use rowtodoc::pipeline::{DocumentSink, FailurePolicy, Pipeline, RunSummary};
use rowtodoc::query::{ChildQuery, TableQuery};
use rowtodoc::{row, transport, Row, RowToDocError, RowToDocResult};

const ORDERS: &str = "select * from orders";
const LINE_ITEMS: &str = "select * from line_items";

fn orders(count: i64) -> Vec<Row> {
    (1..=count).map(|id| row! { "id" => id }).collect()
}

fn tree() -> TableQuery {
    TableQuery::with_query(ORDERS).with_child(ChildQuery::one_to_many(
        LINE_ITEMS,
        "id",
        "order_id",
        "items",
    ))
}

fn batch_size(size: usize) -> NonZeroUsize {
    NonZeroUsize::new(size).unwrap()
}

#[derive(Default)]
struct RoutingSink {
    documents: Vec<String>,
    rejected: Vec<(Vec<Row>, String)>,
}

#[async_trait]
impl DocumentSink for RoutingSink {
    async fn write_document(&mut self, document: String) -> RowToDocResult<()> {
        self.documents.push(document);
        Ok(())
    }

    async fn reject_batch(&mut self, frame: Vec<u8>, error: &RowToDocError) -> RowToDocResult<()> {
        self.rejected
            .push((transport::decode_batch(&frame)?, error.to_string()));
        Ok(())
    }
}

#[tokio::test]
async fn documents_in_source_order() -> RowToDocResult<()> {
    let mut source = MemoryDatabase::new().with_rows(ORDERS, orders(3));
    let mut children = MemoryDatabase::new().with_rows(
        LINE_ITEMS,
        vec![
            row! { "order_id" => 3, "sku" => "Z" },
            row! { "order_id" => 1, "sku" => "X" },
        ],
    );
    let pipeline = Pipeline::new(ORDERS, batch_size(2)).with_child_queries(tree());
    let mut sink: Vec<String> = vec![];

    let summary = pipeline.run(&mut source, &mut children, &mut sink).await?;

    assert_eq!(
        sink,
        vec![
            r#"{"id":1,"items":[{"order_id":1,"sku":"X"}]}"#,
            r#"{"id":2,"items":[]}"#,
            r#"{"id":3,"items":[{"order_id":3,"sku":"Z"}]}"#,
        ]
    );
    assert_eq!(
        summary,
        RunSummary {
            batches: 2,
            rows: 3,
            documents: 3,
            failed_batches: 0,
            child_queries: 2,
        }
    );
    // one child query per batch, not per row
    assert_eq!(children.execution_count(), 2);

    Ok(())
}

#[tokio::test]
async fn without_child_queries_rows_pass_through() -> RowToDocResult<()> {
    let mut source = MemoryDatabase::new().with_rows(ORDERS, vec![row! { "id" => 1, "note" => "hi" }]);
    let mut children = MemoryDatabase::new();
    let mut sink: Vec<String> = vec![];

    Pipeline::new(ORDERS, batch_size(10))
        .run(&mut source, &mut children, &mut sink)
        .await?;

    assert_eq!(sink, vec![r#"{"id":1,"note":"hi"}"#]);
    assert_eq!(children.execution_count(), 0);
    Ok(())
}

#[tokio::test]
async fn abort_stops_at_first_failed_batch() {
    let mut source = MemoryDatabase::new().with_rows(ORDERS, orders(4));
    let mut children = MemoryDatabase::new().fail_on(LINE_ITEMS, "deadlock detected");
    let pipeline = Pipeline::new(ORDERS, batch_size(2)).with_child_queries(tree());
    let mut sink: Vec<String> = vec![];

    let err = pipeline
        .run(&mut source, &mut children, &mut sink)
        .await
        .unwrap_err();

    assert!(matches!(err, RowToDocError::QueryExecution { .. }));
    assert!(sink.is_empty());
    assert_eq!(children.execution_count(), 1);
}

#[tokio::test]
async fn route_hands_over_the_unenriched_batch() -> RowToDocResult<()> {
    let mut source = MemoryDatabase::new().with_rows(ORDERS, orders(3));
    let mut children = MemoryDatabase::new().fail_on(LINE_ITEMS, "deadlock detected");
    let pipeline = Pipeline::new(ORDERS, batch_size(2))
        .with_child_queries(tree())
        .with_failure_policy(FailurePolicy::Route);
    let mut sink = RoutingSink::default();

    let summary = pipeline.run(&mut source, &mut children, &mut sink).await?;

    assert!(sink.documents.is_empty());
    assert_eq!(summary.failed_batches, 2);
    assert_eq!(sink.rejected.len(), 2);
    assert_eq!(sink.rejected[0].0, orders(2));
    assert_eq!(sink.rejected[1].0, vec![row! { "id" => 3 }]);
    assert!(sink.rejected[0].1.contains("items"));

    Ok(())
}

#[tokio::test]
async fn source_failure_always_aborts() {
    let mut source = MemoryDatabase::new()
        .with_rows(ORDERS, orders(5))
        .fail_after(ORDERS, 3, "server closed the connection");
    let mut children = MemoryDatabase::new();
    let pipeline = Pipeline::new(ORDERS, batch_size(2)).with_failure_policy(FailurePolicy::Route);
    let mut sink: Vec<String> = vec![];

    let err = pipeline
        .run(&mut source, &mut children, &mut sink)
        .await
        .unwrap_err();

    assert!(matches!(err, RowToDocError::Source(_)));
    // the complete first batch went out, the partial second did not
    assert_eq!(sink.len(), 2);
}

#[tokio::test]
async fn configured_pipeline_uses_root_query_and_date_format() -> RowToDocResult<()> {
    let config = PipelineConfig::from_toml_str(
        r#"
        date_format = "%d.%m.%Y"
        child_query_json = '''
        {"query": "select * from orders", "childQueries": []}
        '''
        "#,
    )?;
    let pipeline = Pipeline::from_config(&config)?;
    assert_eq!(pipeline.query(), ORDERS);

    let due = chrono::NaiveDate::from_ymd_opt(2018, 9, 1).unwrap();
    let mut source = MemoryDatabase::new().with_rows(ORDERS, vec![row! { "id" => 1, "due" => due }]);
    let mut sink: Vec<String> = vec![];

    pipeline
        .run(&mut source, &mut MemoryDatabase::new(), &mut sink)
        .await?;

    assert_eq!(sink, vec![r#"{"id":1,"due":"01.09.2018"}"#]);
    Ok(())
}
