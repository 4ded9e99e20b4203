#![allow(dead_code)]

use futures::StreamExt;
use std::{
    collections::VecDeque,
    sync::{Arc, Mutex},
};
use vessel::{
    Column, ColumnType, Connection, Connector, Dsn, Pool, RawResult, Result, RowLabeled,
    RowNames, RowValues, RowsAffected, SchemaRegistry, TableSchema, Value, define_table,
};

/// One scripted driver response, consumed in order by [`MockConnection`].
#[derive(Debug, Clone)]
pub enum Reply {
    Affected(u64, Option<i64>),
    Rows(Vec<RowLabeled>),
}

#[derive(Default)]
pub struct MockState {
    /// Every statement run, with its bound parameters.
    pub executed: Vec<(String, Vec<Value>)>,
    /// Transaction demarcation calls in order: "begin", "commit", "rollback".
    pub ops: Vec<String>,
    pub replies: VecDeque<Reply>,
}

impl MockState {
    pub fn executed_sql(&self) -> Vec<&str> {
        self.executed.iter().map(|(sql, _)| sql.as_str()).collect()
    }
}

/// In-memory driver replaying scripted replies. Statements that outrun the
/// script get a one-row affected response, which covers demarcation-only
/// traffic like savepoints.
pub struct MockConnection {
    pub state: Arc<Mutex<MockState>>,
}

impl Connection for MockConnection {
    async fn run(&mut self, sql: &str, params: &[Value]) -> Result<RawResult> {
        let mut state = self.state.lock().unwrap();
        state.executed.push((sql.to_owned(), params.to_vec()));
        let reply = state
            .replies
            .pop_front()
            .unwrap_or(Reply::Affected(1, None));
        Ok(match reply {
            Reply::Affected(rows_affected, last_affected_id) => {
                RawResult::Affected(RowsAffected {
                    rows_affected,
                    last_affected_id,
                })
            }
            Reply::Rows(rows) => RawResult::Rows(stream_of(rows)),
        })
    }

    async fn begin(&mut self) -> Result<()> {
        self.state.lock().unwrap().ops.push("begin".into());
        Ok(())
    }

    async fn commit(&mut self) -> Result<()> {
        self.state.lock().unwrap().ops.push("commit".into());
        Ok(())
    }

    async fn rollback(&mut self) -> Result<()> {
        self.state.lock().unwrap().ops.push("rollback".into());
        Ok(())
    }
}

/// Connector handing out single-connection mock pools, whatever the DSN.
pub struct MockConnector;

impl Connector for MockConnector {
    type Connection = MockConnection;

    async fn connect(&self, _dsn: &Dsn) -> Result<Pool<MockConnection>> {
        let state = Arc::new(Mutex::new(MockState::default()));
        Ok(Pool::new(vec![MockConnection { state }]))
    }
}

fn stream_of(rows: Vec<RowLabeled>) -> vessel::RowStream {
    futures::stream::iter(rows.into_iter().map(Ok)).boxed()
}

/// Single-connection pool over a scripted mock, plus a handle to its state.
pub fn mock_pool(replies: Vec<Reply>) -> (Pool<MockConnection>, Arc<Mutex<MockState>>) {
    let _ = env_logger::builder().is_test(true).try_init();
    let state = Arc::new(Mutex::new(MockState {
        replies: replies.into(),
        ..Default::default()
    }));
    let conn = MockConnection {
        state: state.clone(),
    };
    (Pool::new(vec![conn]), state)
}

pub fn labeled(columns: &[(&str, Value)]) -> RowLabeled {
    let labels: RowNames = columns.iter().map(|(name, _)| name.to_string()).collect();
    let values: RowValues = columns.iter().map(|(_, value)| value.clone()).collect();
    RowLabeled::new(labels, values)
}

pub fn define_users(registry: &mut SchemaRegistry) -> Arc<TableSchema> {
    registry
        .define(
            define_table("users")
                .column(Column::new("id", ColumnType::Serial).primary_key())
                .column(Column::new("name", ColumnType::Text).not_null())
                .column(Column::new("email", ColumnType::Text)),
        )
        .unwrap()
}

/// Mutually referencing pair: employees point at their department, the
/// department points back at its head employee.
pub fn define_org(registry: &mut SchemaRegistry) -> (Arc<TableSchema>, Arc<TableSchema>) {
    registry
        .define(
            define_table("departments")
                .column(Column::new("id", ColumnType::Serial).primary_key())
                .column(Column::new("title", ColumnType::Text).not_null())
                .column(Column::new("head", ColumnType::Integer)),
        )
        .unwrap();
    let employees = registry
        .define(
            define_table("employees")
                .column(Column::new("id", ColumnType::Serial).primary_key())
                .column(Column::new("name", ColumnType::Text).not_null())
                .column(Column::new("department", ColumnType::Integer))
                .foreign_key(["department"], "departments", ["id"]),
        )
        .unwrap();
    let departments = registry
        .add_foreign_key("departments", ["head"], "employees", ["id"])
        .unwrap();
    (employees, departments)
}
