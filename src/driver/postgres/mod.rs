//! PostgreSQL wire protocol driver
//!
//! Works with any backend that speaks the PostgreSQL protocol (PostgreSQL
//! itself, QuestDB, CockroachDB, ...) through tokio-postgres.
//!
//! Parameters are prepared with the wire types declared in the test
//! description. Parameters with an unrecognized type tag are prepared as
//! unspecified (OID 0) and the server infers their type; values are then
//! encoded against whatever type the server settled on.
//!
//! Statements without parameters that return no rows go through the simple
//! query protocol, which also accepts utility commands some backends refuse
//! to prepare.

mod decode;

use async_trait::async_trait;
use bytes::BytesMut;
use std::error::Error as StdError;
use tokio::task::JoinHandle;
use tokio_postgres::types::{to_sql_checked, IsNull, Kind, ToSql, Type};
use tokio_postgres::{Client, Config as PgConfig, NoTls, Row, SimpleQueryMessage};
use uuid::Uuid;
use tracing::{debug, warn};

use crate::common::config::ConnectionConfig;
use crate::common::{Error, Result};
use crate::testing::params::{BoundParam, ParamType};
use crate::testing::value::Value;

use self::decode::Column;
use super::{
    leading_keyword, Connector, ExecutionResult, PlaceholderStyle, QueryAdapter, QueryKind, Record,
};

/// Opens one [`PostgresAdapter`] per call
pub struct PostgresConnector {
    config: ConnectionConfig,
}

impl PostgresConnector {
    pub fn new(config: ConnectionConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl Connector for PostgresConnector {
    fn describe(&self) -> String {
        format!(
            "postgres://{}@{}/{}",
            self.config.user,
            self.config.endpoint(),
            self.config.database
        )
    }

    async fn connect(&self) -> Result<Box<dyn QueryAdapter>> {
        let adapter = PostgresAdapter::connect(&self.config).await?;
        Ok(Box::new(adapter))
    }
}

/// A single tokio-postgres connection
pub struct PostgresAdapter {
    client: Option<Client>,
    connection: Option<JoinHandle<()>>,
    endpoint: String,
}

impl PostgresAdapter {
    /// Connect without TLS using the configured credentials
    pub async fn connect(config: &ConnectionConfig) -> Result<Self> {
        let endpoint = config.endpoint();

        let mut pg = PgConfig::new();
        pg.host(&config.host)
            .port(config.port)
            .user(&config.user)
            .password(config.password.as_str())
            .dbname(&config.database)
            .application_name(&config.application_name);

        let (client, connection) = pg
            .connect(NoTls)
            .await
            .map_err(|e| Error::connection(&endpoint, e))?;

        // The connection object drives the socket; it finishes once the
        // client is dropped
        let task_endpoint = endpoint.clone();
        let handle = tokio::spawn(async move {
            if let Err(e) = connection.await {
                warn!(endpoint = %task_endpoint, "PostgreSQL connection error: {}", e);
            }
        });

        debug!(endpoint = %endpoint, "connected");

        Ok(Self {
            client: Some(client),
            connection: Some(handle),
            endpoint,
        })
    }

    fn client(&self) -> Result<&Client> {
        self.client
            .as_ref()
            .ok_or_else(|| Error::connection(&self.endpoint, "connection already closed"))
    }
}

#[async_trait]
impl QueryAdapter for PostgresAdapter {
    fn name(&self) -> &'static str {
        "postgres"
    }

    fn placeholder_style(&self) -> PlaceholderStyle {
        PlaceholderStyle::Dollar
    }

    async fn execute(&mut self, query: &str, params: &[BoundParam]) -> Result<ExecutionResult> {
        let client = self.client()?;
        let kind = QueryKind::classify(query);

        if uses_simple_protocol(kind, params) {
            let messages = client
                .simple_query(query)
                .await
                .map_err(|e| query_error(query, &e))?;
            let count = messages
                .iter()
                .filter_map(|m| match m {
                    SimpleQueryMessage::CommandComplete(n) => Some(*n),
                    _ => None,
                })
                .last();
            return Ok(status_result(kind, query, count));
        }

        let types: Vec<Type> = params.iter().map(|p| wire_type(&p.ty)).collect();
        let statement = client
            .prepare_typed(query, &types)
            .await
            .map_err(|e| query_error(query, &e))?;

        let values: Vec<&(dyn ToSql + Sync)> = params
            .iter()
            .map(|p| &p.value as &(dyn ToSql + Sync))
            .collect();

        match kind {
            QueryKind::Select => {
                let rows = client
                    .query(&statement, &values)
                    .await
                    .map_err(|e| query_error(query, &e))?;
                let records = rows
                    .iter()
                    .map(|row| decode_row(row).map_err(|e| query_error(query, &e)))
                    .collect::<Result<Vec<_>>>()?;
                Ok(ExecutionResult::RowSet(records))
            }
            QueryKind::Mutation | QueryKind::Other => {
                let count = client
                    .execute(&statement, &values)
                    .await
                    .map_err(|e| query_error(query, &e))?;
                Ok(status_result(kind, query, Some(count)))
            }
        }
    }

    async fn close(&mut self) -> Result<()> {
        drop(self.client.take());
        if let Some(handle) = self.connection.take() {
            handle
                .await
                .map_err(|e| Error::connection(&self.endpoint, e))?;
        }
        debug!(endpoint = %self.endpoint, "connection closed");
        Ok(())
    }
}

/// Row-returning statements always use the extended protocol so that
/// columns arrive typed
fn uses_simple_protocol(kind: QueryKind, params: &[BoundParam]) -> bool {
    kind != QueryKind::Select && params.is_empty()
}

/// Result of a statement that returns no rows, from its command tag count
fn status_result(kind: QueryKind, query: &str, count: Option<u64>) -> ExecutionResult {
    match (kind, count) {
        (QueryKind::Mutation, count) => ExecutionResult::Status(count.unwrap_or(0)),
        (_, None | Some(0)) => ExecutionResult::Empty,
        (_, Some(n)) => ExecutionResult::Raw(format!(
            "{} {}",
            leading_keyword(query).to_ascii_uppercase(),
            n
        )),
    }
}

/// Prefer the server's own message and SQLSTATE over the generic display
fn query_error(query: &str, err: &tokio_postgres::Error) -> Error {
    match err.as_db_error() {
        Some(db) => Error::query(
            query,
            format!("{} (SQLSTATE {})", db.message(), db.code().code()),
        ),
        None => Error::query(query, err),
    }
}

/// Parameter type sent in the Parse message
fn wire_type(ty: &ParamType) -> Type {
    match ty {
        ParamType::Int4 => Type::INT4,
        ParamType::Int8 => Type::INT8,
        ParamType::Float4 => Type::FLOAT4,
        ParamType::Float8 => Type::FLOAT8,
        ParamType::Boolean => Type::BOOL,
        ParamType::Varchar => Type::VARCHAR,
        ParamType::Timestamp => Type::TIMESTAMP,
        ParamType::Other(_) => unspecified_type(),
    }
}

/// OID 0 asks the server to infer the parameter type
fn unspecified_type() -> Type {
    Type::new(
        "unspecified".to_string(),
        0,
        Kind::Simple,
        "pg_catalog".to_string(),
    )
}

fn decode_row(row: &Row) -> std::result::Result<Record, tokio_postgres::Error> {
    let mut fields = Vec::with_capacity(row.len());
    for (idx, column) in row.columns().iter().enumerate() {
        let Column(value) = row.try_get(idx)?;
        fields.push((column.name().to_string(), value));
    }
    Ok(Record::new(fields))
}

fn is_text_type(ty: &Type) -> bool {
    matches!(
        *ty,
        Type::TEXT | Type::VARCHAR | Type::BPCHAR | Type::NAME | Type::UNKNOWN
    )
}

/// Encode against the type the server expects for the slot, which may be
/// narrower or wider than the value's own variant. A value that cannot
/// represent the slot's type is an error, never a reinterpretation of its
/// bytes.
impl ToSql for Value {
    fn to_sql(
        &self,
        ty: &Type,
        out: &mut BytesMut,
    ) -> std::result::Result<IsNull, Box<dyn StdError + Sync + Send>> {
        if is_text_type(ty) && !matches!(self, Value::Null | Value::Text(_)) {
            return self.to_string().to_sql_checked(ty, out);
        }

        match self {
            Value::Null => Ok(IsNull::Yes),
            Value::Bool(b) => b.to_sql_checked(ty, out),
            Value::Int(i) => match *ty {
                Type::INT2 => i16::try_from(*i)?.to_sql_checked(ty, out),
                Type::INT4 => i32::try_from(*i)?.to_sql_checked(ty, out),
                Type::FLOAT4 => (*i as f32).to_sql_checked(ty, out),
                Type::FLOAT8 => (*i as f64).to_sql_checked(ty, out),
                _ => i.to_sql_checked(ty, out),
            },
            Value::Float(x) => match *ty {
                Type::FLOAT4 => (*x as f32).to_sql_checked(ty, out),
                _ => x.to_sql_checked(ty, out),
            },
            Value::Text(s) => match *ty {
                Type::UUID => Uuid::parse_str(s)?.to_sql_checked(ty, out),
                _ => s.to_sql_checked(ty, out),
            },
            Value::Timestamp(ts) => match *ty {
                Type::TIMESTAMPTZ => ts.and_utc().to_sql_checked(ty, out),
                _ => ts.to_sql_checked(ty, out),
            },
            Value::List(_) | Value::Map(_) => {
                Err(format!("cannot bind a {} as {}", self.type_name(), ty).into())
            }
        }
    }

    fn accepts(_ty: &Type) -> bool {
        true
    }

    to_sql_checked!();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_types() {
        assert_eq!(wire_type(&ParamType::Int4), Type::INT4);
        assert_eq!(wire_type(&ParamType::Timestamp), Type::TIMESTAMP);
        assert_eq!(wire_type(&ParamType::Other("uuid".into())).oid(), 0);
    }

    #[test]
    fn test_int_encodes_to_slot_width() {
        let mut buf = BytesMut::new();
        Value::Int(7).to_sql(&Type::INT4, &mut buf).unwrap();
        assert_eq!(&buf[..], &7i32.to_be_bytes());

        let mut buf = BytesMut::new();
        Value::Int(7).to_sql(&Type::INT8, &mut buf).unwrap();
        assert_eq!(&buf[..], &7i64.to_be_bytes());

        let mut buf = BytesMut::new();
        assert!(Value::Int(1 << 40).to_sql(&Type::INT4, &mut buf).is_err());
    }

    #[test]
    fn test_mismatched_value_is_rejected() {
        let mut buf = BytesMut::new();
        assert!(Value::Float(1.5).to_sql(&Type::INT8, &mut buf).is_err());
        assert!(Value::from("5").to_sql(&Type::INT4, &mut buf).is_err());
        assert!(Value::Bool(true).to_sql(&Type::INT4, &mut buf).is_err());
        assert!(Value::Int(1).to_sql(&Type::NUMERIC, &mut buf).is_err());
        assert!(buf.is_empty());
    }

    #[test]
    fn test_text_binds_to_uuid_slot() {
        let mut buf = BytesMut::new();
        Value::from("00010203-0405-0607-0809-0a0b0c0d0e0f")
            .to_sql(&Type::UUID, &mut buf)
            .unwrap();
        assert_eq!(&buf[..], (0u8..16).collect::<Vec<_>>().as_slice());
        assert!(Value::from("nope").to_sql(&Type::UUID, &mut buf).is_err());
    }

    #[test]
    fn test_scalars_render_into_text_slots() {
        let mut buf = BytesMut::new();
        Value::Float(2.5).to_sql(&Type::TEXT, &mut buf).unwrap();
        assert_eq!(&buf[..], b"2.5");
    }

    #[test]
    fn test_null_and_structured_values() {
        let mut buf = BytesMut::new();
        assert!(matches!(
            Value::Null.to_sql(&Type::INT4, &mut buf).unwrap(),
            IsNull::Yes
        ));
        assert!(Value::List(vec![]).to_sql(&Type::INT8, &mut buf).is_err());
    }

    #[test]
    fn test_parameterless_statements_use_simple_protocol() {
        let param = BoundParam {
            ty: ParamType::Int4,
            value: Value::Int(1),
        };
        assert!(uses_simple_protocol(QueryKind::Other, &[]));
        assert!(uses_simple_protocol(QueryKind::Mutation, &[]));
        assert!(!uses_simple_protocol(QueryKind::Select, &[]));
        assert!(!uses_simple_protocol(QueryKind::Mutation, &[param]));
    }

    #[test]
    fn test_status_result() {
        assert_eq!(
            status_result(QueryKind::Mutation, "insert into t values (1)", Some(3)),
            ExecutionResult::Status(3)
        );
        assert_eq!(
            status_result(QueryKind::Mutation, "insert into t values (1)", None),
            ExecutionResult::Status(0)
        );
        assert_eq!(
            status_result(QueryKind::Other, "create table t (x int)", None),
            ExecutionResult::Empty
        );
        assert_eq!(
            status_result(QueryKind::Other, "create table t (x int)", Some(0)),
            ExecutionResult::Empty
        );
        assert_eq!(
            status_result(QueryKind::Other, "copy t from stdin", Some(2)),
            ExecutionResult::Raw("COPY 2".into())
        );
    }

    #[test]
    fn test_describe() {
        let connector = PostgresConnector::new(ConnectionConfig::default());
        assert_eq!(connector.describe(), "postgres://admin@localhost:8812/qdb");
    }
}
