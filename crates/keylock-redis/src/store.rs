// Redis implementation of the atomic store contract

use std::sync::LazyLock;
use std::time::Duration;

use async_trait::async_trait;
use keylock::{AtomicStore, Context, StoreError};
use redis::aio::ConnectionManager;
use redis::{RedisResult, Script, Value};
use tracing::debug;

/// Returns the SET status reply on success, 0 when the key already exists
const ACQUIRE_SCRIPT: &str = r#"if redis.call("EXISTS", KEYS[1]) == 1 then return 0 end return redis.call("SET", KEYS[1], ARGV[1], "PX", ARGV[2])"#;

/// Returns the number of deleted keys
const RELEASE_SCRIPT: &str = r#"if redis.call("GET", KEYS[1]) == ARGV[1] then return redis.call("DEL", KEYS[1]) else return 0 end"#;

static ACQUIRE: LazyLock<Script> = LazyLock::new(|| Script::new(ACQUIRE_SCRIPT));
static RELEASE: LazyLock<Script> = LazyLock::new(|| Script::new(RELEASE_SCRIPT));

/// Redis-backed `AtomicStore`
#[derive(Clone)]
pub struct RedisStore {
    conn: ConnectionManager,
}

impl RedisStore {
    pub fn new(conn: ConnectionManager) -> Self {
        Self { conn }
    }

    /// Open a managed connection to `url` (e.g. `redis://127.0.0.1:6379`)
    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        let client = redis::Client::open(url).map_err(StoreError::backend)?;
        let conn = client
            .get_connection_manager()
            .await
            .map_err(StoreError::backend)?;
        debug!(url = %url, "Connected to redis");
        Ok(Self::new(conn))
    }
}

#[async_trait]
impl AtomicStore for RedisStore {
    async fn set_if_absent(
        &self,
        ctx: &Context,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<bool, StoreError> {
        let mut conn = self.conn.clone();
        let reply = ctx
            .run(async {
                let reply: RedisResult<Value> = ACQUIRE
                    .key(key)
                    .arg(value)
                    .arg(ttl_millis(ttl))
                    .invoke_async(&mut conn)
                    .await;
                reply.map_err(StoreError::backend)
            })
            .await?;
        parse_set_reply(reply)
    }

    async fn delete_if_equals(
        &self,
        ctx: &Context,
        key: &str,
        expected: &str,
    ) -> Result<bool, StoreError> {
        let mut conn = self.conn.clone();
        let reply = ctx
            .run(async {
                let reply: RedisResult<Value> = RELEASE
                    .key(key)
                    .arg(expected)
                    .invoke_async(&mut conn)
                    .await;
                reply.map_err(StoreError::backend)
            })
            .await?;
        parse_delete_reply(reply)
    }
}

/// `PX` argument; Redis rejects zero
fn ttl_millis(ttl: Duration) -> i64 {
    i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX).max(1)
}

fn parse_set_reply(reply: Value) -> Result<bool, StoreError> {
    match reply {
        Value::Okay => Ok(true),
        Value::SimpleString(ref status) if status == "OK" => Ok(true),
        Value::Int(0) | Value::Nil => Ok(false),
        other => Err(StoreError::UnexpectedReply(format!("{other:?}"))),
    }
}

fn parse_delete_reply(reply: Value) -> Result<bool, StoreError> {
    match reply {
        Value::Int(1) => Ok(true),
        Value::Int(0) | Value::Nil => Ok(false),
        other => Err(StoreError::UnexpectedReply(format!("{other:?}"))),
    }
}
