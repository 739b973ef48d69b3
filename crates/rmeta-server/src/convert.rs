use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use serde_json::{Map, Value};

use rmeta_types::MetaError;

pub const RET_OK: i32 = 0;
pub const RET_FAIL: i32 = -1;

pub fn ret_code(err: &MetaError) -> i32 {
    match err {
        MetaError::Decode(_) => 1,
        MetaError::Rejected(_) | MetaError::NotLeader { .. } => 2,
        MetaError::TimedOut(_) | MetaError::Indeterminate(_) => 3,
        MetaError::Apply(_) => 4,
        MetaError::ReadIndex(_) => 5,
        MetaError::Storage(_) | MetaError::UnexpectedResponse { .. } | MetaError::Internal(_) => {
            RET_FAIL
        }
    }
}

/// `{retCode, retMsg, ...}` reply body. Always sent with HTTP 200; the
/// outcome lives in `retCode`.
#[derive(Debug, Clone)]
pub struct Reply(Map<String, Value>);

impl Reply {
    pub fn ok() -> Self {
        Self::new(RET_OK, "ok".to_string())
    }

    pub fn error(err: &MetaError) -> Self {
        Self::new(ret_code(err), err.to_string())
    }

    fn new(code: i32, msg: String) -> Self {
        let mut body = Map::new();
        body.insert("retCode".into(), Value::from(code));
        body.insert("retMsg".into(), Value::from(msg));
        Reply(body)
    }

    pub fn with<T: Serialize>(mut self, field: &str, value: &T) -> Result<Self, MetaError> {
        let value = serde_json::to_value(value)
            .map_err(|e| MetaError::Internal(format!("encode {field}: {e}")))?;
        self.0.insert(field.to_string(), value);
        Ok(self)
    }

    /// Attach `value` under `field`, or nothing when the command has no result.
    pub fn with_result<T: Serialize>(self, field: Option<&str>, value: &T) -> Result<Self, MetaError> {
        match field {
            Some(field) => self.with(field, value),
            None => Ok(self),
        }
    }

    pub fn ret_code(&self) -> Option<i64> {
        self.0.get("retCode").and_then(Value::as_i64)
    }
}

impl IntoResponse for Reply {
    fn into_response(self) -> Response {
        Json(Value::Object(self.0)).into_response()
    }
}
