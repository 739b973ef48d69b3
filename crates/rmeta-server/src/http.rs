use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::routing::post;
use axum::Router;
use base64::prelude::*;
use tower_http::trace::TraceLayer;

use rmeta_consensus::ReplicatedLog;
use rmeta_storage::StateMachineStore;
use rmeta_types::command::*;
use rmeta_types::{CommandKind, MetaError, MetaRequest};

use crate::convert::{ret_code, Reply};
use crate::service::MetaService;

type SharedService<L, S> = Arc<MetaService<L, S>>;

/// `POST /<Kind>` for every command kind, plus `/Data` and `/Ping`.
pub fn router<L, S>(service: SharedService<L, S>) -> Router
where
    L: ReplicatedLog,
    S: StateMachineStore,
{
    command_routes::<L, S>()
        .route("/Data", post(handle_data::<L, S>).get(handle_data::<L, S>))
        .route("/Ping", post(handle_ping::<L, S>).get(handle_ping::<L, S>))
        .layer(TraceLayer::new_for_http())
        .with_state(service)
}

fn command_routes<L, S>() -> Router<SharedService<L, S>>
where
    L: ReplicatedLog,
    S: StateMachineStore,
{
    macro_rules! routes {
        ($($req:ident),+ $(,)?) => {
            Router::new()
                $(.route(&format!("/{}", CommandKind::$req), post(handle_command::<L, S, $req>)))+
        };
    }

    routes!(
        CreateDatabase,
        DropDatabase,
        CreateRetentionPolicy,
        DropRetentionPolicy,
        UpdateRetentionPolicy,
        CreateDatabaseWithRetentionPolicy,
        CreateShardGroup,
        DeleteShardGroup,
        DropShard,
        TruncateShardGroups,
        PruneShardGroups,
        PrecreateShardGroups,
        CreateDataNode,
        DeleteDataNode,
        CreateUser,
        DropUser,
        UpdateUser,
        SetPrivilege,
        SetAdminPrivilege,
        Authenticate,
        CreateContinuousQuery,
        DropContinuousQuery,
        CreateSubscription,
        DropSubscription,
        AcquireLease,
    )
}

/// Decode the body as `R`, propose it and reply with its result.
///
/// An empty body is read as `{}`. A body that does not decode is answered
/// before anything reaches the log.
async fn handle_command<L, S, R>(State(service): State<SharedService<L, S>>, body: Bytes) -> Reply
where
    L: ReplicatedLog,
    S: StateMachineStore,
    R: MetaRequest,
{
    let raw: &[u8] = if body.iter().all(u8::is_ascii_whitespace) { b"{}" } else { &body };
    let request: R = match serde_json::from_slice(raw) {
        Ok(request) => request,
        Err(e) => {
            let err = MetaError::Decode(format!("{} request: {e}", R::KIND));
            tracing::debug!(kind = %R::KIND, error = %err, "rejecting undecodable request");
            return Reply::error(&err);
        }
    };

    let result = service
        .execute(request)
        .await
        .and_then(|output| Reply::ok().with_result(R::RESULT_FIELD, &output));
    match result {
        Ok(reply) => reply,
        Err(e) => {
            tracing::debug!(kind = %R::KIND, ret_code = ret_code(&e), error = %e, "command failed");
            Reply::error(&e)
        }
    }
}

/// `data` is the bincode state, base64-encoded.
async fn handle_data<L, S>(State(service): State<SharedService<L, S>>) -> Reply
where
    L: ReplicatedLog,
    S: StateMachineStore,
{
    let result = service.data().await.and_then(|snapshot| {
        Reply::ok()
            .with("index", &snapshot.index)?
            .with("data", &BASE64_STANDARD.encode(&snapshot.data))
    });
    result.unwrap_or_else(|e| {
        tracing::debug!(error = %e, "data read failed");
        Reply::error(&e)
    })
}

async fn handle_ping<L, S>(State(service): State<SharedService<L, S>>) -> Reply
where
    L: ReplicatedLog,
    S: StateMachineStore,
{
    let index = service.ping();
    Reply::ok().with("index", &index).unwrap_or_else(|e| Reply::error(&e))
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::{Method, Request, StatusCode};
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use rmeta_consensus::{LocalLog, LocalLogConfig};
    use rmeta_storage::mem::MemLogStorage;
    use rmeta_storage::{MemStateMachine, MetaData};

    use super::*;
    use crate::service::MetaServiceConfig;

    type TestLog = LocalLog<MemLogStorage, MemStateMachine>;

    async fn setup() -> (Router, Arc<TestLog>) {
        let state = MemStateMachine::default();
        let config = LocalLogConfig { node_id: 1, snapshot_threshold: 0 };
        let log = Arc::new(LocalLog::start(config, MemLogStorage::new(), state.clone()).await.unwrap());
        let service = MetaService::new(log.clone(), state, MetaServiceConfig::default());
        (router(Arc::new(service)), log)
    }

    async fn call(app: &Router, method: Method, path: &str, body: &str) -> (StatusCode, Value) {
        let request = Request::builder()
            .method(method)
            .uri(path)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = if bytes.is_empty() { Value::Null } else { serde_json::from_slice(&bytes).unwrap() };
        (status, value)
    }

    async fn post_json(app: &Router, path: &str, body: Value) -> Value {
        let (status, value) = call(app, Method::POST, path, &body.to_string()).await;
        assert_eq!(status, StatusCode::OK);
        value
    }

    async fn ping(app: &Router) -> u64 {
        let (_, value) = call(app, Method::GET, "/Ping", "").await;
        assert_eq!(value["retCode"], 0);
        value["index"].as_u64().unwrap()
    }

    #[tokio::test]
    async fn duplicate_database_is_rejected() {
        let (app, _log) = setup().await;

        let first = post_json(&app, "/CreateDatabase", json!({"name": "db1"})).await;
        assert_eq!(first["retCode"], 0);
        assert_eq!(first["retMsg"], "ok");
        assert_eq!(first["dbInfo"]["name"], "db1");
        assert_eq!(first["dbInfo"]["defaultRetentionPolicy"], "autogen");

        let second = post_json(&app, "/CreateDatabase", json!({"name": "db1"})).await;
        assert_eq!(second["retCode"], 4);
        assert!(second["retMsg"].as_str().unwrap().contains("already exists"));
        assert!(second.get("dbInfo").is_none());
    }

    #[tokio::test]
    async fn ping_advances_with_writes() {
        let (app, _log) = setup().await;
        let before = ping(&app).await;
        for n in 0..5 {
            let reply = post_json(&app, "/CreateDatabase", json!({"name": format!("db{n}")})).await;
            assert_eq!(reply["retCode"], 0);
        }
        assert!(ping(&app).await >= before + 5);
    }

    #[tokio::test]
    async fn undecodable_body_never_reaches_the_log() {
        let (app, log) = setup().await;
        let (status, reply) = call(&app, Method::POST, "/CreateDatabase", "{not json").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(reply["retCode"], 1);

        let reply = post_json(&app, "/CreateShardGroup", json!({"database": "db"})).await;
        assert_eq!(reply["retCode"], 1);
        assert_eq!(log.applied_index(), 0);
    }

    #[tokio::test]
    async fn empty_body_decodes_as_empty_object() {
        let (app, log) = setup().await;
        let (_, reply) = call(&app, Method::POST, "/PruneShardGroups", "").await;
        assert_eq!(reply["retCode"], 0);
        assert_eq!(log.applied_index(), 1);
    }

    #[tokio::test]
    async fn data_reflects_committed_writes() {
        let (app, _log) = setup().await;
        post_json(&app, "/CreateDatabase", json!({"name": "db1"})).await;
        post_json(
            &app,
            "/CreateUser",
            json!({"name": "admin", "password": "secret", "admin": true}),
        )
        .await;

        let reply = post_json(&app, "/Data", json!({})).await;
        assert_eq!(reply["retCode"], 0);
        assert_eq!(reply["index"], 2);
        let bytes = BASE64_STANDARD.decode(reply["data"].as_str().unwrap()).unwrap();
        let data = MetaData::from_bytes(&bytes).unwrap();
        assert!(data.database("db1").is_some());
        assert!(data.user("admin").unwrap().admin);
        assert_eq!(data.index, 2);

        let (_, via_get) = call(&app, Method::GET, "/Data", "").await;
        assert_eq!(via_get["index"], 2);
    }

    #[tokio::test]
    async fn lease_is_held_until_expiry() {
        let (app, _log) = setup().await;
        let first = post_json(&app, "/AcquireLease", json!({"name": "cq", "nodeId": 1})).await;
        assert_eq!(first["retCode"], 0);
        assert_eq!(first["lease"]["owner"], 1);

        let second = post_json(&app, "/AcquireLease", json!({"name": "cq", "nodeId": 2})).await;
        assert_eq!(second["retCode"], 4);
        assert!(second.get("lease").is_none());

        let renewed = post_json(&app, "/AcquireLease", json!({"name": "cq", "nodeId": 1})).await;
        assert_eq!(renewed["retCode"], 0);
    }

    #[tokio::test]
    async fn authenticate_returns_user_info() {
        let (app, _log) = setup().await;
        post_json(&app, "/CreateUser", json!({"name": "bob", "password": "pw"})).await;

        let ok = post_json(&app, "/Authenticate", json!({"userName": "bob", "password": "pw"})).await;
        assert_eq!(ok["retCode"], 0);
        assert_eq!(ok["userInfo"]["name"], "bob");
        assert_eq!(ok["userInfo"]["admin"], false);

        let bad = post_json(&app, "/Authenticate", json!({"userName": "bob", "password": "no"})).await;
        assert_eq!(bad["retCode"], 4);
    }

    #[tokio::test]
    async fn follower_rejects_writes_and_reads() {
        let (app, log) = setup().await;
        post_json(&app, "/CreateDatabase", json!({"name": "db1"})).await;
        log.step_down();

        let write = post_json(&app, "/DropDatabase", json!({"name": "db1"})).await;
        assert_eq!(write["retCode"], 2);
        let read = post_json(&app, "/Data", json!({})).await;
        assert_eq!(read["retCode"], 5);
        assert!(read.get("data").is_none());

        // Ping stays available and reports the local index.
        assert_eq!(ping(&app).await, 1);
    }

    #[tokio::test]
    async fn every_command_kind_is_routed() {
        let (app, _log) = setup().await;
        for kind in CommandKind::ALL {
            let (status, reply) = call(&app, Method::POST, &format!("/{kind}"), "{}").await;
            assert_eq!(status, StatusCode::OK, "{kind}");
            assert!(reply["retCode"].is_i64(), "{kind}");
        }

        let (status, _) = call(&app, Method::POST, "/NoSuchCommand", "{}").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
