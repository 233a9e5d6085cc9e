//! Purpose: End-to-end tests for the batch client against the mock ledger server.
//! Exports: None (integration test module).
//! Role: Validate positional partitioning, failure codes, and whole-call errors across TCP.
//! Invariants: Uses a loopback-only server on a free port.
//! Invariants: Bounded waits avoid test flakiness.
//! Invariants: Server processes are cleaned up on drop.

use ledgerbatch::api::{
    BatchClient, CreateAsset, CreateKey, ErrorKind, FailureCode, HttpTransport, ItemSpec,
    UpdateAssetTags,
};
use serde_json::{Value, json};
use std::io::Read;
use std::net::{SocketAddr, TcpListener};
use std::process::{Child, Command, Stdio};
use std::sync::{Mutex, MutexGuard};
use std::thread::sleep;
use std::time::{Duration, Instant};

type TestResult<T> = Result<T, Box<dyn std::error::Error>>;

static SERVER_LOCK: Mutex<()> = Mutex::new(());

struct TestServer {
    child: Child,
    base_url: String,
    token: Option<String>,
    _server_guard: MutexGuard<'static, ()>,
}

impl TestServer {
    fn start() -> TestResult<Self> {
        Self::start_with_options(None, None)
    }

    fn start_with_token(token: &str) -> TestResult<Self> {
        Self::start_with_options(Some(token), None)
    }

    fn start_with_max_items(max_batch_items: usize) -> TestResult<Self> {
        Self::start_with_options(None, Some(max_batch_items))
    }

    fn start_with_options(token: Option<&str>, max_batch_items: Option<usize>) -> TestResult<Self> {
        let guard = SERVER_LOCK
            .lock()
            .unwrap_or_else(|poison| poison.into_inner());
        let mut last_err: Option<Box<dyn std::error::Error>> = None;
        for _attempt in 0..3 {
            let port = pick_port()?;
            let bind = format!("127.0.0.1:{port}");
            let base_url = format!("http://{bind}");

            let mut command = Command::new(env!("CARGO_BIN_EXE_ledgerbatch"));
            command
                .arg("serve")
                .arg("--bind")
                .arg(&bind)
                .env("RUST_LOG", "warn")
                .stdout(Stdio::null())
                .stderr(Stdio::piped());
            if let Some(token) = token {
                command.arg("--token").arg(token);
            }
            if let Some(max_batch_items) = max_batch_items {
                command
                    .arg("--max-batch-items")
                    .arg(max_batch_items.to_string());
            }
            let mut child = command.spawn()?;

            match wait_for_server(&mut child, bind.parse()?) {
                Ok(()) => {
                    return Ok(Self {
                        child,
                        base_url,
                        token: token.map(str::to_string),
                        _server_guard: guard,
                    });
                }
                Err(err) => {
                    let _ = child.kill();
                    let _ = child.wait();
                    last_err = Some(err);
                    sleep(Duration::from_millis(30));
                }
            }
        }

        Err(last_err.unwrap_or_else(|| "server failed to start".into()))
    }

    fn client(&self) -> TestResult<BatchClient<HttpTransport>> {
        let mut transport =
            HttpTransport::new(self.base_url.clone())?.with_timeout(Duration::from_secs(5));
        if let Some(token) = &self.token {
            transport = transport.with_token(token.clone());
        }
        Ok(BatchClient::new(transport))
    }

    fn new_xpub(&self) -> TestResult<String> {
        let key = self.client()?.submit_one(CreateKey::default().into())?;
        Ok(key["xpub"].as_str().ok_or("missing xpub")?.to_string())
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

#[test]
fn create_batch_partitions_by_position() -> TestResult<()> {
    let server = TestServer::start()?;
    let xpub = server.new_xpub()?;
    let items: Vec<ItemSpec> = vec![
        CreateAsset::new()
            .alias("bronze")
            .root_xpub(&xpub)
            .quorum(1)
            .into(),
        CreateAsset::new().alias("unobtanium").into(),
        CreateAsset::new()
            .alias("copper")
            .root_xpub(&xpub)
            .quorum(1)
            .into(),
    ];

    let result = server.client()?.submit(&items)?;
    assert_eq!(result.len(), 3);
    assert_eq!(result.successes().keys().copied().collect::<Vec<_>>(), [0, 2]);
    assert_eq!(result.errors().keys().copied().collect::<Vec<_>>(), [1]);
    assert_eq!(
        result.failure(1).map(|failure| &failure.code),
        Some(&FailureCode::MissingRootXpubs)
    );
    assert_eq!(
        result.payload(0).and_then(|payload| payload["alias"].as_str()),
        Some("bronze")
    );
    assert_eq!(
        result.payload(2).and_then(|payload| payload["alias"].as_str()),
        Some("copper")
    );
    Ok(())
}

#[test]
fn tag_update_batch_flags_ambiguous_targets() -> TestResult<()> {
    let server = TestServer::start()?;
    let client = server.client()?;
    let xpub = server.new_xpub()?;
    let created = client.submit(&[
        CreateAsset::new().root_xpub(&xpub).tag("x", "one").into(),
        CreateAsset::new().root_xpub(&xpub).tag("y", "one").into(),
        CreateAsset::new().root_xpub(&xpub).tag("z", "one").into(),
    ])?;
    assert!(created.is_full_success());
    let ids: Vec<String> = created
        .successes()
        .values()
        .map(|payload| payload["id"].as_str().unwrap_or_default().to_string())
        .collect();

    let mut redundant = UpdateAssetTags::by_id(&ids[2]).tag("z", "four");
    redundant.alias = Some("redundant_alias".to_string());
    let result = client.submit(&[
        UpdateAssetTags::by_id(&ids[0]).tag("x", "four").into(),
        UpdateAssetTags::default().tag("y", "four").into(),
        UpdateAssetTags::by_id(&ids[1]).tag("y", "four").into(),
        redundant.into(),
    ])?;

    assert_eq!(result.successes().keys().copied().collect::<Vec<_>>(), [0, 2]);
    assert_eq!(result.errors().keys().copied().collect::<Vec<_>>(), [1, 3]);
    for index in [1, 3] {
        assert_eq!(
            result.failure(index).map(|failure| &failure.code),
            Some(&FailureCode::AmbiguousTarget)
        );
    }
    assert_eq!(
        result.payload(0).map(|payload| &payload["tags"]),
        Some(&json!({"x": "four"}))
    );
    assert_eq!(
        result.payload(2).map(|payload| &payload["tags"]),
        Some(&json!({"y": "four"}))
    );
    Ok(())
}

#[test]
fn duplicate_alias_in_one_batch_fails_only_the_second() -> TestResult<()> {
    let server = TestServer::start()?;
    let xpub = server.new_xpub()?;
    let result = server.client()?.submit(&[
        CreateAsset::new().alias("gold").root_xpub(&xpub).into(),
        CreateAsset::new().alias("gold").root_xpub(&xpub).into(),
        CreateAsset::new().alias("silver").root_xpub(&xpub).into(),
    ])?;
    assert_eq!(result.successes().keys().copied().collect::<Vec<_>>(), [0, 2]);
    assert_eq!(
        result.failure(1).map(|failure| &failure.code),
        Some(&FailureCode::DuplicateAlias)
    );
    Ok(())
}

#[test]
fn unknown_ops_fail_per_item() -> TestResult<()> {
    let server = TestServer::start()?;
    let result = server.client()?.submit(&[
        CreateKey::with_alias("treasury").into(),
        ItemSpec::from_value(json!({"op": "create_account", "alias": "acme"}))?,
    ])?;
    assert_eq!(result.success_count(), 1);
    assert_eq!(
        result.failure(1).map(|failure| &failure.code),
        Some(&FailureCode::BadRequest)
    );
    let err = result.get(2).expect_err("out of range");
    assert_eq!(err.kind(), ErrorKind::OutOfRange);
    Ok(())
}

#[test]
fn submit_one_surfaces_rejection() -> TestResult<()> {
    let server = TestServer::start()?;
    let err = server
        .client()?
        .submit_one(CreateAsset::new().alias("unobtanium").into())
        .expect_err("rejected");
    assert_eq!(err.kind(), ErrorKind::Rejected);
    assert_eq!(
        err.failure().map(|failure| &failure.code),
        Some(&FailureCode::MissingRootXpubs)
    );
    Ok(())
}

#[test]
fn auth_requires_valid_token() -> TestResult<()> {
    let server = TestServer::start_with_token("secret")?;
    let items: Vec<ItemSpec> = vec![CreateKey::default().into()];

    let anonymous = BatchClient::new(HttpTransport::new(server.base_url.clone())?);
    let err = anonymous.submit(&items).expect_err("missing token");
    assert_eq!(err.kind(), ErrorKind::Permission);

    let wrong = BatchClient::new(HttpTransport::new(server.base_url.clone())?.with_token("nope"));
    let err = wrong.submit(&items).expect_err("wrong token");
    assert_eq!(err.kind(), ErrorKind::Permission);
    assert_eq!(err.message(), Some("invalid bearer token"));

    let result = server.client()?.submit(&items)?;
    assert!(result.is_full_success());
    Ok(())
}

#[test]
fn oversized_batch_is_a_usage_error() -> TestResult<()> {
    let server = TestServer::start_with_max_items(2)?;
    let items: Vec<ItemSpec> = (0..3).map(|_| CreateKey::default().into()).collect();
    let err = server.client()?.submit(&items).expect_err("too many items");
    assert_eq!(err.kind(), ErrorKind::Usage);
    assert!(err.hint().is_some());
    Ok(())
}

#[test]
fn raw_wire_shape_matches_request_length() -> TestResult<()> {
    let server = TestServer::start()?;
    let url = format!("{}/v1/batch", server.base_url);
    let body = json!([{"op": "create_key"}, 7, {"op": "create_asset"}]);
    let response = ureq::post(&url)
        .set("Content-Type", "application/json")
        .send_string(&body.to_string())?;
    assert_eq!(response.header("ledgerbatch-version"), Some("1"));
    let records: Value = serde_json::from_str(&response.into_string()?)?;
    let records = records.as_array().ok_or("expected array")?;
    assert_eq!(records.len(), 3);
    assert_eq!(records[0]["status"], "ok");
    assert_eq!(records[1]["status"], "error");
    assert_eq!(records[1]["code"], "CH003");
    assert_eq!(records[2]["code"], "CH202");

    match ureq::post(&url).send_string(r#"{"op": "create_key"}"#) {
        Err(ureq::Error::Status(400, response)) => {
            let envelope: Value = serde_json::from_str(&response.into_string()?)?;
            assert_eq!(envelope["error"]["kind"], "Usage");
        }
        other => return Err(format!("expected 400, got {other:?}").into()),
    }
    Ok(())
}

#[test]
fn concurrent_submits_keep_their_own_positions() -> TestResult<()> {
    let server = TestServer::start()?;
    let client = server.client()?;
    std::thread::scope(|scope| -> TestResult<()> {
        let handles: Vec<_> = (0..4)
            .map(|worker| {
                let client = client.clone();
                scope.spawn(move || {
                    let items: Vec<ItemSpec> = (0..5)
                        .map(|slot| {
                            if slot % 2 == 0 {
                                CreateKey::with_alias(format!("w{worker}-k{slot}")).into()
                            } else {
                                CreateAsset::new().alias(format!("w{worker}-a{slot}")).into()
                            }
                        })
                        .collect();
                    client.submit(&items)
                })
            })
            .collect();
        for handle in handles {
            let result = handle.join().map_err(|_| "worker panicked")??;
            assert_eq!(result.successes().keys().copied().collect::<Vec<_>>(), [0, 2, 4]);
            assert_eq!(result.errors().keys().copied().collect::<Vec<_>>(), [1, 3]);
        }
        Ok(())
    })
}

#[test]
fn unreachable_ledger_is_transport_error() -> TestResult<()> {
    let port = pick_port()?;
    let transport = HttpTransport::new(format!("http://127.0.0.1:{port}"))?
        .with_timeout(Duration::from_secs(2));
    let err = BatchClient::new(transport)
        .submit(&[CreateKey::default().into()])
        .expect_err("no server");
    assert_eq!(err.kind(), ErrorKind::Transport);
    Ok(())
}

fn pick_port() -> TestResult<u16> {
    let listener = TcpListener::bind("127.0.0.1:0")?;
    let port = listener.local_addr()?.port();
    drop(listener);
    Ok(port)
}

fn wait_for_server(child: &mut Child, addr: SocketAddr) -> TestResult<()> {
    let url = format!("http://{addr}/healthz");
    let start = Instant::now();
    loop {
        if let Ok(resp) = ureq::get(&url).call() {
            if resp.status() == 200 {
                return Ok(());
            }
        }
        if let Some(status) = child.try_wait()? {
            let mut stderr = String::new();
            if let Some(mut pipe) = child.stderr.take() {
                let _ = pipe.read_to_string(&mut stderr);
            }
            let detail = stderr.trim();
            return Err(format!(
                "server exited before ready (status: {status}, stderr: {})",
                if detail.is_empty() { "<empty>" } else { detail }
            )
            .into());
        }
        if start.elapsed() > Duration::from_secs(8) {
            return Err("server did not start in time".into());
        }
        sleep(Duration::from_millis(20));
    }
}
