mod support;

use std::sync::Arc;

use serde_json::{Value, json};

use soar_core::executor::wrapper::RUNNER_BINARY;
use soar_core::memorizer::InMemoryStorage;
use soar_core::model::{Asset, RunnerData};
use soar_core::runner::builtin::{
    DnsRunner, HttpxRunner, NaabuRunner, NucleiRunner, SubfinderRunner, ToolSettings,
    UnauthorRunner,
};
use soar_core::runner::container::run_cmd;
use soar_core::runner::{FileTransfer, RunOptions, RunnerBuilder};
use soar_core::{AssetRunner, Collector, CollectorOptions, HashStrategy, Memorizer};

use support::ScriptedExecutor;

fn lines(values: &[Value]) -> String {
    values.iter().map(|v| format!("{v}\n")).collect()
}

fn only_success() -> CollectorOptions {
    CollectorOptions {
        only_success: true,
        ..Default::default()
    }
}

fn asset_of(record: &RunnerData) -> Asset {
    Asset::from_value(record.json.clone()).unwrap()
}

fn domains(records: &[RunnerData]) -> Vec<String> {
    records
        .iter()
        .map(|record| asset_of(record).domain().unwrap_or_default().to_string())
        .collect()
}

fn indices(records: &[RunnerData]) -> Vec<Option<usize>> {
    records.iter().map(|r| r.source_input_index).collect()
}

#[tokio::test]
async fn subfinder_fans_out_and_replays_from_cache() {
    let stdout = format!(
        "[INF] Enumerating subdomains for example.com\n{}",
        lines(&[
            json!({"host": "www.example.com", "input": "example.com"}),
            json!({"host": "api.example.com", "input": "example.com"}),
        ])
    );
    let scripted = Arc::new(ScriptedExecutor::new().reply("subfinder", &stdout, ""));
    let storage = Arc::new(InMemoryStorage::new());
    let collector = Collector::new(scripted.clone())
        .with_memorizer(Memorizer::new(storage.clone(), HashStrategy::General))
        .with_runner(RunnerBuilder::asset(SubfinderRunner::default()).build());
    let example = json!({"basic": {"domain": "example.com"}});
    let other = json!({"basic": {"domain": "other.test"}});

    let first = collector
        .collect_values(vec![example.clone(), other.clone()])
        .await
        .unwrap();

    assert_eq!(
        domains(&first.outputs),
        vec!["example.com", "www.example.com", "api.example.com", "other.test"]
    );
    assert_eq!(indices(&first.outputs), vec![Some(0), Some(0), Some(0), Some(1)]);
    assert!(first.outputs.iter().all(|record| record.success));
    assert_eq!(
        scripted.calls(),
        vec![vec!["subfinder", "-silent", "-json", "-d", "example.com,other.test"]]
    );
    assert_eq!(storage.len().await, 2);

    // swapped order: cached children follow their input's new position
    let second = collector.collect_values(vec![other, example]).await.unwrap();

    assert_eq!(second.report.cache_hits, 2);
    assert_eq!(scripted.calls().len(), 1);
    assert_eq!(
        domains(&second.outputs),
        vec!["other.test", "example.com", "www.example.com", "api.example.com"]
    );
    assert_eq!(indices(&second.outputs), vec![Some(0), Some(1), Some(1), Some(1)]);
}

#[tokio::test]
async fn naabu_matches_ports_by_host_then_ip() {
    let stdout = lines(&[
        json!({"host": "example.com", "ip": "1.2.3.4", "port": 443, "protocol": "tcp"}),
        json!({"host": "example.com", "ip": "1.2.3.4", "port": 80, "protocol": "tcp"}),
        json!({"ip": "10.0.0.9", "port": 53, "protocol": "udp"}),
    ]);
    let scripted = Arc::new(ScriptedExecutor::new().reply("naabu", &stdout, ""));
    let collector = Collector::new(scripted.clone())
        .with_runner(
            RunnerBuilder::asset(NaabuRunner::default())
                .only_success(true)
                .build(),
        )
        .with_options(only_success());

    let collected = collector
        .collect_values(vec![
            json!({"basic": {"domain": "example.com", "ip": "1.2.3.4"}}),
            json!({"basic": {"ip": "10.0.0.9"}}),
            json!({"basic": {"domain": "quiet.test"}}),
        ])
        .await
        .unwrap();

    let found: Vec<_> = collected
        .outputs
        .iter()
        .map(|record| {
            let asset = asset_of(record);
            (asset.host_and_port().unwrap(), asset.basic.protocol.map(|p| p.as_str()))
        })
        .collect();
    assert_eq!(
        found,
        vec![
            ("example.com:443".to_string(), Some("tcp")),
            ("example.com:80".to_string(), Some("tcp")),
            ("10.0.0.9:53".to_string(), Some("udp")),
        ]
    );
    assert_eq!(indices(&collected.outputs), vec![Some(0), Some(0), Some(1)]);
    assert_eq!(
        asset_of(&collected.outputs[0]).ip().unwrap(),
        "1.2.3.4",
        "children keep the parent's address"
    );

    let argv = &scripted.calls()[0];
    assert_eq!(argv.last().map(String::as_str), Some("example.com,10.0.0.9,quiet.test"));
}

#[tokio::test]
async fn httpx_fills_response_and_attachments() {
    let stdout = lines(&[json!({
        "input": "example.com:443/admin",
        "status_code": 200,
        "title": "Admin",
        "content_type": "text/html",
        "headless_body": "<h1>hi</h1>",
        "screenshot_bytes": "iVBORw0KGgo=",
    })]);
    let scripted = Arc::new(ScriptedExecutor::new().reply("httpx", &stdout, ""));
    let runner = HttpxRunner::default().with_path("/admin");
    let collector = Collector::new(scripted.clone())
        .with_runner(RunnerBuilder::asset(runner).only_success(true).build())
        .with_options(only_success());

    let collected = collector
        .collect_values(vec![
            json!({"basic": {"domain": "example.com", "port": 443}}),
            json!({"basic": {"ip": "10.0.0.9", "port": 8080}}),
        ])
        .await
        .unwrap();

    assert_eq!(collected.outputs.len(), 1);
    let asset = asset_of(&collected.outputs[0]);
    let response = asset.response.as_ref().unwrap();
    assert_eq!(response["status_code"], 200);
    assert_eq!(response["title"], "Admin");
    assert!(response.get("headless_body").is_none());
    assert!(response.get("screenshot_bytes").is_none());

    let body = &asset.attachments["response"];
    assert_eq!(body.mime_type, "text/html");
    assert_eq!(body.bytes().unwrap(), b"<h1>hi</h1>");
    let shot = &asset.attachments["screenshot"];
    assert_eq!(shot.mime_type, "image/png");
    assert_eq!(shot.data, "iVBORw0KGgo=");

    let argv = &scripted.calls()[0];
    assert_eq!(argv[0], "httpx");
    assert!(argv.contains(&"example.com:443/admin,10.0.0.9:8080/admin".to_string()));
}

#[tokio::test]
async fn exploit_checks_record_their_verdicts() {
    let scripted = Arc::new(
        ScriptedExecutor::new()
            .reply(
                "unauthor",
                &lines(&[
                    json!({"target": "10.0.0.1:6379", "success": true, "info": "no auth"}),
                    json!({"target": "10.0.0.2:6379", "success": false}),
                ]),
                "",
            )
            .reply(
                "nuclei",
                &lines(&[
                    json!({"host": "10.0.0.1:6379", "template-id": "redis-info"}),
                    json!({"host": "10.0.0.1:6379", "template-id": "redis-rce"}),
                ]),
                "",
            ),
    );
    let collector = Collector::new(scripted.clone())
        .with_runner(RunnerBuilder::asset(UnauthorRunner::default()).build())
        .with_runner(RunnerBuilder::asset(NucleiRunner::default()).build());

    let collected = collector
        .collect_values(vec![
            json!({"basic": {"ip": "10.0.0.1", "port": 6379}}),
            json!({"basic": {"ip": "10.0.0.2", "port": 6379}}),
        ])
        .await
        .unwrap();

    assert_eq!(scripted.programs(), vec!["unauthor", "nuclei"]);
    assert_eq!(collected.outputs.len(), 2);
    let open = asset_of(&collected.outputs[0]);
    let findings = open.response.as_ref().and_then(Value::as_array).unwrap();
    assert_eq!(findings.len(), 2);
    assert!(collected.outputs[0].success);

    // nuclei found nothing, so the unauthor verdict stays
    let closed = &collected.outputs[1];
    assert!(!closed.success);
    assert_eq!(asset_of(closed).response.unwrap()["success"], false);
}

#[tokio::test]
async fn unauthor_keeps_only_open_targets() {
    let scripted = Arc::new(ScriptedExecutor::new().reply(
        "unauthor",
        &lines(&[
            json!({"target": "10.0.0.1:27017", "success": true}),
            json!({"target": "10.0.0.2:27017", "success": false}),
        ]),
        "",
    ));
    let runner = UnauthorRunner::new("mongodb", ToolSettings::default());
    assert_eq!(runner.descriptor().name, "unauthor");
    let collector = Collector::new(scripted.clone())
        .with_runner(RunnerBuilder::asset(runner).only_success(true).build());

    let collected = collector
        .collect_values(vec![
            json!({"basic": {"ip": "10.0.0.1", "port": 27017}}),
            json!({"basic": {"ip": "10.0.0.2", "port": 27017}}),
        ])
        .await
        .unwrap();

    assert_eq!(indices(&collected.outputs), vec![Some(0)]);
    assert_eq!(scripted.calls()[0][..3], ["unauthor", "--type", "mongodb"]);
}

#[tokio::test]
async fn wrapper_transfer_is_a_single_call() {
    let reply = json!({
        "stdout": "a.test\n",
        "stderr": "[WRN] rate limited",
        "files": {"/tmp/out.txt": "done"},
    });
    let scripted = Arc::new(ScriptedExecutor::new().reply(RUNNER_BINARY, &reply.to_string(), ""));
    let collector = Collector::new(scripted.clone());
    let mut options = RunOptions::default().file("/tmp/in.txt", "example.com\n");
    options.collect_files.push("/tmp/out.txt".into());
    options.ignore_stdout = true;

    let output = run_cmd(
        &collector,
        vec!["tool".into(), "-l".into(), "/tmp/in.txt".into()],
        &options,
        FileTransfer::Wrapper,
    )
    .await
    .unwrap();

    assert_eq!(output.stdout, "a.test\n");
    assert_eq!(output.stderr, "[WRN] rate limited");
    assert_eq!(output.files["/tmp/out.txt"], "done");

    let calls = scripted.calls();
    assert_eq!(calls.len(), 1);
    let argv = &calls[0];
    assert_eq!(argv[0], RUNNER_BINARY);
    assert!(argv.windows(2).any(|w| w == ["--files", "/tmp/in.txt:ZXhhbXBsZS5jb20K"]));
    assert!(argv.windows(2).any(|w| w == ["--collect-files", "/tmp/out.txt"]));
    assert!(argv.contains(&"--ignore-stdout".to_string()));
    let separator = argv.iter().position(|arg| arg == "--").unwrap();
    assert_eq!(argv[separator + 1..], ["tool", "-l", "/tmp/in.txt"]);
}

#[tokio::test]
async fn wrapper_error_fails_the_call() {
    let reply = json!({
        "stdout": "",
        "stderr": "flag provided but not defined: -x",
        "error": "exit status 2",
    });
    let scripted = Arc::new(ScriptedExecutor::new().reply(RUNNER_BINARY, &reply.to_string(), ""));
    let collector = Collector::new(scripted);

    let err = run_cmd(
        &collector,
        vec!["tool".into(), "-x".into()],
        &RunOptions::default(),
        FileTransfer::Wrapper,
    )
    .await
    .unwrap_err();

    assert!(err.is_execution(), "unexpected error: {err}");
    assert!(err.to_string().contains("exit status 2"));
}

#[tokio::test]
async fn round_trip_transfer_writes_runs_then_reads() {
    let scripted = Arc::new(
        ScriptedExecutor::new()
            .reply("tool", "ok\n", "")
            .reply("cat", "done", ""),
    );
    let collector = Collector::new(scripted.clone());
    let mut options = RunOptions::default().file("/tmp/in.txt", "example.com\n");
    options.collect_files.push("/tmp/out.txt".into());

    let output = run_cmd(&collector, vec!["tool".into()], &options, FileTransfer::RoundTrip)
        .await
        .unwrap();

    assert_eq!(output.stdout, "ok\n");
    assert_eq!(output.files["/tmp/out.txt"], "done");
    assert_eq!(scripted.programs(), vec!["bash", "tool", "cat"]);
}

#[tokio::test]
async fn dns_through_the_wrapper_skips_the_upload_call() {
    let dnsx = json!({"host": "example.com", "a": ["1.2.3.4", "5.6.7.8"]});
    let reply = json!({"stdout": format!("{dnsx}\n")});
    let scripted = Arc::new(ScriptedExecutor::new().reply(RUNNER_BINARY, &reply.to_string(), ""));
    let runner = DnsRunner::new(ToolSettings::default().with_transfer(FileTransfer::Wrapper));
    let collector = Collector::new(scripted.clone())
        .with_runner(RunnerBuilder::asset(runner).build());

    let collected = collector
        .collect_values(vec![json!({"basic": {"domain": "example.com"}})])
        .await
        .unwrap();

    assert_eq!(scripted.programs(), vec![RUNNER_BINARY]);
    let ips: Vec<_> = collected
        .outputs
        .iter()
        .map(|record| asset_of(record).ip().unwrap().to_string())
        .collect();
    assert_eq!(ips, vec!["1.2.3.4", "5.6.7.8"]);
    assert_eq!(indices(&collected.outputs), vec![Some(0), Some(0)]);
}
