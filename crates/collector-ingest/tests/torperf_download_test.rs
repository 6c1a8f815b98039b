//! Downloading series files against a mock server

use collector_ingest::config::{TorperfConfig, TorperfFile, TorperfSource};
use collector_ingest::torperf::append::{SeriesAppender, SeriesKind};
use collector_ingest::torperf::watermark::WATERMARK_FILE;
use collector_ingest::torperf::{AppendOutcome, TorperfDownloader};
use std::fs;
use std::path::Path;
use std::time::{Duration, SystemTime};
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const DATA_1: &str = "1330605000 0 1330605000 0 1330605000 0 1330605000 0 1330605000 0 1330605000 0 \
                      1330605000 0 1330605000 0 1330605010 0 51200 60 0";
const DATA_2: &str = "1330605300 0 1330605300 0 1330605300 0 1330605300 0 1330605300 0 1330605300 0 \
                      1330605300 0 1330605300 0 1330605310 0 51200 60 0";
const DATA_3: &str = "1330605600 0 1330605600 0 1330605600 0 1330605600 0 1330605600 0 1330605600 0 \
                      1330605600 0 1330605600 0 1330605610 0 51200 60 0";
const EXTRADATA_1: &str = "CIRC_ID=7 LAUNCH=1330604990.5 USED_AT=1330605010.20";

fn appender() -> SeriesAppender {
    SeriesAppender::new(reqwest::Client::new(), chrono::Duration::minutes(330))
}

fn backdate(file: &Path, hours: u64) {
    let modified = SystemTime::now() - Duration::from_secs(hours * 60 * 60);
    fs::File::options()
        .write(true)
        .open(file)
        .unwrap()
        .set_modified(modified)
        .unwrap();
}

async fn serve(server: &MockServer, route: &str, body: String) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(ResponseTemplate::new(200).set_body_string(body))
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_first_download_copies_everything() {
    let server = MockServer::start().await;
    serve(&server, "/50kb.data", format!("{DATA_1}\n{DATA_2}\n")).await;
    let dir = TempDir::new().unwrap();
    let local = dir.path().join("torperf-50kb.data");

    let outcome = appender()
        .download_and_append(&format!("{}/50kb.data", server.uri()), &local, SeriesKind::Data)
        .await
        .unwrap();

    assert_eq!(outcome, AppendOutcome::Appended { lines: 2 });
    assert_eq!(fs::read_to_string(&local).unwrap(), format!("{DATA_1}\n{DATA_2}\n"));
}

#[tokio::test]
async fn test_only_new_lines_are_appended() {
    let server = MockServer::start().await;
    serve(&server, "/50kb.data", format!("{DATA_1}\n{DATA_2}\n{DATA_3}\n")).await;
    let dir = TempDir::new().unwrap();
    let local = dir.path().join("torperf-50kb.data");
    fs::write(&local, format!("{DATA_1}\n{DATA_2}\n")).unwrap();
    backdate(&local, 12);

    let outcome = appender()
        .download_and_append(&format!("{}/50kb.data", server.uri()), &local, SeriesKind::Data)
        .await
        .unwrap();

    assert_eq!(outcome, AppendOutcome::Appended { lines: 1 });
    assert_eq!(
        fs::read_to_string(&local).unwrap(),
        format!("{DATA_1}\n{DATA_2}\n{DATA_3}\n")
    );
}

#[tokio::test]
async fn test_truncated_remote_does_not_leave_a_gap() {
    let server = MockServer::start().await;
    serve(&server, "/50kb.data", format!("{DATA_3}\n")).await;
    let dir = TempDir::new().unwrap();
    let local = dir.path().join("torperf-50kb.data");
    fs::write(&local, format!("{DATA_1}\n")).unwrap();
    backdate(&local, 12);

    let outcome = appender()
        .download_and_append(&format!("{}/50kb.data", server.uri()), &local, SeriesKind::Data)
        .await
        .unwrap();

    assert_eq!(outcome, AppendOutcome::MarkNotFound);
    assert_eq!(fs::read_to_string(&local).unwrap(), format!("{DATA_1}\n"));
}

#[tokio::test]
async fn test_fresh_local_copy_is_not_downloaded() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string(DATA_1))
        .expect(0)
        .mount(&server)
        .await;
    let dir = TempDir::new().unwrap();
    let local = dir.path().join("torperf-50kb.data");
    fs::write(&local, format!("{DATA_1}\n")).unwrap();

    let outcome = appender()
        .download_and_append(&format!("{}/50kb.data", server.uri()), &local, SeriesKind::Data)
        .await
        .unwrap();

    assert_eq!(outcome, AppendOutcome::Fresh);
}

#[tokio::test]
async fn test_server_error_is_reported() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    let dir = TempDir::new().unwrap();
    let local = dir.path().join("torperf-50kb.data");

    let result = appender()
        .download_and_append(&format!("{}/50kb.data", server.uri()), &local, SeriesKind::Data)
        .await;

    assert!(result.is_err());
    assert!(!local.exists());
}

fn downloader_config(server: &MockServer, output: &Path) -> TorperfConfig {
    TorperfConfig {
        enabled: true,
        output_directory: output.to_path_buf(),
        sources: vec![TorperfSource {
            name: "torperf".to_string(),
            base_url: format!("{}/", server.uri()),
        }],
        files: vec![TorperfFile {
            source: "torperf".to_string(),
            file_size: 51200,
            data_file: "50kb.data".to_string(),
            extradata_file: "50kb.extradata".to_string(),
        }],
        ..TorperfConfig::default()
    }
}

#[tokio::test]
async fn test_run_merges_and_records_watermark() {
    let server = MockServer::start().await;
    serve(&server, "/50kb.data", format!("{DATA_1}\n")).await;
    serve(&server, "/50kb.extradata", format!("{EXTRADATA_1}\n")).await;
    let dir = TempDir::new().unwrap();
    let output = dir.path().join("torperf");
    let watermark_path = dir.path().join(WATERMARK_FILE);

    let downloader = TorperfDownloader::new(downloader_config(&server, &output), &watermark_path).unwrap();
    let summary = downloader.run().await.unwrap();

    assert_eq!(summary.files_appended, 2);
    assert_eq!(summary.merges, 1);
    assert_eq!(summary.new_records, 1);
    let tpf = fs::read_to_string(output.join("2012/03/01/torperf-51200-2012-03-01.tpf")).unwrap();
    assert!(tpf.contains("USED_AT=1330605010.20"));
    assert_eq!(
        fs::read_to_string(&watermark_path).unwrap(),
        "torperf-50kb.data 1330605010.00\n"
    );
}

#[tokio::test]
async fn test_run_without_new_lines_keeps_watermark() {
    let server = MockServer::start().await;
    serve(&server, "/50kb.data", format!("{DATA_3}\n")).await;
    serve(&server, "/50kb.extradata", "CIRC_ID=9 LAUNCH=1330605590.5 USED_AT=1330605610.10\n".to_string()).await;
    let dir = TempDir::new().unwrap();
    let output = dir.path().join("torperf");
    fs::create_dir_all(&output).unwrap();
    let data = output.join("torperf-50kb.data");
    let extradata = output.join("torperf-50kb.extradata");
    fs::write(&data, format!("{DATA_1}\n")).unwrap();
    fs::write(&extradata, format!("{EXTRADATA_1}\n")).unwrap();
    backdate(&data, 12);
    backdate(&extradata, 12);
    let watermark_path = dir.path().join(WATERMARK_FILE);
    fs::write(&watermark_path, "torperf-50kb.data 1330605010.00\n").unwrap();

    let downloader = TorperfDownloader::new(downloader_config(&server, &output), &watermark_path).unwrap();
    let summary = downloader.run().await.unwrap();

    assert_eq!(summary.files_appended, 0);
    assert_eq!(summary.merges, 0);
    assert_eq!(fs::read_to_string(&data).unwrap(), format!("{DATA_1}\n"));
    assert_eq!(fs::read_to_string(&extradata).unwrap(), format!("{EXTRADATA_1}\n"));
    assert_eq!(
        fs::read_to_string(&watermark_path).unwrap(),
        "torperf-50kb.data 1330605010.00\n"
    );
}
