use std::{collections::HashMap, io::Write, sync::mpsc, time::Duration};

use async_trait::async_trait;
use bytes::Bytes;
use imgstore_auth::digest::{
    Digest, DigestEngine, DigestEngineBuilder, DigestError, DigestOptions, DigestSource,
    SourceKind, SourceReader,
};
use tokio::{sync::oneshot, time::timeout};

const HELLO_MD5: &str = "5d41402abc4b2a76b9719d911017c592";
const DEADLINE: Duration = Duration::from_secs(15);

/// Serves fixed bytes for known URLs.
#[derive(Debug, Default)]
struct FixtureReader {
    urls: HashMap<String, Bytes>,
}

#[async_trait]
impl SourceReader for FixtureReader {
    async fn resolve(&self, source: &DigestSource) -> Result<Bytes, DigestError> {
        match source {
            DigestSource::Binary(bytes) => Ok(bytes.clone()),
            DigestSource::Url(url) => self
                .urls
                .get(url)
                .cloned()
                .ok_or_else(|| DigestError::InvalidSource(format!("no fixture for {url}"))),
            DigestSource::File(path) => Err(DigestError::InvalidSource(format!(
                "no fixture for {}",
                path.display()
            ))),
        }
    }
}

#[tokio::test]
async fn hello_without_worker() {
    let engine = DigestEngineBuilder::new().set_worker_enabled(false).build();
    let (tx, rx) = oneshot::channel();

    engine.digest_with(Bytes::from_static(b"hello"), move |result| {
        let _ = tx.send(result);
    });

    let digest = timeout(DEADLINE, rx).await.unwrap().unwrap().unwrap();
    assert_eq!(digest.as_str(), HELLO_MD5);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn concurrent_requests_on_worker() {
    let engine = DigestEngineBuilder::new().build();
    assert!(engine.has_worker());

    let first = engine.submit(Bytes::from_static(b"abcd"));
    let second = engine.submit(Bytes::from_static(b"efgh"));

    let (first, second) = tokio::join!(first, second);
    let (first, second) = (first.unwrap(), second.unwrap());

    assert_eq!(first, Digest::compute(b"abcd"));
    assert_eq!(second, Digest::compute(b"efgh"));
    assert_ne!(first, second);
}

#[tokio::test]
async fn file_source_matches_its_bytes() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(b"hello").unwrap();
    file.flush().unwrap();

    for engine in [
        DigestEngineBuilder::new().build(),
        DigestEngineBuilder::new().set_worker_enabled(false).build(),
    ] {
        let digest = timeout(DEADLINE, engine.digest(DigestSource::File(file.path().into())))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(digest.as_str(), HELLO_MD5);
    }
}

#[tokio::test]
async fn missing_file_reports_error_without_hanging() {
    for engine in [
        DigestEngineBuilder::new().build(),
        DigestEngineBuilder::new().set_worker_enabled(false).build(),
    ] {
        let (tx, rx) = oneshot::channel();
        engine.digest_with(
            DigestSource::File("/no/such/dir/image.png".into()),
            move |result| {
                let _ = tx.send(result);
            },
        );

        let err = timeout(DEADLINE, rx).await.unwrap().unwrap().unwrap_err();
        assert!(matches!(err, DigestError::ReadFile { .. }));
    }
}

#[tokio::test]
async fn unreachable_url_reports_fetch_error() {
    let client = reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(2))
        .build()
        .unwrap();
    let engine = DigestEngineBuilder::new().set_client(client).build();

    let err = timeout(DEADLINE, engine.digest(DigestSource::Url("http://127.0.0.1:9/a.png".into())))
        .await
        .unwrap()
        .unwrap_err();
    assert!(matches!(err, DigestError::Fetch { .. }));
}

#[tokio::test]
async fn url_descriptor_is_resolved_then_hashed_as_binary() {
    let mut reader = FixtureReader::default();
    reader.urls.insert(
        "https://img.example.com/a.png".to_owned(),
        Bytes::from_static(b"hello"),
    );
    let engine = DigestEngineBuilder::new().set_source_reader(reader).build();

    let options = DigestOptions {
        source: Some(SourceKind::Url),
        binary: false,
    };
    let (tx, rx) = oneshot::channel();
    engine.digest_data_with("https://img.example.com/a.png", options, move |result| {
        let _ = tx.send(result);
    });

    let digest = timeout(DEADLINE, rx).await.unwrap().unwrap().unwrap();
    assert_eq!(digest.as_str(), HELLO_MD5);

    // The URL text itself hashes differently.
    assert_ne!(digest, Digest::compute(b"https://img.example.com/a.png"));
}

#[tokio::test]
async fn failed_resolution_does_not_affect_siblings() {
    let engine = DigestEngineBuilder::new()
        .set_source_reader(FixtureReader::default())
        .build();

    let bad = engine.submit(DigestSource::Url("https://img.example.com/missing.png".into()));
    let good = engine.submit(Bytes::from_static(b"hello"));

    let (bad, good) = tokio::join!(bad, good);
    assert!(matches!(bad, Err(DigestError::InvalidSource(_))));
    assert_eq!(good.unwrap().as_str(), HELLO_MD5);
}

#[tokio::test]
async fn repeated_digests_are_identical() {
    let engine = DigestEngine::shared();
    let data: Vec<u8> = (0..4096u32).map(|i| (i * 7 % 256) as u8).collect();

    let mut handles = Vec::new();
    for _ in 0..10 {
        handles.push(engine.submit(data.clone()));
    }

    let expected = Digest::compute(&data);
    for handle in handles {
        assert_eq!(handle.await.unwrap(), expected);
    }
}

#[test]
fn worker_callback_can_request_a_file_digest() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(b"hello").unwrap();
    file.flush().unwrap();
    let path = file.path().to_path_buf();

    let engine = DigestEngineBuilder::new().build();
    assert!(engine.has_worker());
    let (tx, rx) = mpsc::channel();

    let chained = engine.clone();
    engine.digest_with(Bytes::from_static(b"first"), move |first| {
        // Runs on the queue thread, outside of any runtime.
        let first = first.unwrap();
        chained.digest_with(DigestSource::File(path), move |second| {
            tx.send((first, second)).unwrap();
        });
    });

    let (first, second) = rx.recv_timeout(DEADLINE).unwrap();
    assert_eq!(first, Digest::compute(b"first"));
    assert_eq!(second.unwrap().as_str(), HELLO_MD5);
    assert_eq!(
        rx.recv_timeout(DEADLINE).unwrap_err(),
        mpsc::RecvTimeoutError::Disconnected
    );
}
