//! End-to-end pipeline test: export files on disk through upload, index
//! build, and the query flow, all against the in-memory store.

use std::fs;
use std::io::Write;
use std::path::Path;

use chrono::NaiveDate;
use serde_json::json;
use tempfile::TempDir;

use tclip_pipeline::config::{load_config, Config};
use tclip_pipeline::embedding::HashEmbedder;
use tclip_pipeline::filter::{filter_records, SearchCriteria};
use tclip_pipeline::index;
use tclip_pipeline::ingest::{run_upload, UploadOptions};
use tclip_pipeline::jsonl;
use tclip_pipeline::models::{ChunkRecord, MasterRecord};
use tclip_pipeline::progress::NoProgress;
use tclip_pipeline::store::{MemoryStore, ObjectStore};

fn write_export(root: &Path, relative: &str, event_id: &str, date: &str, channel: &str) {
    let export = json!({
        "program_metadata": {
            "event_id": event_id,
            "date": date,
            "channel": channel,
            "program_name": "ニュースウオッチ9",
            "start_time": "21:00",
            "end_time": "22:00",
        },
        "transcripts": [
            {"content": "こんばんは。", "file_path": "/cap/seg0.txt"},
            {"content": "メタデータのみ"},
            {"content": "今日のニュースです。", "file_path": "/cap/seg2.txt"},
        ],
    });
    let path = root.join(relative);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, serde_json::to_vec_pretty(&export).unwrap()).unwrap();
}

fn config_for(root: &Path) -> (Config, tempfile::NamedTempFile) {
    let mut f = tempfile::NamedTempFile::new().unwrap();
    writeln!(f, "[store]").unwrap();
    writeln!(f, "bucket = \"test\"").unwrap();
    writeln!(f, "[ingest]").unwrap();
    writeln!(f, "root = {:?}", root.to_str().unwrap()).unwrap();
    let config = load_config(f.path()).unwrap();
    (config, f)
}

#[tokio::test]
async fn upload_index_and_search() {
    let dir = TempDir::new().unwrap();
    // Two revisions of the same export: only q0.9 must be ingested.
    write_export(
        dir.path(),
        "NHK_G_20250801_q0.5_integrated.json",
        "ev-old",
        "20250801",
        "NHK総合",
    );
    write_export(
        dir.path(),
        "NHK_G_20250801_q0.9_integrated.json",
        "ev-nhk",
        "20250801",
        "NHK総合",
    );
    write_export(
        dir.path(),
        "TBS_20250802_integrated.json",
        "ev-tbs",
        "20250802",
        "TBS",
    );

    let (config, _guard) = config_for(dir.path());
    let store = MemoryStore::new();
    let embedder = HashEmbedder::new(8);

    let summary = run_upload(
        &config,
        &store,
        Some(&embedder),
        &UploadOptions::default(),
        &NoProgress,
    )
    .await
    .unwrap();

    assert_eq!(summary.scanned_files, 3);
    assert_eq!(summary.selected_files, 2, "version selection keeps one per group");
    assert_eq!(summary.uploaded_docs, 2);
    assert_eq!(summary.failed_docs, 0);

    // The selected revision's doc_id was ingested, the loser's was not.
    let body = store
        .get_object(&config.store.master_key("ev-nhk"))
        .await
        .unwrap()
        .expect("master record for the selected revision");
    let master: MasterRecord = jsonl::parse_single(&body).unwrap();
    assert_eq!(master.full_text, "こんばんは。メタデータのみ今日のニュースです。");
    assert!(master.has_embedding());
    assert!(store
        .get_object(&config.store.master_key("ev-old"))
        .await
        .unwrap()
        .is_none());

    // Chunk ids keep the original segment index across the skipped entry.
    let body = store
        .get_object(&config.store.chunk_key("ev-nhk"))
        .await
        .unwrap()
        .unwrap();
    let (chunks, errors) = jsonl::parse_jsonl::<ChunkRecord>(&body);
    assert_eq!(errors, 0);
    let ids: Vec<&str> = chunks.iter().map(|c| c.chunk_id.as_str()).collect();
    assert_eq!(ids, vec!["ev-nhk-p0000", "ev-nhk-p0002"]);
    assert!(chunks.iter().all(|c| c.has_embedding()));

    // Second run: nothing changed, nothing rewritten.
    let second = run_upload(
        &config,
        &store,
        Some(&embedder),
        &UploadOptions::default(),
        &NoProgress,
    )
    .await
    .unwrap();
    assert_eq!(second.uploaded_docs, 0);
    assert_eq!(second.unchanged_docs, 2);

    // Index build and the query flow.
    index::build_index(&config, &store, &NoProgress).await.unwrap();
    let entries = index::load_entries(&config, &store, &NoProgress)
        .await
        .unwrap();
    assert_eq!(entries.len(), 2);

    let today = NaiveDate::from_ymd_opt(2025, 8, 25).unwrap();
    let criteria = SearchCriteria {
        date: Some("2025-08-01".to_string()),
        channel: Some("NHK".to_string()),
        keyword: Some("ニュース".to_string()),
        ..Default::default()
    };
    let outcome = filter_records(&entries, &criteria, 30, 500, today);
    assert_eq!(outcome.records.len(), 1);
    assert_eq!(outcome.records[0].doc_id, "ev-nhk");
    assert!(!outcome.truncated);

    // The channel sentinel lifts the channel restriction.
    let criteria = SearchCriteria {
        channel: Some("すべて".to_string()),
        ..Default::default()
    };
    assert_eq!(filter_records(&entries, &criteria, 30, 500, today).records.len(), 2);
}

#[tokio::test]
async fn malformed_export_fails_per_document() {
    let dir = TempDir::new().unwrap();
    write_export(
        dir.path(),
        "NHK_G_20250801_integrated.json",
        "ev-good",
        "20250801",
        "NHK総合",
    );
    // No event_id: per-document failure, batch continues.
    fs::write(
        dir.path().join("TBS_20250802_integrated.json"),
        serde_json::to_vec(&json!({
            "program_metadata": {"channel": "TBS"},
            "transcripts": [{"content": "x", "file_path": "/a"}],
        }))
        .unwrap(),
    )
    .unwrap();
    // Not JSON at all.
    fs::write(dir.path().join("EX_20250803_integrated.json"), b"{broken").unwrap();
    // Transcripts present but none usable (no file_path): also a failure.
    fs::write(
        dir.path().join("MX_20250804_integrated.json"),
        serde_json::to_vec(&json!({
            "program_metadata": {"event_id": "ev-unusable"},
            "transcripts": [{"content": "字幕のみ"}],
        }))
        .unwrap(),
    )
    .unwrap();

    let (config, _guard) = config_for(dir.path());
    let store = MemoryStore::new();

    let summary = run_upload(&config, &store, None, &UploadOptions::default(), &NoProgress)
        .await
        .unwrap();
    assert_eq!(summary.uploaded_docs, 1);
    assert_eq!(summary.failed_docs, 3);
    assert!(store
        .get_object(&config.store.master_key("ev-unusable"))
        .await
        .unwrap()
        .is_none());
    assert!(store
        .get_object(&config.store.master_key("ev-good"))
        .await
        .unwrap()
        .is_some());
}

#[tokio::test]
async fn media_is_uploaded_and_referenced() {
    let dir = TempDir::new().unwrap();
    let media_root = TempDir::new().unwrap();

    let day = media_root.path().join("NHK-G/20250801PM");
    fs::create_dir_all(day.join("screenshots")).unwrap();
    fs::create_dir_all(day.join("audio")).unwrap();
    fs::write(day.join("screenshots/shot1.jpg"), b"jpegbytes").unwrap();
    fs::write(day.join("audio/track.mp3"), b"mp3bytes").unwrap();

    let export = json!({
        "program_metadata": {"event_id": "ev-media", "date": "20250801"},
        "transcripts": [{"content": "本文", "file_path": "/cap/0.txt"}],
        "screenshots": [{"file_name": "shot1.jpg", "file_path": "/capture/old/shot1.jpg"}],
    });
    fs::write(
        dir.path().join("NHK_G_20250801_integrated.json"),
        serde_json::to_vec(&export).unwrap(),
    )
    .unwrap();

    let mut f = tempfile::NamedTempFile::new().unwrap();
    writeln!(f, "[store]\nbucket = \"test\"").unwrap();
    writeln!(f, "[ingest]").unwrap();
    writeln!(f, "root = {:?}", dir.path().to_str().unwrap()).unwrap();
    writeln!(f, "media_root = {:?}", media_root.path().to_str().unwrap()).unwrap();
    let config = load_config(f.path()).unwrap();

    let store = MemoryStore::new();
    let summary = run_upload(&config, &store, None, &UploadOptions::default(), &NoProgress)
        .await
        .unwrap();
    assert_eq!(summary.images_uploaded, 1);
    assert_eq!(summary.audio_uploaded, 1);

    let image = store
        .get_object("rag/images/ev-media/shot1.jpg")
        .await
        .unwrap();
    assert_eq!(image.unwrap(), b"jpegbytes");
    let audio = store
        .get_object("rag/audio/ev-media/track.mp3")
        .await
        .unwrap();
    assert_eq!(audio.unwrap(), b"mp3bytes");

    let body = store
        .get_object(&config.store.master_key("ev-media"))
        .await
        .unwrap()
        .unwrap();
    let master: MasterRecord = jsonl::parse_single(&body).unwrap();
    assert_eq!(
        master.image_urls,
        Some(vec!["rag/images/ev-media/shot1.jpg".to_string()])
    );
    assert_eq!(
        master.audio_urls,
        Some(vec!["rag/audio/ev-media/track.mp3".to_string()])
    );
}
