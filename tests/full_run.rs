//! Full orchestrated run against a scratch deployment: channel map, one
//! lineup file, an unreachable sports feed. The run degrades to a
//! sports-free EPG, reports the feed failure, and still emits every file.

use std::fs;

use chrono::{Duration, Utc};

use epg_reconciler::config::{Config, FeedConfig, OutputConfig, PathsConfig};
use epg_reconciler::database::Database;
use epg_reconciler::orchestrator;

const SCHEMA: &str = include_str!("../db/create_schema.sql");

fn xmltv_stamp(offset_hours: i64) -> String {
    (Utc::now() + Duration::hours(offset_hours))
        .format("%Y%m%d%H%M%S +0000")
        .to_string()
}

#[tokio::test]
async fn degraded_run_emits_all_variants_and_reports_the_feed_failure() {
    let dir = tempfile::tempdir().unwrap();
    let channel_map = dir.path().join("channel_map.xml");
    let input_dir = dir.path().join("xmltv");
    let output_dir = dir.path().join("output");
    let schema_path = dir.path().join("create_schema.sql");
    let db_path = dir.path().join("store.db");

    fs::create_dir_all(&input_dir).unwrap();
    fs::write(&schema_path, SCHEMA).unwrap();
    fs::write(
        &channel_map,
        r#"<tv>
            <channel id="10"><display-name>Sports Ten</display-name></channel>
        </tv>"#,
    )
    .unwrap();
    fs::write(
        input_dir.join("lineup.xml"),
        format!(
            r#"<tv>
                <programme start="{}" stop="{}" channel="I215.58690.lineup">
                    <title>Evening News</title>
                </programme>
            </tv>"#,
            xmltv_stamp(1),
            xmltv_stamp(2),
        ),
    )
    .unwrap();

    let mut config = Config::default();
    config.paths = PathsConfig {
        channel_map,
        input_xmltv_directory: input_dir,
        create_schema: schema_path.clone(),
    };
    config.feed = FeedConfig {
        // Discard port; the connection fails immediately and the run
        // continues without sports data.
        base_url: "http://127.0.0.1:9/".to_string(),
        file_name: "feed.xml".to_string(),
        local_timezone: "UTC".to_string(),
    };
    config.output = OutputConfig {
        number_of_days: vec![1],
    };

    let db = Database::new(&db_path, &schema_path).await.unwrap();
    let report = orchestrator::run(&config, db, &output_dir, false)
        .await
        .unwrap();

    assert!(report
        .errors
        .iter()
        .any(|error| error.contains("Sports feed download failed")));

    for file_name in ["xmltv_rf1.xml", "xmltv_rs1.xml", "xmltv_ff1.xml", "xmltv_fs1.xml"] {
        let contents = fs::read_to_string(output_dir.join(file_name)).unwrap();
        assert!(contents.contains("<channel id=\"10\">"), "{file_name}");
        assert!(contents.contains("Evening News"), "{file_name}");
    }
}
