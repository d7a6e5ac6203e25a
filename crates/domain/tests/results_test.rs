use std::fs;
use std::path::Path;

use evalbatch_domain::results::MERGED_FILE_NAME;
use evalbatch_domain::{IndexGap, MergeMode, ResultMerger};
use serde_json::json;
use tempfile::TempDir;

fn write_lines(dir: &Path, name: &str, lines: &[serde_json::Value]) {
    let content: String = lines.iter().map(|l| format!("{l}\n")).collect();
    fs::write(dir.join(name), content).unwrap();
}

fn result(index: u64, success: bool, reward: f64) -> serde_json::Value {
    json!({
        "task_index": index,
        "task_query": format!("query {index}"),
        "steps": 5,
        "success": success,
        "reward": reward,
        "execution_time": 2.0,
    })
}

#[test]
fn test_merge_combines_sorted_and_last_file_wins() {
    let dir = TempDir::new().unwrap();
    write_lines(dir.path(), "5-10.jsonl", &[result(5, false, 0.0), result(9, true, 1.0)]);
    write_lines(dir.path(), "0-5.jsonl", &[result(1, true, 1.0), result(0, false, 0.5)]);
    // 比 5-10.jsonl 排序靠后，覆盖任务9
    write_lines(dir.path(), "9-10.jsonl", &[result(9, false, 0.2)]);
    fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

    let merger = ResultMerger::new(dir.path()).unwrap();
    assert_eq!(merger.mode(), MergeMode::Merge);

    let outcome = merger.run().unwrap();
    assert_eq!(outcome.files_read, 3);
    assert_eq!(outcome.duplicates, vec![9]);
    assert_eq!(
        outcome.missing,
        vec![
            IndexGap { start: 2, end: 4 },
            IndexGap { start: 6, end: 8 }
        ]
    );
    assert_eq!(outcome.missing_count(), 6);

    let indices: Vec<u64> = outcome.records.iter().filter_map(|r| r.task_index()).collect();
    assert_eq!(indices, vec![0, 1, 5, 9]);
    assert_eq!(outcome.records[3].reward(), 0.2);

    let merged = fs::read_to_string(dir.path().join(MERGED_FILE_NAME)).unwrap();
    let lines: Vec<serde_json::Value> = merged
        .lines()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect();
    assert_eq!(lines.len(), 4);
    assert_eq!(lines[0]["task_index"], 0);
    assert_eq!(lines[0]["task_query"], "query 0");

    let stats = outcome.statistics.unwrap();
    assert_eq!(stats.total_tasks, 4);
    assert_eq!(stats.successful_tasks, 1);
    assert_eq!(stats.success_rate, 0.25);
}

#[test]
fn test_statistics_mode_when_merged_exists() {
    let dir = TempDir::new().unwrap();
    write_lines(dir.path(), MERGED_FILE_NAME, &[result(0, true, 1.0), result(1, true, 1.0)]);
    write_lines(dir.path(), "0-5.jsonl", &[result(2, false, 0.0)]);

    let merger = ResultMerger::new(dir.path()).unwrap();
    assert_eq!(merger.mode(), MergeMode::Statistics);

    let outcome = merger.run().unwrap();
    assert_eq!(outcome.mode, MergeMode::Statistics);
    assert!(outcome.merged_path.is_none());
    assert_eq!(outcome.records.len(), 2);
    assert_eq!(outcome.statistics.unwrap().success_rate, 1.0);
}

#[test]
fn test_records_without_index_and_bad_lines_skipped() {
    let dir = TempDir::new().unwrap();
    let content = format!(
        "{}\n\nnot json\n{}\n",
        json!({"success": true, "steps": 1}),
        result(3, true, 1.0)
    );
    fs::write(dir.path().join("0-5.jsonl"), content).unwrap();

    let outcome = ResultMerger::new(dir.path()).unwrap().run().unwrap();
    assert_eq!(outcome.records.len(), 1);
    assert_eq!(outcome.records[0].task_index(), Some(3));
}

#[test]
fn test_empty_directory_writes_nothing() {
    let dir = TempDir::new().unwrap();

    let outcome = ResultMerger::new(dir.path()).unwrap().run().unwrap();
    assert!(outcome.records.is_empty());
    assert!(outcome.statistics.is_none());
    assert!(outcome.merged_path.is_none());
    assert!(!dir.path().join(MERGED_FILE_NAME).exists());
}

#[test]
fn test_missing_directory_rejected() {
    assert!(ResultMerger::new("/nonexistent/results/0610_2255_o4-mini").is_err());
}

#[test]
fn test_write_statistics_relative_to_results_dir() {
    let dir = TempDir::new().unwrap();
    write_lines(dir.path(), "0-5.jsonl", &[result(0, true, 1.0)]);

    let merger = ResultMerger::new(dir.path()).unwrap();
    let stats = merger.run().unwrap().statistics.unwrap();
    let path = merger
        .write_statistics(&stats, Path::new("statistics.json"))
        .unwrap();

    assert_eq!(path, dir.path().join("statistics.json"));
    let saved: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(path).unwrap()).unwrap();
    assert_eq!(saved["total_tasks"], 1);
    assert_eq!(saved["group_statistics"]["tasks_0-9"]["total"], 1);
}

#[test]
fn test_merge_keeps_records_with_null_fields_verbatim() {
    let dir = TempDir::new().unwrap();
    let failed = r#"{"task_index":1,"task_query":"query 1","success":false,"steps":2.5,"reward":null,"error_message":"timeout"}"#;
    let content = format!("{}\n{failed}\n", result(0, true, 1.0));
    fs::write(dir.path().join("0-2.jsonl"), content).unwrap();

    let outcome = ResultMerger::new(dir.path()).unwrap().run().unwrap();
    assert_eq!(outcome.records.len(), 2);
    assert!(outcome.missing.is_empty());

    let merged = fs::read_to_string(dir.path().join(MERGED_FILE_NAME)).unwrap();
    let lines: Vec<&str> = merged.lines().collect();
    assert_eq!(lines.len(), 2);
    assert_eq!(lines[1], failed);

    let stats = outcome.statistics.unwrap();
    assert_eq!(stats.total_tasks, 2);
    assert_eq!(stats.average_reward, 0.5);
}

#[test]
fn test_far_outlier_index_reported_as_one_gap() {
    let dir = TempDir::new().unwrap();
    write_lines(
        dir.path(),
        "0-5.jsonl",
        &[result(0, true, 1.0), result(1, true, 1.0), result(u64::MAX / 2, false, 0.0)],
    );

    let outcome = ResultMerger::new(dir.path()).unwrap().run().unwrap();
    assert_eq!(
        outcome.missing,
        vec![IndexGap {
            start: 2,
            end: u64::MAX / 2 - 1
        }]
    );
}
