use std::io::Write;

use evalbatch_domain::{ExtractorKind, FieldExtractor, LineScanExtractor, StructuredExtractor};
use tempfile::NamedTempFile;

fn yaml_file(content: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file
}

const WEBSHOP_CONFIG: &str = r#"
job:
  name: "webshop_eval"
  walltime: "4:00:00"
  project: "gaa50000"
  queue: "rt_HF"
  output_dir: "logs"

model:
  name: "meta-llama/Llama-3.1-8B-Instruct"
  temperature: 0.7
  max_new_tokens: 512

agent:
  type: "huggingface"
  max_steps: 15
  verbose: false

evaluation:
  task_start_idx: 0
  task_end_idx: null
  results_dir: "webshop_evaluator/results"

logging:
  level: "INFO"
"#;

#[test]
fn test_both_extractors_read_model_name() {
    let file = yaml_file("model:\n  name: \"o4-mini\"\n");

    for kind in [ExtractorKind::Structured, ExtractorKind::LineScan] {
        let extractor = kind.build();
        let value = extractor.extract(file.path(), "model", "name").unwrap();
        assert_eq!(value.as_deref(), Some("o4-mini"), "extractor: {kind}");
    }
}

#[test]
fn test_both_extractors_return_none_without_block() {
    let file = yaml_file("agent:\n  type: openai\n  max_steps: 15\n");

    for kind in [ExtractorKind::Structured, ExtractorKind::LineScan] {
        let extractor = kind.build();
        assert_eq!(
            extractor.extract(file.path(), "model", "name").unwrap(),
            None,
            "extractor: {kind}"
        );
    }
}

#[test]
fn test_structured_reads_full_config() {
    let file = yaml_file(WEBSHOP_CONFIG);
    let extractor = StructuredExtractor;

    assert_eq!(
        extractor.extract(file.path(), "model", "name").unwrap().as_deref(),
        Some("meta-llama/Llama-3.1-8B-Instruct")
    );
    assert_eq!(
        extractor.extract(file.path(), "job", "queue").unwrap().as_deref(),
        Some("rt_HF")
    );
    assert_eq!(
        extractor.extract(file.path(), "agent", "max_steps").unwrap().as_deref(),
        Some("15")
    );
    // null值视为缺失
    assert_eq!(
        extractor
            .extract(file.path(), "evaluation", "task_end_idx")
            .unwrap(),
        None
    );
}

#[test]
fn test_structured_ignores_sibling_order() {
    // name出现在更深的嵌套中时，结构化解析不会误匹配
    let content = r#"
model:
  params:
    name: "nested-name"
  name: "real-name"
"#;
    let file = yaml_file(content);

    assert_eq!(
        StructuredExtractor
            .extract(file.path(), "model", "name")
            .unwrap()
            .as_deref(),
        Some("real-name")
    );
    assert_eq!(
        LineScanExtractor
            .extract(file.path(), "model", "name")
            .unwrap()
            .as_deref(),
        Some("nested-name")
    );
}

#[test]
fn test_structured_falls_back_on_invalid_yaml() {
    let content = "model:\n  name: \"o4-mini\"\n  bad: [unclosed\n";
    let file = yaml_file(content);

    assert_eq!(
        StructuredExtractor
            .extract(file.path(), "model", "name")
            .unwrap()
            .as_deref(),
        Some("o4-mini")
    );
}

#[test]
fn test_line_scan_missing_file_is_error() {
    let result = LineScanExtractor.extract(
        std::path::Path::new("/nonexistent/config.yaml"),
        "model",
        "name",
    );
    assert!(result.is_err());
}
