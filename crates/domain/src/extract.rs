//! 从评测YAML配置中读取单个字段
//!
//! 字段缺失不是错误，调用方负责提供默认值。

use std::fmt;
use std::fs;
use std::path::Path;
use std::str::FromStr;

use config::{Config as ConfigBuilder, ConfigError, File, FileFormat};
use evalbatch_core::{BatchError, Result};
use tracing::{debug, warn};

/// 配置字段读取接口，按 "顶层键.嵌套键" 定位
pub trait FieldExtractor: Send + Sync {
    fn extract(&self, path: &Path, top: &str, nested: &str) -> Result<Option<String>>;

    fn name(&self) -> &'static str;
}

/// 选择使用哪种读取方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExtractorKind {
    #[default]
    Structured,
    LineScan,
}

impl ExtractorKind {
    pub fn build(self) -> Box<dyn FieldExtractor> {
        match self {
            ExtractorKind::Structured => Box::new(StructuredExtractor),
            ExtractorKind::LineScan => Box::new(LineScanExtractor),
        }
    }
}

impl FromStr for ExtractorKind {
    type Err = BatchError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "structured" => Ok(ExtractorKind::Structured),
            "line-scan" | "line_scan" => Ok(ExtractorKind::LineScan),
            _ => Err(BatchError::Usage(format!(
                "不支持的字段读取方式: {s} (可选: structured, line-scan)"
            ))),
        }
    }
}

impl fmt::Display for ExtractorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExtractorKind::Structured => f.write_str("structured"),
            ExtractorKind::LineScan => f.write_str("line-scan"),
        }
    }
}

/// 按行扫描的读取方式
///
/// 找到第一行 `top:`，然后在其后缩进更深的行中找第一行 `nested:`。
/// 不校验嵌套层级，同名键出现在更深层时会被匹配到。
#[derive(Debug, Clone, Copy, Default)]
pub struct LineScanExtractor;

impl LineScanExtractor {
    pub fn extract_from_str(content: &str, top: &str, nested: &str) -> Option<String> {
        let mut lines = content.lines();

        let top_indent = lines.by_ref().find_map(|line| {
            key_value(line, top).map(|_| indent_of(line))
        })?;

        for line in lines {
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }
            if indent_of(line) <= top_indent {
                break;
            }
            if let Some(raw) = key_value(line, nested) {
                return clean_scalar(raw);
            }
        }

        None
    }
}

impl FieldExtractor for LineScanExtractor {
    fn extract(&self, path: &Path, top: &str, nested: &str) -> Result<Option<String>> {
        let content = fs::read_to_string(path)?;
        Ok(Self::extract_from_str(&content, top, nested))
    }

    fn name(&self) -> &'static str {
        "line-scan"
    }
}

/// 结构化解析YAML后按键路径读取
///
/// 文件无法按YAML解析时退回到按行扫描。
#[derive(Debug, Clone, Copy, Default)]
pub struct StructuredExtractor;

impl FieldExtractor for StructuredExtractor {
    fn extract(&self, path: &Path, top: &str, nested: &str) -> Result<Option<String>> {
        let Some(path_str) = path.to_str() else {
            return LineScanExtractor.extract(path, top, nested);
        };

        let parsed = ConfigBuilder::builder()
            .add_source(File::new(path_str, FileFormat::Yaml))
            .build();

        let config = match parsed {
            Ok(config) => config,
            Err(ConfigError::Foreign(e)) | Err(ConfigError::FileParse { cause: e, .. }) => {
                warn!("YAML解析失败，改用按行扫描: path={}, error={e}", path.display());
                return LineScanExtractor.extract(path, top, nested);
            }
            Err(e) => return Err(e.into()),
        };

        let key = format!("{top}.{nested}");
        match config.get::<Option<String>>(&key) {
            Ok(value) => Ok(value.and_then(|v| {
                let v = v.trim().to_string();
                (!v.is_empty()).then_some(v)
            })),
            Err(ConfigError::NotFound(_)) => Ok(None),
            Err(e) => {
                debug!("字段不是标量值: key={key}, error={e}");
                Ok(None)
            }
        }
    }

    fn name(&self) -> &'static str {
        "structured"
    }
}

fn indent_of(line: &str) -> usize {
    line.len() - line.trim_start().len()
}

/// 行形如 `<ws>key<ws>:<rest>` 时返回 rest
fn key_value<'a>(line: &'a str, key: &str) -> Option<&'a str> {
    let rest = line.trim_start().strip_prefix(key)?;
    rest.trim_start().strip_prefix(':')
}

fn clean_scalar(raw: &str) -> Option<String> {
    let raw = raw.trim();

    let value = if let Some(quote) = raw.chars().next().filter(|c| *c == '"' || *c == '\'') {
        let inner = &raw[1..];
        match inner.find(quote) {
            Some(end) => &inner[..end],
            None => inner,
        }
    } else {
        match raw.find(" #") {
            Some(pos) => raw[..pos].trim_end(),
            None => raw,
        }
    };

    let value = value.trim();
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}
