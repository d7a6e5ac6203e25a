//! 批量作业结果的合并
//!
//! 每个作业在本次运行的结果目录中写入一个 `<start>-<end>.jsonl`。合并后得到按任务索引
//! 排序的 `merged.jsonl` 以及整体统计；`merged.jsonl` 已存在时只重新计算统计。

use std::collections::BTreeMap;
use std::fmt::{self, Write as _};
use std::fs;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use evalbatch_core::{BatchError, Result};
use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::{Map, Value};
use tracing::{debug, error, info, warn};

/// 合并结果的文件名
pub const MERGED_FILE_NAME: &str = "merged.jsonl";

/// 分组统计中每组的任务数
const GROUP_SIZE: u64 = 10;

/// 一行评测结果
///
/// 整行JSON原样保存，合并时不增删字段，也不改变字段顺序。
/// 统计用到的字段按需读取，缺失、为null或类型不符时按0处理。
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskRecord(Map<String, Value>);

impl TaskRecord {
    pub fn new(fields: Map<String, Value>) -> Self {
        Self(fields)
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// 非负整数才是有效索引，`3.0` 这种写法也接受
    pub fn task_index(&self) -> Option<u64> {
        let Value::Number(n) = self.0.get("task_index")? else {
            return None;
        };
        n.as_u64().or_else(|| {
            n.as_f64()
                .filter(|f| *f >= 0.0 && f.fract() == 0.0 && *f < u64::MAX as f64)
                .map(|f| f as u64)
        })
    }

    pub fn success(&self) -> bool {
        match self.0.get("success") {
            Some(Value::Bool(b)) => *b,
            Some(Value::Number(n)) => n.as_f64().is_some_and(|f| f != 0.0),
            _ => false,
        }
    }

    pub fn steps(&self) -> f64 {
        self.number("steps")
    }

    pub fn reward(&self) -> f64 {
        self.number("reward")
    }

    pub fn execution_time(&self) -> f64 {
        self.number("execution_time")
    }

    fn number(&self, key: &str) -> f64 {
        self.0.get(key).and_then(Value::as_f64).unwrap_or(0.0)
    }
}

impl From<Map<String, Value>> for TaskRecord {
    fn from(fields: Map<String, Value>) -> Self {
        Self(fields)
    }
}

/// 合并器对目录执行的操作
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeMode {
    /// `merged.jsonl` 已存在，只计算统计
    Statistics,
    /// 合并各批次文件并写出 `merged.jsonl`
    Merge,
}

/// 缺失的任务索引区间 `[start, end]`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexGap {
    pub start: u64,
    pub end: u64,
}

impl IndexGap {
    pub fn len(&self) -> u64 {
        self.end - self.start + 1
    }

    pub fn is_empty(&self) -> bool {
        false
    }
}

impl fmt::Display for IndexGap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.start == self.end {
            write!(f, "{}", self.start)
        } else {
            write!(f, "{}-{}", self.start, self.end)
        }
    }
}

/// 一组任务索引的成功数
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroupStatistics {
    #[serde(skip)]
    pub label: String,
    pub total: u64,
    pub success: u64,
    pub success_rate: f64,
}

/// 一组结果的汇总统计
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunStatistics {
    pub total_tasks: u64,
    pub successful_tasks: u64,
    pub success_rate: f64,
    pub average_steps: f64,
    pub average_reward: f64,
    pub total_execution_time: f64,
    pub average_execution_time: f64,
    pub min_steps: f64,
    pub max_steps: f64,
    pub min_reward: f64,
    pub max_reward: f64,
    /// 按任务索引升序
    #[serde(serialize_with = "serialize_groups")]
    pub group_statistics: Vec<GroupStatistics>,
}

impl RunStatistics {
    /// 没有结果时返回 `None`
    pub fn from_records(records: &[TaskRecord]) -> Option<Self> {
        if records.is_empty() {
            return None;
        }

        let total = records.len() as u64;
        let successful = records.iter().filter(|r| r.success()).count() as u64;
        let steps: Vec<f64> = records.iter().map(TaskRecord::steps).collect();
        let rewards: Vec<f64> = records.iter().map(TaskRecord::reward).collect();
        let total_time: f64 = records.iter().map(TaskRecord::execution_time).sum();

        let mut groups: BTreeMap<u64, (u64, u64)> = BTreeMap::new();
        for record in records {
            let group = record.task_index().unwrap_or(0) / GROUP_SIZE;
            let entry = groups.entry(group).or_default();
            entry.0 += 1;
            if record.success() {
                entry.1 += 1;
            }
        }

        let group_statistics = groups
            .into_iter()
            .map(|(group, (total, success))| {
                let start = group * GROUP_SIZE;
                GroupStatistics {
                    label: format!("tasks_{}-{}", start, start + GROUP_SIZE - 1),
                    total,
                    success,
                    success_rate: success as f64 / total as f64,
                }
            })
            .collect();

        Some(Self {
            total_tasks: total,
            successful_tasks: successful,
            success_rate: successful as f64 / total as f64,
            average_steps: steps.iter().sum::<f64>() / total as f64,
            average_reward: rewards.iter().sum::<f64>() / total as f64,
            total_execution_time: total_time,
            average_execution_time: total_time / total as f64,
            min_steps: steps.iter().copied().fold(f64::INFINITY, f64::min),
            max_steps: steps.iter().copied().fold(f64::NEG_INFINITY, f64::max),
            min_reward: rewards.iter().copied().fold(f64::INFINITY, f64::min),
            max_reward: rewards.iter().copied().fold(f64::NEG_INFINITY, f64::max),
            group_statistics,
        })
    }

    /// 给操作者看的统计文本
    pub fn render(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "\n=== 统计信息 ===");
        let _ = writeln!(out, "总任务数: {}", self.total_tasks);
        let _ = writeln!(out, "成功任务数: {}", self.successful_tasks);
        let _ = writeln!(out, "成功率: {:.2}%", self.success_rate * 100.0);
        let _ = writeln!(out, "平均步数: {:.2}", self.average_steps);
        let _ = writeln!(out, "平均奖励: {:.4}", self.average_reward);
        let _ = writeln!(out, "总执行时间: {:.2}秒", self.total_execution_time);
        let _ = writeln!(out, "平均执行时间: {:.2}秒/任务", self.average_execution_time);
        let _ = writeln!(out, "最小/最大步数: {} / {}", self.min_steps, self.max_steps);
        let _ = writeln!(
            out,
            "最小/最大奖励: {:.4} / {:.4}",
            self.min_reward, self.max_reward
        );

        if !self.group_statistics.is_empty() {
            let _ = writeln!(out, "\n=== 分组成功率 ===");
            for group in &self.group_statistics {
                let _ = writeln!(
                    out,
                    "{}: {}/{} ({:.2}%)",
                    group.label,
                    group.success,
                    group.total,
                    group.success_rate * 100.0
                );
            }
        }
        out
    }
}

fn serialize_groups<S: Serializer>(
    groups: &[GroupStatistics],
    serializer: S,
) -> std::result::Result<S::Ok, S::Error> {
    let mut map = serializer.serialize_map(Some(groups.len()))?;
    for group in groups {
        map.serialize_entry(&group.label, group)?;
    }
    map.end()
}

/// 一次合并的结果
#[derive(Debug, Clone, PartialEq)]
pub struct MergeOutcome {
    pub mode: MergeMode,
    pub records: Vec<TaskRecord>,
    pub files_read: usize,
    /// 在多个文件中出现的任务索引，以排序靠后的文件为准
    pub duplicates: Vec<u64>,
    /// 最小与最大索引之间缺失的区间
    pub missing: Vec<IndexGap>,
    /// 本次写出了 `merged.jsonl` 时有值
    pub merged_path: Option<PathBuf>,
    pub statistics: Option<RunStatistics>,
}

impl MergeOutcome {
    pub fn missing_count(&self) -> u64 {
        self.missing.iter().map(IndexGap::len).sum()
    }
}

/// 合并单个运行目录中的JSONL结果
#[derive(Debug, Clone)]
pub struct ResultMerger {
    results_dir: PathBuf,
}

impl ResultMerger {
    pub fn new(results_dir: impl Into<PathBuf>) -> Result<Self> {
        let results_dir = results_dir.into();
        if !results_dir.is_dir() {
            return Err(BatchError::Configuration(format!(
                "结果目录不存在: {}",
                results_dir.display()
            )));
        }
        Ok(Self { results_dir })
    }

    pub fn results_dir(&self) -> &Path {
        &self.results_dir
    }

    pub fn merged_path(&self) -> PathBuf {
        self.results_dir.join(MERGED_FILE_NAME)
    }

    pub fn mode(&self) -> MergeMode {
        if self.merged_path().exists() {
            MergeMode::Statistics
        } else {
            MergeMode::Merge
        }
    }

    pub fn run(&self) -> Result<MergeOutcome> {
        match self.mode() {
            MergeMode::Statistics => {
                info!("统计模式: {}", self.merged_path().display());
                let records = load_jsonl(&self.merged_path())?;
                if records.is_empty() {
                    warn!("没有可读取的结果");
                }
                let statistics = RunStatistics::from_records(&records);
                Ok(MergeOutcome {
                    mode: MergeMode::Statistics,
                    records,
                    files_read: 1,
                    duplicates: Vec::new(),
                    missing: Vec::new(),
                    merged_path: None,
                    statistics,
                })
            }
            MergeMode::Merge => self.merge(),
        }
    }

    fn merge(&self) -> Result<MergeOutcome> {
        info!("合并模式: {}", self.results_dir.display());

        let files = self.result_files()?;
        if files.is_empty() {
            warn!("目录中没有JSONL结果文件: {}", self.results_dir.display());
        } else {
            info!("找到 {} 个结果文件", files.len());
        }

        let mut by_index: BTreeMap<u64, TaskRecord> = BTreeMap::new();
        let mut duplicates = Vec::new();
        for file in &files {
            let records = match load_jsonl(file) {
                Ok(records) => records,
                Err(e) => {
                    error!("读取结果文件失败: {}: {e}", file.display());
                    continue;
                }
            };
            for record in records {
                let Some(index) = record.task_index() else {
                    debug!("跳过没有有效 task_index 的结果: {}", file.display());
                    continue;
                };
                if by_index.insert(index, record).is_some() {
                    warn!("任务 {index} 重复，使用较新的结果覆盖");
                    duplicates.push(index);
                }
            }
        }

        let missing = index_gaps(by_index.keys().copied());
        if !missing.is_empty() {
            let ranges: Vec<String> = missing.iter().map(IndexGap::to_string).collect();
            warn!(
                "缺失 {} 个任务索引: {}",
                missing.iter().map(IndexGap::len).sum::<u64>(),
                ranges.join(", ")
            );
        }

        let records: Vec<TaskRecord> = by_index.into_values().collect();
        info!("共合并 {} 条结果", records.len());

        let merged_path = if records.is_empty() {
            warn!("没有可合并的结果");
            None
        } else {
            let path = self.merged_path();
            write_jsonl(&path, &records)?;
            info!("合并结果已保存到 {}", path.display());
            Some(path)
        };

        let statistics = RunStatistics::from_records(&records);
        Ok(MergeOutcome {
            mode: MergeMode::Merge,
            records,
            files_read: files.len(),
            duplicates,
            missing,
            merged_path,
            statistics,
        })
    }

    /// 保存统计信息，相对路径以结果目录为基准
    pub fn write_statistics(&self, statistics: &RunStatistics, output: &Path) -> Result<PathBuf> {
        let path = if output.is_absolute() {
            output.to_path_buf()
        } else {
            self.results_dir.join(output)
        };
        let json = serde_json::to_string_pretty(statistics)?;
        fs::write(&path, json)?;
        info!("统计信息已保存到 {}", path.display());
        Ok(path)
    }

    fn result_files(&self) -> Result<Vec<PathBuf>> {
        let mut files: Vec<PathBuf> = fs::read_dir(&self.results_dir)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| {
                path.is_file()
                    && path.extension().is_some_and(|ext| ext == "jsonl")
                    && path.file_name().is_some_and(|name| name != MERGED_FILE_NAME)
            })
            .collect();
        files.sort();
        Ok(files)
    }
}

/// 读取JSONL文件，跳过空行以及不是JSON对象的行
pub fn load_jsonl(path: &Path) -> Result<Vec<TaskRecord>> {
    let reader = BufReader::new(fs::File::open(path)?);
    let mut records = Vec::new();

    for (line_no, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<TaskRecord>(&line) {
            Ok(record) => records.push(record),
            Err(e) => warn!(
                "跳过无法解析的行: {}:{}: {e}",
                path.display(),
                line_no + 1
            ),
        }
    }

    info!(
        "从 {} 读取了 {} 条结果",
        path.file_name().unwrap_or_default().to_string_lossy(),
        records.len()
    );
    Ok(records)
}

fn write_jsonl(path: &Path, records: &[TaskRecord]) -> Result<()> {
    let mut writer = BufWriter::new(fs::File::create(path)?);
    for record in records {
        serde_json::to_writer(&mut writer, record)?;
        writer.write_all(b"\n")?;
    }
    writer.flush()?;
    Ok(())
}

/// 升序索引之间的缺口，按区间返回
fn index_gaps(sorted: impl Iterator<Item = u64>) -> Vec<IndexGap> {
    let mut gaps = Vec::new();
    let mut previous: Option<u64> = None;
    for index in sorted {
        if let Some(prev) = previous {
            if index - prev > 1 {
                gaps.push(IndexGap {
                    start: prev + 1,
                    end: index - 1,
                });
            }
        }
        previous = Some(index);
    }
    gaps
}
