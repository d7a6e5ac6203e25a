use std::fmt::Write as _;

use evalbatch_core::{BatchState, SubmissionReport};

const RULE: &str = "==========================================";

/// 提交结束后给操作者看的汇总
pub fn render_summary(report: &SubmissionReport, merge_command: &str) -> String {
    let mut out = String::new();
    let total = report.results.len();

    let _ = writeln!(out, "{RULE}");
    if report.dry_run {
        let _ = writeln!(out, "dry-run: 已生成 {total} 个作业脚本，未提交");
    } else {
        let _ = writeln!(
            out,
            "提交完成: {}/{} 个作业提交成功",
            report.success_count(),
            total
        );
    }
    let _ = writeln!(out, "模型: {}", report.model_name);
    let _ = writeln!(
        out,
        "运行: {} (run id {})",
        report.context.timestamp, report.context.run_id
    );

    let job_ids = report.job_ids();
    if !job_ids.is_empty() {
        let _ = writeln!(out, "\n作业ID:");
        for job_id in job_ids {
            let _ = writeln!(out, "  - {job_id}");
        }
    }

    let failed = report.failed_batches();
    if !failed.is_empty() {
        let _ = writeln!(out, "\n提交失败的批次:");
        for result in &report.results {
            if let BatchState::SubmitFailed { reason } = &result.state {
                let _ = writeln!(
                    out,
                    "  - 批次 {} [{}, {}): {reason}",
                    result.batch.index, result.batch.start_idx, result.batch.end_idx
                );
            }
        }
    }

    let scripts = report.script_paths();
    if !scripts.is_empty() {
        let _ = writeln!(out, "\n生成的作业脚本:");
        for path in scripts {
            let _ = writeln!(out, "  - {}", path.display());
        }
    }

    let _ = writeln!(out, "\n结果目录: {}", report.results_dir.display());
    let _ = writeln!(out, "所有作业完成后，运行以下命令合并结果:");
    let _ = writeln!(out, "  {merge_command} {}", report.results_dir.display());
    let _ = writeln!(out, "{RULE}");
    out
}
