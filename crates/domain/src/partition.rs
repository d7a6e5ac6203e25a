use evalbatch_core::{BatchError, JobBatch, Result};

/// 覆盖 `total_tasks` 个任务所需的作业数
pub fn job_count(total_tasks: u32, tasks_per_job: u32) -> Result<u32> {
    check_inputs(total_tasks, tasks_per_job)?;
    Ok(total_tasks.div_ceil(tasks_per_job))
}

/// 将 [0, total_tasks) 切分为连续且不重叠的批次
///
/// 最后一个批次的 end_idx 会被截断到 total_tasks。
pub fn partition(total_tasks: u32, tasks_per_job: u32) -> Result<Vec<JobBatch>> {
    let num_jobs = job_count(total_tasks, tasks_per_job)?;

    let batches = (0..num_jobs)
        .map(|index| {
            // u64避免 (index+1)*tasks_per_job 溢出
            let start = u64::from(index) * u64::from(tasks_per_job);
            let end = (start + u64::from(tasks_per_job)).min(u64::from(total_tasks));
            JobBatch {
                index,
                start_idx: start as u32,
                end_idx: end as u32,
            }
        })
        .collect();

    Ok(batches)
}

fn check_inputs(total_tasks: u32, tasks_per_job: u32) -> Result<()> {
    if total_tasks == 0 {
        return Err(BatchError::InvalidParameter(
            "total_tasks 必须大于0".to_string(),
        ));
    }
    if tasks_per_job == 0 {
        return Err(BatchError::InvalidParameter(
            "tasks_per_job 必须大于0".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pairs(batches: &[JobBatch]) -> Vec<(u32, u32)> {
        batches.iter().map(|b| (b.start_idx, b.end_idx)).collect()
    }

    #[test]
    fn test_even_split() {
        let batches = partition(200, 5).unwrap();
        assert_eq!(batches.len(), 40);
        assert_eq!(pairs(&batches[..1]), vec![(0, 5)]);
        assert_eq!(pairs(&batches[39..]), vec![(195, 200)]);
        assert!(batches.iter().all(|b| b.len() == 5));
    }

    #[test]
    fn test_short_last_batch() {
        let batches = partition(7, 5).unwrap();
        assert_eq!(pairs(&batches), vec![(0, 5), (5, 7)]);
    }

    #[test]
    fn test_single_batch() {
        assert_eq!(pairs(&partition(5, 5).unwrap()), vec![(0, 5)]);
        assert_eq!(pairs(&partition(3, 10).unwrap()), vec![(0, 3)]);
    }

    #[test]
    fn test_zero_inputs_rejected() {
        assert!(matches!(
            partition(0, 5),
            Err(BatchError::InvalidParameter(_))
        ));
        assert!(matches!(
            partition(5, 0),
            Err(BatchError::InvalidParameter(_))
        ));
    }

    #[test]
    fn test_large_values_do_not_overflow() {
        let batches = partition(u32::MAX, u32::MAX - 1).unwrap();
        assert_eq!(pairs(&batches), vec![(0, u32::MAX - 1), (u32::MAX - 1, u32::MAX)]);
    }

    #[test]
    fn test_batches_cover_range_exactly_once() {
        for total in 1..=60u32 {
            for per_job in 1..=25u32 {
                let batches = partition(total, per_job).unwrap();
                assert_eq!(batches.len() as u32, job_count(total, per_job).unwrap());

                let mut expected_start = 0;
                for (i, batch) in batches.iter().enumerate() {
                    assert_eq!(batch.index as usize, i);
                    assert_eq!(batch.start_idx, expected_start);
                    assert!(batch.end_idx > batch.start_idx);
                    assert!(batch.len() <= per_job);
                    expected_start = batch.end_idx;
                }
                assert_eq!(expected_start, total);
            }
        }
    }
}
