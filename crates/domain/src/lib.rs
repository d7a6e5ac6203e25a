pub mod extract;
pub mod partition;
pub mod resolver;
pub mod results;

pub use extract::{ExtractorKind, FieldExtractor, LineScanExtractor, StructuredExtractor};
pub use partition::{job_count, partition};
pub use resolver::{Overrides, ParameterResolver, ResolvedRun};
pub use results::{IndexGap, MergeMode, MergeOutcome, ResultMerger, RunStatistics, TaskRecord};
