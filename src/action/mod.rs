//! Stage orchestration for build targets.
//!
//! [`AutoAction`] runs stage groups through a [`StageEngine`] under a deadline,
//! captures their logs and turns every outcome into a status report.

mod engine;
mod orchestrator;
mod timestamp;

pub use engine::{
    BUILD_STAGES, CommandStageEngine, FETCH_STAGES, ISO_STAGES, ReleaseStatus, StageEngine,
    StageRequest, UPLOAD_STAGES,
};
pub use orchestrator::{ActionSettings, AutoAction};
pub use timestamp::{
    TIMESTAMP_FORMAT, format_timestamp, parse_timestamp, read_build_timestamp,
    write_build_timestamp,
};
