pub mod catalog;
pub mod config;
pub mod error;
pub mod jobs;
pub mod publish;

pub use catalog::{
    CatalogClient, CatalogError, CatalogResult, Library, LibraryConfig, ServerConfig, VideoCatalog,
};
pub use config::{
    load_config, ClusterSection, LibrarySection, TranscodeSection, VodsyncConfig,
};
pub use error::{ConfigError, Result};
pub use jobs::{
    build_from_template, render, sanitize_job_name, wait_until_complete, Job, JobClient, JobError,
    JobEventSource, JobMetadata, JobResult, JobStatus, TemplateError, TemplateValues, WatchError,
    WatchEvent, JOB_KIND, TRANSCODE_JOB_TEMPLATE,
};
pub use publish::{PublishError, PublishReport, PublishResult, Publisher};
