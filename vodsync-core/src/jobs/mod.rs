mod client;
mod template;
mod watch;

use regex::Regex;
use serde::{Deserialize, Serialize};

pub use client::{JobClient, JobError, JobResult};
pub use template::{build_from_template, deserialize, render, TemplateError, TemplateValues};
pub use watch::{wait_until_complete, JobEventSource, WatchError, WatchEvent};

/// The manifest kind the scheduler's batch API accepts for run-to-completion work.
pub const JOB_KIND: &str = "Job";

/// Default manifest for transcode jobs. `{{.Name}}`, `{{.InputPath}}`,
/// `{{.OutputPath}}` and `{{.Preset}}` are filled in per request; paths are
/// as seen from inside the container, below the shared media mount.
pub const TRANSCODE_JOB_TEMPLATE: &str = r#"
apiVersion: batch/v1
kind: Job
metadata:
  name: transcode-{{.Name}}
  namespace: vodsync
spec:
  template:
    metadata:
      name: transcode-{{.Name}}
    spec:
      containers:
      - name: transcoder
        image: vodsync/transcoder:latest
        imagePullPolicy: Always
        args:
        - "--preset-import-file"
        - "/config/presets.json"
        - "-i"
        - "{{.InputPath}}"
        - "-o"
        - "{{.OutputPath}}"
        - "--preset"
        - "{{.Preset}}"
        volumeMounts:
        - mountPath: /media
          name: mediashare
      restartPolicy: OnFailure
      volumes:
      - name: mediashare
        hostPath:
          path: /srv/media
"#;

/// A job resource as the batch API understands it. The spec is kept opaque:
/// it is rendered from a template and submitted verbatim, never inspected.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    pub api_version: String,
    pub kind: String,
    pub metadata: JobMetadata,
    #[serde(default)]
    pub spec: serde_json::Value,
    #[serde(default)]
    pub status: JobStatus,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JobMetadata {
    pub name: String,
    #[serde(default)]
    pub namespace: String,
}

/// Status sub-object pushed with every watch event. Anything beyond the
/// succeeded counter is free-form detail, kept only for logging.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JobStatus {
    #[serde(default)]
    pub succeeded: u32,
    #[serde(flatten)]
    pub detail: serde_json::Map<String, serde_json::Value>,
}

/// Replaces characters that aren't allowed in a cluster resource name with dashes.
pub fn sanitize_job_name(name: &str) -> String {
    let illegal = Regex::new("[^a-z0-9-]").expect("valid regex");
    illegal
        .replace_all(&name.to_lowercase(), "-")
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_replaces_each_illegal_character() {
        assert_eq!(sanitize_job_name("My Video! 2024.mp4"), "my-video--2024-mp4");
        assert_eq!(sanitize_job_name("Señor.mkv"), "se-or-mkv");
    }

    #[test]
    fn sanitize_output_is_always_valid() {
        let allowed = Regex::new("^[a-z0-9-]*$").unwrap();
        for input in ["", "UPPER", "a b\tc", "plain-name", "日本語.mp4", "__"] {
            assert!(allowed.is_match(&sanitize_job_name(input)), "input {input:?}");
        }
    }

    #[test]
    fn sanitize_is_idempotent() {
        for input in ["My Video! 2024.mp4", "already-clean", "  spaced  "] {
            let once = sanitize_job_name(input);
            assert_eq!(sanitize_job_name(&once), once);
        }
    }
}
