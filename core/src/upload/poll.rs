//! Processing status polling.

use std::time::Instant;

use log::{debug, info};
use serde_json::Value;

use crate::dispatch::Dispatcher;
use crate::error::{Error, PollStop, Result};
use crate::http::HttpMethod;
use crate::params::encode_path_segment;
use crate::transport::Transport;

use super::{MediaKind, UploadOptions};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssetStatus {
    Ready(String),
    Failed(String),
    /// Still processing, waiting for upload, or a status we do not know.
    Pending(String),
}

/// Read the processing status from an asset record.
///
/// `status` is preferred. Older asset records only carry per-recipe
/// statuses, which must all be `AVAILABLE` for the asset to be ready.
pub fn classify_status(record: &Value) -> AssetStatus {
    if let Some(status) = record.get("status").and_then(Value::as_str) {
        return classify_name(status);
    }
    let Some(recipes) = record.get("recipes").and_then(Value::as_array) else {
        return AssetStatus::Pending("UNKNOWN".to_string());
    };
    let statuses: Vec<AssetStatus> = recipes
        .iter()
        .map(|recipe| {
            let status = recipe.get("status").and_then(Value::as_str);
            classify_name(status.unwrap_or("UNKNOWN"))
        })
        .collect();
    if let Some(failed) = statuses
        .iter()
        .find(|status| matches!(status, AssetStatus::Failed(_)))
    {
        return failed.clone();
    }
    let all_ready = statuses
        .iter()
        .all(|status| matches!(status, AssetStatus::Ready(_)));
    if !statuses.is_empty() && all_ready {
        return AssetStatus::Ready("AVAILABLE".to_string());
    }
    AssetStatus::Pending("PROCESSING".to_string())
}

fn classify_name(status: &str) -> AssetStatus {
    match status.to_ascii_uppercase().as_str() {
        "AVAILABLE" | "READY" => AssetStatus::Ready(status.to_string()),
        "PROCESSING_FAILED" | "FAILED" | "REJECTED" => AssetStatus::Failed(status.to_string()),
        _ => AssetStatus::Pending(status.to_string()),
    }
}

pub(crate) struct PollResult {
    pub(crate) status: String,
    pub(crate) polls: u32,
}

/// Query the asset until it is ready, then report its final status.
///
/// The first query goes out immediately; the interval is slept between
/// queries. Stopping for the attempt limit, the overall timeout or
/// cancellation is `Error::PollTimeout`. A failed status is
/// `Error::Response`.
pub(crate) fn wait_until_ready<T: Transport>(
    dispatcher: &Dispatcher<T>,
    kind: MediaKind,
    asset: &str,
    options: &UploadOptions,
) -> Result<PollResult> {
    let cancel = dispatcher.cancel_token();
    let path = format!("/{}/{}", kind.collection(), encode_path_segment(asset));
    let request = dispatcher.plan(HttpMethod::Get, &path, &[], None, &[])?;
    let started = Instant::now();
    let stop = |reason| Error::PollTimeout {
        asset: asset.to_string(),
        reason,
    };

    let mut polls = 0;
    loop {
        polls += 1;
        let response = match dispatcher.execute(&request) {
            Err(Error::Cancelled) => return Err(stop(PollStop::Cancelled)),
            other => other?,
        };
        match classify_status(&response.json()?) {
            AssetStatus::Ready(status) => {
                info!("{asset} is {status} after {polls} status check(s)");
                return Ok(PollResult { status, polls });
            }
            AssetStatus::Failed(status) => {
                return Err(Error::Response(format!(
                    "processing of {asset} ended with status {status}"
                )));
            }
            AssetStatus::Pending(status) => {
                debug!("{asset} is {status} (check {polls}/{})", options.max_polls)
            }
        }
        let next_check = started.elapsed().saturating_add(options.poll_interval);
        if polls >= options.max_polls || next_check > options.poll_timeout {
            return Err(stop(PollStop::TimedOut { attempts: polls }));
        }
        if cancel.sleep(options.poll_interval).is_err() {
            return Err(stop(PollStop::Cancelled));
        }
    }
}
