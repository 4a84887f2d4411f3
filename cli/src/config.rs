//! Turns parsed flags into the value types the core expects.

use std::time::Duration;

use ads_core::{ClientConfig, UploadOptions};

use crate::args::{GlobalArgs, UploadArgs};

/// Client configuration from global flags. Validation happens when the
/// dispatcher is built, so a missing token surfaces as a configuration error.
pub fn client_config(global: &GlobalArgs) -> ClientConfig {
    let mut config = ClientConfig::new(global.access_token.clone().unwrap_or_default())
        .with_base_url(global.base_url.trim_end_matches('/'));
    config.linkedin_version = global.linkedin_version.clone();
    config.restli_protocol_version = global.restli_protocol_version.clone();
    config.tunnel_mode = global.tunnel.into();
    config.url_length_threshold = global.url_length_threshold;
    config.timeout = global.timeout.map(Duration::from_secs);
    config.default_ad_account_id = non_empty(&global.ad_account_id);
    config.default_asset_id = non_empty(&global.asset_id);
    config
}

pub fn upload_options(args: &UploadArgs) -> UploadOptions {
    UploadOptions {
        parallelism: args.parallel,
        poll_interval: Duration::from_secs(args.poll_interval),
        poll_timeout: Duration::from_secs(args.poll_timeout),
        max_polls: args.max_polls,
        ..UploadOptions::default()
    }
}

fn non_empty(value: &Option<String>) -> Option<String> {
    value.as_ref().map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}
