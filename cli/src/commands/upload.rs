use log::info;

use ads_core::format::{self, OutputMode};
use ads_core::upload::{self, ByteSource};
use ads_core::{Dispatcher, Error, MediaKind, Result, UploadRequest, Uploader};

use crate::args::UploadArgs;
use crate::config;

pub fn run(
    dispatcher: &Dispatcher,
    kind: MediaKind,
    args: &UploadArgs,
    mode: OutputMode,
) -> Result<String> {
    let source = upload::resolve(&args.file, dispatcher.config().timeout)?;
    info!("uploading {} ({} bytes) as {kind}", source.name(), source.len());

    let uploader = Uploader::new(dispatcher, config::upload_options(args));
    let outcome = uploader.run(&UploadRequest {
        kind,
        owner: &args.owner,
        source: source.as_ref(),
        wait: args.wait,
    })?;

    let report = serde_json::to_value(&outcome)
        .map_err(|e| Error::Response(format!("upload report: {e}")))?;
    Ok(format::render_value(&report, mode))
}
