//! CGI responses for the update endpoints.
//!
//! Every response is a `Status:` line, headers, a blank line and the body.

use serde_json::{json, Value};
use std::io::{self, Read, Write};
use sui_update::launcher::Sysupgrade;
use sui_update::memory::SystemMemory;
use sui_update::model::{FixedModel, ModelSource, UciModel};
use sui_update::remote::HttpUpdateServer;
use sui_update::upgrade_log::{open_upgrade_log, stream_upgrade_log, ATTACHMENT_NAME};
use sui_update::{ClaimInput, UpdateConfig, UpdateOutcome, UpdateReconciler, UpdateResponse};
use tracing::{error, info, warn};

pub const INVALID_BODY: &str = "Invalid request body.";
pub const CONFIG_ERROR: &str = "Error while loading update configuration.";
const NO_LOG: &str = "There is currently no update.log.";
const LOG_READ_ERROR: &str = "Error while reading update.log.";

pub fn status_text(code: u16) -> &'static str {
    match code {
        200 => "OK",
        400 => "Bad Request",
        404 => "Not Found",
        409 => "Conflict",
        422 => "Unprocessable Entity",
        _ => "Internal Server Error",
    }
}

fn write_status<W: Write>(out: &mut W, code: u16) -> io::Result<()> {
    write!(out, "Status: {} {}\r\n", code, status_text(code))
}

pub fn write_json<W: Write>(out: &mut W, code: u16, body: &str) -> io::Result<()> {
    write_status(out, code)?;
    write!(out, "Content-type: application/json\r\n\r\n{}\n", body)?;
    out.flush()
}

/// JSON error body with just the token and one message
pub fn write_error<W: Write>(
    out: &mut W,
    code: u16,
    xsrf: &str,
    message: &'static str,
) -> io::Result<()> {
    let body = serde_json::to_string(&UpdateResponse::error(xsrf, message))
        .unwrap_or_else(|_| json!({ "xsrf": xsrf, "errors": [message] }).to_string());
    write_json(out, code, &body)
}

pub fn write_outcome<W: Write>(out: &mut W, outcome: &UpdateOutcome, xsrf: &str) -> io::Result<()> {
    write_json(out, outcome.status_code(), &outcome.to_json(xsrf))
}

/// Parse the request body. Empty means no fields; anything else must be a
/// JSON object.
pub fn parse_body(raw: &[u8]) -> Option<Value> {
    if raw.iter().all(u8::is_ascii_whitespace) {
        return Some(Value::Object(Default::default()));
    }
    match serde_json::from_slice::<Value>(raw) {
        Ok(value) if value.is_object() => Some(value),
        _ => None,
    }
}

fn model_source(config: &UpdateConfig) -> Box<dyn ModelSource> {
    match &config.model {
        Some(model) => Box::new(FixedModel(model.clone())),
        None => Box::new(UciModel::new(config.model_key.clone())),
    }
}

/// `update`: read the body, reconcile, write the outcome
pub fn handle_update<R: Read, W: Write>(
    config: &UpdateConfig,
    xsrf: &str,
    mut input: R,
    out: &mut W,
) -> io::Result<()> {
    let mut raw = Vec::new();
    if let Err(e) = input.read_to_end(&mut raw) {
        warn!("Unable to read request body: {}", e);
        return write_error(out, 400, xsrf, INVALID_BODY);
    }
    let body = match parse_body(&raw) {
        Some(body) => body,
        None => {
            warn!(bytes = raw.len(), "Rejected malformed request body");
            return write_error(out, 400, xsrf, INVALID_BODY);
        }
    };
    let claim = ClaimInput::from_request(&body);

    let server = match HttpUpdateServer::new(config) {
        Ok(server) => server,
        Err(e) => {
            let outcome = UpdateOutcome::failed(e.into());
            if let UpdateOutcome::Failed { error, .. } = &outcome {
                error.log();
            }
            return write_outcome(out, &outcome, xsrf);
        }
    };
    let model = model_source(config);
    let memory = SystemMemory;
    let launcher = Sysupgrade::from_config(config);

    let reconciler = UpdateReconciler::new(config, model.as_ref(), &server, &memory, &launcher);
    let outcome = reconciler.run(&claim);
    info!(status = outcome.status_code(), stage = ?outcome.stage(), "Update request finished");
    write_outcome(out, &outcome, xsrf)
}

/// `update-log`: the upgrade log as an attachment, or a JSON error
pub fn handle_update_log<W: Write>(
    config: &UpdateConfig,
    xsrf: &str,
    out: &mut W,
) -> io::Result<()> {
    let log = match open_upgrade_log(&config.log_path) {
        Ok(Some(log)) => log,
        Ok(None) => return write_error(out, 404, xsrf, NO_LOG),
        Err(e) => {
            error!(path = %config.log_path.display(), "Unable to open upgrade log: {}", e);
            return write_error(out, 500, xsrf, LOG_READ_ERROR);
        }
    };

    write_status(out, 200)?;
    write!(
        out,
        "Content-Type: text/plain\r\nContent-Disposition: attachment; filename={}\r\n\r\n",
        ATTACHMENT_NAME
    )?;
    // Headers are out; a read failure now can only truncate the body
    if let Err(e) = stream_upgrade_log(log, out) {
        error!("Error while sending upgrade log: {}", e);
    }
    Ok(())
}
